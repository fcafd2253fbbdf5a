//! SVG import: every closed sub-path becomes a root sketch, every open one a root curve.

use smallvec::SmallVec;
use usvg::tiny_skia_path::PathSegment;

use super::model::{Contour, NodeKind, Segment, SketchData};
use super::scene::Scene;
use crate::foundation::core::{NodeId, Point, points_close};
use crate::foundation::error::{KnitError, KnitResult};

/// Import paths from SVG bytes into `scene`, flipping the y axis so that "up" in the drawing
/// is the positive y direction of the scene. Returns the created node ids in document order.
#[tracing::instrument(skip(scene, bytes), fields(len = bytes.len()))]
pub fn import_svg(scene: &mut Scene, bytes: &[u8]) -> KnitResult<Vec<NodeId>> {
    let opts = usvg::Options::default();
    let tree = usvg::Tree::from_data(bytes, &opts)
        .map_err(|e| KnitError::validation(format!("parse svg: {e}")))?;
    let mut contours = Vec::new();
    collect_group(tree.root(), &mut contours);
    let mut ids = Vec::with_capacity(contours.len());
    for contour in contours {
        let kind = if contour.closed {
            NodeKind::Sketch(SketchData {
                contour,
                ..SketchData::default()
            })
        } else {
            NodeKind::Curve { contour }
        };
        ids.push(scene.add_node(kind, None)?);
    }
    tracing::debug!(count = ids.len(), "imported svg paths");
    Ok(ids)
}

fn collect_group(group: &usvg::Group, out: &mut Vec<Contour>) {
    for node in group.children() {
        match node {
            usvg::Node::Group(g) => collect_group(g, out),
            usvg::Node::Path(p) => collect_path(p, out),
            _ => {}
        }
    }
}

fn collect_path(path: &usvg::Path, out: &mut Vec<Contour>) {
    let ts = path.abs_transform();
    let map = |p: usvg::tiny_skia_path::Point| {
        let x = f64::from(p.x);
        let y = f64::from(p.y);
        let tx = f64::from(ts.sx) * x + f64::from(ts.kx) * y + f64::from(ts.tx);
        let ty = f64::from(ts.ky) * x + f64::from(ts.sy) * y + f64::from(ts.ty);
        Point::new(tx, -ty)
    };

    let mut builder = ContourBuilder::default();
    for seg in path.data().segments() {
        match seg {
            PathSegment::MoveTo(p) => {
                builder.finish(false, out);
                builder.vertices.push(map(p));
            }
            PathSegment::LineTo(p) => builder.push(&[], map(p)),
            PathSegment::QuadTo(c, p) => builder.push(&[map(c)], map(p)),
            PathSegment::CubicTo(c1, c2, p) => builder.push(&[map(c1), map(c2)], map(p)),
            PathSegment::Close => builder.finish(true, out),
        }
    }
    builder.finish(false, out);
}

#[derive(Default)]
struct ContourBuilder {
    vertices: Vec<Point>,
    segments: Vec<Segment>,
}

impl ContourBuilder {
    fn push(&mut self, controls: &[Point], end: Point) {
        self.segments.push(Segment {
            controls: SmallVec::from_slice(controls),
            ..Segment::default()
        });
        self.vertices.push(end);
    }

    fn finish(&mut self, close: bool, out: &mut Vec<Contour>) {
        let mut vertices = std::mem::take(&mut self.vertices);
        let mut segments = std::mem::take(&mut self.segments);
        if segments.is_empty() {
            return;
        }
        if close {
            let first = vertices[0];
            let last = vertices[vertices.len() - 1];
            if points_close(first, last) {
                // The explicit closing segment already ends on the first vertex.
                vertices.pop();
            } else {
                segments.push(Segment::line());
            }
            if vertices.len() < 3 {
                return;
            }
        }
        out.push(Contour {
            vertices,
            segments,
            closed: close,
        });
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sketch/svg.rs"]
mod tests;
