//! Scene editing operations. Every operation keeps the arena invariants: parent and child
//! lists agree, links are referenced from both of their segments, and constraints only target
//! curves owned by the constraining sketch.

use smallvec::SmallVec;

use super::geometry::{SegCurve, segment_curve};
use super::model::{
    Constraint, ConstraintKind, ConstraintTarget, ConstraintWeight, Contour,
    ImageData, Link, Node, NodeKind, PCurveData, SeamMode, SegmentRef, SketchData, Transmission,
};
use super::scene::Scene;
use crate::foundation::core::{Affine, LinkId, NodeId, Point, signed_area};
use crate::foundation::error::{KnitError, KnitResult};
use crate::layers::LayerDesc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Scene {
    /// Insert a node under `parent` (or as a root) and return its id.
    pub fn add_node(&mut self, kind: NodeKind, parent: Option<NodeId>) -> KnitResult<NodeId> {
        if let Some(p) = parent {
            self.require(p)?;
        }
        let id = self.alloc_node_id();
        self.nodes.insert(
            id,
            Node {
                id,
                name: String::new(),
                transform: Affine::IDENTITY,
                parent,
                children: Vec::new(),
                kind,
            },
        );
        if let Some(p) = parent {
            self.node_mut(p)?.children.push(id);
        }
        Ok(id)
    }

    pub fn create_sketch(&mut self, points: &[Point]) -> KnitResult<NodeId> {
        if points.len() < 3 {
            return Err(KnitError::scene("a sketch needs at least three vertices"));
        }
        self.add_node(
            NodeKind::Sketch(SketchData {
                contour: Contour::polygon(points),
                ..SketchData::default()
            }),
            None,
        )
    }

    pub fn create_curve(
        &mut self,
        points: &[Point],
        closed: bool,
        parent: Option<NodeId>,
    ) -> KnitResult<NodeId> {
        if points.len() < 2 {
            return Err(KnitError::scene("a curve needs at least two vertices"));
        }
        let contour = if closed {
            Contour::polygon(points)
        } else {
            Contour::polyline(points)
        };
        self.add_node(NodeKind::Curve { contour }, parent)
    }

    pub fn create_pcurve(&mut self, degree: u8, parent: Option<NodeId>) -> KnitResult<NodeId> {
        if !(1..=3).contains(&degree) {
            return Err(KnitError::scene(format!("invalid pcurve degree {degree}")));
        }
        self.add_node(
            NodeKind::PCurve(PCurveData {
                degree,
                samples: [None; 4],
            }),
            parent,
        )
    }

    pub fn create_image(&mut self, data: ImageData, parent: Option<NodeId>) -> KnitResult<NodeId> {
        self.add_node(NodeKind::Image(data), parent)
    }

    pub fn create_anchor(&mut self, at: Point, parent: Option<NodeId>) -> KnitResult<NodeId> {
        let id = self.add_node(NodeKind::Anchor, parent)?;
        self.node_mut(id)?.transform = Affine::translate(at.to_vec2());
        Ok(id)
    }

    pub fn create_rect(
        &mut self,
        width: f64,
        height: f64,
        parent: Option<NodeId>,
    ) -> KnitResult<NodeId> {
        self.add_node(NodeKind::Rect { width, height }, parent)
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> KnitResult<()> {
        self.node_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Affine) -> KnitResult<()> {
        self.node_mut(id)?.transform = transform;
        Ok(())
    }

    /// Delete a node and its subtree, dropping links, constraints and samples that referenced
    /// any removed node.
    pub fn delete_node(&mut self, id: NodeId) -> KnitResult<()> {
        let parent = self.require(id)?.parent;
        let doomed = self.subtree(id);
        for &d in &doomed {
            let linked: Vec<LinkId> = self
                .links
                .values()
                .filter(|l| l.touches(d))
                .map(|l| l.id)
                .collect();
            for l in linked {
                self.remove_link(l)?;
            }
        }
        for d in &doomed {
            self.nodes.remove(d);
        }
        if let Some(p) = parent {
            if let Some(pn) = self.nodes.get_mut(&p) {
                pn.children.retain(|c| *c != id);
            }
        }
        for node in self.nodes.values_mut() {
            match &mut node.kind {
                NodeKind::Sketch(s) => s.constraints.retain(|c| match c.target {
                    ConstraintTarget::Curve(cid) => !doomed.contains(&cid),
                    ConstraintTarget::Segment(_) => true,
                }),
                NodeKind::PCurve(p) => {
                    for slot in &mut p.samples {
                        if slot.is_some_and(|s| doomed.contains(&s.curve)) {
                            *slot = None;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Re-parent `child` under `parent`, keeping its global placement.
    pub fn set_parent(&mut self, child: NodeId, parent: NodeId) -> KnitResult<()> {
        self.require(parent)?;
        if self.is_ancestor(child, parent) {
            return Err(KnitError::scene(format!(
                "cannot parent {child} under its own descendant {parent}"
            )));
        }
        let global = self.global_transform(child);
        self.detach(child)?;
        let parent_global = self.global_transform(parent);
        let node = self.node_mut(child)?;
        node.parent = Some(parent);
        node.transform = parent_global.inverse() * global;
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Turn `child` into a root, keeping its global placement.
    pub fn unparent(&mut self, child: NodeId) -> KnitResult<()> {
        let global = self.global_transform(child);
        self.detach(child)?;
        let node = self.node_mut(child)?;
        node.parent = None;
        node.transform = global;
        Ok(())
    }

    fn detach(&mut self, child: NodeId) -> KnitResult<()> {
        let old = self.require(child)?.parent;
        if let Some(p) = old {
            self.node_mut(p)?.children.retain(|c| *c != child);
            // A constraint on a curve only makes sense under its own sketch.
            if let Some(s) = self.node_mut(p)?.sketch_mut() {
                s.constraints
                    .retain(|c| c.target != ConstraintTarget::Curve(child));
            }
        }
        Ok(())
    }

    /// Commit the local transform into the node geometry and reset it to identity.
    ///
    /// Children are pre-multiplied so their global placement does not move.
    pub fn apply_scale(&mut self, id: NodeId) -> KnitResult<()> {
        let xf = self.require(id)?.transform;
        let node = self.node_mut(id)?;
        match &mut node.kind {
            NodeKind::Sketch(SketchData { contour, .. }) | NodeKind::Curve { contour } => {
                transform_contour(contour, xf);
            }
            NodeKind::Rect { width, height } => {
                let c = xf.as_coeffs();
                if c[1].abs() > 1e-12 || c[2].abs() > 1e-12 {
                    return Err(KnitError::scene("cannot commit a rotation into a rect"));
                }
                *width *= c[0].abs();
                *height *= c[3].abs();
                node.transform = Affine::translate(xf.translation());
                return Ok(());
            }
            other => {
                return Err(KnitError::scene(format!(
                    "cannot apply a transform to a {} node",
                    other.name()
                )));
            }
        }
        node.transform = Affine::IDENTITY;
        let children = node.children.clone();
        for c in children {
            let cn = self.node_mut(c)?;
            cn.transform = xf * cn.transform;
        }
        Ok(())
    }

    /// Mirror a sketch or curve about its local bounding-box centre.
    ///
    /// Mirroring reverses the orientation of the contour, so every link touching a mirrored
    /// sketch has its `mirror` flag toggled.
    pub fn mirror(&mut self, id: NodeId, axis: Axis) -> KnitResult<()> {
        let node = self.node_mut(id)?;
        let contour = node.contour_mut().ok_or_else(|| {
            KnitError::scene(format!("node {id} has no contour to mirror"))
        })?;
        let (lo, hi) = contour.vertices.iter().fold(
            (Point::new(f64::MAX, f64::MAX), Point::new(f64::MIN, f64::MIN)),
            |(lo, hi), p| {
                (
                    Point::new(lo.x.min(p.x), lo.y.min(p.y)),
                    Point::new(hi.x.max(p.x), hi.y.max(p.y)),
                )
            },
        );
        let c = lo.midpoint(hi).to_vec2();
        let flip = match axis {
            Axis::X => Affine::new([-1.0, 0.0, 0.0, 1.0, 0.0, 0.0]),
            Axis::Y => Affine::new([1.0, 0.0, 0.0, -1.0, 0.0, 0.0]),
        };
        let xf = Affine::translate(c) * flip * Affine::translate(-c);
        transform_contour(contour, xf);
        let children = node.children.clone();
        for ch in children {
            let cn = self.node_mut(ch)?;
            cn.transform = xf * cn.transform;
        }
        for link in self.links.values_mut().filter(|l| l.touches(id)) {
            link.mirror = !link.mirror;
        }
        Ok(())
    }

    pub fn mirror_x(&mut self, id: NodeId) -> KnitResult<()> {
        self.mirror(id, Axis::X)
    }

    pub fn mirror_y(&mut self, id: NodeId) -> KnitResult<()> {
        self.mirror(id, Axis::Y)
    }

    fn segment_mut(&mut self, seg: SegmentRef) -> KnitResult<&mut super::model::Segment> {
        self.node_mut(seg.sketch)?
            .contour_mut()
            .and_then(|c| c.segments.get_mut(seg.segment))
            .ok_or_else(|| {
                KnitError::scene(format!(
                    "node {} has no segment {}",
                    seg.sketch, seg.segment
                ))
            })
    }

    fn require_sketch_segment(&self, seg: SegmentRef) -> KnitResult<()> {
        let node = self.require(seg.sketch)?;
        let sketch = node
            .sketch()
            .ok_or_else(|| KnitError::scene(format!("node {} is not a sketch", seg.sketch)))?;
        if seg.segment >= sketch.contour.segment_count() {
            return Err(KnitError::scene(format!(
                "sketch {} has no segment {}",
                seg.sketch, seg.segment
            )));
        }
        Ok(())
    }

    /// Link two segments of different sketches, replacing existing links on either side.
    ///
    /// The mirror flag is derived here, once: sketches of equal orientation traverse a shared
    /// edge in opposite directions and need no mirroring.
    pub fn set_link(
        &mut self,
        a: SegmentRef,
        b: SegmentRef,
        transmission: Transmission,
    ) -> KnitResult<LinkId> {
        self.require_sketch_segment(a)?;
        self.require_sketch_segment(b)?;
        if a.sketch == b.sketch {
            return Err(KnitError::scene("cannot link a sketch to itself"));
        }
        self.clear_link(a)?;
        self.clear_link(b)?;
        let mirror = self.orientation(a.sketch) != self.orientation(b.sketch);
        let id = self.alloc_link_id();
        self.links.insert(
            id,
            Link {
                id,
                a,
                b,
                transmission,
                mirror,
            },
        );
        self.segment_mut(a)?.link = Some(id);
        self.segment_mut(b)?.link = Some(id);
        Ok(id)
    }

    fn orientation(&self, sketch: NodeId) -> bool {
        let Some(contour) = self.node(sketch).and_then(|n| n.contour()) else {
            return true;
        };
        let xf = self.global_transform(sketch);
        let pts: Vec<Point> = contour.vertices.iter().map(|p| xf * *p).collect();
        signed_area(&pts) >= 0.0
    }

    /// Remove the link on a segment, from both of its ends.
    pub fn clear_link(&mut self, seg: SegmentRef) -> KnitResult<()> {
        let Some(id) = self.link_at(seg).map(|l| l.id) else {
            return Ok(());
        };
        self.remove_link(id)
    }

    fn remove_link(&mut self, id: LinkId) -> KnitResult<()> {
        let Some(link) = self.links.remove(&id) else {
            return Ok(());
        };
        for side in [link.a, link.b] {
            if let Ok(seg) = self.segment_mut(side) {
                if seg.link == Some(id) {
                    seg.link = None;
                }
            }
        }
        Ok(())
    }

    pub fn set_link_mirror(&mut self, id: LinkId, mirror: bool) -> KnitResult<()> {
        let link = self
            .links
            .get_mut(&id)
            .ok_or_else(|| KnitError::scene(format!("unknown link {}", id.0)))?;
        link.mirror = mirror;
        Ok(())
    }

    pub fn set_transmission(&mut self, seg: SegmentRef, transmission: Transmission) -> KnitResult<()> {
        let id = self
            .link_at(seg)
            .map(|l| l.id)
            .ok_or_else(|| KnitError::scene("segment has no link"))?;
        if let Some(link) = self.links.get_mut(&id) {
            link.transmission = transmission;
        }
        Ok(())
    }

    pub fn set_seam_mode(&mut self, seg: SegmentRef, mode: SeamMode) -> KnitResult<()> {
        self.segment_mut(seg)?.seam = mode;
        Ok(())
    }

    /// Change a segment's degree, inserting or dropping control points.
    pub fn set_degree(&mut self, seg: SegmentRef, degree: usize) -> KnitResult<()> {
        if !(1..=3).contains(&degree) {
            return Err(KnitError::scene(format!("invalid segment degree {degree}")));
        }
        let node = self.node_mut(seg.sketch)?;
        let contour = node
            .contour_mut()
            .ok_or_else(|| KnitError::scene("node has no contour"))?;
        if seg.segment >= contour.segment_count() {
            return Err(KnitError::scene(format!("no segment {}", seg.segment)));
        }
        let (p0, p1) = contour.endpoints(seg.segment);
        let current = segment_curve(contour, seg.segment);
        let controls: SmallVec<[Point; 2]> = match degree {
            1 => SmallVec::new(),
            2 => match current {
                SegCurve::Cubic(c) => SmallVec::from_slice(&[c.p1.midpoint(c.p2)]),
                SegCurve::Quad(q) => SmallVec::from_slice(&[q.p1]),
                SegCurve::Line(_) => SmallVec::from_slice(&[p0.midpoint(p1)]),
            },
            _ => match current {
                SegCurve::Cubic(c) => SmallVec::from_slice(&[c.p1, c.p2]),
                SegCurve::Quad(q) => {
                    // Exact degree elevation.
                    let c1 = p0 + (q.p1 - p0) * (2.0 / 3.0);
                    let c2 = p1 + (q.p1 - p1) * (2.0 / 3.0);
                    SmallVec::from_slice(&[c1, c2])
                }
                SegCurve::Line(_) => {
                    SmallVec::from_slice(&[p0.lerp(p1, 1.0 / 3.0), p0.lerp(p1, 2.0 / 3.0)])
                }
            },
        };
        contour.segments[seg.segment].controls = controls;
        Ok(())
    }

    /// Split a segment at parameter `t`. A linked segment is split at the corresponding
    /// parameter and the link is replaced by two links over matching halves.
    pub fn divide_segment(&mut self, seg: SegmentRef, t: f64) -> KnitResult<()> {
        if !(1e-6..=1.0 - 1e-6).contains(&t) {
            return Err(KnitError::scene("division parameter must be inside (0, 1)"));
        }
        let link = self.link_at(seg).copied();
        if let Some(l) = link {
            self.remove_link(l.id)?;
        }
        self.split_segment_raw(seg, t)?;
        let Some(l) = link else {
            return Ok(());
        };
        let other = l.other(seg).ok_or_else(|| KnitError::scene("corrupt link"))?;
        self.split_segment_raw(other, l.map_param(t))?;
        // First half of `seg` covers [0, t]; across an unmirrored link that is the second half
        // of the other segment.
        let (first, second) = (
            SegmentRef::new(seg.sketch, seg.segment),
            SegmentRef::new(seg.sketch, seg.segment + 1),
        );
        let (o_first, o_second) = (
            SegmentRef::new(other.sketch, other.segment),
            SegmentRef::new(other.sketch, other.segment + 1),
        );
        let pairs = if l.mirror {
            [(first, o_first), (second, o_second)]
        } else {
            [(first, o_second), (second, o_first)]
        };
        for (x, y) in pairs {
            let (a, b) = if seg == l.a { (x, y) } else { (y, x) };
            let id = self.alloc_link_id();
            self.links.insert(
                id,
                Link {
                    id,
                    a,
                    b,
                    transmission: l.transmission,
                    mirror: l.mirror,
                },
            );
            self.segment_mut(a)?.link = Some(id);
            self.segment_mut(b)?.link = Some(id);
        }
        Ok(())
    }

    /// Insert a vertex inside a segment and shift every reference to later segments.
    fn split_segment_raw(&mut self, seg: SegmentRef, t: f64) -> KnitResult<()> {
        let node = self.node_mut(seg.sketch)?;
        let contour = node
            .contour_mut()
            .ok_or_else(|| KnitError::scene("node has no contour"))?;
        if seg.segment >= contour.segment_count() {
            return Err(KnitError::scene(format!("no segment {}", seg.segment)));
        }
        let curve = segment_curve(contour, seg.segment);
        let (left, right) = curve.split(t);
        let original = contour.segments[seg.segment].clone();
        let mid = right.start();
        contour.segments[seg.segment].controls = SmallVec::from_vec(left.controls());
        let mut tail = original;
        tail.controls = SmallVec::from_vec(right.controls());
        tail.link = None;
        contour.segments.insert(seg.segment + 1, tail);
        contour.vertices.insert(seg.segment + 1, mid);

        if let Some(s) = node.sketch_mut() {
            for c in &mut s.constraints {
                if let ConstraintTarget::Segment(i) = &mut c.target {
                    if *i > seg.segment {
                        *i += 1;
                    }
                }
            }
        }
        for link in self.links.values_mut() {
            for side in [&mut link.a, &mut link.b] {
                if side.sketch == seg.sketch && side.segment > seg.segment {
                    side.segment += 1;
                }
            }
        }
        for node in self.nodes.values_mut() {
            if let NodeKind::PCurve(p) = &mut node.kind {
                for sample in p.samples.iter_mut().flatten() {
                    if sample.curve == seg.sketch && sample.seg > seg.segment {
                        sample.seg += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Mark a child curve (or one of the sketch's own segments) as a flow constraint,
    /// replacing any constraint on the same target.
    pub fn set_constraint(
        &mut self,
        sketch: NodeId,
        target: ConstraintTarget,
        kind: ConstraintKind,
        dir: i8,
        weight: ConstraintWeight,
    ) -> KnitResult<()> {
        if dir != 1 && dir != -1 {
            return Err(KnitError::scene("constraint direction must be +1 or -1"));
        }
        match target {
            ConstraintTarget::Curve(cid) => {
                let curve = self.require(cid)?;
                if curve.parent != Some(sketch) {
                    return Err(KnitError::scene(format!(
                        "curve {cid} is not a child of sketch {sketch}"
                    )));
                }
                if !matches!(curve.kind, NodeKind::Curve { .. } | NodeKind::PCurve(_)) {
                    return Err(KnitError::scene(format!("node {cid} is not a curve")));
                }
            }
            ConstraintTarget::Segment(i) => {
                self.require_sketch_segment(SegmentRef::new(sketch, i))?;
            }
        }
        let data = self
            .node_mut(sketch)?
            .sketch_mut()
            .ok_or_else(|| KnitError::scene(format!("node {sketch} is not a sketch")))?;
        data.constraints.retain(|c| c.target != target);
        data.constraints.push(Constraint {
            target,
            kind,
            dir,
            weight,
        });
        Ok(())
    }

    pub fn clear_constraint(&mut self, sketch: NodeId, target: ConstraintTarget) -> KnitResult<()> {
        if let Some(data) = self.node_mut(sketch)?.sketch_mut() {
            data.constraints.retain(|c| c.target != target);
        }
        Ok(())
    }

    /// Append a layer to a sketch's stack and return its index. Parameters are checked when
    /// the layer is compiled, since they may name nodes created later.
    pub fn add_layer(&mut self, sketch: NodeId, layer: LayerDesc) -> KnitResult<usize> {
        let data = self
            .node_mut(sketch)?
            .sketch_mut()
            .ok_or_else(|| KnitError::scene(format!("node {sketch} is not a sketch")))?;
        data.layers.push(layer);
        Ok(data.layers.len() - 1)
    }

    pub fn remove_layer(&mut self, sketch: NodeId, index: usize) -> KnitResult<LayerDesc> {
        let data = self
            .node_mut(sketch)?
            .sketch_mut()
            .ok_or_else(|| KnitError::scene(format!("node {sketch} is not a sketch")))?;
        if index >= data.layers.len() {
            return Err(KnitError::scene(format!(
                "sketch {sketch} has no layer {index}"
            )));
        }
        Ok(data.layers.remove(index))
    }
}

fn transform_contour(contour: &mut Contour, xf: Affine) {
    for v in &mut contour.vertices {
        *v = xf * *v;
    }
    for s in &mut contour.segments {
        for c in &mut s.controls {
            *c = xf * *c;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sketch/edit.rs"]
mod tests;
