use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use image::GrayImage;
use serde_json::Value;

use super::expr::{Env, Expr, eval, parse_expr};
use super::schema::{node_ref, validate_layer, yarn_mask};
use super::{LayerDesc, LayerKind, StitchCode};
use crate::carriers::CarrierConfig;
use crate::foundation::core::{Affine, NodeId, Point, point_in_polygon};
use crate::foundation::error::{KnitError, KnitResult};
use crate::sketch::{NodeKind, Scene, flatten_contour};

/// Decoded rasters of image nodes, keyed by node id.
#[derive(Clone, Debug, Default)]
pub struct ImageCache {
    images: HashMap<NodeId, Arc<GrayImage>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId, image: GrayImage) {
        self.images.insert(id, Arc::new(image));
    }

    pub fn get(&self, id: NodeId) -> Option<&Arc<GrayImage>> {
        self.images.get(&id)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Decode an encoded raster (png or jpeg) as luma.
    pub fn decode(&mut self, id: NodeId, bytes: &[u8]) -> KnitResult<()> {
        let img = image::load_from_memory(bytes).context("decode image from memory")?;
        self.insert(id, img.to_luma8());
        Ok(())
    }

    /// Load every image node of `scene` referenced by a layer, resolving `src` against `base`.
    #[tracing::instrument(skip(scene))]
    pub fn preload(scene: &Scene, base: &Path) -> KnitResult<Self> {
        let mut cache = Self::new();
        for id in referenced_images(scene) {
            let Some(NodeKind::Image(data)) = scene.node(id).map(|n| &n.kind) else {
                continue;
            };
            let path = base.join(&data.src);
            let bytes = std::fs::read(&path)
                .with_context(|| format!("read image '{}'", path.display()))?;
            cache.decode(id, &bytes)?;
            tracing::debug!(node = id.0, path = %path.display(), "image decoded");
        }
        Ok(cache)
    }
}

/// Image nodes named by an `image` parameter anywhere in the scene.
pub fn referenced_images(scene: &Scene) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = scene
        .nodes()
        .filter_map(|n| n.sketch())
        .flat_map(|s| s.layers.iter())
        .filter(|l| l.kind == LayerKind::Image)
        .filter_map(|l| l.params.get("image").and_then(|v| node_ref(v).ok()))
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Everything a layer needs from its surroundings to compile.
pub struct LayerContext<'a> {
    pub scene: &'a Scene,
    pub carriers: &'a CarrierConfig,
    pub images: &'a ImageCache,
    /// Scene units to millimetres.
    pub to_mm: Affine,
}

/// Where a stitch sits, in global millimetres and in its course/wale grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StitchQuery {
    pub pos: Point,
    pub row: usize,
    pub col: usize,
    pub index: usize,
}

/// Mutation a layer applies to one stitch; `None` leaves the current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayerOutput {
    pub program: Option<u8>,
    pub yarn_mask: Option<u32>,
}

#[derive(Clone, Debug)]
enum LayerFn {
    Pattern {
        /// Rows bottom-up; `None` cells are transparent.
        grid: Vec<Vec<Option<u8>>>,
        tile: bool,
    },
    Image {
        image: Arc<GrayImage>,
        /// Global millimetres to the image's local rectangle.
        inverse: Affine,
        width: f64,
        height: f64,
        threshold: u8,
        dark: Option<u8>,
        light: Option<u8>,
    },
    Program(Expr),
    Yarn {
        mask: u32,
        filter: Option<Expr>,
    },
}

/// A validated layer ready to be queried per stitch.
#[derive(Clone, Debug)]
pub struct CompiledLayer {
    pub name: String,
    area: Option<Vec<Point>>,
    func: LayerFn,
}

impl CompiledLayer {
    /// Validate and prepare layer `index` of a sketch; disabled layers yield `None`.
    pub fn compile(desc: &LayerDesc, index: usize, ctx: &LayerContext<'_>) -> KnitResult<Option<Self>> {
        validate_layer(desc, index, ctx.scene, ctx.carriers)?;
        let path = |name: &str| format!("$.layers[{index}].params.{name}");
        let area = match desc.params.get("area") {
            Some(v) => Some(area_polygon(ctx, node_ref(v).map_err(KnitError::validation)?)?),
            None => None,
        };
        let func = match desc.kind {
            LayerKind::Pattern => {
                let text = str_param(desc, "pattern");
                let mapping = desc.params.get("mapping").and_then(Value::as_object);
                let mut grid = Vec::new();
                for line in text.lines().rev() {
                    let mut row = Vec::new();
                    for ch in line.chars() {
                        row.push(pattern_symbol(ch, mapping).ok_or_else(|| {
                            KnitError::validation(format!(
                                "{}: unknown pattern symbol '{ch}'",
                                path("pattern")
                            ))
                        })?);
                    }
                    grid.push(row);
                }
                if grid.iter().all(|r| r.is_empty()) {
                    return Err(KnitError::validation(format!("{}: empty pattern", path("pattern"))));
                }
                let tile = desc.params.get("mode").and_then(Value::as_str) != Some("once");
                LayerFn::Pattern { grid, tile }
            }
            LayerKind::Image => {
                let id = desc
                    .params
                    .get("image")
                    .map(node_ref)
                    .transpose()
                    .map_err(KnitError::validation)?
                    .ok_or_else(|| KnitError::validation(path("image")))?;
                let Some(NodeKind::Image(data)) = ctx.scene.node(id).map(|n| &n.kind) else {
                    return Err(KnitError::validation(format!("{}: not an image", path("image"))));
                };
                let image = ctx.images.get(id).cloned().ok_or_else(|| {
                    KnitError::validation(format!("{}: image {id} is not loaded", path("image")))
                })?;
                let inverse = (ctx.to_mm * ctx.scene.global_transform(id)).inverse();
                let code = |name: &str, default: Option<u8>| {
                    desc.params
                        .get(name)
                        .and_then(Value::as_f64)
                        .map(|v| v.round().clamp(0.0, 255.0) as u8)
                        .or(default)
                };
                LayerFn::Image {
                    image,
                    inverse,
                    width: data.width,
                    height: data.height,
                    threshold: code("threshold", Some(128)).unwrap_or(128),
                    dark: code("dark", Some(StitchCode::Purl as u8)),
                    light: code("light", None),
                }
            }
            LayerKind::Program => {
                let expr = parse_expr(str_param(desc, "program")).map_err(|e| {
                    KnitError::validation(format!("{}: {e}", path("program")))
                })?;
                LayerFn::Program(expr)
            }
            LayerKind::Yarn => {
                if desc.params.get("enabled").and_then(Value::as_bool) == Some(false) {
                    return Ok(None);
                }
                let mask = match (desc.params.get("yarnmask"), desc.params.get("yarn")) {
                    (Some(v), _) => yarn_mask(v, ctx.carriers),
                    (None, Some(v)) => yarn_mask(&Value::Array(vec![v.clone()]), ctx.carriers),
                    (None, None) => Err("no carrier selected".to_string()),
                }
                .map_err(|m| KnitError::validation(format!("{}: {m}", path("yarn"))))?;
                let filter = desc
                    .params
                    .get("where")
                    .and_then(Value::as_str)
                    .map(parse_expr)
                    .transpose()
                    .map_err(|e| KnitError::validation(format!("{}: {e}", path("where"))))?;
                LayerFn::Yarn { mask, filter }
            }
        };
        Ok(Some(Self {
            name: desc.name.clone(),
            area,
            func,
        }))
    }

    pub fn kind(&self) -> LayerKind {
        match self.func {
            LayerFn::Pattern { .. } => LayerKind::Pattern,
            LayerFn::Image { .. } => LayerKind::Image,
            LayerFn::Program(_) => LayerKind::Program,
            LayerFn::Yarn { .. } => LayerKind::Yarn,
        }
    }

    /// Evaluate the layer at one stitch.
    pub fn query(&self, q: &StitchQuery) -> KnitResult<LayerOutput> {
        if let Some(area) = &self.area
            && !point_in_polygon(q.pos, area)
        {
            return Ok(LayerOutput::default());
        }
        match &self.func {
            LayerFn::Pattern { grid, tile } => {
                let h = grid.len();
                if !tile && q.row >= h {
                    return Ok(LayerOutput::default());
                }
                let row = &grid[q.row % h];
                if row.is_empty() || (!tile && q.col >= row.len()) {
                    return Ok(LayerOutput::default());
                }
                Ok(LayerOutput {
                    program: row[q.col % row.len()],
                    yarn_mask: None,
                })
            }
            LayerFn::Image {
                image,
                inverse,
                width,
                height,
                threshold,
                dark,
                light,
            } => {
                let local = *inverse * q.pos;
                if !(0.0..*width).contains(&local.x) || !(0.0..*height).contains(&local.y) {
                    return Ok(LayerOutput::default());
                }
                let (iw, ih) = image.dimensions();
                if iw == 0 || ih == 0 {
                    return Ok(LayerOutput::default());
                }
                let px = ((local.x / width) * f64::from(iw)).floor() as u32;
                // Rasters are stored top-down while sketches are y-up.
                let py = ((1.0 - local.y / height) * f64::from(ih)).floor() as u32;
                let luma = image.get_pixel(px.min(iw - 1), py.min(ih - 1)).0[0];
                let program = if luma < *threshold { *dark } else { *light };
                Ok(LayerOutput {
                    program,
                    yarn_mask: None,
                })
            }
            LayerFn::Program(expr) => {
                let v = eval(expr, &stitch_env(q))?;
                if !v.is_finite() {
                    return Err(KnitError::validation(format!(
                        "program produced {v} at stitch {}",
                        q.index
                    )));
                }
                Ok(LayerOutput {
                    program: Some(v.round().clamp(0.0, 255.0) as u8),
                    yarn_mask: None,
                })
            }
            LayerFn::Yarn { mask, filter } => {
                if let Some(f) = filter
                    && eval(f, &stitch_env(q))? == 0.0
                {
                    return Ok(LayerOutput::default());
                }
                Ok(LayerOutput {
                    program: None,
                    yarn_mask: Some(*mask),
                })
            }
        }
    }
}

fn str_param<'d>(desc: &'d LayerDesc, name: &str) -> &'d str {
    desc.params.get(name).and_then(Value::as_str).unwrap_or("")
}

fn stitch_env(q: &StitchQuery) -> Env {
    let mut env = Env::new();
    env.set("x", q.pos.x);
    env.set("y", q.pos.y);
    env.set("row", q.row as f64);
    env.set("col", q.col as f64);
    env.set("index", q.index as f64);
    env
}

/// Default symbols: digits are raw codes, letters name operations, `.` and space are
/// transparent. A mapping overrides or extends them.
fn pattern_symbol(ch: char, mapping: Option<&serde_json::Map<String, Value>>) -> Option<Option<u8>> {
    if let Some(code) = mapping
        .and_then(|m| m.get(&ch.to_string()))
        .and_then(Value::as_u64)
    {
        return u8::try_from(code).ok().map(Some);
    }
    Some(match ch {
        '.' | ' ' => None,
        'k' | 'K' => Some(StitchCode::Knit as u8),
        'p' | 'P' => Some(StitchCode::Purl as u8),
        't' | 'T' => Some(StitchCode::Tuck as u8),
        'm' | 'M' => Some(StitchCode::Miss as u8),
        d if d.is_ascii_digit() => Some(d as u8 - b'0'),
        _ => return None,
    })
}

/// Polygon in global millimetres covered by an area reference.
fn area_polygon(ctx: &LayerContext<'_>, id: NodeId) -> KnitResult<Vec<Point>> {
    let node = ctx
        .scene
        .node(id)
        .ok_or_else(|| KnitError::validation(format!("unknown area node {id}")))?;
    let xf = ctx.to_mm * ctx.scene.global_transform(id);
    match &node.kind {
        NodeKind::Sketch(s) => Ok(flatten_contour(&s.contour, xf, 1.0)),
        NodeKind::Curve { contour } if contour.closed => Ok(flatten_contour(contour, xf, 1.0)),
        NodeKind::Rect { width, height } => Ok([
            Point::new(0.0, 0.0),
            Point::new(*width, 0.0),
            Point::new(*width, *height),
            Point::new(0.0, *height),
        ]
        .into_iter()
        .map(|p| xf * p)
        .collect()),
        other => Err(KnitError::validation(format!(
            "area node {id} is a {} without a closed outline",
            other.name()
        ))),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layers/apply.rs"]
mod tests;
