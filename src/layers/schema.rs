use std::fmt;

use serde_json::Value;

use super::{LayerDesc, LayerKind};
use crate::carriers::CarrierConfig;
use crate::foundation::core::NodeId;
use crate::foundation::error::KnitError;
use crate::sketch::{NodeKind, Scene};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    Number,
    String,
    Boolean,
    Enum(&'static [&'static str]),
    /// Id of an image node.
    Image,
    /// Object mapping symbols to program codes.
    Mapping,
    /// Id of any scene node.
    Reference,
    /// Name of a carrier device.
    Yarn,
    /// Bitmask over carrier devices, or a list of device names.
    YarnMask,
}

#[derive(Clone, Copy, Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ParamType,
    pub required: bool,
}

const fn p(name: &'static str, ty: ParamType, required: bool) -> ParamSpec {
    ParamSpec { name, ty, required }
}

const PATTERN: &[ParamSpec] = &[
    p("pattern", ParamType::String, true),
    p("mapping", ParamType::Mapping, false),
    p("mode", ParamType::Enum(&["tile", "once"]), false),
    p("area", ParamType::Reference, false),
];

const IMAGE: &[ParamSpec] = &[
    p("image", ParamType::Image, true),
    p("threshold", ParamType::Number, false),
    p("dark", ParamType::Number, false),
    p("light", ParamType::Number, false),
    p("area", ParamType::Reference, false),
];

const PROGRAM: &[ParamSpec] = &[
    p("program", ParamType::String, true),
    p("area", ParamType::Reference, false),
];

const YARN: &[ParamSpec] = &[
    p("yarn", ParamType::Yarn, false),
    p("yarnmask", ParamType::YarnMask, false),
    p("where", ParamType::String, false),
    p("enabled", ParamType::Boolean, false),
    p("area", ParamType::Reference, false),
];

pub fn schema_for(kind: LayerKind) -> &'static [ParamSpec] {
    match kind {
        LayerKind::Pattern => PATTERN,
        LayerKind::Image => IMAGE,
        LayerKind::Program => PROGRAM,
        LayerKind::Yarn => YARN,
    }
}

/// Layer parameter problem with a `$.layers[i].params.name` location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ParamError {}

impl From<ParamError> for KnitError {
    fn from(e: ParamError) -> Self {
        KnitError::validation(e.to_string())
    }
}

/// Check a layer's parameters against its schema and the scene it lives in.
pub fn validate_layer(
    desc: &LayerDesc,
    index: usize,
    scene: &Scene,
    carriers: &CarrierConfig,
) -> Result<(), ParamError> {
    let base = format!("$.layers[{index}].params");
    let err = |name: &str, message: String| ParamError {
        path: format!("{base}.{name}"),
        message,
    };
    let spec = schema_for(desc.kind);
    for name in desc.params.keys() {
        if !spec.iter().any(|s| s.name == name) {
            return Err(err(
                name,
                format!("unknown parameter for a {} layer", desc.kind.name()),
            ));
        }
    }
    for s in spec {
        let Some(value) = desc.params.get(s.name) else {
            if s.required {
                return Err(err(s.name, "missing required parameter".to_string()));
            }
            continue;
        };
        check_value(s.ty, value, scene, carriers).map_err(|m| err(s.name, m))?;
    }
    if desc.kind == LayerKind::Yarn
        && !desc.params.contains_key("yarn")
        && !desc.params.contains_key("yarnmask")
    {
        return Err(ParamError {
            path: base,
            message: "a yarn layer needs 'yarn' or 'yarnmask'".to_string(),
        });
    }
    Ok(())
}

fn check_value(
    ty: ParamType,
    value: &Value,
    scene: &Scene,
    carriers: &CarrierConfig,
) -> Result<(), String> {
    match ty {
        ParamType::Number => value
            .as_f64()
            .filter(|v| v.is_finite())
            .map(|_| ())
            .ok_or_else(|| "expected a finite number".to_string()),
        ParamType::String => value
            .as_str()
            .map(|_| ())
            .ok_or_else(|| "expected a string".to_string()),
        ParamType::Boolean => value
            .as_bool()
            .map(|_| ())
            .ok_or_else(|| "expected a boolean".to_string()),
        ParamType::Enum(options) => match value.as_str() {
            Some(s) if options.contains(&s) => Ok(()),
            _ => Err(format!("expected one of {options:?}")),
        },
        ParamType::Image => {
            let id = node_ref(value)?;
            match scene.node(id).map(|n| &n.kind) {
                Some(NodeKind::Image(_)) => Ok(()),
                Some(other) => Err(format!("node {id} is a {}, not an image", other.name())),
                None => Err(format!("unknown node {id}")),
            }
        }
        ParamType::Reference => {
            let id = node_ref(value)?;
            scene
                .node(id)
                .map(|_| ())
                .ok_or_else(|| format!("unknown node {id}"))
        }
        ParamType::Mapping => {
            let obj = value
                .as_object()
                .ok_or_else(|| "expected an object".to_string())?;
            for (k, v) in obj {
                if k.chars().count() != 1 {
                    return Err(format!("mapping key '{k}' must be a single character"));
                }
                match v.as_u64() {
                    Some(code) if code <= u64::from(u8::MAX) => {}
                    _ => return Err(format!("mapping value for '{k}' must be a program code")),
                }
            }
            Ok(())
        }
        ParamType::Yarn => {
            let name = value
                .as_str()
                .ok_or_else(|| "expected a carrier device name".to_string())?;
            carriers
                .by_name(name)
                .map(|_| ())
                .ok_or_else(|| format!("unknown carrier device '{name}'"))
        }
        ParamType::YarnMask => yarn_mask(value, carriers).map(|_| ()),
    }
}

pub(crate) fn node_ref(value: &Value) -> Result<NodeId, String> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .map(NodeId)
        .ok_or_else(|| "expected a node id".to_string())
}

/// Resolve a yarn mask parameter into a device bitmask.
pub(crate) fn yarn_mask(value: &Value, carriers: &CarrierConfig) -> Result<u32, String> {
    if let Some(v) = value.as_u64() {
        let limit = 1u64 << carriers.devices().len().min(32);
        if v == 0 || v >= limit {
            return Err(format!("yarn mask {v} selects no valid device"));
        }
        return Ok(v as u32);
    }
    let names = value
        .as_array()
        .ok_or_else(|| "expected a bitmask or a list of device names".to_string())?;
    let mut mask = 0u32;
    for n in names {
        let name = n
            .as_str()
            .ok_or_else(|| "device names must be strings".to_string())?;
        let i = carriers
            .device_index(name)
            .filter(|&i| i < 32)
            .ok_or_else(|| format!("unknown carrier device '{name}'"))?;
        mask |= 1 << i;
    }
    if mask == 0 {
        return Err("yarn mask selects no device".to_string());
    }
    Ok(mask)
}

#[cfg(test)]
#[path = "../../tests/unit/layers/schema.rs"]
mod tests;
