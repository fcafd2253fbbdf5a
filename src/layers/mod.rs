//! Sketch layers: per-stitch program codes and yarn masks attached to a sketch.

pub mod apply;
pub mod expr;
pub mod schema;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use apply::{CompiledLayer, ImageCache, LayerContext, LayerOutput, StitchQuery};
pub use schema::{ParamError, ParamSpec, ParamType, schema_for, validate_layer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Pattern,
    Image,
    Program,
    Yarn,
}

impl LayerKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Image => "image",
            Self::Program => "program",
            Self::Yarn => "yarn",
        }
    }
}

/// A layer as stored in the scene: its kind plus raw JSON parameters checked against the
/// kind's schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerDesc {
    pub kind: LayerKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl LayerDesc {
    pub fn new(kind: LayerKind) -> Self {
        Self {
            kind,
            name: String::new(),
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: serde_json::Value) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }
}

/// Operation requested for a stitch, stored as a small program code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StitchCode {
    #[default]
    Knit = 0,
    Purl = 1,
    Tuck = 2,
    Miss = 3,
}

impl StitchCode {
    pub const ALL: [StitchCode; 4] = [Self::Knit, Self::Purl, Self::Tuck, Self::Miss];

    /// Unknown codes fall back to a plain knit.
    pub fn from_code(code: u8) -> Self {
        Self::ALL.get(usize::from(code)).copied().unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Knit => "knit",
            Self::Purl => "purl",
            Self::Tuck => "tuck",
            Self::Miss => "miss",
        }
    }
}
