//! Yarn-carrier registry.
//!
//! A configuration maps device names to carrier groups. Each device owns a bitmask derived from
//! its carrier identifiers (`"1"` is bit 0, `"10"` is bit 9).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{KnitError, KnitResult};

/// Carrier identifiers accepted in strict mode, in bit order.
pub const CARRIER_IDS: [&str; 10] = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierType {
    #[default]
    Knit,
    Inlay,
    Elastic,
    Plating,
}

/// One entry of the carrier mapping as written in a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarrierSpec {
    #[serde(rename = "type", default)]
    pub kind: CarrierType,
    #[serde(rename = "DSCS", default)]
    pub dscs: bool,
    pub carriers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Materialized carrier group.
#[derive(Clone, Debug, PartialEq)]
pub struct CarrierDevice {
    pub name: String,
    pub kind: CarrierType,
    pub dscs: bool,
    pub carriers: Vec<String>,
    pub color: Option<String>,
    pub bitmask: u32,
}

impl CarrierDevice {
    fn from_spec(name: &str, spec: &CarrierSpec) -> Self {
        Self {
            name: name.to_string(),
            kind: spec.kind,
            dscs: spec.dscs,
            carriers: spec.carriers.clone(),
            color: spec.color.clone(),
            bitmask: carrier_bitmask(&spec.carriers),
        }
    }

    pub fn to_spec(&self) -> CarrierSpec {
        CarrierSpec {
            kind: self.kind,
            dscs: self.dscs,
            carriers: self.carriers.clone(),
            color: self.color.clone(),
        }
    }
}

/// Bitmask over [`CARRIER_IDS`]; unknown identifiers contribute nothing.
pub fn carrier_bitmask<S: AsRef<str>>(ids: &[S]) -> u32 {
    ids.iter()
        .filter_map(|id| CARRIER_IDS.iter().position(|c| *c == id.as_ref()))
        .fold(0, |m, i| m | (1 << i))
}

/// Serialized form: `{ "default": name, name: { ... }, ... }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CarrierMapping {
    pub default: String,
    #[serde(flatten)]
    pub devices: BTreeMap<String, CarrierSpec>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CarrierConfig {
    default: String,
    devices: Vec<CarrierDevice>,
}

impl Default for CarrierConfig {
    /// One knit device per carrier, named after it, defaulting to `"1"`.
    fn default() -> Self {
        let devices = CARRIER_IDS
            .iter()
            .map(|id| CarrierDevice {
                name: (*id).to_string(),
                kind: CarrierType::Knit,
                dscs: false,
                carriers: vec![(*id).to_string()],
                color: None,
                bitmask: carrier_bitmask(&[*id]),
            })
            .collect();
        Self {
            default: "1".to_string(),
            devices,
        }
    }
}

impl CarrierConfig {
    /// Build from a mapping; `strict` validates colors and carrier membership.
    pub fn from_mapping(mapping: &CarrierMapping, strict: bool) -> KnitResult<Self> {
        if mapping.devices.is_empty() {
            return Err(KnitError::validation("carrier config has no devices"));
        }
        if !mapping.devices.contains_key(&mapping.default) {
            return Err(KnitError::validation(format!(
                "default carrier device '{}' is not defined",
                mapping.default
            )));
        }
        let mut devices = Vec::with_capacity(mapping.devices.len());
        for (name, spec) in &mapping.devices {
            if strict {
                validate_spec(name, spec)?;
            }
            devices.push(CarrierDevice::from_spec(name, spec));
        }
        Ok(Self {
            default: mapping.default.clone(),
            devices,
        })
    }

    pub fn from_json(src: &str, strict: bool) -> KnitResult<Self> {
        let mapping: CarrierMapping = serde_json::from_str(src)?;
        Self::from_mapping(&mapping, strict)
    }

    pub fn to_mapping(&self) -> CarrierMapping {
        CarrierMapping {
            default: self.default.clone(),
            devices: self
                .devices
                .iter()
                .map(|d| (d.name.clone(), d.to_spec()))
                .collect(),
        }
    }

    pub fn devices(&self) -> &[CarrierDevice] {
        &self.devices
    }

    pub fn default_device(&self) -> Option<&CarrierDevice> {
        self.by_name(&self.default)
    }

    pub fn by_name(&self, name: &str) -> Option<&CarrierDevice> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn by_bitmask(&self, mask: u32) -> Option<&CarrierDevice> {
        self.devices.iter().find(|d| d.bitmask == mask)
    }

    /// Device whose carrier list equals `ids` as a set.
    pub fn by_carriers<S: AsRef<str>>(&self, ids: &[S]) -> Option<&CarrierDevice> {
        self.by_bitmask(carrier_bitmask(ids))
    }

    /// Devices addressed by a yarn mask (bit `i` selects device `i`).
    pub fn devices_in_mask(&self, yarn_mask: u32) -> impl Iterator<Item = &CarrierDevice> + '_ {
        self.devices
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i < 32 && yarn_mask & (1 << i) != 0)
            .map(|(_, d)| d)
    }

    pub fn device_index(&self, name: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.name == name)
    }

    /// Carrier identifiers used by any device, in bit order; this is the `Carriers` header.
    pub fn carrier_ids(&self) -> Vec<String> {
        let all = self.devices.iter().fold(0, |m, d| m | d.bitmask);
        CARRIER_IDS
            .iter()
            .enumerate()
            .filter(|(i, _)| all & (1 << i) != 0)
            .map(|(_, c)| (*c).to_string())
            .collect()
    }
}

fn validate_spec(name: &str, spec: &CarrierSpec) -> KnitResult<()> {
    if spec.carriers.is_empty() {
        return Err(KnitError::validation(format!(
            "carrier device '{name}' lists no carriers"
        )));
    }
    for id in &spec.carriers {
        if !CARRIER_IDS.contains(&id.as_str()) {
            return Err(KnitError::validation(format!(
                "carrier device '{name}': invalid carrier id '{id}'"
            )));
        }
    }
    if let Some(color) = &spec.color {
        if !is_hex_color(color) {
            return Err(KnitError::validation(format!(
                "carrier device '{name}': invalid color '{color}'"
            )));
        }
    }
    Ok(())
}

fn is_hex_color(s: &str) -> bool {
    let Some(hex) = s.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6 | 8) && hex.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
#[path = "../../tests/unit/carriers/config.rs"]
mod tests;
