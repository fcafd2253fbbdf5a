use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::carriers::{CarrierConfig, CarrierMapping};
use crate::foundation::core::Affine;
use crate::foundation::error::{KnitError, KnitResult};
use crate::units::{UnitKind, parse_as, parse_as_ratio};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SketchSizing {
    /// Length per sketch unit, e.g. `"1 mm / 1 px"`.
    pub scale: String,
}

impl Default for SketchSizing {
    fn default() -> Self {
        Self {
            scale: "1 mm / 1 px".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StitchSizing {
    /// Wales per length, e.g. `"5 stitches / 1 mm"`.
    pub wale: String,
    /// Courses per length.
    pub course: String,
}

impl Default for StitchSizing {
    fn default() -> Self {
        Self {
            wale: "5 stitches / 1 mm".to_string(),
            course: "5 stitches / 1 mm".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sizing {
    pub sketch: SketchSizing,
    pub default: StitchSizing,
}

/// Pipeline options as written by the host; unit-bearing values stay strings until
/// [`PipelineParams::resolve`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct PipelineParams {
    pub sizing: Sizing,
    pub mesh_levels: u32,
    pub level_factor: f64,
    pub min_resolution: String,
    #[serde(rename = "minRegionDT")]
    pub min_region_dt: String,
    #[serde(rename = "maxRegionDT")]
    pub max_region_dt: String,
    pub uniform_region_split: bool,
    pub invert_time: bool,
    pub seam_weight: f64,
    /// Seam retargeting threshold in wales.
    pub seam_stop: f64,
    /// `1` for full gauge, `2` for half gauge.
    pub gauge: u8,
    /// Stitches per program cell along rows and columns.
    pub subdiv: u32,
    pub verbose: bool,
    /// Largest racking, in needles, a wale shift may need.
    pub max_racking: i32,
    pub stitch_number: u32,
    /// Needles per inch of the target machine, written as the `Gauge` header.
    pub machine_gauge: u32,
    pub knitout_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carriers: Option<CarrierMapping>,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            sizing: Sizing::default(),
            mesh_levels: 3,
            level_factor: 2.0,
            min_resolution: "1 mm".to_string(),
            min_region_dt: "2 mm".to_string(),
            max_region_dt: "100 mm".to_string(),
            uniform_region_split: true,
            invert_time: false,
            seam_weight: 1.0,
            seam_stop: 4.0,
            gauge: 1,
            subdiv: 1,
            verbose: false,
            max_racking: 4,
            stitch_number: 5,
            machine_gauge: 15,
            knitout_version: 2,
            carriers: None,
        }
    }
}

impl PipelineParams {
    pub fn from_json(src: &str) -> KnitResult<Self> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn from_path(path: &Path) -> KnitResult<Self> {
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("read params '{}'", path.display()))?;
        Self::from_json(&src)
    }

    /// Parse every unit string and check ranges.
    pub fn resolve(&self) -> KnitResult<ResolvedParams> {
        let scale = parse_as_ratio(&self.sizing.sketch.scale, UnitKind::Mm, UnitKind::Px, false)?;
        let wale = parse_as_ratio(
            &self.sizing.default.wale,
            UnitKind::Wales,
            UnitKind::Mm,
            false,
        )?;
        let course = parse_as_ratio(
            &self.sizing.default.course,
            UnitKind::Courses,
            UnitKind::Mm,
            false,
        )?;
        let mm = |s: &str| parse_as(s, UnitKind::Mm, false).map(|u| u.value);
        let min_resolution = mm(&self.min_resolution)?;
        let min_region_dt = mm(&self.min_region_dt)?;
        let max_region_dt = mm(&self.max_region_dt)?;

        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(v)
            } else {
                Err(KnitError::validation(format!("{name} must be positive, got {v}")))
            }
        };
        let mm_per_px = positive("sizing.sketch.scale", scale.value())?;
        let wale_dist = 1.0 / positive("sizing.default.wale", wale.value())?;
        let course_dist = 1.0 / positive("sizing.default.course", course.value())?;
        positive("minResolution", min_resolution)?;
        positive("maxRegionDT", max_region_dt)?;
        if max_region_dt < course_dist {
            return Err(KnitError::validation(format!(
                "maxRegionDT ({max_region_dt} mm) is below one course ({course_dist} mm)"
            )));
        }
        if min_region_dt < 0.0 || min_region_dt > max_region_dt {
            return Err(KnitError::validation(
                "minRegionDT must lie between 0 and maxRegionDT",
            ));
        }
        if self.mesh_levels == 0 {
            return Err(KnitError::validation("meshLevels must be at least 1"));
        }
        if self.level_factor < 1.0 {
            return Err(KnitError::validation("levelFactor must be at least 1"));
        }
        if !matches!(self.gauge, 1 | 2) {
            return Err(KnitError::validation(format!(
                "gauge must be 1 or 2, got {}",
                self.gauge
            )));
        }
        if self.max_racking < 1 {
            return Err(KnitError::validation("maxRacking must be at least 1"));
        }
        let carriers = match &self.carriers {
            Some(m) => CarrierConfig::from_mapping(m, true)?,
            None => CarrierConfig::default(),
        };
        Ok(ResolvedParams {
            mm_per_px,
            wale_dist,
            course_dist,
            eta: min_resolution.max(4.0 * wale_dist.max(course_dist)),
            mesh_levels: self.mesh_levels as usize,
            level_factor: self.level_factor,
            min_region_dt,
            max_region_dt,
            uniform_region_split: self.uniform_region_split,
            invert_time: self.invert_time,
            seam_weight: self.seam_weight.max(0.0),
            seam_stop: self.seam_stop.max(0.0),
            gauge: self.gauge,
            subdiv: self.subdiv.max(1),
            verbose: self.verbose,
            max_racking: self.max_racking,
            stitch_number: self.stitch_number,
            machine_gauge: self.machine_gauge,
            knitout_version: self.knitout_version,
            carriers,
        })
    }
}

/// Numeric pipeline settings, lengths in millimetres.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedParams {
    pub mm_per_px: f64,
    /// Distance between neighbouring wales.
    pub wale_dist: f64,
    /// Distance between neighbouring courses.
    pub course_dist: f64,
    /// Sample spacing of the finest mesh layer.
    pub eta: f64,
    pub mesh_levels: usize,
    pub level_factor: f64,
    pub min_region_dt: f64,
    pub max_region_dt: f64,
    pub uniform_region_split: bool,
    pub invert_time: bool,
    pub seam_weight: f64,
    pub seam_stop: f64,
    pub gauge: u8,
    pub subdiv: u32,
    pub verbose: bool,
    pub max_racking: i32,
    pub stitch_number: u32,
    pub machine_gauge: u32,
    pub knitout_version: u32,
    pub carriers: CarrierConfig,
}

impl ResolvedParams {
    /// Sketch units to millimetres.
    pub fn to_mm(&self) -> Affine {
        Affine::scale(self.mm_per_px)
    }

    /// Sample spacing of mesh level `level`, coarse levels first.
    pub fn level_eta(&self, level: usize) -> f64 {
        let up = self.mesh_levels.saturating_sub(1 + level) as i32;
        self.eta * self.level_factor.powi(up)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/params.rs"]
mod tests;
