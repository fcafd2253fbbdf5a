use super::geometry::segment_curve;
use super::model::{CurveSample, NodeKind, PCurveData};
use super::scene::Scene;
use crate::foundation::core::{CubicBez, Line, NodeId, ParamCurve, Point, QuadBez};
use crate::foundation::error::{KnitError, KnitResult};

impl Scene {
    fn pcurve_mut(&mut self, id: NodeId) -> KnitResult<&mut PCurveData> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::PCurve(p) => Ok(p),
            other => Err(KnitError::scene(format!(
                "node {id} is a {}, not a pcurve",
                other.name()
            ))),
        }
    }

    /// Change the degree; samples in slots that are no longer valid are dropped.
    pub fn set_pcurve_degree(&mut self, id: NodeId, degree: u8) -> KnitResult<()> {
        if !(1..=3).contains(&degree) {
            return Err(KnitError::scene(format!("invalid pcurve degree {degree}")));
        }
        let p = self.pcurve_mut(id)?;
        p.degree = degree;
        let valid = PCurveData::slots_for(degree);
        for (slot, sample) in p.samples.iter_mut().enumerate() {
            if !valid.contains(&slot) {
                *sample = None;
            }
        }
        Ok(())
    }

    pub fn set_pcurve_sample(
        &mut self,
        id: NodeId,
        slot: usize,
        sample: Option<CurveSample>,
    ) -> KnitResult<()> {
        if let Some(s) = sample {
            if s.curve == id {
                return Err(KnitError::scene("a pcurve cannot sample itself"));
            }
            let src = self.require(s.curve)?;
            let contour = src.contour().ok_or_else(|| {
                KnitError::scene(format!("node {} has no segments to sample", s.curve))
            })?;
            if s.seg >= contour.segment_count() || !(0.0..=1.0).contains(&s.t) {
                return Err(KnitError::scene("pcurve sample is out of range"));
            }
        }
        let p = self.pcurve_mut(id)?;
        if !PCurveData::slots_for(p.degree).contains(&slot) {
            return Err(KnitError::scene(format!(
                "slot {slot} is not used by a degree {} pcurve",
                p.degree
            )));
        }
        p.samples[slot] = sample;
        Ok(())
    }

    /// Global position of a curve sample.
    pub fn sample_point(&self, sample: CurveSample) -> KnitResult<Point> {
        let node = self.require(sample.curve)?;
        let contour = node
            .contour()
            .ok_or_else(|| KnitError::scene("sampled node has no contour"))?;
        if sample.seg >= contour.segment_count() {
            return Err(KnitError::scene("sampled segment does not exist"));
        }
        let local = segment_curve(contour, sample.seg).eval(sample.t);
        Ok(self.global_transform(sample.curve) * local)
    }

    /// Polyline approximation of a pcurve in global coordinates, or `None` while incomplete.
    pub fn pcurve_points(&self, id: NodeId, pieces: usize) -> KnitResult<Option<Vec<Point>>> {
        let node = self.require(id)?;
        let NodeKind::PCurve(p) = &node.kind else {
            return Err(KnitError::scene(format!("node {id} is not a pcurve")));
        };
        if !p.is_complete() {
            return Ok(None);
        }
        let mut ctl = [Point::ORIGIN; 4];
        for &slot in PCurveData::slots_for(p.degree) {
            if let Some(s) = p.samples[slot] {
                ctl[slot] = self.sample_point(s)?;
            }
        }
        let pieces = pieces.max(1);
        let at = |t: f64| match p.degree {
            1 => Line::new(ctl[0], ctl[3]).eval(t),
            2 => QuadBez::new(ctl[0], ctl[1], ctl[3]).eval(t),
            _ => CubicBez::new(ctl[0], ctl[1], ctl[2], ctl[3]).eval(t),
        };
        Ok(Some(
            (0..=pieces).map(|k| at(k as f64 / pieces as f64)).collect(),
        ))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sketch/pcurve.rs"]
mod tests;
