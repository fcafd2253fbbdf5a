//! Temporal segmentation of a flow group into regions and their reduced graph.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::foundation::core::{NodeId, Point, TIME_EPS, Vec2, normalized};
use crate::foundation::issue::Issue;
use crate::pipeline::ResolvedParams;
use crate::sketch::Scene;

use super::Mesh;
use super::geodesic;

const UNLABELED: u32 = u32::MAX;
/// Upper bound on time bands per group.
pub const MAX_BANDS: usize = 4096;

/// Link positions sampled when relating samples across a border.
pub(crate) const LINK_SAMPLES: usize = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionStatus {
    #[default]
    Ok,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub id: usize,
    pub band: usize,
    pub t_min: f64,
    pub t_max: f64,
    /// Interior samples as `(mesh index, sample index)`.
    pub samples: Vec<(usize, u32)>,
    /// Longest geodesic walk inside the region from its earliest sample.
    pub extent: f64,
    pub status: RegionStatus,
    pub short_row: bool,
}

impl Region {
    pub fn centroid(&self, meshes: &[Mesh]) -> Point {
        let sum = self.samples.iter().fold(Vec2::ZERO, |acc, &(m, s)| {
            acc + meshes[m].finest_layer().samples[s as usize].pos.to_vec2()
        });
        (sum / self.samples.len().max(1) as f64).to_point()
    }
}

/// Chain of regions collapsed by the reduction.
#[derive(Clone, Debug, PartialEq)]
pub struct ReducedRegion {
    pub regions: Vec<usize>,
    pub t_min: f64,
    pub t_max: f64,
    pub status: RegionStatus,
    pub short_row: bool,
}

/// Regions of one flow group on the finest layer, adjacency between consecutive time bands,
/// and the reduced graph obtained by merging single-successor chains.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionGraph {
    pub bands: Vec<(f64, f64)>,
    pub regions: Vec<Region>,
    /// `(earlier, later)` region pairs.
    pub edges: Vec<(usize, usize)>,
    pub reduced: Vec<ReducedRegion>,
    reduced_of: Vec<usize>,
    labels: Vec<Vec<u32>>,
}

impl RegionGraph {
    #[tracing::instrument(skip_all, fields(meshes = meshes.len()))]
    pub fn build(scene: &Scene, meshes: &[Mesh], params: &ResolvedParams) -> Self {
        let Some((lo, hi)) = group_time_range(meshes) else {
            return Self::default();
        };
        let bands = split_bands(lo, hi, params);
        let band_of = |t: f64| band_index(&bands, t);

        // Connected components per band inside each mesh.
        let mut uf = UnionFind::default();
        let mut labels: Vec<Vec<u32>> = Vec::with_capacity(meshes.len());
        for mesh in meshes {
            let layer = mesh.finest_layer();
            let mut lab = vec![UNLABELED; layer.len()];
            for seed in layer.interior() {
                if lab[seed] != UNLABELED {
                    continue;
                }
                let comp = uf.add();
                let band = band_of(layer.time[seed]);
                lab[seed] = comp;
                let mut stack = vec![seed];
                while let Some(i) = stack.pop() {
                    for &n in &layer.samples[i].neighbors {
                        let n = n as usize;
                        if lab[n] == UNLABELED
                            && layer.samples[n].kind == super::SampleKind::Interior
                            && band_of(layer.time[n]) == band
                        {
                            lab[n] = comp;
                            stack.push(n);
                        }
                    }
                }
            }
            labels.push(lab);
        }

        // Components touching across a link in the same band are one region; across
        // consecutive bands they are adjacent.
        let mut cross = Vec::new();
        for (ia, ib, pa, pb) in link_point_pairs(scene, meshes) {
            let (Some(sa), Some(sb)) = (
                nearest_interior(meshes, ia, pa),
                nearest_interior(meshes, ib, pb),
            ) else {
                continue;
            };
            let (ta, tb) = (
                meshes[ia].finest_layer().time[sa],
                meshes[ib].finest_layer().time[sb],
            );
            let (la, lb) = (labels[ia][sa], labels[ib][sb]);
            match band_of(ta).cmp(&band_of(tb)) {
                std::cmp::Ordering::Equal => uf.union(la, lb),
                std::cmp::Ordering::Less => cross.push((la, lb)),
                std::cmp::Ordering::Greater => cross.push((lb, la)),
            }
        }

        // Dense region ids in (band, first sample) order.
        let mut root_to_region: BTreeMap<u32, usize> = BTreeMap::new();
        let mut regions: Vec<Region> = Vec::new();
        let mut order: Vec<(usize, usize, u32)> = Vec::new();
        for (m, lab) in labels.iter().enumerate() {
            for (s, &l) in lab.iter().enumerate() {
                if l != UNLABELED {
                    order.push((m, s, l));
                }
            }
        }
        for &(m, s, l) in &order {
            let root = uf.find(l);
            let t = meshes[m].finest_layer().time[s];
            let id = *root_to_region.entry(root).or_insert_with(|| {
                regions.push(Region {
                    id: regions.len(),
                    band: band_of(t),
                    t_min: t,
                    t_max: t,
                    samples: Vec::new(),
                    extent: 0.0,
                    status: RegionStatus::Ok,
                    short_row: false,
                });
                regions.len() - 1
            });
            let r = &mut regions[id];
            r.t_min = r.t_min.min(t);
            r.t_max = r.t_max.max(t);
            r.samples.push((m, s as u32));
        }
        regions.sort_by(|a, b| a.band.cmp(&b.band).then(a.id.cmp(&b.id)));
        let mut remap = vec![0usize; regions.len()];
        for (new, r) in regions.iter_mut().enumerate() {
            remap[r.id] = new;
            r.id = new;
        }
        let region_of_label = |uf: &mut UnionFind, l: u32| remap[root_to_region[&uf.find(l)]];
        let mut dense_labels = labels.clone();
        for lab in dense_labels.iter_mut() {
            for l in lab.iter_mut() {
                if *l != UNLABELED {
                    *l = region_of_label(&mut uf, *l) as u32;
                }
            }
        }

        // Adjacency between consecutive bands.
        let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
        for (m, mesh) in meshes.iter().enumerate() {
            let layer = mesh.finest_layer();
            for i in layer.interior() {
                let ri = dense_labels[m][i] as usize;
                for &n in &layer.samples[i].neighbors {
                    let rn = dense_labels[m][n as usize];
                    if rn == UNLABELED {
                        continue;
                    }
                    let rn = rn as usize;
                    if regions[rn].band == regions[ri].band + 1 {
                        edges.insert((ri, rn));
                    }
                }
            }
        }
        for (a, b) in cross {
            let (ra, rb) = (region_of_label(&mut uf, a), region_of_label(&mut uf, b));
            if regions[rb].band == regions[ra].band + 1 {
                edges.insert((ra, rb));
            }
        }
        let edges: Vec<(usize, usize)> = edges.into_iter().collect();

        for r in regions.iter_mut() {
            r.extent = region_extent(meshes, &dense_labels, r);
        }

        let mut graph = Self {
            bands,
            regions,
            edges,
            reduced: Vec::new(),
            reduced_of: Vec::new(),
            labels: dense_labels,
        };
        graph.classify(params);
        graph.mark_short_rows(meshes);
        graph.reduce();
        graph
    }

    fn successors(&self, r: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges.iter().filter(move |e| e.0 == r).map(|e| e.1)
    }

    fn predecessors(&self, r: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges.iter().filter(move |e| e.1 == r).map(|e| e.0)
    }

    fn classify(&mut self, params: &ResolvedParams) {
        for r in 0..self.regions.len() {
            let splits = self.successors(r).count() > 1 || self.predecessors(r).count() > 1;
            let region = &mut self.regions[r];
            region.status = if splits {
                RegionStatus::Error
            } else if region.t_max - region.t_min + TIME_EPS < params.min_region_dt {
                RegionStatus::Warning
            } else {
                RegionStatus::Ok
            };
        }
    }

    /// Flag regions holding a pointed outline extremum of the time field.
    fn mark_short_rows(&mut self, meshes: &[Mesh]) {
        for (m, mesh) in meshes.iter().enumerate() {
            for p in pointed_extrema(mesh) {
                if let Some(s) = nearest_interior(meshes, m, p) {
                    let r = self.labels[m][s];
                    if r != UNLABELED {
                        self.regions[r as usize].short_row = true;
                    }
                }
            }
        }
    }

    fn reduce(&mut self) {
        let n = self.regions.len();
        let mut uf = UnionFind::default();
        for _ in 0..n {
            uf.add();
        }
        for &(a, b) in &self.edges {
            if self.successors(a).count() == 1 && self.predecessors(b).count() == 1 {
                uf.union(a as u32, b as u32);
            }
        }
        let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for r in 0..n {
            groups.entry(uf.find(r as u32)).or_default().push(r);
        }
        let mut reduced: Vec<ReducedRegion> = groups
            .into_values()
            .map(|regions| {
                let rs = || regions.iter().map(|&r| &self.regions[r]);
                let t_min = rs().map(|r| r.t_min).fold(f64::INFINITY, f64::min);
                let t_max = rs().map(|r| r.t_max).fold(f64::NEG_INFINITY, f64::max);
                let status = rs().map(|r| r.status).max().unwrap_or_default();
                let short_row = rs().any(|r| r.short_row);
                ReducedRegion {
                    regions,
                    t_min,
                    t_max,
                    status,
                    short_row,
                }
            })
            .collect();
        reduced.sort_by(|a, b| a.t_min.total_cmp(&b.t_min));
        self.reduced_of = vec![0; n];
        for (i, rr) in reduced.iter().enumerate() {
            for &r in &rr.regions {
                self.reduced_of[r] = i;
            }
        }
        self.reduced = reduced;
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Region holding interior sample `sample` of mesh `mesh`.
    pub fn region_of(&self, mesh: usize, sample: usize) -> Option<usize> {
        match self.labels.get(mesh)?.get(sample)? {
            &UNLABELED => None,
            &r => Some(r as usize),
        }
    }

    pub fn reduced_of(&self, region: usize) -> Option<usize> {
        self.reduced_of.get(region).copied()
    }

    /// Issues for error and warning regions.
    pub fn issues(&self, meshes: &[Mesh]) -> Vec<Issue> {
        let mut out = Vec::new();
        for r in &self.regions {
            let sketch = r.samples.first().map(|&(m, _)| meshes[m].sketch);
            let issue = match r.status {
                RegionStatus::Ok => continue,
                RegionStatus::Error => Issue::error(format!(
                    "region {} splits or merges; the tracer cannot follow it",
                    r.id
                )),
                RegionStatus::Warning => Issue::warning(format!(
                    "region {} spans only {:.2} mm of time",
                    r.id,
                    r.t_max - r.t_min
                )),
            };
            let mut issue = issue.at(r.centroid(meshes));
            if let Some(s) = sketch {
                issue = issue.on(s);
                let first = r.samples[0].0;
                issue = issue.with_samples(
                    r.samples
                        .iter()
                        .filter(|(m, _)| *m == first)
                        .map(|&(_, s)| s)
                        .collect(),
                );
            }
            out.push(issue);
        }
        out
    }
}

fn group_time_range(meshes: &[Mesh]) -> Option<(f64, f64)> {
    meshes
        .iter()
        .filter(|m| !m.layers.is_empty())
        .filter_map(|m| m.finest_layer().time_range())
        .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
}

/// Time bands of width at most `maxRegionDT`; uniform splitting spreads the span evenly.
/// Past [`MAX_BANDS`] the bands widen instead of multiplying.
pub fn split_bands(lo: f64, hi: f64, params: &ResolvedParams) -> Vec<(f64, f64)> {
    let span = hi - lo;
    let wanted = ((span - TIME_EPS) / params.max_region_dt).ceil().max(1.0);
    let n = if wanted > MAX_BANDS as f64 {
        tracing::warn!(wanted, max = MAX_BANDS, "too many time bands, widening them");
        MAX_BANDS
    } else {
        wanted as usize
    };
    let max_dt = params.max_region_dt.max(span / n as f64);
    let w = if params.uniform_region_split { span / n as f64 } else { max_dt };
    (0..n)
        .map(|k| {
            let end = if k + 1 == n { hi } else { hi.min(lo + (k + 1) as f64 * w) };
            (lo + k as f64 * w, end)
        })
        .collect()
}

fn band_index(bands: &[(f64, f64)], t: f64) -> usize {
    bands
        .iter()
        .position(|&(_, hi)| t <= hi)
        .unwrap_or(bands.len().saturating_sub(1))
}

/// Point pairs `(mesh a, mesh b, point on a, matching point on b)` along every link
/// joining two meshes of the group.
pub(crate) fn link_point_pairs(scene: &Scene, meshes: &[Mesh]) -> Vec<(usize, usize, Point, Point)> {
    let index: BTreeMap<NodeId, usize> = meshes
        .iter()
        .enumerate()
        .map(|(i, m)| (m.sketch, i))
        .collect();
    let mut out = Vec::new();
    for link in scene.links() {
        let (Some(&ia), Some(&ib)) = (index.get(&link.a.sketch), index.get(&link.b.sketch)) else {
            continue;
        };
        for k in 0..LINK_SAMPLES {
            let u = (k as f64 + 0.5) / LINK_SAMPLES as f64;
            let pa = meshes[ia].outline.point_at(link.a.segment, u);
            let pb = meshes[ib].outline.point_at(link.b.segment, link.map_param(u));
            if let (Some(pa), Some(pb)) = (pa, pb) {
                out.push((ia, ib, pa, pb));
            }
        }
    }
    out
}

/// Closest interior sample of `meshes[m]`'s finest layer to `p`.
pub(crate) fn nearest_interior(meshes: &[Mesh], m: usize, p: Point) -> Option<usize> {
    let layer = meshes.get(m)?.finest_layer();
    layer
        .interior()
        .map(|i| (i, (layer.samples[i].pos - p).hypot2()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

fn region_extent(meshes: &[Mesh], labels: &[Vec<u32>], region: &Region) -> f64 {
    let Some(&(m, _)) = region.samples.first() else {
        return 0.0;
    };
    let layer = meshes[m].finest_layer();
    let Some(&(_, source)) = region
        .samples
        .iter()
        .filter(|(mm, _)| *mm == m)
        .min_by(|a, b| layer.time[a.1 as usize].total_cmp(&layer.time[b.1 as usize]))
    else {
        return 0.0;
    };
    let id = region.id as u32;
    let dist = geodesic::distances_within(layer, &[source as usize], |i| labels[m][i] == id);
    dist.into_iter().filter(|d| d.is_finite()).fold(0.0, f64::max)
}

/// Sketch vertices where time peaks or dips along the outline and both adjacent edges run
/// across the isolines.
pub fn pointed_extrema(mesh: &Mesh) -> Vec<Point> {
    let layer = mesh.finest_layer();
    let pts = &mesh.outline.points;
    let n = pts.len();
    let mut out = Vec::new();
    for (i, e) in mesh.outline.edges.iter().enumerate() {
        // Only original vertices, not flattening points.
        if e.t0 != 0.0 {
            continue;
        }
        let (prev, cur, next) = (pts[(i + n - 1) % n], pts[i], pts[(i + 1) % n]);
        let t = |p: Point| layer.interpolate(&layer.time, p);
        let (Some(tp), Some(tc), Some(tn)) = (t(prev), t(cur), t(next)) else {
            continue;
        };
        let peak = tc > tp + TIME_EPS && tc > tn + TIME_EPS;
        let dip = tc < tp - TIME_EPS && tc < tn - TIME_EPS;
        if !peak && !dip {
            continue;
        }
        let Some(flow) = layer.interpolate(&layer.flow, cur).and_then(normalized) else {
            continue;
        };
        let crosses = |a: Point, b: Point| normalized(b - a).is_some_and(|d| d.dot(flow).abs() > 0.5);
        if crosses(prev, cur) && crosses(cur, next) {
            out.push(cur);
        }
    }
    out
}

#[derive(Debug, Default)]
struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn add(&mut self) -> u32 {
        let id = self.parent.len() as u32;
        self.parent.push(id);
        id
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let up = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = up;
            x = up;
        }
        x
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi as usize] = lo;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/mesh/regions.rs"]
mod tests;
