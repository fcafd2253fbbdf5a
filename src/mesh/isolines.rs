//! Level curves of the time field, chained across linked sketches.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::foundation::core::{NodeId, Point, Vec2, normalized, points_close, segment_intersection};
use crate::sketch::{Scene, SegmentRef};

use super::Mesh;

/// One vertex of an isoline chain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsoPoint {
    pub sketch: NodeId,
    /// Mesh level the point was extracted from.
    pub layer: usize,
    pub pos: Point,
    /// The chain jumps to this point from a different sketch (or wraps around to it).
    pub start: bool,
}

/// Crossing of a linked border inside a chain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Junction {
    /// Index of the first point after the jump.
    pub point: usize,
    pub from: SegmentRef,
    pub to: SegmentRef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsoChain {
    pub points: Vec<IsoPoint>,
    pub closed: bool,
    pub junctions: Vec<Junction>,
}

impl IsoChain {
    /// Arc length, ignoring jumps between sketches.
    pub fn length(&self) -> f64 {
        let mut len: f64 = self
            .points
            .windows(2)
            .filter(|w| !w[1].start)
            .map(|w| (w[1].pos - w[0].pos).hypot())
            .sum();
        if self.closed
            && let (Some(first), Some(last)) = (self.points.first(), self.points.last())
            && !first.start
        {
            len += (first.pos - last.pos).hypot();
        }
        len
    }

    /// Point at arc length `s`, with the sketch it lies in.
    pub fn point_at(&self, s: f64) -> Option<(NodeId, Point)> {
        let n = self.points.len();
        let first = self.points.first()?;
        let mut acc = 0.0;
        let steps = if self.closed { n } else { n - 1 };
        for k in 0..steps {
            let (a, b) = (self.points[k], self.points[(k + 1) % n]);
            if b.start {
                continue;
            }
            let len = (b.pos - a.pos).hypot();
            if acc + len >= s && len > 0.0 {
                let f = ((s - acc) / len).clamp(0.0, 1.0);
                return Some((a.sketch, a.pos.lerp(b.pos, f)));
            }
            acc += len;
        }
        let last = if self.closed { first } else { self.points.last()? };
        Some((last.sketch, last.pos))
    }

    pub fn midpoint(&self) -> Option<(NodeId, Point)> {
        self.point_at(0.5 * self.length())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Key {
    /// Crossing on the grid edge between two samples (sorted).
    Grid(u32, u32),
    /// Clip point on the outline.
    Clip(u32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct End {
    key: Key,
    pos: Point,
}

/// End of a per-sketch chain: on the outline at `(edge, frac)` or free.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Boundary {
    edge: usize,
    frac: f64,
}

#[derive(Clone, Debug)]
struct Piece {
    mesh: usize,
    points: Vec<Point>,
    closed: bool,
    start: Option<Boundary>,
    end: Option<Boundary>,
}

/// Marching squares over the finest layer of `mesh` at level `tau`, clipped to the outline.
fn sketch_pieces(mesh_index: usize, mesh: &Mesh, tau: f64) -> Vec<Piece> {
    let layer = mesh.finest_layer();
    let mut segments: Vec<(End, End)> = Vec::new();
    let mut clips: Vec<Boundary> = Vec::new();
    let t = &layer.time;
    let above = |i: usize| t[i] >= tau;
    let cross = |i: usize, j: usize| {
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        let f = (tau - t[a]) / (t[b] - t[a]);
        End {
            key: Key::Grid(a as u32, b as u32),
            pos: layer.samples[a].pos.lerp(layer.samples[b].pos, f.clamp(0.0, 1.0)),
        }
    };
    for face in layer.faces() {
        let (lo, hi) = face.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            (lo.min(t[i]), hi.max(t[i]))
        });
        if tau < lo || tau > hi {
            continue;
        }
        let edges = [(face[0], face[1]), (face[1], face[2]), (face[2], face[3]), (face[3], face[0])];
        let hits: Vec<usize> = (0..4)
            .filter(|&e| above(edges[e].0) != above(edges[e].1))
            .collect();
        let pairs: Vec<(usize, usize)> = match hits.len() {
            2 => vec![(hits[0], hits[1])],
            4 => {
                let center = face.iter().map(|&i| t[i]).sum::<f64>() / 4.0;
                if (center >= tau) == above(face[0]) {
                    vec![(0, 1), (2, 3)]
                } else {
                    vec![(3, 0), (1, 2)]
                }
            }
            _ => continue,
        };
        for (ea, eb) in pairs {
            let a = cross(edges[ea].0, edges[ea].1);
            let b = cross(edges[eb].0, edges[eb].1);
            clip_segment(mesh, a, b, &mut segments, &mut clips);
        }
    }
    chain_segments(mesh_index, segments, &clips)
}

/// Keep the parts of segment `ab` inside the outline, splitting at boundary crossings.
fn clip_segment(mesh: &Mesh, a: End, b: End, out: &mut Vec<(End, End)>, clips: &mut Vec<Boundary>) {
    let outline = &mesh.outline;
    let mut cuts: Vec<(f64, Boundary)> = Vec::new();
    for e in 0..outline.len() {
        let (p, q) = outline.edge(e);
        if let Some((s, u)) = segment_intersection(a.pos, b.pos, p, q) {
            cuts.push((s, Boundary { edge: e, frac: u }));
        }
    }
    if cuts.is_empty() {
        if outline.contains(a.pos.midpoint(b.pos)) {
            out.push((a, b));
        }
        return;
    }
    cuts.sort_by(|x, y| x.0.total_cmp(&y.0));
    let mut prev = a;
    let mut prev_s = 0.0;
    for (s, boundary) in cuts {
        let pos = a.pos.lerp(b.pos, s);
        let end = End {
            key: Key::Clip(clips.len() as u32),
            pos,
        };
        clips.push(boundary);
        let mid = a.pos.lerp(b.pos, 0.5 * (prev_s + s));
        if s - prev_s > 1e-9 && outline.contains(mid) {
            out.push((prev, end));
        }
        prev = end;
        prev_s = s;
    }
    let mid = a.pos.lerp(b.pos, 0.5 * (prev_s + 1.0));
    if 1.0 - prev_s > 1e-9 && outline.contains(mid) {
        out.push((prev, b));
    }
}

fn chain_segments(mesh: usize, segments: Vec<(End, End)>, clips: &[Boundary]) -> Vec<Piece> {
    let mut at: HashMap<Key, Vec<usize>> = HashMap::new();
    for (i, (a, b)) in segments.iter().enumerate() {
        at.entry(a.key).or_default().push(i);
        at.entry(b.key).or_default().push(i);
    }
    let mut used = vec![false; segments.len()];
    let boundary = |k: Key| match k {
        Key::Clip(c) => clips.get(c as usize).copied(),
        Key::Grid(..) => None,
    };
    let walk = |seed: usize, from: Key, used: &mut Vec<bool>| {
        let mut pts = Vec::new();
        let mut cur = seed;
        let mut key = from;
        let (a, b) = segments[cur];
        let first = if a.key == key { a } else { b };
        pts.push(first.pos);
        loop {
            used[cur] = true;
            let (a, b) = segments[cur];
            let next_end = if a.key == key { b } else { a };
            pts.push(next_end.pos);
            key = next_end.key;
            let Some(next) = at
                .get(&key)
                .and_then(|v| v.iter().copied().find(|&s| !used[s]))
            else {
                break;
            };
            cur = next;
        }
        (pts, first.key, key)
    };
    let mut pieces = Vec::new();
    // Open chains start at keys with a single incident segment.
    let mut open_starts: Vec<(usize, Key)> = Vec::new();
    for (i, (a, b)) in segments.iter().enumerate() {
        for e in [a, b] {
            if at.get(&e.key).is_some_and(|v| v.len() == 1) {
                open_starts.push((i, e.key));
            }
        }
    }
    for (seed, key) in open_starts {
        if used[seed] {
            continue;
        }
        let (points, k0, k1) = walk(seed, key, &mut used);
        pieces.push(Piece {
            mesh,
            points,
            closed: false,
            start: boundary(k0),
            end: boundary(k1),
        });
    }
    for seed in 0..segments.len() {
        if used[seed] {
            continue;
        }
        let key = segments[seed].0.key;
        let (mut points, k0, k1) = walk(seed, key, &mut used);
        let closed = k0 == k1;
        if closed {
            points.pop();
        }
        pieces.push(Piece {
            mesh,
            points,
            closed,
            start: boundary(k0),
            end: boundary(k1),
        });
    }
    pieces
}

/// Orient `piece` so it travels along `(f.y, -f.x)`.
fn orient(mesh: &Mesh, piece: &mut Piece) {
    let layer = mesh.finest_layer();
    let score: f64 = piece
        .points
        .windows(2)
        .map(|w| {
            let mid = w[0].midpoint(w[1]);
            let f = layer
                .interpolate(&layer.flow, mid)
                .and_then(normalized)
                .unwrap_or(Vec2::new(0.0, 1.0));
            (w[1] - w[0]).dot(Vec2::new(f.y, -f.x))
        })
        .sum();
    if score < 0.0 {
        piece.points.reverse();
        std::mem::swap(&mut piece.start, &mut piece.end);
    }
}

/// Linked segment across the boundary point `b` of mesh `m`, with the matching point on the
/// other side.
fn across(
    scene: &Scene,
    meshes: &[Mesh],
    index: &HashMap<NodeId, usize>,
    m: usize,
    b: Boundary,
) -> Option<(SegmentRef, SegmentRef, usize, Point)> {
    let mesh = &meshes[m];
    let (seg, t) = mesh.outline.param_at(b.edge, b.frac);
    let here = SegmentRef::new(mesh.sketch, seg);
    let link = scene.link_at(here)?;
    let there = link.other(here)?;
    let om = *index.get(&there.sketch)?;
    let p = meshes[om].outline.point_at(there.segment, link.map_param(t))?;
    Some((here, there, om, p))
}

/// Extract every isoline at level `tau` over a flow group, joining pieces across links.
pub fn extract(scene: &Scene, meshes: &[Mesh], tau: f64) -> Vec<IsoChain> {
    let index: HashMap<NodeId, usize> = meshes
        .iter()
        .enumerate()
        .map(|(i, m)| (m.sketch, i))
        .collect();
    let mut pieces: Vec<Piece> = Vec::new();
    for (i, mesh) in meshes.iter().enumerate() {
        for mut p in sketch_pieces(i, mesh, tau) {
            if p.points.len() >= 2 {
                orient(mesh, &mut p);
                pieces.push(p);
            }
        }
    }
    // Successor of each piece across a link: end of one meets start of another.
    let tol = |m: usize| 2.0 * meshes[m].finest_layer().eta;
    let mut next: Vec<Option<(usize, SegmentRef, SegmentRef)>> = vec![None; pieces.len()];
    let mut has_prev = vec![false; pieces.len()];
    for i in 0..pieces.len() {
        if pieces[i].closed {
            continue;
        }
        let Some(b) = pieces[i].end else { continue };
        let Some((from, to, om, target)) = across(scene, meshes, &index, pieces[i].mesh, b) else {
            continue;
        };
        let candidate = (0..pieces.len())
            .filter(|&j| j != i && !has_prev[j] && pieces[j].mesh == om && !pieces[j].closed)
            .filter_map(|j| {
                let first = pieces[j].points[0];
                let d = (first - target).hypot();
                (d <= tol(om)).then_some((j, d))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((j, _)) = candidate {
            next[i] = Some((j, from, to));
            has_prev[j] = true;
        }
    }

    let mut chains = Vec::new();
    let mut visited = vec![false; pieces.len()];
    let emit = |start: usize, visited: &mut Vec<bool>| {
        let mut order = vec![start];
        let mut links = Vec::new();
        visited[start] = true;
        let mut cur = start;
        let mut closed = pieces[start].closed;
        while let Some((j, from, to)) = next[cur] {
            if j == start {
                closed = true;
                links.push((order.len(), from, to));
                break;
            }
            if visited[j] {
                break;
            }
            visited[j] = true;
            links.push((order.len(), from, to));
            order.push(j);
            cur = j;
        }
        assemble(meshes, &pieces, order, links, closed)
    };
    for i in 0..pieces.len() {
        if !visited[i] && !has_prev[i] {
            chains.push(emit(i, &mut visited));
        }
    }
    // Remaining pieces form cycles across links.
    for i in 0..pieces.len() {
        if !visited[i] {
            chains.push(emit(i, &mut visited));
        }
    }
    chains
}

/// Concatenate pieces into one chain; `links[k] = (n, from, to)` means piece `n` (or the wrap
/// back to piece 0 when `n == order.len()`) is entered across a link.
fn assemble(
    meshes: &[Mesh],
    pieces: &[Piece],
    mut order: Vec<usize>,
    mut links: Vec<(usize, SegmentRef, SegmentRef)>,
    closed: bool,
) -> IsoChain {
    let count = order.len();
    if closed && links.len() == count && count > 1 {
        // Begin right after the junction into the lowest sketch id.
        let first = (0..count)
            .min_by_key(|&k| (meshes[pieces[order[k]].mesh].sketch, k))
            .unwrap_or(0);
        order.rotate_left(first);
        for l in links.iter_mut() {
            l.0 = (l.0 + count - first) % count;
        }
        links.sort_by_key(|l| l.0);
    }
    let mut points = Vec::new();
    let mut junctions = Vec::new();
    let entered: HashMap<usize, (SegmentRef, SegmentRef)> =
        links.iter().map(|&(n, f, t)| (n % count, (f, t))).collect();
    for (k, &p) in order.iter().enumerate() {
        let piece = &pieces[p];
        let sketch = meshes[piece.mesh].sketch;
        let level = meshes[piece.mesh].layers.len() - 1;
        let jump = entered.get(&k).copied();
        if let Some((from, to)) = jump {
            junctions.push(Junction {
                point: points.len(),
                from,
                to,
            });
        }
        let mut pts = piece.points.clone();
        pts.dedup_by(|b, a| points_close(*a, *b));
        for (i, pos) in pts.into_iter().enumerate() {
            points.push(IsoPoint {
                sketch,
                layer: level,
                pos,
                start: i == 0 && jump.is_some(),
            });
        }
    }
    IsoChain {
        points,
        closed,
        junctions,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/mesh/isolines.rs"]
mod tests;
