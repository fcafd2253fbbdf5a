//! Shortest-path distances over the sample graph of a layer.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::layer::Layer;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Entry {
    dist: f64,
    sample: usize,
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on distance.
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.sample.cmp(&self.sample))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra distances from `sources` to every sample; unreachable samples stay infinite.
pub fn distances(layer: &Layer, sources: &[usize]) -> Vec<f64> {
    distances_within(layer, sources, |_| true)
}

/// Like [`distances`], walking only through samples accepted by `allow`.
pub fn distances_within(layer: &Layer, sources: &[usize], allow: impl Fn(usize) -> bool) -> Vec<f64> {
    let mut dist = vec![f64::INFINITY; layer.len()];
    let mut heap = BinaryHeap::new();
    for &s in sources {
        if s < layer.len() && allow(s) {
            dist[s] = 0.0;
            heap.push(Entry { dist: 0.0, sample: s });
        }
    }
    while let Some(Entry { dist: d, sample }) = heap.pop() {
        if d > dist[sample] {
            continue;
        }
        let here = layer.samples[sample].pos;
        for &n in &layer.samples[sample].neighbors {
            let n = n as usize;
            if !allow(n) {
                continue;
            }
            let nd = d + (layer.samples[n].pos - here).hypot();
            if nd < dist[n] {
                dist[n] = nd;
                heap.push(Entry { dist: nd, sample: n });
            }
        }
    }
    dist
}

/// Distance from every sample to the closest sample of `kind`.
pub fn distance_to_kind(layer: &Layer, kind: super::SampleKind) -> Vec<f64> {
    let sources: Vec<usize> = layer
        .samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.kind == kind)
        .map(|(i, _)| i)
        .collect();
    distances(layer, &sources)
}

#[cfg(test)]
#[path = "../../tests/unit/mesh/geodesic.rs"]
mod tests;
