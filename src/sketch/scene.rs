use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::model::{Link, Node, NodeKind, SegmentRef};
use crate::foundation::core::{Affine, LinkId, NodeId};
use crate::foundation::error::{KnitError, KnitResult};

/// Arena of scene-graph nodes and border links.
///
/// All cross references (parent, children, links, constraint targets, pcurve samples) are ids
/// resolved through the arena.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) links: BTreeMap<LinkId, Link>,
    next_node: u32,
    next_link: u32,
}

/// On-disk form of a [`Scene`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SceneDoc {
    pub version: u32,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Scene {
    pub const DOC_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> KnitResult<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| KnitError::scene(format!("unknown node {id}")))
    }

    pub(crate) fn require(&self, id: NodeId) -> KnitResult<&Node> {
        self.node(id)
            .ok_or_else(|| KnitError::scene(format!("unknown node {id}")))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.links.values()
    }

    /// Link attached to a sketch segment.
    pub fn link_at(&self, seg: SegmentRef) -> Option<&Link> {
        let node = self.node(seg.sketch)?;
        let id = node.contour()?.segments.get(seg.segment)?.link?;
        self.links.get(&id)
    }

    /// Root sketches in id order.
    pub fn root_sketches(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.is_sketch() && n.parent.is_none())
            .map(|n| n.id)
            .collect()
    }

    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.parent.is_none())
            .map(|n| n.id)
            .collect()
    }

    /// Composition of local transforms from the root down to `id`.
    pub fn global_transform(&self, id: NodeId) -> Affine {
        let mut acc = Affine::IDENTITY;
        let mut cur = Some(id);
        let mut guard = 0;
        while let Some(c) = cur {
            let Some(node) = self.node(c) else { break };
            acc = node.transform * acc;
            cur = node.parent;
            guard += 1;
            if guard > self.nodes.len() {
                break;
            }
        }
        acc
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = Some(id);
        let mut guard = 0;
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.node(c).and_then(|n| n.parent);
            guard += 1;
            if guard > self.nodes.len() {
                return false;
            }
        }
        false
    }

    /// `id` and all its descendants, parents before children.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(node) = self.node(n) {
                out.push(n);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Root sketches grouped by link connectivity, each group sorted by id.
    pub fn linked_groups(&self) -> Vec<Vec<NodeId>> {
        let roots = self.root_sketches();
        let mut seen = std::collections::BTreeSet::new();
        let mut groups = Vec::new();
        for &r in &roots {
            if !seen.insert(r) {
                continue;
            }
            let mut group = vec![r];
            let mut stack = vec![r];
            while let Some(s) = stack.pop() {
                for l in self.links.values().filter(|l| l.touches(s)) {
                    let other = if l.a.sketch == s { l.b.sketch } else { l.a.sketch };
                    if roots.contains(&other) && seen.insert(other) {
                        group.push(other);
                        stack.push(other);
                    }
                }
            }
            group.sort();
            groups.push(group);
        }
        groups
    }

    pub(crate) fn alloc_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub(crate) fn alloc_link_id(&mut self) -> LinkId {
        let id = LinkId(self.next_link);
        self.next_link += 1;
        id
    }

    /// Check the structural invariants of the arena.
    pub fn validate(&self) -> KnitResult<()> {
        for node in self.nodes.values() {
            if let Some(p) = node.parent {
                let parent = self.require(p)?;
                if !parent.children.contains(&node.id) {
                    return Err(KnitError::scene(format!(
                        "node {} is not listed as a child of {p}",
                        node.id
                    )));
                }
            }
            for &c in &node.children {
                if self.require(c)?.parent != Some(node.id) {
                    return Err(KnitError::scene(format!(
                        "child {c} of {} has a different parent",
                        node.id
                    )));
                }
            }
            if let Some(contour) = node.contour() {
                if !contour.is_well_formed() {
                    return Err(KnitError::scene(format!(
                        "node {} has mismatched vertex and segment counts",
                        node.id
                    )));
                }
            }
            if let NodeKind::Sketch(data) = &node.kind {
                if !data.contour.closed {
                    return Err(KnitError::scene(format!("sketch {} is not closed", node.id)));
                }
                let mut targets = Vec::new();
                for c in &data.constraints {
                    if targets.contains(&c.target) {
                        return Err(KnitError::scene(format!(
                            "sketch {} constrains the same target twice",
                            node.id
                        )));
                    }
                    targets.push(c.target);
                    if let super::model::ConstraintTarget::Curve(cid) = c.target {
                        if self.require(cid)?.parent != Some(node.id) {
                            return Err(KnitError::scene(format!(
                                "constraint curve {cid} is not a child of sketch {}",
                                node.id
                            )));
                        }
                    }
                }
                for (i, seg) in data.contour.segments.iter().enumerate() {
                    let Some(lid) = seg.link else { continue };
                    let link = self.links.get(&lid).ok_or_else(|| {
                        KnitError::scene(format!("sketch {} references a missing link", node.id))
                    })?;
                    if link.other(SegmentRef::new(node.id, i)).is_none() {
                        return Err(KnitError::scene(format!(
                            "link {} does not reference sketch {} segment {i}",
                            lid.0, node.id
                        )));
                    }
                }
            }
        }
        for link in self.links.values() {
            for side in [link.a, link.b] {
                let seg = self
                    .require(side.sketch)?
                    .contour()
                    .and_then(|c| c.segments.get(side.segment))
                    .ok_or_else(|| KnitError::scene("link endpoint is not a sketch segment"))?;
                if seg.link != Some(link.id) {
                    return Err(KnitError::scene(format!(
                        "link {} is not symmetric",
                        link.id.0
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn to_doc(&self) -> SceneDoc {
        SceneDoc {
            version: Self::DOC_VERSION,
            nodes: self.nodes.values().cloned().collect(),
            links: self.links.values().copied().collect(),
        }
    }

    pub fn from_doc(doc: SceneDoc) -> KnitResult<Self> {
        if doc.version != Self::DOC_VERSION {
            return Err(KnitError::validation(format!(
                "unsupported scene version {}",
                doc.version
            )));
        }
        let mut scene = Scene::new();
        for node in doc.nodes {
            scene.next_node = scene.next_node.max(node.id.0 + 1);
            if scene.nodes.insert(node.id, node).is_some() {
                return Err(KnitError::validation("duplicate node id in scene document"));
            }
        }
        for link in doc.links {
            scene.next_link = scene.next_link.max(link.id.0 + 1);
            scene.links.insert(link.id, link);
        }
        scene.validate()?;
        Ok(scene)
    }

    pub fn to_json(&self) -> KnitResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_doc())?)
    }

    pub fn from_json(src: &str) -> KnitResult<Self> {
        let doc: SceneDoc = serde_json::from_str(src)?;
        Self::from_doc(doc)
    }

    pub fn from_path(path: &Path) -> KnitResult<Self> {
        let src = std::fs::read_to_string(path).map_err(|e| {
            KnitError::validation(format!("read scene '{}': {e}", path.display()))
        })?;
        Self::from_json(&src)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sketch/scene.rs"]
mod tests;
