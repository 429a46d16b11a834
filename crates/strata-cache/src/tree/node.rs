use super::NodeId;
use crate::coordinates::{Level, NodeKey};
use crate::payload::{Geometry, ImageryHandle};
use crate::request::{LoadKind, LoadReason, Requester};

use smallvec::SmallVec;

/// One requester's interest in loading a payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Demand {
    pub requester: Requester,
    pub priority: f32,
    pub reason: LoadReason,
}

/// A single cell of the [`ChunkTree`](crate::ChunkTree).
///
/// Payload slots are only written through the tree, which keeps the loader's view of residency in sync. Everything else on the
/// node is bookkeeping owned by the consuming thread.
#[derive(Debug)]
pub struct ChunkNode {
    key: NodeKey,
    parent: Option<NodeId>,
    geometry: Option<Geometry>,
    imagery: Option<ImageryHandle>,
    heat: f32,
    demands: [SmallVec<[Demand; 2]>; 2],
    references: [u32; 2],
}

impl ChunkNode {
    pub(super) fn new(key: NodeKey, parent: Option<NodeId>) -> Self {
        Self {
            key,
            parent,
            geometry: None,
            imagery: None,
            heat: 0.0,
            demands: Default::default(),
            references: [0; 2],
        }
    }

    #[inline]
    pub fn key(&self) -> NodeKey {
        self.key
    }

    #[inline]
    pub fn level(&self) -> Level {
        self.key.level
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn has_resident_geometry(&self) -> bool {
        self.geometry.is_some()
    }

    #[inline]
    pub fn has_resident_imagery(&self) -> bool {
        self.imagery.is_some()
    }

    #[inline]
    pub fn has_resident(&self, kind: LoadKind) -> bool {
        match kind {
            LoadKind::Geometry => self.has_resident_geometry(),
            LoadKind::Imagery => self.has_resident_imagery(),
        }
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    pub fn imagery(&self) -> Option<&ImageryHandle> {
        self.imagery.as_ref()
    }

    /// How often new loads were requested for this node. Breaks priority ties.
    #[inline]
    pub fn heat(&self) -> f32 {
        self.heat
    }

    pub fn demands(&self, kind: LoadKind) -> &[Demand] {
        &self.demands[kind.index()]
    }

    pub fn references(&self, kind: LoadKind) -> u32 {
        self.references[kind.index()]
    }

    /// Records that `requester` wants `kind` loaded at `priority`, replacing any earlier demand from the same requester.
    ///
    /// Returns the merged priority over all requesters.
    pub fn request_load(
        &mut self,
        kind: LoadKind,
        requester: Requester,
        priority: f32,
        reason: LoadReason,
    ) -> f32 {
        let demand = Demand {
            requester,
            priority,
            reason,
        };
        let demands = &mut self.demands[kind.index()];
        if let Some(existing) = demands.iter_mut().find(|d| d.requester == requester) {
            *existing = demand;
        } else {
            demands.push(demand);
        }
        self.merged_priority(kind)
    }

    /// The most urgent priority any requester has for `kind`, or zero if nobody wants it.
    pub fn merged_priority(&self, kind: LoadKind) -> f32 {
        self.demands[kind.index()]
            .iter()
            .map(|d| d.priority)
            .reduce(f32::max)
            .unwrap_or(0.0)
    }

    pub(crate) fn clear_demand(&mut self, kind: LoadKind, requester: Requester) {
        self.demands[kind.index()].retain(|d| d.requester != requester);
    }

    pub(crate) fn clear_demands(&mut self, kind: LoadKind) {
        self.demands[kind.index()].clear();
    }

    pub(crate) fn warm(&mut self) {
        self.heat += 1.0;
    }

    pub(crate) fn add_reference(&mut self, kind: LoadKind) -> u32 {
        let count = &mut self.references[kind.index()];
        *count += 1;
        *count
    }

    pub(crate) fn release_reference(&mut self, kind: LoadKind) -> u32 {
        let count = &mut self.references[kind.index()];
        debug_assert!(*count > 0, "released an unreferenced {} payload", kind);
        *count = count.saturating_sub(1);
        *count
    }

    pub(super) fn put_geometry(&mut self, geometry: Geometry) -> Option<Geometry> {
        self.geometry.replace(geometry)
    }

    pub(super) fn take_geometry(&mut self) -> Option<Geometry> {
        self.geometry.take()
    }

    pub(super) fn put_imagery(&mut self, imagery: ImageryHandle) -> Option<ImageryHandle> {
        self.imagery.replace(imagery)
    }

    pub(super) fn take_imagery(&mut self) -> Option<ImageryHandle> {
        self.imagery.take()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;
    use crate::request::InstanceId;

    #[test]
    fn demands_merge_to_the_maximum() {
        let mut node = ChunkNode::new(NodeKey::ROOT, None);
        let a = Requester::Instance(InstanceId(1));
        let b = Requester::Instance(InstanceId(2));

        assert_eq!(node.merged_priority(LoadKind::Geometry), 0.0);
        assert_eq!(
            node.request_load(LoadKind::Geometry, a, 3.0, LoadReason::WarmUpPreload),
            3.0
        );
        assert_eq!(
            node.request_load(LoadKind::Geometry, b, 5.0, LoadReason::CanSplitChildPreload),
            5.0
        );
        assert_eq!(
            node.demands(LoadKind::Geometry)[1].reason,
            LoadReason::CanSplitChildPreload
        );

        // A requester lowering its own priority replaces its earlier demand.
        assert_eq!(
            node.request_load(LoadKind::Geometry, b, 1.0, LoadReason::WarmUpPreload),
            3.0
        );
        assert_eq!(node.demands(LoadKind::Geometry).len(), 2);
        assert!(node.demands(LoadKind::Imagery).is_empty());

        node.clear_demand(LoadKind::Geometry, a);
        assert_eq!(node.merged_priority(LoadKind::Geometry), 1.0);
        assert_eq!(node.demands(LoadKind::Geometry)[0].requester, b);
    }

    #[test]
    fn reference_counts_per_kind() {
        let mut node = ChunkNode::new(NodeKey::ROOT, None);
        assert_eq!(node.add_reference(LoadKind::Imagery), 1);
        assert_eq!(node.add_reference(LoadKind::Imagery), 2);
        assert_eq!(node.references(LoadKind::Geometry), 0);
        assert_eq!(node.release_reference(LoadKind::Imagery), 1);
    }
}
