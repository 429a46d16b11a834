use crate::request::{LoadKind, LoadRequest};
use crate::tree::NodeId;

use strata_core::work_timer::WorkTimer;

/// A fixed number of slots holding requests in flight between the cache and its loader.
///
/// Pushing never grows the array; a full array hands the request back to the caller.
#[derive(Debug)]
pub struct SlotArray {
    slots: Box<[Option<LoadRequest>]>,
}

impl SlotArray {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Places `request` in the first empty slot, returning the slot index.
    pub fn push(&mut self, request: LoadRequest) -> Result<usize, LoadRequest> {
        match self.slots.iter().position(Option::is_none) {
            Some(i) => {
                self.slots[i] = Some(request);
                debug_assert!(self.occupied() <= self.capacity());
                Ok(i)
            }
            None => Err(request),
        }
    }

    /// Removes the first request matching `predicate`, scanning slots in order.
    pub fn take_first(
        &mut self,
        mut predicate: impl FnMut(&LoadRequest) -> bool,
    ) -> Option<LoadRequest> {
        self.slots
            .iter_mut()
            .find(|s| s.as_ref().map_or(false, &mut predicate))
            .and_then(Option::take)
    }

    /// Removes every request matching `predicate`.
    pub fn take_where(
        &mut self,
        mut predicate: impl FnMut(&LoadRequest) -> bool,
    ) -> Vec<LoadRequest> {
        self.slots
            .iter_mut()
            .filter(|s| s.as_ref().map_or(false, &mut predicate))
            .filter_map(Option::take)
            .collect()
    }

    pub fn take_all(&mut self) -> Vec<LoadRequest> {
        self.take_where(|_| true)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadRequest> {
        self.slots.iter().flatten()
    }
}

/// Request and retire slots for one [`LoadKind`].
#[derive(Debug)]
pub(crate) struct KindSlots {
    pub requests: SlotArray,
    pub retired: SlotArray,
}

/// Everything the cache and its loader exchange. Lives behind one mutex.
#[derive(Debug)]
pub(crate) struct Handoff {
    slots: [KindSlots; 2],
    /// Requests the loader gave up on since the last sync. The cache releases their pipeline entries.
    pub dropped: Vec<(NodeId, LoadKind)>,
    pub load_timer: WorkTimer,
}

impl Handoff {
    pub fn new(capacity: usize) -> Self {
        let kind_slots = || KindSlots {
            requests: SlotArray::new(capacity),
            retired: SlotArray::new(capacity),
        };
        Self {
            slots: [kind_slots(), kind_slots()],
            dropped: Vec::new(),
            load_timer: WorkTimer::default(),
        }
    }

    #[inline]
    pub fn kind(&self, kind: LoadKind) -> &KindSlots {
        &self.slots[kind.index()]
    }

    #[inline]
    pub fn kind_mut(&mut self, kind: LoadKind) -> &mut KindSlots {
        &mut self.slots[kind.index()]
    }

    pub fn occupancy(&self) -> SlotOccupancy {
        let geometry = self.kind(LoadKind::Geometry);
        let imagery = self.kind(LoadKind::Imagery);
        SlotOccupancy {
            capacity: geometry.requests.capacity(),
            geometry_requests: geometry.requests.occupied(),
            geometry_retired: geometry.retired.occupied(),
            imagery_requests: imagery.requests.occupied(),
            imagery_retired: imagery.retired.occupied(),
        }
    }
}

/// Snapshot of how full the hand-off slots are.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SlotOccupancy {
    pub capacity: usize,
    pub geometry_requests: usize,
    pub geometry_retired: usize,
    pub imagery_requests: usize,
    pub imagery_retired: usize,
}

impl SlotOccupancy {
    pub fn is_within_capacity(&self) -> bool {
        [
            self.geometry_requests,
            self.geometry_retired,
            self.imagery_requests,
            self.imagery_retired,
        ]
        .iter()
        .all(|&n| n <= self.capacity)
    }

    pub fn is_idle(&self) -> bool {
        self.geometry_requests == 0
            && self.geometry_retired == 0
            && self.imagery_requests == 0
            && self.imagery_retired == 0
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
    use crate::coordinates::NodeKey;
    use crate::request::LoadReason;

    fn request(node: u32, priority: f32) -> LoadRequest {
        LoadRequest::new(
            NodeId(node),
            NodeKey::ROOT,
            LoadKind::Geometry,
            priority,
            LoadReason::WarmUpPreload,
        )
    }

    #[test]
    fn slots_are_bounded() {
        let mut slots = SlotArray::new(2);
        assert_eq!(slots.push(request(0, 1.0)).unwrap(), 0);
        assert_eq!(slots.push(request(1, 2.0)).unwrap(), 1);
        assert!(slots.is_full());

        let rejected = slots.push(request(2, 3.0)).unwrap_err();
        assert_eq!(rejected.node(), NodeId(2));
        assert_eq!(slots.occupied(), 2);

        let taken = slots.take_first(|r| r.priority() > 1.5).unwrap();
        assert_eq!(taken.node(), NodeId(1));
        assert_eq!(slots.push(request(3, 0.0)).unwrap(), 1);

        assert_eq!(slots.take_all().len(), 2);
        assert!(slots.is_empty());
    }

    #[test]
    fn occupancy_snapshot() {
        let mut handoff = Handoff::new(3);
        handoff
            .kind_mut(LoadKind::Geometry)
            .retired
            .push(request(0, 1.0))
            .unwrap();
        handoff
            .kind_mut(LoadKind::Imagery)
            .requests
            .push(request(1, 1.0))
            .unwrap();

        let occupancy = handoff.occupancy();
        assert_eq!(occupancy.capacity, 3);
        assert_eq!(occupancy.geometry_retired, 1);
        assert_eq!(occupancy.imagery_requests, 1);
        assert!(occupancy.is_within_capacity());
        assert!(!occupancy.is_idle());
    }
}
