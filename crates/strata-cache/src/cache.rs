mod lifecycle;

use crate::chunk_file::ChunkFile;
use crate::config::CacheConfig;
use crate::coordinates::{NodeKey, MAX_TREE_DEPTH};
use crate::error::{CacheError, CacheResult};
use crate::handoff::SlotOccupancy;
use crate::payload::LoadedPayload;
use crate::recycle::ImageryPool;
use crate::request::{LoadKind, LoadReason, LoadRequest, RequestStage, Requester};
use crate::source::ChunkSource;
use crate::stats::CacheStats;
use crate::tree::{ChunkNode, ChunkTree, NodeId};
use crate::worker::{LoaderShared, RetirePolicy};

use float_ord::FloatOrd;
use std::mem;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use strata_core::allocator::{AllocId32, Allocator32};
use strata_core::SmallKeyHashMap;

/// Where the single live request for a `(node, kind)` pair is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Tracked {
    Pending(AllocId32),
    /// Owned by the hand-off slots or the loader.
    Dispatched,
}

/// Streams chunk payloads from a [`ChunkSource`] into a [`ChunkTree`].
///
/// All methods are called from one consuming thread. Loads happen on a background loader thread, or inline during
/// [`TerrainCache::sync`] when the cache is synchronous.
pub struct TerrainCache {
    config: CacheConfig,
    tree: ChunkTree,

    requests: Allocator32<LoadRequest>,
    pending: [Vec<AllocId32>; 2],
    pipeline: SmallKeyHashMap<(NodeId, LoadKind), Tracked>,

    shared: Arc<LoaderShared>,
    loader: Option<JoinHandle<()>>,

    imagery_pool: ImageryPool,

    synchronous: bool,
    preloading: bool,
    last_sync_frame: Option<u64>,
    owner_count: u32,

    stats: CacheStats,
}

impl TerrainCache {
    /// Builds the node table for `source`. Nothing is loaded and the loader is not started.
    pub fn new(source: Arc<dyn ChunkSource>, config: CacheConfig) -> CacheResult<Self> {
        let depth = source.tree_depth();
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(CacheError::MalformedHeader(format!(
                "tree depth {} is outside of 1..={}",
                depth, MAX_TREE_DEPTH
            )));
        }

        let tree = ChunkTree::new(depth);
        let shared = Arc::new(LoaderShared::new(
            &config,
            source,
            tree.residency().clone(),
        ));

        Ok(Self {
            tree,
            requests: Allocator32::new(),
            pending: Default::default(),
            pipeline: Default::default(),
            shared,
            loader: None,
            imagery_pool: ImageryPool::new(config.recycle_target()),
            synchronous: config.synchronous,
            preloading: false,
            last_sync_frame: None,
            owner_count: 0,
            stats: CacheStats::default(),
            config,
        })
    }

    /// Opens a chunk file and builds a cache over it.
    pub fn open(path: impl AsRef<Path>, config: CacheConfig) -> CacheResult<Self> {
        Self::new(Arc::new(ChunkFile::open(path)?), config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn source(&self) -> &dyn ChunkSource {
        self.shared.source()
    }

    pub fn tree(&self) -> &ChunkTree {
        &self.tree
    }

    pub fn node(&self, id: NodeId) -> &ChunkNode {
        &self.tree[id]
    }

    pub fn node_id(&self, key: NodeKey) -> Option<NodeId> {
        self.tree.node_id(key)
    }

    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    /// Takes effect on the next sync, which stops the loader if it is running.
    pub fn set_synchronous(&mut self, synchronous: bool) {
        self.synchronous = synchronous;
    }

    pub fn is_loader_running(&self) -> bool {
        self.loader.is_some()
    }

    pub fn owner_count(&self) -> u32 {
        self.owner_count
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats;
        self.shared.counters.merge_into(&mut stats);
        stats.average_load_us = self.shared.handoff.lock().load_timer.average_time_us();
        stats
    }

    pub fn occupancy(&self) -> SlotOccupancy {
        self.shared.occupancy()
    }

    pub fn pending_len(&self, kind: LoadKind) -> usize {
        self.pending[kind.index()].len()
    }

    /// Priority of the queued request for `(node, kind)`, if it has not been dispatched yet.
    pub fn pending_priority(&self, node: NodeId, kind: LoadKind) -> Option<f32> {
        match self.pipeline.get(&(node, kind)) {
            Some(Tracked::Pending(id)) => Some(self.requests[*id].priority),
            _ => None,
        }
    }

    pub fn recycled_imagery(&self) -> usize {
        self.imagery_pool.len()
    }

    pub fn request_stage(&self, node: NodeId, kind: LoadKind) -> RequestStage {
        if self.tree.has_resident(node, kind) {
            return RequestStage::Installed;
        }
        match self.pipeline.get(&(node, kind)) {
            None => RequestStage::Unrequested,
            Some(Tracked::Pending(_)) => RequestStage::Queued,
            Some(Tracked::Dispatched) => {
                let handoff = self.shared.handoff.lock();
                if handoff
                    .kind(kind)
                    .retired
                    .iter()
                    .any(|r| r.node == node)
                {
                    RequestStage::Retired
                } else {
                    RequestStage::InFlight
                }
            }
        }
    }

    pub fn request_geom_load(
        &mut self,
        node: NodeId,
        requester: Requester,
        priority: f32,
        reason: LoadReason,
    ) {
        self.request_load(node, LoadKind::Geometry, requester, priority, reason)
    }

    pub fn request_tex_load(
        &mut self,
        node: NodeId,
        requester: Requester,
        priority: f32,
        reason: LoadReason,
    ) {
        self.request_load(node, LoadKind::Imagery, requester, priority, reason)
    }

    /// Asks for `kind` to be loaded for `node`. Higher priorities are dispatched first.
    ///
    /// Instance requests for a node whose parent has no resident `kind` payload are ignored. Repeated requests for the same
    /// payload are merged into the one already in flight.
    pub fn request_load(
        &mut self,
        node: NodeId,
        kind: LoadKind,
        requester: Requester,
        priority: f32,
        reason: LoadReason,
    ) {
        let chunk = &self.tree[node];
        debug_assert!(
            !chunk.has_resident(kind),
            "requested {} for chunk {} which is already resident",
            kind,
            chunk.key()
        );
        if chunk.has_resident(kind) {
            return;
        }
        if !requester.is_internal() && !self.tree.parent_has_resident(node, kind) {
            self.stats.rejected += 1;
            return;
        }

        let chunk = self.tree.get_mut(node);
        let priority = chunk.request_load(kind, requester, priority, reason);

        match self.pipeline.get(&(node, kind)) {
            Some(Tracked::Pending(id)) => {
                let request = &mut self.requests[*id];
                request.priority = priority;
                self.stats.coalesced += 1;
            }
            Some(Tracked::Dispatched) => {
                self.stats.coalesced += 1;
            }
            None => {
                chunk.warm();
                let request = LoadRequest::new(
                    node,
                    chunk.key(),
                    kind,
                    priority,
                    reason,
                );
                self.enqueue(request);
                self.stats.requested += 1;
            }
        }
    }

    /// Runs one loader step for `kind` on the calling thread.
    pub fn process_requests(&mut self, kind: LoadKind) -> bool {
        self.shared
            .process_requests(kind, RetirePolicy::SingleAttempt)
    }

    /// Exchanges requests and results with the loader. Call once per frame.
    ///
    /// Returns `false` without doing anything if this frame was already synced, unless the cache is precaching.
    pub fn sync(&mut self, frame: u64) -> bool {
        if !self.preloading && self.last_sync_frame == Some(frame) {
            return false;
        }
        self.last_sync_frame = Some(frame);

        self.reconcile()
    }

    fn reconcile(&mut self) -> bool {
        self.sort_pending();
        let mut did_work = self.exchange();

        if self.synchronous {
            if self.is_loader_running() {
                self.stop_loader();
            }
            for kind in LoadKind::ALL {
                did_work |= self
                    .shared
                    .process_requests(kind, RetirePolicy::SingleAttempt);
            }
            // Install what was just loaded before returning.
            did_work |= self.exchange();
        } else if !self.is_loader_running() {
            self.start_loader();
        }

        let trimmed = self.imagery_pool.trim();
        if trimmed > 0 {
            log::trace!("Released {} spare imagery handles", trimmed);
        }

        did_work
    }

    /// Orders each pending queue so the most urgent request is at the back.
    fn sort_pending(&mut self) {
        let Self {
            pending,
            requests,
            tree,
            ..
        } = self;
        debug_assert_eq!(requests.len(), pending.iter().map(Vec::len).sum::<usize>());
        for queue in pending.iter_mut() {
            queue.sort_by_key(|&id| {
                let request = &requests[id];
                (
                    FloatOrd(request.priority),
                    FloatOrd(tree[request.node].heat()),
                )
            });
        }
    }

    /// Installs retired loads, clears stale request slots and refills them from the pending queues.
    fn exchange(&mut self) -> bool {
        let shared = self.shared.clone();
        let mut handoff = shared.handoff.lock();
        let mut did_work = false;

        for kind in LoadKind::ALL {
            for request in handoff.kind_mut(kind).retired.take_all() {
                self.finish(request);
                did_work = true;
            }

            let tree = &self.tree;
            let stale = handoff
                .kind_mut(kind)
                .requests
                .take_where(|r| tree.has_resident(r.node, kind));
            for request in stale {
                self.forget(request.node, kind);
                self.stats.stale += 1;
                did_work = true;
            }

            while !handoff.kind(kind).requests.is_full() {
                let request = match self.pop_pending(kind) {
                    Some(r) => r,
                    None => break,
                };
                let node = request.node;
                if let Err(request) = handoff.kind_mut(kind).requests.push(request) {
                    self.requeue(request);
                    break;
                }
                self.pipeline.insert((node, kind), Tracked::Dispatched);
                did_work = true;
            }
        }

        let dropped = mem::take(&mut handoff.dropped);
        drop(handoff);

        for (node, kind) in dropped {
            self.forget(node, kind);
            did_work = true;
        }

        did_work
    }

    fn finish(&mut self, mut request: LoadRequest) {
        let LoadRequest { node, kind, .. } = request;
        self.pipeline.remove(&(node, kind));

        self.tree.get_mut(node).clear_demands(kind);

        let payload = match request.payload.take() {
            Some(p) => p,
            None => {
                debug_assert!(false, "retired a {} request without a payload", kind);
                return;
            }
        };

        // A drain may install leaf geometry before its ancestors.
        let exempt = self.preloading && kind == LoadKind::Geometry;
        if !exempt && !self.tree.parent_has_resident(node, kind) {
            log::debug!(
                "Discarding {} for chunk {}: its parent was evicted while loading",
                kind,
                request.key
            );
            self.stats.discarded += 1;
            return;
        }

        match payload {
            LoadedPayload::Geometry(mut geometry) => {
                geometry.prepare();
                self.tree.install_geometry(node, geometry);
            }
            LoadedPayload::Imagery(image) => {
                let previous = self.tree.take_imagery(node);
                let handle = self.imagery_pool.install(&image, previous);
                self.tree.install_imagery(node, handle);
            }
        }
        self.stats.installed += 1;
    }

    /// Pops the most urgent pending request whose target still needs loading.
    fn pop_pending(&mut self, kind: LoadKind) -> Option<LoadRequest> {
        while let Some(id) = self.pending[kind.index()].pop() {
            let request = self.requests.remove(id);
            if self.tree.has_resident(request.node, kind) {
                self.forget(request.node, kind);
                self.stats.stale += 1;
                continue;
            }
            return Some(request);
        }
        None
    }

    fn enqueue(&mut self, request: LoadRequest) {
        let key = (request.node, request.kind);
        let queue = &mut self.pending[request.kind.index()];
        let id = self.requests.insert(request);
        queue.push(id);
        self.pipeline.insert(key, Tracked::Pending(id));
    }

    fn requeue(&mut self, mut request: LoadRequest) {
        request.payload = None;
        self.enqueue(request);
    }

    fn forget(&mut self, node: NodeId, kind: LoadKind) {
        self.pipeline.remove(&(node, kind));
        self.tree.get_mut(node).clear_demands(kind);
    }
}

impl Drop for TerrainCache {
    fn drop(&mut self) {
        if let Some(handle) = self.loader.take() {
            self.shared.set_running(false);
            if handle.join().is_err() {
                log::error!("Loader thread panicked");
            }
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
