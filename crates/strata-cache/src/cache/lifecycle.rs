use super::TerrainCache;
use crate::error::{CacheError, CacheResult};
use crate::request::{LoadKind, LoadReason, Requester};
use crate::tree::NodeId;
use crate::worker::{spawn_loader, RetirePolicy};

impl TerrainCache {
    /// Starts the loader thread if it is not already running.
    ///
    /// Requests left in the request slots by an earlier run go back to the pending queues first, so they are re-sorted
    /// against everything requested since.
    pub fn start_loader(&mut self) {
        if self.is_loader_running() {
            return;
        }

        let leftovers = {
            let mut handoff = self.shared.handoff.lock();
            LoadKind::ALL.map(|kind| handoff.kind_mut(kind).requests.take_all())
        };
        for request in leftovers.into_iter().flatten() {
            self.requeue(request);
        }

        self.shared.set_running(true);
        match spawn_loader(self.shared.clone()) {
            Ok(handle) => {
                self.loader = Some(handle);
                log::debug!("Started loader thread");
            }
            Err(e) => {
                self.shared.set_running(false);
                self.synchronous = true;
                log::error!("Failed to spawn loader thread, loading synchronously: {}", e);
            }
        }
    }

    /// Stops and joins the loader thread, then installs whatever it finished.
    pub fn stop_loader(&mut self) {
        let handle = match self.loader.take() {
            Some(h) => h,
            None => return,
        };

        self.shared.set_running(false);
        if handle.join().is_err() {
            log::error!("Loader thread panicked");
        }

        self.sort_pending();
        self.exchange();
        log::debug!("Stopped loader thread");
    }

    pub fn inc_ownership(&mut self) {
        self.owner_count += 1;
        if self.owner_count == 1 && !self.synchronous {
            self.start_loader();
        }
    }

    /// The last owner leaving stops the loader and evicts everything.
    pub fn dec_ownership(&mut self) {
        debug_assert!(self.owner_count > 0, "ownership released more often than taken");
        self.owner_count = self.owner_count.saturating_sub(1);
        if self.owner_count == 0 {
            self.stop_loader();
            self.purge();
        }
    }

    /// Loads everything that is currently requested before returning.
    ///
    /// Runs inline until a whole pass over both kinds does no work, then restores the previous mode. Returns the number of
    /// passes.
    pub fn precache(&mut self) -> u32 {
        let was_synchronous = self.synchronous;
        let was_preloading = self.preloading;
        self.synchronous = true;
        self.preloading = true;
        self.stop_loader();

        // The sync at the end of each pass runs one more step per kind, which fills the last free retire slot.
        let steps = self.config.slot_capacity().saturating_sub(1).max(1);
        let mut passes = 0;
        loop {
            passes += 1;
            let mut did_work = false;
            for kind in LoadKind::ALL {
                for _ in 0..steps {
                    did_work |= self
                        .shared
                        .process_requests(kind, RetirePolicy::SingleAttempt);
                }
            }
            did_work |= self.reconcile();
            if !did_work {
                break;
            }
        }

        self.synchronous = was_synchronous;
        self.preloading = was_preloading;
        log::info!("Precache finished after {} passes", passes);

        if !self.synchronous {
            self.start_loader();
        }

        passes
    }

    /// Evicts every resident payload.
    pub fn purge(&mut self) {
        let mut evicted = 0;
        for i in 0..self.tree.len() {
            let id = NodeId(i as u32);
            evicted += usize::from(self.tree.take_geometry(id).is_some());
            evicted += usize::from(self.tree.take_imagery(id).is_some());
        }
        self.imagery_pool.clear();
        log::info!("Purged {} payloads", evicted);
    }

    /// Removes one payload. Imagery handles are kept for reuse. Returns `false` if nothing was resident.
    pub fn evict(&mut self, node: NodeId, kind: LoadKind) -> bool {
        match kind {
            LoadKind::Geometry => self.tree.take_geometry(node).is_some(),
            LoadKind::Imagery => match self.tree.take_imagery(node) {
                Some(handle) => {
                    self.imagery_pool.recycle(handle);
                    true
                }
                None => false,
            },
        }
    }

    /// Pins a payload. Returns the new reference count.
    pub fn add_reference(&mut self, node: NodeId, kind: LoadKind) -> u32 {
        self.tree.get_mut(node).add_reference(kind)
    }

    /// Releases a pin taken with [`TerrainCache::add_reference`]. When the count reaches zero the payload is evicted and
    /// `requester`'s demand for it is forgotten.
    pub fn release_reference(&mut self, node: NodeId, kind: LoadKind, requester: Requester) -> u32 {
        let chunk = self.tree.get_mut(node);
        let count = chunk.release_reference(kind);
        if count == 0 {
            chunk.clear_demand(kind, requester);
            self.evict(node, kind);
        }
        count
    }

    /// Loads the geometry of every leaf and pins it, for consumers that need the full-detail terrain everywhere.
    pub fn load_server_info(&mut self) -> CacheResult<()> {
        let leaves: Vec<NodeId> = self.tree.leaves().collect();
        for &leaf in &leaves {
            if !self.tree.has_resident(leaf, LoadKind::Geometry) {
                self.request_geom_load(leaf, Requester::Internal, 1.0, LoadReason::ServerPreload);
            }
            self.add_reference(leaf, LoadKind::Geometry);
        }

        self.precache();

        let missing = leaves
            .iter()
            .filter(|&&leaf| !self.tree.has_resident(leaf, LoadKind::Geometry))
            .count();
        if missing > 0 {
            return Err(CacheError::IncompletePreload { missing });
        }

        log::info!("Preloaded geometry for {} leaf chunks", leaves.len());
        Ok(())
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
    use crate::config::CacheConfig;
    use crate::coordinates::NodeKey;
    use crate::payload::{Geometry, ImageData};
    use crate::request::InstanceId;
    use crate::source::{ChunkSource, ProceduralSource};

    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    const A: Requester = Requester::Instance(InstanceId(1));

    fn cache(depth: u8, config: CacheConfig) -> TerrainCache {
        let source = ProceduralSource {
            patch_resolution: 2,
            texture_resolution: 2,
            ..ProceduralSource::new(depth)
        };
        TerrainCache::new(Arc::new(source), config).unwrap()
    }

    #[test]
    fn last_owner_stops_the_loader_and_purges() {
        let mut cache = cache(
            2,
            CacheConfig {
                idle_backoff_ms: 1,
                ..Default::default()
            },
        );
        let root = cache.tree().root();

        cache.inc_ownership();
        assert!(cache.is_loader_running());
        cache.inc_ownership();

        cache.request_geom_load(root, A, 1.0, LoadReason::WarmUpPreload);
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut frame = 0;
        while !cache.node(root).has_resident_geometry() {
            assert!(Instant::now() < deadline, "root never loaded");
            frame += 1;
            cache.sync(frame);
            thread::sleep(Duration::from_millis(1));
        }

        cache.dec_ownership();
        assert!(cache.is_loader_running());
        assert!(cache.node(root).has_resident_geometry());

        cache.dec_ownership();
        assert_eq!(cache.owner_count(), 0);
        assert!(!cache.is_loader_running());
        assert_eq!(cache.tree().num_resident(LoadKind::Geometry), 0);
    }

    #[test]
    fn synchronous_ownership_never_spawns() {
        let mut cache = cache(2, CacheConfig::synchronous());
        cache.inc_ownership();
        assert!(!cache.is_loader_running());
        cache.sync(0);
        assert!(!cache.is_loader_running());
        cache.dec_ownership();
    }

    #[test]
    fn released_imagery_is_recycled() {
        let mut cache = cache(2, CacheConfig::synchronous());
        let root = cache.tree().root();

        cache.request_tex_load(root, A, 1.0, LoadReason::UpdateTextureLoad);
        cache.sync(0);
        assert_eq!(cache.node(root).imagery().unwrap().generation(), 0);

        assert_eq!(cache.add_reference(root, LoadKind::Imagery), 1);
        assert_eq!(cache.add_reference(root, LoadKind::Imagery), 2);
        assert_eq!(cache.release_reference(root, LoadKind::Imagery, A), 1);
        assert!(cache.node(root).has_resident_imagery());
        assert_eq!(cache.release_reference(root, LoadKind::Imagery, A), 0);
        assert!(!cache.node(root).has_resident_imagery());
        assert_eq!(cache.recycled_imagery(), 1);

        // Reloading refreshes the spare handle instead of allocating another.
        cache.request_tex_load(root, A, 1.0, LoadReason::UpdateTextureLoad);
        cache.sync(1);
        assert_eq!(cache.node(root).imagery().unwrap().generation(), 1);
        assert_eq!(cache.recycled_imagery(), 0);
    }

    #[test]
    fn precache_restores_threaded_mode() {
        let mut cache = cache(
            3,
            CacheConfig {
                idle_backoff_ms: 1,
                ..Default::default()
            },
        );
        let root = cache.tree().root();
        cache.request_geom_load(root, A, 1.0, LoadReason::WarmUpPreload);
        cache.request_tex_load(root, A, 1.0, LoadReason::UpdateTextureLoad);

        assert!(cache.precache() >= 1);
        assert!(!cache.is_synchronous());
        assert!(cache.is_loader_running());
        assert!(cache.node(root).has_resident_geometry());
        assert!(cache.node(root).has_resident_imagery());

        cache.stop_loader();
        assert!(!cache.is_loader_running());
    }

    /// Serves geometry for everything except one leaf.
    struct HoleySource {
        inner: ProceduralSource,
        hole: NodeKey,
    }

    impl ChunkSource for HoleySource {
        fn tree_depth(&self) -> u8 {
            self.inner.tree_depth
        }

        fn load_geometry(&self, key: &NodeKey) -> CacheResult<Geometry> {
            if *key == self.hole {
                return Err(CacheError::MissingPayload {
                    key: *key,
                    kind: LoadKind::Geometry.name(),
                });
            }
            self.inner.load_geometry(key)
        }

        fn load_imagery(&self, key: &NodeKey) -> CacheResult<ImageData> {
            self.inner.load_imagery(key)
        }
    }

    #[test]
    fn server_preload_reports_missing_leaves() {
        let source = HoleySource {
            inner: ProceduralSource::new(2),
            hole: NodeKey::new(1, crate::glam::UVec2::new(1, 0)),
        };
        let mut cache = TerrainCache::new(Arc::new(source), CacheConfig::synchronous()).unwrap();

        match cache.load_server_info() {
            Err(CacheError::IncompletePreload { missing }) => assert_eq!(missing, 1),
            other => panic!("expected an incomplete preload, got {:?}", other),
        }
        let stats = cache.stats();
        assert_eq!(stats.installed, 3);
        assert_eq!(stats.load_failures, 1);
        assert_eq!(cache.tree().num_resident(LoadKind::Geometry), 3);
    }
}
