use crate::config::CacheConfig;
use crate::handoff::{Handoff, SlotOccupancy};
use crate::request::{LoadKind, LoadRequest};
use crate::source::ChunkSource;
use crate::stats::LoaderCounters;
use crate::tree::ResidencyTable;

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What to do when a completed load finds every retire slot occupied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RetirePolicy {
    /// Keep polling for a free slot until the loader is told to stop. Used by the loader thread.
    WaitWhileRunning,
    /// Give up right away. Used when loads run inline on the consuming thread, which is the only one that frees retire slots.
    SingleAttempt,
}

/// State shared between a [`TerrainCache`](crate::TerrainCache) and its loader thread.
///
/// The loader only ever sees the hand-off slots, the residency table and the source. It never touches the node table.
pub(crate) struct LoaderShared {
    pub handoff: Mutex<Handoff>,
    pub counters: LoaderCounters,
    residency: Arc<ResidencyTable>,
    source: Arc<dyn ChunkSource>,
    running: AtomicBool,
    retire_retry: Duration,
    busy_backoff: Duration,
    idle_backoff: Duration,
}

impl LoaderShared {
    pub fn new(
        config: &CacheConfig,
        source: Arc<dyn ChunkSource>,
        residency: Arc<ResidencyTable>,
    ) -> Self {
        Self {
            handoff: Mutex::new(Handoff::new(config.slot_capacity())),
            counters: LoaderCounters::default(),
            residency,
            source,
            running: AtomicBool::new(false),
            retire_retry: config.retire_retry(),
            busy_backoff: config.busy_backoff(),
            idle_backoff: config.idle_backoff(),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn source(&self) -> &dyn ChunkSource {
        self.source.as_ref()
    }

    pub fn occupancy(&self) -> SlotOccupancy {
        self.handoff.lock().occupancy()
    }

    /// Loads the first dispatched request of `kind` whose target is still missing its payload.
    ///
    /// Returns `false` if there was nothing to load. The hand-off lock is not held during the load.
    pub fn process_requests(&self, kind: LoadKind, policy: RetirePolicy) -> bool {
        let request = {
            let mut handoff = self.handoff.lock();
            let residency = &self.residency;
            handoff
                .kind_mut(kind)
                .requests
                .take_first(|r| !residency.is_resident(r.node, kind))
        };
        let mut request = match request {
            Some(r) => r,
            None => return false,
        };

        log::trace!("Loading {} for chunk {} ({})", kind, request.key, request.reason);
        let started = Instant::now();
        match self.source.load(&request.key, kind) {
            Ok(payload) => {
                debug_assert_eq!(payload.kind(), kind);
                request.payload = Some(payload);
            }
            Err(e) => {
                log::error!("Failed to load {} for chunk {}: {}", kind, request.key, e);
                LoaderCounters::bump(&self.counters.failures);
                self.handoff.lock().dropped.push((request.node, kind));
                return true;
            }
        }
        self.retire(request, policy, started.elapsed());

        true
    }

    fn retire(&self, mut request: LoadRequest, policy: RetirePolicy, load_time: Duration) {
        let kind = request.kind;
        let mut first_attempt = true;
        loop {
            {
                let mut handoff = self.handoff.lock();
                if first_attempt {
                    handoff.load_timer.complete_item(load_time);
                    first_attempt = false;
                }
                match handoff.kind_mut(kind).retired.push(request) {
                    Ok(_) => return,
                    Err(r) => request = r,
                }
                if policy == RetirePolicy::SingleAttempt || !self.is_running() {
                    log::warn!(
                        "No free retire slot for {} of chunk {}; dropping the loaded payload",
                        kind,
                        request.key
                    );
                    LoaderCounters::bump(&self.counters.dropped);
                    handoff.dropped.push((request.node, kind));
                    return;
                }
            }
            thread::sleep(self.retire_retry);
        }
    }
}

pub(crate) fn spawn_loader(shared: Arc<LoaderShared>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("strata-loader".into())
        .spawn(move || run_loader(&shared))
}

fn run_loader(shared: &LoaderShared) {
    log::debug!("Loader thread started");

    let mut iterations = 0u64;
    while shared.is_running() {
        let mut did_work = false;
        for kind in LoadKind::ALL {
            did_work |= shared.process_requests(kind, RetirePolicy::WaitWhileRunning);
        }
        iterations += 1;
        LoaderCounters::bump(&shared.counters.iterations);

        thread::sleep(if did_work {
            shared.busy_backoff
        } else {
            shared.idle_backoff
        });
    }

    log::debug!("Loader thread exiting after {} iterations", iterations);
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
    use crate::request::LoadReason;
    use crate::source::ProceduralSource;
    use crate::tree::{ChunkTree, NodeId};

    fn shared(capacity: usize, source: ProceduralSource) -> (ChunkTree, LoaderShared) {
        let tree = ChunkTree::new(source.tree_depth);
        let config = CacheConfig {
            slot_capacity: capacity,
            ..Default::default()
        };
        let shared = LoaderShared::new(&config, Arc::new(source), tree.residency().clone());
        (tree, shared)
    }

    fn dispatch(shared: &LoaderShared, tree: &ChunkTree, id: NodeId, kind: LoadKind) {
        let request = LoadRequest::new(id, tree[id].key(), kind, 1.0, LoadReason::WarmUpPreload);
        assert!(shared
            .handoff
            .lock()
            .kind_mut(kind)
            .requests
            .push(request)
            .is_ok());
    }

    #[test]
    fn full_retire_slots_drop_inline_loads() {
        let (tree, shared) = shared(4, ProceduralSource::new(3));
        let mut leaves = tree.leaves();

        for id in leaves.by_ref().take(4) {
            dispatch(&shared, &tree, id, LoadKind::Geometry);
        }
        for _ in 0..4 {
            assert!(shared.process_requests(LoadKind::Geometry, RetirePolicy::SingleAttempt));
        }
        assert!(!shared.process_requests(LoadKind::Geometry, RetirePolicy::SingleAttempt));

        let fifth = leaves.next().unwrap();
        dispatch(&shared, &tree, fifth, LoadKind::Geometry);
        assert!(shared.process_requests(LoadKind::Geometry, RetirePolicy::SingleAttempt));

        let handoff = shared.handoff.lock();
        let occupancy = handoff.occupancy();
        assert_eq!(occupancy.geometry_retired, 4);
        assert_eq!(occupancy.geometry_requests, 0);
        assert!(handoff
            .kind(LoadKind::Geometry)
            .retired
            .iter()
            .all(LoadRequest::is_loaded));
        assert_eq!(handoff.dropped, vec![(fifth, LoadKind::Geometry)]);
        assert_eq!(handoff.load_timer.items_completed(), 5);
        assert_eq!(shared.counters.dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn load_failures_are_reported_as_drops() {
        let source = ProceduralSource {
            imagery_depth: 0,
            ..ProceduralSource::new(2)
        };
        let (tree, shared) = shared(2, source);
        dispatch(&shared, &tree, tree.root(), LoadKind::Imagery);

        assert!(shared.process_requests(LoadKind::Imagery, RetirePolicy::SingleAttempt));

        let handoff = shared.handoff.lock();
        assert!(handoff.occupancy().is_idle());
        assert_eq!(handoff.dropped, vec![(tree.root(), LoadKind::Imagery)]);
        assert_eq!(shared.counters.failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn loader_thread_retires_dispatched_requests() {
        let (tree, shared) = shared(3, ProceduralSource::new(2));
        let shared = Arc::new(shared);
        dispatch(&shared, &tree, tree.root(), LoadKind::Geometry);
        dispatch(&shared, &tree, tree.root(), LoadKind::Imagery);

        shared.set_running(true);
        let handle = spawn_loader(shared.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let occupancy = shared.occupancy();
            if occupancy.geometry_retired == 1 && occupancy.imagery_retired == 1 {
                break;
            }
            assert!(Instant::now() < deadline, "loader never retired its requests");
            thread::sleep(Duration::from_millis(1));
        }

        shared.set_running(false);
        handle.join().unwrap();
        assert!(shared.counters.iterations.load(Ordering::Relaxed) > 0);
    }
}
