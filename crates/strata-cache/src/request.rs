use crate::coordinates::NodeKey;
use crate::payload::LoadedPayload;
use crate::tree::NodeId;

use std::fmt;

/// The two kinds of payload a chunk can hold.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum LoadKind {
    Geometry = 0,
    Imagery = 1,
}

impl LoadKind {
    pub const ALL: [LoadKind; 2] = [LoadKind::Geometry, LoadKind::Imagery];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            LoadKind::Geometry => "geometry",
            LoadKind::Imagery => "imagery",
        }
    }
}

impl fmt::Display for LoadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a chunk was requested. Only used for diagnostics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadReason {
    /// A parent wants to split and needs its children's geometry.
    CanSplitChildPreload,
    /// Geometry requested ahead of time because the chunk is close to splitting.
    WarmUpPreload,
    /// Authoritative preload of the whole leaf level, e.g. for collision.
    ServerPreload,
    /// The chunk's desired imagery level rose above what is resident.
    UpdateTextureLoad,
}

impl fmt::Display for LoadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadReason::CanSplitChildPreload => "can split",
            LoadReason::WarmUpPreload => "warm up",
            LoadReason::ServerPreload => "server preload",
            LoadReason::UpdateTextureLoad => "texture lod too low",
        })
    }
}

/// Identifies one consumer of a cache.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InstanceId(pub u32);

/// Who is asking for a load.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Requester {
    /// Administrative requests, like server preloading. They are accepted without a resident parent.
    Internal,
    Instance(InstanceId),
}

impl Requester {
    #[inline]
    pub fn is_internal(&self) -> bool {
        matches!(self, Requester::Internal)
    }
}

impl From<InstanceId> for Requester {
    fn from(id: InstanceId) -> Self {
        Requester::Instance(id)
    }
}

/// Where a `(node, kind)` pair currently sits in the load pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestStage {
    /// Not requested, or the last request was discarded.
    Unrequested,
    /// Waiting in a pending queue.
    Queued,
    /// Handed to the loader, either waiting in a request slot or being loaded.
    InFlight,
    /// Loaded and waiting in a retire slot for the next sync.
    Retired,
    /// The payload is resident.
    Installed,
}

/// One pending or in-flight load, owned by the cache until it is installed or thrown away.
#[derive(Debug)]
pub struct LoadRequest {
    pub(crate) node: NodeId,
    pub(crate) key: NodeKey,
    pub(crate) kind: LoadKind,
    pub(crate) priority: f32,
    pub(crate) reason: LoadReason,
    pub(crate) payload: Option<LoadedPayload>,
}

impl LoadRequest {
    pub(crate) fn new(
        node: NodeId,
        key: NodeKey,
        kind: LoadKind,
        priority: f32,
        reason: LoadReason,
    ) -> Self {
        Self {
            node,
            key,
            kind,
            priority,
            reason,
            payload: None,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn kind(&self) -> LoadKind {
        self.kind
    }

    pub fn priority(&self) -> f32 {
        self.priority
    }

    pub fn reason(&self) -> LoadReason {
        self.reason
    }

    pub fn is_loaded(&self) -> bool {
        self.payload.is_some()
    }
}
