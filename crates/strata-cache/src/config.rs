use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Capacity of each of the four slot arrays shared with the loader thread.
    pub slot_capacity: usize,
    /// How many spare imagery handles to keep around. Defaults to twice the slot capacity.
    pub recycle_capacity: Option<usize>,
    /// Loader sleep after an iteration that loaded something.
    pub busy_backoff_ms: u64,
    /// Loader sleep after an idle iteration.
    pub idle_backoff_ms: u64,
    /// Loader sleep between attempts to find a free retire slot.
    pub retire_retry_ms: u64,
    /// Run every load inline during `sync` instead of on the loader thread.
    pub synchronous: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            slot_capacity: 3,
            recycle_capacity: None,
            busy_backoff_ms: 1,
            idle_backoff_ms: 10,
            retire_retry_ms: 1,
            synchronous: false,
        }
    }
}

impl CacheConfig {
    pub fn synchronous() -> Self {
        Self {
            synchronous: true,
            ..Default::default()
        }
    }

    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity.max(1)
    }

    pub fn recycle_target(&self) -> usize {
        self.recycle_capacity
            .unwrap_or(2 * self.slot_capacity())
    }

    pub fn busy_backoff(&self) -> Duration {
        Duration::from_millis(self.busy_backoff_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn retire_retry(&self) -> Duration {
        Duration::from_millis(self.retire_retry_ms)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
