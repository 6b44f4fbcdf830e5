//! Connectivity probe.
//!
//! The sync engine checks connectivity before each cycle and skips the
//! network entirely while offline. Implementations should answer from
//! cached platform state, not by probing the network.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Trait for answering "is the device online right now".
pub trait Connectivity: Send + Sync {
    /// Whether the device currently has network connectivity.
    fn is_online(&self) -> bool;
}

/// Connectivity source that always reports online.
///
/// The default for environments without a platform signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl AlwaysOnline {
    /// Create a new always-online probe.
    pub fn new() -> Self {
        Self
    }
}

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Toggleable connectivity for testing.
///
/// Starts online. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct ManualConnectivity {
    online: Arc<AtomicBool>,
}

impl ManualConnectivity {
    /// Create a probe that starts online.
    pub fn new() -> Self {
        Self {
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flip the reported connectivity.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Connectivity for ManualConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
