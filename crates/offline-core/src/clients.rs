//! Control over the clients whose requests are intercepted.

use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Host-side switch that routes clients through the cache manager.
pub trait Clients: Send + Sync {
    /// Take control of every client immediately, without waiting for reloads.
    fn claim(&self) -> Result<()>;

    /// Whether requests are currently being intercepted.
    fn is_controlled(&self) -> bool;
}

/// In-process client control: a single flag consulted for every request.
#[derive(Debug, Default)]
pub struct ClientGate {
    controlled: AtomicBool,
}

impl ClientGate {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clients for ClientGate {
    fn claim(&self) -> Result<()> {
        if !self.controlled.swap(true, Ordering::SeqCst) {
            info!("Clients claimed; requests are now intercepted");
        }
        Ok(())
    }

    fn is_controlled(&self) -> bool {
        self.controlled.load(Ordering::SeqCst)
    }
}
