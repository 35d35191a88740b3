//! ---
//! fleet_section: "04-orchestration"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Cooperative, optionally deferred shutdown requests."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use steamfleet_device::ShutdownRequester;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownRequest {
    None,
    At(Instant),
    Now,
}

impl ShutdownRequest {
    pub fn is_pending(&self) -> bool {
        !matches!(self, ShutdownRequest::None)
    }
}

/// Shared switch observed by the supervisor loop.
///
/// A deferred request is a deadline the loop waits on, so it disappears with
/// the loop if the process stops first.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<ShutdownRequest>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ShutdownRequest::None);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownRequest> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ShutdownRequest {
        *self.tx.borrow()
    }

    pub fn is_requested(&self) -> bool {
        self.current().is_pending()
    }

    /// Stop at the top of the next loop iteration. Overrides a pending deadline.
    pub fn request_now(&self) {
        self.tx.send_if_modified(|request| {
            if *request == ShutdownRequest::Now {
                return false;
            }
            *request = ShutdownRequest::Now;
            true
        });
        info!("shutdown requested");
    }

    /// Stop once `delay` has elapsed. Ignored while another request is pending.
    pub fn request_after(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let accepted = self.tx.send_if_modified(|request| {
            if request.is_pending() {
                return false;
            }
            *request = ShutdownRequest::At(deadline);
            true
        });
        if accepted {
            info!(delay = ?delay, "deferred shutdown scheduled");
        }
        accepted
    }
}

impl ShutdownRequester for ShutdownHandle {
    fn request_shutdown(&self, delay: Duration) -> bool {
        self.request_after(delay)
    }
}
