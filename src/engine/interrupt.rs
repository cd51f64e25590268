//! Cooperative run interruption.
//!
//! The coordinator polls the flag between batches: no new steps are launched once it is
//! set, and steps already in flight are marked interrupted and allowed to finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Shared interrupt flag; clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
  flag: Arc<AtomicBool>,
}

impl InterruptHandle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn interrupt(&self) {
    self.flag.store(true, Ordering::SeqCst);
  }

  pub fn is_interrupted(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
  }
}

/// Sets `handle` when the process receives Ctrl-C.
pub fn install_ctrl_c_handler(handle: InterruptHandle) -> JoinHandle<()> {
  tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => {
        info!("received ctrl-c, interrupting run");
        handle.interrupt();
      }
      Err(e) => warn!(error = %e, "could not listen for ctrl-c"),
    }
  })
}
