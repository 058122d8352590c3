//! Readiness signaling
//!
//! Once setup succeeds the runner tells the outside world it can take
//! predictions. In a container that means touching a file a kubelet exec
//! probe looks for.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Receives the one-time "ready" signal after a successful setup
pub trait ReadinessProbe: Send + Sync {
    fn ready(&self);
}

/// Marks readiness by creating a file
///
/// Without a path the probe does nothing. Only the first signal has any
/// effect.
#[derive(Debug, Default)]
pub struct FileReadinessProbe {
    path: Option<PathBuf>,
    signaled: AtomicBool,
}

impl FileReadinessProbe {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            signaled: AtomicBool::new(false),
        }
    }
}

impl ReadinessProbe for FileReadinessProbe {
    fn ready(&self) {
        if self.signaled.swap(true, Ordering::SeqCst) {
            debug!("Readiness already signaled");
            return;
        }

        let Some(path) = &self.path else {
            debug!("No readiness file configured");
            return;
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Failed to create {}: {}", parent.display(), e);
                return;
            }
        }

        match std::fs::File::create(path) {
            Ok(_) => info!("Marked runner ready at {}", path.display()),
            Err(e) => warn!("Failed to write readiness file {}: {}", path.display(), e),
        }
    }
}
