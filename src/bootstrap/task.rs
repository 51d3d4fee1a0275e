//! Off-thread bootstrap runs on tokio's blocking pool.

use tokio::task::JoinHandle;

use super::{generate_cancellable, AnchorPoint, BootstrapConfig, CancelToken, ConfidenceContour, UncertaintyModel};
use crate::{Error, Result};

/// An in-flight contour computation.
///
/// Dropping the task does not stop the computation; call `cancel` when
/// the result is no longer wanted (e.g. the anchor selection changed).
#[derive(Debug)]
pub struct ContourTask {
    cancel: CancelToken,
    handle: JoinHandle<Result<ConfidenceContour>>,
}

impl ContourTask {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the contour. A cancelled run yields `Cancelled`.
    pub async fn join(self) -> Result<ConfidenceContour> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::Cancelled),
            Err(e) => Err(Error::ExecutionError(format!("bootstrap task failed: {e}"))),
        }
    }
}

/// Start a bootstrap run. Must be called from within a tokio runtime.
pub fn spawn(anchor: AnchorPoint, uncertainty: UncertaintyModel, config: BootstrapConfig) -> ContourTask {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let _span = tracing::debug_span!("bootstrap", seed = config.seed, level = config.level).entered();
        generate_cancellable(&anchor, &uncertainty, &config, &token)
    });
    ContourTask { cancel, handle }
}
