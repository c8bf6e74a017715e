//! Compute context lifecycle management
//!
//! One context per runtime, created lazily on first use and destroyed exactly
//! once at teardown. Initialization is one-shot on success and retry-on-failure:
//! a failed step never records partial state, so the next call starts the
//! sequence from the beginning. The whole sequence runs under an internal
//! mutex, making concurrent first-calls race-free by construction.

use std::sync::{Arc, Mutex};

use crate::backend::driver::{
    ComputeDriver, ComputeResult, DeviceHandle, RawContext,
};

/// Device ordinal used for context creation. No multi-GPU support.
const DEVICE_ORDINAL: i32 = 0;

#[derive(Debug, Clone, Copy)]
struct ActiveContext {
    device: DeviceHandle,
    raw: RawContext,
}

/// Lazy, internally-synchronized owner of the single compute context.
pub struct ContextManager {
    driver: Arc<dyn ComputeDriver>,
    state: Mutex<Option<ActiveContext>>,
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl ContextManager {
    pub fn new(driver: Arc<dyn ComputeDriver>) -> Self {
        ContextManager {
            driver,
            state: Mutex::new(None),
        }
    }

    /// Initialize the compute context if it does not exist yet.
    ///
    /// On first call performs, in strict order: driver init, device lookup
    /// (always device 0), context creation, and marking the context current
    /// for the calling thread. Any step's failure aborts the call with
    /// `ComputeError::BackendFailure(code)` and leaves the manager
    /// uninitialized, so the next call retries from the beginning.
    /// Subsequent calls after success are no-ops.
    pub fn ensure_context(&self) -> ComputeResult<()> {
        let mut state = self.state.lock()?;
        if state.is_some() {
            return Ok(());
        }

        self.driver.init()?;
        let device = self.driver.device_get(DEVICE_ORDINAL)?;
        let raw = self.driver.ctx_create(device)?;

        if let Err(err) = self.driver.ctx_set_current(raw) {
            // Don't leak the context the retry path would otherwise recreate.
            if let Err(destroy_err) = self.driver.ctx_destroy(raw) {
                tracing::warn!(
                    "failed to destroy context after set-current failure: {}",
                    destroy_err
                );
            }
            return Err(err);
        }

        tracing::debug!(
            "compute context created on device {} (handle {:#x})",
            device,
            raw
        );
        *state = Some(ActiveContext { device, raw });
        Ok(())
    }

    /// True once `ensure_context` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    /// The driver this manager (and everything above it) talks to.
    pub fn driver(&self) -> &Arc<dyn ComputeDriver> {
        &self.driver
    }
}

impl Drop for ContextManager {
    fn drop(&mut self) {
        let ctx = self
            .state
            .lock()
            .map(|mut s| s.take())
            .unwrap_or_default();
        if let Some(active) = ctx {
            tracing::debug!("destroying compute context {:#x}", active.raw);
            if let Err(err) = self.driver.ctx_destroy(active.raw) {
                tracing::warn!("context destroy failed at teardown: {}", err);
            }
        }
    }
}
