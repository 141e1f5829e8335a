//! Lazy, at-most-once engine lifecycle.
//!
//! The engine costs minutes and gigabytes to bring up, so nothing loads at
//! process start. The first job to need the engine drives weight
//! provisioning and loading while later arrivals wait on the same cell;
//! whatever the attempt produces, success or failure, is cached for the
//! rest of the process lifetime. A failed load is terminal: every later
//! job is answered with the original error without retrying.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::contract::{
    EngineLoader, FusionEngine, GenerationRequest, GenerationResult, WeightProvider,
};
use crate::error::EngineError;

/// Observable lifecycle stage, for logs and health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Unloaded => "unloaded",
            LifecycleStage::Loading => "loading",
            LifecycleStage::Ready => "ready",
            LifecycleStage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ready engine plus the invocation lock that serializes generate calls.
///
/// The engine saturates the accelerator; running two passes at once would
/// only thrash device memory, so callers queue here.
pub struct EngineHandle {
    engine: Box<dyn FusionEngine>,
    invoke_lock: Mutex<()>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

impl EngineHandle {
    pub fn new(engine: Box<dyn FusionEngine>) -> Self {
        Self {
            engine,
            invoke_lock: Mutex::new(()),
        }
    }

    /// Run one generation pass, waiting for any in-flight pass to finish
    /// first.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, EngineError> {
        let _serialized = self.invoke_lock.lock().await;
        self.engine.generate(request).await
    }
}

enum CellState {
    Unloaded,
    Ready(Arc<EngineHandle>),
    Failed(EngineError),
}

/// Owns the engine cell and drives the `Unloaded -> Loading -> Ready|Failed`
/// transition exactly once.
pub struct EngineLifecycle {
    config: EngineConfig,
    weights: Arc<dyn WeightProvider>,
    loader: Arc<dyn EngineLoader>,
    cell: Mutex<CellState>,
    stage: parking_lot::Mutex<LifecycleStage>,
}

impl EngineLifecycle {
    pub fn new(
        config: EngineConfig,
        weights: Arc<dyn WeightProvider>,
        loader: Arc<dyn EngineLoader>,
    ) -> Self {
        Self {
            config,
            weights,
            loader,
            cell: Mutex::new(CellState::Unloaded),
            stage: parking_lot::Mutex::new(LifecycleStage::Unloaded),
        }
    }

    /// Resolved configuration the engine was (or will be) loaded with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current stage, readable without touching the cell lock.
    pub fn stage(&self) -> LifecycleStage {
        *self.stage.lock()
    }

    fn set_stage(&self, stage: LifecycleStage) {
        *self.stage.lock() = stage;
    }

    /// Get the ready engine, loading it first if this is the first call.
    ///
    /// Concurrent first calls are serialized on the cell lock: one caller
    /// loads, the rest wait and then observe the cached outcome.
    pub async fn handle(&self) -> Result<Arc<EngineHandle>, EngineError> {
        let mut cell = self.cell.lock().await;
        match &*cell {
            CellState::Ready(handle) => return Ok(Arc::clone(handle)),
            CellState::Failed(err) => return Err(err.clone()),
            CellState::Unloaded => {}
        }

        self.set_stage(LifecycleStage::Loading);
        info!(
            variant = %self.config.model_variant,
            device = self.config.device,
            "bringing fusion engine up"
        );

        match self.bring_up().await {
            Ok(handle) => {
                *cell = CellState::Ready(Arc::clone(&handle));
                self.set_stage(LifecycleStage::Ready);
                info!(variant = %self.config.model_variant, "fusion engine ready");
                Ok(handle)
            }
            Err(err) => {
                error!(error = %err, "fusion engine failed to come up; failure is terminal");
                *cell = CellState::Failed(err.clone());
                self.set_stage(LifecycleStage::Failed);
                Err(err)
            }
        }
    }

    async fn bring_up(&self) -> Result<Arc<EngineHandle>, EngineError> {
        let weight_path = self
            .weights
            .ensure(&self.config.model_variant, &self.config.ckpt_dir)
            .await?;
        debug!(path = %weight_path.display(), "weights available");

        let engine = self.loader.load(&self.config).await?;
        Ok(Arc::new(EngineHandle::new(engine)))
    }
}
