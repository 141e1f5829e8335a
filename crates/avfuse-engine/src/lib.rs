//! # Avfuse Engine
//!
//! This crate owns everything about the fusion engine: its parameter
//! contract, configuration resolution, weight provisioning and the lazy
//! lifecycle that guarantees the engine is constructed at most once per
//! process.
//!
//! The engine itself is opaque. The production implementation talks to a
//! local inference daemon over HTTP ([`sidecar`]); tests substitute their
//! own [`FusionEngine`] and [`EngineLoader`] implementations.

pub mod config;
pub mod contract;
pub mod error;
pub mod lifecycle;
pub mod sidecar;
pub mod weights;

pub use config::{EngineConfig, EngineOverrides, TargetDtype};
pub use contract::{
    AudioPayload, EngineLoader, FusionEngine, GenerationRequest, GenerationResult, VideoPayload,
    WeightProvider,
};
pub use error::{ConfigError, EngineError};
pub use lifecycle::{EngineHandle, EngineLifecycle, LifecycleStage};
pub use sidecar::{SidecarConfig, SidecarLoader};
pub use weights::ToolWeightProvider;
