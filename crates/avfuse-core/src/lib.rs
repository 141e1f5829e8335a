//! # Avfuse Core
//!
//! This crate provides the canonical job model shared by every avfuse crate.
//! It owns the parameter defaults table, payload normalization and the
//! response envelope the worker emits for every job.
//!
//! ## Features
//!
//! - `JobPayload` / `GenerationJob` - raw request parsing and normalization
//! - `defaults` - the single source of truth for sampling parameter defaults
//! - `JobResponse` / `ErrorKind` - the uniform success/failure envelope

pub mod defaults;
pub mod job;
pub mod response;

pub use job::{GenerationJob, JobPayload, Mode, ValidationError};
pub use response::{ErrorKind, JobResponse};
