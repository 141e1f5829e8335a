//! # Avfuse Store
//!
//! Persists finished artifacts in a remote object store. The production
//! implementation uploads over authenticated multipart HTTP with a
//! SHA-256 request signature; the [`ArtifactStore`] trait is the seam the
//! pipeline depends on, so tests substitute an in-memory store.

pub mod error;
pub mod signed;
mod store;

pub use error::StoreError;
pub use signed::{SignedUploadStore, StoreConfig};
pub use store::{ArtifactStore, StoredArtifact, UploadHints};
