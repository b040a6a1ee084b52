//! Shared domain types for the DreamCanvas backend.
//!
//! - [`task`]: generation task records, statuses and metadata.
//! - [`project`]: project manifest, assets and generation history.
//! - [`storage`]: the [`ProjectStore`](storage::ProjectStore) port and its
//!   on-disk implementation.
//! - [`backup`]: zip snapshots of the storage root.
//! - [`error`]: the domain error type shared by every crate.

pub mod backup;
pub mod error;
pub mod hashing;
pub mod project;
pub mod storage;
pub mod task;
pub mod types;
