//! Generation task orchestration.
//!
//! [`TaskRegistry`] accepts generation requests, submits them through a
//! [`JobClient`](dreamcanvas_jimeng::JobClient), polls in-flight jobs in the
//! background until they finish, time out or are cancelled, and hands
//! successful results to the [`AssetPersister`], which merges them into
//! project storage.

pub mod config;
pub mod persist;
mod poller;
pub mod registry;
pub mod request;
pub mod trace;

pub use config::RegistryConfig;
pub use persist::{AssetPersister, PersistOutcome};
pub use registry::{CancelOutcome, TaskRegistry};
pub use request::SubmitRequest;
pub use trace::{TraceEvent, TraceKind};
