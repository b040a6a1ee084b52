//! Jimeng image-generation API client.
//!
//! - [`client`]: the [`JobClient`] port the task registry consumes, plus the
//!   normalized [`SubmissionResult`].
//! - [`api`]: [`JimengApi`], the HTTP implementation of that port.
//! - [`history`]: normalization of raw history records into statuses,
//!   result URLs and queue messages.
//! - [`payload`]: model/size resolution and generation payload building.
//! - [`token`]: per-request signing and cookie generation.

pub mod api;
pub mod client;
pub mod error;
pub mod history;
pub mod payload;
pub mod token;

pub use api::{JimengApi, JimengConfig};
pub use client::{GenerationParams, JobClient, SubmissionResult};
pub use error::JimengError;
