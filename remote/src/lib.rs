//! HTTP helpers around a [`coco_taxonomy::CoCo`] registry.

mod client;
mod config;
mod error;

pub use client::LogNotifier;
pub use client::Notifier;
pub use client::Remote;
pub use client::TimeRange;
pub use config::DEFAULT_HOST;
pub use config::RemoteConfig;
pub use error::RemoteError;
pub use error::Result;
