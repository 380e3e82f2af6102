//! Acquisition pipeline: staleness gate, strategy chains, persistence and
//! asset mirroring behind the public profile operations.

pub mod error;
pub mod mirror;
pub mod service;
pub mod view;

pub use error::PipelineError;
pub use mirror::{
    needs_mirror, object_key, AssetMirror, MirrorDispatcher, MirrorReport, MirrorSettings,
};
pub use service::{ProfileService, ServiceSettings};
pub use view::{AnalyticsView, ProfileView, ViewSource};
