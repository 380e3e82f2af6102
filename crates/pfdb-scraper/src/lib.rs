//! Upstream acquisition: rate-limited HTTP, raw response shapes, the
//! normalizer, and the cascading fetch strategies.

pub mod client;
pub mod error;
pub mod meta;
pub mod normalize;
pub mod pagination;
pub mod parse;
pub mod rate_limit;
pub mod strategy;
pub mod types;

pub use client::{ClientSettings, HttpFetch, HttpResponse, ReqwestFetcher, UpstreamClient};
pub use error::{ErrorClass, ScraperError};
pub use normalize::{normalize_content, normalize_profile};
pub use pagination::ContentAggregator;
pub use rate_limit::SlidingWindowLimiter;
pub use strategy::{
    ContentStrategy, FetchStrategyChain, OwnerRef, ProfileFetch, ProfileStrategy, StrategyPage,
};
pub use types::{RawContent, RawProfile};
