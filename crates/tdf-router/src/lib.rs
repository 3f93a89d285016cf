//! Deployment-aware markdown conversion.
//!
//! [`FormatRouter`] is the entry point. For each call it:
//!
//! 1. returns the cached result when the same `(override, base URL, text)`
//!    was converted before
//! 2. classifies the base URL as cloud, server or unknown (cached with a TTL)
//! 3. picks the tree pipeline for cloud and the flat pipeline otherwise,
//!    unless an override or a rollout flag says differently
//! 4. falls back from tree to flat to the unmodified input when a tier fails
//!
//! # Example
//!
//! ```
//! use tdf_config::Config;
//! use tdf_router::{DeploymentKind, FormatRouter, OutputFormat};
//!
//! let router = FormatRouter::new(&Config::default());
//!
//! let cloud = router.convert("**Done**", "https://acme.atlassian.net", None);
//! assert_eq!(cloud.format, OutputFormat::Tree);
//! assert_eq!(cloud.deployment_kind, DeploymentKind::Cloud);
//!
//! let server = router.convert("**Done**", "https://jira.corp.example", None);
//! assert_eq!(server.payload.as_flat(), Some("*Done*"));
//! ```

mod deployment;
mod error;
mod metrics;
mod pipeline;
mod result;
mod router;

pub use deployment::{
    Classifier, DeploymentCache, DeploymentDescriptor, DeploymentKind, UrlPatternClassifier,
    rollout_bucket,
};
pub use error::{ConvertError, PipelineError};
pub use metrics::{FallbackCounts, Metrics, MetricsSnapshot, Tier};
pub use pipeline::{FlatPipeline, Pipeline, TreePipeline};
pub use result::{ConversionResult, OutputFormat, Payload};
pub use router::{FormatRouter, FormatRouterBuilder};
