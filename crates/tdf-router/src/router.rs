//! The format router: cache, classification, pipeline selection and fallback.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tdf_cache::ConversionCache;
use tdf_config::{Config, RenderConfig, RolloutConfig};
use tdf_renderer::Registry;

use crate::deployment::{
    Classifier, DeploymentCache, DeploymentDescriptor, DeploymentKind, UrlPatternClassifier,
    rollout_bucket,
};
use crate::error::{ConvertError, PipelineError};
use crate::metrics::{Metrics, MetricsSnapshot, Tier};
use crate::pipeline::{FlatPipeline, Pipeline, TreePipeline};
use crate::result::{ConversionResult, OutputFormat, Payload};

/// Rollout flags resolved from configuration.
#[derive(Clone, Debug, Default)]
struct Rollout {
    force_format: Option<OutputFormat>,
    hosts: HashMap<String, OutputFormat>,
    server_tree_percent: u8,
}

impl From<&RolloutConfig> for Rollout {
    fn from(config: &RolloutConfig) -> Self {
        Self {
            force_format: config.force_format.map(OutputFormat::from),
            hosts: config
                .hosts
                .iter()
                .map(|(host, format)| (host.to_ascii_lowercase(), OutputFormat::from(*format)))
                .collect(),
            server_tree_percent: config.server_tree_percent,
        }
    }
}

impl Rollout {
    /// Format forced by a rollout flag for this deployment, if any.
    fn forced(&self, descriptor: &DeploymentDescriptor) -> Option<OutputFormat> {
        if let Some(format) = self.force_format {
            return Some(format);
        }
        let host = descriptor.host.as_deref()?;
        if let Some(format) = self.hosts.get(host) {
            return Some(*format);
        }
        (descriptor.kind == DeploymentKind::Server
            && rollout_bucket(host) < self.server_tree_percent)
            .then_some(OutputFormat::Tree)
    }
}

/// Builder for [`FormatRouter`], starting from a configuration.
pub struct FormatRouterBuilder {
    cache_capacity: usize,
    ttl: Duration,
    deployment_capacity: usize,
    rollout: Rollout,
    render: RenderConfig,
    registry: Option<Arc<Registry>>,
    tree: Option<Box<dyn Pipeline>>,
    flat: Option<Box<dyn Pipeline>>,
    classifier: Option<Box<dyn Classifier>>,
    cloud_domains: Vec<String>,
}

impl FormatRouterBuilder {
    fn new(config: &Config) -> Self {
        Self {
            cache_capacity: config.cache.capacity,
            ttl: config.deployment.ttl(),
            deployment_capacity: config.deployment.capacity,
            rollout: Rollout::from(&config.rollout),
            render: RenderConfig {
                validation: config.render.validation,
                max_table_rows: config.render.max_table_rows,
                max_list_depth: config.render.max_list_depth,
            },
            registry: None,
            tree: None,
            flat: None,
            classifier: None,
            cloud_domains: config.deployment.cloud_domains.clone(),
        }
    }

    /// Plugin registry for the default pipelines (built-ins otherwise).
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    #[must_use]
    pub fn with_tree_pipeline(mut self, pipeline: impl Pipeline + 'static) -> Self {
        self.tree = Some(Box::new(pipeline));
        self
    }

    #[must_use]
    pub fn with_flat_pipeline(mut self, pipeline: impl Pipeline + 'static) -> Self {
        self.flat = Some(Box::new(pipeline));
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: impl Classifier + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    #[must_use]
    pub fn build(self) -> FormatRouter {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(Registry::builtin()));
        let tree = self.tree.unwrap_or_else(|| {
            Box::new(TreePipeline::from_config(Arc::clone(&registry), &self.render))
        });
        let flat = self
            .flat
            .unwrap_or_else(|| Box::new(FlatPipeline::from_config(registry, &self.render)));
        let classifier = self
            .classifier
            .unwrap_or_else(|| Box::new(UrlPatternClassifier::new(&self.cloud_domains)));

        FormatRouter {
            tree,
            flat,
            classifier,
            deployments: DeploymentCache::with_capacity(self.ttl, self.deployment_capacity),
            cache: ConversionCache::new(self.cache_capacity),
            rollout: self.rollout,
            metrics: Metrics::default(),
        }
    }
}

/// Converts markup for a target deployment.
///
/// Construct one per process and share it by reference; every method takes
/// `&self` and is safe to call from many threads.
pub struct FormatRouter {
    tree: Box<dyn Pipeline>,
    flat: Box<dyn Pipeline>,
    classifier: Box<dyn Classifier>,
    deployments: DeploymentCache,
    cache: ConversionCache<ConversionResult>,
    rollout: Rollout,
    metrics: Metrics,
}

impl FormatRouter {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::builder(config).build()
    }

    #[must_use]
    pub fn builder(config: &Config) -> FormatRouterBuilder {
        FormatRouterBuilder::new(config)
    }

    /// Convert markup for the deployment at `base_url`.
    ///
    /// Never fails: when every pipeline fails, the input is returned as a
    /// flat payload unchanged. Results are cached per
    /// `(override_format, base_url, text)`.
    pub fn convert(
        &self,
        text: &str,
        base_url: &str,
        override_format: Option<OutputFormat>,
    ) -> ConversionResult {
        let start = Instant::now();
        let key = cache_key(text, base_url, override_format);
        let cached = self
            .cache
            .get_or_compute(&key, || self.compute(text, base_url, override_format));
        self.metrics.record_conversion(cached.hit, start.elapsed());
        cached.value
    }

    /// Decode `bytes` as UTF-8 and [`convert`](Self::convert) them.
    ///
    /// Undecodable input is the only error: it is counted in the metrics and
    /// leaves the caches untouched.
    pub fn convert_bytes(
        &self,
        bytes: &[u8],
        base_url: &str,
        override_format: Option<OutputFormat>,
    ) -> Result<ConversionResult, ConvertError> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            let err = ConvertError::InvalidUtf8(e);
            tracing::error!(base_url, error = %err, "Conversion failed in every tier");
            self.metrics.record_failure(&err.to_string());
            err
        })?;
        Ok(self.convert(text, base_url, override_format))
    }

    /// Classify `base_url`, reusing a classification younger than the TTL.
    pub fn classify(&self, base_url: &str) -> DeploymentDescriptor {
        let (descriptor, hit) = self
            .deployments
            .get_or_insert_with(&base_url.to_owned(), || self.classifier.classify(base_url));
        if !hit {
            tracing::debug!(base_url, kind = %descriptor.kind, "Classified deployment");
        }
        descriptor
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Conversion cache, for inspection.
    #[must_use]
    pub fn cache(&self) -> &ConversionCache<ConversionResult> {
        &self.cache
    }

    /// Deployment classification cache, for inspection.
    #[must_use]
    pub fn deployments(&self) -> &DeploymentCache {
        &self.deployments
    }

    fn compute(
        &self,
        text: &str,
        base_url: &str,
        override_format: Option<OutputFormat>,
    ) -> ConversionResult {
        let descriptor = self.classify(base_url);
        let natural = match descriptor.kind {
            DeploymentKind::Cloud => OutputFormat::Tree,
            DeploymentKind::Server | DeploymentKind::Unknown => OutputFormat::Flat,
        };
        let (format, rollout_applied) = match override_format {
            Some(format) => (format, false),
            None => match self.rollout.forced(&descriptor) {
                Some(forced) => (forced, forced != natural),
                None => (natural, false),
            },
        };

        let payload = self.run_chain(text, format);
        ConversionResult::new(payload, descriptor.kind, rollout_applied)
    }

    /// Run the selected pipeline and the weaker ones after it.
    fn run_chain(&self, text: &str, format: OutputFormat) -> Payload {
        let chain: Vec<&dyn Pipeline> = match format {
            OutputFormat::Tree => vec![&*self.tree, &*self.flat],
            OutputFormat::Flat => vec![&*self.flat],
        };

        for (i, pipeline) in chain.iter().enumerate() {
            match run_tier(*pipeline, text) {
                Ok(payload) => return payload,
                Err(e) => {
                    let next = if i + 1 < chain.len() {
                        Tier::Flat
                    } else {
                        Tier::PlainText
                    };
                    tracing::warn!(
                        from = %pipeline.format(),
                        to = %next,
                        error = %e,
                        "Conversion tier failed, falling back"
                    );
                    self.metrics.record_fallback(next, &error_chain(&e));
                }
            }
        }

        Payload::Flat(text.to_owned())
    }
}

/// Cache key material for one conversion request.
///
/// The URL is length-prefixed, so a `:` in the URL or the text cannot make
/// two different requests share a key.
fn cache_key(text: &str, base_url: &str, override_format: Option<OutputFormat>) -> String {
    format!(
        "{}:{}:{base_url}:{text}",
        override_format.map_or("auto", OutputFormat::as_str),
        base_url.len()
    )
}

/// Run one pipeline, turning a panic or a mismatched payload into an error.
fn run_tier(pipeline: &dyn Pipeline, text: &str) -> Result<Payload, PipelineError> {
    let payload = panic::catch_unwind(AssertUnwindSafe(|| pipeline.convert(text)))
        .unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(panic.as_ref()))))?;
    let expected = pipeline.format();
    if payload.format() != expected {
        return Err(PipelineError::WrongFormat {
            expected,
            actual: payload.format(),
        });
    }
    Ok(payload)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

/// Error message including its sources.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
