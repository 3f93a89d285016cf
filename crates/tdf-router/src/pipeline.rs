//! Conversion pipelines.
//!
//! The router runs pipelines through the [`Pipeline`] trait, so tests and
//! embedders can substitute their own tiers.

use std::sync::Arc;

use tdf_config::{RenderConfig, Validation};
use tdf_renderer::{
    FlatRenderer, Registry, RenderOptions, TreeRenderer, ValidationLevel, tokenize, validate,
};

use crate::error::PipelineError;
use crate::result::{OutputFormat, Payload};

/// One tier of the fallback chain.
pub trait Pipeline: Send + Sync {
    /// Format of the payloads this pipeline produces.
    fn format(&self) -> OutputFormat;

    /// Convert markup text.
    fn convert(&self, text: &str) -> Result<Payload, PipelineError>;
}

fn render_options(config: &RenderConfig) -> RenderOptions {
    RenderOptions {
        max_table_rows: config.max_table_rows,
        max_list_depth: config.max_list_depth,
    }
}

/// Tokenize, render a tree, then validate it.
pub struct TreePipeline {
    registry: Arc<Registry>,
    options: RenderOptions,
    validation: ValidationLevel,
}

impl TreePipeline {
    #[must_use]
    pub fn new(registry: Arc<Registry>, options: RenderOptions, validation: ValidationLevel) -> Self {
        Self {
            registry,
            options,
            validation,
        }
    }

    #[must_use]
    pub fn from_config(registry: Arc<Registry>, config: &RenderConfig) -> Self {
        let validation = match config.validation {
            Validation::Error => ValidationLevel::Error,
            Validation::Warn => ValidationLevel::Warn,
            Validation::Skip => ValidationLevel::Skip,
        };
        Self::new(registry, render_options(config), validation)
    }
}

impl Default for TreePipeline {
    fn default() -> Self {
        Self::new(
            Arc::new(Registry::builtin()),
            RenderOptions::default(),
            ValidationLevel::Error,
        )
    }
}

impl Pipeline for TreePipeline {
    fn format(&self) -> OutputFormat {
        OutputFormat::Tree
    }

    fn convert(&self, text: &str) -> Result<Payload, PipelineError> {
        let stream = tokenize(text, &self.registry);
        let rendered = TreeRenderer::new(&self.registry)
            .with_options(self.options.clone())
            .render_with_warnings(&stream);
        for warning in &rendered.warnings {
            tracing::debug!(%warning, "Render warning");
        }
        validate(&rendered.doc, self.validation).into_result()?;
        Ok(Payload::Tree(rendered.doc))
    }
}

/// Tokenize, then generate legacy wiki markup.
pub struct FlatPipeline {
    registry: Arc<Registry>,
    options: RenderOptions,
}

impl FlatPipeline {
    #[must_use]
    pub fn new(registry: Arc<Registry>, options: RenderOptions) -> Self {
        Self { registry, options }
    }

    #[must_use]
    pub fn from_config(registry: Arc<Registry>, config: &RenderConfig) -> Self {
        Self::new(registry, render_options(config))
    }
}

impl Default for FlatPipeline {
    fn default() -> Self {
        Self::new(Arc::new(Registry::builtin()), RenderOptions::default())
    }
}

impl Pipeline for FlatPipeline {
    fn format(&self) -> OutputFormat {
        OutputFormat::Flat
    }

    fn convert(&self, text: &str) -> Result<Payload, PipelineError> {
        let stream = tokenize(text, &self.registry);
        let flat = FlatRenderer::new(&self.registry)
            .with_options(self.options.clone())
            .render(&stream);
        Ok(Payload::Flat(flat))
    }
}
