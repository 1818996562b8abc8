//! Adapter construction from environment and flags.

use fscore_data::error::DataError;
use fscore_data::sources::{
    AiPdfAdapter, HttpPageFetcher, MarketDataAdapter, OpenAiExtractor, ReportRegistry,
    WebScrapeAdapter, YahooTimeseriesProvider,
};
use fscore_data::{Confidence, PipelineConfig, SourcePipeline, StatementCache};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// API key enabling AI report extraction.
pub(crate) const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Model override for AI report extraction.
pub(crate) const MODEL_ENV: &str = "FSCORE_OPENAI_MODEL";

/// Settings for building the resolution pipeline.
#[derive(Debug, Clone)]
pub(crate) struct SourceSettings {
    /// Report registry file
    pub registry: Option<PathBuf>,
    /// Lowest accepted AI self-declared confidence
    pub min_confidence: Confidence,
    /// Adapter timeouts
    pub config: PipelineConfig,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn ai_pdf_adapter(settings: &SourceSettings) -> Result<Option<AiPdfAdapter>, DataError> {
    let Some(api_key) = env_value(API_KEY_ENV) else {
        info!("{API_KEY_ENV} not set, AI report extraction disabled");
        return Ok(None);
    };
    let Some(path) = &settings.registry else {
        info!("No report registry given, AI report extraction disabled");
        return Ok(None);
    };
    let registry = ReportRegistry::load(path)?;
    if registry.is_empty() {
        return Ok(None);
    }

    let mut extractor = OpenAiExtractor::new(api_key)?;
    if let Some(model) = env_value(MODEL_ENV) {
        extractor = extractor.with_model(model);
    }
    info!(reports = registry.len(), "AI report extraction enabled");
    Ok(Some(
        AiPdfAdapter::new(registry, Arc::new(extractor)).with_min_confidence(settings.min_confidence),
    ))
}

/// Build the pipeline with every available source.
pub(crate) fn build_pipeline(
    settings: &SourceSettings,
    cache: Option<StatementCache>,
) -> Result<SourcePipeline, DataError> {
    let mut builder = SourcePipeline::builder()
        .config(settings.config.clone())
        .web_scrape(Arc::new(WebScrapeAdapter::new(Arc::new(HttpPageFetcher::new()?))))
        .market_data(Arc::new(MarketDataAdapter::new(Arc::new(YahooTimeseriesProvider::new()?))));

    if let Some(adapter) = ai_pdf_adapter(settings)? {
        builder = builder.ai_pdf(Arc::new(adapter));
    }
    if let Some(cache) = cache {
        builder = builder.cache(cache);
    }
    builder.build()
}
