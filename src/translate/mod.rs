// Modular translation architecture
//
// Backends wrap one external model family each and are tried in priority
// order by the chain:
// - FairseqBackend: fairseq-interactive process, parameterised by a ModelFamily
//   (JParaCrawl ja->en, NLLB many-to-many)
// - ChainTranslator: first ready, supporting backend wins; failures fall through
//
// To add a new model family:
// 1. Add its assets to the catalog (built-in or `[[catalog.extra]]`)
// 2. Describe it with a ModelFamily constructor
// 3. Register it in BackendFactory::create_chain

pub mod chain;
pub mod device;
pub mod fairseq;
pub mod family;
pub mod preprocess;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

pub use chain::ChainTranslator;
pub use fairseq::FairseqBackend;
pub use family::ModelFamily;
pub use preprocess::{Preprocessor, SpmPreprocessor, WhitespacePreprocessor};

use crate::assets::AssetPipeline;
use crate::config::Config;
use crate::error::TranslateError;

/// Readiness of a backend. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendState {
    NotDownloaded,
    Downloaded,
    Loaded,
}

impl std::fmt::Display for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotDownloaded => "not downloaded",
            Self::Downloaded => "downloaded",
            Self::Loaded => "loaded",
        })
    }
}

/// One translation backend.
///
/// `provision` and `load` are idempotent: repeating a completed step succeeds
/// without doing work. `load` requires a provisioned backend and
/// `translate_sentence` requires a loaded one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslatorBackend: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Whether this backend translates `src` -> `tgt` (ISO 639-1 codes)
    fn supports(&self, src: &str, tgt: &str) -> bool;

    /// Make sure every asset the backend needs is installed
    async fn provision(&self) -> Result<(), TranslateError>;

    fn is_loaded(&self) -> bool;

    /// Bring installed artifacts into an inference-ready form, once
    async fn load(&self) -> Result<(), TranslateError>;

    async fn translate_sentence(&self, src: &str, tgt: &str, text: &str) -> Result<String, TranslateError>;

    fn state(&self) -> BackendState;
}

/// Lowercase and strip region/script: `en-US` -> `en`, `zh_Hans` -> `zh`
pub fn normalize_lang(code: &str) -> String {
    code.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or(code)
        .to_lowercase()
}

/// Factory for the configured backend chain
pub struct BackendFactory;

impl BackendFactory {
    /// Backends in priority order: JParaCrawl (specialised ja->en) before NLLB.
    /// Nothing is downloaded or loaded here.
    pub fn create_chain(config: &Config, pipeline: Arc<AssetPipeline>) -> ChainTranslator {
        let mut backends: Vec<Arc<dyn TranslatorBackend>> = Vec::new();

        if config.backends.jparacrawl.is_enabled() {
            let family = ModelFamily::jparacrawl(config.backends.jparacrawl);
            backends.push(Arc::new(Self::fairseq(config, family, pipeline.clone())));
        }
        if config.backends.nllb.is_enabled() {
            let family = ModelFamily::nllb(config.backends.nllb);
            backends.push(Arc::new(Self::fairseq(config, family, pipeline.clone())));
        }

        ChainTranslator::new(backends)
    }

    fn fairseq(config: &Config, family: ModelFamily, pipeline: Arc<AssetPipeline>) -> FairseqBackend {
        let install_root = pipeline.paths().install_root();
        let preprocessor = SpmPreprocessor::new(
            &config.fairseq.spm_encode_binary,
            &config.fairseq.spm_decode_binary,
            family
                .spm_models
                .iter()
                .map(|(lang, model)| (lang.clone(), install_root.join(model))),
        );
        FairseqBackend::new(family, pipeline, Box::new(preprocessor), config.fairseq.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::progress::NoProgress;
    use crate::assets::{HttpFetcher, StagePaths};
    use crate::config::ModelTier;

    #[test]
    fn test_normalize_lang() {
        assert_eq!(normalize_lang("en-US"), "en");
        assert_eq!(normalize_lang("zh_Hans"), "zh");
        assert_eq!(normalize_lang(" JA "), "ja");
    }

    #[test]
    fn test_state_order() {
        assert!(BackendState::NotDownloaded < BackendState::Downloaded);
        assert!(BackendState::Downloaded < BackendState::Loaded);
    }

    #[test]
    fn test_factory_respects_enablement_and_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.assets.root = dir.path().to_path_buf();
        config.backends.jparacrawl = ModelTier::Big;
        let catalog = Arc::new(config.catalog().unwrap());
        let pipeline = Arc::new(AssetPipeline::new(
            catalog,
            StagePaths::new(dir.path()),
            Box::new(HttpFetcher::new("test").unwrap()),
            Box::new(NoProgress),
        ));

        let chain = BackendFactory::create_chain(&config, pipeline);

        let names: Vec<&str> = chain.backends().iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["jparacrawl-big"]);
        assert_eq!(chain.backends()[0].state(), BackendState::NotDownloaded);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
