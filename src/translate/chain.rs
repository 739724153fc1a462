use std::sync::Arc;

use tracing::{debug, info, warn};

use super::TranslatorBackend;
use crate::error::TranslateError;

/// Ordered fallback over backends: the first supporting backend that gets
/// ready and translates wins.
pub struct ChainTranslator {
    backends: Vec<Arc<dyn TranslatorBackend>>,
}

impl ChainTranslator {
    pub fn new(backends: Vec<Arc<dyn TranslatorBackend>>) -> Self {
        Self { backends }
    }

    /// Backends in priority order
    pub fn backends(&self) -> &[Arc<dyn TranslatorBackend>] {
        &self.backends
    }

    pub fn supports(&self, src: &str, tgt: &str) -> bool {
        self.backends.iter().any(|b| b.supports(src, tgt))
    }

    pub async fn translate(&self, text: &str, src: &str, tgt: &str) -> Result<String, TranslateError> {
        let candidates: Vec<&Arc<dyn TranslatorBackend>> =
            self.backends.iter().filter(|b| b.supports(src, tgt)).collect();

        if candidates.is_empty() {
            return Err(TranslateError::NoBackendAvailable {
                src: src.to_string(),
                tgt: tgt.to_string(),
                failures: Vec::new(),
            });
        }
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let mut failures = Vec::new();
        for backend in candidates {
            debug!("Trying {} for {}->{}", backend.name(), src, tgt);
            match Self::translate_with(backend.as_ref(), text, src, tgt).await {
                Ok(translation) => {
                    info!("Translated {}->{} with {}", src, tgt, backend.name());
                    return Ok(translation);
                }
                Err(e) => {
                    warn!("{} failed, trying next backend: {}", backend.name(), e);
                    failures.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        Err(TranslateError::NoBackendAvailable {
            src: src.to_string(),
            tgt: tgt.to_string(),
            failures,
        })
    }

    async fn translate_with(
        backend: &dyn TranslatorBackend,
        text: &str,
        src: &str,
        tgt: &str,
    ) -> Result<String, TranslateError> {
        if !backend.is_loaded() {
            backend.provision().await?;
            backend.load().await?;
        }
        backend.translate_sentence(src, tgt, text).await
    }
}
