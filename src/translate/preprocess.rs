use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::error::TranslateError;

/// sentencepiece word-boundary marker
const SPM_SPACE: char = '\u{2581}';

/// Text <-> subword pieces, around inference.
#[async_trait]
pub trait Preprocessor: Send + Sync {
    /// Raw text to whitespace-joined pieces for `lang`
    async fn encode(&self, text: &str, lang: &str) -> Result<String, TranslateError>;

    /// Model output pieces back to text for `lang`
    async fn decode(&self, tokens: &str, lang: &str) -> Result<String, TranslateError>;
}

/// Trim and collapse all whitespace (newlines included) to single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// NFKC-fold (full-width forms, compatibility characters) then collapse whitespace.
pub fn normalize_source(text: &str) -> String {
    normalize_text(&text.nfkc().collect::<String>())
}

/// Join pieces, turning word-boundary markers back into spaces.
pub fn join_pieces(tokens: &str) -> String {
    let joined: String = tokens.split_whitespace().collect();
    normalize_text(&joined.replace(SPM_SPACE, " "))
}

/// Whitespace-only preprocessing for models that tokenize internally.
pub struct WhitespacePreprocessor;

#[async_trait]
impl Preprocessor for WhitespacePreprocessor {
    async fn encode(&self, text: &str, _lang: &str) -> Result<String, TranslateError> {
        Ok(normalize_source(text))
    }

    async fn decode(&self, tokens: &str, _lang: &str) -> Result<String, TranslateError> {
        if tokens.contains(SPM_SPACE) {
            Ok(join_pieces(tokens))
        } else {
            Ok(normalize_text(tokens))
        }
    }
}

/// sentencepiece through the `spm_encode` / `spm_decode` tools.
pub struct SpmPreprocessor {
    encode_binary: String,
    decode_binary: String,
    models: HashMap<String, PathBuf>,
}

impl SpmPreprocessor {
    pub fn new<I>(encode_binary: &str, decode_binary: &str, models: I) -> Self
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        Self {
            encode_binary: encode_binary.to_string(),
            decode_binary: decode_binary.to_string(),
            models: models.into_iter().collect(),
        }
    }

    fn model_for(&self, lang: &str) -> Result<&PathBuf, TranslateError> {
        let model = self
            .models
            .get(lang)
            .ok_or_else(|| TranslateError::Preprocess(format!("no sentencepiece model for '{}'", lang)))?;
        if !model.exists() {
            return Err(TranslateError::Preprocess(format!(
                "sentencepiece model missing: {}",
                model.display()
            )));
        }
        Ok(model)
    }

    async fn run(&self, binary: &str, args: &[String], input: &str) -> Result<String, TranslateError> {
        let fail = |e: String| TranslateError::Preprocess(format!("{}: {}", binary, e));
        debug!("Running: {} {}", binary, args.join(" "));

        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| fail(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(format!("{}\n", input).as_bytes())
                .await
                .map_err(|e| fail(e.to_string()))?;
        }

        let output = child.wait_with_output().await.map_err(|e| fail(e.to_string()))?;
        if !output.status.success() {
            return Err(fail(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Preprocessor for SpmPreprocessor {
    async fn encode(&self, text: &str, lang: &str) -> Result<String, TranslateError> {
        let model = self.model_for(lang)?;
        let args = vec![
            format!("--model={}", model.display()),
            "--output_format=piece".to_string(),
        ];
        let pieces = self.run(&self.encode_binary, &args, &normalize_source(text)).await?;
        Ok(normalize_text(&pieces))
    }

    async fn decode(&self, tokens: &str, lang: &str) -> Result<String, TranslateError> {
        let model = self.model_for(lang)?;
        let args = vec![
            format!("--model={}", model.display()),
            "--input_format=piece".to_string(),
        ];
        self.run(&self.decode_binary, &args, &normalize_text(tokens)).await
    }
}
