use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MtError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provisioning error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Translation error: {0}")]
    Translate(#[from] TranslateError),
}

/// Invalid configuration, reported before any pipeline or backend exists.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}. Must be one of {allowed}")]
    InvalidValue {
        key: String,
        value: String,
        allowed: String,
    },

    #[error("Invalid catalog entry '{id}': {reason}")]
    InvalidDescriptor { id: String, reason: String },

    #[error("Duplicate catalog entry '{0}'")]
    DuplicateDescriptor(String),

    #[error("Backend '{backend}' is enabled with tier '{tier}' but no catalog entry '{id}' exists")]
    MissingAsset {
        backend: String,
        tier: String,
        id: String,
    },

    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to parse config file: {0}")]
    Parse(String),
}

/// Failure of one `AssetPipeline::ensure` attempt. Nothing here is retried internally.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("Download of '{id}' failed: {cause}")]
    DownloadFailed { id: String, cause: String },

    #[error("Integrity check failed for '{id}' ({}): expected {expected}, got {actual}", .path.display())]
    IntegrityError {
        id: String,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Extraction of '{id}' failed: {cause}")]
    ExtractFailed { id: String, cause: String },

    #[error("Install of '{id}' failed: {cause}")]
    InstallFailed { id: String, cause: String },
}

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Backend '{backend}' does not support {src}->{tgt}")]
    Unsupported {
        backend: String,
        src: String,
        tgt: String,
    },

    #[error("Backend '{0}' is not provisioned")]
    NotProvisioned(String),

    #[error("Backend '{0}' is not loaded")]
    NotLoaded(String),

    #[error("Backend '{backend}' failed to provision: {source}")]
    Provision {
        backend: String,
        #[source]
        source: PipelineError,
    },

    #[error("Backend '{backend}' failed to load: {cause}")]
    Load { backend: String, cause: String },

    #[error("Preprocessing failed: {0}")]
    Preprocess(String),

    #[error("Inference failed in '{backend}': {cause}")]
    Inference { backend: String, cause: String },

    #[error("No backend available for {src}->{tgt} ({} tried)", .failures.len())]
    NoBackendAvailable {
        src: String,
        tgt: String,
        failures: Vec<String>,
    },
}
