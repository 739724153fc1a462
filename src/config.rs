use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::assets::{AssetCatalog, ModelDescriptor};
use crate::error::ConfigError;

/// Env var that overrides `backends.jparacrawl`
pub const ENV_JA_EN_TIER: &str = "OFFLINE_MODEL_JA_EN";
/// Env var that overrides `backends.nllb`
pub const ENV_GLOBAL_TIER: &str = "OFFLINE_MODEL";

const TIER_VALUES: [&str; 3] = ["disabled", "small", "big"];

fn default_log_every_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_beam() -> u32 {
    5
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub fairseq: FairseqConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Base directory for downloads, staging and the install layout
    pub root: PathBuf,
    /// User agent sent with asset downloads
    pub user_agent: String,
    /// Non-interactive progress: log a line every this many bytes
    #[serde(default = "default_log_every_bytes")]
    pub log_every_bytes: u64,
}

/// Size tier per backend family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// JParaCrawl ja->en models
    pub jparacrawl: ModelTier,
    /// NLLB many-to-many fallback, assets come from `[[catalog.extra]]`
    pub nllb: ModelTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FairseqConfig {
    /// Path to fairseq-interactive
    pub interactive_binary: String,
    /// Path to sentencepiece's spm_encode
    pub spm_encode_binary: String,
    /// Path to sentencepiece's spm_decode
    pub spm_decode_binary: String,
    /// Path to nvidia-smi, used to decide between GPU and CPU
    pub gpu_query_binary: String,
    #[serde(default = "default_beam")]
    pub beam: u32,
    /// Passed through to fairseq-interactive unchanged
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Additional downloadable assets (e.g. `nllb-small`)
    #[serde(default)]
    pub extra: Vec<ModelDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelTier {
    Disabled,
    Small,
    Big,
}

impl ModelTier {
    /// Parse against the allow-list; `key` names the setting in the error.
    pub fn parse(key: &str, value: &str) -> std::result::Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "small" => Ok(Self::Small),
            "big" => Ok(Self::Big),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                allowed: TIER_VALUES.join(", "),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Small => "small",
            Self::Big => "big",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl TryFrom<String> for ModelTier {
    type Error = ConfigError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse("tier", &value)
    }
}

impl From<ModelTier> for String {
    fn from(tier: ModelTier) -> Self {
        tier.as_str().to_string()
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".offline-mt/models"),
            user_agent: format!("offline-mt/{}", env!("CARGO_PKG_VERSION")),
            log_every_bytes: default_log_every_bytes(),
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            jparacrawl: ModelTier::Small,
            nllb: ModelTier::Disabled,
        }
    }
}

impl Default for FairseqConfig {
    fn default() -> Self {
        Self {
            interactive_binary: "fairseq-interactive".to_string(),
            spm_encode_binary: "spm_encode".to_string(),
            spm_decode_binary: "spm_decode".to_string(),
            gpu_query_binary: "nvidia-smi".to_string(),
            beam: default_beam(),
            extra_args: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `OFFLINE_MODEL_JA_EN` / `OFFLINE_MODEL` from the process environment.
    pub fn apply_env(&mut self) -> std::result::Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_JA_EN_TIER) {
            self.backends.jparacrawl = ModelTier::parse(ENV_JA_EN_TIER, &value)?;
        }
        if let Some(value) = lookup(ENV_GLOBAL_TIER) {
            self.backends.nllb = ModelTier::parse(ENV_GLOBAL_TIER, &value)?;
        }
        Ok(())
    }

    /// Build the asset catalog and check every enabled backend has its assets.
    pub fn catalog(&self) -> std::result::Result<AssetCatalog, ConfigError> {
        let catalog = AssetCatalog::with_extras(&self.catalog.extra)?;

        let required = [
            ("jparacrawl", self.backends.jparacrawl),
            ("nllb", self.backends.nllb),
        ];
        for (backend, tier) in required {
            if !tier.is_enabled() {
                continue;
            }
            let id = format!("{}-{}", backend, tier);
            if !catalog.contains(&id) {
                return Err(ConfigError::MissingAsset {
                    backend: backend.to_string(),
                    tier: tier.to_string(),
                    id,
                });
            }
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.backends.jparacrawl, ModelTier::Small);
        assert!(config.catalog().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_toml("[backends]\njparacrawl = \"big\"\nnllb = \"disabled\"\n").unwrap();
        assert_eq!(config.backends.jparacrawl, ModelTier::Big);
        assert_eq!(config.fairseq.beam, 5);
    }

    #[test]
    fn test_rejects_unknown_tier_in_file() {
        let err = Config::from_toml("[backends]\njparacrawl = \"huge\"\nnllb = \"disabled\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(msg) if msg.contains("disabled, small, big")));
    }

    #[test]
    fn test_env_override_is_validated() {
        let mut config = Config::default();
        config
            .apply_overrides(|k| (k == ENV_JA_EN_TIER).then(|| "BIG".to_string()))
            .unwrap();
        assert_eq!(config.backends.jparacrawl, ModelTier::Big);

        let err = config
            .apply_overrides(|k| (k == ENV_GLOBAL_TIER).then(|| "medium".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: ENV_GLOBAL_TIER.to_string(),
                value: "medium".to_string(),
                allowed: "disabled, small, big".to_string(),
            }
        );
    }

    #[test]
    fn test_enabled_nllb_needs_catalog_entry() {
        let mut config = Config::default();
        config.backends.nllb = ModelTier::Small;
        assert!(matches!(config.catalog(), Err(ConfigError::MissingAsset { id, .. }) if id == "nllb-small"));

        config.catalog.extra.push(ModelDescriptor::new(
            "nllb-small",
            "small",
            "https://example.invalid/nllb.tar.gz",
            &"a".repeat(64),
            [("nllb/checkpoint.pt", "checkpoints/nllb-small.pt")],
        ));
        assert!(config.catalog().is_ok());
    }

    #[test]
    fn test_extra_catalog_from_toml() {
        let toml = r#"
[backends]
jparacrawl = "disabled"
nllb = "big"

[[catalog.extra]]
id = "nllb-big"
tier = "big"
url = "https://example.invalid/nllb-big.tar.gz"
sha256 = "ABABABABABABABABABABABABABABABABABABABABABABABABABABABABABABABAB"

[catalog.extra.files]
"nllb/checkpoint.pt" = "checkpoints/nllb-big.pt"
"#;
        let config = Config::from_toml(toml).unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.get("nllb-big").unwrap().files.len(), 1);
    }
}
