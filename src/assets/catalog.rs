use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const JPARACRAWL_BASE: &str = "https://www.kecl.ntt.co.jp/icl/lirg/jparacrawl/release/3.0";

/// One downloadable model asset: where it comes from, what it must hash to,
/// and where each archive member ends up under the install root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    /// Size/tier variant ("small", "big", "spm", ...)
    pub tier: String,
    pub url: String,
    /// Expected SHA-256 of the archive, hex, any case
    pub sha256: String,
    /// Archive member path -> install-relative destination
    pub files: BTreeMap<String, String>,
}

impl ModelDescriptor {
    pub fn new<I, S1, S2>(id: &str, tier: &str, url: &str, sha256: &str, files: I) -> Self
    where
        I: IntoIterator<Item = (S1, S2)>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            id: id.to_string(),
            tier: tier.to_string(),
            url: url.to_string(),
            sha256: sha256.to_string(),
            files: files
                .into_iter()
                .map(|(member, dest)| (member.into(), dest.into()))
                .collect(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidDescriptor {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.is_empty() || !is_relative_clean(Path::new(&self.id)) || self.id.contains('/') {
            return Err(invalid("id must be a single non-empty path segment"));
        }
        if self.url.is_empty() {
            return Err(invalid("url is empty"));
        }
        if self.sha256.len() != 64 || !self.sha256.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid("sha256 must be 64 hex digits"));
        }
        if self.files.is_empty() {
            return Err(invalid("no files mapped"));
        }
        for (member, dest) in &self.files {
            if !is_relative_clean(Path::new(member)) || !is_relative_clean(Path::new(dest)) {
                return Err(invalid(&format!(
                    "mapping '{}' -> '{}' must use relative paths without '..'",
                    member, dest
                )));
            }
        }
        Ok(())
    }
}

fn is_relative_clean(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Immutable registry of every asset the process may provision.
#[derive(Debug, Clone, Default)]
pub struct AssetCatalog {
    models: HashMap<String, ModelDescriptor>,
}

impl AssetCatalog {
    pub fn new<I>(descriptors: I) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = ModelDescriptor>,
    {
        let mut models = HashMap::new();
        for descriptor in descriptors {
            descriptor.validate()?;
            if models.contains_key(&descriptor.id) {
                return Err(ConfigError::DuplicateDescriptor(descriptor.id));
            }
            models.insert(descriptor.id.clone(), descriptor);
        }
        Ok(Self { models })
    }

    /// Built-in JParaCrawl entries followed by any configured extras.
    pub fn with_extras(extras: &[ModelDescriptor]) -> std::result::Result<Self, ConfigError> {
        Self::new(builtin_descriptors().into_iter().chain(extras.iter().cloned()))
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    /// Ids in stable (sorted) order
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// JParaCrawl v3.0 ja-en release.
pub fn builtin_descriptors() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new(
            "jparacrawl-spm",
            "spm",
            &format!("{}/spm_models/en-ja_spm.tar.gz", JPARACRAWL_BASE),
            "12EE719799022B9EF102CE828209E53876112B52B4363DC277CACA682B1B1D2E",
            [
                ("enja_spm_models/spm.ja.nopretok.model", "spm/spm.ja.nopretok.model"),
                ("enja_spm_models/spm.en.nopretok.model", "spm/spm.en.nopretok.model"),
            ],
        ),
        ModelDescriptor::new(
            "jparacrawl-small",
            "small",
            &format!("{}/pretrained_models/ja-en/small.tar.gz", JPARACRAWL_BASE),
            "7136FE12841C626B105A9E588F858A8E0B76E451B19839457D7473EC705D12B3",
            [
                ("small/small.pretrain.pt", "checkpoints/small.pretrain.pt"),
                ("small/dict.en.txt", "data-bin/small/dict.en.txt"),
                ("small/dict.ja.txt", "data-bin/small/dict.ja.txt"),
            ],
        ),
        ModelDescriptor::new(
            "jparacrawl-big",
            "big",
            &format!("{}/pretrained_models/ja-en/big.tar.gz", JPARACRAWL_BASE),
            "7517753B6FEB8594D3C86AD7742DBC49203115ADD21E8A6C7542AA2AC0DF1C6A",
            [
                ("big/big.pretrain.pt", "checkpoints/big.pretrain.pt"),
                ("big/dict.en.txt", "data-bin/big/dict.en.txt"),
                ("big/dict.ja.txt", "data-bin/big/dict.ja.txt"),
            ],
        ),
    ]
}
