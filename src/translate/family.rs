use std::collections::BTreeMap;

use crate::config::ModelTier;

/// FLORES-200 codes used by NLLB, keyed by ISO 639-1.
const NLLB_CODES: &[(&str, &str)] = &[
    ("ar", "arb_Arab"),
    ("de", "deu_Latn"),
    ("en", "eng_Latn"),
    ("es", "spa_Latn"),
    ("fr", "fra_Latn"),
    ("hi", "hin_Deva"),
    ("id", "ind_Latn"),
    ("it", "ita_Latn"),
    ("ja", "jpn_Jpan"),
    ("ko", "kor_Hang"),
    ("nl", "nld_Latn"),
    ("pl", "pol_Latn"),
    ("pt", "por_Latn"),
    ("ru", "rus_Cyrl"),
    ("sv", "swe_Latn"),
    ("th", "tha_Thai"),
    ("tr", "tur_Latn"),
    ("uk", "ukr_Cyrl"),
    ("vi", "vie_Latn"),
    ("zh", "zho_Hans"),
];

/// Which directions a family can translate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directions {
    /// Only these (src, tgt) pairs
    Pairs(Vec<(String, String)>),
    /// Any two distinct languages from the code table
    AnyOf,
}

/// Static description of a fairseq model family at one tier.
#[derive(Debug, Clone)]
pub struct ModelFamily {
    pub name: String,
    /// Catalog ids that must all be installed
    pub assets: Vec<String>,
    /// Install-relative checkpoint file
    pub checkpoint: String,
    /// Install-relative fairseq data directory (dictionaries)
    pub data_dir: String,
    pub directions: Directions,
    /// ISO 639-1 -> code the model expects
    pub codes: BTreeMap<String, String>,
    /// ISO 639-1 -> install-relative sentencepiece model
    pub spm_models: BTreeMap<String, String>,
    /// Whether the fairseq task needs language tokens (multilingual models)
    pub multilingual: bool,
}

impl ModelFamily {
    /// JParaCrawl v3.0: Japanese to English only.
    pub fn jparacrawl(tier: ModelTier) -> Self {
        let tier = tier.as_str();
        Self {
            name: format!("jparacrawl-{}", tier),
            assets: vec!["jparacrawl-spm".to_string(), format!("jparacrawl-{}", tier)],
            checkpoint: format!("checkpoints/{}.pretrain.pt", tier),
            data_dir: format!("data-bin/{}", tier),
            directions: Directions::Pairs(vec![("ja".to_string(), "en".to_string())]),
            codes: [("ja", "ja"), ("en", "en")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            spm_models: [
                ("ja", "spm/spm.ja.nopretok.model"),
                ("en", "spm/spm.en.nopretok.model"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            multilingual: false,
        }
    }

    /// NLLB-200 through fairseq; one asset `nllb-<tier>` with a shared spm model.
    pub fn nllb(tier: ModelTier) -> Self {
        let name = format!("nllb-{}", tier.as_str());
        let codes: BTreeMap<String, String> = NLLB_CODES
            .iter()
            .map(|(iso, code)| (iso.to_string(), code.to_string()))
            .collect();
        let spm_models = codes
            .keys()
            .map(|iso| (iso.clone(), format!("spm/{}.spm.model", name)))
            .collect();
        Self {
            assets: vec![name.clone()],
            checkpoint: format!("checkpoints/{}.pt", name),
            data_dir: format!("data-bin/{}", name),
            directions: Directions::AnyOf,
            codes,
            spm_models,
            multilingual: true,
            name,
        }
    }

    pub fn supports(&self, src: &str, tgt: &str) -> bool {
        match &self.directions {
            Directions::Pairs(pairs) => pairs.iter().any(|(s, t)| s == src && t == tgt),
            Directions::AnyOf => src != tgt && self.codes.contains_key(src) && self.codes.contains_key(tgt),
        }
    }

    pub fn model_code(&self, iso: &str) -> Option<&str> {
        self.codes.get(iso).map(String::as_str)
    }

    /// Directions worth starting a session for at load time
    pub fn preload_pairs(&self) -> Vec<(String, String)> {
        match &self.directions {
            Directions::Pairs(pairs) => pairs.clone(),
            Directions::AnyOf => Vec::new(),
        }
    }

    /// Task arguments for fairseq-interactive in the model's own codes
    pub fn task_args(&self, src_code: &str, tgt_code: &str) -> Vec<String> {
        let mut args = vec![
            "--source-lang".to_string(),
            src_code.to_string(),
            "--target-lang".to_string(),
            tgt_code.to_string(),
        ];
        if self.multilingual {
            let langs: Vec<&str> = self.codes.values().map(String::as_str).collect();
            args.extend([
                "--task".to_string(),
                "translation_multi_simple_epoch".to_string(),
                "--lang-pairs".to_string(),
                format!("{}-{}", src_code, tgt_code),
                "--langs".to_string(),
                langs.join(","),
                "--encoder-langtok".to_string(),
                "src".to_string(),
                "--decoder-langtok".to_string(),
            ]);
        }
        args
    }
}
