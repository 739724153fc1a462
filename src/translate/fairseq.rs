use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use super::device::{self, Device};
use super::family::ModelFamily;
use super::preprocess::Preprocessor;
use super::{BackendState, TranslatorBackend, normalize_lang};
use crate::assets::AssetPipeline;
use crate::config::FairseqConfig;
use crate::error::TranslateError;

/// Command line for one fairseq-interactive process
#[derive(Debug, Clone)]
pub struct FairseqCommand {
    pub binary_path: String,
    pub args: Vec<String>,
}

impl FairseqCommand {
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn data_dir<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn checkpoint<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("--path").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn beam(self, beam: u32) -> Self {
        self.arg("--beam").arg(beam.to_string())
    }

    /// Translate each input line as soon as it arrives
    pub fn unbuffered(self) -> Self {
        self.args(["--buffer-size", "1", "--batch-size", "1"])
    }

    pub fn device(self, device: Device) -> Self {
        if device.is_gpu() {
            self.arg("--fp16")
        } else {
            self.arg("--cpu")
        }
    }

    pub fn to_command_string(&self) -> String {
        format!("{} {}", self.binary_path, self.args.join(" "))
    }
}

/// Pull the hypothesis text out of an `H-<n>\t<score>\t<tokens>` line.
pub fn parse_hypothesis(line: &str) -> Option<&str> {
    if !line.starts_with("H-") {
        return None;
    }
    line.splitn(3, '\t').nth(2).map(str::trim)
}

/// A running fairseq-interactive process fed one sentence per line.
struct FairseqSession {
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl FairseqSession {
    fn spawn(command: &FairseqCommand) -> std::io::Result<Self> {
        debug!("Spawning: {}", command.to_command_string());
        let mut child = Command::new(&command.binary_path)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout not captured"))?;

        Ok(Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn translate(&mut self, tokens: &str) -> std::result::Result<String, String> {
        self.stdin
            .write_all(format!("{}\n", tokens).as_bytes())
            .await
            .map_err(|e| format!("write failed: {}", e))?;
        self.stdin.flush().await.map_err(|e| format!("flush failed: {}", e))?;

        loop {
            match self.stdout.next_line().await {
                Ok(Some(line)) => {
                    if let Some(hypothesis) = parse_hypothesis(&line) {
                        return Ok(hypothesis.to_string());
                    }
                }
                Ok(None) => return Err("process exited".to_string()),
                Err(e) => return Err(format!("read failed: {}", e)),
            }
        }
    }
}

/// In-memory form of a loaded model: one process per direction.
struct LoadedModel {
    device: Device,
    sessions: Mutex<HashMap<(String, String), FairseqSession>>,
}

/// Backend driving a fairseq model family through fairseq-interactive.
pub struct FairseqBackend {
    family: ModelFamily,
    pipeline: Arc<AssetPipeline>,
    preprocessor: Box<dyn Preprocessor>,
    config: FairseqConfig,
    loaded: OnceCell<LoadedModel>,
}

impl FairseqBackend {
    pub fn new(
        family: ModelFamily,
        pipeline: Arc<AssetPipeline>,
        preprocessor: Box<dyn Preprocessor>,
        config: FairseqConfig,
    ) -> Self {
        Self {
            family,
            pipeline,
            preprocessor,
            config,
            loaded: OnceCell::new(),
        }
    }

    pub fn family(&self) -> &ModelFamily {
        &self.family
    }

    fn is_provisioned(&self) -> bool {
        self.family.assets.iter().all(|id| self.pipeline.is_installed(id))
    }

    fn session_command(&self, device: Device, src: &str, tgt: &str) -> Result<FairseqCommand, TranslateError> {
        let unsupported = || TranslateError::Unsupported {
            backend: self.family.name.clone(),
            src: src.to_string(),
            tgt: tgt.to_string(),
        };
        let src_code = self.family.model_code(src).ok_or_else(unsupported)?;
        let tgt_code = self.family.model_code(tgt).ok_or_else(unsupported)?;
        let paths = self.pipeline.paths();

        Ok(FairseqCommand::new(&self.config.interactive_binary)
            .data_dir(paths.destination(&self.family.data_dir))
            .checkpoint(paths.destination(&self.family.checkpoint))
            .args(self.family.task_args(src_code, tgt_code))
            .beam(self.config.beam)
            .unbuffered()
            .device(device)
            .args(self.config.extra_args.iter().cloned()))
    }

    fn spawn_session(&self, device: Device, src: &str, tgt: &str) -> Result<FairseqSession, TranslateError> {
        let command = self.session_command(device, src, tgt)?;
        FairseqSession::spawn(&command).map_err(|e| TranslateError::Load {
            backend: self.family.name.clone(),
            cause: format!("{}: {}", command.binary_path, e),
        })
    }

    async fn load_model(&self) -> Result<LoadedModel, TranslateError> {
        let checkpoint = self.pipeline.paths().destination(&self.family.checkpoint);
        let checkpoint_bytes = tokio::fs::metadata(&checkpoint)
            .await
            .map_err(|e| TranslateError::Load {
                backend: self.family.name.clone(),
                cause: format!("{}: {}", checkpoint.display(), e),
            })?
            .len();

        let device = device::select(&self.config.gpu_query_binary, checkpoint_bytes).await;

        let mut sessions = HashMap::new();
        for (src, tgt) in self.family.preload_pairs() {
            let session = self.spawn_session(device, &src, &tgt)?;
            sessions.insert((src, tgt), session);
        }

        info!("Loaded {} on {}", self.family.name, device);
        Ok(LoadedModel {
            device,
            sessions: Mutex::new(sessions),
        })
    }
}

#[async_trait]
impl TranslatorBackend for FairseqBackend {
    fn name(&self) -> &str {
        &self.family.name
    }

    fn supports(&self, src: &str, tgt: &str) -> bool {
        self.family.supports(&normalize_lang(src), &normalize_lang(tgt))
    }

    async fn provision(&self) -> Result<(), TranslateError> {
        for id in &self.family.assets {
            self.pipeline
                .ensure(id)
                .await
                .map_err(|source| TranslateError::Provision {
                    backend: self.family.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    async fn load(&self) -> Result<(), TranslateError> {
        if self.is_loaded() {
            return Ok(());
        }
        if !self.is_provisioned() {
            return Err(TranslateError::NotProvisioned(self.family.name.clone()));
        }
        // Concurrent callers wait here; the model is brought up once
        self.loaded.get_or_try_init(|| self.load_model()).await?;
        Ok(())
    }

    async fn translate_sentence(&self, src: &str, tgt: &str, text: &str) -> Result<String, TranslateError> {
        let (src, tgt) = (normalize_lang(src), normalize_lang(tgt));
        if !self.family.supports(&src, &tgt) {
            return Err(TranslateError::Unsupported {
                backend: self.family.name.clone(),
                src,
                tgt,
            });
        }
        let loaded = self
            .loaded
            .get()
            .ok_or_else(|| TranslateError::NotLoaded(self.family.name.clone()))?;

        let tokens = self.preprocessor.encode(text, &src).await?;
        if tokens.is_empty() {
            return Ok(String::new());
        }

        let output = {
            let mut sessions = loaded.sessions.lock().await;
            let key = (src.clone(), tgt.clone());
            if !sessions.contains_key(&key) {
                let session = self.spawn_session(loaded.device, &src, &tgt)?;
                sessions.insert(key.clone(), session);
            }
            let result = match sessions.get_mut(&key) {
                Some(session) => session.translate(&tokens).await,
                None => Err("session unavailable".to_string()),
            };
            if result.is_err() {
                // Drop the broken process; the next call starts a fresh one
                warn!("Discarding {} session for {}->{}", self.family.name, src, tgt);
                sessions.remove(&key);
            }
            result.map_err(|cause| TranslateError::Inference {
                backend: self.family.name.clone(),
                cause,
            })?
        };

        self.preprocessor.decode(&output, &tgt).await
    }

    fn state(&self) -> BackendState {
        if self.is_loaded() {
            BackendState::Loaded
        } else if self.is_provisioned() {
            BackendState::Downloaded
        } else {
            BackendState::NotDownloaded
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use assert_fs::TempDir;

    use super::*;
    use crate::assets::progress::NoProgress;
    use crate::assets::{AssetCatalog, Fetcher, ModelDescriptor, ProgressSink, StagePaths};
    use crate::config::ModelTier;
    use crate::translate::preprocess::WhitespacePreprocessor;

    struct OfflineFetcher;

    #[async_trait]
    impl Fetcher for OfflineFetcher {
        async fn fetch(&self, _url: &str, _dest: &Path, _p: &dyn ProgressSink) -> std::result::Result<u64, String> {
            Err("offline".to_string())
        }
    }

    fn backend(root: &Path, config: FairseqConfig) -> FairseqBackend {
        let catalog = Arc::new(AssetCatalog::with_extras(&[]).unwrap());
        let pipeline = Arc::new(AssetPipeline::new(
            catalog,
            StagePaths::new(root),
            Box::new(OfflineFetcher),
            Box::new(NoProgress),
        ));
        FairseqBackend::new(
            ModelFamily::jparacrawl(ModelTier::Small),
            pipeline,
            Box::new(WhitespacePreprocessor),
            config,
        )
    }

    fn install_everything(root: &Path) {
        let paths = StagePaths::new(root);
        let catalog = AssetCatalog::with_extras(&[]).unwrap();
        for id in ["jparacrawl-spm", "jparacrawl-small"] {
            let descriptor: &ModelDescriptor = catalog.get(id).unwrap();
            for dest in descriptor.files.values() {
                let to = paths.destination(dest);
                std::fs::create_dir_all(to.parent().unwrap()).unwrap();
                std::fs::write(to, b"x").unwrap();
            }
        }
    }

    fn test_config() -> FairseqConfig {
        FairseqConfig {
            gpu_query_binary: "definitely-not-a-real-gpu-tool".to_string(),
            ..FairseqConfig::default()
        }
    }

    #[test]
    fn test_parse_hypothesis() {
        assert_eq!(parse_hypothesis("H-0\t-0.42\t\u{2581}Hello \u{2581}world"), Some("\u{2581}Hello \u{2581}world"));
        assert_eq!(parse_hypothesis("S-0\t\u{2581}こんにちは"), None);
        assert_eq!(parse_hypothesis("D-0\t-0.42\tHello world"), None);
    }

    #[test]
    fn test_command_line() {
        let command = FairseqCommand::new("fairseq-interactive")
            .data_dir("/m/setup/data-bin/small")
            .checkpoint("/m/setup/checkpoints/small.pretrain.pt")
            .beam(5)
            .unbuffered()
            .device(Device::Cpu);
        assert_eq!(
            command.to_command_string(),
            "fairseq-interactive /m/setup/data-bin/small --path /m/setup/checkpoints/small.pretrain.pt \
             --beam 5 --buffer-size 1 --batch-size 1 --cpu"
        );
    }

    #[tokio::test]
    async fn test_lifecycle_guards() {
        let root = TempDir::new().unwrap();
        let backend = backend(root.path(), test_config());

        assert_eq!(backend.state(), BackendState::NotDownloaded);
        assert!(backend.supports("ja-JP", "EN"));
        assert!(!backend.supports("en", "ja"));
        assert!(matches!(backend.load().await, Err(TranslateError::NotProvisioned(_))));
        assert!(matches!(
            backend.translate_sentence("ja", "en", "テスト").await,
            Err(TranslateError::NotLoaded(_))
        ));
        assert!(matches!(
            backend.translate_sentence("en", "ja", "test").await,
            Err(TranslateError::Unsupported { .. })
        ));
        assert!(matches!(
            backend.provision().await,
            Err(TranslateError::Provision { source: crate::error::PipelineError::DownloadFailed { .. }, .. })
        ));
    }

    #[tokio::test]
    async fn test_provision_is_noop_when_installed() {
        let root = TempDir::new().unwrap();
        install_everything(root.path());
        let backend = backend(root.path(), test_config());

        backend.provision().await.unwrap();
        assert_eq!(backend.state(), BackendState::Downloaded);
    }

    #[tokio::test]
    async fn test_load_fails_when_binary_missing() {
        let root = TempDir::new().unwrap();
        install_everything(root.path());
        let backend = backend(
            root.path(),
            FairseqConfig {
                interactive_binary: "definitely-not-fairseq".to_string(),
                ..test_config()
            },
        );

        assert!(matches!(backend.load().await, Err(TranslateError::Load { .. })));
        assert!(!backend.is_loaded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_translates_through_interactive_process() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        install_everything(root.path());

        // records each start, then echoes the input back as the hypothesis, fairseq-style
        let starts = root.path().join("starts.log");
        let script = root.path().join("fake-fairseq");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho started >> '{}'\nwhile IFS= read -r line; do\n  printf 'S-0\\t%s\\n' \"$line\"\n  printf 'H-0\\t-0.1\\t%s\\n' \"$line\"\ndone\n",
                starts.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = Arc::new(backend(
            root.path(),
            FairseqConfig {
                interactive_binary: script.to_string_lossy().to_string(),
                ..test_config()
            },
        ));

        let (a, b) = tokio::join!(backend.load(), backend.load());
        a.unwrap();
        b.unwrap();
        assert_eq!(backend.state(), BackendState::Loaded);

        let first = backend.translate_sentence("ja", "en", "  hello \n world ").await.unwrap();
        assert_eq!(first, "hello world");
        let second = backend.translate_sentence("ja", "en", "again").await.unwrap();
        assert_eq!(second, "again");

        // both concurrent loads shared one process, reused for every sentence
        let started = std::fs::read_to_string(&starts).unwrap();
        assert_eq!(started.lines().count(), 1);
    }
}
