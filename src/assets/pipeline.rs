use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::catalog::{AssetCatalog, ModelDescriptor};
use super::extract;
use super::fetch::Fetcher;
use super::paths::StagePaths;
use super::progress::ProgressSink;
use super::verify::Verifier;
use crate::error::PipelineError;

/// Where a model currently stands, judged purely from the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Installed,
    Extracted,
    Downloaded,
    Missing,
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Installed => "installed",
            Self::Extracted => "extracted",
            Self::Downloaded => "downloaded",
            Self::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// download -> verify -> extract -> install, each stage re-checkable on disk.
pub struct AssetPipeline {
    catalog: Arc<AssetCatalog>,
    paths: StagePaths,
    fetcher: Box<dyn Fetcher>,
    progress: Box<dyn ProgressSink>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AssetPipeline {
    pub fn new(
        catalog: Arc<AssetCatalog>,
        paths: StagePaths,
        fetcher: Box<dyn Fetcher>,
        progress: Box<dyn ProgressSink>,
    ) -> Self {
        Self {
            catalog,
            paths,
            fetcher,
            progress,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &AssetCatalog {
        &self.catalog
    }

    pub fn paths(&self) -> &StagePaths {
        &self.paths
    }

    fn descriptor(&self, id: &str) -> Result<&ModelDescriptor, PipelineError> {
        self.catalog
            .get(id)
            .ok_or_else(|| PipelineError::UnknownModel(id.to_string()))
    }

    pub fn is_installed(&self, id: &str) -> bool {
        self.catalog
            .get(id)
            .map(|d| self.paths.is_installed(d))
            .unwrap_or(false)
    }

    pub fn status(&self, id: &str) -> Result<AssetStatus, PipelineError> {
        let descriptor = self.descriptor(id)?;
        Ok(if self.paths.is_installed(descriptor) {
            AssetStatus::Installed
        } else if self.paths.is_extracted(descriptor) {
            AssetStatus::Extracted
        } else if self.paths.is_downloaded(descriptor) {
            AssetStatus::Downloaded
        } else {
            AssetStatus::Missing
        })
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Bring `id` to the installed state, resuming from whatever stage is on disk.
    pub async fn ensure(&self, id: &str) -> Result<(), PipelineError> {
        let descriptor = self.descriptor(id)?;

        if self.paths.is_installed(descriptor) {
            debug!("{} already installed", id);
            return Ok(());
        }

        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        // Another caller may have finished while we waited
        if self.paths.is_installed(descriptor) {
            debug!("{} installed by a concurrent caller", id);
            return Ok(());
        }

        info!("Provisioning model {}", id);

        if !self.paths.is_extracted(descriptor) {
            if !self.paths.is_downloaded(descriptor) {
                self.download(descriptor).await?;
            }
            self.verify(descriptor).await?;
            self.extract(descriptor).await?;
        }

        self.install(descriptor).await?;

        if !self.paths.is_installed(descriptor) {
            return Err(PipelineError::InstallFailed {
                id: id.to_string(),
                cause: "destinations missing after install".to_string(),
            });
        }

        info!("Model {} installed under {}", id, self.paths.install_root().display());
        Ok(())
    }

    async fn download(&self, descriptor: &ModelDescriptor) -> Result<(), PipelineError> {
        let id = &descriptor.id;
        let failed = |cause: String| PipelineError::DownloadFailed {
            id: id.clone(),
            cause,
        };

        let partial = self.paths.partial_archive(id);
        let archive = self.paths.archive(id);
        fs::create_dir_all(self.paths.download_dir(id))
            .await
            .map_err(|e| failed(e.to_string()))?;

        match self
            .fetcher
            .fetch(&descriptor.url, &partial, self.progress.as_ref())
            .await
        {
            Ok(bytes) => debug!("Fetched {} bytes for {}", bytes, id),
            Err(cause) => {
                // Never let partial bytes look like a finished archive
                if let Err(e) = fs::remove_file(&partial).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove {}: {}", partial.display(), e);
                    }
                }
                return Err(failed(cause));
            }
        }

        fs::rename(&partial, &archive)
            .await
            .map_err(|e| failed(format!("failed to finalize {}: {}", archive.display(), e)))?;
        Ok(())
    }

    async fn verify(&self, descriptor: &ModelDescriptor) -> Result<(), PipelineError> {
        let archive = self.paths.archive(&descriptor.id);
        let outcome = Verifier::verify(&archive, &descriptor.sha256)
            .await
            .map_err(|e| PipelineError::DownloadFailed {
                id: descriptor.id.clone(),
                cause: format!("downloaded archive unreadable {}: {}", archive.display(), e),
            })?;

        outcome.map(|_| ()).map_err(|actual| PipelineError::IntegrityError {
            id: descriptor.id.clone(),
            path: archive,
            expected: descriptor.sha256.clone(),
            actual,
        })
    }

    async fn extract(&self, descriptor: &ModelDescriptor) -> Result<(), PipelineError> {
        let id = descriptor.id.clone();
        let archive = self.paths.archive(&id);
        let staging = self.paths.staging(&id);

        let (archive_c, staging_c) = (archive.clone(), staging.clone());
        tokio::task::spawn_blocking(move || extract::unpack_tar_gz(&archive_c, &staging_c))
            .await
            .map_err(|e| PipelineError::ExtractFailed {
                id: id.clone(),
                cause: e.to_string(),
            })?
            .map_err(|e| PipelineError::ExtractFailed {
                id: id.clone(),
                cause: e.to_string(),
            })?;

        if !self.paths.is_extracted(descriptor) {
            let found = extract::list_files(&staging);
            let missing: Vec<&str> = descriptor
                .files
                .keys()
                .filter(|m| !self.paths.staged_member(&id, m).exists())
                .map(String::as_str)
                .collect();
            return Err(PipelineError::ExtractFailed {
                id,
                cause: format!(
                    "archive lacks {} (found {} files)",
                    missing.join(", "),
                    found.len()
                ),
            });
        }

        info!("Deleting: {}", archive.display());
        fs::remove_file(&archive)
            .await
            .map_err(|e| PipelineError::ExtractFailed {
                id: id.clone(),
                cause: format!("failed to remove archive: {}", e),
            })?;
        remove_dir_if_empty(&self.paths.download_dir(&id)).await;
        Ok(())
    }

    async fn install(&self, descriptor: &ModelDescriptor) -> Result<(), PipelineError> {
        let id = &descriptor.id;
        let failed = |cause: String| PipelineError::InstallFailed {
            id: id.clone(),
            cause,
        };
        let root = self.paths.root();

        for (member, dest) in &descriptor.files {
            let to = self.paths.destination(dest);
            if to.exists() {
                continue;
            }
            let from = self.paths.staged_member(id, member);
            if !from.exists() {
                return Err(failed(format!("{} is not staged", member)));
            }

            info!(
                "Moving: {} -> {}",
                relative_to(&from, root),
                relative_to(&to, root)
            );
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| failed(format!("cannot create {}: {}", parent.display(), e)))?;
            }
            move_file(&from, &to)
                .await
                .map_err(|e| failed(format!("cannot move {}: {}", member, e)))?;
        }

        let staging = self.paths.staging(id);
        if staging.exists() {
            info!("Deleting: {}", staging.display());
            fs::remove_dir_all(&staging)
                .await
                .map_err(|e| failed(format!("failed to remove staging: {}", e)))?;
        }
        // An interrupted extract can leave the archive behind next to a full staging dir
        for leftover in [self.paths.archive(id), self.paths.partial_archive(id)] {
            if leftover.exists() {
                info!("Deleting: {}", leftover.display());
                fs::remove_file(&leftover)
                    .await
                    .map_err(|e| failed(format!("failed to remove {}: {}", leftover.display(), e)))?;
            }
        }
        remove_dir_if_empty(&self.paths.download_dir(id)).await;
        remove_dir_if_empty(&self.paths.model_dir(id)).await;
        Ok(())
    }
}

async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // Different filesystem: copy then drop the source
    fs::copy(from, to).await?;
    fs::remove_file(from).await
}

async fn remove_dir_if_empty(dir: &Path) {
    if let Ok(mut entries) = fs::read_dir(dir).await {
        if let Ok(None) = entries.next_entry().await {
            let _ = fs::remove_dir(dir).await;
        }
    }
}

fn relative_to(path: &Path, base: &Path) -> String {
    pathdiff::diff_paths(path, base)
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
