use std::path::{Path, PathBuf};

use super::catalog::ModelDescriptor;

/// Every filesystem location the pipeline touches, derived from one root.
///
/// ```text
/// <root>/<id>/download/<id>.tar.gz      verified archive
/// <root>/<id>/download/<id>.tar.gz.part  in-flight download
/// <root>/<id>/extract/                   staging
/// <root>/setup/<dest>                    install layout shared by all models
/// ```
#[derive(Debug, Clone)]
pub struct StagePaths {
    root: PathBuf,
}

impl StagePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    pub fn download_dir(&self, id: &str) -> PathBuf {
        self.model_dir(id).join("download")
    }

    pub fn archive(&self, id: &str) -> PathBuf {
        self.download_dir(id).join(format!("{}.tar.gz", id))
    }

    pub fn partial_archive(&self, id: &str) -> PathBuf {
        self.download_dir(id).join(format!("{}.tar.gz.part", id))
    }

    pub fn staging(&self, id: &str) -> PathBuf {
        self.model_dir(id).join("extract")
    }

    pub fn staged_member(&self, id: &str, member: &str) -> PathBuf {
        self.staging(id).join(member)
    }

    pub fn install_root(&self) -> PathBuf {
        self.root.join("setup")
    }

    pub fn destination(&self, dest: &str) -> PathBuf {
        self.install_root().join(dest)
    }

    /// The one "is this model installed" predicate.
    pub fn is_installed(&self, descriptor: &ModelDescriptor) -> bool {
        descriptor
            .files
            .values()
            .all(|dest| self.destination(dest).exists())
    }

    /// Every member is either waiting in staging or already moved into place.
    pub fn is_extracted(&self, descriptor: &ModelDescriptor) -> bool {
        descriptor.files.iter().all(|(member, dest)| {
            self.destination(dest).exists() || self.staged_member(&descriptor.id, member).exists()
        })
    }

    pub fn is_downloaded(&self, descriptor: &ModelDescriptor) -> bool {
        self.archive(&descriptor.id).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = StagePaths::new("/models");
        assert_eq!(paths.archive("big"), PathBuf::from("/models/big/download/big.tar.gz"));
        assert_eq!(paths.partial_archive("big"), PathBuf::from("/models/big/download/big.tar.gz.part"));
        assert_eq!(paths.staged_member("big", "big/dict.en.txt"), PathBuf::from("/models/big/extract/big/dict.en.txt"));
        assert_eq!(paths.destination("spm/spm.en.model"), PathBuf::from("/models/setup/spm/spm.en.model"));
    }

    #[test]
    fn test_installed_requires_every_destination() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StagePaths::new(dir.path());
        let descriptor = ModelDescriptor::new(
            "m",
            "small",
            "https://example.invalid/m.tar.gz",
            &"0".repeat(64),
            [("m/a.bin", "checkpoints/a.bin"), ("m/b.txt", "data-bin/m/b.txt")],
        );

        std::fs::create_dir_all(paths.destination("checkpoints")).unwrap();
        std::fs::write(paths.destination("checkpoints/a.bin"), b"a").unwrap();
        assert!(!paths.is_installed(&descriptor));

        // b.txt still in staging counts as extracted
        std::fs::create_dir_all(paths.staged_member("m", "m")).unwrap();
        std::fs::write(paths.staged_member("m", "m/b.txt"), b"b").unwrap();
        assert!(paths.is_extracted(&descriptor));

        std::fs::create_dir_all(paths.destination("data-bin/m")).unwrap();
        std::fs::write(paths.destination("data-bin/m/b.txt"), b"b").unwrap();
        assert!(paths.is_installed(&descriptor));
    }
}
