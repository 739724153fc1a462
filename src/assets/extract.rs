use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Unpack a `.tar.gz` archive into `target`. Blocking; call from `spawn_blocking`.
pub fn unpack_tar_gz(archive: &Path, target: &Path) -> std::io::Result<()> {
    info!("Extracting: {} -> {}", archive.display(), target.display());
    std::fs::create_dir_all(target)?;

    let file = File::open(archive)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(false);
    // `unpack` refuses entries that would escape `target`
    archive.unpack(target)?;
    Ok(())
}

/// Files found under `dir`, relative to it; used to explain missing members.
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(dir).ok().map(Path::to_path_buf))
        .inspect(|p| debug!("Staged: {}", p.display()))
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Build a `.tar.gz` with the given (path, contents) entries.
    pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, Path::new(path), *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_nested_members() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("m.tar.gz");
        std::fs::write(&archive, testing::tar_gz(&[("m/a.bin", b"a"), ("m/sub/b.txt", b"bb")])).unwrap();

        let target = dir.path().join("extract");
        unpack_tar_gz(&archive, &target).unwrap();

        assert_eq!(std::fs::read(target.join("m/sub/b.txt")).unwrap(), b"bb");
        let mut files = list_files(&target);
        files.sort();
        assert_eq!(files, vec![PathBuf::from("m/a.bin"), PathBuf::from("m/sub/b.txt")]);
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.tar.gz");
        std::fs::write(&archive, b"definitely not gzip").unwrap();

        assert!(unpack_tar_gz(&archive, &dir.path().join("extract")).is_err());
    }
}
