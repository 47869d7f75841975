//! File eligibility policy and metadata extraction (§4.1).

use std::io::Read;
use std::path::Path;

use core_types::config::Config;
use core_types::FileMetadata;
use sha2::{Digest, Sha256};

const HASH_BLOCK_SIZE: usize = 8192;

/// Decide whether `path` should be indexed under `config`.
///
/// All predicates are pure except the filesystem probe; any probe failure is
/// treated as "do not index" rather than propagated as an error.
pub fn should_index(path: &Path, config: &Config) -> bool {
    if !path.exists() {
        return false;
    }

    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let dotted = format!(".{}", ext.to_ascii_lowercase());
        if config.excluded_extensions.contains(&dotted) {
            return false;
        }
    }

    for segment in path.iter() {
        if let Some(name) = segment.to_str() {
            if config.excluded_dirs.contains(name) {
                return false;
            }
        }
    }

    match path.metadata() {
        Ok(meta) => meta.len() <= config.max_file_size,
        Err(_) => false,
    }
}

/// Build a [`FileMetadata`] snapshot for `path`, or `None` on any I/O error.
///
/// `mime_type` is left empty; the extractor fills it in once it has sniffed
/// the content.
pub fn metadata_for(path: &Path) -> Option<FileMetadata> {
    let canonical = path.canonicalize().ok()?;
    let meta = std::fs::metadata(&canonical).ok()?;
    let content_hash = hash_file(&canonical)?;

    let mut snapshot = FileMetadata::skeleton(canonical);
    snapshot.size = meta.len();
    snapshot.modified_time = to_unix(meta.modified().ok());
    snapshot.created_time = to_unix(meta.created().ok());
    snapshot.content_hash = content_hash;
    Some(snapshot)
}

fn to_unix(time: Option<std::time::SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn hash_file(path: &Path) -> Option<String> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Some(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn should_index_rejects_missing_file() {
        assert!(!should_index(Path::new("/nonexistent/path/x.txt"), &config()));
    }

    #[test]
    fn should_index_rejects_excluded_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.log");
        std::fs::write(&path, b"hi").unwrap();
        assert!(!should_index(&path, &config()));
    }

    #[test]
    fn should_index_rejects_excluded_ancestor_dir() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        let path = git_dir.join("config");
        std::fs::write(&path, b"secret").unwrap();
        assert!(!should_index(&path, &config()));
    }

    #[test]
    fn should_index_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, b"0123456789").unwrap();
        let mut cfg = config();
        cfg.max_file_size = 3;
        assert!(!should_index(&path, &cfg));
    }

    #[test]
    fn should_index_accepts_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert!(should_index(&path, &config()));
    }

    #[test]
    fn metadata_for_computes_hash_and_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.TXT");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"hello world").unwrap();
        drop(f);

        let meta = metadata_for(&path).unwrap();
        assert_eq!(meta.size, 11);
        assert_eq!(meta.file_type, "txt");
        assert!(!meta.content_hash.is_empty());
        assert!(meta.path.is_absolute());
    }

    #[test]
    fn metadata_for_returns_none_on_missing_file() {
        assert!(metadata_for(Path::new("/nonexistent/a.txt")).is_none());
    }
}
