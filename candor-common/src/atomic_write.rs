//! Atomic file writes (temp file + rename)
//!
//! Readers see either the previous file or the complete new one, never a
//! partially written file. Temp files live next to the target so the rename
//! stays on one filesystem.

use crate::Result;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Suffix used for in-progress writes. Directory scans skip these.
pub const TEMP_SUFFIX: &str = "tmp";

/// Build a unique temp path next to `target`
///
/// Concurrent writers to the same target each get their own temp file, so the
/// last rename wins and no writer observes another's partial output.
pub fn temp_path_for(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(
        "{}.{}.{}",
        file_name,
        Uuid::new_v4().simple(),
        TEMP_SUFFIX
    ))
}

/// Returns true if `path` is an in-progress temp file
pub fn is_temp_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(TEMP_SUFFIX)
}

/// Write `contents` to `target` atomically
pub async fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let temp = temp_path_for(target);
    if let Err(e) = tokio::fs::write(&temp, contents).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&temp, target).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("record.json");

        write_atomic(&target, b"first").await.unwrap();
        write_atomic(&target, b"second").await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("record.json");

        write_atomic(&target, b"payload").await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_temp_file(&e.path()))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_temp_paths_are_unique() {
        let target = Path::new("/tmp/cache/abc.json");
        let a = temp_path_for(target);
        let b = temp_path_for(target);
        assert_ne!(a, b);
        assert!(is_temp_file(&a));
        assert!(!is_temp_file(target));
    }

    #[tokio::test]
    async fn test_missing_dir_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("missing").join("record.json");

        let result = write_atomic(&target, b"payload").await;
        assert!(result.is_err());
        assert!(!target.exists());
    }
}
