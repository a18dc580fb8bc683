//! File system helpers used by build steps.
//!
//! Every build step writes only its own outputs. The helpers here make those writes
//! idempotent: directories are created if missing, generated files are replaced
//! atomically and only when their content actually changes.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Ensures a directory exists, creating it and all parents if necessary.
///
/// An existing directory is not an error. An existing non-directory at `path` is.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Removes a directory tree if it exists.
///
/// Returns `true` when something was removed.
pub fn remove_dir_all(path: &Path) -> Result<bool> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
        return Ok(true);
    }
    Ok(false)
}

/// Atomically replaces `path` with `content`.
///
/// The content goes to a temporary file in the destination directory first and is then
/// renamed over the target, so readers never observe a half-written file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    ensure_dir(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in: {}", parent.display()))?;
    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for: {}", path.display()))?;
    temp.as_file().sync_all().with_context(|| "Failed to sync file to disk")?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Writes `content` to `path` unless the file already holds exactly that content.
///
/// Returns `true` when the file was (re)written. Leaving identical files untouched keeps
/// their modification time stable so the native toolchain does not rebuild them.
pub fn write_if_changed(path: &Path, content: &str) -> Result<bool> {
    if let Ok(existing) = fs::read(path)
        && existing == content.as_bytes()
    {
        tracing::debug!(target: "fs", "Unchanged: {}", path.display());
        return Ok(false);
    }

    atomic_write(path, content.as_bytes())?;
    Ok(true)
}

/// Normalizes a path for storage and for the native toolchain: forward slashes only.
///
/// Windows extended-length prefixes (`\\?\`) added by canonicalization are stripped.
#[must_use]
pub fn normalize_path_for_storage<P: AsRef<Path>>(path: P) -> String {
    let path_str = path.as_ref().to_string_lossy();

    let cleaned = if let Some(stripped) = path_str.strip_prefix(r"\\?\UNC\") {
        format!("//{stripped}")
    } else if let Some(stripped) = path_str.strip_prefix(r"\\?\") {
        stripped.to_string()
    } else {
        path_str.to_string()
    };

    cleaned.replace('\\', "/")
}

/// Joins a normalized base and a relative entry with exactly one `/` between them.
#[must_use]
pub fn join_normalized(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let relative = relative.replace('\\', "/");
    let relative = relative.trim_start_matches("./").trim_start_matches('/');
    if relative.is_empty() || relative == "." {
        base.to_string()
    } else {
        format!("{base}/{relative}")
    }
}

/// Makes `path` absolute relative to `base` without touching the filesystem.
#[must_use]
pub(crate) fn absolutize(base: &Path, path: &Path) -> std::path::PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_dir() {
        let temp = tempdir().unwrap();
        let test_dir = temp.path().join("a/b/c");

        assert!(!test_dir.exists());
        ensure_dir(&test_dir).unwrap();
        assert!(test_dir.is_dir());

        // Already existing is fine
        ensure_dir(&test_dir).unwrap();
    }

    #[test]
    fn test_ensure_dir_on_file() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("file.txt");
        fs::write(&file_path, "content").unwrap();

        let result = ensure_dir(&file_path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }

    #[test]
    fn test_write_if_changed() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("out/main.cpp");

        assert!(write_if_changed(&path, "int main() {}\n").unwrap());
        assert!(!write_if_changed(&path, "int main() {}\n").unwrap());
        assert!(write_if_changed(&path, "int main() { return 1; }\n").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "int main() { return 1; }\n");
    }

    #[test]
    fn test_remove_dir_all_missing() {
        let temp = tempdir().unwrap();
        assert!(!remove_dir_all(&temp.path().join("nope")).unwrap());
    }

    #[test]
    fn test_absolutize() {
        let base = Path::new("/work/app");
        assert_eq!(absolutize(base, Path::new("build")), Path::new("/work/app/build"));
        assert_eq!(absolutize(base, Path::new("/opt/sdk")), Path::new("/opt/sdk"));
    }

    #[test]
    fn test_normalize_path_for_storage() {
        assert_eq!(normalize_path_for_storage(r"C:\work\pkg\src"), "C:/work/pkg/src");
        assert_eq!(normalize_path_for_storage(r"\\?\C:\work\pkg"), "C:/work/pkg");
        assert_eq!(normalize_path_for_storage("/home/u/pkg"), "/home/u/pkg");
    }

    #[test]
    fn test_join_normalized() {
        assert_eq!(join_normalized("/pkg/", "src"), "/pkg/src");
        assert_eq!(join_normalized("/pkg", "./native\\src"), "/pkg/native/src");
        assert_eq!(join_normalized("/pkg", "."), "/pkg");
    }
}
