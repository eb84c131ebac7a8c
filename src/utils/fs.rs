//! File system helpers shared by the pipeline and the updater.

use crate::core::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Create `path` and its parents if missing.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Recursively remove `path`; a missing directory is not an error.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Copy the directory tree at `src` into `dst`, overwriting existing files.
///
/// Symlinks are recreated as symlinks on Unix, which keeps framework
/// layouts inside application bundles intact. Returns the number of files copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<usize> {
    ensure_dir(dst)?;
    let mut copied = 0;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if file_type.is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
            copied += 1;
        } else if file_type.is_dir() {
            copied += copy_dir_all(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path)?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src)?;
    if dst.symlink_metadata().is_ok() {
        fs::remove_file(dst)?;
    }
    std::os::unix::fs::symlink(target, dst)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)?;
    Ok(())
}

/// Copy a file or a directory tree from `src` to `dst`.
pub fn copy_path(src: &Path, dst: &Path) -> Result<usize> {
    if src.is_dir() {
        copy_dir_all(src, dst)
    } else {
        if let Some(parent) = dst.parent() {
            ensure_dir(parent)?;
        }
        fs::copy(src, dst)?;
        Ok(1)
    }
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Whether `dir` contains at least one regular file anywhere below it.
#[must_use]
pub fn has_files(dir: &Path) -> bool {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .any(|entry| entry.file_type().is_file())
}

/// Write `content` to `path` via a temp file in the same directory and a rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Lowercase hex SHA-256 of the file at `path`.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_dir_all_overwrites() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.txt"), "new").unwrap();
        fs::write(src.join("nested/b.txt"), "b").unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("a.txt"), "old").unwrap();
        fs::write(dst.join("keep.txt"), "keep").unwrap();

        assert_eq!(copy_dir_all(&src, &dst).unwrap(), 2);
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dst.join("nested/b.txt")).unwrap(), "b");
        assert!(dst.join("keep.txt").exists());
    }

    #[test]
    fn test_list_files_sorted_and_flat() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.zip"), "").unwrap();
        fs::write(temp.path().join("a.zip"), "").unwrap();
        fs::create_dir(temp.path().join("dir")).unwrap();

        let names: Vec<String> = list_files(temp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.zip", "b.zip"]);
    }

    #[test]
    fn test_remove_missing_dir_is_ok() {
        let temp = TempDir::new().unwrap();
        remove_dir_all(&temp.path().join("missing")).unwrap();
    }

    #[test]
    fn test_atomic_write_and_hash() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sub/file.txt");
        atomic_write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(has_files(temp.path()));
    }
}
