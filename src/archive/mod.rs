//! Zip archive packaging and extraction.
//!
//! [`ArchiveService`] turns a platform build directory into the release
//! archive and, on the client side, extracts a downloaded archive into a
//! staging directory. Archives are verified (every entry read back and its
//! CRC checked) after compression and before extraction. Extraction runs under
//! the bounded [`RetryPolicy`], so a verification failure caused by a file
//! that is still being written is retried rather than reported at once.
//!
//! All zip work is blocking and runs on tokio's blocking pool.

use crate::core::{DeskshipError, Result};
use crate::process::RetryPolicy;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Compress, extract and verify zip archives.
#[derive(Debug, Clone, Default)]
pub struct ArchiveService {
    retry: RetryPolicy,
}

impl ArchiveService {
    /// Service using the default retry policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Service using `retry` for extraction.
    #[must_use]
    pub const fn with_retry(retry: RetryPolicy) -> Self {
        Self {
            retry,
        }
    }

    /// Compress the contents of `source` into a new archive at `dest`.
    ///
    /// Entries are stored relative to `source` in sorted order, so the same
    /// input always produces the same entry list. Any existing file at `dest`
    /// is replaced. The written archive is verified before returning.
    ///
    /// Returns the number of file entries written.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Integrity`] if `source` holds no files or the
    /// archive fails verification, and [`DeskshipError::Io`] for file system
    /// failures.
    pub async fn compress_dir(&self, source: &Path, dest: &Path) -> Result<usize> {
        let source = source.to_path_buf();
        let dest_path = dest.to_path_buf();
        let written = tokio::task::spawn_blocking(move || compress_blocking(&source, &dest_path))
            .await
            .map_err(join_error)??;

        let verified = self.verify(dest).await?;
        if verified < written {
            return Err(DeskshipError::Integrity {
                reason: format!(
                    "{} lists {verified} files after writing {written}",
                    dest.display()
                ),
            });
        }

        tracing::debug!("Compressed {} files into {}", written, dest.display());
        Ok(written)
    }

    /// Read every entry of `archive` and check its CRC.
    ///
    /// Returns the number of file entries.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Integrity`] for an empty, truncated or corrupt archive.
    pub async fn verify(&self, archive: &Path) -> Result<usize> {
        let archive = archive.to_path_buf();
        tokio::task::spawn_blocking(move || verify_blocking(&archive))
            .await
            .map_err(join_error)?
    }

    /// Extract `archive` into `dest`, retrying recoverable failures.
    ///
    /// `dest` is emptied before each attempt, so a failed attempt never leaves
    /// a mix of old and new files behind. Returns the number of files written.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Integrity`] if the archive is corrupt, holds
    /// no files, or contains entries that would escape `dest`.
    pub async fn extract(&self, archive: &Path, dest: &Path) -> Result<usize> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();

        self.retry
            .run("extract archive", || {
                let archive = archive.clone();
                let dest = dest.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        verify_blocking(&archive)?;
                        extract_blocking(&archive, &dest)
                    })
                    .await
                    .map_err(join_error)?
                }
            })
            .await
    }
}

fn join_error(error: tokio::task::JoinError) -> DeskshipError {
    DeskshipError::Io(io::Error::other(format!("archive task failed: {error}")))
}

fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    0o644
}

fn compress_blocking(source: &Path, dest: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Err(DeskshipError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("build output {} does not exist", source.display()),
        )));
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if dest.exists() {
        fs::remove_file(dest)?;
    }

    let mut writer = ZipWriter::new(BufWriter::new(File::create(dest)?));
    let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut files = 0usize;

    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| DeskshipError::Io(io::Error::other(e.to_string())))?;
        let Some(name) = entry_name(source, entry.path()) else {
            continue;
        };
        let metadata = entry.path().symlink_metadata()?;
        let options = base.unix_permissions(file_mode(&metadata));

        if metadata.is_symlink() {
            let target = fs::read_link(entry.path())?;
            writer.add_symlink(name, target.to_string_lossy().into_owned(), options)?;
            files += 1;
        } else if metadata.is_dir() {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
            let mut input = BufReader::new(File::open(entry.path())?);
            io::copy(&mut input, &mut writer)?;
            files += 1;
        }
    }

    writer.finish()?;

    if files == 0 {
        let _ = fs::remove_file(dest);
        return Err(DeskshipError::Integrity {
            reason: format!("{} contains no files to package", source.display()),
        });
    }

    Ok(files)
}

fn verify_blocking(archive_path: &Path) -> Result<usize> {
    let corrupt = |e: &dyn std::fmt::Display| DeskshipError::Integrity {
        reason: format!("{} is corrupt: {e}", archive_path.display()),
    };

    let metadata = fs::metadata(archive_path)?;
    if metadata.len() == 0 {
        return Err(DeskshipError::Integrity {
            reason: format!("{} is empty", archive_path.display()),
        });
    }

    let mut archive = ZipArchive::new(BufReader::new(File::open(archive_path)?))?;
    let mut files = 0usize;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink()).map_err(|e| corrupt(&e))?;
        files += 1;
    }

    if files == 0 {
        return Err(DeskshipError::Integrity {
            reason: format!("{} contains no files", archive_path.display()),
        });
    }

    Ok(files)
}

fn extract_blocking(archive_path: &Path, dest: &Path) -> Result<usize> {
    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::create_dir_all(dest)?;

    let root = fs::canonicalize(dest)?;
    let mut archive = ZipArchive::new(BufReader::new(File::open(archive_path)?))?;
    let mut files = 0usize;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let relative: PathBuf = entry.enclosed_name().ok_or_else(|| DeskshipError::Integrity {
            reason: format!("entry '{}' escapes the extraction directory", entry.name()),
        })?;
        ensure_no_escaping_link(&root, &relative)?;
        let target = root.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        if entry.is_symlink() {
            let mut link_target = String::new();
            io::Read::read_to_string(&mut entry, &mut link_target)?;
            if !link_stays_inside(&relative, Path::new(&link_target)) {
                return Err(DeskshipError::Integrity {
                    reason: format!(
                        "link '{}' points outside the extraction directory ({link_target})",
                        entry.name()
                    ),
                });
            }
            create_symlink(&link_target, &target)?;
            files += 1;
            continue;
        }

        let mut output = BufWriter::new(File::create(&target)?);
        io::copy(&mut entry, &mut output)?;
        drop(output);

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))?;
        }
        files += 1;
    }

    if files == 0 {
        return Err(DeskshipError::Integrity {
            reason: format!("{} produced no files", archive_path.display()),
        });
    }

    tracing::debug!("Extracted {} files into {}", files, dest.display());
    Ok(files)
}

/// Whether a link stored at `link` (relative to the extraction root) with
/// target `link_target` resolves to a path inside the root.
fn link_stays_inside(link: &Path, link_target: &Path) -> bool {
    let mut depth = link.components().count().saturating_sub(1);
    for component in link_target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Refuse to write `relative` when an existing link along its path leads
/// outside `root`.
fn ensure_no_escaping_link(root: &Path, relative: &Path) -> Result<()> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        let Ok(metadata) = fs::symlink_metadata(&current) else {
            break;
        };
        if metadata.file_type().is_symlink() {
            let resolved = fs::canonicalize(&current).unwrap_or_default();
            if !resolved.starts_with(root) {
                return Err(DeskshipError::Integrity {
                    reason: format!(
                        "{} leads outside the extraction directory",
                        current.display()
                    ),
                });
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn create_symlink(link_target: &str, path: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link_target, path)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_symlink(link_target: &str, path: &Path) -> Result<()> {
    // Without symlink privileges, store the link target as a plain file.
    fs::write(path, link_target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast() -> ArchiveService {
        ArchiveService::with_retry(RetryPolicy::new(3, Duration::from_millis(5)))
    }

    fn populate(dir: &Path) {
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::write(dir.join("App"), b"binary").unwrap();
        fs::write(dir.join("lib/data.bin"), vec![7u8; 4096]).unwrap();
    }

    #[tokio::test]
    async fn test_compress_and_extract() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("build");
        populate(&source);

        let archive = temp.path().join("out/App-Linux.zip");
        let service = fast();
        assert_eq!(service.compress_dir(&source, &archive).await.unwrap(), 2);

        let staging = temp.path().join("staging");
        assert_eq!(service.extract(&archive, &staging).await.unwrap(), 2);
        assert_eq!(fs::read(staging.join("App")).unwrap(), b"binary");
        assert_eq!(fs::read(staging.join("lib/data.bin")).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_compress_empty_dir_fails() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("empty");
        fs::create_dir_all(&source).unwrap();

        let err = fast().compress_dir(&source, &temp.path().join("e.zip")).await.unwrap_err();
        assert!(matches!(err, DeskshipError::Integrity { .. }));
        assert!(!temp.path().join("e.zip").exists());
    }

    #[tokio::test]
    async fn test_extract_truncated_archive_fails_and_cleans_previous_attempt() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("build");
        populate(&source);
        let archive = temp.path().join("App.zip");
        fast().compress_dir(&source, &archive).await.unwrap();

        let bytes = fs::read(&archive).unwrap();
        fs::write(&archive, &bytes[..bytes.len() / 2]).unwrap();

        let staging = temp.path().join("staging");
        let err = fast().extract(&archive, &staging).await.unwrap_err();
        assert!(matches!(err, DeskshipError::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_verify_rejects_empty_file() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("empty.zip");
        fs::write(&archive, b"").unwrap();
        let err = fast().verify(&archive).await.unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[tokio::test]
    async fn test_recompress_replaces_existing_archive() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("build");
        populate(&source);
        let archive = temp.path().join("App.zip");

        let service = fast();
        service.compress_dir(&source, &archive).await.unwrap();
        fs::remove_file(source.join("lib/data.bin")).unwrap();
        assert_eq!(service.compress_dir(&source, &archive).await.unwrap(), 1);
        assert_eq!(service.verify(&archive).await.unwrap(), 1);
    }

    #[cfg(unix)]
    fn zip_with_link(path: &Path, link: &str, link_target: &str, through: Option<&str>) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        writer.start_file("App", options).unwrap();
        io::Write::write_all(&mut writer, b"binary").unwrap();
        writer.add_symlink(link, link_target, options).unwrap();
        if let Some(name) = through {
            writer.start_file(name, options).unwrap();
            io::Write::write_all(&mut writer, b"payload").unwrap();
        }
        writer.finish().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_rejects_absolute_link_and_writes_nothing_outside() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        let archive = temp.path().join("bad.zip");
        zip_with_link(&archive, "link", &outside.to_string_lossy(), Some("link/pwned.txt"));

        let err = fast().extract(&archive, &temp.path().join("staging")).await.unwrap_err();
        assert!(matches!(err, DeskshipError::Integrity { .. }), "{err}");
        assert!(!outside.join("pwned.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_rejects_link_climbing_out() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.zip");
        zip_with_link(&archive, "lib/up", "../../outside", None);

        let err = fast().extract(&archive, &temp.path().join("staging")).await.unwrap_err();
        assert!(matches!(err, DeskshipError::Integrity { .. }), "{err}");
        assert!(!temp.path().join("staging/lib/up").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_keeps_links_inside_bundle() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("ok.zip");
        zip_with_link(&archive, "Current", "App", None);

        let staging = temp.path().join("staging");
        assert_eq!(fast().extract(&archive, &staging).await.unwrap(), 2);
        assert_eq!(fs::read_link(staging.join("Current")).unwrap(), Path::new("App"));
        assert_eq!(fs::read(staging.join("Current")).unwrap(), b"binary");
    }
}
