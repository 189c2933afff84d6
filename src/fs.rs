// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

pub fn path_to_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))
}

/// Create `dir` and any missing parents.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| Error::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Hidden randomly named sibling of `path`.
fn sibling_path(path: &Path, prefix: &str) -> Result<PathBuf> {
    // Same directory as the target so the rename stays on one filesystem
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))?;
    let random_suffix: u64 = rand::Rng::random(&mut rand::rng());
    Ok(parent.join(format!("{}{:x}", prefix, random_suffix)))
}

fn temp_path_for(path: &Path) -> Result<PathBuf> {
    sibling_path(path, ".tmp-")
}

fn rename_into_place(temp_path: &Path, path: &Path) -> Result<()> {
    fs::rename(temp_path, path).map_err(|e| {
        if temp_path.exists() {
            let _ = fs::remove_file(temp_path);
        }
        Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Atomically write a world-readable (0644 on Unix) file using a temporary
/// file and rename.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(path)?;
    write_public_file(&temp_path, contents)?;
    rename_into_place(&temp_path, path)
}

/// Who may read a file written by [`write_all_or_nothing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Secret,
}

/// One file in a group written by [`write_all_or_nothing`].
pub struct PendingWrite<'a> {
    pub path: &'a Path,
    pub contents: &'a [u8],
    pub visibility: Visibility,
}

/// Write a group of files so that either all of them end up in place or
/// none of them do.
///
/// Every file is first staged next to its destination. Only when all stages
/// succeeded are they renamed into place. Files being replaced are moved
/// aside first; if a later rename fails they are restored, and destinations
/// that did not exist before are removed.
pub fn write_all_or_nothing(writes: &[PendingWrite<'_>]) -> Result<()> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(writes.len());

    for write in writes {
        let temp_path = match temp_path_for(write.path) {
            Ok(p) => p,
            Err(e) => {
                discard(staged.iter().map(|(temp, _)| temp.as_path()));
                return Err(e);
            }
        };
        let result = match write.visibility {
            Visibility::Public => write_public_file(&temp_path, write.contents),
            Visibility::Secret => write_secret_file(&temp_path, write.contents),
        };
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            discard(staged.iter().map(|(temp, _)| temp.as_path()));
            return Err(e);
        }
        staged.push((temp_path, write.path));
    }

    let mut committed: Vec<(&Path, Option<PathBuf>)> = Vec::with_capacity(staged.len());
    for (index, (temp_path, dest)) in staged.iter().enumerate() {
        let result = move_aside(dest).and_then(|backup| {
            match fs::rename(temp_path, dest) {
                Ok(()) => Ok(backup),
                Err(e) => {
                    if let Some(backup) = &backup {
                        restore(backup, dest);
                    }
                    Err(Error::WriteFile {
                        path: dest.to_path_buf(),
                        source: e,
                    })
                }
            }
        });
        match result {
            Ok(backup) => committed.push((*dest, backup)),
            Err(e) => {
                for (dest, backup) in committed.iter().rev() {
                    match backup {
                        Some(backup) => restore(backup, dest),
                        None => discard(std::iter::once(*dest)),
                    }
                }
                discard(staged[index..].iter().map(|(temp, _)| temp.as_path()));
                return Err(e);
            }
        }
    }

    discard(committed.iter().filter_map(|(_, backup)| backup.as_deref()));
    Ok(())
}

/// Rename an existing regular file at `dest` to a hidden backup next to it.
fn move_aside(dest: &Path) -> Result<Option<PathBuf>> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if !meta.is_dir() => {
            let backup = sibling_path(dest, ".bak-")?;
            fs::rename(dest, &backup).map_err(|e| Error::WriteFile {
                path: dest.to_path_buf(),
                source: e,
            })?;
            Ok(Some(backup))
        }
        _ => Ok(None),
    }
}

fn restore(backup: &Path, dest: &Path) {
    if let Err(e) = fs::rename(backup, dest) {
        tracing::warn!(
            path = %dest.display(),
            backup = %backup.display(),
            error = %e,
            "failed to restore previous file"
        );
    }
}

fn discard<'a>(paths: impl Iterator<Item = &'a Path>) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to clean up partial write");
            }
        }
    }
}

#[cfg(unix)]
fn write_public_file(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let map_err = |e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .map_err(map_err)?;

    // mode() is filtered through the umask
    file.set_permissions(fs::Permissions::from_mode(0o644))
        .map_err(map_err)?;
    file.write_all(contents).map_err(map_err)?;
    file.sync_all().map_err(map_err)?;

    Ok(())
}

#[cfg(not(unix))]
fn write_public_file(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;

    let map_err = |e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::create(path).map_err(map_err)?;
    file.write_all(contents).map_err(map_err)?;
    file.sync_all().map_err(map_err)?;
    Ok(())
}

#[cfg(unix)]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;

    file.write_all(contents).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    file.sync_all().map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(windows)]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    use std::process::Command;

    std::fs::write(path, contents).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    // Restrict to current user only via icacls - MUST succeed for security
    let path_str = path_to_str(path)?;

    let username = std::env::var("USERNAME").map_err(|_| {
        Error::Config("Cannot determine current user for file permissions".to_string())
    })?;

    let output = Command::new("icacls")
        .args([
            path_str,
            "/inheritance:r",
            "/grant:r",
            &format!("{}:F", username),
        ])
        .output()
        .map_err(|e| Error::Command {
            command: "icacls".to_string(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);

        // Never leave a readable private key behind
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove insecure key file");
        }

        return Err(Error::Command {
            command: format!("icacls {}", path.display()),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(())
}

#[cfg(not(any(unix, windows)))]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Exclusive advisory lock on a file, released on drop.
///
/// The lock file itself carries no data. Separate opens conflict with each
/// other, so the lock serializes threads of one process as well as separate
/// processes.
#[derive(Debug)]
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Block until the exclusive lock on `path` is held.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::Lock {
                path: path.to_path_buf(),
                source: e,
            })?;

        FileExt::lock_exclusive(&file).map_err(|e| Error::Lock {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::trace!(path = %path.display(), "lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

/// Names that collide with the CA's own files when a leaf is written into
/// the CA directory.
pub const RESERVED_NAMES: &[&str] = &["ca", "config"];

pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name.to_lowercase().as_str())
}
