//! Multipart uploads into `storage/` or `site/`, with in-place zip extraction.

use axum::extract::multipart::Field;
use axum::extract::Multipart;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{InstanceError, InstanceResult};

/// Multipart field carrying uploaded files.
pub const FILES_FIELD: &str = "files";

/// Reduce a client-supplied file name to a safe basename.
///
/// Path components are dropped, characters outside `[A-Za-z0-9._-]` become
/// `_`, and leading dots are stripped. Returns `None` when nothing usable is
/// left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim_matches('_');

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

pub fn is_zip(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".zip")
}

/// Store every `files` part under `dir`; archives are unpacked and removed.
/// Returns the number of parts received.
pub async fn receive_files(mut multipart: Multipart, dir: &Path) -> InstanceResult<usize> {
    let mut received = 0;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        received += 1;

        let Some(name) = field.file_name().and_then(sanitize_filename) else {
            debug!("skipping upload part without a usable file name");
            continue;
        };

        let target = dir.join(&name);
        let written = match write_field(&mut field, &target).await {
            Ok(written) => written,
            Err(err) => {
                // Never leave a truncated upload behind.
                if let Err(rm) = tokio::fs::remove_file(&target).await {
                    debug!(file = %name, error = %rm, "no partial upload to remove");
                }
                return Err(err);
            }
        };
        info!(file = %name, bytes = written, "upload stored");

        if is_zip(&name) {
            let dest = dir.to_path_buf();
            let extracted =
                tokio::task::spawn_blocking(move || extract_zip(&target, &dest)).await??;
            info!(archive = %name, entries = extracted, "archive extracted");
        }
    }

    Ok(received)
}

async fn write_field(field: &mut Field<'_>, target: &Path) -> InstanceResult<u64> {
    let mut file = tokio::fs::File::create(target)
        .await
        .map_err(|e| InstanceError::io(format!("creating {}", target.display()), e))?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await? {
        written += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|e| InstanceError::io(format!("writing {}", target.display()), e))?;
    }
    file.flush()
        .await
        .map_err(|e| InstanceError::io(format!("writing {}", target.display()), e))?;
    Ok(written)
}

/// Unix file-type bits for a symbolic link.
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Unpack `archive` into `dest` and delete the archive, even when it turns out
/// to be unreadable. Only directories and regular files are written: entries
/// whose path would leave `dest` and symlink entries are skipped. Returns the
/// number of entries written.
pub fn extract_zip(archive: &Path, dest: &Path) -> InstanceResult<usize> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let result = File::open(archive)
        .map_err(|e| InstanceError::io(format!("opening {}", archive.display()), e))
        .and_then(|file| {
            let mut zip = zip::ZipArchive::new(file).map_err(|source| InstanceError::Archive {
                name: name.clone(),
                source,
            })?;
            unpack(&mut zip, dest).map_err(|err| match err {
                UnpackError::Zip(source) => InstanceError::Archive {
                    name: name.clone(),
                    source,
                },
                UnpackError::Io(context, source) => InstanceError::io(context, source),
            })
        });

    fs::remove_file(archive)
        .map_err(|e| InstanceError::io(format!("removing {}", archive.display()), e))?;
    result
}

enum UnpackError {
    Zip(zip::result::ZipError),
    Io(String, io::Error),
}

fn unpack(zip: &mut zip::ZipArchive<File>, dest: &Path) -> Result<usize, UnpackError> {
    let mut written = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(UnpackError::Zip)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %entry.name(), "skipping archive entry outside the target directory");
            continue;
        };
        if entry.unix_mode().is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
            warn!(entry = %entry.name(), "skipping symlink in archive");
            continue;
        }

        let out = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out)
                .map_err(|e| UnpackError::Io(format!("creating {}", out.display()), e))?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| UnpackError::Io(format!("creating {}", parent.display()), e))?;
            }
            let mut file = File::create(&out)
                .map_err(|e| UnpackError::Io(format!("creating {}", out.display()), e))?;
            io::copy(&mut entry, &mut file)
                .map_err(|e| UnpackError::Io(format!("extracting {}", out.display()), e))?;
        }
        written += 1;
    }
    Ok(written)
}
