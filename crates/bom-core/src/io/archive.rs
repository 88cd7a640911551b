//! Gzip-compressed tar packing and unpacking.
//!
//! [`pack`] turns a provider's output tree into the artifact archive.
//! Entry names are relative to the packed root and are emitted in a stable
//! (sorted) order. Symbolic links are archived as the regular file they point
//! to, and only when that file lives inside the packed root. Links to
//! directories, dangling links and links escaping the root are skipped.
//!
//! The archive is written to a temporary file beside `archive_path` and only
//! renamed into place once complete, so a failed pack never leaves a
//! truncated archive behind.
//!
//! [`unpack`] and [`unpack_tar`] are the inverse. Both reject entries that
//! would land outside the destination, whether by name or through a link
//! unpacked earlier, and can strip leading path components (source-host
//! snapshots wrap everything in a single top-level directory).

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PackError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("nothing to pack: {} does not exist or is not a directory", .0.display())]
    MissingSource(PathBuf),

    #[error("nothing to pack: {} is empty", .0.display())]
    EmptySource(PathBuf),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid path in archive: {0}")]
    UnsafePath(String),
}

/// Pack every file under `source_dir` into a gzip-compressed tar at
/// `archive_path`, returning the number of entries written.
///
/// The archive is written next to, never inside, the tree being packed:
/// callers must not place `archive_path` under `source_dir`.
pub fn pack(source_dir: &Path, archive_path: &Path) -> Result<usize, PackError> {
    if !source_dir.is_dir() {
        return Err(PackError::MissingSource(source_dir.to_path_buf()));
    }
    if fs::read_dir(source_dir)?.next().is_none() {
        return Err(PackError::EmptySource(source_dir.to_path_buf()));
    }
    let root = fs::canonicalize(source_dir)?;
    persist_atomically(archive_path, |file| write_tree(&root, file))
}

/// Run `write` against a temporary file next to `path`, then move it to
/// `path`. On error the temporary file is removed and `path` is untouched.
fn persist_atomically<T, F>(path: &Path, write: F) -> Result<T, PackError>
where
    F: FnOnce(&File) -> Result<T, PackError>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let tmp = tempfile::Builder::new()
        .prefix(".pack-")
        .tempfile_in(parent)?;
    let value = write(tmp.as_file())?;
    tmp.persist(path).map_err(|e| PackError::Io(e.error))?;
    Ok(value)
}

fn write_tree(root: &Path, file: &File) -> Result<usize, PackError> {
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut entries = 0;

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|_| PackError::UnsafePath(path.display().to_string()))?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            builder.append_dir(relative, path)?;
        } else if file_type.is_file() {
            let mut f = File::open(path)?;
            builder.append_file(relative, &mut f)?;
        } else if file_type.is_symlink() {
            match fs::canonicalize(path) {
                Ok(target) if target.starts_with(root) && target.is_file() => {
                    let mut f = File::open(&target)?;
                    builder.append_file(relative, &mut f)?;
                }
                _ => {
                    debug!("skipping link {}", relative.display());
                    continue;
                }
            }
        } else {
            debug!("skipping special file {}", relative.display());
            continue;
        }
        entries += 1;
    }

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(entries)
}

/// Unpack a gzip-compressed tar into `dest_dir`, dropping the first
/// `strip_components` path components of every entry.
pub fn unpack(
    archive_path: &Path,
    dest_dir: &Path,
    strip_components: usize,
) -> Result<usize, PackError> {
    let file = File::open(archive_path)?;
    let reader = GzDecoder::new(BufReader::new(file));
    unpack_tar(reader, dest_dir, strip_components)
}

/// Unpack an uncompressed tar stream into `dest_dir`.
///
/// Only directories, regular files and links are materialized. Device
/// nodes and FIFOs (present in exported container filesystems) are skipped.
pub fn unpack_tar<R: Read>(
    reader: R,
    dest_dir: &Path,
    strip_components: usize,
) -> Result<usize, PackError> {
    fs::create_dir_all(dest_dir)?;
    let canonical_dest = fs::canonicalize(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    let mut unpacked = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();

        if kind.is_pax_global_extensions() || kind.is_pax_local_extensions() {
            continue;
        }

        let Some(relative) = stripped(&entry.path()?, strip_components)? else {
            continue;
        };
        ensure_inside(dest_dir, &canonical_dest, &relative)?;
        let target = dest_dir.join(&relative);

        if kind.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if !(kind.is_file() || kind.is_symlink() || kind.is_hard_link()) {
            debug!("skipping {:?} entry {}", kind, relative.display());
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if target.symlink_metadata().is_ok() {
            fs::remove_file(&target)?;
        }

        if kind.is_hard_link() {
            let link = entry
                .link_name()?
                .ok_or_else(|| PackError::UnsafePath(relative.display().to_string()))?;
            let Some(link_relative) = stripped(&link, strip_components)? else {
                continue;
            };
            ensure_inside(dest_dir, &canonical_dest, &link_relative)?;
            fs::hard_link(dest_dir.join(link_relative), &target)?;
        } else {
            entry.unpack(&target)?;
        }
        unpacked += 1;
    }

    Ok(unpacked)
}

/// Reject `relative` if any existing ancestor under `dest_dir` is a link
/// resolving outside `canonical_dest`. The last component itself is
/// replaced, not followed, so only its parents are checked.
fn ensure_inside(dest_dir: &Path, canonical_dest: &Path, relative: &Path) -> Result<(), PackError> {
    let Some(parent) = relative.parent() else {
        return Ok(());
    };
    let mut current = dest_dir.to_path_buf();
    for part in parent.components() {
        current.push(part);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let inside = fs::canonicalize(&current)
                    .is_ok_and(|resolved| resolved.starts_with(canonical_dest));
                if !inside {
                    return Err(PackError::UnsafePath(relative.display().to_string()));
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn stripped(path: &Path, strip_components: usize) -> Result<Option<PathBuf>, PackError> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PackError::UnsafePath(path.display().to_string()));
            }
        }
    }
    if parts.len() <= strip_components {
        return Ok(None);
    }
    Ok(Some(parts[strip_components..].iter().collect()))
}
