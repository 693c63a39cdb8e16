//! Local tar.gz handling for backup bundles
//!
//! A bundle is an outer `<namespace>-<cluster>-<timestamp>.tar.gz` holding
//! one `<volume>.tar.gz` per state volume at its top level.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tar::{Archive, Builder};
use tracing::debug;

use crate::config::ClusterRef;
use crate::error::{Error, Result};

/// Suffix of every archive produced or consumed
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Bundle base name (without suffix) for a backup taken at `now`
pub fn bundle_name(cluster: &ClusterRef, now: DateTime<Local>) -> String {
    format!(
        "{}-{}-{}",
        cluster.namespace,
        cluster.name,
        now.format("%Y%m%d_%H%M%S")
    )
}

/// File name of the inner archive holding `volume`
pub fn volume_archive_name(volume: &str) -> String {
    format!("{}{}", volume, ARCHIVE_SUFFIX)
}

/// Archive the recursive contents of `src` into `dest`, like `tar -czf dest -C src .`
pub fn pack_dir(src: &Path, dest: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(Error::archive(format!("Source is not a directory: {}", src.display())));
    }

    let file = File::create(dest)
        .map_err(|e| Error::archive(format!("Failed to create {}: {}", dest.display(), e)))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    builder
        .append_dir_all(".", src)
        .map_err(|e| Error::archive(format!("Failed to archive {}: {}", src.display(), e)))?;
    finish(builder, dest)
}

/// Bundle every `*.tar.gz` directly inside `staging` into `dest`.
///
/// Entries are stored under their bare file name, in sorted order.
/// Returns the entry names written.
pub fn bundle_files(staging: &Path, dest: &Path) -> Result<Vec<String>> {
    let mut files = fs::read_dir(staging)
        .map_err(|e| Error::archive(format!("Failed to read {}: {}", staging.display(), e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_archive(path))
        .collect::<Vec<_>>();
    files.sort();

    write_bundle(&files, dest)
}

/// Write `files` into a bundle at `dest`.
///
/// The bundle is built under a temporary name and only renamed into place
/// once complete, so a failure never leaves a truncated bundle behind.
fn write_bundle(files: &[PathBuf], dest: &Path) -> Result<Vec<String>> {
    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let result = write_entries(files, &tmp, dest).and_then(|names| {
        fs::rename(&tmp, dest).map_err(|e| {
            Error::archive(format!("Failed to move bundle to {}: {}", dest.display(), e))
        })?;
        Ok(names)
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_entries(files: &[PathBuf], tmp: &Path, dest: &Path) -> Result<Vec<String>> {
    let file = File::create(tmp)
        .map_err(|e| Error::archive(format!("Failed to create {}: {}", tmp.display(), e)))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));

    let mut names = Vec::with_capacity(files.len());
    for path in files {
        let name = file_name(path)?;
        debug!(entry = %name, bundle = %dest.display(), "Adding archive to bundle");
        builder
            .append_path_with_name(path, &name)
            .map_err(|e| Error::archive(format!("Failed to add {}: {}", path.display(), e)))?;
        names.push(name);
    }
    finish(builder, tmp)?;
    Ok(names)
}

/// Extract the tar.gz at `src` into `dest`
pub fn unpack(src: &Path, dest: &Path) -> Result<()> {
    let file = File::open(src)
        .map_err(|e| Error::archive(format!("Failed to open {}: {}", src.display(), e)))?;
    fs::create_dir_all(dest)?;
    Archive::new(GzDecoder::new(file))
        .unpack(dest)
        .map_err(|e| Error::archive(format!("Failed to extract {}: {}", src.display(), e)))
}

/// Inner archives directly inside `dir`, keyed by volume name
pub fn volume_archives(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut archives = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = file_name(&path)?;
        if let Some(volume) = name.strip_suffix(ARCHIVE_SUFFIX) {
            if !volume.is_empty() {
                archives.insert(volume.to_string(), path);
            }
        }
    }
    Ok(archives)
}

/// Run archive work on the blocking pool, off the async executor
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::archive(format!("Archive task failed: {}", e)))?
}

fn is_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(ARCHIVE_SUFFIX))
        .unwrap_or(false)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::archive(format!("Invalid file name: {}", path.display())))
}

fn finish(builder: Builder<GzEncoder<File>>, dest: &Path) -> Result<()> {
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| Error::archive(format!("Failed to write {}: {}", dest.display(), e)))?;
    Ok(())
}
