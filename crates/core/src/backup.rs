//! Zip snapshots of the project storage root.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::CoreError;

/// Archive every file and directory under `root` into `<dest_dir>/<stem>.zip`.
///
/// Entry names are relative to `root`. When `dest_dir` lies inside `root`
/// it is left out of the archive. The archive is written under a temporary
/// name and renamed into place once complete.
pub async fn archive_dir(
    root: &Path,
    dest_dir: &Path,
    stem: &str,
) -> Result<PathBuf, CoreError> {
    tokio::fs::create_dir_all(dest_dir).await?;
    let archive = dest_dir.join(format!("{stem}.zip"));
    let partial = dest_dir.join(format!("{stem}.zip.tmp"));

    let (root_owned, dest_owned, partial_owned) =
        (root.to_path_buf(), dest_dir.to_path_buf(), partial.clone());
    let entries = tokio::task::spawn_blocking(move || {
        write_zip(&root_owned, &dest_owned, &partial_owned)
    })
    .await
    .map_err(|e| CoreError::Internal(format!("Backup worker failed: {e}")))?;

    let entries = match entries {
        Ok(entries) => entries,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };
    tokio::fs::rename(&partial, &archive).await?;

    tracing::info!(archive = %archive.display(), entries, "Projects backed up");
    Ok(archive)
}

fn write_zip(root: &Path, dest_dir: &Path, partial: &Path) -> Result<usize, CoreError> {
    let mut zip = ZipWriter::new(File::create(partial)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut count = 0;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != dest_dir);
    for entry in walker {
        let entry = entry.map_err(|e| CoreError::Persistence(e.to_string()))?;
        let Some(name) = entry_name(root, entry.path()) else {
            continue;
        };

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options).map_err(zip_error)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options).map_err(zip_error)?;
            io::copy(&mut File::open(entry.path())?, &mut zip)?;
        } else {
            continue;
        }
        count += 1;
    }

    zip.finish().map_err(zip_error)?;
    Ok(count)
}

/// Forward-slash path of `path` relative to `root`.
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn zip_error(e: zip::result::ZipError) -> CoreError {
    CoreError::Persistence(format!("Failed to write backup archive: {e}"))
}
