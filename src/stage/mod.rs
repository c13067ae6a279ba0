//! Stages a resource's inputs onto local disk before `process_message` runs,
//! and guarantees their cleanup afterward (spec.md §4.3).
//!
//! Mirrors pyclowder's `_check_for_local_file` / `_download_file_metadata` /
//! `_prepare_dataset`: prefer a host-visible mount remapped to a local path
//! over downloading, and fall back to a dataset-wide zip download when a
//! per-file fetch would be wasteful.

use crate::error::StageError;
use crate::host::{self, HostClient};
use crate::model::{MountMap, Resource};
use std::path::{Path, PathBuf};

/// Everything staged for one message. Dropping this removes every temp file
/// and directory it tracks, regardless of how `process_message` returned
/// (spec.md §4.3's cleanup contract) — paths resolved to an existing local
/// mount are never tracked here and are left untouched.
#[derive(Debug, Default)]
pub struct StagedInputs {
    pub paths: Vec<PathBuf>,
    temp_files: Vec<PathBuf>,
    temp_dirs: Vec<PathBuf>,
}

impl StagedInputs {
    fn local(paths: Vec<PathBuf>) -> Self {
        Self { paths, temp_files: Vec::new(), temp_dirs: Vec::new() }
    }
}

impl Drop for StagedInputs {
    fn drop(&mut self) {
        for file in &self.temp_files {
            if let Err(err) = std::fs::remove_file(file) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %file.display(), error = %err, "failed to remove staged temp file");
                }
            }
        }
        for dir in &self.temp_dirs {
            if let Err(err) = std::fs::remove_dir_all(dir) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %dir.display(), error = %err, "failed to remove staged temp dir");
                }
            }
        }
    }
}

/// Resolves a host-reported `filepath` to a local path (spec.md §4.2):
/// first checked as-is (the host and worker may already share a filesystem),
/// then remapped through the operator's mount map. The remapped candidate
/// is trusted without an existence check — that mapping is the operator's
/// contract, not something `LocalFileResolver` verifies.
fn resolve_local(mount_map: &MountMap, filepath: &str) -> Option<PathBuf> {
    let direct = Path::new(filepath);
    if direct.exists() {
        return Some(direct.to_path_buf());
    }
    mount_map.resolve(filepath).map(PathBuf::from)
}

fn new_temp_dir() -> Result<PathBuf, StageError> {
    Ok(tempfile::Builder::new()
        .prefix("extractor-connector-")
        .tempdir()?
        .into_path())
}

/// Stages inputs for `resource`. Metadata resources need no local files.
pub fn stage(
    resource: &Resource,
    host: &str,
    secret_key: &str,
    host_client: &HostClient,
    mount_map: &MountMap,
) -> Result<StagedInputs, StageError> {
    match resource {
        Resource::File(file) => stage_file(&file.header.id, &file.file_ext, host, secret_key, host_client, mount_map),
        Resource::Dataset(dataset) => stage_dataset(&dataset.header.id, &dataset.files, host, secret_key, host_client, mount_map),
        Resource::Metadata(_) => Ok(StagedInputs::default()),
    }
}

fn stage_file(
    file_id: &str,
    file_ext: &str,
    host: &str,
    secret_key: &str,
    host_client: &HostClient,
    mount_map: &MountMap,
) -> Result<StagedInputs, StageError> {
    if let Ok(info) = host_client.file_info(host, secret_key, file_id) {
        if let Some(filepath) = info.filepath.as_deref() {
            if let Some(local) = resolve_local(mount_map, filepath) {
                return Ok(StagedInputs::local(vec![local]));
            }
        }
    }

    let dir = new_temp_dir()?;
    let file_path = host::temp_file_path(&dir, file_id, file_ext);
    host_client.download_file(host, secret_key, file_id, &file_path)?;

    let metadata_path = host::temp_file_path(&dir, file_id, ".metadata.json");
    host_client.download_file_metadata(host, secret_key, file_id, &metadata_path)?;

    Ok(StagedInputs {
        paths: vec![file_path.clone(), metadata_path.clone()],
        temp_files: vec![file_path, metadata_path],
        temp_dirs: vec![dir],
    })
}

fn stage_dataset(
    dataset_id: &str,
    files: &[crate::model::FileDescriptor],
    host: &str,
    secret_key: &str,
    host_client: &HostClient,
    mount_map: &MountMap,
) -> Result<StagedInputs, StageError> {
    let mut located: Vec<PathBuf> = Vec::new();
    let mut missing: Vec<&crate::model::FileDescriptor> = Vec::new();

    for file in files {
        match file.filepath.as_deref().and_then(|fp| resolve_local(mount_map, fp)) {
            Some(local) => located.push(local),
            None => missing.push(file),
        }
    }

    let mut temp_files = Vec::new();
    let mut temp_dirs = Vec::new();

    if !missing.is_empty() && located.is_empty() {
        // No file in the dataset resolved locally: fetch the whole dataset
        // as one zip rather than downloading each file individually.
        let dir = new_temp_dir()?;
        let zip_path = dir.join(format!("{dataset_id}.zip"));
        host_client.download_dataset_zip(host, secret_key, dataset_id, &zip_path)?;
        temp_files.push(zip_path.clone());

        let extract_dir = dir.join("extracted");
        std::fs::create_dir_all(&extract_dir)?;
        extract_zip(&zip_path, &extract_dir)?;
        temp_dirs.push(extract_dir.clone());
        temp_dirs.push(dir);

        for file in &missing {
            located.push(extract_dir.join(&file.filename));
        }
    } else if !missing.is_empty() {
        // Some files already resolved locally: download only the ones that
        // didn't, one at a time, each paired with its metadata sidecar
        // (mirrors `_prepare_dataset`'s file-then-metadata append order).
        let dir = new_temp_dir()?;
        for file in &missing {
            let ext = file.file_ext.as_deref().unwrap_or("");
            let file_path = host::temp_file_path(&dir, &file.id, ext);
            host_client.download_file(host, secret_key, &file.id, &file_path)?;
            let metadata_path = host::temp_file_path(&dir, &file.id, ".metadata.json");
            host_client.download_file_metadata(host, secret_key, &file.id, &metadata_path)?;

            located.push(file_path.clone());
            located.push(metadata_path.clone());
            temp_files.push(file_path);
            temp_files.push(metadata_path);
        }
        temp_dirs.push(dir);
    }

    let metadata_dir = new_temp_dir()?;
    let metadata_path = metadata_dir.join(format!("{dataset_id}.metadata.json"));
    if let Ok(metadata) = host_client.dataset_metadata(host, secret_key, dataset_id) {
        std::fs::write(&metadata_path, serde_json::to_vec(&metadata)?)?;
        located.push(metadata_path.clone());
        temp_files.push(metadata_path);
    }
    temp_dirs.push(metadata_dir);

    Ok(StagedInputs { paths: located, temp_files, temp_dirs })
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), StageError> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(enclosed) = entry.enclosed_name().map(Path::to_path_buf) else {
            continue;
        };
        let out_path = dest.join(enclosed);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out_file)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_inputs_drop_removes_temp_files_and_dirs() {
        let dir = tempfile::Builder::new().tempdir().unwrap().into_path();
        let file = dir.join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let staged = StagedInputs {
            paths: vec![file.clone()],
            temp_files: vec![file.clone()],
            temp_dirs: vec![dir.clone()],
        };
        assert!(file.exists());
        drop(staged);
        assert!(!dir.exists());
    }

    #[test]
    fn staged_inputs_drop_tolerates_already_removed_paths() {
        let staged = StagedInputs {
            paths: vec![],
            temp_files: vec![PathBuf::from("/nonexistent/path/does-not-exist")],
            temp_dirs: vec![PathBuf::from("/nonexistent/dir/does-not-exist")],
        };
        drop(staged);
    }

    #[test]
    fn resolve_local_prefers_the_raw_filepath_when_it_exists_on_disk() {
        let dir = tempfile::Builder::new().tempdir().unwrap().into_path();
        let file = dir.join("a.csv");
        std::fs::write(&file, b"x").unwrap();

        // A mount map is configured but irrelevant here: the raw filepath
        // already resolves directly, so it wins without consulting the map.
        let mut mount_map = MountMap::new();
        mount_map.insert("/data/", "/nonexistent-mount-root/");
        assert_eq!(resolve_local(&mount_map, file.to_str().unwrap()), Some(file));
    }

    #[test]
    fn resolve_local_trusts_the_remapped_candidate_without_checking_existence() {
        let mut mount_map = MountMap::new();
        mount_map.insert("/data/", "/nonexistent-mount-root/");
        assert_eq!(resolve_local(&mount_map, "/data/a.csv"), Some(PathBuf::from("/nonexistent-mount-root/a.csv")));
    }

    #[test]
    fn resolve_local_returns_none_when_neither_resolves() {
        let mount_map = MountMap::new();
        assert_eq!(resolve_local(&mount_map, "/no/such/path/a.csv"), None);
    }

    #[test]
    fn local_staged_inputs_track_no_temp_paths_for_cleanup() {
        let staged = StagedInputs::local(vec![PathBuf::from("/already/on/disk.csv")]);
        assert_eq!(staged.paths.len(), 1);
        assert!(staged.temp_files.is_empty());
        assert!(staged.temp_dirs.is_empty());
    }
}
