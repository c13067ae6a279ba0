//! Typed HTTP operations against the host (spec.md §6's "Host HTTP surface
//! consumed"), plus the generic verb wrappers extractor callback code uses
//! for anything outside the typed set (pyclowder's `Connector.get/post/put/delete`).
//!
//! Calls here block the calling thread; the connector always drives them
//! from the worker's `spawn_blocking` task (SPEC_FULL §5), never from the
//! broker poller.

use crate::error::HostError;
use crate::model::FileDescriptor;
use serde_json::Value;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Per-connector host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Whether to verify TLS certificates (pyclowder `ssl_verify`, default `true`).
    pub ssl_verify: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self { ssl_verify: true }
    }
}

/// Either a real HTTP connection to a host, or the single-shot local
/// transport's substitute for one: pyclowder's `LocalConnector` keeps the
/// same `Connector` interface but overrides `self.post` (and friends) to
/// write the extraction's output to disk instead of sending it anywhere.
enum Backend {
    Http(reqwest::blocking::Client),
    Local(PathBuf),
}

/// Typed HTTP client for the host's file/dataset/metadata/extractor API.
pub struct HostClient {
    backend: Backend,
}

impl HostClient {
    pub fn new(config: &HostConfig) -> Result<Self, HostError> {
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(!config.ssl_verify)
            .build()?;
        Ok(Self { backend: Backend::Http(client) })
    }

    /// Builds a client for the single-shot local transport: there is no host
    /// to register with, list datasets from, or download files from, but
    /// the same `process_message` callback still calls `post`/`put` to
    /// submit its results, which get written to `output_path` instead of
    /// sent over HTTP.
    pub fn new_local(output_path: PathBuf) -> Self {
        Self { backend: Backend::Local(output_path) }
    }

    fn http(&self) -> Result<&reqwest::blocking::Client, HostError> {
        match &self.backend {
            Backend::Http(client) => Ok(client),
            Backend::Local(_) => Err(HostError::Unsupported("no host to talk to in local transport mode")),
        }
    }

    fn check_status(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, HostError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(HostError::Status {
                status: resp.status().as_u16(),
                url: resp.url().to_string(),
            })
        }
    }

    /// `POST <host>api/extractors?key=<k>` (spec.md §6).
    pub fn register_extractor(&self, host: &str, secret_key: &str, info: &Value) -> Result<(), HostError> {
        let url = format!("{host}api/extractors?key={secret_key}");
        let resp = self.http()?.post(&url).json(info).send()?;
        Self::check_status(resp)?;
        Ok(())
    }

    /// `GET` dataset info.
    pub fn dataset_info(&self, host: &str, secret_key: &str, dataset_id: &str) -> Result<Value, HostError> {
        let url = format!("{host}api/datasets/{dataset_id}?key={secret_key}");
        let resp = Self::check_status(self.http()?.get(&url).send()?)?;
        Ok(resp.json()?)
    }

    /// `GET` dataset file list.
    pub fn dataset_file_list(
        &self,
        host: &str,
        secret_key: &str,
        dataset_id: &str,
    ) -> Result<Vec<FileDescriptor>, HostError> {
        let url = format!("{host}api/datasets/{dataset_id}/files?key={secret_key}");
        let resp = Self::check_status(self.http()?.get(&url).send()?)?;
        Ok(resp.json()?)
    }

    /// `GET` dataset metadata document.
    pub fn dataset_metadata(&self, host: &str, secret_key: &str, dataset_id: &str) -> Result<Value, HostError> {
        let url = format!("{host}api/datasets/{dataset_id}/metadata.jsonld?key={secret_key}");
        let resp = Self::check_status(self.http()?.get(&url).send()?)?;
        Ok(resp.json()?)
    }

    /// Downloads the dataset as a zip archive to a temp path, returning it.
    pub fn download_dataset_zip(
        &self,
        host: &str,
        secret_key: &str,
        dataset_id: &str,
        dest: &Path,
    ) -> Result<(), HostError> {
        let url = format!("{host}api/datasets/{dataset_id}/download?key={secret_key}");
        let mut resp = Self::check_status(self.http()?.get(&url).send()?)?;
        let mut file = std::fs::File::create(dest).map_err(|e| HostError::Status {
            status: 0,
            url: format!("{url} (local create failed: {e})"),
        })?;
        resp.copy_to(&mut file).map_err(HostError::Request)?;
        Ok(())
    }

    /// `GET` file info (includes `filepath` when the host can see a local mount).
    pub fn file_info(&self, host: &str, secret_key: &str, file_id: &str) -> Result<FileDescriptor, HostError> {
        let url = format!("{host}api/files/{file_id}/metadata?key={secret_key}");
        let resp = Self::check_status(self.http()?.get(&url).send()?)?;
        Ok(resp.json()?)
    }

    /// `GET` file bytes, writing them to `dest`.
    pub fn download_file(
        &self,
        host: &str,
        secret_key: &str,
        file_id: &str,
        dest: &Path,
    ) -> Result<(), HostError> {
        let url = format!("{host}api/files/{file_id}?key={secret_key}");
        let mut resp = Self::check_status(self.http()?.get(&url).send()?)?;
        let mut file = std::fs::File::create(dest).map_err(|e| HostError::Status {
            status: 0,
            url: format!("{url} (local create failed: {e})"),
        })?;
        resp.copy_to(&mut file).map_err(HostError::Request)?;
        Ok(())
    }

    /// `GET` file metadata document, writing it to `dest` as JSON.
    pub fn download_file_metadata(
        &self,
        host: &str,
        secret_key: &str,
        file_id: &str,
        dest: &Path,
    ) -> Result<(), HostError> {
        let url = format!("{host}api/files/{file_id}/technicalmetadatajson?key={secret_key}");
        let resp = Self::check_status(self.http()?.get(&url).send()?)?;
        let body: Value = resp.json()?;
        let mut file = std::fs::File::create(dest).map_err(|e| HostError::Status {
            status: 0,
            url: format!("{url} (local create failed: {e})"),
        })?;
        file.write_all(serde_json::to_string(&body)?.as_bytes())
            .map_err(|e| HostError::Status {
                status: 0,
                url: format!("{url} (local write failed: {e})"),
            })?;
        Ok(())
    }

    /// Generic GET wrapper, mirroring pyclowder's `Connector.get`.
    pub fn get(&self, url: &str, raise_status: bool) -> Result<reqwest::blocking::Response, HostError> {
        let resp = self.http()?.get(url).send()?;
        if raise_status {
            Self::check_status(resp)
        } else {
            Ok(resp)
        }
    }

    /// Generic POST wrapper, mirroring pyclowder's `Connector.post`. Under
    /// the local transport this writes `json` to the configured output path
    /// instead of sending it — the same substitution `LocalConnector` makes
    /// by overriding `self.post` while leaving callers untouched.
    pub fn post(&self, url: &str, json: &Value, raise_status: bool) -> Result<Value, HostError> {
        match &self.backend {
            Backend::Http(client) => {
                let resp = client.post(url).json(json).send()?;
                let resp = if raise_status { Self::check_status(resp)? } else { resp };
                Ok(resp.json().unwrap_or(Value::Null))
            }
            Backend::Local(output_path) => {
                self.write_local(output_path, json)?;
                Ok(json.clone())
            }
        }
    }

    /// Generic PUT wrapper, mirroring pyclowder's `Connector.put`. Behaves
    /// like `post` under the local transport.
    pub fn put(&self, url: &str, json: &Value, raise_status: bool) -> Result<Value, HostError> {
        match &self.backend {
            Backend::Http(client) => {
                let resp = client.put(url).json(json).send()?;
                let resp = if raise_status { Self::check_status(resp)? } else { resp };
                Ok(resp.json().unwrap_or(Value::Null))
            }
            Backend::Local(output_path) => {
                self.write_local(output_path, json)?;
                Ok(json.clone())
            }
        }
    }

    /// Generic DELETE wrapper, mirroring pyclowder's `Connector.delete`.
    pub fn delete(&self, url: &str, raise_status: bool) -> Result<reqwest::blocking::Response, HostError> {
        let resp = self.http()?.delete(url).send()?;
        if raise_status {
            Self::check_status(resp)
        } else {
            Ok(resp)
        }
    }

    fn write_local(&self, output_path: &Path, json: &Value) -> Result<(), HostError> {
        let pretty = serde_json::to_string_pretty(json)?;
        std::fs::write(output_path, pretty).map_err(|e| HostError::Status {
            status: 0,
            url: format!("{} (local write failed: {e})", output_path.display()),
        })
    }
}

/// Builds a filename-sized temp path in `dir` for a downloaded file.
pub(crate) fn temp_file_path(dir: &Path, file_id: &str, file_ext: &str) -> PathBuf {
    dir.join(format!("{file_id}{file_ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_config_defaults_to_verifying_tls() {
        assert!(HostConfig::default().ssl_verify);
    }

    #[test]
    fn temp_file_path_joins_id_and_ext() {
        let path = temp_file_path(Path::new("/tmp/x"), "abc123", ".csv");
        assert_eq!(path, PathBuf::from("/tmp/x/abc123.csv"));
    }

    #[test]
    fn local_backend_rejects_host_lookups() {
        let dir = tempfile::Builder::new().tempdir().unwrap().into_path();
        let client = HostClient::new_local(dir.join("out.json"));
        assert!(client.file_info("", "", "f1").is_err());
    }

    #[test]
    fn local_backend_post_writes_json_to_the_output_path() {
        let dir = tempfile::Builder::new().tempdir().unwrap().into_path();
        let output = dir.join("out.json");
        let client = HostClient::new_local(output.clone());

        client.post("", &serde_json::json!({"rows": 3}), true).unwrap();

        let contents = std::fs::read_to_string(&output).unwrap();
        assert!(contents.contains("\"rows\""));
    }
}
