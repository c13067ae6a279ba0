//! Core data types shared across the connector: extractor metadata, the
//! message envelope decoded off a transport, and the typed resources that
//! get built from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Static metadata describing the extractor, registered with the host once
/// per process. Immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorInfo {
    /// Unique extractor name; also the broker queue name.
    pub name: String,

    /// Which resource kinds this extractor handles, e.g. `{"dataset": "...", "file": "..."}`.
    pub process: ProcessDescriptor,

    /// Arbitrary additional fields the host stores verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Resource kinds an extractor declares it handles. At minimum carries the
/// `dataset` and `file` tags; values are host-defined free text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    pub dataset: Option<String>,
    pub file: Option<String>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, Value>,
}

impl ProcessDescriptor {
    /// Whether this extractor declares itself a dataset handler (spec.md §4.1 rule 5).
    pub fn handles_dataset(&self) -> bool {
        self.dataset.is_some()
    }
}

/// Parent reference attached to file and metadata resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

/// A file descriptor as returned by the host's dataset file list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub file_ext: Option<String>,
    #[serde(default)]
    pub filepath: Option<String>,
}

/// Decoded broker/batch payload. All fields are optional except where the
/// protocol requires them for classification or processing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "intermediateId", default)]
    pub intermediate_id: Option<String>,
    #[serde(rename = "datasetId", default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(rename = "secretKey", default)]
    pub secret_key: Option<String>,
    #[serde(rename = "fileSize", default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub flags: Option<Value>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub routing_key: Option<String>,
    #[serde(rename = "resourceType", default)]
    pub resource_type: Option<String>,
    #[serde(rename = "resourceId", default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Present on batch-transport bodies: path to the per-message logfile.
    #[serde(default)]
    pub logfile: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
}

impl MessageBody {
    /// `true` if `host` is present and non-empty; per spec.md §3 a resource
    /// with an empty host is silently dropped without side effects.
    pub fn has_host(&self) -> bool {
        matches!(&self.host, Some(h) if !h.is_empty())
    }

    /// Host URL normalized to always end with `/`, matching pyclowder's
    /// `if not host.endswith('/'): host += '/'`.
    pub fn host_trailing_slash(&self) -> Option<String> {
        self.host.as_ref().filter(|h| !h.is_empty()).map(|h| {
            if h.ends_with('/') {
                h.clone()
            } else {
                format!("{h}/")
            }
        })
    }
}

/// Common header shared by every resource shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceHeader {
    pub id: String,
    /// Local filesystem paths staged for the extractor; populated by the
    /// `InputStager` before `process_message` runs.
    #[serde(default)]
    pub local_paths: Vec<PathBuf>,
}

/// The unit of work passed to extractor callbacks.
#[derive(Debug, Clone)]
pub enum Resource {
    File(FileResource),
    Dataset(DatasetResource),
    Metadata(MetadataResource),
}

impl Resource {
    pub fn header(&self) -> &ResourceHeader {
        match self {
            Resource::File(r) => &r.header,
            Resource::Dataset(r) => &r.header,
            Resource::Metadata(r) => &r.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut ResourceHeader {
        match self {
            Resource::File(r) => &mut r.header,
            Resource::Dataset(r) => &mut r.header,
            Resource::Metadata(r) => &mut r.header,
        }
    }

    pub fn id(&self) -> &str {
        &self.header().id
    }

    pub fn set_local_paths(&mut self, paths: Vec<PathBuf>) {
        self.header_mut().local_paths = paths;
    }
}

#[derive(Debug, Clone)]
pub struct FileResource {
    pub header: ResourceHeader,
    pub intermediate_id: String,
    pub name: String,
    pub file_ext: String,
    pub parent: ParentRef,
}

#[derive(Debug, Clone)]
pub struct DatasetResource {
    pub header: ResourceHeader,
    pub name: String,
    pub files: Vec<FileDescriptor>,
    pub triggering_file: Option<String>,
    pub dataset_info: Value,
}

#[derive(Debug, Clone)]
pub struct MetadataResource {
    pub header: ResourceHeader,
    pub parent: ParentRef,
    pub metadata: Value,
}

/// Operator-configured prefix rewrite turning a host-visible path into a
/// locally accessible one. Iteration order matches insertion order since
/// pyclowder checks `mounted_paths` in dict order; callers should insert
/// more specific prefixes first if overlap matters.
#[derive(Debug, Clone, Default)]
pub struct MountMap {
    entries: Vec<(String, String)>,
}

impl MountMap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn insert(&mut self, source_prefix: impl Into<String>, local_prefix: impl Into<String>) {
        self.entries.push((source_prefix.into(), local_prefix.into()));
    }

    /// Resolves `filepath` against the first matching source prefix (spec.md §4.2).
    pub fn resolve(&self, filepath: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|(src, _)| filepath.starts_with(src.as_str()))
            .map(|(src, dst)| format!("{dst}{}", &filepath[src.len()..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_host_is_dropped() {
        let body = MessageBody {
            host: Some(String::new()),
            ..Default::default()
        };
        assert!(!body.has_host());
    }

    #[test]
    fn missing_host_is_dropped() {
        assert!(!MessageBody::default().has_host());
    }

    #[test]
    fn host_gets_trailing_slash() {
        let body = MessageBody {
            host: Some("http://h".to_string()),
            ..Default::default()
        };
        assert_eq!(body.host_trailing_slash().as_deref(), Some("http://h/"));
    }

    #[test]
    fn mount_map_resolves_first_match() {
        let mut map = MountMap::new();
        map.insert("/data/", "/mnt/data/");
        assert_eq!(
            map.resolve("/data/a/b.csv").as_deref(),
            Some("/mnt/data/a/b.csv")
        );
        assert_eq!(map.resolve("/other/x"), None);
    }
}
