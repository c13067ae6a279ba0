//! Single-shot local transport (spec.md §5), grounded on pyclowder's
//! `LocalConnector`: synthesizes a `FileResource` from a path on disk and
//! drives the exact same `process_message` callback the broker/batch
//! transports use, unmodified — only the `HostClient` behind it differs,
//! writing outgoing metadata to disk instead of sending it anywhere.

use crate::error::ConnectorError;
use crate::host::HostClient;
use crate::model::{FileResource, MessageBody, ParentRef, Resource, ResourceHeader};
use crate::processor::{OutcomeRecord, OutcomeSink, ProcessMessageFn};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Records status/outcome records for inspection by the embedder; the local
/// transport has nowhere else to send them.
#[derive(Default)]
struct LocalSink(Mutex<Vec<OutcomeRecord>>);

impl OutcomeSink for LocalSink {
    fn emit(&self, record: OutcomeRecord) {
        self.0.lock().expect("local sink lock poisoned").push(record);
    }
}

fn default_metadata_path(input_path: &Path) -> PathBuf {
    let mut path = input_path.to_path_buf();
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".json");
    path.set_file_name(name);
    path
}

/// Runs one extraction against a local file, with no host or broker in the
/// loop. `process` is the same `ProcessMessageFn` the broker/batch
/// transports call — an extractor written against one runs unmodified
/// against the other two.
pub struct LocalTransport {
    input_path: PathBuf,
    host_client: HostClient,
    process: Arc<ProcessMessageFn>,
    running: AtomicBool,
}

impl LocalTransport {
    pub fn new(input_path: PathBuf, output_path: Option<PathBuf>, process: Arc<ProcessMessageFn>) -> Self {
        let metadata_path = output_path.unwrap_or_else(|| default_metadata_path(&input_path));
        Self {
            input_path,
            host_client: HostClient::new_local(metadata_path),
            process,
            running: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl super::Transport for LocalTransport {
    async fn start(&self) -> Result<(), ConnectorError> {
        self.running.store(true, Ordering::SeqCst);
        let sink = LocalSink::default();

        let filename = self
            .input_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut resource = Resource::File(FileResource {
            header: ResourceHeader { id: filename.clone(), local_paths: vec![self.input_path.clone()] },
            intermediate_id: filename.clone(),
            name: filename,
            file_ext: self
                .input_path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
            parent: ParentRef { kind: "dataset".to_string(), id: String::new() },
        });

        // pyclowder's `LocalConnector` runs `process_message` with empty
        // host/secret_key/body — there is no host to address.
        let body = MessageBody::default();
        match (self.process)(&self.host_client, "", "", &mut resource, &body) {
            Ok(()) => sink.emit(OutcomeRecord::Ok),
            Err(kind) => {
                tracing::error!(error = %kind, "local extraction failed");
                sink.emit(OutcomeRecord::Error);
            }
        }

        for record in sink.0.into_inner().expect("local sink lock poisoned") {
            tracing::info!(?record, "local run outcome");
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn alive(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
