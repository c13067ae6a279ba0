//! Decodes a broker/batch message body + routing key into a typed
//! [`Resource`], fetching auxiliary host state when the classified kind
//! requires it (spec.md §4.1).

use crate::host::HostClient;
use crate::model::{
    DatasetResource, ExtractorInfo, FileResource, MessageBody, MetadataResource, ParentRef, Resource,
    ResourceHeader,
};
use crate::processor::{OutcomeRecord, OutcomeSink, Status, StatusReport};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Dataset,
    File,
    Metadata,
}

/// Classification rules from spec.md §4.1, evaluated top-to-bottom.
fn classify(body: &MessageBody, extractor_name: &str, handles_dataset: bool) -> ResourceKind {
    let routing_key = body.routing_key.as_deref().unwrap_or("");

    if routing_key.contains(".dataset.") {
        return ResourceKind::Dataset;
    }
    if routing_key.contains(".file.") {
        return ResourceKind::File;
    }
    if routing_key.contains("metadata.added") {
        return ResourceKind::Metadata;
    }
    if routing_key == format!("extractors.{extractor_name}") {
        let dataset_id = body.dataset_id.as_deref().unwrap_or("");
        let id = body.id.as_deref().unwrap_or("");
        return if dataset_id == id { ResourceKind::Dataset } else { ResourceKind::File };
    }
    if routing_key.ends_with(extractor_name) {
        return if handles_dataset { ResourceKind::Dataset } else { ResourceKind::File };
    }
    ResourceKind::File
}

/// `os.path.splitext`-equivalent extension extraction: the extension
/// includes the leading dot, and a leading dot in the basename itself
/// (dotfiles) does not count as an extension.
fn file_ext_of(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match base.rfind('.') {
        Some(pos) if pos > 0 => base[pos..].to_string(),
        _ => String::new(),
    }
}

/// Builds a [`Resource`] from a decoded message body. Returns `None` when
/// the dataset-preprocess fetch fails; in that case an `error` status and
/// terminal outcome have already been emitted to `sink` (spec.md §4.1).
pub fn build(
    body: &MessageBody,
    host: &str,
    secret_key: &str,
    extractor: &ExtractorInfo,
    host_client: &HostClient,
    sink: &dyn OutcomeSink,
) -> Option<Resource> {
    let kind = classify(body, &extractor.name, extractor.process.handles_dataset());

    match kind {
        ResourceKind::Dataset => build_dataset(body, host, secret_key, extractor, host_client, sink),
        ResourceKind::File => Some(build_file(body)),
        ResourceKind::Metadata => Some(build_metadata(body)),
    }
}

fn build_dataset(
    body: &MessageBody,
    host: &str,
    secret_key: &str,
    extractor: &ExtractorInfo,
    host_client: &HostClient,
    sink: &dyn OutcomeSink,
) -> Option<Resource> {
    let dataset_id = body.dataset_id.clone().unwrap_or_default();
    let file_id = body.id.clone().unwrap_or_default();

    let info = host_client.dataset_info(host, secret_key, &dataset_id);
    let files = host_client.dataset_file_list(host, secret_key, &dataset_id);

    match (info, files) {
        (Ok(dataset_info), Ok(files)) => {
            let triggering_file = files.iter().find(|f| f.id == file_id).map(|f| f.filename.clone());
            let name = dataset_info
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(Resource::Dataset(DatasetResource {
                header: ResourceHeader { id: dataset_id, local_paths: vec![] },
                name,
                files,
                triggering_file,
                dataset_info,
            }))
        }
        (info, files) => {
            let msg = format!("[{dataset_id}] : Error downloading dataset preprocess information.");
            if let Err(e) = info {
                tracing::error!(%dataset_id, error = %e, "dataset info fetch failed");
            }
            if let Err(e) = files {
                tracing::error!(%dataset_id, error = %e, "dataset file list fetch failed");
            }
            sink.emit(OutcomeRecord::Status(StatusReport::new(
                &dataset_id,
                &extractor.name,
                Status::Error,
                &msg,
            )));
            sink.emit(OutcomeRecord::Error);
            None
        }
    }
}

fn build_file(body: &MessageBody) -> Resource {
    let id = body.id.clone().unwrap_or_default();
    let intermediate_id = body.intermediate_id.clone().unwrap_or_else(|| id.clone());
    let filename = body.filename.clone().unwrap_or_default();
    let file_ext = file_ext_of(&filename);
    let dataset_id = body.dataset_id.clone().unwrap_or_default();

    Resource::File(FileResource {
        header: ResourceHeader { id, local_paths: vec![] },
        intermediate_id,
        name: filename,
        file_ext,
        parent: ParentRef { kind: "dataset".to_string(), id: dataset_id },
    })
}

fn build_metadata(body: &MessageBody) -> Resource {
    let resource_id = body.resource_id.clone().unwrap_or_default();
    let resource_type = body.resource_type.clone().unwrap_or_default();
    let metadata = body.metadata.clone().unwrap_or(Value::Null);

    Resource::Metadata(MetadataResource {
        header: ResourceHeader { id: resource_id.clone(), local_paths: vec![] },
        parent: ParentRef { kind: resource_type, id: resource_id },
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessDescriptor;

    fn extractor(handles_dataset: bool) -> ExtractorInfo {
        ExtractorInfo {
            name: "myx".to_string(),
            process: ProcessDescriptor {
                dataset: if handles_dataset { Some("dataset".into()) } else { None },
                file: Some("file".into()),
                other: Default::default(),
            },
            extra: Default::default(),
        }
    }

    #[test]
    fn file_substring_beats_trailing_extractor_name_match() {
        // routing_key both contains ".file." and ends with the extractor
        // name -- rule 2 (.file.) must win over rule 5 (endswith name).
        let kind = classify(
            &MessageBody {
                routing_key: Some("x.file.myx".to_string()),
                ..Default::default()
            },
            "myx",
            true,
        );
        assert_eq!(kind, ResourceKind::File);
    }

    #[test]
    fn dataset_substring_takes_priority() {
        let kind = classify(
            &MessageBody {
                routing_key: Some("x.dataset.file.added".to_string()),
                ..Default::default()
            },
            "myx",
            false,
        );
        assert_eq!(kind, ResourceKind::Dataset);
    }

    #[test]
    fn metadata_added_routing_key_classifies_as_metadata() {
        let kind = classify(
            &MessageBody {
                routing_key: Some("x.metadata.added".to_string()),
                ..Default::default()
            },
            "myx",
            false,
        );
        assert_eq!(kind, ResourceKind::Metadata);
    }

    #[test]
    fn manual_submission_with_matching_ids_is_dataset() {
        let kind = classify(
            &MessageBody {
                routing_key: Some("extractors.myx".to_string()),
                id: Some("d1".to_string()),
                dataset_id: Some("d1".to_string()),
                ..Default::default()
            },
            "myx",
            false,
        );
        assert_eq!(kind, ResourceKind::Dataset);
    }

    #[test]
    fn manual_submission_with_different_ids_is_file() {
        let kind = classify(
            &MessageBody {
                routing_key: Some("extractors.myx".to_string()),
                id: Some("f1".to_string()),
                dataset_id: Some("d1".to_string()),
                ..Default::default()
            },
            "myx",
            false,
        );
        assert_eq!(kind, ResourceKind::File);
    }

    #[test]
    fn redelivery_from_side_queue_consults_process_descriptor() {
        let kind = classify(
            &MessageBody {
                routing_key: Some("error.myx".to_string()),
                ..Default::default()
            },
            "myx",
            true,
        );
        assert_eq!(kind, ResourceKind::Dataset);

        let kind = classify(
            &MessageBody {
                routing_key: Some("error.myx".to_string()),
                ..Default::default()
            },
            "myx",
            false,
        );
        assert_eq!(kind, ResourceKind::File);
    }

    #[test]
    fn unmatched_routing_key_defaults_to_file() {
        let kind = classify(
            &MessageBody {
                routing_key: Some("something.else".to_string()),
                ..Default::default()
            },
            "myx",
            true,
        );
        assert_eq!(kind, ResourceKind::File);
    }

    #[test]
    fn file_extension_extraction_matches_splitext_semantics() {
        assert_eq!(file_ext_of("a.tar.gz"), ".gz");
        assert_eq!(file_ext_of("no_extension"), "");
        assert_eq!(file_ext_of(".bashrc"), "");
        assert_eq!(file_ext_of("archive.ZIP"), ".ZIP");
    }

    #[test]
    fn build_file_resource_derives_fields_from_body() {
        let body = MessageBody {
            id: Some("f1".to_string()),
            dataset_id: Some("d1".to_string()),
            filename: Some("report.csv".to_string()),
            routing_key: Some("x.file.added".to_string()),
            ..Default::default()
        };
        let res = build_file(&body);
        match res {
            Resource::File(f) => {
                assert_eq!(f.header.id, "f1");
                assert_eq!(f.intermediate_id, "f1");
                assert_eq!(f.file_ext, ".csv");
                assert_eq!(f.parent.id, "d1");
            }
            _ => panic!("expected a file resource"),
        }
    }

    #[test]
    fn build_file_resource_honors_distinct_intermediate_id() {
        let body = MessageBody {
            id: Some("f1".to_string()),
            intermediate_id: Some("f0-prior-version".to_string()),
            filename: Some("report.csv".to_string()),
            ..Default::default()
        };
        let res = build_file(&body);
        match res {
            Resource::File(f) => assert_eq!(f.intermediate_id, "f0-prior-version"),
            _ => panic!("expected a file resource"),
        }
    }

    #[test]
    fn build_metadata_resource_copies_fields_verbatim() {
        let body = MessageBody {
            resource_type: Some("file".to_string()),
            resource_id: Some("f1".to_string()),
            metadata: Some(serde_json::json!({"k": "v"})),
            ..Default::default()
        };
        let res = build_metadata(&body);
        match res {
            Resource::Metadata(m) => {
                assert_eq!(m.header.id, "f1");
                assert_eq!(m.parent.kind, "file");
                assert_eq!(m.metadata, serde_json::json!({"k": "v"}));
            }
            _ => panic!("expected a metadata resource"),
        }
    }

    #[test]
    fn extractor_without_dataset_tag_ignores_redelivery_kind_hint() {
        let info = extractor(false);
        assert!(!info.process.handles_dataset());
    }
}
