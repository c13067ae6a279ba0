//! The per-message state machine (spec.md §4.4): registration, status
//! updates, check/process dispatch, error taxonomy, retry policy.

use crate::error::{FailureKind, StageError};
use crate::host::HostClient;
use crate::model::{ExtractorInfo, MessageBody, MountMap, Resource};
use crate::registration::RegistrationSet;
use crate::resource;
use crate::stage;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Result of `check_message` (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    Download,
    Bypass,
    Ignore,
}

/// Status enumeration (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Start,
    Processing,
    Done,
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Start => "START",
            Status::Processing => "PROCESSING",
            Status::Done => "DONE",
            Status::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Status-report JSON shape forwarded to the broker reply queue or appended
/// to a batch logfile (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub file_id: String,
    pub extractor_id: String,
    pub status: String,
    pub start: String,
}

impl StatusReport {
    pub fn new(resource_id: &str, extractor_id: &str, status: Status, message: &str) -> Self {
        Self {
            file_id: resource_id.to_string(),
            extractor_id: extractor_id.to_string(),
            status: format!("{status}: {message}"),
            start: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

/// One outbound record produced while processing a message. Transports
/// translate these into broker publishes, logfile lines, or local file
/// writes (spec.md §4.5).
#[derive(Debug, Clone)]
pub enum OutcomeRecord {
    Status(StatusReport),
    Ok,
    Error,
    Resubmit { retry_count: u32 },
}

/// Sink a transport hands the processor for outbound records. Broker,
/// batch, and local transports each implement this differently, per
/// DESIGN NOTES' capability-based substitution for transport polymorphism.
pub trait OutcomeSink: Send + Sync {
    fn emit(&self, record: OutcomeRecord);
}

/// Result of running the full per-message state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The message was dropped before entering processing (empty `host`);
    /// no outcome record was emitted.
    Dropped,
    /// The message reached a terminal outcome (`ok`, `error`, or `resubmit`).
    Completed,
    /// A fatal interrupt was caught; a `resubmit` was emitted and the
    /// caller must terminate the process after acking this delivery.
    Fatal,
}

pub type CheckMessageFn =
    dyn Fn(&HostClient, &str, &str, &Resource, &MessageBody) -> CheckResult + Send + Sync;
pub type ProcessMessageFn =
    dyn Fn(&HostClient, &str, &str, &mut Resource, &MessageBody) -> Result<(), FailureKind> + Send + Sync;

/// Maximum number of resubmits before a transient failure becomes terminal
/// (spec.md §6/§7: "capped at 10 retries").
pub const MAX_RETRIES: u32 = 10;

pub struct MessageProcessor {
    extractor_info: ExtractorInfo,
    registration: RegistrationSet,
    mount_map: MountMap,
    check_message: Option<Arc<CheckMessageFn>>,
    process_message: Arc<ProcessMessageFn>,
}

impl MessageProcessor {
    pub fn new(
        extractor_info: ExtractorInfo,
        registration: RegistrationSet,
        mount_map: MountMap,
        check_message: Option<Arc<CheckMessageFn>>,
        process_message: Arc<ProcessMessageFn>,
    ) -> Self {
        Self {
            extractor_info,
            registration,
            mount_map,
            check_message,
            process_message,
        }
    }

    pub fn extractor_info(&self) -> &ExtractorInfo {
        &self.extractor_info
    }

    /// Runs the full state machine for one message (spec.md §4.4).
    pub fn process(&self, body: MessageBody, host_client: &HostClient, sink: &dyn OutcomeSink) -> Outcome {
        if !body.has_host() {
            tracing::debug!("dropping message with empty host");
            return Outcome::Dropped;
        }

        let host = body.host_trailing_slash().expect("has_host checked above");
        let secret_key = body.secret_key.clone().unwrap_or_default();
        let retry_count = body.retry_count;

        self.maybe_register(&host, &secret_key, host_client);

        let Some(mut res) = resource::build(&body, &host, &secret_key, &self.extractor_info, host_client, sink) else {
            // ResourceBuilder already emitted the terminal outcome.
            return Outcome::Completed;
        };

        sink.emit(OutcomeRecord::Status(StatusReport::new(
            res.id(),
            &self.extractor_info.name,
            Status::Start,
            "Started processing",
        )));

        let check_result = match &self.check_message {
            Some(f) => f(host_client, &host, &secret_key, &res, &body),
            None => CheckResult::Download,
        };

        if check_result == CheckResult::Ignore {
            sink.emit(OutcomeRecord::Status(StatusReport::new(
                res.id(),
                &self.extractor_info.name,
                Status::Processing,
                "Skipped in check_message",
            )));
            sink.emit(OutcomeRecord::Ok);
            return Outcome::Completed;
        }

        let staged = if check_result == CheckResult::Download {
            match stage::stage(&res, &host, &secret_key, host_client, &self.mount_map) {
                Ok(staged) => Some(staged),
                Err(err) => return self.fail_staging(&res, err, sink),
            }
        } else {
            None
        };

        if let Some(staged) = &staged {
            res.set_local_paths(staged.paths.clone());
        }

        let result = (self.process_message)(host_client, &host, &secret_key, &mut res, &body);
        // `staged` drops here regardless of `result`, releasing every temp
        // file/dir it tracks (spec.md §4.3 cleanup contract).
        drop(staged);

        match result {
            Ok(()) => {
                sink.emit(OutcomeRecord::Status(StatusReport::new(
                    res.id(),
                    &self.extractor_info.name,
                    Status::Done,
                    "Done processing",
                )));
                sink.emit(OutcomeRecord::Ok);
                Outcome::Completed
            }
            Err(kind) => self.handle_failure(&res, retry_count, kind, sink),
        }
    }

    fn maybe_register(&self, host: &str, secret_key: &str, host_client: &HostClient) {
        let url = format!("{host}api/extractors");
        if self.registration.mark_if_absent(&url) {
            let info = serde_json::to_value(ExtractorInfoWire::from(&self.extractor_info)).unwrap_or(Value::Null);
            if let Err(err) = host_client.register_extractor(host, secret_key, &info) {
                tracing::warn!(error = %err, %url, "extractor registration failed");
            }
        }
    }

    fn fail_staging(&self, res: &Resource, err: StageError, sink: &dyn OutcomeSink) -> Outcome {
        let msg = format!("Error staging input: {err}");
        tracing::error!(resource_id = res.id(), error = %err, "staging failed");
        sink.emit(OutcomeRecord::Status(StatusReport::new(
            res.id(),
            &self.extractor_info.name,
            Status::Error,
            &msg,
        )));
        sink.emit(OutcomeRecord::Error);
        Outcome::Completed
    }

    fn handle_failure(&self, res: &Resource, retry_count: u32, kind: FailureKind, sink: &dyn OutcomeSink) -> Outcome {
        let msg = kind.to_string();
        tracing::error!(resource_id = res.id(), %msg, "process_message failed");
        sink.emit(OutcomeRecord::Status(StatusReport::new(
            res.id(),
            &self.extractor_info.name,
            Status::Error,
            &msg,
        )));

        match kind {
            FailureKind::FatalInterrupt(_) => {
                sink.emit(OutcomeRecord::Resubmit { retry_count });
                Outcome::Fatal
            }
            FailureKind::Transient(_) => {
                if retry_count < MAX_RETRIES {
                    sink.emit(OutcomeRecord::Resubmit { retry_count: retry_count + 1 });
                } else {
                    sink.emit(OutcomeRecord::Error);
                }
                Outcome::Completed
            }
            FailureKind::SubprocessFailure { .. } | FailureKind::Other(_) => {
                sink.emit(OutcomeRecord::Error);
                Outcome::Completed
            }
        }
    }
}

/// Wire shape for `ExtractorInfo` registration payloads; kept distinct from
/// the in-memory type so `process` (`ProcessDescriptor`) flattens the same
/// way the host expects.
#[derive(Serialize)]
struct ExtractorInfoWire<'a> {
    name: &'a str,
    process: &'a crate::model::ProcessDescriptor,
    #[serde(flatten)]
    extra: &'a serde_json::Map<String, Value>,
}

impl<'a> From<&'a ExtractorInfo> for ExtractorInfoWire<'a> {
    fn from(info: &'a ExtractorInfo) -> Self {
        Self {
            name: &info.name,
            process: &info.process,
            extra: &info.extra,
        }
    }
}
