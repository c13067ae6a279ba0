//! Batch transport (spec.md §5): processes a fixed list of already-decoded
//! messages inline, one after another, appending each status/outcome line
//! to the message's own logfile instead of publishing to a broker.
//!
//! Grounded on pyclowder's `HPCConnector`, which reads a pickled batch of
//! messages and writes status lines to a per-message logfile rather than
//! replying over AMQP.

use crate::error::ConnectorError;
use crate::host::HostClient;
use crate::model::MessageBody;
use crate::processor::{MessageProcessor, OutcomeRecord, OutcomeSink};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Appends each emitted record as a JSON line to the active message's
/// `logfile`, matching the source's line-oriented status log.
struct LogfileSink {
    logfile: Option<PathBuf>,
}

impl OutcomeSink for LogfileSink {
    fn emit(&self, record: OutcomeRecord) {
        let Some(path) = &self.logfile else {
            tracing::warn!("batch message has no logfile; dropping outcome record");
            return;
        };
        let line = match &record {
            OutcomeRecord::Status(report) => serde_json::to_string(report),
            OutcomeRecord::Ok => serde_json::to_string(&serde_json::json!({"status": "ok"})),
            OutcomeRecord::Error => serde_json::to_string(&serde_json::json!({"status": "error"})),
            OutcomeRecord::Resubmit { retry_count } => {
                serde_json::to_string(&serde_json::json!({"status": "resubmit", "retry_count": retry_count}))
            }
        };
        let Ok(line) = line else { return };

        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(mut file) => {
                if let Err(err) = writeln!(file, "{line}") {
                    tracing::error!(path = %path.display(), error = %err, "failed to append to batch logfile");
                }
            }
            Err(err) => tracing::error!(path = %path.display(), error = %err, "failed to open batch logfile"),
        }
    }
}

pub struct BatchTransport {
    messages: Mutex<Vec<MessageBody>>,
    processor: MessageProcessor,
    host_client: HostClient,
    running: AtomicBool,
}

impl BatchTransport {
    pub fn new(messages: Vec<MessageBody>, processor: MessageProcessor, host_client: HostClient) -> Self {
        Self {
            messages: Mutex::new(messages),
            processor,
            host_client,
            running: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl super::Transport for BatchTransport {
    async fn start(&self) -> Result<(), ConnectorError> {
        let messages = std::mem::take(&mut *self.messages.lock().expect("batch message list lock poisoned"));
        self.running.store(true, Ordering::SeqCst);

        for body in messages {
            if !self.alive() {
                break;
            }
            let logfile = body.logfile.clone().map(PathBuf::from);
            let sink = LogfileSink { logfile };
            // Errors in one message's processing never abort the batch; the
            // source continues to the next pickled message on failure too.
            self.processor.process(body, &self.host_client, &sink);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtractorInfo, MountMap, ProcessDescriptor};
    use crate::registration::RegistrationSet;
    use std::sync::Arc;

    fn processor() -> MessageProcessor {
        MessageProcessor::new(
            ExtractorInfo { name: "myx".to_string(), process: ProcessDescriptor::default(), extra: Default::default() },
            RegistrationSet::new(),
            MountMap::new(),
            Some(Arc::new(|_, _, _, _, _| crate::processor::CheckResult::Bypass)),
            Arc::new(|_, _, _, _, _| Ok(())),
        )
    }

    #[tokio::test]
    async fn batch_writes_status_lines_to_each_messages_own_logfile() {
        use crate::transport::Transport;

        let dir = tempfile::Builder::new().tempdir().unwrap().into_path();
        let logfile = dir.join("msg1.log");

        let body = MessageBody {
            id: Some("f1".into()),
            host: Some("http://h/".into()),
            logfile: Some(logfile.to_string_lossy().to_string()),
            ..Default::default()
        };
        let transport = BatchTransport::new(
            vec![body],
            processor(),
            HostClient::new(&crate::host::HostConfig::default()).unwrap(),
        );
        transport.start().await.unwrap();

        let contents = std::fs::read_to_string(&logfile).unwrap();
        assert!(contents.contains("\"status\":\"ok\""));
        assert!(!transport.alive());
    }

    #[tokio::test]
    async fn batch_continues_past_messages_with_no_logfile() {
        use crate::transport::Transport;

        let body = MessageBody {
            id: Some("f1".into()),
            host: Some("http://h/".into()),
            ..Default::default()
        };
        let transport = BatchTransport::new(
            vec![body],
            processor(),
            HostClient::new(&crate::host::HostConfig::default()).unwrap(),
        );
        assert!(transport.start().await.is_ok());
    }
}
