//! Worker framework bridging a data-management host and user-supplied
//! extraction logic: decodes broker/batch/local work items into typed
//! [`model::Resource`]s, stages their inputs, and drives `check_message`/
//! `process_message` callbacks with a bounded retry policy.

pub mod error;
pub mod host;
pub mod model;
pub mod processor;
pub mod registration;
pub mod resource;
pub mod stage;
pub mod transport;

pub use error::{BrokerError, ConnectorError, FailureKind, HostError, StageError};
pub use host::{HostClient, HostConfig};
pub use model::{ExtractorInfo, MessageBody, MountMap, ProcessDescriptor, Resource};
pub use processor::{CheckMessageFn, CheckResult, MessageProcessor, Outcome, OutcomeRecord, OutcomeSink, ProcessMessageFn, Status, StatusReport};
pub use registration::RegistrationSet;
pub use transport::Transport;
