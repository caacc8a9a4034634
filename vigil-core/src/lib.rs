pub mod colors;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod notify;
pub mod output;
pub mod probe;
pub mod retry;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, VigilError};
pub use validation::normalize_domain;

pub use config::{EngineConfig, HttpConfig, SchedulerConfig, TlsConfig, WhoisBackend, WhoisConfig};
pub use evaluator::{DomainEvaluator, DomainReport, Evaluation};
pub use model::{DomainRecord, Problem, ProblemKind, Scheme};
pub use notify::{Alert, ChannelNotifier, LogNotifier, Notifier};
pub use scheduler::{Scheduler, SchedulerState, SweepSummary};
pub use settings::{EffectivePolicy, UserSettings};
pub use store::{DomainStore, MemoryStore, SettingsStore, StoreSnapshot};

pub use output::{OutputFormat, OutputFormatter};
pub use retry::{is_transient, RetryExecutor, RetryPolicy};
