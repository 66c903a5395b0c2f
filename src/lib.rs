pub mod types;
pub mod error;
pub mod languages;
pub mod config;
pub mod scanner;
pub mod prompts;
pub mod backend;
pub mod client;
pub mod analyzer;
pub mod refactorer;
pub mod report;
pub mod resolve;
pub mod pipeline;
pub mod progress;
pub mod server;
pub mod cli;
pub mod cli_types;
pub mod ui;

// Re-export commonly used types
pub use types::*;
pub use error::{BackendError, RecastError, RequestError, Result};
pub use config::{CliOverrides, FileSettings, RunConfig};
pub use scanner::{RepositoryScanner, ScanConfig, ScanResult};
pub use prompts::{PromptKind, PromptRequest};
pub use backend::{GeminiBackend, InferenceBackend, ModelInfo};
pub use client::{backoff_delay, RateLimitedClient, RetryPolicy};
pub use analyzer::Analyzer;
pub use refactorer::Refactorer;
pub use report::ReportAggregator;
pub use pipeline::{Orchestrator, Phase, RunSummary};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use cli::CliApp;
pub use ui::UIManager;
