//! Shared, pollable view of a running job. The orchestrator writes to it and
//! the web server reads snapshots for the status endpoint.

use chrono::Local;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::pipeline::{Phase, RunSummary};

/// Log lines kept in a snapshot; older ones are dropped first.
pub const MAX_LOG_ENTRIES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub message: String,
    pub level: LogLevel,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub active: bool,
    pub status: JobStatus,
    pub phase: String,
    /// Percentage of per-file work done, 100 once the job completes.
    pub progress: u8,
    pub files_total: usize,
    pub files_analyzed: usize,
    pub files_refactored: usize,
    pub current_file: String,
    pub source: String,
    pub output_dir: Option<String>,
    pub logs: Vec<LogEntry>,
    pub error: Option<String>,
    pub recommendations: Option<String>,
    pub interview_questions: Option<String>,
    pub summary: Option<SummaryView>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryView {
    pub collected: usize,
    pub analyzed: usize,
    pub analysis_failed: usize,
    pub refactored: usize,
    pub copied: usize,
    pub fallbacks: usize,
    pub refactor_failed: usize,
    pub requests_sent: u64,
}

impl From<&RunSummary> for SummaryView {
    fn from(summary: &RunSummary) -> Self {
        Self {
            collected: summary.collected,
            analyzed: summary.analyzed,
            analysis_failed: summary.analysis_failed,
            refactored: summary.refactored,
            copied: summary.copied,
            fallbacks: summary.fallbacks,
            refactor_failed: summary.refactor_failed,
            requests_sent: summary.requests_sent,
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    snapshot: ProgressSnapshot,
    /// Per-file steps expected: files times enabled file phases.
    steps_total: usize,
    steps_done: usize,
}

impl TrackerState {
    fn push_log(&mut self, level: LogLevel, message: String) {
        if self.snapshot.logs.len() >= MAX_LOG_ENTRIES {
            self.snapshot.logs.remove(0);
        }
        self.snapshot.logs.push(LogEntry {
            message,
            level,
            timestamp: Local::now().format("%H:%M:%S").to_string(),
        });
    }

    fn step(&mut self) {
        self.steps_done += 1;
        if self.steps_total > 0 {
            let percent = (self.steps_done * 100 / self.steps_total).min(99);
            self.snapshot.progress = percent as u8;
        }
    }
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: RwLock<TrackerState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        self.state.read().await.snapshot.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.state.read().await.snapshot.active
    }

    /// Reset and mark a new job as running. False when a job is already active.
    pub async fn try_begin(&self, source: &str, output_dir: &str) -> bool {
        let mut state = self.state.write().await;
        if state.snapshot.active {
            return false;
        }
        *state = TrackerState::default();
        state.snapshot.active = true;
        state.snapshot.status = JobStatus::Running;
        state.snapshot.source = source.to_string();
        state.snapshot.output_dir = Some(output_dir.to_string());
        state.push_log(LogLevel::Info, format!("Starting processing of {}", source));
        true
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.state.write().await.push_log(level, message.into());
    }

    pub async fn set_phase(&self, phase: Phase) {
        self.state.write().await.snapshot.phase = phase.to_string();
    }

    pub async fn set_files(&self, files: usize, file_phases: usize) {
        let mut state = self.state.write().await;
        state.snapshot.files_total = files;
        state.steps_total = files * file_phases;
    }

    pub async fn file_started(&self, path: &str) {
        self.state.write().await.snapshot.current_file = path.to_string();
    }

    pub async fn file_analyzed(&self) {
        let mut state = self.state.write().await;
        state.snapshot.files_analyzed += 1;
        state.step();
    }

    pub async fn file_refactored(&self) {
        let mut state = self.state.write().await;
        state.snapshot.files_refactored += 1;
        state.step();
    }

    /// A per-file step that produced no result still advances the percentage.
    pub async fn file_skipped(&self) {
        self.state.write().await.step();
    }

    pub async fn finish(
        &self,
        summary: &RunSummary,
        recommendations: Option<String>,
        interview_questions: Option<String>,
    ) {
        let mut state = self.state.write().await;
        state.snapshot.active = false;
        state.snapshot.status = JobStatus::Completed;
        state.snapshot.progress = 100;
        state.snapshot.current_file.clear();
        state.snapshot.output_dir = Some(summary.output_dir.display().to_string());
        state.snapshot.summary = Some(SummaryView::from(summary));
        state.snapshot.recommendations = recommendations;
        state.snapshot.interview_questions = interview_questions;
        state.push_log(LogLevel::Success, "Processing complete".to_string());
    }

    pub async fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        let mut state = self.state.write().await;
        state.snapshot.active = false;
        state.snapshot.status = JobStatus::Error;
        state.push_log(LogLevel::Error, error.clone());
        state.snapshot.error = Some(error);
    }
}
