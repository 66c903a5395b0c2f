use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::analyzer::Analyzer;
use crate::backend::{GeminiBackend, InferenceBackend};
use crate::client::{RateLimitedClient, RetryPolicy};
use crate::config::RunConfig;
use crate::error::{RecastError, Result};
use crate::progress::{LogLevel, ProgressTracker};
use crate::refactorer::{Refactorer, REFACTORED_DIR};
use crate::report::{ReportAggregator, ReportDocument, ReportKind, ReportStatus};
use crate::resolve::{resolve_source, ResolvedSource};
use crate::scanner::{RepositoryScanner, ScanConfig};
use crate::types::{AnalysisResult, FileDescriptor, RefactorOutcome, RefactorResult};
use crate::ui::UIManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Resolve,
    Collect,
    Analyze,
    Refactor,
    Aggregate,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Resolve => "resolve",
            Phase::Collect => "collect",
            Phase::Analyze => "analyze",
            Phase::Refactor => "refactor",
            Phase::Aggregate => "aggregate",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub source: String,
    pub output_dir: PathBuf,
    pub collected: usize,
    pub analyzed: usize,
    pub analysis_failed: usize,
    pub refactored: usize,
    pub copied: usize,
    pub fallbacks: usize,
    pub refactor_failed: usize,
    pub reports: usize,
    pub partial_reports: usize,
    pub requests_sent: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.analysis_failed + self.fallbacks + self.refactor_failed + self.partial_reports > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Source:            {}", self.source)?;
        writeln!(f, "Output:            {}", self.output_dir.display())?;
        writeln!(f, "Files collected:   {}", self.collected)?;
        writeln!(
            f,
            "Analysis:          {} succeeded, {} failed",
            self.analyzed, self.analysis_failed
        )?;
        writeln!(
            f,
            "Refactoring:       {} rewritten, {} copied, {} fell back, {} failed",
            self.refactored, self.copied, self.fallbacks, self.refactor_failed
        )?;
        writeln!(
            f,
            "Reports:           {} written ({} partial)",
            self.reports, self.partial_reports
        )?;
        writeln!(f, "Requests sent:     {}", self.requests_sent)?;
        write!(f, "Elapsed:           {:.1}s", self.elapsed.as_secs_f64())
    }
}

/// Drives one run through its phases. Each call to [`advance`](Self::advance)
/// executes exactly one phase.
pub struct Orchestrator {
    config: RunConfig,
    source: String,
    phase: Phase,
    client: Arc<RateLimitedClient>,
    ui: UIManager,
    resolved: Option<ResolvedSource>,
    output_dir: PathBuf,
    files: Vec<FileDescriptor>,
    analyses: Vec<AnalysisResult>,
    refactors: Vec<RefactorResult>,
    reports: Vec<ReportDocument>,
    summary: RunSummary,
    started: Option<Instant>,
    progress: Option<Arc<ProgressTracker>>,
}

impl Orchestrator {
    pub fn new(config: RunConfig, source: impl Into<String>, ui: UIManager) -> Result<Self> {
        let backend = GeminiBackend::new(&config)?;
        Self::with_backend(config, source, Box::new(backend), ui)
    }

    pub fn with_backend(
        config: RunConfig,
        source: impl Into<String>,
        backend: Box<dyn InferenceBackend>,
        ui: UIManager,
    ) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(RateLimitedClient::new(backend, RetryPolicy::from_config(&config)));
        let source = source.into();
        let output_dir = config.output_dir.clone();

        Ok(Self {
            summary: RunSummary {
                source: source.clone(),
                output_dir: output_dir.clone(),
                ..RunSummary::default()
            },
            config,
            source,
            phase: Phase::Init,
            client,
            ui,
            resolved: None,
            output_dir,
            files: Vec::new(),
            analyses: Vec::new(),
            refactors: Vec::new(),
            reports: Vec::new(),
            started: None,
            progress: None,
        })
    }

    /// Publish phase and per-file progress to a shared tracker.
    pub fn with_progress(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.progress = Some(tracker);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    pub fn analyses(&self) -> &[AnalysisResult] {
        &self.analyses
    }

    pub fn refactor_results(&self) -> &[RefactorResult] {
        &self.refactors
    }

    pub fn reports(&self) -> &[ReportDocument] {
        &self.reports
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Output directory; absolute once the resolve phase has prepared it.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn source_root(&self) -> Option<&Path> {
        self.resolved.as_ref().map(ResolvedSource::root)
    }

    /// Run the current phase and move to the next one. Only resolution,
    /// collection and output preparation failures are returned as errors.
    pub async fn advance(&mut self) -> Result<Phase> {
        let next = match self.phase {
            Phase::Init => {
                self.started = Some(Instant::now());
                info!(source = %self.source, model = %self.config.model, "Starting run");
                Phase::Resolve
            }
            Phase::Resolve => {
                self.resolve().await?;
                Phase::Collect
            }
            Phase::Collect => {
                self.collect().await?;
                self.after_collect()
            }
            Phase::Analyze => {
                self.analyze().await;
                if self.config.skip_refactoring {
                    Phase::Aggregate
                } else {
                    Phase::Refactor
                }
            }
            Phase::Refactor => {
                self.refactor().await;
                Phase::Aggregate
            }
            Phase::Aggregate => {
                self.aggregate().await;
                self.finish();
                Phase::Done
            }
            Phase::Done => Phase::Done,
        };

        if next != self.phase {
            info!(from = %self.phase, to = %next, "Phase transition");
            if let Some(tracker) = &self.progress {
                tracker.set_phase(next).await;
            }
        }
        self.phase = next;
        Ok(next)
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        while self.phase != Phase::Done {
            self.advance().await?;
        }
        Ok(self.summary.clone())
    }

    fn after_collect(&self) -> Phase {
        if !self.config.skip_analysis {
            Phase::Analyze
        } else if !self.config.skip_refactoring {
            Phase::Refactor
        } else {
            Phase::Aggregate
        }
    }

    async fn resolve(&mut self) -> Result<()> {
        self.ui.print_header("Resolving Source");

        // Clone or locate the source
        let resolved = resolve_source(&self.source, self.config.clone_timeout).await?;
        if resolved.is_clone() {
            self.ui.print_success(&format!("Cloned {}", self.source));
            self.track_log(LogLevel::Success, format!("Cloned {}", self.source)).await;
        }
        self.ui.print_info(&format!("Source directory: {}", resolved.root().display()));

        // Refuse output locations whose cleanup would delete source files
        check_output_location(resolved.root(), &self.config.output_dir)?;
        self.resolved = Some(resolved);

        // Clear outputs of a previous run
        self.output_dir = prepare_output_dir(&self.config.output_dir).await?;
        self.summary.output_dir = self.output_dir.clone();
        self.ui.print_info(&format!("Output directory: {}", self.output_dir.display()));
        Ok(())
    }

    async fn collect(&mut self) -> Result<()> {
        let root = match &self.resolved {
            Some(resolved) => resolved.root().to_path_buf(),
            None => return Err(RecastError::resolution(&self.source, "source was not resolved")),
        };

        self.ui.print_header("Collecting Files");

        // Exclude our own output from the walk
        let scan_config = ScanConfig {
            exclude_paths: vec![self.output_dir.clone()],
            ..ScanConfig::default()
        };
        let scanner = RepositoryScanner::from_run_config(&self.config, Some(scan_config))?;
        let result = scanner.scan(&root)?;

        // Report what was found
        if result.errors > 0 {
            self.ui
                .print_warning(&format!("{} files could not be read and were skipped", result.errors));
        }
        self.ui.print_success(&format!(
            "Found {} supported files ({} bytes) in {:?}",
            result.files.len(),
            result.total_bytes(),
            result.duration
        ));

        self.summary.collected = result.files.len();
        self.files = result.files;

        if let Some(tracker) = &self.progress {
            let file_phases =
                usize::from(!self.config.skip_analysis) + usize::from(!self.config.skip_refactoring);
            tracker.set_files(self.files.len(), file_phases).await;
            tracker
                .log(LogLevel::Info, format!("Found {} supported files", self.files.len()))
                .await;
        }
        Ok(())
    }

    async fn analyze(&mut self) {
        self.ui.print_header("Analyzing Files");
        let analyzer = Analyzer::new(Arc::clone(&self.client), &self.config);
        let progress = self.ui.create_phase_progress("Analyzing", self.files.len() as u64);
        let tracker = self.progress.clone();

        for file in &self.files {
            let path = file.display_path();
            progress.set_current_file(&path);
            if let Some(tracker) = &tracker {
                tracker.file_started(&path).await;
            }
            match analyzer.analyze(file).await {
                Ok(result) => {
                    debug!(issues = result.issues.len(), "Analyzed {}", path);
                    self.analyses.push(result);
                    self.summary.analyzed += 1;
                    if let Some(tracker) = &tracker {
                        tracker.file_analyzed().await;
                    }
                }
                Err(err) => {
                    warn!("Analysis failed for {}: {}", path, err);
                    self.summary.analysis_failed += 1;
                    if let Some(tracker) = &tracker {
                        tracker
                            .log(LogLevel::Warning, format!("Analysis failed for {}: {}", path, err))
                            .await;
                        tracker.file_skipped().await;
                    }
                }
            }
            progress.inc();
        }

        progress.finish_with_message(&format!(
            "{} analyzed, {} failed",
            self.summary.analyzed, self.summary.analysis_failed
        ));
    }

    async fn refactor(&mut self) {
        self.ui.print_header("Refactoring Files");

        // Initialize components
        let refactor_root = self.output_dir.join(REFACTORED_DIR);
        let refactorer = Refactorer::new(Arc::clone(&self.client), &self.config, &refactor_root);
        let progress = self.ui.create_phase_progress("Refactoring", self.files.len() as u64);
        let tracker = self.progress.clone();

        // Rewrite or copy each file into the mirrored tree
        for file in &self.files {
            let path = file.display_path();
            progress.set_current_file(&path);
            if let Some(tracker) = &tracker {
                tracker.file_started(&path).await;
            }
            match refactorer.refactor(file).await {
                Ok(result) => {
                    match result.outcome {
                        RefactorOutcome::Refactored => self.summary.refactored += 1,
                        RefactorOutcome::CopiedOversized | RefactorOutcome::CopiedEmpty => {
                            self.summary.copied += 1
                        }
                        RefactorOutcome::Fallback(_) => self.summary.fallbacks += 1,
                    }
                    if let (Some(tracker), RefactorOutcome::Fallback(reason)) = (&tracker, &result.outcome) {
                        tracker
                            .log(LogLevel::Warning, format!("Copied {} unchanged: {}", path, reason))
                            .await;
                    }
                    self.refactors.push(result);
                    if let Some(tracker) = &tracker {
                        tracker.file_refactored().await;
                    }
                }
                Err(err) => {
                    warn!("Could not write refactored output for {}: {}", path, err);
                    self.summary.refactor_failed += 1;
                    if let Some(tracker) = &tracker {
                        tracker
                            .log(LogLevel::Error, format!("Could not write {}: {}", path, err))
                            .await;
                        tracker.file_skipped().await;
                    }
                }
            }
            progress.inc();
        }

        // Summarize the phase
        progress.finish_with_message(&format!(
            "{} rewritten, {} copied, {} fell back",
            self.summary.refactored, self.summary.copied, self.summary.fallbacks
        ));
        if refactor_root.is_dir() {
            self.ui.print_header("Refactored Tree");
            self.ui.print_directory_tree(&refactor_root);
        }
    }

    async fn aggregate(&mut self) {
        self.ui.print_header("Generating Reports");
        let aggregator = ReportAggregator::new(Arc::clone(&self.client), &self.config, &self.output_dir);

        match aggregator.aggregate(&self.analyses, &self.refactors).await {
            Ok(documents) => {
                for document in &documents {
                    match &document.status {
                        ReportStatus::Partial(reason) => self.ui.print_warning(&format!(
                            "{} written with partial results: {}",
                            document.kind.title(),
                            reason
                        )),
                        _ => self
                            .ui
                            .print_success(&format!("Wrote {}", document.path.display())),
                    }
                }
                self.summary.reports = documents.len();
                self.summary.partial_reports = documents
                    .iter()
                    .filter(|d| matches!(d.status, ReportStatus::Partial(_)))
                    .count();
                self.reports = documents;
            }
            Err(err) => {
                warn!("Failed to write reports: {}", err);
                self.ui.print_error(&format!("Failed to write reports: {}", err));
            }
        }
    }

    fn finish(&mut self) {
        self.summary.requests_sent = self.client.requests_sent();
        if let Some(started) = self.started {
            self.summary.elapsed = started.elapsed();
        }
        info!(
            collected = self.summary.collected,
            requests = self.summary.requests_sent,
            "Run complete"
        );
    }

    pub fn report_path(&self, kind: ReportKind) -> PathBuf {
        self.output_dir.join(kind.file_name())
    }

    async fn track_log(&self, level: LogLevel, message: String) {
        if let Some(tracker) = &self.progress {
            tracker.log(level, message).await;
        }
    }
}

/// Reject an output directory that is the source root itself, or whose
/// `refactored/` subtree contains the source. Clearing either would delete
/// files that belong to the codebase being processed.
pub fn check_output_location(source_root: &Path, output_dir: &Path) -> Result<()> {
    if !output_dir.exists() {
        return Ok(());
    }
    let output_dir = output_dir
        .canonicalize()
        .map_err(|e| RecastError::io(output_dir, e))?;
    let source_root = source_root
        .canonicalize()
        .map_err(|e| RecastError::io(source_root, e))?;

    if output_dir == source_root {
        return Err(RecastError::FatalConfig(format!(
            "output directory {} is the source directory; choose a separate --output-dir",
            output_dir.display()
        )));
    }
    if source_root.starts_with(output_dir.join(REFACTORED_DIR)) {
        return Err(RecastError::FatalConfig(format!(
            "source {} lies inside {}/{}, which is replaced on every run",
            source_root.display(),
            output_dir.display(),
            REFACTORED_DIR
        )));
    }
    Ok(())
}

/// Create the output directory and clear outputs left by a previous run.
/// Anything else already in the directory is left untouched.
pub async fn prepare_output_dir(output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .await
        .map_err(|e| RecastError::io(output_dir, e))?;
    let output_dir = output_dir
        .canonicalize()
        .map_err(|e| RecastError::io(output_dir, e))?;

    let refactored = output_dir.join(REFACTORED_DIR);
    if refactored.exists() {
        debug!("Removing previous output {}", refactored.display());
        fs::remove_dir_all(&refactored)
            .await
            .map_err(|e| RecastError::io(&refactored, e))?;
    }

    for kind in [ReportKind::Recommendations, ReportKind::InterviewQuestions] {
        let report = output_dir.join(kind.file_name());
        if report.is_file() {
            fs::remove_file(&report)
                .await
                .map_err(|e| RecastError::io(&report, e))?;
        }
    }

    Ok(output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RECOMMENDATIONS_FILE;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prepare_output_dir_removes_only_owned_outputs() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(out.join(REFACTORED_DIR).join("pkg")).unwrap();
        std::fs::write(out.join(REFACTORED_DIR).join("pkg/old.py"), "old").unwrap();
        std::fs::write(out.join(RECOMMENDATIONS_FILE), "old report").unwrap();
        std::fs::write(out.join("notes.txt"), "keep me").unwrap();

        let prepared = prepare_output_dir(&out).await.unwrap();

        assert_eq!(prepared, out.canonicalize().unwrap());
        assert!(!out.join(REFACTORED_DIR).exists());
        assert!(!out.join(RECOMMENDATIONS_FILE).exists());
        assert_eq!(std::fs::read_to_string(out.join("notes.txt")).unwrap(), "keep me");
    }

    #[tokio::test]
    async fn test_prepare_output_dir_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("a/b/out");
        prepare_output_dir(&out).await.unwrap();
        assert!(out.is_dir());
    }

    #[test]
    fn test_output_location_rejects_source_root() {
        let dir = TempDir::new().unwrap();
        let err = check_output_location(dir.path(), dir.path()).unwrap_err();
        assert!(matches!(err, RecastError::FatalConfig(msg) if msg.contains("source directory")));
    }

    #[test]
    fn test_output_location_rejects_source_under_refactored() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join(REFACTORED_DIR).join("app");
        std::fs::create_dir_all(&source).unwrap();

        let err = check_output_location(&source, dir.path()).unwrap_err();
        assert!(matches!(err, RecastError::FatalConfig(_)));
    }

    #[test]
    fn test_output_location_allows_nested_and_missing_outputs() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("out");
        check_output_location(dir.path(), &nested).unwrap();
        std::fs::create_dir_all(&nested).unwrap();
        check_output_location(dir.path(), &nested).unwrap();
    }

    #[test]
    fn test_summary_failure_detection() {
        let mut summary = RunSummary::default();
        assert!(!summary.has_failures());
        summary.fallbacks = 1;
        assert!(summary.has_failures());
        assert!(summary.to_string().contains("1 fell back"));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Analyze.to_string(), "analyze");
        assert_eq!(Phase::Done.to_string(), "done");
    }
}
