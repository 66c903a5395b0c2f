use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use crate::client::RateLimitedClient;
use crate::config::RunConfig;
use crate::error::{RecastError, Result};
use crate::prompts::{truncate_to_bytes, PromptRequest, REPORT_TRUNCATION_MARKER};
use crate::types::{AnalysisResult, RefactorOutcome, RefactorResult};

pub const RECOMMENDATIONS_FILE: &str = "CODEBASE_RECOMMENDATIONS.md";
pub const INTERVIEW_QUESTIONS_FILE: &str = "INTERVIEW_QUESTIONS.md";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Recommendations,
    InterviewQuestions,
}

impl ReportKind {
    pub fn title(&self) -> &'static str {
        match self {
            ReportKind::Recommendations => "Codebase Recommendations",
            ReportKind::InterviewQuestions => "Interview Questions",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ReportKind::Recommendations => RECOMMENDATIONS_FILE,
            ReportKind::InterviewQuestions => INTERVIEW_QUESTIONS_FILE,
        }
    }

    fn prompt(&self, reports: &str) -> PromptRequest {
        match self {
            ReportKind::Recommendations => PromptRequest::recommendations(reports),
            ReportKind::InterviewQuestions => PromptRequest::interview_questions(reports),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    Synthesized,
    /// The synthesis request failed; the document carries the per-file summaries.
    Partial(String),
    NoAnalysis,
}

#[derive(Debug, Clone)]
pub struct ReportDocument {
    pub kind: ReportKind,
    pub path: PathBuf,
    pub status: ReportStatus,
    pub content: String,
}

pub struct ReportAggregator {
    client: Arc<RateLimitedClient>,
    max_input_bytes: usize,
    output_dir: PathBuf,
}

impl ReportAggregator {
    pub fn new(client: Arc<RateLimitedClient>, config: &RunConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            max_input_bytes: config.max_report_input_bytes,
            output_dir: output_dir.into(),
        }
    }

    /// Per-file reports joined into one prompt body, cut to the input cap.
    pub fn combined_reports(&self, analyses: &[AnalysisResult]) -> String {
        let joined = analyses
            .iter()
            .map(AnalysisResult::to_report_entry)
            .collect::<Vec<_>>()
            .join("\n");

        match truncate_to_bytes(&joined, self.max_input_bytes) {
            (kept, true) => format!("{}{}", kept, REPORT_TRUNCATION_MARKER),
            (kept, false) => kept.to_string(),
        }
    }

    /// Build and write both documents. Synthesis failures degrade to partial
    /// documents; only write failures are errors.
    pub async fn aggregate(
        &self,
        analyses: &[AnalysisResult],
        refactors: &[RefactorResult],
    ) -> Result<Vec<ReportDocument>> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| RecastError::io(&self.output_dir, e))?;

        // Combine per-file reports into one synthesis input
        let combined = self.combined_reports(analyses);
        let mut documents = Vec::new();

        // Generate and write each report
        for kind in [ReportKind::Recommendations, ReportKind::InterviewQuestions] {
            let document = self.build(kind, analyses, refactors, &combined).await;
            fs::write(&document.path, &document.content)
                .await
                .map_err(|e| RecastError::io(&document.path, e))?;
            info!(status = ?document.status, "Wrote {}", document.path.display());
            documents.push(document);
        }

        Ok(documents)
    }

    async fn build(
        &self,
        kind: ReportKind,
        analyses: &[AnalysisResult],
        refactors: &[RefactorResult],
        combined: &str,
    ) -> ReportDocument {
        let path = self.output_dir.join(kind.file_name());
        let mut content = format!("# {}\n\n{}\n\n", kind.title(), header_line(&self.client.model_name(), analyses, refactors));

        let status = if analyses.is_empty() {
            content.push_str(
                "No per-file analysis results were available, so no project-level synthesis was \
                 requested. Run without `--skip-analysis` to generate this report.\n",
            );
            ReportStatus::NoAnalysis
        } else {
            match self.client.complete(&kind.prompt(combined)).await {
                Ok(body) => {
                    content.push_str(body.trim());
                    content.push('\n');
                    ReportStatus::Synthesized
                }
                Err(err) => {
                    warn!("Failed to generate {}: {}", kind.title(), err);
                    content.push_str(&partial_body(&err.to_string(), analyses));
                    ReportStatus::Partial(err.to_string())
                }
            }
        };

        ReportDocument { kind, path, status, content }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

fn header_line(model: &str, analyses: &[AnalysisResult], refactors: &[RefactorResult]) -> String {
    let refactored = refactors
        .iter()
        .filter(|r| r.outcome == RefactorOutcome::Refactored)
        .count();
    format!(
        "_Generated {} with `{}`: {} files analyzed, {} files refactored._",
        Local::now().format("%Y-%m-%d %H:%M"),
        model,
        analyses.len(),
        refactored
    )
}

fn partial_body(reason: &str, analyses: &[AnalysisResult]) -> String {
    let mut body = format!(
        "> **Partial results:** the synthesis request failed ({}). \
         The per-file findings are listed below.\n\n## Per-file summaries\n\n",
        reason
    );
    for analysis in analyses {
        body.push_str(&format!("- **{}**: {}\n", analysis.file_path, analysis.summary.trim()));
        for issue in &analysis.issues {
            body.push_str(&format!("  - {}\n", issue));
        }
    }
    body
}
