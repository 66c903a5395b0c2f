use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::RateLimitedClient;
use crate::config::RunConfig;
use crate::error::RequestError;
use crate::prompts::{PromptRequest, ANALYSIS_TRUNCATION_MARKER};
use crate::types::{AnalysisResult, FileDescriptor};

static SECTION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#{1,6}\s*)?(?:\d+[.)]\s*)?(?:\*\*)?(code complexity|complexity|maintainability|code smells|brief summary|summary)(?:\*\*)?\s*(?::\s*(?:\*\*)?\s*(.*))?$",
    )
    .expect("section heading regex is valid")
});

static BULLET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.*)$").expect("bullet regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Complexity,
    Maintainability,
    CodeSmells,
    Summary,
}

impl Section {
    fn from_heading(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "code complexity" | "complexity" => Section::Complexity,
            "maintainability" => Section::Maintainability,
            "code smells" => Section::CodeSmells,
            _ => Section::Summary,
        }
    }
}

/// Structured view of an analysis reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedAnalysis {
    pub summary: String,
    pub issues: Vec<String>,
    pub quality_notes: Vec<String>,
    /// False when no section heading was recognised and `summary` is the raw reply.
    pub structured: bool,
}

fn clean(text: &str) -> String {
    text.trim().trim_matches('*').trim().to_string()
}

fn is_none_marker(text: &str) -> bool {
    let lowered = text.trim().trim_end_matches('.').to_ascii_lowercase();
    lowered.is_empty() || lowered == "none" || lowered == "n/a" || lowered.starts_with("no major code smells")
}

pub fn parse_analysis(raw: &str) -> ParsedAnalysis {
    let mut sections: Vec<(Section, Vec<String>)> = Vec::new();

    for line in raw.lines() {
        if let Some(caps) = SECTION_HEADING.captures(line) {
            let section = Section::from_heading(&caps[1]);
            let rest = caps.get(2).map(|m| clean(m.as_str())).unwrap_or_default();
            let mut lines = Vec::new();
            if !rest.is_empty() {
                lines.push(rest);
            }
            sections.push((section, lines));
        } else if let Some((_, lines)) = sections.last_mut() {
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
    }

    if sections.is_empty() {
        return ParsedAnalysis {
            summary: raw.trim().to_string(),
            ..Default::default()
        };
    }

    let mut parsed = ParsedAnalysis {
        structured: true,
        ..Default::default()
    };

    for (section, lines) in sections {
        match section {
            Section::Complexity | Section::Maintainability => {
                let label = if section == Section::Complexity { "Complexity" } else { "Maintainability" };
                let text = lines.iter().map(|l| clean(l)).collect::<Vec<_>>().join(" ");
                if !text.is_empty() {
                    parsed.quality_notes.push(format!("{}: {}", label, text));
                }
            }
            Section::CodeSmells => {
                for line in &lines {
                    let item = match BULLET.captures(line) {
                        Some(caps) => clean(&caps[1]),
                        None => clean(line),
                    };
                    if !is_none_marker(&item) {
                        parsed.issues.push(item);
                    }
                }
            }
            Section::Summary => {
                let text = lines.iter().map(|l| clean(l)).collect::<Vec<_>>().join(" ");
                if !text.is_empty() {
                    parsed.summary = text;
                }
            }
        }
    }

    if parsed.summary.is_empty() {
        parsed.summary = raw.trim().to_string();
    }
    parsed
}

pub struct Analyzer {
    client: Arc<RateLimitedClient>,
    max_bytes: usize,
}

impl Analyzer {
    pub fn new(client: Arc<RateLimitedClient>, config: &RunConfig) -> Self {
        Self {
            client,
            max_bytes: config.max_analysis_bytes,
        }
    }

    /// Prompt for `file`, truncated to the analysis cap. The flag reports truncation.
    ///
    /// The cap applies to the raw bytes, before lossy decoding, so invalid
    /// UTF-8 never changes where the cut falls.
    pub fn build_prompt(&self, file: &FileDescriptor) -> (PromptRequest, bool) {
        let truncated = file.content.len() > self.max_bytes;
        let mut head = &file.content[..file.content.len().min(self.max_bytes)];
        if truncated {
            // Drop a multi-byte sequence split by the cap
            if let Err(e) = std::str::from_utf8(head) {
                if e.error_len().is_none() {
                    head = &head[..e.valid_up_to()];
                }
            }
        }
        let kept = String::from_utf8_lossy(head);

        let code = if truncated {
            format!("{}{}", kept, ANALYSIS_TRUNCATION_MARKER)
        } else {
            kept.to_string()
        };

        (
            PromptRequest::analysis(&file.display_path(), &file.language, &code),
            truncated,
        )
    }

    pub async fn analyze(&self, file: &FileDescriptor) -> Result<AnalysisResult, RequestError> {
        let mut result = AnalysisResult::new(file.display_path(), file.language.clone());

        if file.is_blank() {
            debug!("Skipping request for blank file {}", result.file_path);
            result.summary = "Empty file; nothing to analyze.".to_string();
            return Ok(result);
        }

        let (request, truncated) = self.build_prompt(file);
        if truncated {
            info!(
                size = file.size,
                cap = self.max_bytes,
                "Truncating {} for analysis",
                result.file_path
            );
        }

        let raw = self.client.complete(&request).await?;
        let parsed = parse_analysis(&raw);
        if !parsed.structured {
            debug!("Analysis reply for {} had no recognisable sections", result.file_path);
        }

        result.summary = parsed.summary;
        result.issues = parsed.issues;
        result.quality_notes = parsed.quality_notes;
        result.was_truncated = truncated;
        result.raw_response = raw;
        Ok(result)
    }
}
