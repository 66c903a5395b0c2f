use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A source file picked up by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub language: String,
    pub size: u64,
    pub content: Vec<u8>,
}

impl FileDescriptor {
    pub fn new(path: PathBuf, relative_path: PathBuf, language: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path,
            relative_path,
            language: language.into(),
            size: content.len() as u64,
            content,
        }
    }

    /// Content as text for prompt building. Invalid UTF-8 is replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    pub fn is_blank(&self) -> bool {
        self.content.iter().all(|b| b.is_ascii_whitespace())
    }

    pub fn display_path(&self) -> String {
        self.relative_path.display().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub file_path: String,
    pub language: String,
    pub summary: String,
    pub issues: Vec<String>,
    pub quality_notes: Vec<String>,
    pub was_truncated: bool,
    pub raw_response: String,
}

impl AnalysisResult {
    pub fn new(file_path: String, language: String) -> Self {
        Self {
            file_path,
            language,
            summary: String::new(),
            issues: Vec::new(),
            quality_notes: Vec::new(),
            was_truncated: false,
            raw_response: String::new(),
        }
    }

    /// Per-file block fed into the synthesis prompts.
    pub fn to_report_entry(&self) -> String {
        let mut entry = format!("File: {} ({})\n", self.file_path, self.language);
        for note in &self.quality_notes {
            entry.push_str(&format!("- {}\n", note));
        }
        if !self.issues.is_empty() {
            entry.push_str("Code smells:\n");
            for issue in &self.issues {
                entry.push_str(&format!("  - {}\n", issue));
            }
        }
        entry.push_str(&format!("Summary: {}\n", self.summary.trim()));
        entry
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefactorOutcome {
    Refactored,
    CopiedOversized,
    CopiedEmpty,
    Fallback(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefactorResult {
    pub file_path: String,
    pub new_content: Vec<u8>,
    pub was_truncated: bool,
    pub outcome: RefactorOutcome,
}

impl RefactorResult {
    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, RefactorOutcome::Fallback(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_detection() {
        let blank = FileDescriptor::new("a.py".into(), "a.py".into(), "python", b" \n\t\n".to_vec());
        assert!(blank.is_blank());
        assert_eq!(blank.size, 4);

        let empty = FileDescriptor::new("b.py".into(), "b.py".into(), "python", Vec::new());
        assert!(empty.is_blank());

        let code = FileDescriptor::new("c.py".into(), "c.py".into(), "python", b"x = 1\n".to_vec());
        assert!(!code.is_blank());
    }

    #[test]
    fn test_report_entry_lists_issues() {
        let mut result = AnalysisResult::new("src/main.rs".to_string(), "rust".to_string());
        result.summary = "Entry point.".to_string();
        result.issues = vec!["Long method".to_string()];
        result.quality_notes = vec!["Complexity: Low".to_string()];

        let entry = result.to_report_entry();
        assert!(entry.starts_with("File: src/main.rs (rust)"));
        assert!(entry.contains("- Complexity: Low"));
        assert!(entry.contains("  - Long method"));
        assert!(entry.ends_with("Summary: Entry point.\n"));
    }
}
