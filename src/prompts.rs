//! Prompt templates sent to the inference service.

use serde::{Deserialize, Serialize};

pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are a senior software engineer specializing in code quality analysis. \
Analyze the provided code and give a concise, structured report on its quality. \
Focus on actionable insights and be specific about issues found.";

pub const REFACTORING_SYSTEM_PROMPT: &str = "You are an expert code refactoring assistant. Your task is to rewrite the given code to improve \
its readability, maintainability, and adherence to best practices without altering its core functionality. \
Add appropriate comments and docstrings. Ensure the code follows language-specific conventions. \
Return only the refactored code in a markdown code block without explanations.";

pub const RECOMMENDATIONS_SYSTEM_PROMPT: &str = "You are a principal software architect. Based on the analysis reports of multiple files from a codebase, \
provide high-level, actionable recommendations for improving the entire project. \
Focus on patterns, architectural issues, and strategic improvements.";

pub const INTERVIEW_QUESTIONS_SYSTEM_PROMPT: &str = "You are a senior software engineer and technical interviewer. \
Create insightful technical interview questions based on the codebase analysis. \
Questions should assess understanding of software design, problem-solving, and coding practices. \
Make questions specific to the analyzed code but also test general programming knowledge.";

pub const ANALYSIS_TRUNCATION_MARKER: &str = "\n... (file truncated for analysis)";
pub const REPORT_TRUNCATION_MARKER: &str = "\n... (analysis truncated due to length)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptKind {
    Analysis,
    Refactor,
    Recommendations,
    InterviewQuestions,
}

/// One logical request to the inference service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub kind: PromptKind,
    pub system: String,
    pub user: String,
}

impl PromptRequest {
    pub fn analysis(file_path: &str, language: &str, code: &str) -> Self {
        let user = format!(
            r#"Analyze the following {language} code from the file '{file_path}':

```
{code}
```

Reply using exactly these four numbered sections:
1. **Code Complexity:** Give a qualitative assessment (Low, Medium, or High) and explain why.
2. **Maintainability:** Score it from 1-10 (1=very difficult, 10=very easy) and justify your score.
3. **Code Smells:** List up to 3 major code smells as bullet points (e.g., long method, duplicate code, large class). Write "None" if there are none.
4. **Brief Summary:** A one-sentence summary of the code's purpose and quality."#
        );
        Self {
            kind: PromptKind::Analysis,
            system: ANALYSIS_SYSTEM_PROMPT.to_string(),
            user,
        }
    }

    pub fn refactor(file_path: &str, language: &str, code: &str) -> Self {
        let user = format!(
            r#"Refactor the following {language} code from the file '{file_path}'.
Preserve its observable behavior exactly: public names, signatures, inputs, and outputs must not change.
Return ONLY the complete, refactored code inside a single markdown code block. Do not add any explanations before or after the code block.

Original Code:
```
{code}
```"#
        );
        Self {
            kind: PromptKind::Refactor,
            system: REFACTORING_SYSTEM_PROMPT.to_string(),
            user,
        }
    }

    pub fn recommendations(reports: &str) -> Self {
        let user = format!(
            r#"Here are the analysis reports for several files in a codebase:
---
{reports}
---
Based on these reports, please provide a high-level summary and actionable recommendations for the entire project.
Focus on patterns you observe (e.g., inconsistent styling, lack of documentation, high complexity in multiple modules).
Structure your response with:
1. **Overall Summary:** A brief paragraph about the general state of the codebase.
2. **Key Recommendations:** A prioritized bulleted list of the top 3-5 most impactful recommendations."#
        );
        Self {
            kind: PromptKind::Recommendations,
            system: RECOMMENDATIONS_SYSTEM_PROMPT.to_string(),
            user,
        }
    }

    pub fn interview_questions(reports: &str) -> Self {
        let user = format!(
            r#"Here are analysis reports for several files from a candidate's codebase:
---
{reports}
---
Based on these reports, generate a set of 5-7 interview questions. The questions should be:
1. **Conceptual:** Ask about the architectural choices, design patterns, or high-level decisions.
2. **Code-Specific:** Refer to potential issues (like high complexity or code smells) and ask how the candidate would justify or improve them.
3. **Refactoring-Oriented:** Propose a hypothetical new requirement and ask how they would adapt the existing code.

Format the output clearly with headings for each question."#
        );
        Self {
            kind: PromptKind::InterviewQuestions,
            system: INTERVIEW_QUESTIONS_SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}

/// Cut `text` to at most `max_bytes`, backing off to the previous char boundary.
/// Returns the kept prefix and whether anything was dropped.
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> (&str, bool) {
    if text.len() <= max_bytes {
        return (text, false);
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_analysis_prompt_contains_code_and_sections() {
        let request = PromptRequest::analysis("src/app.py", "python", "print('x')");
        assert_eq!(request.kind, PromptKind::Analysis);
        assert_eq!(request.system, ANALYSIS_SYSTEM_PROMPT);
        assert!(request.user.contains("'src/app.py'"));
        assert!(request.user.contains("print('x')"));
        assert!(request.user.contains("Code Smells"));
        assert!(request.user.contains("Brief Summary"));
    }

    #[test]
    fn test_refactor_prompt_demands_behavior_preservation() {
        let request = PromptRequest::refactor("lib.rs", "rust", "fn a() {}");
        assert_eq!(request.kind, PromptKind::Refactor);
        assert!(request.user.contains("Preserve its observable behavior"));
        assert!(request.user.contains("fn a() {}"));
    }

    #[test]
    fn test_truncate_within_limit_is_untouched() {
        assert_eq!(truncate_to_bytes("hello", 5), ("hello", false));
        assert_eq!(truncate_to_bytes("", 0), ("", false));
    }

    #[test]
    fn test_truncate_backs_off_to_char_boundary() {
        // "é" is two bytes; cutting at 2 would split it.
        let (kept, truncated) = truncate_to_bytes("aé", 2);
        assert_eq!(kept, "a");
        assert!(truncated);
    }

    proptest! {
        #[test]
        fn prop_truncation_never_exceeds_cap(text in ".{0,200}", cap in 0usize..300) {
            let (kept, truncated) = truncate_to_bytes(&text, cap);
            prop_assert!(kept.len() <= cap || !truncated);
            prop_assert!(kept.len() <= text.len());
            prop_assert!(text.starts_with(kept));
            prop_assert_eq!(truncated, text.len() > cap);
        }
    }
}
