use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::client::RateLimitedClient;
use crate::config::RunConfig;
use crate::error::{RecastError, Result};
use crate::prompts::PromptRequest;
use crate::types::{FileDescriptor, RefactorOutcome, RefactorResult};

/// Subdirectory of the output directory that mirrors the source tree.
pub const REFACTORED_DIR: &str = "refactored";

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[\w+#.-]*[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("fenced block regex is valid")
});

static INLINE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[\w+#.-]*(.*?)```").expect("inline block regex is valid"));

/// First fenced code block of a markdown reply, or the whole reply when there is none.
pub fn extract_code_block(markdown: &str) -> String {
    if let Some(caps) = FENCED_BLOCK.captures(markdown) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = INLINE_BLOCK.captures(markdown) {
        return caps[1].trim().to_string();
    }
    markdown.trim().to_string()
}

pub struct Refactorer {
    client: Arc<RateLimitedClient>,
    max_bytes: usize,
    output_root: PathBuf,
}

impl Refactorer {
    pub fn new(client: Arc<RateLimitedClient>, config: &RunConfig, output_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            max_bytes: config.max_refactor_bytes,
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn output_path(&self, file: &FileDescriptor) -> PathBuf {
        self.output_root.join(&file.relative_path)
    }

    /// Produce new content for `file` and write it to the mirrored path.
    /// Only I/O failures are returned as errors.
    pub async fn refactor(&self, file: &FileDescriptor) -> Result<RefactorResult> {
        let result = self.produce(file).await;
        let destination = self.output_path(file);
        write_mirrored(&destination, &result.new_content).await?;
        debug!("Wrote {}", destination.display());
        Ok(result)
    }

    async fn produce(&self, file: &FileDescriptor) -> RefactorResult {
        let file_path = file.display_path();

        if file.size as usize > self.max_bytes {
            info!(
                size = file.size,
                cap = self.max_bytes,
                "{} is too large for refactoring; copying original",
                file_path
            );
            return RefactorResult {
                file_path,
                new_content: file.content.clone(),
                was_truncated: true,
                outcome: RefactorOutcome::CopiedOversized,
            };
        }

        if file.is_blank() {
            return RefactorResult {
                file_path,
                new_content: file.content.clone(),
                was_truncated: false,
                outcome: RefactorOutcome::CopiedEmpty,
            };
        }

        let request = PromptRequest::refactor(&file_path, &file.language, &file.text());
        let fallback = |reason: String| {
            warn!("Refactoring failed for {}: {}. Using original code.", file_path, reason);
            RefactorResult {
                file_path: file_path.clone(),
                new_content: file.content.clone(),
                was_truncated: false,
                outcome: RefactorOutcome::Fallback(reason),
            }
        };

        let reply = match self.client.complete(&request).await {
            Ok(reply) => reply,
            Err(err) => return fallback(err.to_string()),
        };

        let mut code = extract_code_block(&reply);
        if code.is_empty() {
            return fallback("reply contained no code".to_string());
        }
        if file.content.ends_with(b"\n") {
            code.push('\n');
        }

        RefactorResult {
            file_path: file_path.clone(),
            new_content: code.into_bytes(),
            was_truncated: false,
            outcome: RefactorOutcome::Refactored,
        }
    }
}

async fn write_mirrored(destination: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| RecastError::io(parent, e))?;
    }
    fs::write(destination, content)
        .await
        .map_err(|e| RecastError::io(destination, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockInferenceBackend;
    use crate::client::RetryPolicy;
    use crate::error::BackendError;
    use crate::prompts::PromptKind;
    use std::time::Duration;
    use tempfile::TempDir;

    fn refactorer_with(backend: MockInferenceBackend, max_bytes: usize, out: &Path) -> Refactorer {
        let policy = RetryPolicy {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            call_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        };
        let client = Arc::new(RateLimitedClient::new(Box::new(backend), policy));
        let config = RunConfig {
            max_refactor_bytes: max_bytes,
            ..RunConfig::default()
        };
        Refactorer::new(client, &config, out)
    }

    fn file(relative: &str, content: &[u8]) -> FileDescriptor {
        FileDescriptor::new(PathBuf::from("/src").join(relative), relative.into(), "python", content.to_vec())
    }

    #[test]
    fn test_extract_fenced_block_with_language() {
        let reply = "Here you go:\n```python\ndef f():\n    return 1\n```\nThanks";
        assert_eq!(extract_code_block(reply), "def f():\n    return 1");
    }

    #[test]
    fn test_extract_first_of_several_blocks() {
        let reply = "```rs\nfn a() {}\n```\n\n```rs\nfn b() {}\n```";
        assert_eq!(extract_code_block(reply), "fn a() {}");
    }

    #[test]
    fn test_extract_inline_block() {
        assert_eq!(extract_code_block("``` x = 1 ```"), "x = 1");
    }

    #[test]
    fn test_extract_without_block_returns_text() {
        assert_eq!(extract_code_block("  x = 1\n"), "x = 1");
    }

    #[tokio::test]
    async fn test_oversized_file_is_copied_without_request() {
        let out = TempDir::new().unwrap();
        let mut backend = MockInferenceBackend::new();
        backend.expect_generate().times(0);
        let refactorer = refactorer_with(backend, 8, out.path());

        let content = b"\x00\xffnot utf8 but copied as-is".to_vec();
        let descriptor = file("pkg/big.py", &content);
        let result = refactorer.refactor(&descriptor).await.unwrap();

        assert!(result.was_truncated);
        assert_eq!(result.outcome, RefactorOutcome::CopiedOversized);
        assert_eq!(std::fs::read(out.path().join("pkg/big.py")).unwrap(), content);
    }

    #[tokio::test]
    async fn test_refactored_content_is_written_to_mirrored_path() {
        let out = TempDir::new().unwrap();
        let mut backend = MockInferenceBackend::new();
        backend
            .expect_generate()
            .withf(|request| request.kind == PromptKind::Refactor)
            .times(1)
            .returning(|_| Ok("```python\ndef add(a, b):\n    return a + b\n```".to_string()));
        let refactorer = refactorer_with(backend, 15_000, out.path());

        let descriptor = file("a/b/c/math.py", b"def add(a,b): return a+b\n");
        let result = refactorer.refactor(&descriptor).await.unwrap();

        assert_eq!(result.outcome, RefactorOutcome::Refactored);
        assert!(!result.was_truncated);
        let written = std::fs::read_to_string(out.path().join("a/b/c/math.py")).unwrap();
        assert_eq!(written, "def add(a, b):\n    return a + b\n");
    }

    #[tokio::test]
    async fn test_request_failure_falls_back_to_original() {
        let out = TempDir::new().unwrap();
        let mut backend = MockInferenceBackend::new();
        backend.expect_model_name().return_const("gemini-test".to_string());
        backend
            .expect_generate()
            .times(1)
            .returning(|_| Err(BackendError::ModelUnavailable("HTTP 404".to_string())));
        let refactorer = refactorer_with(backend, 15_000, out.path());

        let descriptor = file("main.py", b"print('hello')\n");
        let result = refactorer.refactor(&descriptor).await.unwrap();

        assert!(result.is_fallback());
        assert_eq!(std::fs::read(out.path().join("main.py")).unwrap(), b"print('hello')\n");
    }

    #[tokio::test]
    async fn test_empty_reply_falls_back_to_original() {
        let out = TempDir::new().unwrap();
        let mut backend = MockInferenceBackend::new();
        backend
            .expect_generate()
            .times(1)
            .returning(|_| Ok("```\n\n```".to_string()));
        let refactorer = refactorer_with(backend, 15_000, out.path());

        let result = refactorer.refactor(&file("x.py", b"x = 1")).await.unwrap();
        assert!(matches!(result.outcome, RefactorOutcome::Fallback(ref reason) if reason.contains("no code")));
    }

    #[tokio::test]
    async fn test_blank_file_is_copied_without_request() {
        let out = TempDir::new().unwrap();
        let mut backend = MockInferenceBackend::new();
        backend.expect_generate().times(0);
        let refactorer = refactorer_with(backend, 15_000, out.path());

        let result = refactorer.refactor(&file("__init__.py", b"")).await.unwrap();
        assert_eq!(result.outcome, RefactorOutcome::CopiedEmpty);
        assert!(out.path().join("__init__.py").exists());
    }
}
