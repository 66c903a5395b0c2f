use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{RecastError, Result};

/// True for references that should be cloned rather than read from disk.
pub fn is_remote_url(source: &str) -> bool {
    let source = source.trim();
    ["http://", "https://", "git@", "ssh://"]
        .iter()
        .any(|prefix| source.starts_with(prefix))
}

/// GitHub web URLs are accepted without the `.git` suffix.
pub fn normalize_clone_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.contains("github.com") && !url.ends_with(".git") {
        format!("{}.git", url)
    } else {
        url.to_string()
    }
}

/// A local directory ready to scan. Cloned sources live in a temporary
/// directory that is removed when this value is dropped.
#[derive(Debug)]
pub struct ResolvedSource {
    root: PathBuf,
    temp: Option<TempDir>,
}

impl ResolvedSource {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_clone(&self) -> bool {
        self.temp.is_some()
    }
}

pub async fn resolve_source(source: &str, clone_timeout: Duration) -> Result<ResolvedSource> {
    if is_remote_url(source) {
        clone_repository(source, clone_timeout).await
    } else {
        resolve_local(Path::new(source))
    }
}

fn resolve_local(path: &Path) -> Result<ResolvedSource> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(RecastError::resolution(&display, "path does not exist"));
    }
    if !path.is_dir() {
        return Err(RecastError::resolution(&display, "path is not a directory"));
    }
    let root = path
        .canonicalize()
        .map_err(|e| RecastError::resolution(&display, e.to_string()))?;
    debug!("Resolved local source {}", root.display());
    Ok(ResolvedSource { root, temp: None })
}

async fn clone_repository(url: &str, clone_timeout: Duration) -> Result<ResolvedSource> {
    let clone_url = normalize_clone_url(url);
    let temp = tempfile::Builder::new()
        .prefix("recast-clone-")
        .tempdir()
        .map_err(|e| RecastError::resolution(url, format!("could not create temporary directory: {}", e)))?;
    let target = temp.path().join("repo");

    info!("Cloning {} into {}", clone_url, target.display());
    let child = Command::new("git")
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg(&clone_url)
        .arg(&target)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RecastError::resolution(url, format!("could not run git: {}", e)))?;

    let output = match tokio::time::timeout(clone_timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(|e| RecastError::resolution(url, e.to_string()))?,
        Err(_) => {
            return Err(RecastError::resolution(
                url,
                format!("git clone did not finish within {}s", clone_timeout.as_secs()),
            ))
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RecastError::resolution(
            url,
            format!("git clone failed: {}", stderr.trim()),
        ));
    }

    Ok(ResolvedSource {
        root: target,
        temp: Some(temp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remote_url_detection() {
        assert!(is_remote_url("https://github.com/user/repo"));
        assert!(is_remote_url("http://example.com/repo.git"));
        assert!(is_remote_url("git@github.com:user/repo.git"));
        assert!(is_remote_url("ssh://git@host/repo.git"));
        assert!(!is_remote_url("./local/repo"));
        assert!(!is_remote_url("/abs/path"));
        assert!(!is_remote_url("github.com/user/repo"));
    }

    #[test]
    fn test_github_urls_gain_git_suffix() {
        assert_eq!(
            normalize_clone_url("https://github.com/user/repo/"),
            "https://github.com/user/repo.git"
        );
        assert_eq!(
            normalize_clone_url("https://github.com/user/repo.git"),
            "https://github.com/user/repo.git"
        );
        assert_eq!(
            normalize_clone_url("https://gitlab.com/user/repo"),
            "https://gitlab.com/user/repo"
        );
    }

    #[tokio::test]
    async fn test_local_directory_resolves_to_canonical_path() {
        let dir = TempDir::new().unwrap();
        let resolved = resolve_source(dir.path().to_str().unwrap(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(resolved.root(), dir.path().canonicalize().unwrap());
        assert!(!resolved.is_clone());
    }

    #[tokio::test]
    async fn test_missing_path_is_resolution_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = resolve_source(missing.to_str().unwrap(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RecastError::Resolution { .. }));
    }

    #[tokio::test]
    async fn test_file_path_is_resolution_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.py");
        std::fs::write(&file, "x = 1").unwrap();
        let err = resolve_source(file.to_str().unwrap(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
