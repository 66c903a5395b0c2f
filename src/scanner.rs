use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::RunConfig;
use crate::error::{RecastError, Result};
use crate::languages;
use crate::types::FileDescriptor;

#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    pub follow_symlinks: bool,
    pub max_depth: Option<usize>,
    /// Absolute paths pruned from the walk, e.g. an output directory nested in the source.
    pub exclude_paths: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct ScanResult {
    pub root: PathBuf,
    pub files: Vec<FileDescriptor>,
    pub errors: usize,
    pub duration: Duration,
}

impl ScanResult {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

pub struct RepositoryScanner {
    ignore: GlobSet,
    config: ScanConfig,
}

impl RepositoryScanner {
    pub fn new(ignore_patterns: &[String], scan_config: Option<ScanConfig>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                RecastError::FatalConfig(format!("Invalid ignore pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let ignore = builder
            .build()
            .map_err(|e| RecastError::FatalConfig(format!("Failed to build ignore set: {}", e)))?;

        Ok(Self {
            ignore,
            config: scan_config.unwrap_or_default(),
        })
    }

    pub fn from_run_config(config: &RunConfig, scan_config: Option<ScanConfig>) -> Result<Self> {
        Self::new(&config.ignore_patterns, scan_config)
    }

    /// True when a single path component (file or directory name) is in the ignore set.
    pub fn should_ignore(&self, name: &str) -> bool {
        self.ignore.is_match(name)
    }

    pub fn detect_file_language(&self, path: &Path) -> Option<&'static str> {
        languages::detect_language(path)
    }

    fn is_pruned(&self, entry: &DirEntry) -> bool {
        // The root itself is never filtered, whatever it is called.
        if entry.depth() == 0 {
            return false;
        }
        if self.config.exclude_paths.iter().any(|p| p == entry.path()) {
            debug!("Pruning excluded path {:?}", entry.path());
            return true;
        }
        entry
            .file_name()
            .to_str()
            .map(|name| self.should_ignore(name))
            .unwrap_or(false)
    }

    /// Lazily walk `root`, yielding supported files in traversal order.
    pub fn walk<'a>(&'a self, root: &Path) -> FileWalk<'a> {
        let mut walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();
        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }

        let entries = walker
            .into_iter()
            .filter_entry(move |entry| !self.is_pruned(entry));

        FileWalk {
            root: root.to_path_buf(),
            entries: Box::new(entries),
            errors: 0,
        }
    }

    pub fn scan(&self, root: &Path) -> Result<ScanResult> {
        if !root.is_dir() {
            return Err(RecastError::resolution(
                root.display().to_string(),
                "not a directory",
            ));
        }

        let start = Instant::now();
        let mut walk = self.walk(root);
        let files: Vec<FileDescriptor> = walk.by_ref().collect();
        let errors = walk.errors();

        info!(
            files = files.len(),
            errors,
            "Scanned {}",
            root.display()
        );

        Ok(ScanResult {
            root: root.to_path_buf(),
            files,
            errors,
            duration: start.elapsed(),
        })
    }
}

/// Iterator returned by [`RepositoryScanner::walk`]. Consumed once.
pub struct FileWalk<'a> {
    root: PathBuf,
    entries: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + 'a>,
    errors: usize,
}

impl FileWalk<'_> {
    pub fn errors(&self) -> usize {
        self.errors
    }
}

impl Iterator for FileWalk<'_> {
    type Item = FileDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    self.errors += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(language) = languages::detect_language(entry.path()) else {
                continue;
            };

            let content = match std::fs::read(entry.path()) {
                Ok(content) => content,
                Err(err) => {
                    warn!("Failed to read {}: {}", entry.path().display(), err);
                    self.errors += 1;
                    continue;
                }
            };

            let relative_path = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_path_buf();

            return Some(FileDescriptor::new(
                entry.path().to_path_buf(),
                relative_path,
                language,
                content,
            ));
        }
    }
}
