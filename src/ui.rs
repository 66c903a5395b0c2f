use colored::*;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use walkdir::WalkDir;

use crate::languages::icon_for;
use crate::pipeline::RunSummary;

/// Terminal output for the CLI. Quiet mode suppresses everything, which the
/// tests rely on.
#[derive(Debug, Clone)]
pub struct UIManager {
    colors_enabled: bool,
    quiet: bool,
}

impl UIManager {
    pub fn new(colors_enabled: bool) -> Self {
        if !colors_enabled {
            colored::control::set_override(false);
        }
        Self {
            colors_enabled,
            quiet: false,
        }
    }

    pub fn quiet() -> Self {
        Self {
            colors_enabled: false,
            quiet: true,
        }
    }

    pub fn colors_enabled(&self) -> bool {
        self.colors_enabled
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }
        println!("\n{}", title.bold().cyan());
        println!("{}", "─".repeat(title.chars().count().max(20)).dimmed());
    }

    pub fn print_info(&self, message: &str) {
        if !self.quiet {
            println!("{}", message);
        }
    }

    pub fn print_success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", "✓".green().bold(), message);
        }
    }

    pub fn print_warning(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
        }
    }

    pub fn print_error(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", "✗".red().bold(), message.red());
        }
    }

    /// Progress bar for one pipeline phase over `total` files.
    pub fn create_phase_progress(&self, phase: &str, total: u64) -> PhaseProgress {
        let bar = if self.quiet {
            ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden())
        } else {
            ProgressBar::new(total)
        };
        let template = format!(
            "{{spinner:.green}} {} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {{msg}}",
            phase
        );
        if let Ok(style) = ProgressStyle::default_bar().template(&template) {
            bar.set_style(style.progress_chars("#>-"));
        }
        PhaseProgress { bar }
    }

    pub fn print_directory_tree(&self, root: &Path) {
        if self.quiet {
            return;
        }
        println!("{}", root.display().to_string().bold());
        for line in render_directory_tree(root) {
            println!("{}", line);
        }
    }

    pub fn print_summary(&self, summary: &RunSummary) {
        if self.quiet {
            return;
        }
        self.print_header("Run Summary");
        println!("{}", summary);

        if summary.has_failures() {
            self.print_warning("Some requests failed. If you are hitting rate limits, try:");
            self.print_info("  • increasing --delay (or REQUEST_DELAY) between requests");
            self.print_info("  • raising GEMINI_MAX_RETRIES or RETRY_BASE_DELAY_MS");
            self.print_info("  • switching to a model with a higher quota via --model");
        } else {
            self.print_success("All files processed");
        }
    }
}

pub struct PhaseProgress {
    bar: ProgressBar,
}

impl PhaseProgress {
    pub fn set_current_file(&self, file: &str) {
        self.bar.set_message(file.to_string());
    }

    pub fn inc(&self) {
        self.bar.inc(1);
    }

    pub fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Indented listing of `root` with an icon per file, directories first at each level.
pub fn render_directory_tree(root: &Path) -> Vec<String> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by(|a, b| {
            let a_dir = a.file_type().is_dir();
            let b_dir = b.file_type().is_dir();
            b_dir.cmp(&a_dir).then_with(|| a.file_name().cmp(b.file_name()))
        });

    walker
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let indent = "    ".repeat(entry.depth() - 1);
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() {
                format!("{}📁 {}/", indent, name)
            } else {
                format!("{}{} {}", indent, icon_for(entry.path()), name)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_tree_lists_dirs_first_with_icons() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/util.py"), "").unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();

        let lines = render_directory_tree(dir.path());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "📁 pkg/");
        assert!(lines[1].starts_with("    ") && lines[1].ends_with("util.py"));
        assert!(lines[2].ends_with(" a.rs"));
        assert!(!lines[2].starts_with(' '));
    }

    #[test]
    fn test_quiet_progress_is_hidden() {
        let ui = UIManager::quiet();
        let progress = ui.create_phase_progress("Analyzing", 3);
        progress.set_current_file("a.py");
        progress.inc();
        progress.finish_with_message("done");
        assert!(ui.is_quiet());
        assert!(progress.bar.is_hidden());
    }
}
