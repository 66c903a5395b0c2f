use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::config::{CliOverrides, DEFAULT_OUTPUT_DIR};
use crate::server::DEFAULT_BIND_ADDR;

#[derive(Parser, Debug, Clone)]
#[command(name = "recast")]
#[command(about = "Analyze and refactor a codebase with a Gemini model")]
#[command(version)]
#[command(long_about = "Reads a local directory or clones a git repository, asks the model for a \
quality analysis and a cleaned-up version of every supported source file, and writes the \
rewritten tree together with project-level recommendations and interview questions.")]
pub struct Cli {
    /// Local directory or repository URL (https://, git@, ssh://)
    #[arg(
        value_name = "SOURCE",
        required_unless_present_any = ["show_config", "serve", "list_models"]
    )]
    pub source: Option<String>,

    /// Directory for the refactored tree and the reports
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Model name, e.g. gemini-2.5-flash-lite or gemini-2.5-pro
    #[arg(short, long)]
    pub model: Option<String>,

    /// Seconds to wait between requests
    #[arg(long, value_name = "SECONDS")]
    pub delay: Option<u64>,

    /// Skip the per-file analysis phase
    #[arg(long)]
    pub skip_analysis: bool,

    /// Skip the refactoring phase
    #[arg(long)]
    pub skip_refactoring: bool,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE", env = "RECAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub show_config: bool,

    /// List the models available to the configured key and exit
    #[arg(long, conflicts_with = "serve")]
    pub list_models: bool,

    /// Run the web interface instead of a single run
    #[arg(long)]
    pub serve: bool,

    /// Address for the web interface
    #[arg(long, value_name = "ADDR", default_value = DEFAULT_BIND_ADDR, requires = "serve")]
    pub bind: SocketAddr,
}

impl Cli {
    pub fn to_overrides(&self) -> CliOverrides {
        CliOverrides {
            model: self.model.clone(),
            delay_secs: self.delay,
            output_dir: Some(self.output_dir.clone()),
            skip_analysis: self.skip_analysis,
            skip_refactoring: self.skip_refactoring,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "recast",
            "https://github.com/user/repo",
            "--output-dir",
            "out",
            "--model",
            "gemini-2.5-pro",
            "--delay",
            "5",
            "--skip-refactoring",
        ])
        .unwrap();

        assert_eq!(cli.source.as_deref(), Some("https://github.com/user/repo"));
        let overrides = cli.to_overrides();
        assert_eq!(overrides.model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(overrides.delay_secs, Some(5));
        assert_eq!(overrides.output_dir, Some(PathBuf::from("out")));
        assert!(overrides.skip_refactoring);
        assert!(!overrides.skip_analysis);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["recast", "./repo"]).unwrap();
        assert_eq!(cli.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert!(cli.model.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_source_required_unless_show_config() {
        assert!(Cli::try_parse_from(["recast"]).is_err());
        let cli = Cli::try_parse_from(["recast", "--show-config"]).unwrap();
        assert!(cli.source.is_none());
    }

    #[test]
    fn test_serve_and_list_models_need_no_source() {
        let cli = Cli::try_parse_from(["recast", "--serve", "--bind", "0.0.0.0:8080"]).unwrap();
        assert!(cli.serve);
        assert_eq!(cli.bind, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());

        let cli = Cli::try_parse_from(["recast", "--list-models"]).unwrap();
        assert!(cli.list_models);
        assert_eq!(cli.bind.to_string(), DEFAULT_BIND_ADDR);

        assert!(Cli::try_parse_from(["recast", "--serve", "--list-models"]).is_err());
        assert!(Cli::try_parse_from(["recast", "./repo", "--bind", "0.0.0.0:1"]).is_err());
    }
}
