use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::info;

use crate::{
    backend::{GeminiBackend, ModelInfo},
    cli_types::Cli,
    config::{FileSettings, RunConfig},
    pipeline::{Orchestrator, RunSummary},
    server,
    ui::UIManager,
};

/// Load the layered configuration for `cli`. With `validate` false the
/// result may be incomplete, which is what `--show-config` wants.
pub fn load_run_config(cli: &Cli, validate: bool) -> Result<RunConfig> {
    let settings = FileSettings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let overrides = cli.to_overrides();

    if validate {
        RunConfig::resolve(settings, &overrides).context("Invalid configuration")
    } else {
        Ok(RunConfig::merge(settings, &overrides))
    }
}

pub fn render_config(config: &RunConfig) -> Result<String> {
    toml::to_string_pretty(&config.effective_view()).context("Failed to serialize configuration")
}

pub struct CliApp {
    config: RunConfig,
    verbose: bool,
    ui: UIManager,
}

impl CliApp {
    pub fn new(config: RunConfig, verbose: bool, colors_enabled: bool) -> Self {
        info!("Initializing recast CLI");
        Self {
            config,
            verbose,
            ui: UIManager::new(colors_enabled),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn show_config(&self) -> Result<()> {
        self.ui.print_header("Configuration");
        let rendered = render_config(&self.config)?;
        println!("{}", rendered);
        Ok(())
    }

    /// Print the models that can serve `generateContent` and return the full listing.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let backend = GeminiBackend::new(&self.config).context("Failed to create Gemini client")?;
        let models = backend.list_models().await.context("Failed to list models")?;

        self.ui.print_header("Available Models");
        let usable: Vec<&ModelInfo> = models.iter().filter(|m| m.supports_generate_content()).collect();
        for model in &usable {
            let marker = if model.short_name() == self.config.model { " (configured)" } else { "" };
            self.ui
                .print_info(&format!("{}  {}{}", model.short_name(), model.display_name, marker));
        }
        self.ui.print_success(&format!(
            "{} of {} models support content generation",
            usable.len(),
            models.len()
        ));
        Ok(models)
    }

    pub async fn serve(&self, addr: SocketAddr) -> Result<()> {
        self.ui.print_header("recast web interface");
        self.ui.print_info(&format!("Open http://{} in your browser", addr));
        if self.config.api_key.is_empty() {
            self.ui
                .print_warning("GEMINI_API_KEY is not set; runs will be rejected until it is configured");
        }
        server::serve(self.config.clone(), addr)
            .await
            .context("Web interface stopped")
    }

    pub async fn run(&self, source: &str) -> Result<RunSummary> {
        let start_time = Instant::now();

        self.ui.print_header("recast");
        self.ui.print_info(&format!("Model: {}", self.config.model));
        if self.verbose {
            self.ui.print_info(&format!(
                "Limits: analysis {} bytes, refactoring {} bytes, delay {:?}, retries {}",
                self.config.max_analysis_bytes,
                self.config.max_refactor_bytes,
                self.config.call_delay,
                self.config.max_retries
            ));
        }
        if self.config.skip_analysis {
            self.ui.print_info("Skipping analysis phase");
        }
        if self.config.skip_refactoring {
            self.ui.print_info("Skipping refactoring phase");
        }

        let mut orchestrator = Orchestrator::new(self.config.clone(), source, self.ui.clone())
            .context("Failed to initialize pipeline")?;
        let summary = orchestrator
            .run()
            .await
            .with_context(|| format!("Run failed for source: {}", source))?;

        self.ui.print_summary(&summary);
        if self.verbose {
            self.ui.print_info(&format!("Total time: {:?}", start_time.elapsed()));
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_render_config_redacts_key() {
        let config = RunConfig {
            api_key: "super-secret".to_string(),
            ..RunConfig::default()
        };
        let rendered = render_config(&config).unwrap();
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("api_key = \"<redacted>\""));
        assert!(rendered.contains("model = "));
    }

    #[test]
    fn test_explicit_missing_config_file_is_error() {
        let cli = Cli::try_parse_from([
            "recast",
            "./repo",
            "--config",
            "/definitely/not/here/recast.toml",
        ])
        .unwrap();
        assert!(load_run_config(&cli, false).is_err());
    }
}
