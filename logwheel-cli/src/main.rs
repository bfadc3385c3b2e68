//! logwheel binary entry point.
//!
//! Assembles the effective configuration (file, environment, CLI),
//! initializes logging, builds the pipeline, and feeds it standard
//! input until end of stream.

use anyhow::{Context, Result};
use clap::Parser;

use logwheel_cli::cli::LogwheelCli;
use logwheel_cli::logging;
use logwheel_core::config::LogwheelConfig;
use logwheel_pipeline::{DiagTarget, LogwheelPipelineBuilder, PipelineConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LogwheelCli::parse();
    let config = build_config(&cli).await?;

    if cli.validate {
        println!("configuration OK");
        return Ok(());
    }

    let diag = DiagTarget::new();
    logging::init_tracing(&config.general, diag.clone())?;
    logwheel_core::metrics::describe_all();

    let mut pipeline = LogwheelPipelineBuilder::new()
        .config(PipelineConfig::from_core(&config))
        .diag_target(diag)
        .build()
        .context("failed to build pipeline")?;

    tracing::debug!(
        output = %config.output.name,
        interval_secs = config.output.interval_secs,
        "logwheel started"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    pipeline
        .run(stdin)
        .await
        .context("reading standard input failed")?;

    Ok(())
}

/// Assemble the effective configuration: file, then environment, then CLI.
async fn build_config(cli: &LogwheelCli) -> Result<LogwheelConfig> {
    let mut config = match &cli.config {
        Some(path) => LogwheelConfig::from_file(path)
            .await
            .with_context(|| format!("cannot load {}", path.display()))?,
        None => LogwheelConfig::default(),
    };
    config.apply_env_overrides();
    cli.apply_to(&mut config)?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}
