use anyhow::Context;
use clap::Parser;
use ship_core::config::{load_service_config, ServiceConfig};
use ship_core::quotes::{FileQuoteSource, QuoteBook};
use ship_core::validation::{has_errors, render_errors, Validate, ValidationLevel};
use ship_plan::launcher::Planner;
use ship_plan::rates::TableRates;
use ship_plan::store::spawn_retention_sweeper;
use ship_web::{run_web_server, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_SERVICE_CONFIG: &str = "config/shipd.toml";

#[derive(Debug, Parser)]
#[command(name = "shipd", about = "Shipping plan orchestrator service")]
struct Cli {
    /// Path to the service config
    #[arg(short, long, default_value = DEFAULT_SERVICE_CONFIG)]
    config: PathBuf,

    /// Bind address, overriding `server.bind`
    #[arg(short, long)]
    bind: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("bind address must not be empty")]
    EmptyBind,
    #[error("service config validation failed ({0})")]
    InvalidConfig(String),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = load_service_config(&cli.config)
        .with_context(|| format!("failed to load service config at {}", cli.config.display()))?;
    check_config(&config)?;
    let bind = resolve_bind(cli.bind, &config.server.bind)?;

    let quotes_path = config.quotes_path(&cli.config);
    info!(quotes = %quotes_path.display(), carriers = config.carriers.len(), "loading planner");
    let quotes = QuoteBook::new(Arc::new(FileQuoteSource::new(quotes_path)));
    let rates = Arc::new(TableRates::new(config.carriers.clone()));
    let planner = Planner::new(quotes, rates, &config.planner);

    let sweeper = spawn_retention_sweeper(
        planner.store().clone(),
        config.planner.sweep_interval(),
        config.planner.retention(),
    );

    let result = tokio::select! {
        result = run_web_server(&bind, AppState::new(planner)) => result.map_err(anyhow::Error::from),
        signal = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            signal.context("failed to listen for ctrl-c")
        }
    };
    sweeper.abort();
    result
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

fn check_config(config: &ServiceConfig) -> Result<(), MainError> {
    let issues = config.validate();
    for issue in issues
        .iter()
        .filter(|issue| issue.level == ValidationLevel::Warning)
    {
        warn!(code = issue.code, "{}", issue.message);
    }
    if has_errors(&issues) {
        return Err(MainError::InvalidConfig(render_errors(&issues)));
    }
    Ok(())
}

fn resolve_bind(bind_override: Option<String>, config_bind: &str) -> Result<String, MainError> {
    let candidate = bind_override.unwrap_or_else(|| config_bind.to_string());
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return Err(MainError::EmptyBind);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ship_core::config::parse_service_config;

    #[test]
    fn cli_defaults_to_bundled_config() {
        let cli = Cli::try_parse_from(["shipd"]).expect("parse");
        assert_eq!(cli.config, PathBuf::from("config/shipd.toml"));
        assert_eq!(cli.bind, None);
        assert!(!cli.verbose);
    }

    #[test]
    fn cli_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "shipd",
            "--config",
            "/tmp/shipd.toml",
            "--bind",
            "0.0.0.0:9860",
            "--verbose",
        ])
        .expect("parse");
        assert_eq!(cli.config, PathBuf::from("/tmp/shipd.toml"));
        assert_eq!(cli.bind.as_deref(), Some("0.0.0.0:9860"));
        assert!(cli.verbose);

        let err = Cli::try_parse_from(["shipd", "--bogus"]).expect_err("unknown flag");
        assert!(err.to_string().contains("--bogus"));
    }

    #[test]
    fn resolve_bind_prefers_override_and_rejects_blank_values() {
        let resolved = resolve_bind(Some("127.0.0.1:9999".to_string()), "127.0.0.1:9860")
            .expect("resolve bind");
        assert_eq!(resolved, "127.0.0.1:9999");

        let resolved = resolve_bind(None, "127.0.0.1:9860").expect("resolve fallback");
        assert_eq!(resolved, "127.0.0.1:9860");

        let err = resolve_bind(Some("   ".to_string()), "127.0.0.1:9860")
            .expect_err("blank override should fail");
        assert_eq!(err.to_string(), "bind address must not be empty");
    }

    #[test]
    fn config_without_carriers_is_rejected() {
        let config = parse_service_config(
            r#"
[server]
bind = "127.0.0.1:9860"

[quotes]
path = "config/quotes.toml"
"#,
        )
        .expect("parse config");
        let err = check_config(&config).expect_err("no carriers");
        assert!(err.to_string().contains("carriers.empty"));
    }

    #[test]
    fn bundled_config_is_valid() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/shipd.toml");
        let config = load_service_config(&path).expect("load bundled config");
        check_config(&config).expect("bundled config validates");

        let quotes_path = config.quotes_path(&path);
        let quotes = QuoteBook::new(Arc::new(FileQuoteSource::new(quotes_path)));
        let quote = quotes
            .get(&ship_core::types::QuoteId::new("q1"))
            .expect("read bundled quotes")
            .expect("q1 is bundled");
        assert_eq!(quote.items.len(), 2);
    }
}
