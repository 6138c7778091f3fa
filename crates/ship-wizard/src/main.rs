use anyhow::{bail, Context};
use chrono::Local;
use clap::Parser;
use ship_core::config::{load_service_config, ServiceConfig};
use ship_core::documents::DocumentRenderer;
use ship_core::quotes::{FileQuoteSource, QuoteBook};
use ship_core::types::{PlanningRequest, Preference, QuoteId, ShippingOption};
use ship_wizard::{HttpBackend, WizardDriver, WizardStage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_QUOTES_PATH: &str = "config/quotes.toml";

#[derive(Debug, Parser)]
#[command(name = "ship-wizard", about = "Plan a shipment against a running shipd")]
struct Cli {
    /// Base URL of the shipd service
    #[arg(long, default_value = "http://127.0.0.1:9860")]
    server: String,

    /// Saved quote to ship
    #[arg(long)]
    quote: String,

    /// Destination, e.g. "Rotterdam, NL"
    #[arg(long)]
    destination: String,

    /// fastest, cheapest, balanced or green
    #[arg(long, default_value = "balanced")]
    preference: Preference,

    /// Option id to confirm; defaults to the top-ranked option
    #[arg(long)]
    select: Option<String>,

    /// shipd config supplying the client idle timeout and the quotes file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Quotes file used to derive the documents; overrides the config
    #[arg(long)]
    quotes: Option<PathBuf>,

    /// Seconds without an event before falling back to polling; overrides
    /// the config
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Some(
            load_service_config(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
        ),
        None => None,
    };
    let idle_timeout = idle_timeout(cli.idle_timeout_secs, config.as_ref());
    let quotes_path = quotes_path(cli.quotes.clone(), cli.config.as_deref(), config.as_ref());

    let request = PlanningRequest::new(cli.quote.as_str(), cli.destination.as_str(), cli.preference);
    let backend = HttpBackend::new(cli.server.as_str());
    let mut driver = WizardDriver::new(backend, idle_timeout);

    driver.start(request).await?;
    if let Some(task_id) = driver.session().task_id() {
        println!("plan {task_id} started");
    }
    while let Some(transition) = driver.step().await? {
        if let Some(line) = driver.session().log().last() {
            if transition.to == WizardStage::Planning {
                println!("  {line}");
            }
        }
    }

    if let Some(notice) = driver.session().last_error() {
        let origin = if notice.transport { "connection" } else { "planner" };
        bail!("{origin} error: {}", notice.message);
    }
    if driver.session().stage() != WizardStage::Options {
        bail!("planning ended without options");
    }

    println!();
    for option in driver.session().options() {
        println!("{}", describe(option));
    }

    let chosen = match cli.select {
        Some(option_id) => option_id,
        None => driver
            .session()
            .options()
            .first()
            .map(|option| option.id.clone())
            .context("no options to choose from")?,
    };
    driver.select_option(&chosen)?;
    driver.confirm()?;
    println!("\nconfirmed {chosen}\n");

    let quotes = QuoteBook::new(Arc::new(FileQuoteSource::new(&quotes_path)));
    let quote = quotes
        .get(&QuoteId::new(cli.quote.as_str()))?
        .with_context(|| format!("quote {} not found in {}", cli.quote, quotes_path.display()))?;
    let renderer = DocumentRenderer::new()?;
    for document in driver
        .session()
        .documents(&quote, &renderer, Local::now().date_naive())?
    {
        println!("==> {} <==\n{}", document.file_name, document.body);
    }
    Ok(())
}

/// The flag wins over the config's `[client]` section, which wins over the
/// built-in default.
fn idle_timeout(flag: Option<u64>, config: Option<&ServiceConfig>) -> Duration {
    match flag {
        Some(secs) => Duration::from_secs(secs),
        None => config
            .map(|config| config.client.clone())
            .unwrap_or_default()
            .idle_timeout(),
    }
}

fn quotes_path(
    flag: Option<PathBuf>,
    config_path: Option<&Path>,
    config: Option<&ServiceConfig>,
) -> PathBuf {
    match (flag, config_path, config) {
        (Some(path), _, _) => path,
        (None, Some(config_path), Some(config)) => config.quotes_path(config_path),
        _ => PathBuf::from(DEFAULT_QUOTES_PATH),
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

fn describe(option: &ShippingOption) -> String {
    let co2 = option
        .co2_kg
        .map_or_else(|| "n/a".to_string(), |co2| format!("{co2:.1} kg CO2"));
    format!(
        "{:<4} {:<12} {:<14} {:>3} days  ${:>9.2}  {}",
        option.id, option.carrier, option.service, option.eta_days, option.price_usd, co2
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ship_core::config::ClientConfig;

    #[test]
    fn cli_parses_required_and_default_flags() {
        let cli = Cli::try_parse_from([
            "ship-wizard",
            "--quote",
            "q1",
            "--destination",
            "Rotterdam, NL",
        ])
        .expect("parse");
        assert_eq!(cli.server, "http://127.0.0.1:9860");
        assert_eq!(cli.preference, Preference::Balanced);
        assert_eq!(cli.select, None);
        assert_eq!(cli.config, None);
        assert_eq!(cli.idle_timeout_secs, None);

        let cli = Cli::try_parse_from([
            "ship-wizard",
            "--quote",
            "q1",
            "--destination",
            "Rotterdam, NL",
            "--preference",
            "green",
            "--select",
            "o2",
        ])
        .expect("parse");
        assert_eq!(cli.preference, Preference::Green);
        assert_eq!(cli.select.as_deref(), Some("o2"));
    }

    #[test]
    fn cli_rejects_unknown_preference_and_missing_quote() {
        let err = Cli::try_parse_from([
            "ship-wizard",
            "--quote",
            "q1",
            "--destination",
            "Rotterdam, NL",
            "--preference",
            "slowest",
        ])
        .expect_err("bad preference");
        assert!(err.to_string().contains("invalid preference"));

        assert!(Cli::try_parse_from(["ship-wizard", "--destination", "Rotterdam, NL"]).is_err());
    }

    fn service_config() -> ServiceConfig {
        ship_core::config::parse_service_config(
            r#"
[server]
bind = "127.0.0.1:9860"

[quotes]
path = "quotes.toml"

[client]
idle_timeout_secs = 90
"#,
        )
        .expect("parse config")
    }

    #[test]
    fn idle_timeout_prefers_flag_then_config_then_default() {
        let config = service_config();
        assert_eq!(idle_timeout(Some(5), Some(&config)), Duration::from_secs(5));
        assert_eq!(idle_timeout(None, Some(&config)), Duration::from_secs(90));
        assert_eq!(
            idle_timeout(None, None),
            ClientConfig::default().idle_timeout()
        );
    }

    #[test]
    fn quotes_path_follows_the_config_file() {
        let config = service_config();
        let config_path = Path::new("/etc/shipd/shipd.toml");
        assert_eq!(
            quotes_path(None, Some(config_path), Some(&config)),
            PathBuf::from("/etc/shipd/quotes.toml")
        );
        assert_eq!(
            quotes_path(Some(PathBuf::from("my-quotes.toml")), Some(config_path), Some(&config)),
            PathBuf::from("my-quotes.toml")
        );
        assert_eq!(
            quotes_path(None, None, None),
            PathBuf::from(DEFAULT_QUOTES_PATH)
        );
    }

    #[test]
    fn bundled_config_supplies_client_settings() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/shipd.toml");
        let cli = Cli::try_parse_from([
            "ship-wizard",
            "--config",
            path.to_str().expect("utf-8 path"),
            "--quote",
            "q1",
            "--destination",
            "Rotterdam, NL",
        ])
        .expect("parse");
        let config = load_service_config(cli.config.as_deref().expect("config flag"))
            .expect("load bundled config");

        assert_eq!(
            idle_timeout(cli.idle_timeout_secs, Some(&config)),
            Duration::from_secs(45)
        );
        let quotes = quotes_path(cli.quotes, cli.config.as_deref(), Some(&config));
        assert!(quotes.ends_with("config/quotes.toml"));
        assert!(quotes.exists());
    }

    #[test]
    fn describe_formats_missing_co2() {
        let option = ShippingOption {
            id: "o4".to_string(),
            carrier: "EuroRoad".to_string(),
            service: "Road Groupage".to_string(),
            eta_days: 21,
            price_usd: 1117.2,
            co2_kg: None,
            origin: "Ningbo, CN".to_string(),
            destination: "Rotterdam, NL".to_string(),
            weight_kg: 137.0,
            volume_m3: 0.88,
            route: vec!["Ningbo, CN".to_string(), "Rotterdam, NL".to_string()],
            notes: None,
        };
        let line = describe(&option);
        assert!(line.starts_with("o4"));
        assert!(line.contains("1117.20"));
        assert!(line.ends_with("n/a"));
    }
}
