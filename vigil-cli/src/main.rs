use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vigil_core::colors::CatppuccinExt;
use vigil_core::output::{get_formatter, OutputFormat};
use vigil_core::{
    ChannelNotifier, DomainEvaluator, DomainRecord, DomainStore, EngineConfig, LogNotifier,
    MemoryStore, Scheduler, SettingsStore, UserSettings, WhoisBackend,
};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Domain health monitor - HTTP/HTTPS reachability, SSL certificates and registration expiry")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (human or json)
    #[arg(short, long, default_value = "human", global = true)]
    format: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long, env = "VIGIL_JSON_LOGS", global = true)]
    json_logs: bool,

    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Args)]
struct EngineArgs {
    /// Seconds between sweeps
    #[arg(long, env = "VIGIL_INTERVAL", default_value_t = 300.0, global = true)]
    interval: f64,

    /// Domains evaluated at the same time
    #[arg(long, env = "VIGIL_CONCURRENCY", default_value_t = 10, global = true)]
    concurrency: usize,

    /// Seconds before a running sweep is abandoned
    #[arg(long, env = "VIGIL_SWEEP_TIMEOUT", default_value_t = 240.0, global = true)]
    sweep_timeout: f64,

    /// Per-request HTTP timeout in seconds
    #[arg(long, env = "VIGIL_HTTP_TIMEOUT", default_value_t = 5.0, global = true)]
    http_timeout: f64,

    /// In-process HTTP attempts before falling back
    #[arg(long, env = "VIGIL_HTTP_ATTEMPTS", default_value_t = 3, global = true)]
    http_attempts: usize,

    /// External HTTP client used after in-process attempts fail
    #[arg(long, env = "VIGIL_FALLBACK_COMMAND", default_value = "curl", global = true)]
    fallback_command: String,

    /// Disable the external HTTP fallback
    #[arg(long, env = "VIGIL_NO_FALLBACK", global = true)]
    no_fallback: bool,

    /// TLS handshake timeout in seconds
    #[arg(long, env = "VIGIL_TLS_TIMEOUT", default_value_t = 5.0, global = true)]
    tls_timeout: f64,

    /// WHOIS lookup timeout in seconds
    #[arg(long, env = "VIGIL_WHOIS_TIMEOUT", default_value_t = 10.0, global = true)]
    whois_timeout: f64,

    /// How WHOIS data is fetched (command or socket)
    #[arg(long, env = "VIGIL_WHOIS_BACKEND", default_value = "command", global = true)]
    whois_backend: WhoisBackend,

    /// WHOIS client binary for the command backend
    #[arg(long, env = "VIGIL_WHOIS_COMMAND", default_value = "whois", global = true)]
    whois_command: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep all domains on a fixed interval until interrupted
    Run {
        /// JSON file with "domains" and "settings" arrays
        #[arg(short, long, env = "VIGIL_DOMAINS")]
        domains: PathBuf,
    },
    /// Run a single sweep and print a summary
    Sweep {
        /// JSON file with "domains" and "settings" arrays
        #[arg(short, long, env = "VIGIL_DOMAINS")]
        domains: PathBuf,
    },
    /// Evaluate one domain and list its problems
    Check {
        /// Domain name to check
        domain: String,
        /// Use this owner's settings and overrides from the domains file
        #[arg(long, requires = "domains")]
        owner: Option<i64>,
        /// JSON file with "domains" and "settings" arrays
        #[arg(short, long, env = "VIGIL_DOMAINS")]
        domains: Option<PathBuf>,
    },
    /// Run every probe against one domain and show the raw results
    Probe {
        /// Domain name to probe
        domain: String,
    },
}

fn secs(value: f64, name: &str) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid {}: {}", name, value))
}

impl EngineArgs {
    fn to_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = EngineConfig::default();

        config.scheduler.interval = secs(self.interval, "interval")?;
        config.scheduler.concurrency = self.concurrency;
        config.scheduler.sweep_timeout = secs(self.sweep_timeout, "sweep timeout")?;

        config.http.timeout = secs(self.http_timeout, "HTTP timeout")?;
        config.http.attempts = self.http_attempts;
        config.http.fallback_command = if self.no_fallback {
            None
        } else {
            Some(self.fallback_command.clone())
        };

        config.tls.timeout = secs(self.tls_timeout, "TLS timeout")?;

        config.whois.timeout = secs(self.whois_timeout, "WHOIS timeout")?;
        config.whois.backend = self.whois_backend;
        config.whois.command = self.whois_command.clone();

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Run { .. } => "info",
        _ => "warn",
    };
    init_tracing(default_level, cli.json_logs);

    let output_format: OutputFormat = cli.format.parse().unwrap_or_default();

    if let Err(e) = execute_command(cli.command, &cli.engine, output_format).await {
        eprintln!("{} {:#}", "Error:".ctp_red(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn execute_command(
    command: Commands,
    engine: &EngineArgs,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let formatter = get_formatter(output_format);
    let config = engine.to_config()?;
    let evaluator = Arc::new(DomainEvaluator::from_config(&config)?);

    match command {
        Commands::Run { domains } => {
            let store = Arc::new(load_store(&domains)?);
            let scheduler = Arc::new(Scheduler::new(
                store.clone(),
                store,
                evaluator,
                Arc::new(LogNotifier),
                config.scheduler,
            ));

            scheduler
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!(error = %e, "Failed to listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                    info!("Interrupt received");
                })
                .await;
        }
        Commands::Sweep { domains } => {
            let store = Arc::new(load_store(&domains)?);
            let (notifier, mut alerts) = ChannelNotifier::channel(64);
            let scheduler = Scheduler::new(
                store.clone(),
                store,
                evaluator,
                Arc::new(notifier),
                config.scheduler,
            );

            // Print alerts as they arrive; the channel closes when the
            // scheduler and its notifier are dropped.
            let printer = tokio::spawn(async move {
                let formatter = get_formatter(output_format);
                while let Some(alert) = alerts.recv().await {
                    println!("{}", formatter.format_problems(&alert.domain, &alert.problems));
                }
            });

            let summary = scheduler
                .run_sweep()
                .await
                .context("a sweep is already running")?;
            drop(scheduler);
            printer.await?;

            println!("{}", formatter.format_summary(&summary));
        }
        Commands::Check {
            domain,
            owner,
            domains,
        } => {
            let name = vigil_core::normalize_domain(&domain)?;
            let (record, settings) = match (domains, owner) {
                (Some(path), Some(owner_id)) => {
                    let store = load_store(&path)?;
                    let record = store
                        .get_domain(&name, owner_id)
                        .await?
                        .unwrap_or_else(|| DomainRecord::new(0, name.clone(), owner_id));
                    let settings = store.get_or_create_settings(owner_id).await?;
                    (record, settings)
                }
                _ => (DomainRecord::new(0, name, 0), UserSettings::default()),
            };

            let evaluation = evaluator.evaluate_guarded(&record, &settings).await;
            let problems = evaluation.into_problems(&record.name);
            println!("{}", formatter.format_problems(&record.name, &problems));
        }
        Commands::Probe { domain } => {
            let name = vigil_core::normalize_domain(&domain)?;
            let record = DomainRecord::new(0, name, 0);
            let report = evaluator.inspect(&record, &UserSettings::default()).await;
            println!("{}", formatter.format_report(&report));
        }
    }

    Ok(())
}

fn load_store(path: &Path) -> anyhow::Result<MemoryStore> {
    MemoryStore::from_json_file(path)
        .with_context(|| format!("failed to load domains from {}", path.display()))
}
