//! proxydb - Entry Point
//!
//! Command line front end: add proxies by hand, list the store, draw proxies
//! from a selection session and vote on them.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use proxydb::config::LogConfig;
use proxydb::export::ExportFormat;
use proxydb::geo::{GeoLookup, MaxMindGeoLookup, NoGeoLookup};
use proxydb::models::{Protocol, ProxyListParams, RawProxy};
use proxydb::providers::{HttpClient, ProviderRegistry};
use proxydb::repository::{ProviderRequestRepository, ProxyRepository, MANUAL_VOTES};
use proxydb::selection::StrategyKind;
use proxydb::{Config, Database, ProxiesList, ProxyDbError, SessionFilter};

#[derive(Parser, Debug)]
#[command(name = "proxydb", version, about = "Proxy pool with provider refresh")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add proxies by hand, from arguments or one per line on stdin
    Add {
        proxies: Vec<String>,
        /// Votes granted to each proxy
        #[arg(long, default_value_t = MANUAL_VOTES)]
        votes: i64,
        /// Protocol for entries without a scheme
        #[arg(long, value_parser = parse_protocol)]
        protocol: Option<Protocol>,
    },
    /// List stored proxies, most voted first
    List {
        #[arg(long)]
        min_votes: Option<i64>,
        #[command(flatten)]
        filter: FilterArgs,
        /// Output format: line or json
        #[arg(long, default_value = "line")]
        format: String,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Draw proxies, refreshing a provider when the store runs dry
    Next {
        #[command(flatten)]
        filter: FilterArgs,
        /// Selection strategy: votes or random
        #[arg(long, default_value = "votes", value_parser = parse_strategy)]
        strategy: StrategyKind,
        #[arg(long, default_value_t = 0)]
        min_votes: i64,
        /// Number of proxies to draw
        #[arg(long, short = 'n', default_value_t = 1)]
        count: usize,
        /// Output format: line or json
        #[arg(long, default_value = "line")]
        format: String,
    },
    /// Vote a proxy up or down
    #[command(group(ArgGroup::new("direction").required(true).args(["up", "down"])))]
    Vote {
        /// Proxy address as listed
        id: String,
        #[arg(long)]
        up: bool,
        #[arg(long)]
        down: bool,
    },
    /// Show providers and their last runs
    Providers,
}

#[derive(Args, Debug, Clone)]
struct FilterArgs {
    /// ISO country code
    #[arg(long)]
    country: Option<String>,
    #[arg(long, value_parser = parse_protocol)]
    protocol: Option<Protocol>,
    /// Provider name, e.g. "Proxy Nova"
    #[arg(long)]
    provider: Option<String>,
}

fn parse_protocol(s: &str) -> Result<Protocol, String> {
    Protocol::parse(s).map_err(|e| e.to_string())
}

fn parse_strategy(s: &str) -> Result<StrategyKind, String> {
    StrategyKind::parse(s).map_err(|e| e.to_string())
}

/// Repositories and providers shared by the commands
struct App {
    db: Database,
    proxies: ProxyRepository,
    ledger: ProviderRequestRepository,
    registry: ProviderRegistry,
    geo: Arc<dyn GeoLookup>,
}

impl App {
    async fn init(config: &Config) -> anyhow::Result<Self> {
        let db = Database::connect(&config.database).await?;
        info!("Connected to database");

        db.run_migrations().await?;
        info!("Database migrations complete");

        let geo: Arc<dyn GeoLookup> = match config.geo.countries_file {
            Some(ref path) => Arc::new(MaxMindGeoLookup::open(path)?),
            None => Arc::new(NoGeoLookup),
        };

        let proxies = ProxyRepository::new(db.pool().clone())
            .with_engine(db.engine().clone())
            .with_update_votes(config.providers.update_votes);
        let ledger = ProviderRequestRepository::new(db.pool().clone())
            .with_stale_window(config.stale_window());
        let registry = ProviderRegistry::builtin(HttpClient::new(&config.http)?);

        Ok(Self {
            db,
            proxies,
            ledger,
            registry,
            geo,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(&LogConfig::from_env());

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("proxydb: {:#}", e);
            let code = e
                .downcast_ref::<ProxyDbError>()
                .map(ProxyDbError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("proxydb={}", log.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output
    if log.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::from_env()?;
    info!("Configuration loaded");

    let app = App::init(&config).await?;
    let code = match cli.command {
        Command::Add {
            proxies,
            votes,
            protocol,
        } => add(&app, proxies, votes, protocol).await?,
        Command::List {
            min_votes,
            filter,
            format,
            limit,
        } => {
            let format = ExportFormat::parse(&format)?;
            let params = ProxyListParams {
                min_votes,
                country: filter.country,
                protocol: filter.protocol,
                provider: filter.provider,
                limit,
            };
            if let Some(ref provider) = params.provider {
                app.registry.require(provider)?;
            }
            let proxies = app.proxies.list(&params).await?;
            print_output(&format.render(&proxies)?);
            ExitCode::SUCCESS
        }
        Command::Next {
            filter,
            strategy,
            min_votes,
            count,
            format,
        } => {
            let format = ExportFormat::parse(&format)?;
            let mut session = ProxiesList::new(
                app.proxies.clone(),
                app.ledger.clone(),
                app.registry.clone(),
                Arc::clone(&app.geo),
                SessionFilter {
                    country: filter.country,
                    protocol: filter.protocol,
                    provider: filter.provider,
                    strategy,
                    min_votes,
                },
            )?;

            let proxies = session.take(count.max(1)).await?;
            if proxies.is_empty() {
                eprintln!("proxydb: no proxy matches");
                ExitCode::FAILURE
            } else {
                print_output(&format.render(&proxies)?);
                ExitCode::SUCCESS
            }
        }
        Command::Vote { id, up, down: _ } => {
            let proxy = if up {
                app.proxies.positive(&id).await?
            } else {
                app.proxies.negative(&id).await?
            };
            match proxy {
                Some(proxy) => {
                    println!("{} {}", proxy.id, proxy.votes);
                    ExitCode::SUCCESS
                }
                None => {
                    return Err(ProxyDbError::InvalidFilterArgument(format!(
                        "unknown proxy {}",
                        id
                    ))
                    .into());
                }
            }
        }
        Command::Providers => {
            let requests = app.ledger.list().await?;
            for provider in app.registry.iter() {
                let available = if provider.is_available() {
                    "available"
                } else {
                    "unavailable"
                };
                println!("{} ({})", provider.name(), available);
                for request in requests.iter().filter(|r| r.provider == provider.name()) {
                    let last_run = request
                        .updated_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "  [{}] results={} last_run={}",
                        request.request_id, request.results, last_run
                    );
                }
            }
            ExitCode::SUCCESS
        }
    };

    app.db.close().await;
    Ok(code)
}

async fn add(
    app: &App,
    args: Vec<String>,
    votes: i64,
    protocol: Option<Protocol>,
) -> anyhow::Result<ExitCode> {
    let entries = if args.is_empty() {
        read_stdin_lines().await.context("failed to read proxies from stdin")?
    } else {
        args
    };

    let mut records = Vec::with_capacity(entries.len());
    let mut invalid = 0;
    for entry in entries.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
        let mut record = RawProxy::new(entry);
        record.protocol = protocol;
        match record.address() {
            Ok(_) => records.push(record),
            Err(e) => {
                invalid += 1;
                warn!(proxy = entry, error = %e, "Skipping invalid proxy");
                eprintln!("proxydb: skipping {}: {}", entry, e);
            }
        }
    }

    let added = app.proxies.add_manual(&records, votes, app.geo.as_ref()).await?;
    for proxy in &added {
        println!("{} {}", proxy.id, proxy.votes);
    }
    info!(added = added.len(), invalid = invalid, "Added manual proxies");

    Ok(if invalid > 0 && added.is_empty() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

async fn read_stdin_lines() -> std::io::Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut entries = Vec::new();
    while let Some(line) = lines.next_line().await? {
        entries.push(line);
    }
    Ok(entries)
}

fn print_output(output: &str) {
    if !output.is_empty() {
        println!("{}", output);
    }
}
