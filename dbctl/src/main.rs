// dbctl: operator CLI for the portal's MySQL access layer

mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use common::config::{DatabaseSettings, Settings};
use common::db::{ConnectionParams, Database, ExecuteOptions, QueryKind, RetryPolicy, Value};
use common::net;
use common::telemetry::{self, LogContext};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "dbctl", version, about = "Inspect and exercise the portal database")]
struct Cli {
    /// Directory holding default.toml / local.toml
    #[arg(long, global = true, default_value = "config")]
    settings_dir: PathBuf,

    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Connect using the stored section for this database; takes precedence
    /// over the explicit connection flags
    #[arg(long, global = true)]
    from_config: Option<String>,

    /// Connection store path (overrides settings)
    #[arg(long, global = true)]
    config_path: Option<PathBuf>,

    #[arg(long, global = true, env = "DB_HOST")]
    host: Option<String>,

    #[arg(long, global = true, env = "DB_PORT", default_value_t = common::db::DEFAULT_PORT)]
    port: u16,

    #[arg(long, global = true, env = "DB_USER")]
    user: Option<String>,

    #[arg(long, global = true, env = "DB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, global = true, env = "DB_NAME")]
    database: Option<String>,

    /// Probe internet reachability before connecting
    #[arg(long, global = true)]
    preflight: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ping the server through the pool
    Ping,
    /// Report whether the pool is usable (never fails)
    Status,
    /// Print the server version
    Version,
    /// Run a statement and print rows or the affected count as JSON
    Query(QueryArgs),
    /// Connect with explicit parameters and persist them to the store
    Save,
    /// Probe internet reachability
    CheckInternet(ProbeArgs),
}

#[derive(Args, Debug)]
struct QueryArgs {
    sql: String,

    /// Positional parameter, repeatable
    #[arg(long = "param", short = 'p')]
    params: Vec<String>,

    /// Statement kind; inferred from the leading keyword when omitted
    #[arg(long, value_enum)]
    kind: Option<KindArg>,

    #[arg(long)]
    retry: Option<u32>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Retry every failure, not only transient ones
    #[arg(long)]
    retry_all: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Read,
    Write,
}

impl From<KindArg> for QueryKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Read => QueryKind::Read,
            KindArg::Write => QueryKind::Write,
        }
    }
}

#[derive(Args, Debug)]
struct ProbeArgs {
    #[arg(long, default_value = net::DEFAULT_PROBE_HOST)]
    probe_host: String,

    #[arg(long, default_value_t = net::DEFAULT_PROBE_PORT)]
    probe_port: u16,

    #[arg(long, default_value_t = 3)]
    probe_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from_path(&cli.settings_dir)
        .with_context(|| format!("Failed to load settings from {}", cli.settings_dir.display()))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid settings: {}", e))?;

    let _logging = telemetry::init_logging(&settings.observability)?;

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    if let Commands::CheckInternet(probe) = &cli.command {
        let reachable = net::check_internet(
            &probe.probe_host,
            probe.probe_port,
            Duration::from_secs(probe.probe_timeout_secs),
        )
        .await;
        println!("{}", serde_json::json!({ "reachable": reachable }));
        return Ok(());
    }

    if cli.target.preflight && !net::check_internet_default().await {
        warn!("Internet probe failed; attempting the database connection anyway");
    }

    let mut db_settings = settings.database.clone();
    if let Some(path) = &cli.target.config_path {
        db_settings.config_path = path.display().to_string();
    }
    let db = Database::from_settings(&db_settings, LogContext::new("dbctl"));

    connect(&db, &cli.target, &db_settings).await?;

    let outcome = run(&db, &cli.command).await;
    db.close().await;

    if let Err(e) = &outcome {
        error!(error = %e, "Command failed");
    }
    outcome
}

async fn connect(db: &Database, target: &TargetArgs, settings: &DatabaseSettings) -> Result<()> {
    if let Some(database) = &target.from_config {
        db.connect_from_config(database, &settings.config_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to [{}] from {}",
                    database, settings.config_path
                )
            })?;
        return Ok(());
    }

    let host = target.host.clone().context("--host or --from-config is required")?;
    let user = target.user.clone().context("--user is required")?;
    let database = target.database.clone().context("--database is required")?;
    let password = target.password.clone().unwrap_or_default();

    info!(host = %host, port = target.port, database = %database, "Connecting");

    let params = ConnectionParams::new(host, target.port, user, password, database)
        .with_pool_size(settings.min_connections, settings.max_connections);
    db.connect(&params).await.context("Failed to connect")?;
    Ok(())
}

async fn run(db: &Database, command: &Commands) -> Result<()> {
    match command {
        Commands::Ping => {
            db.ping().await?;
            println!("{}", serde_json::json!({ "ping": "ok" }));
        }
        Commands::Status => {
            let connected = db.is_connected().await;
            let identity = db.identity().await;
            println!(
                "{}",
                serde_json::json!({ "connected": connected, "identity": identity })
            );
        }
        Commands::Version => {
            let version = db.version().await?;
            println!("{}", serde_json::json!({ "version": version }));
        }
        Commands::Query(args) => {
            let mut options: ExecuteOptions = db.default_options();
            if let Some(retry) = args.retry {
                options = options.with_retry(retry);
            }
            if let Some(secs) = args.timeout_secs {
                options = options.with_timeout(Duration::from_secs(secs));
            }
            if args.retry_all {
                options = options.with_retry_policy(RetryPolicy::AllErrors);
            }

            let params: Vec<Value> = args
                .params
                .iter()
                .map(|p| Value::from(p.as_str()))
                .collect();
            let kind = args
                .kind
                .map(QueryKind::from)
                .unwrap_or_else(|| QueryKind::classify(&args.sql));

            let result = db.execute_as(kind, &args.sql, params, options).await?;
            println!("{}", serde_json::to_string_pretty(&output::result_to_json(&result))?);
        }
        Commands::Save => {
            // connect() already persisted the parameters
            let identity = db.identity().await;
            println!(
                "{}",
                serde_json::json!({
                    "saved": identity.is_some(),
                    "path": db.store_path().display().to_string(),
                })
            );
        }
        Commands::CheckInternet(_) => {}
    }
    Ok(())
}
