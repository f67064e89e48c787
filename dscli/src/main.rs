mod filestore;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use filestore::{FileSource, JsonlSink};
use libdomain_storm::{Protocol, ProxyPool, SweepConfig, Sweeper};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProtocolArg {
    Whois,
    Rdap,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Whois => Protocol::Whois,
            ProtocolArg::Rdap => Protocol::Rdap,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "ds")]
#[command(
    about = "Domain Storm - sweep domain registration status through a rotating proxy pool",
    long_about = None
)]
struct Args {
    /// Config file to load instead of the default config path
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Proxy inventory, one user:pass@host:port per line
    #[arg(long, short = 'p')]
    proxies: Option<PathBuf>,

    /// Domain list, one name per line
    #[arg(long, short = 'd')]
    domains: Option<PathBuf>,

    /// JSON-lines file results are appended to
    #[arg(long)]
    results: Option<PathBuf>,

    /// Checkpoint file used by --resume
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Continue from the saved checkpoint
    #[arg(long)]
    resume: bool,

    /// Stop after this many domains from the start of the list
    #[arg(long)]
    limit: Option<u64>,

    #[arg(long, value_enum)]
    protocol: Option<ProtocolArg>,

    /// Initial concurrency per proxy (overrides the controller's initial value)
    #[arg(long)]
    concurrency_per_proxy: Option<usize>,

    /// Print the default config to stdout and exit
    #[arg(long)]
    print_default_config: bool,

    /// Write the default config to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct Config {
    files: FilesConfig,
    sweep: SweepConfig,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct FilesConfig {
    proxies: PathBuf,
    domains: PathBuf,
    results: PathBuf,
    checkpoint: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            proxies: "proxies.txt".into(),
            domains: "domains.txt".into(),
            results: "results.jsonl".into(),
            checkpoint: "checkpoint.json".into(),
        }
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ds").join("config.toml"))
}

/// An explicit path must exist; the default path is optional.
fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };
    let content =
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn apply_args(mut config: Config, args: &Args) -> Config {
    if let Some(path) = &args.proxies {
        config.files.proxies = path.clone();
    }
    if let Some(path) = &args.domains {
        config.files.domains = path.clone();
    }
    if let Some(path) = &args.results {
        config.files.results = path.clone();
    }
    if let Some(path) = &args.checkpoint {
        config.files.checkpoint = path.clone();
    }
    if let Some(limit) = args.limit {
        config.sweep.limit = Some(limit);
    }
    if let Some(protocol) = args.protocol {
        config.sweep.protocol = protocol.into();
    }
    if let Some(n) = args.concurrency_per_proxy {
        config.sweep.concurrency_per_proxy = Some(n);
    }
    config
}

fn get_default_config_toml() -> String {
    r#"# Domain Storm (ds) Configuration

[files]
proxies = "proxies.txt"
domains = "domains.txt"
results = "results.jsonl"
checkpoint = "checkpoint.json"

[sweep]
# "whois" (raw port 43 through a CONNECT tunnel) or "rdap"
protocol = "whois"
batch_size = 10000
checkpoint_interval = 100000
max_retries = 2
query_timeout = "12s"
# concurrency_per_proxy = 2
# limit = 1000000

[sweep.controller]
min_concurrency = 50
max_concurrency = 500
initial_concurrency = 300
latency_low_ms = 120.0
latency_high_ms = 200.0
latency_critical_ms = 500.0
timeout_warning = 0.01
timeout_high = 0.02
timeout_critical = 0.05
check_interval = 500
pause_duration = "30s"

[sweep.pool]
min_attempts = 10
min_success_rate = 0.5
# max_proxies = 100

[sweep.whois]
# server = "whois.verisign-grs.com"
port = 43
response_bytes = 64
connect_timeout = "10s"
read_timeout = "10s"

[sweep.rdap]
timeout = "10s"
bootstrap = false
# max_rate_per_endpoint = 20
"#
    .to_string()
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_default_config {
        println!("{}", get_default_config_toml());
        return Ok(());
    }

    if args.write_default_config {
        let Some(path) = config_path() else {
            bail!("could not determine config path");
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, get_default_config_toml())?;
        println!("Default config written to: {}", path.display());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,libdomain_storm=info")),
        )
        .init();

    let config = apply_args(load_config(args.config.as_deref())?, &args);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args.resume))
}

async fn run(config: Config, resume: bool) -> Result<()> {
    let Config { files, sweep } = config;

    let pool = ProxyPool::from_file(&files.proxies, sweep.pool.clone())
        .with_context(|| format!("loading proxies from {}", files.proxies.display()))?;
    let source = FileSource::new(&files.domains);
    let sink = JsonlSink::open(&files.results, &files.checkpoint)
        .await
        .with_context(|| format!("opening {}", files.results.display()))?;

    let sweeper = Sweeper::from_config(sweep, Arc::new(pool));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, draining in-flight queries");
            interrupt.cancel();
        }
    });

    let summary = sweeper.run(&source, &sink, resume, cancel).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
