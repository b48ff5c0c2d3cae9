use std::process;
use std::sync::Arc;
use std::time::Duration;

use aggregate_healthcheck::aggregator::Aggregator;
use aggregate_healthcheck::config::{self, AppConfig};
use aggregate_healthcheck::configstore::EtcdConfigStore;
use aggregate_healthcheck::feeder::MetricSinkFeeder;
use aggregate_healthcheck::handlers::{self, AppState};
use aggregate_healthcheck::probe::ProbeClient;
use aggregate_healthcheck::registry::Registry;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// CLI flags, each with an environment-variable fallback, matching the
/// original `mow.cli` flag set (§6) and the teacher's `clap` dependency.
#[derive(Debug, Parser)]
#[command(name = "aggregate-healthcheck", about = "Aggregate health monitor for a fleet of HTTP services")]
struct Cli {
    /// Optional SOCKS5 proxy for outbound probe requests.
    #[arg(long, env = "SOCKS_PROXY")]
    socks_proxy: Option<String>,

    /// Comma-separated etcd peer URLs.
    #[arg(long, env = "ETCD_PEERS")]
    etcd_peers: Option<String>,

    /// Host used as the HTTP Host header target for probes (vulcand address).
    #[arg(long, env = "VULCAND")]
    vulcand: Option<String>,

    #[arg(long, env = "GRAPHITE_HOST")]
    graphite_host: Option<String>,

    #[arg(long, env = "GRAPHITE_PORT")]
    graphite_port: Option<u16>,

    #[arg(long, env = "ENVIRONMENT")]
    environment: Option<String>,

    /// Comma-separated substrings that mark a service as high severity.
    #[arg(long, env = "SEV_1_APPS")]
    sev_1_apps: Option<String>,

    #[arg(long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: String,

    #[arg(long, env = "BIND_ADDR")]
    bind_addr: Option<String>,
}

impl Cli {
    /// CLI flags override values loaded from the layered YAML config,
    /// mirroring `core::config::app_config::load_config` semantics with the
    /// original's env-var-per-flag convention layered on top.
    fn apply_overrides(&self, mut cfg: AppConfig) -> AppConfig {
        if let Some(v) = &self.socks_proxy {
            cfg.probe.socks_proxy = Some(v.clone());
        }
        if let Some(v) = &self.etcd_peers {
            cfg.config_store.etcd_peers = v.clone();
        }
        if let Some(v) = &self.vulcand {
            cfg.probe.vulcand = v.clone();
        }
        if let Some(v) = &self.graphite_host {
            cfg.graphite.host = v.clone();
        }
        if let Some(v) = self.graphite_port {
            cfg.graphite.port = v;
        }
        if let Some(v) = &self.environment {
            cfg.environment = v.clone();
        }
        if let Some(v) = &self.sev_1_apps {
            cfg.probe.sev_1_apps = v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
        }
        if let Some(v) = &self.bind_addr {
            cfg.server.bind_addr = v.clone();
        }
        cfg
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {err}");
        process::exit(1);
    }

    if let Err(err) = run().await {
        error!(error = %err, "fatal bootstrap failure");
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = cli.apply_overrides(config::load_config(&cli.config_dir).unwrap_or_default());

    let config_store = Arc::new(EtcdConfigStore::new(cfg.etcd_peers(), Duration::from_secs(10))?);
    let probe = Arc::new(ProbeClient::with_proxy(
        cfg.probe.timeout(),
        cfg.probe.sev_1_apps.clone(),
        cfg.probe.socks_proxy.as_deref(),
    ));

    let registry = Registry::new(config_store, probe, cfg.probe.vulcand.clone());
    registry.bootstrap().await.map_err(|e| format!("initial registry load failed: {e}"))?;
    registry.spawn_watch_loops();

    let sink_addr = format!("{}:{}", cfg.graphite.host, cfg.graphite.port);
    let feeder = MetricSinkFeeder::new(registry.clone(), sink_addr, cfg.environment.clone());
    tokio::spawn(feeder.run());

    #[cfg(feature = "metrics")]
    let metrics_handle = aggregate_healthcheck::metrics::init();

    let aggregator = Aggregator::new(registry.clone(), cfg.environment.clone());
    let state = Arc::new(AppState {
        registry,
        aggregator,
        #[cfg(feature = "metrics")]
        metrics_handle,
    });

    let app = handlers::router(state);

    info!(addr = %cfg.server.bind_addr, "starting server");
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
