use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use helmdock_core::{ChartRef, TabId};
use helmdock_install::{DirChartProvider, InstallChartTabStore, LoaderConfig};
use helmdock_persist::{MemoryStorage, SqliteStorage, Storage};
use serde::Serialize;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "helmdockctl", version, about = "Helmdock install-chart tabs")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Chart directory laid out as <repo>/<name>/<version>/values.yaml
    #[arg(long = "charts-dir", global = true, env = "HELMDOCK_CHARTS_DIR", default_value = "charts")]
    charts_dir: PathBuf,

    /// Keep tab state in memory only (nothing written to HELMDOCK_DB_PATH)
    #[arg(long = "ephemeral", global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open an install tab for a chart and resolve its versions and default values
    Load {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        /// Target namespace (default: "default")
        #[arg(long = "ns")]
        namespace: Option<String>,
    },
    /// List persisted install tabs
    Tabs,
    /// Close a persisted install tab
    Close {
        tab: String,
    },
}

#[derive(Serialize)]
struct TabView {
    tab: String,
    repo: String,
    name: String,
    version: String,
    namespace: Option<String>,
    versions: Option<Vec<String>>,
    values: Option<String>,
}

fn init_tracing() {
    let env = std::env::var("HELMDOCK_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("HELMDOCK_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid HELMDOCK_METRICS_ADDR; expected host:port");
        }
    }
}

fn open_storage(ephemeral: bool) -> Result<Arc<dyn Storage>> {
    if ephemeral {
        return Ok(Arc::new(MemoryStorage::new()));
    }
    Ok(Arc::new(SqliteStorage::open_default()?))
}

fn view(store: &InstallChartTabStore, tab: &TabId) -> Option<TabView> {
    let data = store.get_data(tab)?;
    Some(TabView {
        tab: tab.to_string(),
        repo: data.repo.clone(),
        name: data.name.clone(),
        version: data.version.clone(),
        namespace: data.namespace.clone(),
        versions: store.versions().get_data(tab).map(|v| v.as_ref().clone()),
        values: data.values.clone(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let provider = Arc::new(DirChartProvider::new(&cli.charts_dir));
    let store = InstallChartTabStore::new(provider.clone(), provider)
        .with_config(LoaderConfig::from_env())
        .with_storage(open_storage(cli.ephemeral)?);
    store.restore();

    match cli.command {
        Commands::Load { repo, name, version, namespace } => {
            let chart = ChartRef { repo, name, version };
            info!(chart = %chart, dir = %cli.charts_dir.display(), "load invoked");
            let tab = store.open_tab(&chart, namespace);
            if let Err(e) = store.load_data(&tab).await {
                error!(tab = %tab, error = %e, "load failed");
                store.close_tab(&tab);
                return Err(anyhow!("loading {}: {}", chart, e));
            }
            let v = view(&store, &tab).ok_or_else(|| anyhow!("tab {} vanished", tab))?;
            match cli.output {
                Output::Human => {
                    println!("TAB       {}", v.tab);
                    println!("CHART     {}/{}@{}", v.repo, v.name, v.version);
                    println!("VERSIONS  {}", v.versions.as_deref().unwrap_or_default().join(", "));
                    match &v.values {
                        Some(values) => println!("VALUES\n{}", values),
                        None => println!("VALUES    (not available yet)"),
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&v)?),
            }
        }
        Commands::Tabs => {
            let tabs: Vec<TabView> = store.data().tab_ids().iter().filter_map(|t| view(&store, t)).collect();
            match cli.output {
                Output::Human => {
                    println!("{:<38} {:<28} {:<12} NAMESPACE", "TAB", "CHART", "VERSION");
                    for t in &tabs {
                        let ns = t.namespace.as_deref().unwrap_or("-");
                        println!("{:<38} {:<28} {:<12} {}", t.tab, format!("{}/{}", t.repo, t.name), t.version, ns);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&tabs)?),
            }
        }
        Commands::Close { tab } => {
            let tab = TabId::from(tab);
            if store.get_data(&tab).is_none() {
                return Err(anyhow!("no such tab: {}", tab));
            }
            store.close_tab(&tab);
            println!("closed {}", tab);
        }
    }
    Ok(())
}
