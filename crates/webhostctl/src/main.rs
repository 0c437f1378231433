use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use common::ServerMode;
use host_manager::{api, HostConfig, Manager};
use instance_http::{InstanceConfig, InstanceServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod console;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let format = std::env::var("WEBHOST_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

        if format.eq_ignore_ascii_case("json") {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter.clone())
                .with_writer(std::io::stderr)
                .with_target(true)
                .json()
                .flatten_event(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact()
                .init();
        }
    });
}

#[derive(Parser)]
#[command(name = "webhostctl")]
#[command(about = "Manage site, storage and neuro web servers", long_about = None)]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PathArgs {
    /// Directory holding every server's storage/ and site/
    #[arg(long, global = true, env = "WEBHOST_ROOT")]
    root: Option<PathBuf>,
    /// Registry file
    #[arg(long, global = true, env = "WEBHOST_REGISTRY")]
    registry: Option<PathBuf>,
    /// Seconds to wait for an instance to exit before killing it
    #[arg(long, global = true, env = "WEBHOST_STOP_TIMEOUT_SECS")]
    stop_timeout_secs: Option<u64>,
    /// Address stored in new entries instead of the detected LAN address
    #[arg(long = "bind-host", global = true, env = "WEBHOST_HOST")]
    bind_host: Option<String>,
}

impl PathArgs {
    fn into_config(self) -> HostConfig {
        let mut config = HostConfig::from_env();
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(registry) = self.registry {
            config.registry_path = registry;
        }
        if let Some(secs) = self.stop_timeout_secs {
            config.stop_timeout = Duration::from_secs(secs);
        }
        if let Some(host) = self.bind_host {
            config.host = Some(host);
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive console: create, start, stop, delete, edit and list servers
    Console,
    /// Serve the JSON management API
    Api {
        #[arg(long, default_value = "127.0.0.1:7070")]
        listen: SocketAddr,
    },
    /// Print the registry (no live state; instances belong to a running manager)
    List,
    /// Run one managed instance in the foreground
    #[command(hide = true)]
    Serve {
        #[arg(long)]
        name: String,
        #[arg(long)]
        mode: ServerMode,
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: u16,
        #[arg(long, default_value_t = common::DEFAULT_MAX_GB)]
        max_gb: f64,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.paths.into_config();

    match cli.command {
        Commands::Console => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let manager = Manager::open(config)?;
                let outcome = console::run(&manager).await;
                manager.shutdown().await;
                outcome
            })?;
        }
        Commands::Api { listen } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let manager = Arc::new(Manager::open(config)?);
                let outcome = api::serve(Arc::clone(&manager), listen, async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await;
                manager.shutdown().await;
                outcome
            })?;
        }
        Commands::List => {
            print_registry(&config)?;
        }
        Commands::Serve {
            name,
            mode,
            host,
            port,
            max_gb,
        } => {
            let instance = InstanceConfig::prepare(&config.root, &name, mode, &host, port, max_gb)?;
            info!(server = %name, %mode, "starting instance");

            let rt = tokio::runtime::Runtime::new()?;
            if let Err(err) = rt.block_on(InstanceServer::new(instance).run()) {
                error!(server = %name, error = %err, "instance failed");
                return Err(err);
            }
        }
    }

    Ok(())
}

fn print_registry(config: &HostConfig) -> Result<()> {
    let entries = server_registry::load_entries(&config.registry_path)?;
    if entries.is_empty() {
        println!("(no servers)");
        return Ok(());
    }
    println!("Name\tMode\tURL\tMax GB");
    for entry in entries {
        println!("{}\t{}\t{}\t{}", entry.name, entry.mode, entry.url(), entry.max_gb);
    }
    Ok(())
}
