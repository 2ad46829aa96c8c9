use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use shade_coordinator::config::{
    CoordinatorSettings, DeviceConfig, DeviceStore, DeviceUpdate, SettingsLoader,
};
use shade_coordinator::transport::check_endpoint;
use shade_coordinator::{BreachChecker, CollectorClient, Coordinator, CoordinatorServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shade", version, about = "Shade password monitor coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (defaults to ./shade.yaml, then ~/.shade/config.yaml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Accept logins from page agents
    Serve {
        /// Listen port on 127.0.0.1; 0 picks a free port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print this device's id
    DeviceId,
    /// Inspect or change the device config
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Check the configured token against the collector
    VerifyToken,
    /// Look up a SHA-1 password hash in the breach corpus
    CheckHash {
        /// 40 hex characters
        hash: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set(SetArgs),
}

#[derive(Args)]
struct SetArgs {
    /// Collector base URL
    #[arg(long)]
    api: Option<String>,
    /// Collector bearer token
    #[arg(long)]
    token: Option<String>,
    #[arg(long, conflicts_with = "disable")]
    enable: bool,
    #[arg(long)]
    disable: bool,
    /// Only report usernames containing this; repeatable
    #[arg(long = "filter")]
    filters: Vec<String>,
    #[arg(long)]
    clear_filters: bool,
}

impl SetArgs {
    fn into_update(self) -> DeviceUpdate {
        let enabled = match (self.enable, self.disable) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        DeviceUpdate {
            api: self.api,
            token: self.token,
            enabled,
            add_filters: self.filters,
            clear_filters: self.clear_filters,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.settings {
        Some(path) => SettingsLoader::load_from(path)
            .await
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => SettingsLoader::default().load().await?.settings,
    };
    let store = DeviceStore::new(settings.device_config_path());

    match cli.command {
        Command::Serve { port } => serve(settings, port).await,
        Command::DeviceId => {
            println!("{}", store.device_id().await?);
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                print_config(&store.load().await?)?;
                Ok(())
            }
            ConfigAction::Set(args) => {
                let config = store.update(&args.into_update()).await?;
                print_config(&config)?;
                Ok(())
            }
        },
        Command::VerifyToken => verify_token(&settings, &store).await,
        Command::CheckHash { hash } => {
            let checker = BreachChecker::new(&settings.breach)?;
            let count = checker.check_hash(&hash).await?;
            if count == 0 {
                println!("not found in known breaches");
            } else {
                println!("found in {} breaches", count);
            }
            Ok(())
        }
    }
}

async fn serve(mut settings: CoordinatorSettings, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        settings.port = port;
    }

    let coordinator = Arc::new(Coordinator::from_settings(&settings)?);
    let device_id = coordinator.store().device_id().await?;
    info!(%device_id, "device ready");

    let handle = CoordinatorServer::new(coordinator.clone(), settings.port)
        .start()
        .await?;
    println!("listening on ws://{}", handle.local_addr());

    let sweeper = coordinator.breach().spawn_sweeper(handle.shutdown_token());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.shutdown().await;
    sweeper.await?;
    Ok(())
}

async fn verify_token(settings: &CoordinatorSettings, store: &DeviceStore) -> Result<()> {
    let config = store.load().await?;
    if config.api.is_empty() {
        bail!("no collector configured, set one with `shade config set --api <url>`");
    }
    let api = check_endpoint(&config.api)?;

    let client = CollectorClient::new(&settings.collector)?;
    if client.verify_token(&api, &config.token).await? {
        println!("token accepted by {}", api);
        Ok(())
    } else {
        bail!("token rejected by {}", api)
    }
}

fn print_config(config: &DeviceConfig) -> Result<()> {
    let mut shown = config.clone();
    if !shown.token.is_empty() {
        shown.token = "********".into();
    }
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}
