use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wifi_warden::{
    ApController, ConfigStore, NetworkAdapter, NmcliAdapter, PingProber, connection, inventory,
    scan, server,
};

#[derive(Parser)]
#[command(name = "wifi-warden")]
#[command(about = "Manage uplink WiFi and a connectivity-driven fallback access point")]
#[command(version)]
struct Cli {
    /// Path to the AP configuration file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: monitor connectivity and serve the HTTP API
    Run {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Do not start the connectivity monitor loop
        #[arg(long)]
        no_monitor: bool,
    },

    /// List wireless interfaces and their assigned roles
    ListInterfaces,

    /// Scan for WiFi networks on the client radio
    Scan {
        /// Interface to use (defaults to the resolved client radio)
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Connect the client radio to a WiFi network
    Connect {
        /// SSID of the network to connect to
        ssid: String,

        /// Password for the network (omit for open networks)
        #[arg(short, long)]
        password: Option<String>,

        /// Interface to use (defaults to the resolved client radio)
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Disconnect the client radio from its current network
    Disconnect {
        /// Interface to disconnect (defaults to the resolved client radio)
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Show client radio connection status
    Status {
        /// Interface to check (defaults to the resolved client radio)
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Bring up the fallback access point
    ApStart,

    /// Take down the fallback access point
    ApStop,

    /// Show access point and monitoring status
    ApStatus,

    /// Show the persisted configuration (passphrase masked)
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = config_store(cli.config)?;

    match cli.command {
        Commands::Run { port, no_monitor } => cmd_run(store, port, no_monitor).await,
        Commands::ListInterfaces => cmd_list_interfaces(store).await,
        Commands::Scan { interface } => cmd_scan(store, interface.as_deref()).await,
        Commands::Connect {
            ssid,
            password,
            interface,
        } => cmd_connect(store, &ssid, password.as_deref(), interface.as_deref()).await,
        Commands::Disconnect { interface } => cmd_disconnect(store, interface.as_deref()).await,
        Commands::Status { interface } => cmd_status(store, interface.as_deref()).await,
        Commands::ApStart => cmd_ap_start(store).await,
        Commands::ApStop => cmd_ap_stop().await,
        Commands::ApStatus => cmd_ap_status(store).await,
        Commands::ShowConfig => cmd_show_config(store),
    }
}

fn config_store(path: Option<PathBuf>) -> Result<ConfigStore> {
    let path = match path {
        Some(path) => path,
        None => ConfigStore::default_path()?,
    };
    Ok(ConfigStore::new(path))
}

/// Resolves the radio assignment and builds a fully wired controller.
/// Fails hard on insufficient hardware: the process must not proceed
/// without isolated AP and client radios.
async fn build_controller(store: ConfigStore) -> Result<Arc<ApController>> {
    let adapter: Arc<dyn NetworkAdapter> = Arc::new(NmcliAdapter::new());
    let config = store.load();

    let assignment = inventory::discover(adapter.as_ref(), &config)
        .await
        .context("radio discovery failed")?;

    let prober = Arc::new(PingProber::new(Arc::clone(&adapter)));
    Ok(Arc::new(ApController::new(
        adapter, prober, store, config, assignment,
    )))
}

/// Client interface: explicit flag wins, otherwise the resolved assignment.
async fn resolve_client_interface(store: ConfigStore, interface: Option<&str>) -> Result<String> {
    if let Some(name) = interface {
        return Ok(name.to_string());
    }
    let adapter = NmcliAdapter::new();
    let config = store.load();
    let assignment = inventory::discover(&adapter, &config)
        .await
        .context("radio discovery failed")?;
    Ok(assignment.client_interface)
}

async fn cmd_run(store: ConfigStore, port: u16, no_monitor: bool) -> Result<()> {
    let controller = build_controller(store).await?;

    if no_monitor {
        info!("connectivity monitoring disabled");
    } else {
        controller.start_monitoring().await;
    }

    // SIGTERM/SIGINT stop the server; monitoring (and with it the AP) is
    // shut down before the process exits.
    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    server::run_server(Arc::clone(&controller), port, shutdown).await?;

    let outcome = controller.stop_monitoring().await;
    if !outcome.success {
        error!(message = %outcome.message, "shutdown teardown failed");
    }
    info!("shutdown complete");
    Ok(())
}

async fn watch_signals(shutdown: CancellationToken) {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(signal) => signal,
        Err(err) => {
            error!(%err, "failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}

async fn cmd_list_interfaces(store: ConfigStore) -> Result<()> {
    let adapter = NmcliAdapter::new();
    let devices = adapter.list_wireless_devices().await?;

    if devices.is_empty() {
        println!("No wireless interfaces found.");
        return Ok(());
    }

    let config = store.load();
    let assignment = inventory::discover(&adapter, &config).await.ok();

    println!("{:<16} {:<14} {}", "INTERFACE", "STATE", "ROLE");
    println!("{}", "-".repeat(44));

    for device in devices {
        let role = match &assignment {
            Some(a) if a.ap_interface == device.name => "access point",
            Some(a) if a.client_interface == device.name => "client",
            _ => "-",
        };
        println!("{:<16} {:<14} {}", device.name, device.state, role);
    }

    Ok(())
}

async fn cmd_scan(store: ConfigStore, interface: Option<&str>) -> Result<()> {
    let interface = resolve_client_interface(store, interface).await?;
    println!("Scanning on interface: {}", interface);
    println!();

    let networks = scan::scan_networks(&interface).await?;
    scan::display_networks(&networks);

    Ok(())
}

async fn cmd_connect(
    store: ConfigStore,
    ssid: &str,
    password: Option<&str>,
    interface: Option<&str>,
) -> Result<()> {
    let interface = resolve_client_interface(store, interface).await?;
    println!("Connecting to '{}' on interface {}...", ssid, interface);

    connection::connect(&interface, ssid, password.unwrap_or_default()).await?;
    println!("Connected successfully!");

    println!();
    let status = connection::status(&interface).await?;
    connection::display_status(&status);

    Ok(())
}

async fn cmd_disconnect(store: ConfigStore, interface: Option<&str>) -> Result<()> {
    let interface = resolve_client_interface(store, interface).await?;
    println!("Disconnecting interface {}...", interface);

    connection::disconnect(&interface).await?;
    println!("Disconnected.");

    Ok(())
}

async fn cmd_status(store: ConfigStore, interface: Option<&str>) -> Result<()> {
    let interface = resolve_client_interface(store, interface).await?;
    let status = connection::status(&interface).await?;
    connection::display_status(&status);

    Ok(())
}

async fn cmd_ap_start(store: ConfigStore) -> Result<()> {
    let controller = build_controller(store).await?;

    let outcome = controller.setup().await;
    println!("{}", outcome.message);
    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Tears the AP down through the adapter directly: activation state is
/// per-process, so a profile left up by an earlier run must still go away.
async fn cmd_ap_stop() -> Result<()> {
    let adapter = NmcliAdapter::new();

    if let Err(err) = adapter.deactivate_profile(wifi_warden::AP_PROFILE_NAME).await {
        // Profile may simply not be active
        info!(%err, "deactivate reported an error, continuing with delete");
    }
    adapter
        .delete_profile(wifi_warden::AP_PROFILE_NAME)
        .await
        .context("failed to delete access point profile")?;

    println!("Access point stopped.");
    Ok(())
}

async fn cmd_ap_status(store: ConfigStore) -> Result<()> {
    let controller = build_controller(store).await?;

    let status = controller.status().await;
    println!("AP active:    {}", status.active);
    println!("Monitoring:   {}", status.monitoring);
    println!("SSID:         {}", status.ssid);
    println!("AP radio:     {}", status.ap_interface);
    println!("Client radio: {}", status.client_interface);
    println!(
        "Uplink:       link={} internet={}",
        status.connectivity.has_link, status.connectivity.has_internet
    );

    Ok(())
}

fn cmd_show_config(store: ConfigStore) -> Result<()> {
    println!("Config file: {}", store.path().display());
    println!();

    let config = store.load().masked();
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
