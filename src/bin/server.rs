use cityslicker_server::{Config, Server, World};
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// City catalogue (TOML) to serve
    #[arg(short, long)]
    world: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Create configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config {
            bind_addr: args.bind.clone(),
            port: args.port,
            log_level: args.log_level.clone(),
            ..Default::default()
        }
    };
    if args.world.is_some() {
        config.world_path = args.world.clone();
    }

    // Initialize tracing
    let log_level = if args.verbose {
        "debug"
    } else {
        &config.log_level
    };
    tracing_subscriber::fmt()
        .with_env_filter(format!("cityslicker_server={}", log_level))
        .init();

    info!(
        "Starting cityslicker server v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.bind_addr,
        config.port
    );

    let world = match &config.world_path {
        Some(path) => {
            let world = World::from_file(path)?;
            info!("Loaded {} cities from {}", world.len(), path);
            world
        }
        None => {
            warn!("No city catalogue given, every query will come back empty");
            World::default()
        }
    };

    let mut server = Server::start(config, world)?;

    // Setup signal handlers for graceful shutdown
    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, shutting down gracefully...");
        shutdown.shutdown();
    })?;

    if let Err(e) = server.run() {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
