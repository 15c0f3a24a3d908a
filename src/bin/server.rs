use std::sync::Arc;

use log::{error, info, warn};

use rusty_realm::config::ServerConfig;
use rusty_realm::core::{RouterTable, Server};
use rusty_realm::handlers::{register_routes, SessionHooks};
use rusty_realm::world::World;

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    }

    if let Err(e) = run().await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> rusty_realm::Result<()> {
    let config = ServerConfig::from_env()?;
    info!("Configuration: host={}, port={}, workers={}, save_path={}",
          config.host, config.port, config.worker_pool_size, config.save_path.display());

    let world = Arc::new(World::from_config(&config)?);

    let mut routes = RouterTable::new();
    register_routes(&mut routes, Arc::clone(&world))?;

    let hooks = Arc::new(SessionHooks::new(Arc::clone(&world)));
    let server = Arc::new(Server::new(config, routes, hooks));
    server.start().await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    server.stop().await;
    info!("{} actors still registered at exit", world.registry().count());
    Ok(())
}
