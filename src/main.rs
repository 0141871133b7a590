//! Mesh relay daemon binary.
//!
//! Runs either a mesh node or the coordinating server, depending on the
//! selected role.

use clap::{Parser, ValueEnum};
use meshrelay::{Config, Node, Server};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Which process to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Role {
    /// A mesh node.
    Node,
    /// The coordinating server.
    Server,
}

/// Mesh relay daemon
#[derive(Parser, Debug)]
#[command(name = "meshrelay", version, about)]
struct Args {
    /// Process role
    #[arg(short, long, value_enum, default_value = "node")]
    role: Role,

    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    info!("Mesh relay starting");

    let (config, loaded_paths) = if let Some(config_path) = &args.config {
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }

    match args.role {
        Role::Node => {
            let mut node = Node::new(config);
            info!(addr = %node.addr(), state = %node.state(), "Node created");

            if let Err(e) = node.start().await {
                error!("Failed to start node: {}", e);
                std::process::exit(1);
            }

            if let Err(e) = node.run().await {
                error!("Node dispatch loop failed: {}", e);
                node.stop();
                std::process::exit(1);
            }
            node.stop();
        }
        Role::Server => {
            let mut server = Server::new(config);
            if let Err(e) = server.run().await {
                error!("Server failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}
