//! gitsvn server binary
//!
//! # Usage
//!
//! ```bash
//! gitsvn --config /etc/gitsvn.toml
//! gitsvn --config gitsvn.toml --host 127.0.0.1 --port 3690
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use gitsvn::server::{ServerSettings, SvnServer};
use gitsvn::{Config, LocalUserDirectory, RepositoryMapping, SharedContextBuilder, SqliteStore};

/// Subversion server for git repositories
#[derive(Parser, Debug)]
#[command(name = "gitsvn")]
#[command(about = "Serve git branches to Subversion clients over svn://")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "GITSVN_CONFIG", default_value = "gitsvn.toml")]
    config: PathBuf,

    /// Host to bind to, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load_from(&args.config)?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("gitsvn={}", config.logging.level).parse()?),
        )
        .init();

    let cache_path = config.cache_path();
    tracing::info!("Revision cache at {}", cache_path.display());
    let store = Arc::new(SqliteStore::open(&cache_path)?);
    let users = Arc::new(LocalUserDirectory::from_config(&config.users));
    let mapping = Arc::new(RepositoryMapping::from_config(&config, store.clone())?);

    // closed in reverse order on shutdown
    let mut builder = SharedContextBuilder::new();
    builder.add(store)?;
    builder.add(users)?;
    builder.add(mapping)?;
    let shared = builder.ready().await?;

    let server = SvnServer::bind(
        &config.listen_address(),
        ServerSettings::from_config(&config),
        shared,
    )
    .await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, stopping");
    server.shutdown().await?;
    Ok(())
}
