use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::{info, LevelFilter};

use crate::config::{ApiMode, ServerConfig};
use crate::state::AppState;

mod analyzer;
mod config;
mod error;
mod routes;
mod source;
mod state;

#[derive(Parser, Debug)]
#[command(author, version, about = "planetsight: transit candidate classification service")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Socket address to listen on
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Port to listen on, keeping the configured host
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Train/predict contract to expose
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Increase output verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Stateful,
    Stateless,
}

impl From<ModeArg> for ApiMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Stateful => ApiMode::Stateful,
            ModeArg::Stateless => ApiMode::Stateless,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(port) = cli.port {
        config.bind.set_port(port);
    }
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    config.validate()?;

    let state = AppState::from_config(&config);
    info!(
        target: "planetsight_server",
        "Serving {:?} API with {} analyzer",
        config.mode,
        state.analyzer.name()
    );
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    println!("PlanetSight server running at http://{}", config.bind);
    axum::serve(listener, app).await.context("server terminated")?;

    Ok(())
}

fn init_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    builder.filter_level(level);
    builder.try_init().map_err(|err| err.into())
}
