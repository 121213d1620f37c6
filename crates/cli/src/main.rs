mod config_commands;
mod serve;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    tgdrive_config::TgdriveConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "tgdrive", about = "tgdrive: relay Telegram files into Google Drive")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (defaults to ./tgdrive.toml, then ~/.config/tgdrive/).
    #[arg(long, short, global = true, env = "TGDRIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind the upload server to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value and PORT).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot and the upload server (default when no subcommand is provided).
    Serve,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// File (explicit or discovered), then environment, then CLI flags.
fn resolve_config(
    path: Option<&Path>,
    bind: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<TgdriveConfig> {
    let mut config = match path {
        Some(path) => tgdrive_config::load_config(path)?,
        None => tgdrive_config::discover_and_load(),
    };
    tgdrive_config::apply_env_overrides(&mut config)?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "tgdrive starting");

    let config = resolve_config(cli.config.as_deref(), cli.bind, cli.port)?;

    match cli.command {
        None | Some(Commands::Serve) => serve::run(config).await,
        Some(Commands::Config { action }) => config_commands::handle_config(action, &config),
    }
}
