use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pongbot")]
#[command(about = "Slack bot that answers \"hello\" and \"ping\"", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Connect to Slack and start answering messages. Credentials come from SLACK_APP_LEVEL_TOKEN, SLACK_BOT_TOKEN and SLACK_SIGNING_SECRET (environment or .env), or the config file.
    Start {
        /// Config file path (default: PONGBOT_CONFIG_PATH or ~/.pongbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP listener port (default from PORT, the config file, or 3000)
        #[arg(long, short)]
        port: Option<u16>,

        /// Env file to load before reading the environment (default: .env in the working directory, if present)
        #[arg(long, value_name = "PATH")]
        env_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            init_logger();
            println!("pongbot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Start {
            config,
            port,
            env_file,
        }) => {
            // RUST_LOG may be set in the env file, so load it before the logger.
            let loaded = load_env_file(env_file.as_deref());
            init_logger();
            if let Err(e) = loaded {
                log::error!("loading env file failed: {}", e);
                std::process::exit(1);
            }
            if let Err(e) = run_start(config, port).await {
                log::error!("start failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}

/// Load `path` (must exist) or `.env` (optional). Existing environment variables win.
fn load_env_file(path: Option<&std::path::Path>) -> anyhow::Result<()> {
    match path {
        Some(p) => {
            dotenvy::from_path(p)?;
        }
        None => match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

async fn run_start(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = pongbot::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    config.apply_process_env()?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    let settings = pongbot::config::Settings::resolve(&config)?;
    log::info!(
        "starting pongbot on {}:{} ({} mode)",
        settings.bind,
        settings.port,
        settings.mode_name()
    );
    pongbot::gateway::run_gateway(&settings).await
}
