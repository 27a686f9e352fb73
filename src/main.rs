use clap::{Parser, Subcommand};
use obsdeck::config::DeckConfig;
use obsdeck::obs::ObsManager;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// obsdeck — headless macro deck for OBS scene control
#[derive(Parser)]
#[command(name = "obsdeck", version, about)]
struct Cli {
    /// Path to the config directory (default: the platform config dir).
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Enable JSON log output (for journald).
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Run,

    /// Activate one button by id or display name, then exit.
    Press { button: String },

    /// Connect to the control server, print the scene list, and exit.
    Scenes,

    /// Validate the config documents and exit.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Init tracing.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("obsdeck=info"));

    if cli.json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => directories::ProjectDirs::from("", "", "obsdeck")
            .ok_or_else(|| {
                anyhow::anyhow!("could not determine a config directory, pass --config-dir")
            })?
            .config_dir()
            .to_path_buf(),
    };

    let config = obsdeck::config::load(&config_dir)?;

    match cli.command {
        Command::Check => {
            println!(
                "config OK: {} buttons, control server {}",
                config.registry.buttons.len(),
                if config.settings.is_configured() {
                    "configured"
                } else {
                    "not configured"
                },
            );
        }

        Command::Run => {
            info!("obsdeck v{}", env!("CARGO_PKG_VERSION"));
            info!("loaded config: {} buttons", config.registry.buttons.len());
            obsdeck::daemon::run(config, config_dir).await?;
        }

        Command::Press { button } => press(&config, &button).await?,

        Command::Scenes => scenes(&config).await?,
    }

    Ok(())
}

/// One-shot dispatch of a single button.
async fn press(config: &DeckConfig, key: &str) -> anyhow::Result<()> {
    let button = config
        .registry
        .resolve(key)
        .ok_or_else(|| anyhow::anyhow!("no such button: {key}"))?;
    if button.is_inert() {
        anyhow::bail!("button '{}' has no actions", button.name);
    }

    let cancel = CancellationToken::new();
    let obs = ObsManager::spawn(
        Duration::from_millis(config.settings.retry_interval_ms),
        cancel.clone(),
    );
    if config.settings.is_configured() {
        obs.configure(config.settings.connection_params());
    }

    let outcome = obsdeck::action::activate(button, &obs).await;
    cancel.cancel();
    let outcome = outcome?;

    if let Some(command) = &outcome.command {
        print!("{}", command.stdout);
        eprint!("{}", command.stderr);
        if !command.success() {
            eprintln!("command exited with {:?}", command.exit_code);
        }
    }
    if let Some(scene) = &outcome.scene_switched {
        println!("switched to scene '{scene}'");
    }
    Ok(())
}

/// One-shot connect and scene listing.
async fn scenes(config: &DeckConfig) -> anyhow::Result<()> {
    if !config.settings.is_configured() {
        anyhow::bail!("control server not configured; fill in settings.json first");
    }

    let cancel = CancellationToken::new();
    let obs = ObsManager::spawn(
        Duration::from_millis(config.settings.retry_interval_ms),
        cancel.clone(),
    );
    obs.configure(config.settings.connection_params());

    let result = async {
        obs.connect_now().await?;
        obs.list_scenes().await
    }
    .await;
    cancel.cancel();

    for name in result? {
        println!("{name}");
    }
    Ok(())
}
