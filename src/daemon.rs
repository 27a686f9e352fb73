use crate::action;
use crate::config::watcher;
use crate::config::DeckConfig;
use crate::error::Result;
use crate::event::DeckEvent;
use crate::obs::{ObsHandle, ObsManager};
use crate::scenes::{SceneDirectory, SETTLE_DELAY};
use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Run the obsdeck daemon.
///
/// Maintains the control-server connection, keeps the scene cache
/// warm, reloads config on change, and dispatches button activations
/// arriving on the stdin control interface.
///
/// # Errors
/// Returns `DeckError` if a fatal error occurs in any subsystem.
pub async fn run(config: DeckConfig, config_dir: PathBuf) -> Result<()> {
    // First run: the watcher needs the directory to exist.
    std::fs::create_dir_all(&config_dir)?;

    let cancel = CancellationToken::new();
    let (tx, _) = broadcast::channel::<DeckEvent>(CHANNEL_CAPACITY);

    let retry_interval = Duration::from_millis(config.settings.retry_interval_ms);
    let shared_config = Arc::new(ArcSwap::from_pointee(config));

    let obs = ObsManager::spawn(retry_interval, cancel.clone());
    let scenes = SceneDirectory::spawn(obs.clone(), SETTLE_DELAY, cancel.clone());

    {
        let config = shared_config.load();
        if config.settings.is_configured() {
            obs.configure(config.settings.connection_params());
        } else {
            warn!("control server not configured; scene buttons will fail until settings.json is filled in");
        }
    }

    spawn_status_forwarder(&tx, &cancel, &obs);
    let watcher_handle = spawn_config_watcher(&tx, &cancel, &config_dir);
    spawn_control_loop(&tx, &cancel, &obs, &scenes, &shared_config);

    let mut rx = tx.subscribe();
    info!(
        "obsdeck daemon running, {} buttons",
        shared_config.load().registry.buttons.len()
    );

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            () = async { tokio::signal::ctrl_c().await.ok(); } => {
                info!("received SIGINT, shutting down");
                cancel.cancel();
                break;
            }
            event = rx.recv() => {
                match event {
                    Ok(e) => e,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("event loop lagged, missed {n} events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        if handle_event(event, &shared_config, &obs) {
            cancel.cancel();
            break;
        }
    }

    info!("daemon shutting down...");
    cancel.cancel();

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = watcher_handle.await;
    })
    .await;

    info!("daemon stopped");
    Ok(())
}

fn spawn_status_forwarder(
    tx: &broadcast::Sender<DeckEvent>,
    cancel: &CancellationToken,
    obs: &ObsHandle,
) -> tokio::task::JoinHandle<()> {
    let mut status_rx = obs.subscribe();
    let tx = tx.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                status = status_rx.recv() => match status {
                    Some(status) => {
                        let _ = tx.send(DeckEvent::StatusChanged(status));
                    }
                    None => break,
                }
            }
        }
    })
}

fn spawn_config_watcher(
    tx: &broadcast::Sender<DeckEvent>,
    cancel: &CancellationToken,
    config_dir: &std::path::Path,
) -> tokio::task::JoinHandle<()> {
    let watcher_tx = tx.clone();
    let watcher_cancel = cancel.clone();
    let watcher_dir = config_dir.to_path_buf();
    tokio::spawn(async move {
        if let Err(e) = watcher::watch_config(watcher_dir, watcher_tx, watcher_cancel).await {
            error!("config watcher error: {e}");
        }
    })
}

/// Line-based control interface on stdin, the dispatch surface an
/// external UI (or a human in a terminal) drives.
fn spawn_control_loop(
    tx: &broadcast::Sender<DeckEvent>,
    cancel: &CancellationToken,
    obs: &ObsHandle,
    scenes: &SceneDirectory,
    shared_config: &Arc<ArcSwap<DeckConfig>>,
) -> tokio::task::JoinHandle<()> {
    let tx = tx.clone();
    let cancel = cancel.clone();
    let obs = obs.clone();
    let scenes = scenes.clone();
    let shared_config = Arc::clone(shared_config);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if handle_line(line.trim(), &tx, &obs, &scenes, &shared_config) {
                                break;
                            }
                        }
                        // stdin closed; keep running headless.
                        Ok(None) | Err(_) => break,
                    }
                }
            }
        }
    })
}

/// Handle one control line. Returns `true` on `quit`.
fn handle_line(
    line: &str,
    tx: &broadcast::Sender<DeckEvent>,
    obs: &ObsHandle,
    scenes: &SceneDirectory,
    shared_config: &Arc<ArcSwap<DeckConfig>>,
) -> bool {
    let (cmd, rest) = line
        .split_once(' ')
        .map_or((line, ""), |(cmd, rest)| (cmd, rest.trim()));
    match cmd {
        "" => {}
        "press" if !rest.is_empty() => {
            let _ = tx.send(DeckEvent::ButtonPressed(rest.to_string()));
        }
        "scenes" => {
            for name in scenes.current().iter() {
                println!("{name}");
            }
        }
        "status" => println!("{}", obs.status()),
        "buttons" => {
            for button in &shared_config.load().registry.buttons {
                println!("{}  {}", button.id, button.name);
            }
        }
        "quit" | "exit" => {
            let _ = tx.send(DeckEvent::Shutdown);
            return true;
        }
        _ => println!("commands: press <id|name>, scenes, status, buttons, quit"),
    }
    false
}

/// Handle a single event. Returns `true` if the daemon should shut down.
fn handle_event(
    event: DeckEvent,
    shared_config: &Arc<ArcSwap<DeckConfig>>,
    obs: &ObsHandle,
) -> bool {
    match event {
        DeckEvent::ButtonPressed(key) => {
            let config = shared_config.load();
            match config.registry.resolve(&key) {
                Some(button) if button.is_inert() => {
                    warn!("button '{}' has no actions", button.name);
                }
                Some(button) => {
                    let button = button.clone();
                    let obs = obs.clone();
                    tokio::spawn(async move {
                        match action::activate(&button, &obs).await {
                            Ok(outcome) => report_outcome(&button.name, &outcome),
                            Err(e) => error!("action error ('{}'): {e}", button.name),
                        }
                    });
                }
                None => warn!("no such button: {key}"),
            }
        }

        DeckEvent::StatusChanged(status) => {
            debug!("status indicator: {status}");
        }

        DeckEvent::ConfigReloaded(new_config) => {
            shared_config.store(Arc::clone(&new_config));
            if new_config.settings.is_configured() {
                obs.configure(new_config.settings.connection_params());
            } else {
                obs.disconnect();
            }
        }

        DeckEvent::Shutdown => {
            info!("shutdown event received");
            return true;
        }
    }

    false
}

fn report_outcome(name: &str, outcome: &action::ExecutionOutcome) {
    if let Some(command) = &outcome.command {
        if command.success() {
            info!("button '{name}': command ok");
        } else {
            warn!(
                "button '{name}': command exited {:?}",
                command.exit_code
            );
        }
    }
    if let Some(scene) = &outcome.scene_switched {
        info!("button '{name}': switched to scene '{scene}'");
    }
}
