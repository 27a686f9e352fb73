//! Action executor: runs a single side-effecting action against the
//! current connection state and reports the result. Stateless.

pub mod command;

pub use command::CommandOutput;

use crate::config::schema::{ButtonAction, ButtonDefinition};
use crate::error::Result;
use crate::obs::{ConnectionStatus, ObsHandle};
use std::time::SystemTime;
use tracing::{error, info};

/// Start/end timestamps of an activation, so a caller can render a
/// momentary pressed state. Advisory telemetry, not part of the
/// correctness contract.
#[derive(Debug, Clone, Copy)]
pub struct Pulse {
    pub started: SystemTime,
    pub ended: SystemTime,
}

/// What a single activation did.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub pulse: Pulse,
    pub command: Option<CommandOutput>,
    pub scene_switched: Option<String>,
}

/// Execute one action.
///
/// `RunCommand` shells out and captures the result regardless of
/// connection state. `SwitchScene` requires a live session; when not
/// connected it first makes one advisory connect attempt with the
/// manager's current parameters (the historical per-click reconnect),
/// then issues exactly one `SetCurrentScene` call.
///
/// # Errors
/// `DeckError::Spawn` if the command cannot be started;
/// `DeckError::Connect` if the advisory attempt fails;
/// `DeckError::RemoteCall`/`NotConnected`/`CallTimeout` from the call
/// itself. A non-zero command exit is reported in the outcome, not as
/// an error.
pub async fn execute(action: &ButtonAction, obs: &ObsHandle) -> Result<ExecutionOutcome> {
    let started = SystemTime::now();
    let mut command_output = None;
    let mut scene_switched = None;

    match action {
        ButtonAction::RunCommand { command } => {
            info!("running command: {command}");
            command_output = Some(command::run(command).await?);
        }
        ButtonAction::SwitchScene { scene_name } => {
            if obs.status() != ConnectionStatus::Connected {
                info!("not connected, attempting one-shot connect");
                obs.connect_now().await?;
            }
            info!("switching scene: {scene_name}");
            obs.set_current_scene(scene_name).await?;
            scene_switched = Some(scene_name.clone());
        }
    }

    Ok(ExecutionOutcome {
        pulse: Pulse {
            started,
            ended: SystemTime::now(),
        },
        command: command_output,
        scene_switched,
    })
}

/// Fire every action a button carries, in order, merging the results
/// into one outcome. The actions are independent: a failing command
/// does not stop the scene switch, or vice versa. The first error is
/// returned after all actions have been attempted.
///
/// # Errors
/// The first error any action produced; see [`execute`].
pub async fn activate(button: &ButtonDefinition, obs: &ObsHandle) -> Result<ExecutionOutcome> {
    let started = SystemTime::now();
    let mut command_output = None;
    let mut scene_switched = None;
    let mut first_error = None;

    for action in button.actions() {
        match execute(&action, obs).await {
            Ok(outcome) => {
                command_output = command_output.or(outcome.command);
                scene_switched = scene_switched.or(outcome.scene_switched);
            }
            Err(e) => {
                error!("button '{}': {e}", button.name);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(ExecutionOutcome {
            pulse: Pulse {
                started,
                ended: SystemTime::now(),
            },
            command: command_output,
            scene_switched,
        }),
    }
}
