use crate::config::DeckConfig;
use crate::obs::ConnectionStatus;
use std::sync::Arc;

/// Events flowing through the broadcast channel connecting all subsystems.
#[derive(Debug, Clone)]
pub enum DeckEvent {
    /// A button was activated, identified by id or display name.
    ButtonPressed(String),

    /// Control-server connection status transition, republished for
    /// status indicators.
    StatusChanged(ConnectionStatus),

    /// Configuration documents were reloaded from disk.
    ConfigReloaded(Arc<DeckConfig>),

    /// Shutdown the daemon.
    Shutdown,
}
