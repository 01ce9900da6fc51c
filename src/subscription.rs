use crate::error::{AmpError, Result};
use crate::zone::ZoneSnapshot;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the zone update channel
pub(crate) const UPDATE_CHANNEL_CAPACITY: usize = 100;

/// Notification for the host after zone state changes
#[derive(Debug, Clone)]
pub enum ZoneUpdate {
    /// Zone state was written (user command or poll reconciliation)
    StateChanged(Box<ZoneSnapshot>),

    /// A poll cycle could not reach the amplifier; state is unchanged
    RefreshFailed { entry_id: Uuid, reason: String },
}

impl ZoneUpdate {
    /// Entry the update belongs to
    pub fn entry_id(&self) -> Uuid {
        match self {
            ZoneUpdate::StateChanged(snapshot) => snapshot.entry_id,
            ZoneUpdate::RefreshFailed { entry_id, .. } => *entry_id,
        }
    }
}

/// Receiver for zone updates
pub struct StateReceiver {
    rx: broadcast::Receiver<ZoneUpdate>,
}

impl StateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<ZoneUpdate>) -> Self {
        Self { rx }
    }

    /// Receive the next update.
    ///
    /// Fails once every sender is gone or when this receiver fell behind.
    pub async fn recv(&mut self) -> Result<ZoneUpdate> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => AmpError::UpdatesClosed,
            broadcast::error::RecvError::Lagged(n) => {
                AmpError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Take an update if one is waiting
    pub fn try_recv(&mut self) -> Option<ZoneUpdate> {
        loop {
            match self.rx.try_recv() {
                Ok(update) => return Some(update),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::debug!("Update receiver lagged by {} messages", n);
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(entry_id: Uuid) -> ZoneUpdate {
        ZoneUpdate::RefreshFailed {
            entry_id,
            reason: "timeout".to_string(),
        }
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (tx, rx) = broadcast::channel(4);
        let mut receiver = StateReceiver::new(rx);
        let id = Uuid::new_v4();

        tx.send(failure(id)).unwrap();
        drop(tx);
        assert_eq!(receiver.recv().await.unwrap().entry_id(), id);
        assert!(matches!(receiver.recv().await, Err(AmpError::UpdatesClosed)));
    }

    #[tokio::test]
    async fn test_lagged_receiver() {
        let (tx, rx) = broadcast::channel(1);
        let mut receiver = StateReceiver::new(rx);

        tx.send(failure(Uuid::new_v4())).unwrap();
        tx.send(failure(Uuid::new_v4())).unwrap();
        assert!(matches!(receiver.recv().await, Err(AmpError::ChannelError(_))));
        assert!(receiver.recv().await.is_ok());
    }

    #[test]
    fn test_try_recv_skips_lag() {
        let (tx, rx) = broadcast::channel(1);
        let mut receiver = StateReceiver::new(rx);
        let last = Uuid::new_v4();

        tx.send(failure(Uuid::new_v4())).unwrap();
        tx.send(failure(last)).unwrap();
        assert_eq!(receiver.try_recv().map(|u| u.entry_id()), Some(last));
        assert!(receiver.try_recv().is_none());
    }
}
