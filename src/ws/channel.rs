//! Outbound half of a client connection as seen by the simulation

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::game::EntityId;

use super::protocol::{DespawnNotice, EntityState, IdentityReply, Push, ServerMsg};

/// Non-blocking sender into a connection's writer task.
///
/// The simulation never awaits the network: a full buffer drops the frame
/// for this client only. Frames to a closed channel are discarded; the
/// world despawns the player on its next flush.
#[derive(Debug, Clone)]
pub struct ClientChannel {
    tx: mpsc::Sender<ServerMsg>,
}

impl ClientChannel {
    /// Create a channel pair with `buffer` frames of headroom.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    pub fn reply(&self, request: u64, id: EntityId) {
        self.send(ServerMsg::Reply {
            reply: request,
            data: IdentityReply { id },
        });
    }

    pub fn push_set(&self, batch: Vec<EntityState>) {
        self.send(ServerMsg::Push(Push::Set(batch)));
    }

    pub fn push_despawn(&self, id: EntityId) {
        self.send(ServerMsg::Push(Push::Despawn(DespawnNotice { id })));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, msg: ServerMsg) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Client outbound buffer full, dropping frame");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Client channel closed, dropping frame");
            }
        }
    }
}
