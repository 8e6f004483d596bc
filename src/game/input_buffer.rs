//! Lock-free input queue between socket handlers and the tick loop.
//!
//! Every connection holds a cloned sender; the engine drains all pending
//! inputs between steps. Inputs from one socket keep their arrival
//! order; inputs from different sockets interleave, but always at a step
//! boundary.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::game::state::PlayerId;
use crate::util::vec2::Vec2;

/// One decoded `playerInput`.
#[derive(Debug, Clone, Copy)]
pub struct PlayerInput {
    pub player_id: PlayerId,
    pub movement: Vec2,
    pub shoot: bool,
}

/// Bounded MPSC input queue. A full buffer drops the input (transient
/// failure; the client resends intent continuously anyway).
pub struct InputBuffer {
    sender: Sender<PlayerInput>,
    receiver: Receiver<PlayerInput>,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Clonable handle for a connection task.
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Drain everything queued since the last step.
    pub fn drain(&self) -> Vec<PlayerInput> {
        self.receiver.try_iter().collect()
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        // Generous headroom for input bursts between ticks
        Self::new(1024)
    }
}

/// Sender half handed to socket tasks.
#[derive(Clone)]
pub struct InputSender {
    sender: Sender<PlayerInput>,
}

impl InputSender {
    /// Non-blocking submit; a full or closed buffer reports an error the
    /// caller can log at debug and drop.
    pub fn try_send(&self, input: PlayerInput) -> Result<(), InputBufferError> {
        self.sender.try_send(input).map_err(|e| match e {
            TrySendError::Full(_) => InputBufferError::Full,
            TrySendError::Disconnected(_) => InputBufferError::Disconnected,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputBufferError {
    Full,
    Disconnected,
}
