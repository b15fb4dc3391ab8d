use crossbeam::channel::{Receiver, Sender};
use tokio::sync::mpsc::UnboundedSender;

use crate::{HandleId, PlaybackState, SessionId};

pub type EventSender = Sender<PlaybackEvent>;
pub type EventReceiver = Receiver<PlaybackEvent>;

/// Describes the events that can be emitted by an audio session.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// The session's state has changed.
    StateUpdate {
        session_id: SessionId,
        /// The source the session is loading or holding, if any.
        source_id: Option<String>,
        new_state: PlaybackState,
    },
    /// The active handle reported a new position.
    TimeUpdate {
        session_id: SessionId,
        /// The current position, in seconds.
        position: f32,
        /// The length of the source in seconds, if known.
        duration: Option<f32>,
    },
    /// A source could not be played.
    Error {
        session_id: SessionId,
        source_id: String,
        /// A user-facing message
        message: String,
    },
}

/// The status of a handle as reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HandleStatus {
    /// The current position, in seconds.
    pub position: f32,
    /// The length of the source in seconds, if known.
    pub duration: Option<f32>,
    pub is_playing: bool,
    /// True exactly once, when the source played to its natural end.
    pub did_just_finish: bool,
}

/// A status report tagged with the handle it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct StatusUpdate {
    pub handle_id: HandleId,
    pub status: HandleStatus,
}

/// Given to a backend when a handle is created, so it can report status changes back to the
/// session.
#[derive(Debug, Clone)]
pub struct StatusListener {
    handle_id: HandleId,
    sender: UnboundedSender<StatusUpdate>,
}

impl StatusListener {
    pub fn new(handle_id: HandleId, sender: UnboundedSender<StatusUpdate>) -> Self {
        Self { handle_id, sender }
    }

    pub fn handle_id(&self) -> HandleId {
        self.handle_id
    }

    /// Reports a status. Returns false once the session is gone.
    pub fn report(&self, status: HandleStatus) -> bool {
        self.sender
            .send(StatusUpdate {
                handle_id: self.handle_id,
                status,
            })
            .is_ok()
    }
}
