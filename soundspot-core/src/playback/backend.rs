use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{HandleStatus, Id, StatusListener};

pub type HandleId = Id<dyn SoundHandle>;

/// [SoundHandle] trait object, shared between the session and in-flight operations.
pub type SharedHandle = Arc<dyn SoundHandle>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    /// The backend could not create a handle for the source
    #[error("Failed to load audio: {0}")]
    Load(String),
    /// The source was loaded but could not be started
    #[error("Failed to play audio")]
    PlayFailed(String),
    /// The backend rejected an operation on an existing handle
    #[error("Audio backend error: {0}")]
    Backend(String),
    #[error("Nothing is loaded")]
    NoActiveHandle,
}

/// Something that can be played by an audio session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSource {
    /// The id of the soundspot or audio item this source belongs to
    pub id: String,
    pub url: String,
    /// The length in seconds, if already known from metadata
    pub duration: Option<f32>,
}

impl PlaybackSource {
    pub fn new<I, U>(id: I, url: U) -> Self
    where
        I: Into<String>,
        U: Into<String>,
    {
        Self {
            id: id.into(),
            url: url.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Option<f32>) -> Self {
        self.duration = duration;
        self
    }
}

/// Represents a platform media subsystem that can turn a source into a playable handle.
#[async_trait]
pub trait AudioBackend
where
    Self: 'static + Send + Sync,
{
    /// Creates a handle for the source. The handle starts paused at position zero.
    ///
    /// Implementors are expected to report status changes through the listener,
    /// including a final report with `did_just_finish` when the source reaches its end.
    async fn create(
        &self,
        source: &PlaybackSource,
        listener: StatusListener,
    ) -> Result<SharedHandle, PlaybackError>;
}

/// A loaded source owned by a platform media subsystem.
#[async_trait]
pub trait SoundHandle
where
    Self: 'static + Send + Sync,
{
    async fn play(&self) -> Result<(), PlaybackError>;

    async fn pause(&self) -> Result<(), PlaybackError>;

    /// Seeks to an absolute position in seconds.
    async fn seek(&self, position: f32) -> Result<(), PlaybackError>;

    async fn status(&self) -> Result<HandleStatus, PlaybackError>;

    /// Releases the native resources of the handle. The handle is unusable afterwards.
    async fn unload(&self) -> Result<(), PlaybackError>;
}
