use std::sync::{Arc, Weak};

use crossbeam::{atomic::AtomicCell, channel::bounded};
use log::{info, warn};
use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};

use crate::{
    clamp_position, run_detached, AudioBackend, Config, EventReceiver, EventSender, HandleId,
    HandleStatus, Id, PlaybackError, PlaybackEvent, PlaybackSource, SharedHandle, StatusListener,
    StatusUpdate,
};

pub type SessionId = Id<AudioSession>;

/// The message shown to users when a source could not be played.
pub const PLAY_FAILED_MESSAGE: &str = "Failed to play audio";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing has been loaded yet, or loading failed.
    #[default]
    Idle,
    /// A handle is being created for a source.
    Loading,
    Playing,
    Paused,
    /// The source was stopped or played to its end, and rests at position zero.
    Stopped,
    /// The handle was released. Playing again creates a new one.
    Unloaded,
}

/// Owns at most one playable handle at a time, and guarantees it is released.
///
/// Every caller that plays audio gets one of these. Starting a new source unloads the previous
/// handle first, a paused source resumes on the same handle, and dropping the session releases
/// whatever is still loaded.
pub struct AudioSession {
    pub id: SessionId,
    config: Config,
    backend: Arc<dyn AudioBackend>,
    inner: Mutex<Inner>,
    /// Bumped whenever a load starts or the session is unloaded.
    /// A load that completes under a stale generation releases its own handle.
    generation: AtomicCell<u64>,
    status_sender: UnboundedSender<StatusUpdate>,
    status_receiver: Mutex<Option<UnboundedReceiver<StatusUpdate>>>,
    event_sender: EventSender,
    event_receiver: EventReceiver,
}

#[derive(Default)]
struct Inner {
    slot: Slot,
    state: PlaybackState,
    position: f32,
    duration: Option<f32>,
    last_error: Option<String>,
}

#[derive(Default)]
enum Slot {
    #[default]
    Empty,
    Loading {
        source: PlaybackSource,
        generation: u64,
    },
    Active {
        source: PlaybackSource,
        handle_id: HandleId,
        handle: SharedHandle,
    },
}

impl Slot {
    fn source(&self) -> Option<&PlaybackSource> {
        match self {
            Slot::Empty => None,
            Slot::Loading { source, .. } | Slot::Active { source, .. } => Some(source),
        }
    }

    fn handle(&self) -> Option<SharedHandle> {
        match self {
            Slot::Active { handle, .. } => Some(handle.clone()),
            _ => None,
        }
    }

    fn into_handle(self) -> Option<SharedHandle> {
        match self {
            Slot::Active { handle, .. } => Some(handle),
            _ => None,
        }
    }
}

impl AudioSession {
    /// Creates a session. When called inside a tokio runtime, status reports from the backend
    /// are applied in the background; otherwise call [AudioSession::process_status_updates].
    pub fn new<B>(backend: B, config: Config) -> Arc<Self>
    where
        B: AudioBackend,
    {
        Self::with_shared_backend(Arc::new(backend), config)
    }

    pub fn with_shared_backend(backend: Arc<dyn AudioBackend>, config: Config) -> Arc<Self> {
        let (status_sender, status_receiver) = unbounded_channel();
        let (event_sender, event_receiver) = bounded(config.event_capacity);

        let session = Arc::new(Self {
            id: SessionId::new(),
            config,
            backend,
            inner: Default::default(),
            generation: AtomicCell::new(0),
            status_sender,
            status_receiver: Mutex::new(Some(status_receiver)),
            event_sender,
            event_receiver,
        });

        if let Ok(handle) = Handle::try_current() {
            if let Some(receiver) = session.status_receiver.lock().take() {
                handle.spawn(run_status_task(Arc::downgrade(&session), receiver));
            }
        }

        session
    }

    /// Starts playing a source.
    ///
    /// A paused or stopped handle for the same source is resumed rather than recreated.
    /// Any other handle is unloaded before the new one is created.
    pub async fn play(&self, source: PlaybackSource) -> Result<(), PlaybackError> {
        let same_source_state = {
            let inner = self.inner.lock();
            let is_same_source = inner.slot.source().map(|s| &s.id) == Some(&source.id);

            is_same_source.then_some(inner.state)
        };

        match same_source_state {
            Some(PlaybackState::Playing | PlaybackState::Loading) => return Ok(()),
            Some(PlaybackState::Paused | PlaybackState::Stopped) => return self.resume().await,
            _ => {}
        }

        let generation = self.generation.fetch_add(1) + 1;

        let previous = {
            let mut inner = self.inner.lock();
            let previous = std::mem::replace(
                &mut inner.slot,
                Slot::Loading {
                    source: source.clone(),
                    generation,
                },
            );

            inner.position = 0.;
            inner.duration = source.duration;
            inner.last_error = None;
            self.transition(&mut inner, PlaybackState::Loading);

            previous
        };

        if let Some(handle) = previous.into_handle() {
            release(handle).await;
        }

        info!("Session #{} loading {}", self.id, source.id);

        let handle_id = HandleId::new();
        let listener = StatusListener::new(handle_id, self.status_sender.clone());

        let handle = match self.backend.create(&source, listener).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail_loading(generation, &source, e)),
        };

        if let Err(e) = handle.play().await {
            release(handle).await;
            return Err(self.fail_loading(generation, &source, e));
        }

        let installed = {
            let mut inner = self.inner.lock();
            let is_current = matches!(
                inner.slot,
                Slot::Loading { generation: g, .. } if g == generation
            );

            // The state changes with the slot, so an unload cannot land in between
            if is_current {
                inner.slot = Slot::Active {
                    source: source.clone(),
                    handle_id,
                    handle: handle.clone(),
                };
                self.transition(&mut inner, PlaybackState::Playing);
            }

            is_current
        };

        if !installed {
            info!("Session #{} dropped superseded load of {}", self.id, source.id);
            release(handle).await;
        }

        Ok(())
    }

    /// Pauses if the source is playing, otherwise plays it.
    pub async fn toggle(&self, source: PlaybackSource) -> Result<(), PlaybackError> {
        let is_playing_source = self.playing_id().as_deref() == Some(source.id.as_str());

        if is_playing_source {
            self.pause().await
        } else {
            self.play(source).await
        }
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        let (handle, state) = self.active_handle()?;

        if state != PlaybackState::Playing {
            return Ok(());
        }

        handle.pause().await?;
        self.set_state_for(&handle, PlaybackState::Paused);

        Ok(())
    }

    /// Resumes the current handle from where it was paused or stopped.
    pub async fn resume(&self) -> Result<(), PlaybackError> {
        let (handle, state) = self.active_handle()?;

        if state == PlaybackState::Playing {
            return Ok(());
        }

        handle.play().await?;
        self.set_state_for(&handle, PlaybackState::Playing);

        Ok(())
    }

    /// Pauses and rewinds to the start, keeping the handle loaded.
    pub async fn stop(&self) -> Result<(), PlaybackError> {
        let (handle, _) = self.active_handle()?;

        handle.pause().await?;
        handle.seek(0.).await?;

        self.inner.lock().position = 0.;
        self.set_state_for(&handle, PlaybackState::Stopped);

        Ok(())
    }

    /// Seeks to an absolute position, clamped to the length of the source.
    /// Returns the position that was actually sought to.
    pub async fn seek_to(&self, position: f32) -> Result<f32, PlaybackError> {
        let (handle, _) = self.active_handle()?;
        let duration = self.known_duration(&handle).await;
        let target = clamp_position(position, duration);

        handle.seek(target).await?;
        self.inner.lock().position = target;

        Ok(target)
    }

    /// Seeks relative to the current position. Negative values seek backwards.
    pub async fn skip(&self, delta: f32) -> Result<f32, PlaybackError> {
        let (handle, _) = self.active_handle()?;
        let status = handle.status().await?;

        let duration = status.duration.or(self.inner.lock().duration);
        let target = clamp_position(status.position + delta, duration);

        handle.seek(target).await?;

        let mut inner = self.inner.lock();
        inner.position = target;
        inner.duration = duration;

        Ok(target)
    }

    pub async fn skip_forward(&self) -> Result<f32, PlaybackError> {
        self.skip(self.config.skip_interval_in_seconds).await
    }

    pub async fn skip_backward(&self) -> Result<f32, PlaybackError> {
        self.skip(-self.config.skip_interval_in_seconds).await
    }

    /// Releases the current handle, if any. Any load in progress is abandoned.
    pub async fn unload(&self) {
        self.generation.fetch_add(1);

        let previous = {
            let mut inner = self.inner.lock();
            inner.position = 0.;
            let previous = std::mem::take(&mut inner.slot);
            self.transition(&mut inner, PlaybackState::Unloaded);

            previous
        };

        if let Some(handle) = previous.into_handle() {
            info!("Session #{} unloading", self.id);
            release(handle).await;
        }
    }

    /// Applies a status report from the backend. Reports for stale handles are ignored.
    pub async fn apply_status(&self, update: StatusUpdate) {
        let handle = {
            let mut inner = self.inner.lock();

            let handle = match &inner.slot {
                Slot::Active {
                    handle_id, handle, ..
                } if *handle_id == update.handle_id => handle.clone(),
                _ => return,
            };

            inner.position = update.status.position;
            if update.status.duration.is_some() {
                inner.duration = update.status.duration;
            }

            handle
        };

        self.emit(PlaybackEvent::TimeUpdate {
            session_id: self.id,
            position: update.status.position,
            duration: update.status.duration,
        });

        if !update.status.did_just_finish {
            return;
        }

        if let Err(e) = handle.seek(0.).await {
            warn!("Session #{} could not rewind finished audio: {}", self.id, e);
        }

        self.inner.lock().position = 0.;
        self.set_state_for(&handle, PlaybackState::Stopped);
    }

    /// Applies pending status reports when the session was created outside a runtime.
    pub async fn process_status_updates(&self) {
        let updates: Vec<_> = {
            let mut receiver = self.status_receiver.lock();

            match receiver.as_mut() {
                Some(receiver) => std::iter::from_fn(|| receiver.try_recv().ok()).collect(),
                None => return,
            }
        };

        for update in updates {
            self.apply_status(update).await;
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    /// The source currently loading or loaded, if any
    pub fn current_source(&self) -> Option<PlaybackSource> {
        self.inner.lock().slot.source().cloned()
    }

    /// The id of the source that is audibly playing.
    /// Callers render a pause control for this id and a play control for everything else.
    pub fn playing_id(&self) -> Option<String> {
        let inner = self.inner.lock();

        match (&inner.slot, inner.state) {
            (Slot::Active { source, .. }, PlaybackState::Playing) => Some(source.id.clone()),
            _ => None,
        }
    }

    pub fn position(&self) -> f32 {
        self.inner.lock().position
    }

    pub fn duration(&self) -> Option<f32> {
        self.inner.lock().duration
    }

    pub fn has_handle(&self) -> bool {
        matches!(self.inner.lock().slot, Slot::Active { .. })
    }

    /// The user-facing message of the last failed play, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.inner.lock().last_error = None;
    }

    /// Receive events from the session.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_receiver.clone()
    }

    fn active_handle(&self) -> Result<(SharedHandle, PlaybackState), PlaybackError> {
        let inner = self.inner.lock();

        inner
            .slot
            .handle()
            .map(|handle| (handle, inner.state))
            .ok_or(PlaybackError::NoActiveHandle)
    }

    async fn known_duration(&self, handle: &SharedHandle) -> Option<f32> {
        let known = self.inner.lock().duration;

        match known {
            Some(duration) => Some(duration),
            None => handle.status().await.ok().and_then(|s| s.duration),
        }
    }

    fn fail_loading(
        &self,
        generation: u64,
        source: &PlaybackSource,
        error: PlaybackError,
    ) -> PlaybackError {
        warn!("Session #{} failed to play {}: {}", self.id, source.id, error);

        let is_current = {
            let mut inner = self.inner.lock();
            let is_current = matches!(
                inner.slot,
                Slot::Loading { generation: g, .. } if g == generation
            );

            if is_current {
                inner.slot = Slot::Empty;
                inner.last_error = Some(PLAY_FAILED_MESSAGE.to_string());
                self.transition(&mut inner, PlaybackState::Idle);
            }

            is_current
        };

        if is_current {
            self.emit(PlaybackEvent::Error {
                session_id: self.id,
                source_id: source.id.clone(),
                message: PLAY_FAILED_MESSAGE.to_string(),
            });
        }

        match error {
            PlaybackError::PlayFailed(e) => PlaybackError::PlayFailed(e),
            e => PlaybackError::PlayFailed(e.to_string()),
        }
    }

    /// Only changes the state if the given handle is still the active one.
    fn set_state_for(&self, handle: &SharedHandle, state: PlaybackState) {
        let mut inner = self.inner.lock();

        let is_active = inner
            .slot
            .handle()
            .map(|h| Arc::ptr_eq(&h, handle))
            .unwrap_or_default();

        if is_active {
            self.transition(&mut inner, state);
        }
    }

    /// Changes the state under the caller's lock, so it always agrees with the slot.
    fn transition(&self, inner: &mut Inner, state: PlaybackState) {
        if inner.state == state {
            return;
        }

        inner.state = state;

        self.emit(PlaybackEvent::StateUpdate {
            session_id: self.id,
            source_id: inner.slot.source().map(|s| s.id.clone()),
            new_state: state,
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        // Events are dropped when nobody drains the channel
        let _ = self.event_sender.try_send(event);
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        let slot = std::mem::take(&mut self.inner.get_mut().slot);

        if let Some(handle) = slot.into_handle() {
            info!("Session #{} dropped with a loaded handle, releasing it", self.id);
            run_detached(release(handle));
        }
    }
}

async fn release(handle: SharedHandle) {
    if let Err(e) = handle.unload().await {
        warn!("Failed to unload audio handle: {}", e);
    }
}

async fn run_status_task(
    session: Weak<AudioSession>,
    mut receiver: UnboundedReceiver<StatusUpdate>,
) {
    while let Some(update) = receiver.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };

        session.apply_status(update).await;
    }
}

impl HandleStatus {
    /// A status for a handle that just played to its end.
    pub fn finished(duration: Option<f32>) -> Self {
        Self {
            position: duration.unwrap_or_default(),
            duration,
            is_playing: false,
            did_just_finish: true,
        }
    }
}
