//! A recording backend used to test the session without a media subsystem.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    AudioBackend, HandleStatus, PlaybackError, PlaybackSource, SharedHandle, SoundHandle,
    StatusListener,
};

#[derive(Default)]
pub struct FakeBackend {
    pub handles: Mutex<Vec<Arc<FakeHandle>>>,
    failing_urls: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

pub struct FakeHandle {
    pub url: String,
    pub listener: StatusListener,
    pub calls: Mutex<Vec<String>>,
    pub unloaded: AtomicCell<bool>,
    position: AtomicCell<f32>,
    duration: Option<f32>,
    playing: AtomicCell<bool>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creating a handle for this url fails.
    pub fn fail(&self, url: &str) {
        self.failing_urls.lock().push(url.to_string());
    }

    /// Creating a handle for this url waits until the returned gate is notified.
    pub fn gate(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert(url.to_string(), gate.clone());
        gate
    }

    pub fn handle(&self, index: usize) -> Arc<FakeHandle> {
        self.handles.lock()[index].clone()
    }

    /// Handles that were created and never unloaded
    pub fn live_handles(&self) -> Vec<Arc<FakeHandle>> {
        self.handles
            .lock()
            .iter()
            .filter(|h| !h.unloaded.load())
            .cloned()
            .collect()
    }
}

impl FakeHandle {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: impl Into<String>) -> Result<(), PlaybackError> {
        if self.unloaded.load() {
            return Err(PlaybackError::Backend("handle is unloaded".to_string()));
        }

        self.calls.lock().push(call.into());
        Ok(())
    }

    pub fn set_position(&self, position: f32) {
        self.position.store(position);
    }
}

#[async_trait]
impl AudioBackend for Arc<FakeBackend> {
    async fn create(
        &self,
        source: &PlaybackSource,
        listener: StatusListener,
    ) -> Result<SharedHandle, PlaybackError> {
        let gate = self.gates.lock().get(&source.url).cloned();

        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing_urls.lock().contains(&source.url) {
            return Err(PlaybackError::Load(format!("{} is unreachable", source.url)));
        }

        let handle = Arc::new(FakeHandle {
            url: source.url.clone(),
            listener,
            calls: Default::default(),
            unloaded: AtomicCell::new(false),
            position: AtomicCell::new(0.),
            duration: source.duration,
            playing: AtomicCell::new(false),
        });

        self.handles.lock().push(handle.clone());
        Ok(handle)
    }
}

#[async_trait]
impl SoundHandle for FakeHandle {
    async fn play(&self) -> Result<(), PlaybackError> {
        self.record("play")?;
        self.playing.store(true);
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        self.record("pause")?;
        self.playing.store(false);
        Ok(())
    }

    async fn seek(&self, position: f32) -> Result<(), PlaybackError> {
        self.record(format!("seek {}", position))?;
        self.position.store(position);
        Ok(())
    }

    async fn status(&self) -> Result<HandleStatus, PlaybackError> {
        Ok(HandleStatus {
            position: self.position.load(),
            duration: self.duration,
            is_playing: self.playing.load(),
            did_just_finish: false,
        })
    }

    async fn unload(&self) -> Result<(), PlaybackError> {
        self.record("unload")?;
        self.unloaded.store(true);
        Ok(())
    }
}
