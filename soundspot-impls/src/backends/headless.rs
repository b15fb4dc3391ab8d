use std::sync::Arc;

use async_trait::async_trait;
use crossbeam::atomic::AtomicCell;
use log::{debug, info};
use parking_lot::Mutex;
use reqwest::Client;
use soundspot_core::{
    clamp_position, AudioBackend, Config, HandleStatus, PlaybackError, PlaybackSource,
    SharedHandle, SoundHandle, StatusListener,
};
use tokio::{
    task::JoinHandle,
    time::{interval, Instant, MissedTickBehavior},
};

/// An audio backend without an output device.
///
/// Sources are probed over HTTP so unreachable media fails like it would on a device, then
/// position is tracked with a monotonic clock. Useful for command line tools and tests where
/// the platform media subsystem is not available.
pub struct HeadlessBackend {
    client: Client,
    config: Config,
    probe: bool,
}

impl HeadlessBackend {
    /// Used to estimate a duration from Content-Length when metadata has none
    const ASSUMED_BITRATE_IN_BITS: f32 = 128_000.;

    pub fn new(config: Config) -> Self {
        Self {
            client: Client::new(),
            config,
            probe: true,
        }
    }

    /// A backend that trusts every source without touching the network.
    pub fn without_probe(config: Config) -> Self {
        Self {
            probe: false,
            ..Self::new(config)
        }
    }

    /// Checks that the source is reachable, returning its length in bytes if the server tells.
    async fn probe(&self, url: &str) -> Result<Option<usize>, PlaybackError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| PlaybackError::Load(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            return Err(PlaybackError::Load(format!(
                "Source probe failed with {}",
                status
            )));
        }

        let length = response
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());

        Ok(length)
    }

    fn estimate_duration(bytes: usize) -> f32 {
        (bytes as f32 * 8.) / Self::ASSUMED_BITRATE_IN_BITS
    }
}

#[async_trait]
impl AudioBackend for HeadlessBackend {
    async fn create(
        &self,
        source: &PlaybackSource,
        listener: StatusListener,
    ) -> Result<SharedHandle, PlaybackError> {
        let mut duration = source.duration;

        if self.probe {
            let length = self.probe(&source.url).await?;

            if duration.is_none() {
                duration = length.map(Self::estimate_duration);
            }
        }

        info!("Created headless handle for {}", source.id);

        Ok(Arc::new(HeadlessHandle::new(
            listener,
            duration,
            self.config.clone(),
        )))
    }
}

/// A handle whose position advances with wall-clock time while playing.
pub struct HeadlessHandle {
    clock: Arc<Mutex<Clock>>,
    listener: StatusListener,
    duration: Option<f32>,
    config: Config,
    ticker: Mutex<Option<JoinHandle<()>>>,
    unloaded: AtomicCell<bool>,
}

#[derive(Debug, Default)]
struct Clock {
    /// Position when the clock was last started or sought
    offset: f32,
    /// Set while playing
    started_at: Option<Instant>,
}

impl Clock {
    fn position(&self, duration: Option<f32>) -> f32 {
        let elapsed = self
            .started_at
            .map(|s| s.elapsed().as_secs_f32())
            .unwrap_or_default();

        clamp_position(self.offset + elapsed, duration)
    }

    fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn stop(&mut self, duration: Option<f32>) {
        self.offset = self.position(duration);
        self.started_at = None;
    }

    fn set(&mut self, position: f32) {
        self.offset = position;

        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }
}

impl HeadlessHandle {
    pub fn new(listener: StatusListener, duration: Option<f32>, config: Config) -> Self {
        Self {
            clock: Default::default(),
            listener,
            duration,
            config,
            ticker: Default::default(),
            unloaded: AtomicCell::new(false),
        }
    }

    fn ensure_loaded(&self) -> Result<(), PlaybackError> {
        if self.unloaded.load() {
            return Err(PlaybackError::Backend("Handle is unloaded".to_string()));
        }

        Ok(())
    }

    fn current_status(&self) -> HandleStatus {
        let clock = self.clock.lock();

        HandleStatus {
            position: clock.position(self.duration),
            duration: self.duration,
            is_playing: clock.started_at.is_some(),
            did_just_finish: false,
        }
    }

    fn spawn_ticker(&self) {
        let clock = self.clock.clone();
        let listener = self.listener.clone();
        let duration = self.duration;
        let period = self.config.status_interval();

        let task = tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticks.tick().await;

                let (position, finished) = {
                    let mut clock = clock.lock();
                    let position = clock.position(duration);
                    let finished = duration.map(|d| position >= d).unwrap_or_default();

                    if finished {
                        clock.stop(duration);
                    }

                    (position, finished)
                };

                let status = if finished {
                    HandleStatus::finished(duration)
                } else {
                    HandleStatus {
                        position,
                        duration,
                        is_playing: true,
                        did_just_finish: false,
                    }
                };

                if !listener.report(status) || finished {
                    break;
                }
            }

            debug!("Headless ticker for handle #{} stopped", listener.handle_id());
        });

        if let Some(previous) = self.ticker.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop_ticker(&self) {
        if let Some(task) = self.ticker.lock().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl SoundHandle for HeadlessHandle {
    async fn play(&self) -> Result<(), PlaybackError> {
        self.ensure_loaded()?;

        let restart_from_end = {
            let clock = self.clock.lock();
            let position = clock.position(self.duration);
            self.duration.map(|d| position >= d).unwrap_or_default()
        };

        {
            let mut clock = self.clock.lock();

            if restart_from_end {
                clock.set(0.);
            }

            clock.start();
        }

        self.spawn_ticker();
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        self.ensure_loaded()?;
        self.stop_ticker();
        self.clock.lock().stop(self.duration);

        Ok(())
    }

    async fn seek(&self, position: f32) -> Result<(), PlaybackError> {
        self.ensure_loaded()?;
        self.clock
            .lock()
            .set(clamp_position(position, self.duration));

        Ok(())
    }

    async fn status(&self) -> Result<HandleStatus, PlaybackError> {
        self.ensure_loaded()?;
        Ok(self.current_status())
    }

    async fn unload(&self) -> Result<(), PlaybackError> {
        self.stop_ticker();
        self.unloaded.store(true);

        Ok(())
    }
}

impl Drop for HeadlessHandle {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}
