//! Deviceless host
//!
//! Streams opened here are never driven by hardware. The caller pumps the
//! installed render callback with `OfflineHost::render`, which makes the
//! whole engine usable headless and deterministic in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{AudioHost, Device, OutputStream, ProbedDevice, RenderFn, StreamSettings};
use crate::error::HostError;

#[derive(Default)]
struct OfflineInner {
    devices: Vec<ProbedDevice>,
    render: Option<RenderFn>,
    settings: Option<StreamSettings>,
    playing: bool,
    generation: u64,
    open_error: Option<String>,
}

/// Host whose output is pulled by the caller
#[derive(Clone, Default)]
pub struct OfflineHost {
    inner: Arc<Mutex<OfflineInner>>,
    probes: Arc<AtomicUsize>,
}

impl OfflineHost {
    pub fn new(devices: Vec<ProbedDevice>) -> Self {
        let host = Self::default();
        host.set_devices(devices);
        host
    }

    /// Replace what the next probe reports
    pub fn set_devices(&self, devices: Vec<ProbedDevice>) {
        self.lock().devices = devices;
    }

    /// Make every following `open_stream` fail with `message`
    pub fn fail_open(&self, message: impl Into<String>) {
        self.lock().open_error = Some(message.into());
    }

    /// Number of probes performed so far
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }

    /// Settings of the currently open stream
    pub fn stream_settings(&self) -> Option<StreamSettings> {
        self.lock().settings
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    /// Run one device callback of `frames` frames.
    ///
    /// Returns `None` when no stream is open or the stream is paused.
    pub fn render(&self, frames: usize) -> Option<Vec<f32>> {
        let mut inner = self.lock();
        if !inner.playing {
            return None;
        }
        let channels = inner.settings?.channels as usize;
        let render = inner.render.as_mut()?;
        let mut out = vec![0.0; frames * channels];
        render(&mut out);
        Some(out)
    }

    fn lock(&self) -> MutexGuard<'_, OfflineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioHost for OfflineHost {
    type Stream = OfflineStream;

    fn probe(&self) -> Vec<ProbedDevice> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        self.lock().devices.clone()
    }

    fn open_stream(
        &self,
        device: &Device,
        settings: &StreamSettings,
        render: RenderFn,
    ) -> Result<OfflineStream, HostError> {
        let mut inner = self.lock();
        if let Some(message) = &inner.open_error {
            return Err(HostError(message.clone()));
        }
        if settings.channels > device.output_channels {
            return Err(HostError(format!(
                "{} has {} output channel(s), {} requested",
                device.name, device.output_channels, settings.channels
            )));
        }

        inner.generation += 1;
        inner.render = Some(render);
        inner.settings = Some(*settings);
        inner.playing = false;

        Ok(OfflineStream {
            host: self.clone(),
            generation: inner.generation,
        })
    }
}

/// Handle to the stream installed on an `OfflineHost`
pub struct OfflineStream {
    host: OfflineHost,
    generation: u64,
}

impl OutputStream for OfflineStream {
    fn play(&self) -> Result<(), HostError> {
        self.host.lock().playing = true;
        Ok(())
    }

    fn pause(&self) -> Result<(), HostError> {
        self.host.lock().playing = false;
        Ok(())
    }
}

impl Drop for OfflineStream {
    fn drop(&mut self) {
        let mut inner = self.host.lock();
        if inner.generation == self.generation {
            inner.render = None;
            inner.settings = None;
            inner.playing = false;
        }
    }
}
