//! Output devices
//!
//! The engine talks to the sound hardware through the `AudioHost` trait so
//! the realtime path can run against real devices (`CpalHost`) or a manually
//! pumped stand-in (`OfflineHost`). `DeviceDirectory` caches the probe results
//! and resolves device names for the stream controller.

mod cpal_host;
mod offline;

pub use cpal_host::{CpalHost, CpalStream};
pub use offline::{OfflineHost, OfflineStream};

use std::sync::Arc;

use crate::error::{HostError, PlaybackError};

/// Render callback installed on an output stream.
///
/// Receives one interleaved device buffer and must fill all of it.
pub type RenderFn = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// One entry reported by a host probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedDevice {
    pub name: String,
    pub output_channels: u16,
    /// False when the host could not query the device
    pub probed: bool,
}

/// A usable output device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    /// Position in the host's own enumeration
    pub index: usize,
    pub output_channels: u16,
}

/// Stream parameters requested from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub channels: u16,
    pub sample_rate: u32,
    pub buffer_frames: u32,
}

/// A running or paused output stream. Dropping it closes the stream.
///
/// Streams need not be `Send`; the controller keeps each one on the thread
/// that opened it.
pub trait OutputStream {
    fn play(&self) -> Result<(), HostError>;
    fn pause(&self) -> Result<(), HostError>;
}

/// Host audio subsystem, shared with the thread that owns the open stream
pub trait AudioHost: Send + Sync + 'static {
    type Stream: OutputStream;

    /// Enumerate every output device, including ones that failed to probe
    fn probe(&self) -> Vec<ProbedDevice>;

    /// Build a paused float32 stream on `device` that calls `render` per buffer
    fn open_stream(
        &self,
        device: &Device,
        settings: &StreamSettings,
        render: RenderFn,
    ) -> Result<Self::Stream, HostError>;
}

/// Cached view of the host's output devices
pub struct DeviceDirectory<H: AudioHost> {
    host: Arc<H>,
    cache: Vec<Device>,
    dirty: bool,
}

impl<H: AudioHost> DeviceDirectory<H> {
    pub fn new(host: H) -> Self {
        Self {
            host: Arc::new(host),
            cache: Vec::new(),
            dirty: true,
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Drop the cache so the next lookup probes again
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Names of the cached devices, probing only if the cache is stale
    pub fn list_devices(&mut self) -> Vec<String> {
        self.devices().iter().map(|d| d.name.clone()).collect()
    }

    /// Invalidate and re-probe in one step
    pub fn refresh(&mut self) -> Vec<String> {
        self.invalidate();
        self.list_devices()
    }

    /// Exact, case-sensitive lookup in the cached list
    pub fn resolve(&mut self, name: &str) -> Result<Device, PlaybackError> {
        self.devices()
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| PlaybackError::DeviceUnavailable(name.to_string()))
    }

    fn devices(&mut self) -> &[Device] {
        if self.dirty {
            self.cache = self
                .host
                .probe()
                .into_iter()
                .enumerate()
                .filter(|(_, info)| info.probed)
                .map(|(index, info)| Device {
                    name: info.name,
                    index,
                    output_channels: info.output_channels,
                })
                .collect();
            self.dirty = false;
            log::info!("Found {} output device(s)", self.cache.len());
        }
        &self.cache
    }
}
