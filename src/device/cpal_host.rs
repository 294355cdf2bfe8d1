//! cpal-backed host
//!
//! Probes the default host's output devices and builds fixed-size float32
//! output streams on them.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{AudioHost, Device, OutputStream, ProbedDevice, RenderFn, StreamSettings};
use crate::error::HostError;

/// The platform's default audio host
pub struct CpalHost {
    host: cpal::Host,
}

impl CpalHost {
    pub fn new(host: cpal::Host) -> Self {
        Self { host }
    }

    /// Find the cpal device behind a cached `Device`.
    ///
    /// The enumeration index is tried first; if the host reordered its
    /// devices since the probe, fall back to a name search.
    fn find(&self, device: &Device) -> Result<cpal::Device, HostError> {
        let mut devices = self.host.output_devices().map_err(HostError::new)?;
        if let Some(d) = devices.nth(device.index) {
            if d.name().ok().as_deref() == Some(device.name.as_str()) {
                return Ok(d);
            }
        }

        self.host
            .output_devices()
            .map_err(HostError::new)?
            .find(|d| d.name().ok().as_deref() == Some(device.name.as_str()))
            .ok_or_else(|| HostError(format!("Device disappeared: {}", device.name)))
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new(cpal::default_host())
    }
}

impl AudioHost for CpalHost {
    type Stream = CpalStream;

    fn probe(&self) -> Vec<ProbedDevice> {
        let devices = match self.host.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("Failed to enumerate output devices: {}", e);
                return Vec::new();
            }
        };

        devices
            .map(|device| {
                let name = device.name().unwrap_or_default();
                let channels = device
                    .supported_output_configs()
                    .ok()
                    .and_then(|configs| configs.map(|c| c.channels()).max());

                match channels {
                    Some(output_channels) if !name.is_empty() => ProbedDevice {
                        name,
                        output_channels,
                        probed: true,
                    },
                    _ => {
                        log::debug!("Could not probe output device {:?}", name);
                        ProbedDevice {
                            name,
                            output_channels: 0,
                            probed: false,
                        }
                    }
                }
            })
            .collect()
    }

    fn open_stream(
        &self,
        device: &Device,
        settings: &StreamSettings,
        mut render: RenderFn,
    ) -> Result<CpalStream, HostError> {
        let cpal_device = self.find(device)?;

        let config = cpal::StreamConfig {
            channels: settings.channels,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(settings.buffer_frames),
        };
        log::info!("Opening {} with {:?}", device.name, config);

        let stream = cpal_device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render(data),
                |err| log::error!("Audio output error: {}", err),
                None,
            )
            .map_err(HostError::new)?;

        // Some backends start streams on creation
        if let Err(e) = stream.pause() {
            log::debug!("Stream could not be paused after creation: {}", e);
        }

        Ok(CpalStream { stream })
    }
}

/// An open cpal output stream
pub struct CpalStream {
    stream: cpal::Stream,
}

impl OutputStream for CpalStream {
    fn play(&self) -> Result<(), HostError> {
        self.stream.play().map_err(HostError::new)
    }

    fn pause(&self) -> Result<(), HostError> {
        self.stream.pause().map_err(HostError::new)
    }
}
