//! Stream controller
//!
//! Owns the output stream and is the control surface for the engine:
//! open/close a device, start/stop/abort playback, queue clips, and read
//! back what is playing. Every method runs in the control context; the only
//! thing handed to the audio thread is the render closure built in `open`.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use ringbuf::traits::Split;
use ringbuf::HeapRb;

use super::events::{EventBus, EventDispatcher, MixerEvent, PlaybackEvent, SubscriptionId};
use super::mixer::{CallbackStatus, RealtimeMixer};
use super::state::{SharedPlayback, StreamState};
use super::worker::StreamWorker;
use super::{AUX_CHANNELS, BUFFER_FRAMES, MAIN_CHANNELS, SAMPLE_RATE};
use crate::audio::{Clip, Cue};
use crate::device::{AudioHost, CpalHost, Device, DeviceDirectory, RenderFn, StreamSettings};
use crate::error::PlaybackError;

/// Notifications buffered between dispatcher passes
pub const EVENT_CAPACITY: usize = 1024;

/// Everything that exists only while a device is open
struct OpenStream {
    worker: StreamWorker,
    device: Device,
    out_channels: u16,
    dispatcher: EventDispatcher,
}

/// Device lifecycle and playback control
pub struct StreamController<H: AudioHost> {
    directory: DeviceDirectory<H>,
    shared: Arc<SharedPlayback>,
    bus: EventBus,
    open: Option<OpenStream>,
}

impl StreamController<CpalHost> {
    /// Controller on the platform's default audio host
    pub fn with_default_host() -> Self {
        Self::new(CpalHost::default())
    }
}

impl<H: AudioHost> StreamController<H> {
    pub fn new(host: H) -> Self {
        Self {
            directory: DeviceDirectory::new(host),
            shared: Arc::new(SharedPlayback::new()),
            bus: EventBus::new(),
            open: None,
        }
    }

    pub fn list_devices(&mut self) -> Vec<String> {
        self.directory.list_devices()
    }

    pub fn refresh_devices(&mut self) -> Vec<String> {
        self.directory.refresh()
    }

    pub fn subscribe(&self) -> (SubscriptionId, Receiver<PlaybackEvent>) {
        self.bus.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn state(&self) -> StreamState {
        self.shared.stream_state()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Name of the open device
    pub fn current_device(&self) -> Option<&str> {
        self.open.as_ref().map(|open| open.device.name.as_str())
    }

    /// Negotiated output layout: 4 with an aux pair, otherwise 2
    pub fn out_channels(&self) -> Option<u16> {
        self.open.as_ref().map(|open| open.out_channels)
    }

    /// Open `device_name`, closing any stream already open
    pub fn open(&mut self, device_name: &str) -> Result<(), PlaybackError> {
        self.close();

        let device = self.directory.resolve(device_name).inspect_err(|e| {
            log::error!("{}", e);
        })?;

        let out_channels = if device.output_channels as usize >= MAIN_CHANNELS + AUX_CHANNELS {
            (MAIN_CHANNELS + AUX_CHANNELS) as u16
        } else {
            MAIN_CHANNELS as u16
        };
        let settings = StreamSettings {
            channels: out_channels,
            sample_rate: SAMPLE_RATE,
            buffer_frames: BUFFER_FRAMES,
        };

        let (event_prod, event_cons) = HeapRb::<MixerEvent>::new(EVENT_CAPACITY).split();

        let mut mixer = RealtimeMixer::new(Arc::clone(&self.shared), out_channels, event_prod);
        let shared = Arc::clone(&self.shared);
        let render: RenderFn = Box::new(move |out: &mut [f32]| {
            if !shared.stream_state().is_running() {
                out.fill(0.0);
                return;
            }
            if mixer.render(out) == CallbackStatus::Halt {
                shared.transition(
                    &[StreamState::Running, StreamState::FadingOut],
                    StreamState::Open,
                );
            }
        });

        let worker = StreamWorker::spawn(
            Arc::clone(self.directory.host()),
            device.clone(),
            settings,
            render,
            Arc::clone(&self.shared),
        )
        .map_err(|e| PlaybackError::StreamOpenFailed(e.0))
        .inspect_err(|e| log::error!("{}", e))?;

        log::info!(
            "Opened {} ({} output channels, aux {})",
            device.name,
            out_channels,
            if out_channels > MAIN_CHANNELS as u16 { "enabled" } else { "disabled" }
        );

        // A halt raised by the callback pauses the stream from here
        let settle = worker.settle_handle();
        let dispatcher = EventDispatcher::spawn(
            event_cons,
            self.bus.clone(),
            Box::new(move || settle.settle()),
        );

        self.open = Some(OpenStream {
            worker,
            device,
            out_channels,
            dispatcher,
        });
        self.shared.set_stream_state(StreamState::Open);
        self.emit(PlaybackEvent::Opened);
        Ok(())
    }

    /// `open` for callers that only need success or failure
    pub fn open_device(&mut self, device_name: &str) -> bool {
        self.open(device_name).is_ok()
    }

    /// Abort playback if needed and tear the stream down.
    ///
    /// No callback runs after this returns.
    pub fn close(&mut self) {
        if let Some(open) = &self.open {
            if let Err(e) = self.halt(open) {
                log::warn!("{}", e);
            }
        }

        let Some(OpenStream {
            mut worker,
            device,
            mut dispatcher,
            ..
        }) = self.open.take()
        else {
            return;
        };
        worker.shutdown();
        dispatcher.shutdown();

        self.shared.reset();
        self.shared.set_stream_state(StreamState::Closed);
        log::info!("Closed {}", device.name);
        self.bus.emit(PlaybackEvent::Closed);
    }

    /// Start playback with an optional fade-in. No-op unless the stream is
    /// open and idle.
    pub fn start(&self, fade_in: usize) -> Result<(), PlaybackError> {
        let Some(open) = &self.open else {
            return Ok(());
        };
        if self.state() != StreamState::Open {
            return Ok(());
        }
        // Only the control thread leaves `Open`, so the request is in place
        // before any callback can see `Running`
        self.shared.request_start(fade_in);
        self.shared.set_stream_state(StreamState::Running);

        // Started goes out ahead of anything the first callback raises
        open.dispatcher.sequence(|bus| {
            if let Err(e) = open.worker.play() {
                self.shared.set_stream_state(StreamState::Open);
                let err = PlaybackError::StreamControlFailed(e.0);
                log::error!("{}", err);
                return Err(err);
            }
            log::info!("Playback started (fade-in {} frames)", fade_in);
            bus.emit(PlaybackEvent::Started);
            Ok(())
        })
    }

    /// Stop playback. With `fade_out == 0` output halts immediately,
    /// otherwise the mixer fades out and halts the stream itself. Only one
    /// fade-out can be in flight.
    pub fn stop(&self, fade_out: usize) -> Result<(), PlaybackError> {
        let Some(open) = &self.open else {
            return Ok(());
        };
        if self.state() != StreamState::Running {
            return Ok(());
        }
        if fade_out == 0 {
            return self.halt(open);
        }
        if self
            .shared
            .transition(&[StreamState::Running], StreamState::FadingOut)
        {
            self.shared.request_fade_out(fade_out);
            log::info!("Fading out over {} frames", fade_out);
        }
        Ok(())
    }

    /// Halt immediately, skipping any fade
    pub fn abort(&self) -> Result<(), PlaybackError> {
        match &self.open {
            Some(open) => self.halt(open),
            None => Ok(()),
        }
    }

    /// Replace the queued cue. `None` clears the queue.
    pub fn set_queued_track(&self, clip: Option<Arc<Clip>>, aux: Option<Arc<Clip>>) {
        let cue = clip.map(|main| Arc::new(Cue::new(main, aux)));
        let auto_play = cue.as_ref().is_some_and(|cue| cue.main.auto_play);
        if let Some(cue) = &cue {
            log::info!("Queued {}", cue.main.name());
        }
        self.shared.queue(cue);

        if auto_play {
            if let Err(e) = self.start(0) {
                log::warn!("Auto-play failed: {}", e);
            }
        }
        self.emit(PlaybackEvent::QueueChanged);
    }

    /// Queue a clip together with its paired aux clip
    pub fn queue_clip(&self, clip: Arc<Clip>) {
        let aux = clip.paired_aux.clone();
        self.set_queued_track(Some(clip), aux);
    }

    pub fn queued_track(&self) -> Option<Arc<Clip>> {
        self.shared.queued().map(|cue| Arc::clone(&cue.main))
    }

    /// Drop the active clip without waiting for it to end
    pub fn clear_active_track(&self) {
        self.shared.publish_active(None);
        self.shared.publish_sample(0);
        if self.open.is_some() {
            self.shared.request_clear();
        }
        self.emit(PlaybackEvent::QueueChanged);
    }

    /// Master volume; 1.0 is unity, values above boost
    pub fn set_volume(&self, volume: f32) {
        self.shared.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume()
    }

    pub fn active_track(&self) -> Option<Arc<Clip>> {
        self.shared.active_clip()
    }

    pub fn active_aux_track(&self) -> Option<Arc<Clip>> {
        self.shared.active().and_then(|cue| cue.aux.clone())
    }

    /// Sample offset into the active clip as of the last callback
    pub fn active_sample_offset(&self) -> usize {
        self.shared.active_sample()
    }

    /// Emit in order with the mixer's events while a stream is open
    fn emit(&self, event: PlaybackEvent) {
        match &self.open {
            Some(open) => open.dispatcher.emit(event),
            None => self.bus.emit(event),
        }
    }

    /// Stop a running stream without fading and report `Stopped`
    fn halt(&self, open: &OpenStream) -> Result<(), PlaybackError> {
        if !self.shared.transition(
            &[StreamState::Running, StreamState::FadingOut],
            StreamState::Open,
        ) {
            return Ok(());
        }
        // The mixer rearms its fades on the next start
        self.shared.cancel_fade_out();

        let result = open
            .worker
            .pause()
            .map_err(|e| PlaybackError::StreamControlFailed(e.0));

        log::info!("Playback stopped");
        open.dispatcher.emit(PlaybackEvent::Stopped);
        result
    }
}

impl<H: AudioHost> Drop for StreamController<H> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::device::{OfflineHost, ProbedDevice};
    use std::time::{Duration, Instant};

    fn host() -> OfflineHost {
        OfflineHost::new(vec![
            ProbedDevice {
                name: "Stereo Out".to_string(),
                output_channels: 2,
                probed: true,
            },
            ProbedDevice {
                name: "Quad Out".to_string(),
                output_channels: 4,
                probed: true,
            },
        ])
    }

    fn clip(name: &str, frames: usize) -> Arc<Clip> {
        Arc::new(Clip::new(
            name,
            AudioBuffer::new(vec![0.5; frames * 2], 2).unwrap(),
        ))
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Wait for `expected` on the bus, skipping anything else
    fn wait_for(rx: &Receiver<PlaybackEvent>, expected: PlaybackEvent) -> bool {
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(2)) {
            if event == expected {
                return true;
            }
        }
        false
    }

    #[test]
    fn test_open_unknown_device_stays_closed() {
        let mut controller = StreamController::new(host());
        let (_id, rx) = controller.subscribe();

        assert!(!controller.open_device("nonexistent"));
        assert_eq!(controller.state(), StreamState::Closed);
        assert!(controller.current_device().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_open_negotiates_layout() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        let (_id, rx) = controller.subscribe();

        assert!(controller.open_device("Stereo Out"));
        assert_eq!(controller.state(), StreamState::Open);
        assert_eq!(controller.out_channels(), Some(2));
        assert_eq!(
            host.stream_settings(),
            Some(StreamSettings {
                channels: 2,
                sample_rate: 44_100,
                buffer_frames: 256,
            })
        );
        assert_eq!(rx.try_recv(), Ok(PlaybackEvent::Opened));

        assert!(controller.open_device("Quad Out"));
        assert_eq!(controller.out_channels(), Some(4));
        assert_eq!(controller.current_device(), Some("Quad Out"));
    }

    #[test]
    fn test_host_rejection_reports_open_failure() {
        let host = host();
        host.fail_open("device busy");
        let mut controller = StreamController::new(host);

        assert_eq!(
            controller.open("Stereo Out"),
            Err(PlaybackError::StreamOpenFailed("device busy".to_string()))
        );
        assert_eq!(controller.state(), StreamState::Closed);
    }

    #[test]
    fn test_start_and_immediate_stop() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        let (_id, rx) = controller.subscribe();
        controller.open("Stereo Out").unwrap();
        controller.set_queued_track(Some(clip("hit", 2000)), None);

        controller.start(0).unwrap();
        assert!(controller.is_running());
        let out = host.render(256).unwrap();
        assert_eq!(out.len(), 512);
        assert_eq!(out[0], 0.5);
        assert_eq!(controller.active_sample_offset(), 512);
        assert_eq!(controller.active_track().unwrap().name(), "hit");

        controller.stop(0).unwrap();
        assert_eq!(controller.state(), StreamState::Open);
        assert!(host.render(256).is_none());
        assert!(wait_for(&rx, PlaybackEvent::Stopped));
    }

    #[test]
    fn test_start_is_noop_unless_open_and_idle() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        controller.start(0).unwrap();
        assert_eq!(controller.state(), StreamState::Closed);

        controller.open("Stereo Out").unwrap();
        let (_id, rx) = controller.subscribe();
        controller.start(0).unwrap();
        controller.start(0).unwrap();
        let started = rx.try_iter().filter(|e| *e == PlaybackEvent::Started).count();
        assert_eq!(started, 1);
    }

    #[test]
    fn test_fade_out_halts_from_callback() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        let (_id, rx) = controller.subscribe();
        controller.open("Stereo Out").unwrap();
        controller.set_queued_track(Some(clip("pad", 10_000)), None);
        controller.start(0).unwrap();
        host.render(256).unwrap();

        controller.stop(600).unwrap();
        assert_eq!(controller.state(), StreamState::FadingOut);
        controller.stop(10).unwrap();
        assert_eq!(controller.state(), StreamState::FadingOut);

        host.render(256).unwrap();
        host.render(256).unwrap();
        assert!(controller.is_running());
        let last = host.render(256).unwrap();
        assert!(!controller.is_running());
        // 600 - 512 = 88 faded frames in the last buffer, silence after
        assert!(last[..176].iter().all(|s| *s > 0.0));
        assert!(last[176..].iter().all(|s| *s == 0.0));
        assert!(wait_for(&rx, PlaybackEvent::Stopped));

        assert!(wait_until(|| !host.is_playing()));
        assert!(host.render(16).is_none());
        controller.start(0).unwrap();
        assert!(controller.is_running());
        assert_eq!(host.render(1).unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_end_of_clip_pauses_host_stream() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        controller.open("Stereo Out").unwrap();
        controller.set_queued_track(Some(clip("hit", 600)), None);
        controller.start(0).unwrap();

        host.render(256).unwrap();
        host.render(256).unwrap();
        let last = host.render(256).unwrap();
        assert!(last[..176].iter().all(|s| *s == 0.5));
        assert!(last[176..].iter().all(|s| *s == 0.0));
        assert!(!controller.is_running());

        assert!(wait_until(|| !host.is_playing()));
        assert!(host.render(256).is_none());
    }

    #[test]
    fn test_events_arrive_in_causal_order() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        controller.open("Stereo Out").unwrap();
        let (_id, rx) = controller.subscribe();

        controller.set_queued_track(Some(clip("hit", 2000)), None);
        controller.start(0).unwrap();
        host.render(256).unwrap();
        controller.stop(0).unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                PlaybackEvent::QueueChanged,
                PlaybackEvent::Started,
                PlaybackEvent::TrackStarted("hit".to_string()),
                PlaybackEvent::QueueChanged,
                PlaybackEvent::Stopped,
            ]
        );
    }

    #[test]
    fn test_abort_discards_fade_and_idle_clears() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        controller.open("Stereo Out").unwrap();
        controller.set_queued_track(Some(clip("pad", 10_000)), None);
        controller.start(0).unwrap();
        controller.stop(10_000).unwrap();
        host.render(256).unwrap();

        controller.abort().unwrap();
        assert_eq!(controller.state(), StreamState::Open);
        for _ in 0..100 {
            controller.clear_active_track();
        }
        controller.set_queued_track(Some(clip("pad2", 10_000)), None);
        controller.start(0).unwrap();

        let out = host.render(256).unwrap();
        assert!(out.iter().all(|s| *s == 0.5));
        assert_eq!(controller.active_track().unwrap().name(), "pad2");
        assert_eq!(controller.state(), StreamState::Running);
    }

    #[test]
    fn test_auto_play_starts_stream() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        controller.open("Stereo Out").unwrap();
        let (_id, rx) = controller.subscribe();

        let auto = Arc::new(
            Clip::new("auto", AudioBuffer::new(vec![0.5; 2000], 2).unwrap()).with_auto_play(true),
        );
        controller.set_queued_track(Some(auto), None);
        assert!(controller.is_running());
        assert_eq!(rx.try_recv(), Ok(PlaybackEvent::Started));
        assert_eq!(rx.try_recv(), Ok(PlaybackEvent::QueueChanged));

        host.render(16).unwrap();
        assert!(wait_for(&rx, PlaybackEvent::TrackStarted("auto".to_string())));
    }

    #[test]
    fn test_queue_clip_uses_paired_aux() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        controller.open("Quad Out").unwrap();

        let aux = Arc::new(Clip::new(
            "click",
            AudioBuffer::new(vec![0.25; 1000], 1).unwrap(),
        ));
        let main = Arc::new(
            Clip::new("song", AudioBuffer::new(vec![0.5; 2000], 2).unwrap())
                .with_paired_aux(Some(aux)),
        );
        controller.queue_clip(main);
        assert_eq!(controller.queued_track().unwrap().name(), "song");

        controller.start(0).unwrap();
        let out = host.render(4).unwrap();
        assert_eq!(&out[..4], &[0.5, 0.5, 0.25, 0.25]);
        assert_eq!(controller.active_aux_track().unwrap().name(), "click");
    }

    #[test]
    fn test_aux_on_stereo_device_stays_in_bounds() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        controller.open("Stereo Out").unwrap();

        let aux = clip("click", 1000);
        controller.set_queued_track(Some(clip("song", 2000)), Some(aux));
        controller.start(0).unwrap();
        assert_eq!(host.render(256).unwrap().len(), 512);
    }

    #[test]
    fn test_clear_active_track() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        controller.open("Stereo Out").unwrap();
        controller.set_queued_track(Some(clip("hit", 2000)), None);
        controller.start(0).unwrap();
        host.render(64).unwrap();

        controller.clear_active_track();
        assert!(controller.active_track().is_none());
        assert_eq!(controller.active_sample_offset(), 0);

        // Nothing queued, so the next callback ends playback
        host.render(64).unwrap();
        assert!(!controller.is_running());
    }

    #[test]
    fn test_close_while_running() {
        let host = host();
        let mut controller = StreamController::new(host.clone());
        let (_id, rx) = controller.subscribe();
        controller.open("Stereo Out").unwrap();
        controller.set_queued_track(Some(clip("hit", 2000)), None);
        controller.start(0).unwrap();
        host.render(64).unwrap();

        controller.close();
        assert_eq!(controller.state(), StreamState::Closed);
        assert!(host.render(64).is_none());
        assert!(controller.active_track().is_none());
        assert!(controller.queued_track().is_none());

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.last(), Some(&PlaybackEvent::Closed));
        assert!(events.contains(&PlaybackEvent::Stopped));
        assert!(events.contains(&PlaybackEvent::TrackStarted("hit".to_string())));

        // Closing twice is harmless
        controller.close();
    }
}
