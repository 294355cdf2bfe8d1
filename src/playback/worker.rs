//! Stream thread
//!
//! Host streams are not `Send` on every platform, so each open stream lives
//! on its own thread for its whole life and is driven with requests over a
//! channel. Both the controller and the event dispatcher hold a sender: the
//! dispatcher uses it to pause the stream as soon as the callback reports
//! that playback halted, without waiting for another control call.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use super::state::SharedPlayback;
use crate::device::{AudioHost, Device, OutputStream, RenderFn, StreamSettings};
use crate::error::HostError;

type Reply = Sender<Result<(), HostError>>;

enum StreamRequest {
    Play(Reply),
    Pause(Reply),
    /// Pause if the callback has halted playback
    Settle,
    Close,
}

/// Handle the dispatcher uses to ask for a pause after a callback halt
#[derive(Clone)]
pub struct SettleHandle {
    requests: Sender<StreamRequest>,
}

impl SettleHandle {
    pub fn settle(&self) {
        // The stream thread is gone once the device is closed
        let _ = self.requests.send(StreamRequest::Settle);
    }
}

/// Owner of one open host stream
pub struct StreamWorker {
    requests: Sender<StreamRequest>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl StreamWorker {
    /// Open a paused stream on a new thread.
    ///
    /// Returns once the host has accepted or rejected the stream.
    pub fn spawn<H: AudioHost>(
        host: Arc<H>,
        device: Device,
        settings: StreamSettings,
        render: RenderFn,
        shared: Arc<SharedPlayback>,
    ) -> Result<Self, HostError> {
        let (requests, request_rx) = mpsc::channel();
        let (opened_tx, opened_rx) = mpsc::channel();

        let thread_handle = thread::Builder::new()
            .name("output-stream".to_string())
            .spawn(move || {
                let stream = match host.open_stream(&device, &settings, render) {
                    Ok(stream) => {
                        let _ = opened_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = opened_tx.send(Err(e));
                        return;
                    }
                };
                run(stream, request_rx, &shared);
            })
            .map_err(HostError::new)?;

        let opened = opened_rx
            .recv()
            .unwrap_or_else(|_| Err(HostError::new("stream thread exited")));
        let mut worker = Self {
            requests,
            thread_handle: Some(thread_handle),
        };
        if let Err(e) = opened {
            worker.shutdown();
            return Err(e);
        }
        Ok(worker)
    }

    pub fn play(&self) -> Result<(), HostError> {
        self.request(StreamRequest::Play)
    }

    pub fn pause(&self) -> Result<(), HostError> {
        self.request(StreamRequest::Pause)
    }

    pub fn settle_handle(&self) -> SettleHandle {
        SettleHandle {
            requests: self.requests.clone(),
        }
    }

    /// Close the stream and wait for the thread. No callback runs after
    /// this returns.
    pub fn shutdown(&mut self) {
        let _ = self.requests.send(StreamRequest::Close);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Stream thread panicked");
            }
        }
    }

    fn request(&self, make: impl FnOnce(Reply) -> StreamRequest) -> Result<(), HostError> {
        let (tx, rx) = mpsc::channel();
        self.requests
            .send(make(tx))
            .map_err(|_| HostError::new("stream thread exited"))?;
        rx.recv()
            .unwrap_or_else(|_| Err(HostError::new("stream thread exited")))
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<S: OutputStream>(
    stream: S,
    requests: mpsc::Receiver<StreamRequest>,
    shared: &SharedPlayback,
) {
    let mut playing = false;

    for request in requests {
        match request {
            StreamRequest::Play(reply) => {
                let result = stream.play();
                playing = result.is_ok();
                let _ = reply.send(result);
            }
            StreamRequest::Pause(reply) => {
                playing = false;
                let _ = reply.send(stream.pause());
            }
            StreamRequest::Settle => {
                if playing && !shared.stream_state().is_running() {
                    playing = false;
                    match stream.pause() {
                        Ok(()) => log::debug!("Paused stream after playback ended"),
                        Err(e) => log::warn!("Failed to pause stream: {}", e),
                    }
                }
            }
            StreamRequest::Close => break,
        }
    }
    // Dropping the stream here closes it on the thread that built it
}
