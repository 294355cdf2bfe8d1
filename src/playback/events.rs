//! Playback notifications
//!
//! Observers subscribe to an `EventBus` and receive `PlaybackEvent`s over a
//! channel. Events raised in the audio callback are pushed into a lock-free
//! ring and relayed by the `EventDispatcher` thread, which is also where cues
//! retired by the audio thread get dropped.
//!
//! While a stream is open the control thread emits through the dispatcher
//! too. Each control-side emit first relays whatever the callback has
//! already pushed, under the same lock the dispatcher thread drains with,
//! so observers see one causal order across both threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use ringbuf::traits::Consumer;
use ringbuf::HeapCons;

use crate::audio::Cue;

/// Notification delivered to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Opened,
    Closed,
    Started,
    Stopped,
    QueueChanged,
    /// A clip was promoted to the active slot
    TrackStarted(String),
}

/// Raised by the mixer on the audio thread
#[derive(Debug)]
pub enum MixerEvent {
    TrackStarted(Arc<Cue>),
    QueueChanged,
    /// The callback halted playback on its own
    Stopped,
    /// A cue left the active slot; dropped off the audio thread
    Retired(Arc<Cue>),
}

impl MixerEvent {
    fn into_playback_event(self) -> Option<PlaybackEvent> {
        match self {
            Self::TrackStarted(cue) => {
                Some(PlaybackEvent::TrackStarted(cue.main.name().to_string()))
            }
            Self::QueueChanged => Some(PlaybackEvent::QueueChanged),
            Self::Stopped => Some(PlaybackEvent::Stopped),
            Self::Retired(_) => None,
        }
    }
}

/// Handle returned by `EventBus::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    senders: Vec<(SubscriptionId, Sender<PlaybackEvent>)>,
}

/// Fan-out of playback events to any number of observers
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer
    pub fn subscribe(&self) -> (SubscriptionId, Receiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::channel();
        let mut subs = self.lock();
        let id = SubscriptionId(subs.next_id);
        subs.next_id += 1;
        subs.senders.push((id, tx));
        (id, rx)
    }

    /// Remove an observer. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.lock();
        let before = subs.senders.len();
        subs.senders.retain(|(sub, _)| *sub != id);
        subs.senders.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().senders.len()
    }

    /// Deliver to every observer, dropping the ones whose receiver is gone
    pub fn emit(&self, event: PlaybackEvent) {
        log::debug!("Playback event: {:?}", event);
        self.lock()
            .senders
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Called when the callback reports that it halted playback
pub type HaltHook = Box<dyn FnMut() + Send + 'static>;

/// Consumer side of the mixer's event ring
struct Relay {
    events: HeapCons<MixerEvent>,
    bus: EventBus,
    on_halt: HaltHook,
}

impl Relay {
    fn drain(&mut self) {
        while let Some(event) = self.events.try_pop() {
            if matches!(event, MixerEvent::Stopped) {
                (self.on_halt)();
            }
            if let Some(event) = event.into_playback_event() {
                self.bus.emit(event);
            }
        }
    }
}

/// How often the dispatcher drains the mixer's event ring
const DISPATCH_INTERVAL: Duration = Duration::from_millis(5);

/// Background thread relaying mixer events to the bus
pub struct EventDispatcher {
    relay: Arc<Mutex<Relay>>,
    is_running: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl EventDispatcher {
    pub fn spawn(events: HeapCons<MixerEvent>, bus: EventBus, on_halt: HaltHook) -> Self {
        let relay = Arc::new(Mutex::new(Relay {
            events,
            bus,
            on_halt,
        }));
        let is_running = Arc::new(AtomicBool::new(true));

        let thread_relay = Arc::clone(&relay);
        let running = Arc::clone(&is_running);
        let thread_handle = thread::Builder::new()
            .name("playback-events".to_string())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    lock_relay(&thread_relay).drain();
                    thread::sleep(DISPATCH_INTERVAL);
                }
                // Whatever the callback pushed before the stream closed
                lock_relay(&thread_relay).drain();
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to spawn event dispatcher: {}", e);
                None
            }
        };

        Self {
            relay,
            is_running,
            thread_handle,
        }
    }

    /// Relay pending mixer events, then run `action` before any event the
    /// callback raises from here on. `action` gets the bus to emit on.
    pub fn sequence<R>(&self, action: impl FnOnce(&EventBus) -> R) -> R {
        let mut relay = lock_relay(&self.relay);
        relay.drain();
        action(&relay.bus)
    }

    /// Emit a control-side event in order with the mixer's
    pub fn emit(&self, event: PlaybackEvent) {
        self.sequence(|bus| bus.emit(event));
    }

    /// Stop the thread after a final drain
    pub fn shutdown(&mut self) {
        self.is_running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Event dispatcher panicked");
            }
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock_relay(relay: &Mutex<Relay>) -> MutexGuard<'_, Relay> {
    relay.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Clip;
    use ringbuf::traits::{Producer, Split};
    use std::sync::atomic::AtomicUsize;
    use ringbuf::HeapRb;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();
        let (first, first_rx) = bus.subscribe();
        let (_second, second_rx) = bus.subscribe();

        bus.emit(PlaybackEvent::Opened);
        assert_eq!(first_rx.try_recv(), Ok(PlaybackEvent::Opened));
        assert_eq!(second_rx.try_recv(), Ok(PlaybackEvent::Opened));

        assert!(bus.unsubscribe(first));
        assert!(!bus.unsubscribe(first));
        bus.emit(PlaybackEvent::Closed);
        assert!(first_rx.try_recv().is_err());
        assert_eq!(second_rx.try_recv(), Ok(PlaybackEvent::Closed));
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe();
        drop(rx);
        bus.emit(PlaybackEvent::Started);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_dispatcher_relays_mixer_events() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe();
        let (mut prod, cons) = HeapRb::<MixerEvent>::new(8).split();

        let cue = Arc::new(Cue::new(Arc::new(Clip::without_buffer("intro")), None));
        prod.try_push(MixerEvent::Retired(Arc::clone(&cue))).unwrap();
        prod.try_push(MixerEvent::TrackStarted(cue)).unwrap();
        prod.try_push(MixerEvent::Stopped).unwrap();

        let halts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&halts);
        let on_halt: HaltHook = Box::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let mut dispatcher = EventDispatcher::spawn(cons, bus, on_halt);
        dispatcher.shutdown();

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                PlaybackEvent::TrackStarted("intro".to_string()),
                PlaybackEvent::Stopped
            ]
        );
        assert_eq!(halts.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_control_events_follow_pending_mixer_events() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe();
        let (mut prod, cons) = HeapRb::<MixerEvent>::new(8).split();
        let dispatcher = EventDispatcher::spawn(cons, bus, Box::new(|| {}));

        let cue = Arc::new(Cue::new(Arc::new(Clip::without_buffer("hit")), None));
        dispatcher.sequence(|bus| {
            prod.try_push(MixerEvent::TrackStarted(cue)).unwrap();
            bus.emit(PlaybackEvent::Started);
        });
        prod.try_push(MixerEvent::QueueChanged).unwrap();
        dispatcher.emit(PlaybackEvent::Stopped);

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                PlaybackEvent::Started,
                PlaybackEvent::TrackStarted("hit".to_string()),
                PlaybackEvent::QueueChanged,
                PlaybackEvent::Stopped,
            ]
        );
    }
}
