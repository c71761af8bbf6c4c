//! In-process stand-in for a broker session.
//!
//! [`LoopbackSession`] delivers injected events to its handler on a dedicated
//! thread, one at a time, mirroring the serialised delivery of the real
//! transport. Tests drive it through a [`LoopbackBroker`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use castle_config::Config;

use super::publisher::RecordingPublisher;
use crate::process::{ShutdownError, ShutdownSignal};
use crate::transport::{
    MessagePublisher, OutboundMessage, Session, SessionFactory, SessionHandler, TransportError,
};

enum LoopbackEvent {
    Connect,
    Drop(String),
    Deliver { topic: String, payload: Vec<u8> },
    Barrier(Sender<()>),
    Close,
}

/// Handle used by tests to inject broker events.
#[derive(Clone)]
pub struct LoopbackBroker {
    events: Sender<LoopbackEvent>,
    publisher: Arc<RecordingPublisher>,
    closes: Arc<AtomicUsize>,
}

impl LoopbackBroker {
    /// Simulates the broker accepting the session.
    pub fn connect(&self) {
        self.send(LoopbackEvent::Connect);
    }

    /// Simulates the connection dropping.
    pub fn drop_connection(&self, reason: &str) {
        self.send(LoopbackEvent::Drop(reason.to_owned()));
    }

    /// Delivers a message on `topic`.
    pub fn deliver(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.send(LoopbackEvent::Deliver {
            topic: topic.to_owned(),
            payload: payload.into(),
        });
    }

    /// Blocks until every event injected so far has been handled.
    pub fn settle(&self) {
        let (done, wait) = mpsc::channel();
        self.send(LoopbackEvent::Barrier(done));
        wait.recv_timeout(Duration::from_secs(10))
            .expect("loopback session should settle");
    }

    /// The publisher backing the session.
    #[must_use]
    pub fn publisher(&self) -> Arc<RecordingPublisher> {
        Arc::clone(&self.publisher)
    }

    /// Number of times the session was closed.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn send(&self, event: LoopbackEvent) {
        // The worker may already have exited after close; tests assert on
        // the recorded effects instead.
        drop(self.events.send(event));
    }
}

/// Session double driven by a [`LoopbackBroker`].
pub struct LoopbackSession {
    broker: LoopbackBroker,
    events: Option<Receiver<LoopbackEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl LoopbackSession {
    /// Creates a session and the broker handle that drives it.
    #[must_use]
    pub fn new() -> (Self, LoopbackBroker) {
        let (sender, receiver) = mpsc::channel();
        let broker = LoopbackBroker {
            events: sender,
            publisher: Arc::new(RecordingPublisher::default()),
            closes: Arc::new(AtomicUsize::new(0)),
        };
        let session = Self {
            broker: broker.clone(),
            events: Some(receiver),
            worker: None,
        };
        (session, broker)
    }
}

impl Session for LoopbackSession {
    fn publisher(&self) -> Arc<dyn MessagePublisher> {
        self.broker.publisher()
    }

    fn start(&mut self, handler: Arc<dyn SessionHandler>) -> Result<(), TransportError> {
        let events = self.events.take().ok_or(TransportError::AlreadyStarted)?;
        self.worker = Some(thread::spawn(move || {
            for event in events {
                match event {
                    LoopbackEvent::Connect => handler.connected(),
                    LoopbackEvent::Drop(reason) => handler.disconnected(&reason),
                    LoopbackEvent::Deliver { topic, payload } => handler.message(&topic, &payload),
                    LoopbackEvent::Barrier(done) => drop(done.send(())),
                    LoopbackEvent::Close => break,
                }
            }
        }));
        Ok(())
    }

    fn flush(&self, _timeout: Duration) -> bool {
        true
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.broker.closes.fetch_add(1, Ordering::SeqCst);
        self.broker.send(LoopbackEvent::Close);
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| TransportError::ThreadPanic),
            None => Ok(()),
        }
    }
}

/// Factory handing out loopback sessions and remembering the last will.
#[derive(Default)]
pub struct LoopbackSessionFactory {
    brokers: Mutex<Vec<LoopbackBroker>>,
    last_will: Mutex<Option<OutboundMessage>>,
}

impl LoopbackSessionFactory {
    /// Broker handle for the most recently opened session.
    #[must_use]
    pub fn broker(&self) -> Option<LoopbackBroker> {
        self.brokers
            .lock()
            .expect("factory mutex poisoned")
            .last()
            .cloned()
    }

    /// Last-will message registered by the most recent session.
    #[must_use]
    pub fn last_will(&self) -> Option<OutboundMessage> {
        self.last_will.lock().expect("factory mutex poisoned").clone()
    }
}

impl SessionFactory for &LoopbackSessionFactory {
    type Session = LoopbackSession;

    fn open(
        &self,
        _config: &Config,
        last_will: OutboundMessage,
    ) -> Result<Self::Session, TransportError> {
        let (session, broker) = LoopbackSession::new();
        self.brokers.lock().expect("factory mutex poisoned").push(broker);
        *self.last_will.lock().expect("factory mutex poisoned") = Some(last_will);
        Ok(session)
    }
}

/// Shutdown signal that fires immediately.
pub struct ImmediateShutdown;

impl ShutdownSignal for ImmediateShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        Ok(())
    }
}
