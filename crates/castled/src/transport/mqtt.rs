//! MQTT session backed by `rumqttc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, LastWill, MqttOptions,
    Outgoing, Packet, QoS, Transport,
};
use tracing::{debug, info, warn};

use castle_config::{BrokerEndpoint, Config};

use super::{
    DeliveryTracker, MessagePublisher, OutboundMessage, Session, SessionFactory, SessionHandler,
    TRANSPORT_TARGET, TransportError,
};

/// Bound on requests queued between the agent and the network thread.
const REQUEST_CAPACITY: usize = 64;

/// Connection parameters for an [`MqttSession`].
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// Broker location and transport.
    pub endpoint: BrokerEndpoint,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Delay before reconnecting after the session drops.
    pub reconnect_delay: Duration,
    /// Topic subscribed after every successful connect.
    pub request_topic: String,
    /// Message the broker publishes if the agent vanishes.
    pub last_will: Option<OutboundMessage>,
}

impl MqttSettings {
    /// Derives settings from the resolved configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.broker(),
            client_id: config.client_id(),
            keep_alive: config.keep_alive(),
            reconnect_delay: config.reconnect_delay(),
            request_topic: config.topics().request,
            last_will: None,
        }
    }

    /// Registers a last-will message with the broker.
    #[must_use]
    pub fn with_last_will(mut self, message: OutboundMessage) -> Self {
        self.last_will = Some(message);
        self
    }

    fn options(&self) -> MqttOptions {
        let endpoint = &self.endpoint;
        let mut options = if endpoint.is_websocket() {
            // rumqttc expects the full URL as the host for websocket brokers.
            let mut options =
                MqttOptions::new(&self.client_id, endpoint.to_string(), endpoint.port);
            options.set_transport(Transport::Ws);
            options
        } else {
            MqttOptions::new(&self.client_id, &endpoint.host, endpoint.port)
        };
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some(will) = &self.last_will {
            options.set_last_will(LastWill::new(
                &will.topic,
                will.payload.clone(),
                QoS::AtLeastOnce,
                will.retain,
            ));
        }
        options
    }
}

/// Publisher that queues messages on an [`MqttSession`].
#[derive(Clone)]
struct MqttPublisher {
    client: Client,
    tracker: Arc<DeliveryTracker>,
}

impl MessagePublisher for MqttPublisher {
    fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let OutboundMessage {
            topic,
            payload,
            retain,
        } = message;
        self.tracker.record_queued();
        self.client
            .try_publish(&topic, QoS::AtLeastOnce, retain, payload)
            .map_err(|error| {
                self.tracker.record_abandoned();
                TransportError::publish(&topic, error)
            })
    }
}

/// Broker session running its network loop on a dedicated thread.
pub struct MqttSession {
    settings: MqttSettings,
    publisher: MqttPublisher,
    connection: Option<Connection>,
    shutdown: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MqttSession {
    /// Configures a session. No network activity happens until
    /// [`Session::start`].
    #[must_use]
    pub fn new(settings: MqttSettings) -> Self {
        let (client, connection) = Client::new(settings.options(), REQUEST_CAPACITY);
        Self {
            settings,
            publisher: MqttPublisher {
                client,
                tracker: Arc::new(DeliveryTracker::new()),
            },
            connection: Some(connection),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Session for MqttSession {
    fn publisher(&self) -> Arc<dyn MessagePublisher> {
        Arc::new(self.publisher.clone())
    }

    fn start(&mut self, handler: Arc<dyn SessionHandler>) -> Result<(), TransportError> {
        let connection = self
            .connection
            .take()
            .ok_or(TransportError::AlreadyStarted)?;
        let event_loop = EventLoop {
            client: self.publisher.client.clone(),
            tracker: Arc::clone(&self.publisher.tracker),
            shutdown: Arc::clone(&self.shutdown),
            handler,
            request_topic: self.settings.request_topic.clone(),
            reconnect_delay: self.settings.reconnect_delay,
            last_error: None,
        };
        info!(
            target: TRANSPORT_TARGET,
            broker = %self.settings.endpoint,
            client_id = %self.settings.client_id,
            "starting broker session"
        );
        let worker = thread::Builder::new()
            .name(String::from("castled-mqtt"))
            .spawn(move || event_loop.run(connection))
            .map_err(|source| TransportError::Spawn { source })?;
        self.worker = Some(worker);
        Ok(())
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.publisher.tracker.wait_for_all(timeout)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.shutdown.store(true, Ordering::SeqCst);
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        // Fails only when the network loop has already exited.
        if let Err(error) = self.publisher.client.disconnect() {
            debug!(
                target: TRANSPORT_TARGET,
                %error,
                "disconnect request not queued"
            );
        }
        worker.join().map_err(|_| TransportError::ThreadPanic)
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!(
                target: TRANSPORT_TARGET,
                %error,
                "broker session did not close cleanly"
            );
        }
    }
}

/// Opens [`MqttSession`]s from the agent configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct MqttSessionFactory;

impl SessionFactory for MqttSessionFactory {
    type Session = MqttSession;

    fn open(
        &self,
        config: &Config,
        last_will: OutboundMessage,
    ) -> Result<Self::Session, TransportError> {
        let settings = MqttSettings::from_config(config).with_last_will(last_will);
        Ok(MqttSession::new(settings))
    }
}

/// What the network loop does after handling one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Wait out the reconnect delay before polling again.
    Backoff,
    Stop,
}

struct EventLoop {
    client: Client,
    tracker: Arc<DeliveryTracker>,
    shutdown: Arc<AtomicBool>,
    handler: Arc<dyn SessionHandler>,
    request_topic: String,
    reconnect_delay: Duration,
    /// Last reported failure; repeats are not reported again.
    last_error: Option<String>,
}

impl EventLoop {
    fn run(mut self, mut connection: Connection) {
        for notification in connection.iter() {
            match self.handle(notification) {
                Flow::Continue => {}
                Flow::Backoff => thread::sleep(self.reconnect_delay),
                Flow::Stop => break,
            }
        }
        debug!(target: TRANSPORT_TARGET, "network loop exited");
    }

    fn handle(&mut self, notification: Result<Event, ConnectionError>) -> Flow {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                self.last_error = None;
                if ack.code == ConnectReturnCode::Success {
                    self.on_connected();
                } else {
                    warn!(
                        target: TRANSPORT_TARGET,
                        code = ?ack.code,
                        "broker refused connection"
                    );
                }
                Flow::Continue
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                self.handler.message(&publish.topic, &publish.payload);
                Flow::Continue
            }
            Ok(Event::Incoming(Packet::PubAck(_))) => {
                self.tracker.record_acknowledged();
                Flow::Continue
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!(target: TRANSPORT_TARGET, "disconnect sent");
                Flow::Stop
            }
            Ok(_) => Flow::Continue,
            Err(_) if self.shutdown.load(Ordering::SeqCst) => Flow::Stop,
            Err(error) => {
                let reason = error.to_string();
                if self.last_error.as_deref() != Some(reason.as_str()) {
                    warn!(
                        target: TRANSPORT_TARGET,
                        error = %reason,
                        retry_ms = self.reconnect_delay.as_millis(),
                        "broker connection error"
                    );
                    self.handler.disconnected(&reason);
                }
                self.last_error = Some(reason);
                Flow::Backoff
            }
        }
    }

    fn on_connected(&self) {
        if let Err(error) = self.client.try_subscribe(&self.request_topic, QoS::AtLeastOnce) {
            let error = TransportError::Subscribe {
                topic: self.request_topic.clone(),
                message: error.to_string(),
            };
            warn!(target: TRANSPORT_TARGET, %error, "subscription not queued");
        }
        self.handler.connected();
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Mutex, PoisonError};

    use rumqttc::{ConnAck, PubAck, Publish, Request};

    use super::*;

    const REQUEST_TOPIC: &str = "castle/desktop/request";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Connected,
        Disconnected(String),
        Message(String, Vec<u8>),
    }

    #[derive(Default)]
    struct RecordingHandler {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingHandler {
        fn calls(&self) -> Vec<Call> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn record(&self, call: Call) {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call);
        }
    }

    impl SessionHandler for RecordingHandler {
        fn connected(&self) {
            self.record(Call::Connected);
        }

        fn disconnected(&self, reason: &str) {
            self.record(Call::Disconnected(reason.to_owned()));
        }

        fn message(&self, topic: &str, payload: &[u8]) {
            self.record(Call::Message(topic.to_owned(), payload.to_vec()));
        }
    }

    struct Harness {
        event_loop: EventLoop,
        handler: Arc<RecordingHandler>,
        requests: flume::Receiver<Request>,
    }

    impl Harness {
        fn new() -> Self {
            let (sender, requests) = flume::unbounded();
            let handler = Arc::new(RecordingHandler::default());
            let event_loop = EventLoop {
                client: Client::from_sender(sender),
                tracker: Arc::new(DeliveryTracker::new()),
                shutdown: Arc::new(AtomicBool::new(false)),
                handler: handler.clone(),
                request_topic: String::from(REQUEST_TOPIC),
                reconnect_delay: Duration::from_millis(10),
                last_error: None,
            };
            Self {
                event_loop,
                handler,
                requests,
            }
        }

        fn handle(&mut self, event: Event) -> Flow {
            self.event_loop.handle(Ok(event))
        }

        fn fail(&mut self, reason: &str) -> Flow {
            let error = ConnectionError::Io(io::Error::other(reason.to_owned()));
            self.event_loop.handle(Err(error))
        }

        fn subscriptions(&self) -> Vec<String> {
            self.requests
                .try_iter()
                .filter_map(|request| match request {
                    Request::Subscribe(subscribe) => Some(subscribe.filters),
                    _ => None,
                })
                .flatten()
                .inspect(|filter| assert_eq!(filter.qos, QoS::AtLeastOnce))
                .map(|filter| filter.path)
                .collect()
        }
    }

    fn connack(code: ConnectReturnCode) -> Event {
        Event::Incoming(Packet::ConnAck(ConnAck::new(code, false)))
    }

    fn io_reason(reason: &str) -> String {
        ConnectionError::Io(io::Error::other(reason.to_owned())).to_string()
    }

    #[test]
    fn accepted_connections_subscribe_then_notify() {
        let mut harness = Harness::new();

        let flow = harness.handle(connack(ConnectReturnCode::Success));

        assert_eq!(flow, Flow::Continue);
        assert_eq!(harness.subscriptions(), vec![REQUEST_TOPIC]);
        assert_eq!(harness.handler.calls(), vec![Call::Connected]);
    }

    #[test]
    fn every_reconnect_subscribes_again() {
        let mut harness = Harness::new();

        harness.handle(connack(ConnectReturnCode::Success));
        harness.fail("connection reset");
        harness.handle(connack(ConnectReturnCode::Success));

        assert_eq!(harness.subscriptions(), vec![REQUEST_TOPIC, REQUEST_TOPIC]);
        assert_eq!(
            harness.handler.calls(),
            vec![
                Call::Connected,
                Call::Disconnected(io_reason("connection reset")),
                Call::Connected,
            ]
        );
    }

    #[test]
    fn refused_connections_neither_subscribe_nor_notify() {
        let mut harness = Harness::new();

        let flow = harness.handle(connack(ConnectReturnCode::NotAuthorized));

        assert_eq!(flow, Flow::Continue);
        assert!(harness.subscriptions().is_empty());
        assert!(harness.handler.calls().is_empty());
    }

    #[test]
    fn inbound_publishes_reach_the_handler() {
        let mut harness = Harness::new();
        let publish = Publish::new(REQUEST_TOPIC, QoS::AtLeastOnce, b"{}".to_vec());

        harness.handle(Event::Incoming(Packet::Publish(publish)));

        assert_eq!(
            harness.handler.calls(),
            vec![Call::Message(String::from(REQUEST_TOPIC), b"{}".to_vec())]
        );
    }

    #[test]
    fn acknowledgements_settle_queued_messages() {
        let mut harness = Harness::new();
        let tracker = Arc::clone(&harness.event_loop.tracker);
        tracker.record_queued();

        harness.handle(Event::Incoming(Packet::PubAck(PubAck::new(1))));

        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn sending_disconnect_stops_the_loop() {
        let mut harness = Harness::new();
        assert_eq!(harness.handle(Event::Outgoing(Outgoing::Disconnect)), Flow::Stop);
    }

    #[test]
    fn repeated_failures_are_reported_once() {
        let mut harness = Harness::new();

        assert_eq!(harness.fail("connection refused"), Flow::Backoff);
        assert_eq!(harness.fail("connection refused"), Flow::Backoff);
        harness.fail("host unreachable");

        assert_eq!(
            harness.handler.calls(),
            vec![
                Call::Disconnected(io_reason("connection refused")),
                Call::Disconnected(io_reason("host unreachable")),
            ]
        );
    }

    #[test]
    fn failures_during_shutdown_stop_quietly() {
        let mut harness = Harness::new();
        harness.event_loop.shutdown.store(true, Ordering::SeqCst);

        assert_eq!(harness.fail("connection reset"), Flow::Stop);
        assert!(harness.handler.calls().is_empty());
    }

    #[test]
    fn queued_publishes_are_counted() {
        let (sender, requests) = flume::unbounded();
        let publisher = MqttPublisher {
            client: Client::from_sender(sender),
            tracker: Arc::new(DeliveryTracker::new()),
        };

        publisher
            .publish(OutboundMessage::retained("castle/desktop/status", b"online".to_vec()))
            .expect("publish should queue");

        assert_eq!(publisher.tracker.outstanding(), 1);
        assert!(matches!(requests.try_recv(), Ok(Request::Publish(_))));
    }

    #[test]
    fn refused_publishes_are_not_awaited() {
        let (sender, requests) = flume::unbounded();
        drop(requests);
        let publisher = MqttPublisher {
            client: Client::from_sender(sender),
            tracker: Arc::new(DeliveryTracker::new()),
        };

        let error = publisher
            .publish(OutboundMessage::retained("castle/desktop/status", b"online".to_vec()))
            .expect_err("closed queue should refuse the publish");

        assert!(matches!(error, TransportError::Publish { .. }));
        assert_eq!(publisher.tracker.outstanding(), 0);
        assert!(publisher.tracker.wait_for_all(Duration::ZERO));
    }

    fn settings(endpoint: BrokerEndpoint) -> MqttSettings {
        MqttSettings {
            endpoint,
            client_id: String::from("castle_desktop_1"),
            keep_alive: Duration::from_secs(30),
            reconnect_delay: Duration::from_millis(10),
            request_topic: String::from("castle/desktop/request"),
            last_will: None,
        }
    }

    #[test]
    fn websocket_brokers_use_the_full_url_as_host() {
        let options = settings(BrokerEndpoint::websocket("broker", 1893, "mqtt")).options();
        assert_eq!(
            options.broker_address(),
            (String::from("ws://broker:1893/mqtt"), 1893)
        );
    }

    #[test]
    fn tcp_brokers_use_the_bare_host() {
        let options = settings(BrokerEndpoint::tcp("broker", 1883)).options();
        assert_eq!(options.broker_address(), (String::from("broker"), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert!(options.clean_session());
    }

    #[test]
    fn last_will_is_retained_when_requested() {
        let will = OutboundMessage::retained("castle/desktop/status", b"offline".to_vec());
        let options = settings(BrokerEndpoint::tcp("broker", 1883))
            .with_last_will(will)
            .options();
        let registered = options.last_will().expect("last will should be set");
        assert_eq!(registered.topic, "castle/desktop/status");
        assert!(registered.retain);
        assert_eq!(registered.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn closing_an_unstarted_session_is_a_no_op() {
        let mut session = MqttSession::new(settings(BrokerEndpoint::tcp("broker", 1883)));
        assert!(session.close().is_ok());
        assert!(session.close().is_ok());
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut session = MqttSession::new(settings(BrokerEndpoint::tcp("127.0.0.1", 1)));
        struct Quiet;
        impl SessionHandler for Quiet {
            fn connected(&self) {}
            fn disconnected(&self, _reason: &str) {}
            fn message(&self, _topic: &str, _payload: &[u8]) {}
        }
        session.start(Arc::new(Quiet)).expect("first start");
        let error = session.start(Arc::new(Quiet)).expect_err("second start");
        assert!(matches!(error, TransportError::AlreadyStarted));
        session.close().expect("close");
    }
}
