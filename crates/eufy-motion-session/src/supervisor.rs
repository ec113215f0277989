//! Session supervisor: connect, handshake, stream, reconnect.

use std::{convert::Infallible, time::Duration};

use eufy_motion_core::{
    ConfigHandle, Connection, Connector, FrameSink, InboundFrame, MotionState, SessionConfig,
};
use eufy_motion_transport::{OutgoingMessage, decode, encode};
use futures::StreamExt;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    dispatcher::EventDispatcher,
    error::SessionError,
    prober::{LivenessProber, PROBE_INTERVAL},
};

/// Delay before the first attempt.
pub const STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Delay between the end of an attempt and the start of the next one.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Supervisor timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Wait before the first attempt, to spread out sessions started together.
    pub startup_delay: Duration,
    /// Fixed backoff between attempts.
    pub retry_delay: Duration,
    /// Ping period on a live connection.
    pub probe_interval: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            startup_delay: STARTUP_DELAY,
            retry_delay: RETRY_DELAY,
            probe_interval: PROBE_INTERVAL,
        }
    }
}

/// Supervisor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    Stopped,
}

/// Long-lived session tracking motion for one watched device.
///
/// The session retries forever: every attempt that ends, for whatever
/// reason, is followed by a new one after the retry delay until
/// [`MotionSession::stop`] is called. Dropping the session stops it.
pub struct MotionSession {
    config: ConfigHandle,
    motion: MotionState,
    state: watch::Sender<SupervisorState>,
    task: Option<JoinHandle<()>>,
}

impl MotionSession {
    /// Spawn the supervisor on the current tokio runtime.
    #[must_use]
    pub fn spawn<C>(config: ConfigHandle, connector: C, options: SupervisorOptions) -> Self
    where
        C: Connector + 'static,
    {
        let motion = MotionState::new();
        let (state, state_rx) = watch::channel(SupervisorState::Running);

        let supervisor = Supervisor {
            config: config.clone(),
            connector,
            motion: motion.clone(),
            state: state_rx,
            options,
        };
        let task = tokio::spawn(supervisor.run());

        Self {
            config,
            motion,
            state,
            task: Some(task),
        }
    }

    /// Current motion flag.
    #[must_use]
    pub fn motion_detected(&self) -> bool {
        self.motion.get()
    }

    /// Motion flag, for subscribing to changes.
    #[must_use]
    pub const fn motion(&self) -> &MotionState {
        &self.motion
    }

    /// Config read at the start of every attempt.
    #[must_use]
    pub const fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Release the session.
    ///
    /// An attempt in flight runs to its natural end; no attempt starts
    /// afterwards. Pending startup and retry waits are cut short.
    pub fn stop(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == SupervisorState::Running {
                *state = SupervisorState::Stopped;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!(
                entity = %self.config.snapshot().watched_entity_id,
                "session released"
            );
        }
    }

    /// Whether the supervisor task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the supervisor task to exit. Does not stop it.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("session supervisor task failed: {e}");
            }
        }
    }
}

impl Drop for MotionSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Supervisor<C> {
    config: ConfigHandle,
    connector: C,
    motion: MotionState,
    state: watch::Receiver<SupervisorState>,
    options: SupervisorOptions,
}

impl<C: Connector> Supervisor<C> {
    async fn run(mut self) {
        let mut attempt: u64 = 0;

        if !self.wait_unless_stopped(self.options.startup_delay).await {
            while !self.stopped() {
                attempt += 1;
                let config = self.config.snapshot();
                let error = self.run_attempt(&config, attempt).await;
                if self.stopped() {
                    tracing::info!(
                        entity = %config.watched_entity_id,
                        attempt,
                        error = %error,
                        "session ended after release"
                    );
                    break;
                }
                tracing::error!(
                    entity = %config.watched_entity_id,
                    endpoint = %config.server_endpoint,
                    attempt,
                    error = %error,
                    delay = ?self.options.retry_delay,
                    "session unexpectedly terminated, restarting"
                );

                if self.wait_unless_stopped(self.options.retry_delay).await {
                    break;
                }
            }
        }

        tracing::info!(attempts = attempt, "session supervisor stopped");
    }

    fn stopped(&self) -> bool {
        *self.state.borrow() == SupervisorState::Stopped
    }

    /// Sleep for `delay`; returns `true` if the session was stopped.
    async fn wait_unless_stopped(&mut self, delay: Duration) -> bool {
        let stopped = tokio::select! {
            () = tokio::time::sleep(delay) => false,
            _ = self.state.wait_for(|state| *state == SupervisorState::Stopped) => true,
        };
        stopped || self.stopped()
    }

    /// Run one attempt to its end and return why it ended.
    async fn run_attempt(&self, config: &SessionConfig, attempt: u64) -> SessionError {
        match self.drive(config, attempt).await {
            Ok(never) => match never {},
            Err(error) => error,
        }
    }

    async fn drive(&self, config: &SessionConfig, attempt: u64) -> Result<Infallible, SessionError> {
        config.validate()?;

        let Connection {
            mut sink,
            mut frames,
        } = self.connector.connect(&config.server_endpoint).await?;
        tracing::info!(
            entity = %config.watched_entity_id,
            endpoint = %config.server_endpoint,
            attempt,
            "connected"
        );

        let mut dispatcher =
            EventDispatcher::new(config.watched_entity_id.clone(), self.motion.clone());
        if let Some(negotiate) = dispatcher.handshake_mut().on_open() {
            send(&mut *sink, &negotiate).await?;
        }
        let mut prober = LivenessProber::start(self.options.probe_interval);

        loop {
            tokio::select! {
                frame = frames.next() => {
                    let text = match frame {
                        Some(Ok(InboundFrame::Text(text))) => text,
                        Some(Ok(InboundFrame::Closed { code, reason })) => {
                            return Err(SessionError::Closed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            return Err(SessionError::Closed {
                                code: None,
                                reason: String::new(),
                            });
                        }
                    };

                    let envelope = decode(&text)?;
                    if let Some(reply) = dispatcher.handle(&envelope) {
                        send(&mut *sink, &reply).await?;
                        dispatcher.handshake_mut().on_subscribe_sent();
                    }
                }
                () = prober.tick() => prober.probe(&mut *sink).await?,
            }
        }
    }
}

async fn send(sink: &mut dyn FrameSink, message: &OutgoingMessage) -> Result<(), SessionError> {
    let text = encode(message)?;
    sink.send_text(text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use eufy_motion_core::ConfigError;
    use eufy_motion_transport::memory::{self, MemoryListener, MemoryPeer};
    use futures::FutureExt;
    use serde_json::{Value, json};
    use tokio::time::{Instant, sleep, timeout};

    use super::*;

    const ENDPOINT: &str = "ws://host:3000";
    const SERIAL: &str = "T8210N0123";

    fn spawn_session(endpoint: &str) -> (MotionSession, MemoryListener) {
        let (connector, listener) = memory::channel();
        let config = ConfigHandle::new(SessionConfig::new(endpoint, SERIAL));
        let session = MotionSession::spawn(config, connector, SupervisorOptions::default());
        (session, listener)
    }

    fn motion_event(serial: &str, value: bool) -> Value {
        json!({
            "type": "event",
            "event": {
                "source": "device",
                "event": "property changed",
                "serialNumber": serial,
                "name": "motionDetected",
                "value": value,
            }
        })
    }

    /// Let the session task drain everything queued for it.
    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    fn assert_delay(from: Instant, to: Instant, expected: Duration) {
        let elapsed = to - from;
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "elapsed {elapsed:?}, expected {expected:?}"
        );
    }

    async fn accept_and_subscribe(listener: &mut MemoryListener) -> MemoryPeer {
        let mut peer = listener.accept().await.unwrap();
        assert_eq!(
            peer.recv_json().await.unwrap(),
            json!({"messageId": "1", "command": "set_api_schema", "schemaVersion": 7})
        );
        peer.send_json(&json!({"type": "result", "success": true, "messageId": "1", "result": {}}));
        assert_eq!(
            peer.recv_json().await.unwrap(),
            json!({"messageId": "2", "command": "start_listening"})
        );
        peer
    }

    #[tokio::test(start_paused = true)]
    async fn test_motion_scenario() {
        let start = Instant::now();
        let (session, mut listener) = spawn_session(ENDPOINT);

        let peer = accept_and_subscribe(&mut listener).await;
        assert_delay(start, Instant::now(), STARTUP_DELAY);
        assert_eq!(peer.endpoint(), ENDPOINT);
        assert!(!session.motion_detected());

        let mut motion = session.motion().subscribe();
        peer.send_json(&motion_event(SERIAL, true));
        tokio_test::assert_ok!(motion.wait_for(|detected| *detected).await);
        assert!(session.motion_detected());

        peer.send_json(&motion_event("OTHER", false));
        settle().await;
        assert!(session.motion_detected());

        peer.send_json(&motion_event(SERIAL, false));
        settle().await;
        assert!(!session.motion_detected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_waits_for_matching_ack() {
        let (_session, mut listener) = spawn_session(ENDPOINT);
        let mut peer = listener.accept().await.unwrap();
        assert!(peer.recv_json().await.is_some());

        peer.send_json(&json!({"type": "version", "driverVersion": "1.0"}));
        peer.send_json(&json!({"type": "result", "success": true, "messageId": "9"}));
        settle().await;
        assert!(peer.try_recv_text().is_none());

        peer.send_json(&json!({"type": "result", "success": true, "messageId": 1}));
        assert_eq!(
            peer.recv_json().await.unwrap(),
            json!({"messageId": "2", "command": "start_listening"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_after_streaming_reconnects() {
        let (_session, mut listener) = spawn_session(ENDPOINT);
        let peer = accept_and_subscribe(&mut listener).await;

        let closed_at = Instant::now();
        peer.close(1006, "server restart");

        // Ids restart on the new connection.
        let peer = accept_and_subscribe(&mut listener).await;
        assert_delay(closed_at, Instant::now(), RETRY_DELAY);
        assert_eq!(peer.endpoint(), ENDPOINT);
        assert_eq!(listener.attempts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_connection_and_errors_reconnect() {
        let (_session, mut listener) = spawn_session(ENDPOINT);

        let peer = accept_and_subscribe(&mut listener).await;
        drop(peer);
        let peer = accept_and_subscribe(&mut listener).await;
        peer.fail("connection reset");
        let peer = accept_and_subscribe(&mut listener).await;
        peer.send_text("not json");
        let _peer = accept_and_subscribe(&mut listener).await;

        assert_eq!(listener.attempts().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_event_shapes_keep_connection() {
        let (session, mut listener) = spawn_session(ENDPOINT);
        let peer = accept_and_subscribe(&mut listener).await;

        peer.send_json(&json!({
            "type": "event",
            "event": {"source": "station", "event": "alarm event", "serialNumber": "X", "name": 7}
        }));
        peer.send_json(&json!({"type": "event", "event": {"event": 3, "serialNumber": [SERIAL]}}));
        sleep(RETRY_DELAY * 2 + Duration::from_secs(1)).await;
        assert_eq!(listener.attempts().len(), 1);

        peer.send_json(&motion_event(SERIAL, true));
        settle().await;
        assert!(session.motion_detected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_stop_with_the_attempt() {
        let (_session, mut listener) = spawn_session(ENDPOINT);
        let peer = accept_and_subscribe(&mut listener).await;

        sleep(PROBE_INTERVAL * 2 + Duration::from_secs(1)).await;
        assert_eq!(peer.pings(), 2);

        peer.close(1000, "");
        settle().await;
        sleep(PROBE_INTERVAL * 4).await;
        assert_eq!(peer.pings(), 2);

        // The replacement connection has its own prober.
        let next = listener.accept().await.unwrap();
        sleep(PROBE_INTERVAL + Duration::from_secs(1)).await;
        assert!(next.pings() >= 1);
        assert_eq!(peer.pings(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_endpoint_never_connects() {
        let (session, mut listener) = spawn_session("");

        sleep(STARTUP_DELAY + RETRY_DELAY * 5).await;
        assert!(listener.attempts().is_empty());
        assert_eq!(session.state(), SupervisorState::Running);

        // Fixing the config is enough for the next attempt to connect.
        session.config().put_setting("apiHost", ENDPOINT).unwrap();
        let peer = accept_and_subscribe(&mut listener).await;
        assert_eq!(peer.endpoint(), ENDPOINT);
    }

    #[test]
    fn test_empty_endpoint_fails_synchronously() {
        let (connector, listener) = memory::channel();
        let (_state_tx, state_rx) = watch::channel(SupervisorState::Running);
        let supervisor = Supervisor {
            config: ConfigHandle::default(),
            connector,
            motion: MotionState::new(),
            state: state_rx,
            options: SupervisorOptions::default(),
        };

        let config = SessionConfig::new("", SERIAL);
        let error = supervisor
            .run_attempt(&config, 1)
            .now_or_never()
            .expect("attempt should end without suspending");
        assert!(matches!(
            error,
            SessionError::Configuration(ConfigError::MissingEndpoint)
        ));
        assert!(listener.attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_forever_with_fixed_delay() {
        let (session, listener) = spawn_session(ENDPOINT);
        listener.refuse_connections(true);

        sleep(STARTUP_DELAY + RETRY_DELAY * 100 - Duration::from_secs(1)).await;
        let attempts = listener.attempts();
        assert_eq!(attempts.len(), 100);
        for pair in attempts.windows(2) {
            assert_delay(pair[0].at, pair[1].at, RETRY_DELAY);
        }
        assert!(!session.is_finished());

        session.stop();
        sleep(RETRY_DELAY * 10).await;
        assert_eq!(listener.attempts().len(), 100);
        assert!(session.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_startup_delay() {
        let (session, listener) = spawn_session(ENDPOINT);
        session.stop();
        session.stop();
        assert_eq!(session.state(), SupervisorState::Stopped);

        timeout(Duration::from_secs(60), session.join())
            .await
            .unwrap();
        assert!(listener.attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_attempt_in_flight_finish() {
        let (session, mut listener) = spawn_session(ENDPOINT);
        let peer = accept_and_subscribe(&mut listener).await;

        session.stop();
        settle().await;
        assert!(!session.is_finished());

        peer.send_json(&motion_event(SERIAL, true));
        settle().await;
        assert!(session.motion_detected());

        peer.close(1000, "");
        // Either nothing arrives or the listener sees the connector go away.
        let next = timeout(RETRY_DELAY * 10, listener.accept()).await;
        assert!(next.ok().flatten().is_none());
        assert!(session.is_finished());
        assert_eq!(listener.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_session_stops_retries() {
        let (session, listener) = spawn_session(ENDPOINT);
        listener.refuse_connections(true);

        sleep(STARTUP_DELAY + Duration::from_secs(1)).await;
        assert_eq!(listener.attempts().len(), 1);

        drop(session);
        sleep(RETRY_DELAY * 10).await;
        assert_eq!(listener.attempts().len(), 1);
    }
}
