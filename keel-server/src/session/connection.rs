//! Connection Session
//!
//! Owns one control connection from first frame to close. Inbound frames are
//! decoded and dispatched strictly in arrival order, one at a time; each
//! decoded command gets exactly one ack before the next frame is read.
//! Events from the bus are interleaved between commands.
//!
//! Outbound writes are bounded by the same idle deadline and abort on
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use keel_core::codec;
use keel_core::dto::message::{PipelineEvent, ServerMessage};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::service::Actuator;
use crate::session::channel::{ControlChannel, Frame};

/// Upper bound on the close handshake with a peer that stopped reading
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Reading,
    Dispatching,
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    Transport(String),
    IdleTimeout,
    DispatchPanicked,
    Shutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::Transport(e) => write!(f, "transport error: {}", e),
            CloseReason::IdleTimeout => write!(f, "idle timeout"),
            CloseReason::DispatchPanicked => write!(f, "dispatch panicked"),
            CloseReason::Shutdown => write!(f, "server shutdown"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
        }
    }
}

pub struct Session<C> {
    id: Uuid,
    channel: C,
    actuator: Arc<Actuator>,
    events: broadcast::Receiver<PipelineEvent>,
    config: SessionConfig,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    deadline: Instant,
}

impl<C: ControlChannel> Session<C> {
    /// Binds a channel to the actuator; subscribes to events immediately
    pub fn new(
        channel: C,
        actuator: Arc<Actuator>,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let events = actuator.events().subscribe();
        Self {
            id: Uuid::new_v4(),
            channel,
            actuator,
            events,
            config,
            cancel,
            state: watch::Sender::new(SessionState::Open),
            deadline: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Follows the session's state, through to `Closed` after `run` returns
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Drives the session until it closes
    pub async fn run(mut self) -> CloseReason {
        let span = info_span!("session", session_id = %self.id);

        async {
            info!("Session opened");
            let reason = self.serve().await;

            if tokio::time::timeout(CLOSE_TIMEOUT, self.channel.close())
                .await
                .is_err()
            {
                debug!("Close handshake timed out");
            }
            self.state.send_replace(SessionState::Closed);

            match &reason {
                CloseReason::PeerClosed | CloseReason::Shutdown => {
                    info!(reason = %reason, "Session closed")
                }
                _ => warn!(reason = %reason, "Session closed"),
            }
            reason
        }
        .instrument(span)
        .await
    }

    async fn serve(&mut self) -> CloseReason {
        let idle = self.config.idle_timeout;
        self.deadline = Instant::now() + idle;
        let mut events_open = true;

        loop {
            self.state.send_replace(SessionState::Reading);

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return CloseReason::Shutdown,

                frame = self.channel.recv() => {
                    let frame = match frame {
                        None => return CloseReason::PeerClosed,
                        Some(Err(e)) => return CloseReason::Transport(e.to_string()),
                        Some(Ok(frame)) => frame,
                    };
                    self.deadline = Instant::now() + idle;

                    let payload = match frame {
                        Frame::Text(text) => text.into_bytes(),
                        Frame::Binary(data) => data,
                        Frame::Heartbeat => continue,
                    };
                    if let Err(reason) = self.handle_payload(&payload).await {
                        return reason;
                    }
                }

                event = self.events.recv(), if events_open => match event {
                    Ok(event) => {
                        if let Err(reason) = self.send(ServerMessage::event(event)).await {
                            return reason;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session fell behind the event bus");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event bus closed");
                        events_open = false;
                    }
                },

                _ = tokio::time::sleep_until(self.deadline) => return CloseReason::IdleTimeout,
            }
        }
    }

    async fn handle_payload(&mut self, payload: &[u8]) -> Result<(), CloseReason> {
        self.state.send_replace(SessionState::Dispatching);

        let reply = match codec::decode(payload) {
            Ok(command) => {
                let action = command.action();
                let actuator = Arc::clone(&self.actuator);
                match tokio::task::spawn_blocking(move || actuator.dispatch(&command)).await {
                    Ok(outcome) => ServerMessage::ack(action, outcome),
                    Err(e) if e.is_panic() => {
                        error!(action = %action, "Dispatch panicked");
                        return Err(CloseReason::DispatchPanicked);
                    }
                    Err(_) => return Err(CloseReason::Shutdown),
                }
            }
            Err(e) => {
                warn!(error = %e, "Rejected inbound message");
                ServerMessage::rejected(e.to_string())
            }
        };

        self.send(reply).await
    }

    async fn send(&mut self, message: ServerMessage) -> Result<(), CloseReason> {
        let text = codec::encode_message(&message)
            .map_err(|e| CloseReason::Transport(format!("encode failed: {}", e)))?;

        let sent = tokio::select! {
            biased;

            _ = self.cancel.cancelled() => return Err(CloseReason::Shutdown),
            sent = self.channel.send(text) => sent,
            _ = tokio::time::sleep_until(self.deadline) => return Err(CloseReason::IdleTimeout),
        };
        sent.map_err(|e| CloseReason::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Registry;
    use crate::service::effects::{
        DeployEffect, Deployed, EffectError, Effects, StartEffect, Started, StopEffect, Stopped,
    };
    use crate::service::EventBus;
    use crate::session::channel::TransportError;
    use crate::session::channel::memory::{self, Peer};
    use async_trait::async_trait;
    use keel_core::domain::pipeline::{Pipeline, Stage, StageStatus};
    use keel_core::dto::command::{Action, Command};
    use keel_core::dto::message::Outcome;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Notify, mpsc};
    use tokio::task::JoinHandle;

    #[derive(Default)]
    struct CountingEffects {
        calls: AtomicUsize,
    }

    impl StartEffect for CountingEffects {
        fn start(&self, _: &Pipeline) -> Result<Started, EffectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Started)
        }
    }

    impl StopEffect for CountingEffects {
        fn stop(&self, _: &Pipeline) -> Result<Stopped, EffectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Stopped)
        }
    }

    impl DeployEffect for CountingEffects {
        fn deploy(&self, _: &str, stage: &Stage) -> Result<Deployed, EffectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if stage.id == "boom" {
                panic!("deploy backend crashed");
            }
            Ok(Deployed::default())
        }
    }

    fn actuator(effects: Arc<CountingEffects>) -> Arc<Actuator> {
        let registry = Registry::from_pipelines([Pipeline::new("p1", "Build")
            .with_stage(Stage::new("s1", "compile"))
            .with_stage(Stage::new("boom", "explode"))])
        .unwrap();

        Arc::new(Actuator::new(
            Arc::new(registry),
            Effects::from_shared(effects),
            EventBus::new(64),
        ))
    }

    fn spawn_session(
        actuator: Arc<Actuator>,
        idle_timeout: Duration,
    ) -> (Peer, CancellationToken, JoinHandle<CloseReason>) {
        let (channel, peer) = memory::pair();
        let cancel = CancellationToken::new();
        let session = Session::new(
            channel,
            actuator,
            SessionConfig { idle_timeout },
            cancel.clone(),
        );

        (peer, cancel, tokio::spawn(session.run()))
    }

    /// Channel whose writes never complete, as with a peer that stopped reading
    struct StalledChannel {
        inbound: mpsc::UnboundedReceiver<Frame>,
        writing: Arc<Notify>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ControlChannel for StalledChannel {
        async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn send(&mut self, _text: String) -> Result<(), TransportError> {
            self.writing.notify_one();
            std::future::pending().await
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Stalled {
        inbound: mpsc::UnboundedSender<Frame>,
        writing: Arc<Notify>,
        closes: Arc<AtomicUsize>,
        cancel: CancellationToken,
        state: watch::Receiver<SessionState>,
        handle: JoinHandle<CloseReason>,
    }

    fn spawn_stalled_session(actuator: Arc<Actuator>, idle_timeout: Duration) -> Stalled {
        let (inbound, rx) = mpsc::unbounded_channel();
        let writing = Arc::new(Notify::new());
        let closes = Arc::new(AtomicUsize::new(0));
        let channel = StalledChannel {
            inbound: rx,
            writing: writing.clone(),
            closes: closes.clone(),
        };

        let cancel = CancellationToken::new();
        let session = Session::new(
            channel,
            actuator,
            SessionConfig { idle_timeout },
            cancel.clone(),
        );
        let state = session.watch_state();

        Stalled {
            inbound,
            writing,
            closes,
            cancel,
            state,
            handle: tokio::spawn(session.run()),
        }
    }

    fn expect_ack(message: ServerMessage) -> (Action, Outcome) {
        match message {
            ServerMessage::Ack {
                action, outcome, ..
            } => (action, outcome),
            other => panic!("expected ack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_message_keeps_session_open() {
        let effects = Arc::new(CountingEffects::default());
        let (mut peer, cancel, handle) =
            spawn_session(actuator(effects.clone()), Duration::from_secs(30));

        peer.send_text("{not json");
        match peer.next_message().await.unwrap() {
            ServerMessage::Rejected { error, .. } => assert!(error.contains("malformed")),
            other => panic!("expected rejection, got {:?}", other),
        }

        peer.send_text(r#"{"action":"start_pipeline","pipeline_id":"p1"}"#);
        let (action, outcome) = expect_ack(peer.next_message().await.unwrap());
        assert_eq!(action, Action::StartPipeline);
        assert_eq!(
            outcome,
            Outcome::Started {
                pipeline_id: "p1".into()
            }
        );

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), CloseReason::Shutdown);
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_action_never_reaches_effects() {
        let effects = Arc::new(CountingEffects::default());
        let (mut peer, _cancel, handle) =
            spawn_session(actuator(effects.clone()), Duration::from_secs(30));

        peer.send_text(r#"{"action":"delete_everything","pipeline_id":"p1"}"#);
        assert!(matches!(
            peer.next_message().await.unwrap(),
            ServerMessage::Rejected { .. }
        ));

        peer.send_frame(Frame::Binary(br#"{"pipeline_id":"p1"}"#.to_vec()));
        assert!(matches!(
            peer.next_message().await.unwrap(),
            ServerMessage::Rejected { .. }
        ));

        assert_eq!(effects.calls.load(Ordering::SeqCst), 0);

        peer.hang_up();
        assert_eq!(handle.await.unwrap(), CloseReason::PeerClosed);
    }

    #[tokio::test]
    async fn test_acks_follow_command_order() {
        let effects = Arc::new(CountingEffects::default());
        let actuator = actuator(effects);
        let (mut peer, _cancel, handle) = spawn_session(actuator.clone(), Duration::from_secs(30));

        peer.send_text(r#"{"action":"start_pipeline","pipeline_id":"p1"}"#);
        peer.send_text(r#"{"action":"stop_pipeline","pipeline_id":"missing"}"#);
        peer.send_text(r#"{"action":"deploy_stage","pipeline_id":"p1","stage_id":"s9"}"#);

        let mut acks = Vec::new();
        while acks.len() < 3 {
            if let ServerMessage::Ack { outcome, .. } = peer.next_message().await.unwrap() {
                acks.push(outcome);
            }
        }

        assert_eq!(
            acks,
            vec![
                Outcome::Started {
                    pipeline_id: "p1".into()
                },
                Outcome::PipelineNotFound {
                    pipeline_id: "missing".into()
                },
                Outcome::StageNotFound {
                    pipeline_id: "p1".into(),
                    stage_id: "s9".into()
                },
            ]
        );
        assert_eq!(
            actuator.registry().lookup_stage("p1", "s1").unwrap().status,
            StageStatus::Pending
        );

        peer.hang_up();
        assert_eq!(handle.await.unwrap(), CloseReason::PeerClosed);
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test]
    async fn test_deploy_ack_then_event() {
        let effects = Arc::new(CountingEffects::default());
        let (mut peer, cancel, handle) = spawn_session(actuator(effects), Duration::from_secs(30));

        peer.send_text(r#"{"action":"deploy_stage","pipeline_id":"p1","stage_id":"s1"}"#);

        let (_, outcome) = expect_ack(peer.next_message().await.unwrap());
        assert_eq!(
            outcome,
            Outcome::Deployed {
                pipeline_id: "p1".into(),
                stage_id: "s1".into(),
                status: StageStatus::Deployed,
            }
        );

        match peer.next_message().await.unwrap() {
            ServerMessage::Event { event, .. } => assert_eq!(
                event,
                PipelineEvent::StageStatusChanged {
                    pipeline_id: "p1".into(),
                    stage_id: "s1".into(),
                    previous: StageStatus::Pending,
                    status: StageStatus::Deployed,
                }
            ),
            other => panic!("expected event, got {:?}", other),
        }

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), CloseReason::Shutdown);
    }

    #[tokio::test]
    async fn test_transport_error_ends_session() {
        let effects = Arc::new(CountingEffects::default());
        let (peer, _cancel, handle) = spawn_session(actuator(effects), Duration::from_secs(30));

        peer.fail("connection reset");

        assert_eq!(
            handle.await.unwrap(),
            CloseReason::Transport("transport error: connection reset".into())
        );
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_panic_closes_session() {
        let effects = Arc::new(CountingEffects::default());
        let actuator = actuator(effects);
        let (peer, _cancel, handle) = spawn_session(actuator.clone(), Duration::from_secs(30));

        peer.send_text(r#"{"action":"deploy_stage","pipeline_id":"p1","stage_id":"boom"}"#);

        assert_eq!(handle.await.unwrap(), CloseReason::DispatchPanicked);
        assert_eq!(peer.close_count(), 1);
        assert_eq!(
            actuator.registry().lookup_stage("p1", "boom").unwrap().status,
            StageStatus::Pending
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout() {
        let effects = Arc::new(CountingEffects::default());
        let (_peer, _cancel, handle) = spawn_session(actuator(effects), Duration::from_secs(10));

        assert_eq!(handle.await.unwrap(), CloseReason::IdleTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_resets_idle_timer() {
        let effects = Arc::new(CountingEffects::default());
        let (peer, _cancel, handle) = spawn_session(actuator(effects), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(8)).await;
        peer.send_frame(Frame::Heartbeat);
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(!handle.is_finished());

        assert_eq!(handle.await.unwrap(), CloseReason::IdleTimeout);
    }

    #[tokio::test]
    async fn test_state_follows_session() {
        let effects = Arc::new(CountingEffects::default());
        let (channel, mut peer) = memory::pair();
        let session = Session::new(
            channel,
            actuator(effects),
            SessionConfig::default(),
            CancellationToken::new(),
        );
        let mut state = session.watch_state();
        assert_eq!(*state.borrow(), SessionState::Open);

        let handle = tokio::spawn(session.run());
        peer.send_text(r#"{"action":"start_pipeline","pipeline_id":"p1"}"#);
        expect_ack(peer.next_message().await.unwrap());
        state
            .wait_for(|s| *s == SessionState::Reading)
            .await
            .unwrap();

        peer.hang_up();
        assert_eq!(handle.await.unwrap(), CloseReason::PeerClosed);
        assert_eq!(*state.borrow(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_failed_ack_write_ends_session() {
        let effects = Arc::new(CountingEffects::default());
        let (mut peer, _cancel, handle) =
            spawn_session(actuator(effects.clone()), Duration::from_secs(30));

        peer.stop_reading();
        peer.send_text(r#"{"action":"start_pipeline","pipeline_id":"p1"}"#);

        assert_eq!(
            handle.await.unwrap(),
            CloseReason::Transport("transport error: peer went away".into())
        );
        assert_eq!(peer.close_count(), 1);
        assert_eq!(effects.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_event_write_ends_session() {
        let effects = Arc::new(CountingEffects::default());
        let actuator = actuator(effects);
        let (mut peer, _cancel, handle) = spawn_session(actuator.clone(), Duration::from_secs(30));

        peer.stop_reading();
        actuator.dispatch(&Command::start("p1"));

        assert_eq!(
            handle.await.unwrap(),
            CloseReason::Transport("transport error: peer went away".into())
        );
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_event_write_hits_idle_timeout() {
        let effects = Arc::new(CountingEffects::default());
        let actuator = actuator(effects);
        let stalled = spawn_stalled_session(actuator.clone(), Duration::from_secs(10));

        actuator.dispatch(&Command::start("p1"));
        stalled.writing.notified().await;
        assert_eq!(*stalled.state.borrow(), SessionState::Reading);

        assert_eq!(stalled.handle.await.unwrap(), CloseReason::IdleTimeout);
        assert_eq!(stalled.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_stalled_ack_write() {
        let effects = Arc::new(CountingEffects::default());
        let stalled = spawn_stalled_session(actuator(effects), Duration::from_secs(3600));

        stalled
            .inbound
            .send(Frame::Text(
                r#"{"action":"stop_pipeline","pipeline_id":"missing"}"#.into(),
            ))
            .unwrap();
        stalled.writing.notified().await;
        assert_eq!(*stalled.state.borrow(), SessionState::Dispatching);

        stalled.cancel.cancel();
        assert_eq!(stalled.handle.await.unwrap(), CloseReason::Shutdown);
        assert_eq!(stalled.closes.load(Ordering::SeqCst), 1);
        assert_eq!(*stalled.state.borrow(), SessionState::Closed);
    }
}
