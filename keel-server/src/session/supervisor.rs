//! Session Supervisor
//!
//! Spawns one task per accepted connection and owns their shutdown. Sessions
//! share nothing but the actuator; a session that panics or errors is logged
//! here and never touches its siblings.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::service::Actuator;
use crate::session::channel::ControlChannel;
use crate::session::connection::{CloseReason, Session, SessionConfig};

#[derive(Debug)]
pub struct SessionSupervisor {
    actuator: Arc<Actuator>,
    config: SessionConfig,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl SessionSupervisor {
    pub fn new(actuator: Arc<Actuator>, config: SessionConfig) -> Self {
        Self {
            actuator,
            config,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Starts a session for an accepted connection
    ///
    /// The returned handle resolves to the close reason, or `None` if the
    /// session task panicked or was aborted.
    pub fn spawn<C: ControlChannel>(&self, channel: C) -> JoinHandle<Option<CloseReason>> {
        let session = Session::new(
            channel,
            Arc::clone(&self.actuator),
            self.config.clone(),
            self.cancel.child_token(),
        );
        let session_id = session.id();
        let task = tokio::spawn(session.run());

        debug!(%session_id, "Session spawned");

        self.tracker.spawn(async move {
            match task.await {
                Ok(reason) => {
                    debug!(%session_id, reason = %reason, "Session finished");
                    Some(reason)
                }
                Err(e) if e.is_panic() => {
                    error!(%session_id, "Session task panicked: {}", e);
                    None
                }
                Err(e) => {
                    error!(%session_id, "Session task aborted: {}", e);
                    None
                }
            }
        })
    }

    /// Number of sessions that have not finished yet
    pub fn active_sessions(&self) -> usize {
        self.tracker.len()
    }

    /// Cancels every session and waits for all of them to close
    pub async fn shutdown(&self) {
        info!(active = self.active_sessions(), "Shutting down sessions");
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("All sessions closed");
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
    use crate::session::channel::memory;
    use keel_core::domain::pipeline::{Pipeline, Stage, StageStatus};
    use keel_core::dto::message::{Outcome, ServerMessage};
    use std::time::Duration;

    struct PanickyDeploys;

    impl StartEffect for PanickyDeploys {
        fn start(&self, _: &Pipeline) -> Result<Started, EffectError> {
            Ok(Started)
        }
    }

    impl StopEffect for PanickyDeploys {
        fn stop(&self, _: &Pipeline) -> Result<Stopped, EffectError> {
            Ok(Stopped)
        }
    }

    impl DeployEffect for PanickyDeploys {
        fn deploy(&self, _: &str, stage: &Stage) -> Result<Deployed, EffectError> {
            if stage.id == "boom" {
                panic!("deploy backend crashed");
            }
            Ok(Deployed::default())
        }
    }

    fn supervisor() -> SessionSupervisor {
        let registry = Registry::from_pipelines([Pipeline::new("p1", "Build")
            .with_stage(Stage::new("s1", "compile"))
            .with_stage(Stage::new("boom", "explode"))])
        .unwrap();
        let actuator = Actuator::new(
            Arc::new(registry),
            Effects::from_shared(Arc::new(PanickyDeploys)),
            EventBus::new(64),
        );

        SessionSupervisor::new(
            Arc::new(actuator),
            SessionConfig {
                idle_timeout: Duration::from_secs(30),
            },
        )
    }

    async fn next_ack(peer: &mut memory::Peer) -> Outcome {
        loop {
            match peer.next_message().await.unwrap() {
                ServerMessage::Ack { outcome, .. } => return outcome,
                ServerMessage::Event { .. } => continue,
                other => panic!("expected ack, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_sessions_run_independently() {
        let supervisor = supervisor();
        let (a, mut peer_a) = memory::pair();
        let (b, mut peer_b) = memory::pair();

        let handle_a = supervisor.spawn(a);
        let _handle_b = supervisor.spawn(b);
        assert_eq!(supervisor.active_sessions(), 2);

        peer_a.send_text(r#"{"action":"deploy_stage","pipeline_id":"p1","stage_id":"boom"}"#);
        assert_eq!(handle_a.await.unwrap(), Some(CloseReason::DispatchPanicked));
        assert_eq!(peer_a.close_count(), 1);
        assert!(peer_a.next_message().await.is_none());

        peer_b.send_text(r#"{"action":"deploy_stage","pipeline_id":"p1","stage_id":"s1"}"#);
        assert_eq!(
            next_ack(&mut peer_b).await,
            Outcome::Deployed {
                pipeline_id: "p1".into(),
                stage_id: "s1".into(),
                status: StageStatus::Deployed,
            }
        );
        assert_eq!(supervisor.active_sessions(), 1);

        supervisor.shutdown().await;
        assert_eq!(supervisor.active_sessions(), 0);
        assert_eq!(peer_b.close_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_session() {
        let supervisor = supervisor();
        let mut peers = Vec::new();
        let mut handles = Vec::new();

        for _ in 0..4 {
            let (channel, peer) = memory::pair();
            handles.push(supervisor.spawn(channel));
            peers.push(peer);
        }
        assert_eq!(supervisor.active_sessions(), 4);

        supervisor.shutdown().await;

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(CloseReason::Shutdown));
        }
        for peer in &peers {
            assert_eq!(peer.close_count(), 1);
        }
        assert_eq!(supervisor.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_events_reach_other_sessions() {
        let supervisor = supervisor();
        let (a, mut peer_a) = memory::pair();
        let (b, mut peer_b) = memory::pair();
        supervisor.spawn(a);
        supervisor.spawn(b);

        peer_a.send_text(r#"{"action":"start_pipeline","pipeline_id":"p1"}"#);
        assert_eq!(
            next_ack(&mut peer_a).await,
            Outcome::Started {
                pipeline_id: "p1".into()
            }
        );

        match peer_b.next_message().await.unwrap() {
            ServerMessage::Event { event, .. } => assert_eq!(event.pipeline_id(), "p1"),
            other => panic!("expected event, got {:?}", other),
        }

        supervisor.shutdown().await;
    }
}
