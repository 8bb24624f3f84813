//! Server assembly
//!
//! Wires registry, event bus, actuator and supervisor together and serves the
//! HTTP routers until shutdown is requested.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{self, ControlState};
use crate::config::Config;
use crate::repository::Registry;
use crate::service::{Actuator, Effects, EventBus};
use crate::session::SessionSupervisor;

/// Bound sockets the server accepts on
#[derive(Debug)]
pub enum Listeners {
    /// Control and snapshot endpoints on one socket
    Shared(TcpListener),
    Split {
        control: TcpListener,
        snapshot: TcpListener,
    },
}

impl Listeners {
    pub async fn bind(config: &Config) -> anyhow::Result<Self> {
        let control = bind(config.control_addr).await?;
        if config.shares_listener() {
            return Ok(Listeners::Shared(control));
        }

        let snapshot = bind(config.snapshot_addr).await?;
        Ok(Listeners::Split { control, snapshot })
    }
}

async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    info!("Listening on {}", addr);
    Ok(listener)
}

#[derive(Debug)]
pub struct Server {
    registry: Arc<Registry>,
    supervisor: Arc<SessionSupervisor>,
    max_message_bytes: usize,
}

impl Server {
    pub fn new(config: &Config, registry: Registry, effects: Effects) -> Self {
        let registry = Arc::new(registry);
        let events = EventBus::new(config.event_capacity);
        let actuator = Arc::new(Actuator::new(registry.clone(), effects, events));
        let supervisor = Arc::new(SessionSupervisor::new(actuator, config.session_config()));

        Self {
            registry,
            supervisor,
            max_message_bytes: config.max_message_bytes,
        }
    }

    fn control_state(&self) -> ControlState {
        ControlState {
            supervisor: self.supervisor.clone(),
            max_message_bytes: self.max_message_bytes,
        }
    }

    /// Serves until `shutdown` is cancelled, then closes every session
    pub async fn run(self, listeners: Listeners, shutdown: CancellationToken) -> anyhow::Result<()> {
        let sessions = {
            let supervisor = self.supervisor.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                supervisor.shutdown().await;
            })
        };

        let served = match listeners {
            Listeners::Shared(listener) => {
                let app = api::combined_router(self.control_state(), self.registry.clone());
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                    .await
            }
            Listeners::Split { control, snapshot } => {
                let control = axum::serve(control, api::control_router(self.control_state()))
                    .with_graceful_shutdown(shutdown.clone().cancelled_owned());
                let snapshot = axum::serve(snapshot, api::snapshot_router(self.registry.clone()))
                    .with_graceful_shutdown(shutdown.clone().cancelled_owned());

                tokio::try_join!(control.into_future(), snapshot.into_future()).map(|_| ())
            }
        };

        // A listener that failed takes the rest of the server down with it
        shutdown.cancel();
        sessions.await.context("session shutdown task failed")?;
        served.context("server error")
    }
}
