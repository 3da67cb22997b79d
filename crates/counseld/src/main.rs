//! counseld - The counseling session service
//!
//! This is the main entry point for the counseld service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Command dispatch (lifecycle, queries, analytics)
//! - Auto-complete sweeper task
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use counsel_api::{Event, EventPayload};
use counsel_config::{load_config_or_default, Policy};
use counsel_core::{AutoCompleteSweeper, CoreEvent};
use counsel_ipc::{IpcServer, ServerMessage};
use counsel_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use counsel_util::default_config_path;
use counseld::{event_payload, Dispatcher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// counseld - Counseling session lifecycle and analytics service
#[derive(Parser, Debug)]
#[command(name = "counseld")]
#[command(about = "Counseling session lifecycle and analytics service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/counseld/config.toml)
    #[arg(short, long, env = "COUNSEL_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set COUNSEL_SOCKET env var)
    #[arg(short, long, env = "COUNSEL_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set COUNSEL_DATA_DIR env var)
    #[arg(short, long, env = "COUNSEL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    policy: Policy,
    dispatcher: Dispatcher,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let policy = load_config_or_default(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            threshold_minutes = policy.sweeper.threshold_minutes,
            extended_threshold_minutes = policy.sweeper.extended_threshold_minutes,
            "Configuration loaded"
        );

        // Determine paths
        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| policy.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = counsel_util::database_path(&data_dir);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;
        if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::PolicyLoaded {
            threshold_minutes: policy.sweeper.threshold_minutes,
            extended_threshold_minutes: policy.sweeper.extended_threshold_minutes,
        })) {
            warn!(error = %e, "Failed to log policy load");
        }

        if counsel_util::is_mock_time_active() {
            warn!(now = %counsel_util::now(), "Mock time is active");
        }

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            dispatcher: Dispatcher::new(store.clone()),
            policy,
            ipc: Arc::new(ipc),
            store,
        })
    }

    async fn run(self) -> Result<()> {
        let ipc = self.ipc.clone();
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        // Spawn IPC accept task
        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // Spawn sweeper task
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (core_tx, mut core_events) = mpsc::unbounded_channel::<CoreEvent>();
        let sweeper = AutoCompleteSweeper::new(self.store.clone(), self.policy.sweeper.clone());
        let sweeper_handle: JoinHandle<()> = tokio::spawn(sweeper.run(shutdown_rx, core_tx));

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // Sessions closed by the sweeper
                Some(event) = core_events.recv() => {
                    Self::broadcast(&ipc, event);
                }

                // IPC messages
                Some(msg) = ipc_messages.recv() => {
                    let sweeper_running = !sweeper_handle.is_finished();
                    self.handle_ipc_message(&ipc, msg, sweeper_running).await;
                }
            }
        }

        info!("Shutting down counseld");

        let _ = shutdown_tx.send(true);
        if let Err(e) = sweeper_handle.await {
            warn!(error = %e, "Sweeper task did not stop cleanly");
        }

        ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        ipc.shutdown();
        info!("Shutdown complete");
        Ok(())
    }

    fn broadcast(ipc: &Arc<IpcServer>, event: CoreEvent) {
        debug!(session_id = %event.session_id(), "Broadcasting core event");
        ipc.broadcast_event(Event::new(event_payload(event)));
    }

    async fn handle_ipc_message(
        &self,
        ipc: &Arc<IpcServer>,
        msg: ServerMessage,
        sweeper_running: bool,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                debug!(
                    client_id = %client_id,
                    request_id = request.request_id,
                    "Handling request"
                );

                let dispatched = self.dispatcher.handle_request(
                    &client_id,
                    request,
                    counsel_util::now(),
                    sweeper_running,
                );

                if let Err(e) = ipc.send_response(&client_id, dispatched.response).await {
                    debug!(client_id = %client_id, error = %e, "Failed to send response");
                }
                if let Some(event) = dispatched.event {
                    Self::broadcast(ipc, event);
                }
            }

            ServerMessage::ClientConnected { client_id } => {
                debug!(client_id = %client_id, "Client registered");
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "counseld starting");

    let service = Service::new(&args).await?;
    service.run().await
}
