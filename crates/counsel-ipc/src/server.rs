//! IPC server implementation

use counsel_api::{Command, ErrorCode, ErrorInfo, Event, Request, Response};
use counsel_util::ClientId;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{IpcError, IpcResult};

/// What the server hands to the service loop
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

type ClientMap = Arc<RwLock<HashMap<ClientId, ClientHandle>>>;

/// Unix socket server speaking newline-delimited JSON
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    clients: ClientMap,
    event_tx: broadcast::Sender<Event>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>>,
}

struct ClientHandle {
    outbox: mpsc::UnboundedSender<String>,
    subscribed: bool,
}

/// Subscription change requested by a command, if any
fn subscription_change(command: &Command) -> Option<bool> {
    match command {
        Command::SubscribeEvents => Some(true),
        Command::UnsubscribeEvents => Some(false),
        _ => None,
    }
}

async fn set_subscribed(clients: &ClientMap, client_id: &ClientId, subscribed: bool) {
    if let Some(handle) = clients.write().await.get_mut(client_id) {
        handle.subscribed = subscribed;
    }
}

async fn is_subscribed(clients: &ClientMap, client_id: &ClientId) -> bool {
    clients
        .read()
        .await
        .get(client_id)
        .is_some_and(|handle| handle.subscribed)
}

/// Parse request lines until EOF and forward them to the service loop.
/// Lines that are not a `Request` are answered directly.
async fn read_requests(
    read_half: OwnedReadHalf,
    client_id: ClientId,
    clients: ClientMap,
    outbox: mpsc::UnboundedSender<String>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(client_id = %client_id, "Client closed its end");
                break;
            }
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "Read error");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<Request>(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Unparseable request line");
                let reply = Response::error(
                    0,
                    ErrorInfo::new(ErrorCode::InvalidRequest, e.to_string()),
                );
                if let Ok(json) = serde_json::to_string(&reply) {
                    let _ = outbox.send(json);
                }
                continue;
            }
        };

        // Flip the flag before the service answers so no event slips past
        if let Some(subscribed) = subscription_change(&request.command) {
            set_subscribed(&clients, &client_id, subscribed).await;
        }

        let _ = message_tx.send(ServerMessage::Request {
            client_id: client_id.clone(),
            request,
        });
    }

    // Dropping the handle closes the outbox, which stops the writer
    clients.write().await.remove(&client_id);
}

async fn write_line(writer: &mut OwnedWriteHalf, mut line: String) -> std::io::Result<()> {
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}

/// Drain responses and subscribed events onto the socket, then deregister.
async fn write_outgoing(
    mut writer: OwnedWriteHalf,
    client_id: ClientId,
    clients: ClientMap,
    mut outbox: mpsc::UnboundedReceiver<String>,
    mut events: broadcast::Receiver<Event>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    loop {
        tokio::select! {
            response = outbox.recv() => {
                let Some(response) = response else {
                    break;
                };
                if let Err(e) = write_line(&mut writer, response).await {
                    debug!(client_id = %client_id, error = %e, "Response write failed");
                    break;
                }
            }

            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(client_id = %client_id, skipped, "Subscriber fell behind, events dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !is_subscribed(&clients, &client_id).await {
                    continue;
                }
                let Ok(json) = serde_json::to_string(&event) else {
                    continue;
                };
                if let Err(e) = write_line(&mut writer, json).await {
                    debug!(client_id = %client_id, error = %e, "Event write failed");
                    break;
                }
            }
        }
    }

    clients.write().await.remove(&client_id);
    let _ = message_tx.send(ServerMessage::ClientDisconnected { client_id });
}

impl IpcServer {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            message_tx,
            message_rx: Arc::new(Mutex::new(Some(message_rx))),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket, replacing a stale one left by a previous run
    pub async fn start(&mut self) -> IpcResult<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(path = %self.socket_path.display(), "IPC server listening");
        self.listener = Some(listener);
        Ok(())
    }

    /// The receiving end of the service loop channel. Yields `None` after
    /// the first call.
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Accept connections until the task is dropped
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::ServerError("Server not started".into()))?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = ClientId::new();
                    info!(client_id = %client_id, "Client connected");
                    self.attach_client(stream, client_id).await;
                }
                Err(e) => error!(error = %e, "Failed to accept connection"),
            }
        }
    }

    async fn attach_client(&self, stream: UnixStream, client_id: ClientId) {
        let (read_half, write_half) = stream.into_split();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel::<String>();

        self.clients.write().await.insert(
            client_id.clone(),
            ClientHandle {
                outbox: outbox_tx.clone(),
                subscribed: false,
            },
        );
        let _ = self.message_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
        });

        tokio::spawn(read_requests(
            read_half,
            client_id.clone(),
            self.clients.clone(),
            outbox_tx,
            self.message_tx.clone(),
        ));
        tokio::spawn(write_outgoing(
            write_half,
            client_id,
            self.clients.clone(),
            outbox_rx,
            self.event_tx.subscribe(),
            self.message_tx.clone(),
        ));
    }

    /// Queue a response for one client. Unknown clients are ignored.
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let json = serde_json::to_string(&response)?;

        if let Some(handle) = self.clients.read().await.get(client_id) {
            handle
                .outbox
                .send(json)
                .map_err(|_| IpcError::ConnectionClosed)?;
        }
        Ok(())
    }

    /// Fan an event out to every subscribed client
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Remove the socket file
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
