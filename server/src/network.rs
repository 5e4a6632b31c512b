//! Server network layer handling TCP connections and the event loop

use crate::client_manager::{ClientManager, SlotId};
use crate::config::ServerConfig;
use crate::console::ConsoleCommand;
use crate::error::{Result, ServerError};
use crate::game::{AuthOutcome, GameState, Outgoing};
use crate::users::UserDirectory;
use log::{debug, error, info, warn};
use shared::{encode_line, ServerMessage, MAX_MESSAGE_LEN, MESSAGE_DELIMITER};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// How long the loop sleeps without traffic before running matchmaking.
pub const TICK_DURATION: Duration = Duration::from_millis(500);

/// Upper bound for flushing queued messages to a client at shutdown.
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Messages sent from connection and worker tasks to the event loop
#[derive(Debug, PartialEq, Eq)]
pub enum NetworkEvent {
    MessageReceived { client: SlotId, message: String },
    ClientDisconnected { client: SlotId },
    AuthCompleted(AuthOutcome),
}

/// Owns every connection and all game state. Only the event loop in
/// [`Server::run`] mutates either.
pub struct Server {
    listener: TcpListener,
    clients: ClientManager,
    game: GameState,
    db_file: PathBuf,
    tick_duration: Duration,

    // Communication channels
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
    control_tx: mpsc::UnboundedSender<ConsoleCommand>,
    control_rx: mpsc::UnboundedReceiver<ConsoleCommand>,
}

impl Server {
    pub async fn new(config: &ServerConfig, users: UserDirectory) -> Result<Self> {
        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server listening on {}", addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            clients: ClientManager::new(config.max_clients),
            game: GameState::new(users, config.game_sessions),
            db_file: config.db_file.clone(),
            tick_duration: TICK_DURATION,
            event_tx,
            event_rx,
            control_tx,
            control_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Sender for operator commands. `Exit` stops [`Server::run`].
    pub fn control_handle(&self) -> mpsc::UnboundedSender<ConsoleCommand> {
        self.control_tx.clone()
    }

    /// Main server loop. Returns after an `exit` command once users are
    /// saved and every client has been told to go away.
    pub async fn run(mut self) -> Result<()> {
        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Waiting for connections...");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.accept_client(stream, addr),
                    Err(e) => error!("Accept error: {}", e),
                },

                Some(event) = self.event_rx.recv() => self.handle_event(event),

                command = self.control_rx.recv() => match command {
                    Some(ConsoleCommand::Queue) => println!("{}", self.game.queue_report()),
                    Some(ConsoleCommand::Db) => print!("{}", self.game.db_report()),
                    Some(ConsoleCommand::Exit) | None => break,
                },

                _ = tick_interval.tick() => {}
            }

            // Runs on every wake-up so waiting clients are paired even
            // when nobody is talking.
            let out = self.game.create_sessions();
            self.deliver(out);
            self.spawn_auth_tasks();
        }

        self.shutdown().await
    }

    fn accept_client(&mut self, stream: TcpStream, addr: SocketAddr) {
        debug!("New connection from {}", addr);

        let (outbox, inbox) = mpsc::unbounded_channel();
        let Some(client_id) = self.clients.add_client(addr, outbox) else {
            warn!(
                "Rejecting {}: all {} client slots are taken",
                addr,
                self.clients.capacity()
            );
            tokio::spawn(reject_connection(stream));
            return;
        };

        debug!(
            "{} of {} client slots in use",
            self.clients.len(),
            self.clients.capacity()
        );

        let (read_half, write_half) = stream.into_split();
        let reader = tokio::spawn(read_messages(client_id, read_half, self.event_tx.clone()));
        let writer = tokio::spawn(write_messages(client_id, write_half, inbox));
        if let Some(client) = self.clients.get_mut(client_id) {
            client.attach_tasks(reader, writer);
        }
    }

    fn handle_event(&mut self, event: NetworkEvent) {
        let out = match event {
            NetworkEvent::MessageReceived { client, message } => {
                self.game.handle_message(client, &message)
            }
            NetworkEvent::ClientDisconnected { client } => {
                if let Some(connection) = self.clients.remove_client(client) {
                    // Writer finishes on its own once the outbox is dropped.
                    drop(connection.close());
                }
                self.game.handle_disconnect(client)
            }
            NetworkEvent::AuthCompleted(outcome) => self.game.complete_auth(outcome),
        };
        self.deliver(out);
    }

    /// Runs pending password hashes and checks on the blocking pool. Results
    /// come back as [`NetworkEvent::AuthCompleted`].
    fn spawn_auth_tasks(&mut self) {
        for task in self.game.take_auth_tasks() {
            let events = self.event_tx.clone();
            tokio::task::spawn_blocking(move || {
                let _ = events.send(NetworkEvent::AuthCompleted(task.run()));
            });
        }
    }

    fn deliver(&self, out: Vec<Outgoing>) {
        for Outgoing { to, message } in out {
            if !self.clients.send(to, message) {
                debug!("Dropping {} for client {}: not connected", message, to);
            }
        }
    }

    /// Saves users, sends `shutdown` to everyone, closes every connection
    /// and finally the listener.
    async fn shutdown(mut self) -> Result<()> {
        info!("Server shutting down");
        let saved = self.game.users().flush(&self.db_file);
        if let Err(e) = &saved {
            error!("{}", e);
        }

        self.clients.broadcast(ServerMessage::Shutdown);
        let writers: Vec<_> = self
            .clients
            .drain()
            .into_iter()
            .filter_map(|client| client.close())
            .collect();
        for writer in writers {
            if timeout(SHUTDOWN_FLUSH_TIMEOUT, writer).await.is_err() {
                warn!("Client did not drain its messages in time");
            }
        }
        info!("All clients disconnected");

        drop(self.listener);
        info!("Shutdown.");
        saved
    }
}

/// Splits the inbound byte stream into delimiter-terminated messages and
/// forwards them to the event loop. Always ends with a disconnect event.
///
/// Messages longer than [`MAX_MESSAGE_LEN`] are skipped up to their
/// delimiter.
pub async fn read_messages<R>(
    client: SlotId,
    reader: R,
    events: mpsc::UnboundedSender<NetworkEvent>,
) where
    R: AsyncRead + Unpin,
{
    let limit = MAX_MESSAGE_LEN as u64 + 1;
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::with_capacity(MAX_MESSAGE_LEN);
    let mut skipping = false;

    loop {
        buffer.clear();
        let read = (&mut reader)
            .take(limit)
            .read_until(MESSAGE_DELIMITER, &mut buffer)
            .await;

        match read {
            Ok(0) => break,
            Ok(_) => {
                let complete = buffer.last() == Some(&MESSAGE_DELIMITER);
                if skipping || (!complete && buffer.len() as u64 == limit) {
                    if !skipping {
                        warn!("Client {} sent an oversized message, skipping it", client);
                    }
                    skipping = !complete;
                    continue;
                }

                let message = String::from_utf8_lossy(&buffer)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if events
                    .send(NetworkEvent::MessageReceived { client, message })
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                error!("Error reading from client {}: {}", client, e);
                break;
            }
        }
    }

    let _ = events.send(NetworkEvent::ClientDisconnected { client });
}

/// Writes queued messages in order until the outbox closes, then shuts the
/// stream down.
pub async fn write_messages<W>(
    client: SlotId,
    mut writer: W,
    mut inbox: mpsc::UnboundedReceiver<ServerMessage>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = inbox.recv().await {
        if let Err(e) = writer.write_all(encode_line(message).as_bytes()).await {
            error!("Failed to send {} to client {}: {}", message, client, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn reject_connection(mut stream: TcpStream) {
    let reply = encode_line(ServerMessage::Full);
    if let Err(e) = stream.write_all(reply.as_bytes()).await {
        debug!("Failed to reject connection: {}", e);
    }
    let _ = stream.shutdown().await;
}
