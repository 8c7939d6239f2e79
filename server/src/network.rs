//! Server network layer: the receiver and broadcaster stages and the handle
//! that starts and stops the whole pipeline.

use crate::config::ServerConfig;
use crate::connection::ConnectionTable;
use crate::error::ServerError;
use crate::event::{OutboundEvent, PlayerEvent, Recipients};
use crate::game::{GameState, Phase};
use crate::map::MapGenerator;
use crate::queue::PriorityEventQueue;
use crate::resolver::Resolver;
use crate::utils::IdGenerator;
use log::{debug, error, info, trace, warn};
use shared::{decode_body, encode_frame, read_frame, ClientMessage, PlayerId, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;

/// A client that cannot take a frame within this long is disconnected.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

type Inbound = Arc<PriorityEventQueue<PlayerEvent>>;
type Outbound = Arc<PriorityEventQueue<OutboundEvent>>;
type Connections = Arc<RwLock<ConnectionTable>>;

/// A bound, not yet running server.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    connections: Connections,
    inbound: Inbound,
    outbound: Outbound,
}

impl Server {
    /// Binds the listening socket. This is the only fatal error of the server.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server listening on {}", addr);

        Ok(Server {
            listener,
            connections: Arc::new(RwLock::new(ConnectionTable::new(config.max_clients))),
            inbound: Arc::new(PriorityEventQueue::new()),
            outbound: Arc::new(PriorityEventQueue::new()),
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns the receiver, resolver and broadcaster tasks.
    pub fn start(self, generator: Box<dyn MapGenerator + Send>) -> std::io::Result<ServerHandle> {
        let local_addr = self.listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (phase_tx, phase_rx) = watch::channel(Phase::Lobby);

        let resolver = Resolver::new(
            GameState::new(Arc::new(IdGenerator::new())),
            generator,
            phase_tx,
        );

        let receiver = Receiver {
            listener: self.listener,
            connections: Arc::clone(&self.connections),
            inbound: Arc::clone(&self.inbound),
            phase: phase_rx.clone(),
            poll_timeout: self.config.poll_timeout(),
            shutdown: shutdown_rx.clone(),
            readers: JoinSet::new(),
        };

        let broadcaster = Broadcaster {
            connections: Arc::clone(&self.connections),
            inbound: Arc::clone(&self.inbound),
            outbound: Arc::clone(&self.outbound),
            shutdown: shutdown_rx.clone(),
        };

        let tasks = vec![
            ("receiver", tokio::spawn(receiver.run())),
            (
                "resolver",
                tokio::spawn(resolver.run(
                    Arc::clone(&self.inbound),
                    Arc::clone(&self.outbound),
                    shutdown_rx,
                )),
            ),
            ("broadcaster", tokio::spawn(broadcaster.run())),
        ];

        info!("Server started successfully");
        Ok(ServerHandle {
            local_addr,
            phase: phase_rx,
            shutdown: shutdown_tx,
            tasks,
        })
    }
}

/// Running server. Dropping it closes the shutdown channel, which also stops
/// every loop, but only `stop` waits for them to finish.
pub struct ServerHandle {
    local_addr: SocketAddr,
    phase: watch::Receiver<Phase>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Signals every loop to stop and waits for all of them to finish.
    pub async fn stop(self) {
        info!("Server shutting down");
        self.shutdown.send_replace(true);

        for (name, task) in self.tasks {
            match task.await {
                Ok(()) => debug!("{} stopped", name),
                Err(e) => error!("{} task panicked: {}", name, e),
            }
        }
    }
}

/// Removes a player's connection and tells the resolver it left. Safe to call
/// from several places for the same player: only the first call does anything.
async fn disconnect(player: PlayerId, connections: &Connections, inbound: &Inbound) {
    let removed = connections.write().await.remove(player);
    if let Some(connection) = removed {
        connection.closed.notify_one();
        if let Err(e) = connection.writer.lock().await.shutdown().await {
            trace!("Shutdown of player {} socket failed: {}", player, e);
        }
        let left = PlayerEvent::left(player);
        let priority = left.priority();
        inbound.insert(left, priority);
    }
}

/// Accepts connections and spawns one frame reader per client.
struct Receiver {
    listener: TcpListener,
    connections: Connections,
    inbound: Inbound,
    phase: watch::Receiver<Phase>,
    poll_timeout: Duration,
    shutdown: watch::Receiver<bool>,
    readers: JoinSet<()>,
}

impl Receiver {
    async fn run(mut self) {
        info!("Receiver started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = self.shutdown.changed() => break,
                accepted = timeout(self.poll_timeout, self.listener.accept()) => match accepted {
                    Ok(Ok((stream, addr))) => self.admit(stream, addr).await,
                    Ok(Err(e)) => warn!("Failed to accept connection: {}", e),
                    Err(_) => trace!("No connection within {:?}", self.poll_timeout),
                },
                Some(finished) = self.readers.join_next(), if !self.readers.is_empty() => {
                    if let Err(e) = finished {
                        error!("Client reader task failed: {}", e);
                    }
                }
            }
        }

        // Readers watch the same shutdown flag.
        while let Some(finished) = self.readers.join_next().await {
            if let Err(e) = finished {
                error!("Client reader task failed: {}", e);
            }
        }
        info!("Receiver stopped");
    }

    /// Registers a connection, or closes it right away when the lobby is
    /// closed or full.
    async fn admit(&mut self, stream: TcpStream, addr: SocketAddr) {
        let phase = *self.phase.borrow();
        let mut connections = self.connections.write().await;

        if phase != Phase::Lobby || connections.is_full() {
            drop(connections);
            info!("{}", ServerError::CapacityExceeded(addr));
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }
        let (reader, writer) = stream.into_split();
        let (player, closed) = match connections.add(addr, writer) {
            Some(player) => match connections.closed_signal(player) {
                Some(closed) => (player, closed),
                None => return,
            },
            None => return,
        };

        // Queued before the reader exists, so it precedes every command.
        let joined = PlayerEvent::joined(player, addr);
        let priority = joined.priority();
        self.inbound.insert(joined, priority);
        drop(connections);

        self.readers.spawn(read_client(
            player,
            reader,
            closed,
            Arc::clone(&self.connections),
            Arc::clone(&self.inbound),
            self.shutdown.clone(),
        ));
    }
}

/// Decodes frames from one client until it goes away.
async fn read_client(
    player: PlayerId,
    mut reader: OwnedReadHalf,
    closed: Arc<Notify>,
    connections: Connections,
    inbound: Inbound,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => return,
            _ = closed.notified() => return,
            frame = read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(Some(body)) => match decode_body::<ClientMessage>(&body) {
                Ok(message) => {
                    trace!("Player {} sent {}", player, message.name());
                    let event = PlayerEvent::command(player, message);
                    let priority = event.priority();
                    inbound.insert(event, priority);
                }
                Err(e) => warn!("Dropping malformed frame from player {}: {}", player, e),
            },
            Ok(None) => {
                debug!("{}", ServerError::PeerDisconnected(player));
                break;
            }
            Err(e) => {
                warn!("Lost player {}: {}", player, ServerError::from(e));
                break;
            }
        }
    }

    disconnect(player, &connections, &inbound).await;
}

/// Writes outbound events to their recipients.
struct Broadcaster {
    connections: Connections,
    inbound: Inbound,
    outbound: Outbound,
    shutdown: watch::Receiver<bool>,
}

impl Broadcaster {
    async fn run(mut self) {
        info!("Broadcaster started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let event = tokio::select! {
                _ = self.shutdown.changed() => break,
                event = self.outbound.remove() => event,
            };
            self.dispatch(event).await;
        }

        // Flush whatever the resolver produced before it stopped.
        while let Some(event) = self.outbound.try_remove() {
            if let OutboundEvent::Send { .. } = event {
                self.dispatch(event).await;
            }
        }
        info!("Broadcaster stopped");
    }

    async fn dispatch(&self, event: OutboundEvent) {
        match event {
            OutboundEvent::Send {
                message,
                recipients,
            } => self.deliver(&message, &recipients).await,
            OutboundEvent::Drop { player } => {
                disconnect(player, &self.connections, &self.inbound).await;
            }
        }
    }

    async fn deliver(&self, message: &ServerMessage, recipients: &Recipients) {
        let frame = match encode_frame(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {}: {}", message.name(), e);
                return;
            }
        };

        let writers = self.connections.read().await.writers();
        let mut failed = Vec::new();

        for (player, writer) in writers {
            if !recipients.includes(player) {
                continue;
            }

            let mut writer = writer.lock().await;
            match timeout(WRITE_TIMEOUT, writer.write_all(&frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let e = ServerError::Io(e);
                    warn!("Failed to send {} to player {}: {}", message.name(), player, e);
                    failed.push(player);
                }
                Err(_) => {
                    warn!("Timed out sending {} to player {}", message.name(), player);
                    failed.push(player);
                }
            }
        }

        for player in failed {
            disconnect(player, &self.connections, &self.inbound).await;
        }
    }
}
