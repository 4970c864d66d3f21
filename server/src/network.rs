//! Server event loop: UDP transport, validation dispatch and the broadcast
//! scheduler.
//!
//! All world and session mutations happen on the single owner loop in
//! [`Server::run`], so handlers never race each other. Side tasks only move
//! datagrams in and out over channels and drive the inactivity sweep.

use crate::activity::{ActivityMonitor, SWEEP_INTERVAL};
use crate::session::{
    clip_chat_name, register_name, restore_player, AdmissionError, SessionRegistry,
};
use crate::world::{World, MAX_MOVEMENT_DT};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{sanitize_chat, Message};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Events feeding the owner loop.
#[derive(Debug)]
pub enum ServerEvent {
    MessageReceived {
        message: Message,
        addr: SocketAddr,
    },
    SessionExpired {
        session_id: u32,
    },
    Shutdown,
}

/// Outgoing traffic queued by the owner loop for the sender task.
#[derive(Debug)]
pub enum Outbound {
    Send {
        message: Message,
        addr: SocketAddr,
    },
    Broadcast {
        message: Message,
    },
}

pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: Arc<RwLock<SessionRegistry>>,
    activity: Arc<RwLock<ActivityMonitor>>,
    world: World,
    tick_duration: Duration,

    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    out_tx: mpsc::UnboundedSender<Outbound>,
    out_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        world: World,
        inactivity_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            sessions: Arc::new(RwLock::new(SessionRegistry::new())),
            activity: Arc::new(RwLock::new(ActivityMonitor::new(inactivity_timeout))),
            world,
            tick_duration,
            event_tx,
            event_rx,
            out_tx,
            out_rx,
        })
    }

    /// Handle for injecting events from outside, primarily a deterministic
    /// `Shutdown` in tests and signal handlers.
    pub fn event_handle(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.event_tx.clone()
    }

    /// Spawns the task that turns incoming datagrams into loop events.
    fn spawn_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(message) = deserialize::<Message>(&buffer[0..len]) {
                            if event_tx
                                .send(ServerEvent::MessageReceived { message, addr })
                                .is_err()
                            {
                                break;
                            }
                        } else {
                            warn!("Undecodable datagram from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outgoing queue onto the socket.
    fn spawn_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let sessions = Arc::clone(&self.sessions);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                match outbound {
                    Outbound::Send { message, addr } => {
                        if let Err(e) = send_message(&socket, &message, addr).await {
                            error!("Failed to send to {}: {}", addr, e);
                        }
                    }
                    Outbound::Broadcast { message } => {
                        let targets = {
                            let sessions_guard = sessions.read().await;
                            sessions_guard.addrs()
                        };
                        for (session_id, addr) in targets {
                            if let Err(e) = send_message(&socket, &message, addr).await {
                                error!("Failed to send to session {}: {}", session_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns the inactivity sweep on its own coarse timer, independent of
    /// the simulation tick.
    fn spawn_sweeper(&self) {
        let activity = Arc::clone(&self.activity);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut sweep_interval = interval(SWEEP_INTERVAL);
            sweep_interval.tick().await; // first tick fires immediately

            loop {
                sweep_interval.tick().await;

                let expired = {
                    let mut activity_guard = activity.write().await;
                    activity_guard.sweep()
                };

                for session_id in expired {
                    if event_tx
                        .send(ServerEvent::SessionExpired { session_id })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    fn queue(&self, outbound: Outbound) {
        if self.out_tx.send(outbound).is_err() {
            error!("Outgoing queue closed");
        }
    }

    fn send_to(&self, message: Message, addr: SocketAddr) {
        self.queue(Outbound::Send { message, addr });
    }

    fn broadcast(&self, message: Message) {
        self.queue(Outbound::Broadcast { message });
    }

    /// Queues a full-state snapshot for every live session.
    async fn broadcast_snapshot(&self) {
        let session_count = {
            let sessions = self.sessions.read().await;
            sessions.len()
        };
        if session_count == 0 {
            return;
        }
        let snapshot = self.world.snapshot(now_millis());
        self.broadcast(Message::UpdateGameState(snapshot));
    }

    async fn record_activity(&self, session_id: u32) {
        let mut activity = self.activity.write().await;
        activity.record(session_id);
    }

    /// Looks up the session owning `addr`; unknown senders are dropped.
    async fn session_for(&self, addr: SocketAddr) -> Option<u32> {
        let sessions = self.sessions.read().await;
        sessions.find_by_addr(addr)
    }

    async fn handle_message(&mut self, message: Message, addr: SocketAddr) {
        match message {
            Message::Connect => self.handle_connect(addr).await,
            Message::SetPlayerName { name } => self.handle_set_name(addr, name).await,
            Message::RestorePlayer { name } => self.handle_restore(addr, name).await,
            Message::UpdatePlayerPosition {
                direction_x,
                direction_y,
            } => self.handle_movement(addr, direction_x, direction_y).await,
            Message::EatFood {
                id,
                player_x,
                player_y,
            } => self.handle_eat(addr, id, player_x, player_y).await,
            Message::SetCanvasSize { width, height } => {
                self.handle_resize(addr, width, height).await
            }
            Message::ChatMessage { name, message } => self.handle_chat(addr, name, message).await,
            Message::SetPaused { paused } => {
                if let Some(session_id) = self.session_for(addr).await {
                    self.world.set_paused(session_id, paused);
                    self.record_activity(session_id).await;
                }
            }
            Message::Disconnect => self.handle_disconnect(addr).await,
            other => {
                warn!("Unexpected message from {}: {:?}", addr, other);
            }
        }
    }

    async fn handle_connect(&mut self, addr: SocketAddr) {
        // A reconnecting address gets a fresh session; the stale binding and
        // its player are torn down first.
        let existing = self.session_for(addr).await;
        if let Some(old_id) = existing {
            info!("Replacing session {} for {}", old_id, addr);
            self.drop_session(old_id).await;
            self.broadcast(Message::PlayerInactive { session_id: old_id });
        }

        let session_id = {
            let mut sessions = self.sessions.write().await;
            sessions.connect(addr)
        };
        self.record_activity(session_id).await;
        self.send_to(Message::Connected { session_id }, addr);
    }

    async fn handle_set_name(&mut self, addr: SocketAddr, name: String) {
        let session_id = match self.session_for(addr).await {
            Some(id) => id,
            None => {
                warn!("Name registration from unknown session {}", addr);
                return;
            }
        };

        match register_name(&mut self.world, session_id, &name) {
            Ok(info) => {
                self.record_activity(session_id).await;
                self.send_to(
                    Message::SetPlayerNameResponse {
                        success: true,
                        player: Some(info),
                        message: None,
                    },
                    addr,
                );
                self.broadcast_snapshot().await;
            }
            Err(AdmissionError::NameTaken) => {
                self.send_to(Message::NameTaken, addr);
                self.send_to(
                    Message::SetPlayerNameResponse {
                        success: false,
                        player: None,
                        message: Some("name already in use".to_string()),
                    },
                    addr,
                );
            }
            Err(e) => {
                self.send_to(
                    Message::SetPlayerNameResponse {
                        success: false,
                        player: None,
                        message: Some(e.to_string()),
                    },
                    addr,
                );
            }
        }
    }

    async fn handle_restore(&mut self, addr: SocketAddr, name: String) {
        let session_id = match self.session_for(addr).await {
            Some(id) => id,
            None => {
                warn!("Restore from unknown session {}", addr);
                return;
            }
        };

        match restore_player(&mut self.world, session_id, &name) {
            Ok((old_session_id, info)) => {
                {
                    let mut sessions = self.sessions.write().await;
                    sessions.remove(old_session_id);
                }
                {
                    let mut activity = self.activity.write().await;
                    activity.forget(old_session_id);
                }
                self.broadcast(Message::PlayerInactive {
                    session_id: old_session_id,
                });
                self.record_activity(session_id).await;
                self.send_to(
                    Message::RestorePlayerResponse {
                        success: true,
                        player: Some(info),
                        message: None,
                    },
                    addr,
                );
                self.broadcast_snapshot().await;
            }
            Err(e) => {
                self.send_to(
                    Message::RestorePlayerResponse {
                        success: false,
                        player: None,
                        message: Some(e.to_string()),
                    },
                    addr,
                );
            }
        }
    }

    async fn handle_movement(&mut self, addr: SocketAddr, direction_x: f32, direction_y: f32) {
        let session_id = match self.session_for(addr).await {
            Some(id) => id,
            None => return,
        };

        // The activity clock doubles as the integration step: time since the
        // last accepted event, bounded so stale sessions cannot leap.
        let dt = {
            let activity = self.activity.read().await;
            activity
                .elapsed(session_id)
                .map(|d| d.as_secs_f32().min(MAX_MOVEMENT_DT))
                .unwrap_or(0.0)
        };

        if self
            .world
            .apply_movement(session_id, direction_x, direction_y, dt)
        {
            self.record_activity(session_id).await;
            self.broadcast_snapshot().await;
        }
    }

    async fn handle_eat(&mut self, addr: SocketAddr, food_id: u64, player_x: f32, player_y: f32) {
        let session_id = match self.session_for(addr).await {
            Some(id) => id,
            None => return,
        };

        match self
            .world
            .resolve_eating(session_id, food_id, player_x, player_y)
        {
            Ok(()) => {
                self.record_activity(session_id).await;
                self.broadcast_snapshot().await;
            }
            Err(e) => {
                debug!("Rejected eat from session {}: {}", session_id, e);
            }
        }
    }

    async fn handle_resize(&mut self, addr: SocketAddr, width: f32, height: f32) {
        let session_id = match self.session_for(addr).await {
            Some(id) => id,
            None => return,
        };

        match self.world.resize(width, height) {
            Ok(()) => {
                info!("Arena resized to {:.0}x{:.0}", width, height);
                self.record_activity(session_id).await;
                self.broadcast_snapshot().await;
            }
            Err(e) => {
                debug!("Rejected resize from session {}: {}", session_id, e);
            }
        }
    }

    async fn handle_chat(&mut self, addr: SocketAddr, name: String, message: String) {
        let session_id = match self.session_for(addr).await {
            Some(id) => id,
            None => return,
        };

        let text = sanitize_chat(&message);
        if text.is_empty() {
            warn!("Empty chat message from session {}", session_id);
            return;
        }

        let allowed = {
            let mut sessions = self.sessions.write().await;
            sessions.chat_allowed(session_id)
        };
        if !allowed {
            debug!("Chat from session {} rate limited", session_id);
            return;
        }

        self.record_activity(session_id).await;
        self.broadcast(Message::ChatMessage {
            name: clip_chat_name(&name),
            message: text,
        });
    }

    async fn handle_disconnect(&mut self, addr: SocketAddr) {
        if let Some(session_id) = self.session_for(addr).await {
            self.drop_session(session_id).await;
            self.broadcast(Message::PlayerInactive { session_id });
            self.broadcast_snapshot().await;
        }
    }

    /// Tears down a session's bindings: player, registry entry, activity.
    async fn drop_session(&mut self, session_id: u32) {
        self.world.remove_player(session_id);
        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(session_id);
        }
        {
            let mut activity = self.activity.write().await;
            activity.forget(session_id);
        }
    }

    async fn handle_session_expired(&mut self, session_id: u32) {
        info!("Session {} evicted for inactivity", session_id);
        // activity entry is already gone; drop the rest of the binding
        self.world.remove_player(session_id);
        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(session_id);
        }
        self.broadcast(Message::PlayerInactive { session_id });
        self.broadcast_snapshot().await;
    }

    /// One scheduled tick: collision pass, elimination notices, snapshot.
    async fn run_tick(&mut self) {
        let eliminations = self.world.resolve_collisions();
        for e in &eliminations {
            self.broadcast(Message::PlayerEaten {
                eaten_id: e.eaten_id,
                eater_id: e.eater_id,
            });
        }
        self.broadcast_snapshot().await;
    }

    /// Main owner loop coordinating all operations.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_receiver();
        self.spawn_sender();
        self.spawn_sweeper();

        let mut tick_interval = interval(self.tick_duration);
        let mut tick_count: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(ServerEvent::MessageReceived { message, addr }) => {
                            self.handle_message(message, addr).await;
                        }
                        Some(ServerEvent::SessionExpired { session_id }) => {
                            self.handle_session_expired(session_id).await;
                        }
                        Some(ServerEvent::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.run_tick().await;
                    tick_count += 1;

                    if tick_count % 600 == 0 {
                        let session_count = {
                            let sessions = self.sessions.read().await;
                            sessions.len()
                        };
                        debug!(
                            "Tick {}: {} sessions, {} players, {} food",
                            tick_count,
                            session_count,
                            self.world.players.len(),
                            self.world.foods.len()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

async fn send_message(
    socket: &UdpSocket,
    message: &Message,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(message)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}

/// Wall-clock milliseconds since the epoch, the `server_time` stamp on every
/// snapshot.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_monotonic() {
        let a = now_millis();
        std::thread::sleep(Duration::from_millis(2));
        let b = now_millis();
        assert!(b > a);
    }

    #[test]
    fn test_server_event_construction() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let event = ServerEvent::MessageReceived {
            message: Message::Connect,
            addr,
        };
        match event {
            ServerEvent::MessageReceived { message, addr: a } => {
                assert_eq!(a, addr);
                assert!(matches!(message, Message::Connect));
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[test]
    fn test_outbound_broadcast_construction() {
        let outbound = Outbound::Broadcast {
            message: Message::NameTaken,
        };
        match outbound {
            Outbound::Broadcast { message } => assert!(matches!(message, Message::NameTaken)),
            _ => panic!("Unexpected outbound type"),
        }
    }

    #[tokio::test]
    async fn test_event_channel_roundtrip() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
        tx.send(ServerEvent::SessionExpired { session_id: 7 })
            .unwrap();
        match rx.try_recv().unwrap() {
            ServerEvent::SessionExpired { session_id } => assert_eq!(session_id, 7),
            _ => panic!("Unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let world = World::new(200.0, 200.0, 5);
        let mut server = Server::new(
            "127.0.0.1:0",
            Duration::from_millis(16),
            world,
            Duration::from_secs(120),
        )
        .await
        .unwrap();

        let handle = server.event_handle();
        handle.send(ServerEvent::Shutdown).unwrap();

        // run() must return promptly once the shutdown event is queued
        tokio::time::timeout(Duration::from_secs(1), server.run())
            .await
            .expect("server did not shut down")
            .expect("server loop errored");
    }
}
