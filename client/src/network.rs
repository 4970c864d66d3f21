//! Client event loop: socket traffic, input cadence, smoothing and frames.
//!
//! Movement and eat submissions are fire-and-forget; the next snapshot from
//! the server overwrites whatever the client believed in the meantime.

use crate::game::{Reconciler, SessionPhase};
use crate::input::InputManager;
use crate::view::{ArenaView, ChatLine};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::Message;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// Chat lines older than this are dropped from the on-screen log.
const CHAT_RETENTION: Duration = Duration::from_secs(30);

pub struct Client<V: ArenaView> {
    socket: UdpSocket,
    server_addr: SocketAddr,
    view: V,

    pub reconciler: Reconciler,
    input: InputManager,
    chat_log: Vec<ChatLine>,

    desired_name: String,
    arena_width: f32,
    arena_height: f32,
    paused: bool,
}

impl<V: ArenaView> Client<V> {
    pub async fn new(
        server_addr: &str,
        desired_name: String,
        arena_width: f32,
        arena_height: f32,
        view: V,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            view,
            reconciler: Reconciler::new(),
            input: InputManager::new(),
            chat_log: Vec::new(),
            desired_name,
            arena_width,
            arena_height,
            paused: false,
        })
    }

    /// Serializes and sends without waiting for any acknowledgement.
    async fn send(&self, message: &Message) {
        match serialize(message) {
            Ok(data) => {
                if let Err(e) = self.socket.send_to(&data, self.server_addr).await {
                    error!("Failed to send to server: {}", e);
                }
            }
            Err(e) => error!("Failed to encode message: {}", e),
        }
    }

    pub async fn send_chat(&self, text: &str) {
        self.send(&Message::ChatMessage {
            name: self.reconciler.own_name.clone(),
            message: text.to_string(),
        })
        .await;
    }

    async fn handle_message(&mut self, message: Message) {
        match message {
            Message::Connected { session_id } => {
                info!("Connected, session id {}", session_id);
                let reconnecting = self.reconciler.phase != SessionPhase::Disconnected;
                self.reconciler.on_connected(session_id);
                self.send(&Message::SetCanvasSize {
                    width: self.arena_width,
                    height: self.arena_height,
                })
                .await;
                if reconnecting && !self.reconciler.own_name.is_empty() {
                    // try to reclaim the previous entity before re-registering
                    self.send(&Message::RestorePlayer {
                        name: self.reconciler.own_name.clone(),
                    })
                    .await;
                } else {
                    self.send(&Message::SetPlayerName {
                        name: self.desired_name.clone(),
                    })
                    .await;
                }
            }

            Message::SetPlayerNameResponse {
                success,
                player,
                message,
            } => {
                if success {
                    if let Some(info) = player {
                        info!("Joined as '{}'", info.name);
                        self.reconciler.on_admitted(&info);
                    }
                } else {
                    error!(
                        "Name registration rejected: {}",
                        message.unwrap_or_else(|| "unknown reason".to_string())
                    );
                }
            }

            Message::RestorePlayerResponse {
                success,
                player,
                message,
            } => {
                if success {
                    if let Some(info) = player {
                        info!("Restored as '{}'", info.name);
                        self.reconciler.on_admitted(&info);
                    }
                } else {
                    debug!(
                        "Restore failed ({}), registering fresh",
                        message.unwrap_or_else(|| "unknown reason".to_string())
                    );
                    self.send(&Message::SetPlayerName {
                        name: self.desired_name.clone(),
                    })
                    .await;
                }
            }

            Message::UpdateGameState(snapshot) => {
                self.reconciler.apply_snapshot(&snapshot);
                // claim overlapping food once per id until the server settles it
                if !self.paused {
                    for (food_id, player_x, player_y) in self.reconciler.claim_eats() {
                        self.send(&Message::EatFood {
                            id: food_id,
                            player_x,
                            player_y,
                        })
                        .await;
                    }
                }
            }

            Message::ChatMessage { name, message } => {
                self.chat_log.push(ChatLine {
                    name,
                    message,
                    received: Instant::now(),
                });
            }

            Message::PlayerEaten { eaten_id, eater_id } => {
                if Some(eaten_id) == self.reconciler.own_id {
                    info!("Absorbed by player {}", eater_id);
                    self.reconciler.on_eaten();
                    self.reconciler.back_to_menu();
                    self.send(&Message::SetPlayerName {
                        name: self.desired_name.clone(),
                    })
                    .await;
                } else {
                    self.reconciler.remove_remote(eaten_id);
                }
            }

            Message::PlayerInactive { session_id } => {
                if Some(session_id) == self.reconciler.own_id {
                    info!("Evicted for inactivity, reconnecting");
                    self.reconciler.on_evicted();
                    self.reconciler.back_to_menu();
                    self.send(&Message::Connect).await;
                } else {
                    self.reconciler.remove_remote(session_id);
                }
            }

            Message::NameTaken => {
                warn!("Name '{}' is already taken", self.desired_name);
            }

            other => {
                warn!("Unexpected message from server: {:?}", other);
            }
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to {}...", self.server_addr);
        self.send(&Message::Connect).await;

        let mut input_interval = interval(Duration::from_millis(16));
        let mut blend_interval = interval(Duration::from_millis(16));
        let mut render_interval = interval(Duration::from_millis(16));
        let mut last_blend = Instant::now();

        let mut buffer = [0u8; 8192];

        while self.view.is_open() {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(message) = deserialize::<Message>(&buffer[0..len]) {
                                self.handle_message(message).await;
                            } else {
                                warn!("Undecodable datagram from server");
                            }
                        }
                        Err(e) => error!("Error receiving datagram: {}", e),
                    }
                },

                _ = input_interval.tick() => {
                    if self.reconciler.phase == SessionPhase::Active {
                        let sample = self.input.sample();
                        if sample.toggle_pause {
                            self.paused = !self.paused;
                            info!("Paused: {}", self.paused);
                            self.send(&Message::SetPaused { paused: self.paused }).await;
                        }
                        if !self.paused {
                            self.send(&Message::UpdatePlayerPosition {
                                direction_x: sample.direction_x,
                                direction_y: sample.direction_y,
                            }).await;
                        }
                    }
                },

                _ = blend_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_blend).as_secs_f32();
                    last_blend = now;

                    if !self.paused {
                        self.reconciler.blend_all(dt);
                    }
                    self.reconciler.prune_stale_remotes();
                    self.chat_log.retain(|line| line.received.elapsed() < CHAT_RETENTION);
                },

                _ = render_interval.tick() => {
                    if let Err(e) = self.view.frame(&self.reconciler, &self.chat_log) {
                        // presentation trouble never stops the reconciler
                        debug!("Frame skipped: {}", e);
                    }
                },
            }
        }

        self.send(&Message::Disconnect).await;
        Ok(())
    }
}
