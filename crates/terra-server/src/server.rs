//! WebSocket server and connection handling.

use crate::protocol::{ClientMessage, ServerMessage};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use terra_core::{CreateGameOptions, Manager};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Server state shared across all connections.
pub struct ServerState {
    /// All running games
    pub manager: Manager,
    /// Connections subscribed to each game
    pub subscribers: DashMap<String, HashSet<Uuid>>,
    /// Seat each connection holds, per game
    pub seats: DashMap<Uuid, (String, String)>,
    /// Outgoing channel per connection
    pub senders: DashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            manager: Manager::new(),
            subscribers: DashMap::new(),
            seats: DashMap::new(),
            senders: DashMap::new(),
        }
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, connection_id: Uuid, msg: ServerMessage) {
        if let Some(sender) = self.senders.get(&connection_id) {
            let _ = sender.send(msg);
        }
    }

    /// Broadcast a message to every connection subscribed to a game.
    pub fn broadcast(&self, game_id: &str, msg: ServerMessage) {
        if let Some(subscribers) = self.subscribers.get(game_id) {
            for connection_id in subscribers.iter() {
                self.send_to(*connection_id, msg.clone());
            }
        }
    }

    /// Push the current snapshot to everyone watching the game.
    pub fn broadcast_state(&self, game_id: &str) {
        match self.manager.serialize_state_with_revision(game_id) {
            Ok(state) => self.broadcast(
                game_id,
                ServerMessage::State {
                    game_id: game_id.to_string(),
                    state,
                },
            ),
            Err(e) => warn!("could not snapshot game {}: {}", game_id, e),
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the WebSocket server.
pub async fn run_server(addr: SocketAddr, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Terravia server listening on {}", addr);

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New WebSocket connection from {}", addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = Uuid::new_v4();

    // Channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.senders.insert(connection_id, tx);

    let welcome = ServerMessage::Welcome { connection_id };
    let msg_text = serde_json::to_string(&welcome)?;
    ws_sender.send(Message::Text(msg_text.into())).await?;

    // Forward messages from the channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) {
                    handle_message(connection_id, client_msg, &state);
                } else {
                    warn!("Invalid message from {}: {}", connection_id, text);
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {} closing connection", connection_id);
                break;
            }
            Ok(Message::Ping(_)) => {
                state.send_to(connection_id, ServerMessage::Pong);
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    handle_disconnect(connection_id, &state);
    state.senders.remove(&connection_id);
    send_task.abort();

    info!("Connection closed for {}", connection_id);
    Ok(())
}

/// Handle a client message.
fn handle_message(connection_id: Uuid, msg: ClientMessage, state: &Arc<ServerState>) {
    match msg {
        ClientMessage::CreateGame {
            game_id,
            players,
            randomize_turn_order,
            setup_mode,
        } => {
            let game_id = game_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let options = CreateGameOptions {
                randomize_turn_order,
                setup_mode,
            };
            match state
                .manager
                .create_game_with_options(&game_id, &players, options)
            {
                Ok(()) => {
                    state
                        .subscribers
                        .entry(game_id.clone())
                        .or_default()
                        .insert(connection_id);
                    info!("Game {} created with {} players", game_id, players.len());
                    state.send_to(
                        connection_id,
                        ServerMessage::GameCreated {
                            game_id: game_id.clone(),
                        },
                    );
                    state.broadcast_state(&game_id);
                }
                Err(e) => {
                    state.send_to(
                        connection_id,
                        ServerMessage::Error {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        ClientMessage::JoinGame { game_id, seat } => {
            match state.manager.get_game(&game_id) {
                Ok(gs) => {
                    if !gs.players.contains_key(&seat) {
                        state.send_to(
                            connection_id,
                            ServerMessage::Error {
                                message: format!("no seat {seat} in game {game_id}"),
                            },
                        );
                        return;
                    }
                    state
                        .subscribers
                        .entry(game_id.clone())
                        .or_default()
                        .insert(connection_id);
                    state
                        .seats
                        .insert(connection_id, (game_id.clone(), seat.clone()));
                    state.send_to(
                        connection_id,
                        ServerMessage::JoinedGame {
                            game_id: game_id.clone(),
                            seat,
                        },
                    );
                    state.broadcast_state(&game_id);
                }
                Err(e) => {
                    state.send_to(
                        connection_id,
                        ServerMessage::Error {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        ClientMessage::Action {
            game_id,
            action,
            mut meta,
        } => {
            // A joined connection may only act for its own seat
            if let Some(entry) = state.seats.get(&connection_id) {
                let (seat_game, seat) = entry.value();
                if *seat_game == game_id {
                    meta.seat_id = Some(seat.clone());
                }
            }
            match state.manager.execute_action_with_meta(&game_id, &action, &meta) {
                Ok(result) => {
                    state.send_to(
                        connection_id,
                        ServerMessage::ActionApplied {
                            game_id: game_id.clone(),
                            revision: result.revision,
                            duplicate: result.duplicate,
                        },
                    );
                    if !result.duplicate {
                        state.broadcast_state(&game_id);
                    }
                }
                Err(e) => {
                    state.send_to(
                        connection_id,
                        ServerMessage::Error {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        ClientMessage::GetState { game_id } => {
            match state.manager.serialize_state_with_revision(&game_id) {
                Ok(snapshot) => {
                    state.send_to(
                        connection_id,
                        ServerMessage::State {
                            game_id,
                            state: snapshot,
                        },
                    );
                }
                Err(e) => {
                    state.send_to(
                        connection_id,
                        ServerMessage::Error {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        ClientMessage::ListGames => {
            let games = state.manager.list_games();
            state.send_to(connection_id, ServerMessage::GameList { games });
        }

        ClientMessage::Ping => {
            state.send_to(connection_id, ServerMessage::Pong);
        }
    }
}

/// Handle connection teardown. The game itself keeps running; a client can
/// rejoin its seat and replay from the latest snapshot.
fn handle_disconnect(connection_id: Uuid, state: &Arc<ServerState>) {
    state.seats.remove(&connection_id);
    for mut entry in state.subscribers.iter_mut() {
        entry.value_mut().remove(&connection_id);
    }
}
