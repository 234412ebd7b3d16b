//! Room manager: creates rooms on demand and routes players to them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bourse_engine::{DiceSource, PlayerView, SecureDice};
use bourse_protocol::{PlayerId, RoomId};

use crate::room::spawn_room;
use crate::{EventSink, RoomConfig, RoomError, RoomHandle, RoomInfo};

/// Builds the dice for each new room.
pub type DiceFactory = Arc<dyn Fn() -> Box<dyn DiceSource> + Send + Sync>;

/// All live rooms, plus which room each connected player is in.
///
/// A player is routed to at most one room at a time. Moving to another
/// room disconnects them from the first; their seat there stays.
pub struct RoomManager {
    rooms: HashMap<RoomId, RoomHandle>,
    player_rooms: HashMap<PlayerId, RoomId>,
    config: RoomConfig,
    sink: Arc<dyn EventSink>,
    dice: DiceFactory,
}

impl fmt::Debug for RoomManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomManager")
            .field("rooms", &self.rooms.len())
            .field("players", &self.player_rooms.len())
            .field("config", &self.config)
            .finish()
    }
}

impl RoomManager {
    pub fn new(config: RoomConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            config,
            sink,
            dice: Arc::new(|| -> Box<dyn DiceSource> { Box::new(SecureDice) }),
        }
    }

    /// Replaces the dice given to rooms created from now on.
    pub fn with_dice(mut self, dice: DiceFactory) -> Self {
        self.dice = dice;
        self
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// The room registered under `room_id`, spawning it if there is none
    /// or its actor has stopped.
    pub fn get_or_create(&mut self, room_id: &RoomId) -> RoomHandle {
        if let Some(handle) = self.rooms.get(room_id) {
            if !handle.is_closed() {
                return handle.clone();
            }
            tracing::warn!(%room_id, "room actor gone, respawning");
        }
        let handle = spawn_room(
            room_id.clone(),
            self.config.clone(),
            Arc::clone(&self.sink),
            (self.dice)(),
        );
        self.rooms.insert(room_id.clone(), handle.clone());
        tracing::info!(%room_id, rooms = self.rooms.len(), "room created");
        handle
    }

    pub fn handle(&self, room_id: &RoomId) -> Result<RoomHandle, RoomError> {
        self.rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))
    }

    /// Seats a player in `room_id`, creating the room if needed, and
    /// routes them there. The handle lets the caller reach the room
    /// without going through the manager again.
    pub async fn join_room(
        &mut self,
        player_id: PlayerId,
        room_id: &RoomId,
        name: &str,
        avatar: Option<String>,
    ) -> Result<(RoomHandle, PlayerView), RoomError> {
        if let Some(current) = self.player_rooms.get(&player_id).cloned() {
            if current != *room_id {
                tracing::debug!(%player_id, from = %current, to = %room_id, "player switching rooms");
                self.disconnect_player(player_id).await;
            }
        }

        let handle = self.get_or_create(room_id);
        let view = handle.join(player_id, name, avatar).await?;
        self.player_rooms.insert(player_id, room_id.clone());
        Ok((handle, view))
    }

    /// The room a player is currently routed to.
    pub fn player_room(&self, player_id: PlayerId) -> Option<&RoomId> {
        self.player_rooms.get(&player_id)
    }

    /// Tells the player's room their connection is gone and forgets the
    /// routing. Does nothing for a player who is in no room.
    pub async fn disconnect_player(&mut self, player_id: PlayerId) {
        let Some(room_id) = self.player_rooms.remove(&player_id) else {
            return;
        };
        if let Some(handle) = self.rooms.get(&room_id) {
            if let Err(e) = handle.disconnect(player_id).await {
                tracing::debug!(%player_id, %room_id, error = %e, "disconnect not delivered");
            }
        }
    }

    /// Shuts a room down and drops every route into it.
    pub async fn destroy_room(&mut self, room_id: &RoomId) -> Result<(), RoomError> {
        let handle = self
            .rooms
            .remove(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;

        let _ = handle.shutdown().await;
        self.player_rooms.retain(|_, rid| rid != room_id);

        tracing::info!(%room_id, "room destroyed");
        Ok(())
    }

    /// Destroys rooms nobody is connected to that have been idle for at
    /// least `ttl`, and rooms whose actor has stopped. Returns their ids.
    pub async fn reap_idle(&mut self, ttl: Duration) -> Vec<RoomId> {
        let mut doomed = Vec::new();
        for (room_id, handle) in &self.rooms {
            match handle.info().await {
                Ok(info) if info.online_count == 0 && info.idle_for >= ttl => {
                    doomed.push(room_id.clone());
                }
                Ok(_) => {}
                Err(_) => doomed.push(room_id.clone()),
            }
        }
        for room_id in &doomed {
            let _ = self.destroy_room(room_id).await;
        }
        if !doomed.is_empty() {
            tracing::info!(reaped = doomed.len(), remaining = self.rooms.len(), "idle rooms reaped");
        }
        doomed
    }

    /// Info for every room that answers. Stopped rooms are skipped.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut infos = Vec::with_capacity(self.rooms.len());
        for handle in self.rooms.values() {
            if let Ok(info) = handle.info().await {
                infos.push(info);
            }
        }
        infos.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        infos
    }

    /// Cloned handles, for async work without holding the manager.
    pub fn room_handles(&self) -> Vec<RoomHandle> {
        self.rooms.values().cloned().collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }
}
