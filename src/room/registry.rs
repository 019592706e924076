//! Room registry - owns rooms, routes sessions and supervises matches

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::game::constants::Tuning;
use crate::game::{EntityId, GameMatch, InputState, MatchEvent, MatchHandle, MatchResult, Side};
use crate::ws::protocol::{clamp_chat, Outbound, ServerMsg};

use super::session::{Departure, Member, RoomSummary, RoomView, Seat, SessionRoom, TeamColors};
use super::RoomError;

const ROOM_CHANNEL_CAPACITY: usize = 256;
const SESSION_CHANNEL_CAPACITY: usize = 256;

/// Limits and tuning applied to every room
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    pub max_players: usize,
    pub tuning: Tuning,
    pub snapshot_interval: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_players: 10,
            tuning: Tuning::default(),
            snapshot_interval: 1,
        }
    }
}

impl From<&Config> for RoomSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_players: config.max_players_per_room,
            tuning: config.tuning(),
            snapshot_interval: config.snapshot_every_ticks,
        }
    }
}

struct RoomSlot {
    session: SessionRoom,
    active: Option<MatchHandle>,
}

/// A live room: bookkeeping behind a lock plus its broadcast channel
pub struct Room {
    pub id: Uuid,
    slot: Mutex<RoomSlot>,
    events_tx: broadcast::Sender<Outbound>,
}

impl Room {
    fn new(session: SessionRoom) -> Self {
        let (events_tx, _) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        Self {
            id: session.id(),
            slot: Mutex::new(RoomSlot {
                session,
                active: None,
            }),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.events_tx.subscribe()
    }

    pub fn view(&self) -> RoomView {
        self.slot.lock().session.view()
    }

    pub fn has_active_match(&self) -> bool {
        self.slot.lock().active.is_some()
    }

    fn publish(&self, msg: impl Into<Outbound>) {
        let _ = self.events_tx.send(msg.into());
    }

    /// Clear the match slot once its task is done
    fn finish_match(&self, match_id: Uuid) {
        let view = {
            let mut slot = self.slot.lock();
            if slot.active.as_ref().map(|h| h.id) != Some(match_id) {
                return;
            }
            slot.active = None;
            slot.session.set_in_match(false);
            slot.session.view()
        };
        self.publish(ServerMsg::RoomUpdate { room: view });
    }
}

struct SessionLink {
    name: String,
    tx: mpsc::Sender<Outbound>,
    room_id: Option<Uuid>,
    forwarder: Option<JoinHandle<()>>,
}

/// All rooms and connected sessions
pub struct RoomRegistry {
    rooms: DashMap<Uuid, Arc<Room>>,
    sessions: DashMap<EntityId, SessionLink>,
    settings: RoomSettings,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            rooms: DashMap::new(),
            sessions: DashMap::new(),
            settings,
        }
    }

    /// Register a connected session; returns the channel its socket drains
    pub fn register_session(&self, id: EntityId, name: String) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        self.sessions.insert(
            id,
            SessionLink {
                name,
                tx,
                room_id: None,
                forwarder: None,
            },
        );
        rx
    }

    /// Drop a session, leaving its room first
    pub fn unregister_session(&self, id: EntityId) {
        self.leave_room(id);
        if let Some((_, link)) = self.sessions.remove(&id) {
            if let Some(forwarder) = link.forwarder {
                forwarder.abort();
            }
        }
        info!(session_id = %id, "Session unregistered");
    }

    pub fn rename(&self, id: EntityId, name: String) {
        if let Some(mut link) = self.sessions.get_mut(&id) {
            link.name = name;
        }
    }

    pub fn session_name(&self, id: &EntityId) -> Option<String> {
        self.sessions.get(id).map(|link| link.name.clone())
    }

    /// Queue a message for one session
    pub fn send_to(&self, id: &EntityId, msg: impl Into<Outbound>) {
        let Some(tx) = self.sessions.get(id).map(|link| link.tx.clone()) else {
            return;
        };
        if let Err(e) = tx.try_send(msg.into()) {
            warn!(session_id = %id, error = %e, "Dropped message for session");
        }
    }

    pub fn create_room(
        &self,
        owner_id: EntityId,
        name: Option<String>,
        max_players: Option<usize>,
        password: Option<String>,
    ) -> Result<RoomView, RoomError> {
        let owner_name = self.session_name(&owner_id).ok_or(RoomError::NotInRoom)?;
        self.leave_room(owner_id);

        let max_players = max_players
            .unwrap_or(self.settings.max_players)
            .min(self.settings.max_players);
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{owner_name}'s room"));
        let session = SessionRoom::new(
            Uuid::new_v4(),
            name,
            max_players,
            password,
            Member::human(owner_id, owner_name),
        );

        let room = Arc::new(Room::new(session));
        let view = room.view();
        self.rooms.insert(room.id, room.clone());
        self.attach(owner_id, &room);
        self.send_to(&owner_id, ServerMsg::RoomJoined { room: view.clone() });

        info!(room_id = %room.id, owner_id = %owner_id, "Room created");
        Ok(view)
    }

    pub fn join_room(
        &self,
        id: EntityId,
        room_id: Uuid,
        password: Option<&str>,
    ) -> Result<RoomView, RoomError> {
        let name = self.session_name(&id).ok_or(RoomError::NotInRoom)?;
        let current = self.sessions.get(&id).and_then(|link| link.room_id);
        let room = self.room(&room_id)?;

        if current == Some(room_id) {
            return Ok(room.view());
        }

        let view = {
            let mut slot = room.slot.lock();
            slot.session.join(Member::human(id, name), password)?;
            slot.session.view()
        };

        if current.is_some() {
            self.leave_room(id);
        }
        self.attach(id, &room);
        self.send_to(&id, ServerMsg::RoomJoined { room: view.clone() });
        room.publish(ServerMsg::RoomUpdate { room: view.clone() });

        info!(room_id = %room_id, session_id = %id, "Joined room");
        Ok(view)
    }

    /// Leave the current room, if any. Also the disconnect path.
    pub fn leave_room(&self, id: EntityId) -> Option<Uuid> {
        let room_id = self.detach(id)?;
        self.send_to(&id, ServerMsg::LeftRoom);

        let room = self.rooms.get(&room_id).map(|r| r.clone())?;
        let departure = {
            let mut slot = room.slot.lock();
            match slot.session.leave(&id) {
                Ok(departure) => {
                    Self::apply_departure(&mut slot, &departure);
                    departure
                }
                Err(e) => {
                    debug!(room_id = %room_id, error = %e, "Leave ignored");
                    return Some(room_id);
                }
            }
        };

        info!(room_id = %room_id, session_id = %id, "Left room");
        self.after_departure(&room, &departure);
        Some(room_id)
    }

    pub fn kick(&self, requester: EntityId, target: EntityId) -> Result<(), RoomError> {
        let room = self.room_of(&requester)?;
        let departure = {
            let mut slot = room.slot.lock();
            let departure = slot.session.kick(&requester, &target)?;
            Self::apply_departure(&mut slot, &departure);
            departure
        };

        self.detach(target);
        self.send_to(&target, ServerMsg::Kicked);
        info!(room_id = %room.id, target = %target, "Member kicked");
        self.after_departure(&room, &departure);
        Ok(())
    }

    pub fn join_team(
        &self,
        requester: EntityId,
        target: Option<EntityId>,
        seat: Seat,
    ) -> Result<(), RoomError> {
        let target = target.unwrap_or(requester);
        self.update_room(&requester, |session| {
            session.join_team(&requester, &target, seat)
        })
    }

    pub fn set_team_colors(
        &self,
        requester: EntityId,
        side: Side,
        colors: TeamColors,
    ) -> Result<(), RoomError> {
        self.update_room(&requester, |session| {
            session.set_team_colors(&requester, side, colors)
        })
    }

    pub fn set_match_duration(&self, requester: EntityId, secs: u32) -> Result<(), RoomError> {
        self.update_room(&requester, |session| {
            session.set_match_duration(&requester, secs)
        })
    }

    pub fn add_bot(&self, requester: EntityId) -> Result<(), RoomError> {
        self.update_room(&requester, |session| {
            session.add_bot(&requester).map(|bot| {
                debug!(bot_id = %bot.id, "Bot added");
            })
        })
    }

    pub fn remove_bot(&self, requester: EntityId, bot_id: EntityId) -> Result<(), RoomError> {
        let room = self.room_of(&requester)?;
        let departure = {
            let mut slot = room.slot.lock();
            let departure = slot.session.remove_bot(&requester, &bot_id)?;
            Self::apply_departure(&mut slot, &departure);
            departure
        };
        self.after_departure(&room, &departure);
        Ok(())
    }

    /// Start a match with the current line-up
    pub fn start_match(&self, requester: EntityId) -> Result<(), RoomError> {
        let room = self.room_of(&requester)?;
        let (game, handle, view) = {
            let mut slot = room.slot.lock();
            let roster = slot.session.prepare_match(&requester)?;
            let (game, handle) = GameMatch::new(
                Uuid::new_v4(),
                &roster,
                slot.session.match_duration(),
                self.settings.tuning,
                self.settings.snapshot_interval,
            );
            slot.session.set_in_match(true);
            slot.active = Some(handle.clone());
            (game, handle, slot.session.view())
        };
        // Subscribe before the task runs so the opening countdown is relayed
        let events = handle.subscribe();

        info!(
            room_id = %room.id,
            match_id = %handle.id,
            duration = view.match_duration,
            "Match starting"
        );
        room.publish(ServerMsg::RoomUpdate { room: view });
        room.publish(ServerMsg::MatchStarting);

        let task = tokio::spawn(game.run());
        tokio::spawn(supervise(room, handle, events, task));
        Ok(())
    }

    pub fn stop_match(&self, requester: EntityId) -> Result<(), RoomError> {
        let room = self.room_of(&requester)?;
        let slot = room.slot.lock();
        if slot.session.owner_id() != requester {
            return Err(RoomError::NotOwner);
        }
        let handle = slot.active.as_ref().ok_or(RoomError::NoActiveMatch)?;
        handle.stop();
        Ok(())
    }

    /// Forward held controls to the running match. Silently ignored
    /// outside a match or from the bench.
    pub fn apply_input(&self, id: EntityId, input: InputState) {
        let Ok(room) = self.room_of(&id) else {
            return;
        };
        let slot = room.slot.lock();
        let on_team = slot
            .session
            .seat_of(&id)
            .and_then(Seat::side)
            .is_some();
        if let (Some(handle), true) = (slot.active.as_ref(), on_team) {
            handle.apply_input(id, input);
        }
    }

    pub fn chat(&self, id: EntityId, text: &str) -> Result<(), RoomError> {
        let room = self.room_of(&id)?;
        let text = clamp_chat(text);
        if text.is_empty() {
            return Ok(());
        }
        let username = self.session_name(&id).unwrap_or_default();
        room.publish(ServerMsg::Chat {
            player_id: id,
            username,
            text,
        });
        Ok(())
    }

    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let rooms: Vec<Arc<Room>> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.iter().map(|r| r.slot.lock().session.summary()).collect()
    }

    pub fn get(&self, room_id: &Uuid) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|r| r.clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn active_matches(&self) -> usize {
        let rooms: Vec<Arc<Room>> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.iter().filter(|r| r.has_active_match()).count()
    }

    fn room(&self, room_id: &Uuid) -> Result<Arc<Room>, RoomError> {
        self.get(room_id).ok_or(RoomError::NotFound)
    }

    fn room_of(&self, id: &EntityId) -> Result<Arc<Room>, RoomError> {
        let room_id = self
            .sessions
            .get(id)
            .and_then(|link| link.room_id)
            .ok_or(RoomError::NotInRoom)?;
        self.room(&room_id)
    }

    /// Run a settings change and broadcast the new room state
    fn update_room(
        &self,
        requester: &EntityId,
        change: impl FnOnce(&mut SessionRoom) -> Result<(), RoomError>,
    ) -> Result<(), RoomError> {
        let room = self.room_of(requester)?;
        let view = {
            let mut slot = room.slot.lock();
            change(&mut slot.session)?;
            slot.session.view()
        };
        room.publish(ServerMsg::RoomUpdate { room: view });
        Ok(())
    }

    /// Pull a departed team member out of the running match and forfeit
    /// when a side is empty.
    fn apply_departure(slot: &mut RoomSlot, departure: &Departure) {
        let Some(handle) = slot.active.as_ref() else {
            return;
        };
        if departure.seat.side().is_none() {
            return;
        }

        handle.remove_entity(departure.member.id);
        if let Some(winner) = slot.session.forfeit_winner() {
            handle.forfeit(winner);
        }
    }

    fn after_departure(&self, room: &Arc<Room>, departure: &Departure) {
        if departure.abandoned {
            if let Some((_, room)) = self.rooms.remove(&room.id) {
                if let Some(handle) = room.slot.lock().active.as_ref() {
                    handle.stop();
                }
                info!(room_id = %room.id, "Room closed");
            }
            return;
        }

        room.publish(ServerMsg::RoomUpdate { room: room.view() });
        if let Some(owner_id) = departure.new_owner {
            room.publish(ServerMsg::NewOwner { owner_id });
        }
    }

    /// Point a session's outbound stream at a room
    fn attach(&self, id: EntityId, room: &Arc<Room>) {
        let mut events = room.subscribe();
        let Some(mut link) = self.sessions.get_mut(&id) else {
            return;
        };
        if let Some(previous) = link.forwarder.take() {
            previous.abort();
        }

        let tx = link.tx.clone();
        link.room_id = Some(room.id);
        link.forwarder = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(msg) => {
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(session_id = %id, lagged = n, "Session lagged behind room");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Stop forwarding room traffic; returns the room left
    fn detach(&self, id: EntityId) -> Option<Uuid> {
        let mut link = self.sessions.get_mut(&id)?;
        if let Some(forwarder) = link.forwarder.take() {
            forwarder.abort();
        }
        link.room_id.take()
    }
}

/// Relay match events into the room until the task ends, then make sure
/// exactly one `matchEnd` went out and release the room.
async fn supervise(
    room: Arc<Room>,
    handle: MatchHandle,
    mut events: broadcast::Receiver<MatchEvent>,
    mut task: JoinHandle<MatchResult>,
) {
    let mut delivered = false;
    let mut relay = |event: MatchEvent| {
        if matches!(event, MatchEvent::MatchEnd { .. }) {
            delivered = true;
        }
        room.publish(event);
    };

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => relay(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(room_id = %room.id, lagged = n, "Room relay lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
            outcome = &mut task => break outcome,
        }
    };

    loop {
        match events.try_recv() {
            Ok(event) => relay(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    match outcome {
        Ok(result) => {
            if !delivered {
                room.publish(MatchEvent::MatchEnd { result });
            }
        }
        Err(e) => {
            error!(room_id = %room.id, match_id = %handle.id, error = %e, "Match task failed");
            let result = MatchResult::fault(&handle.status());
            room.publish(MatchEvent::MatchEnd { result });
        }
    }

    room.finish_match(handle.id);
}
