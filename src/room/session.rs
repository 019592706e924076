//! Room membership, teams and match settings.
//!
//! Pure bookkeeping: no channels, no tasks. The registry wraps each
//! `SessionRoom` in a lock and drives matches from it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{EntityId, MatchDuration, Roster, RosterEntry, Side};

use super::RoomError;

/// Someone occupying a room slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: EntityId,
    pub name: String,
    pub is_bot: bool,
}

impl Member {
    pub fn human(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_bot: false,
        }
    }
}

/// Where a member sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    Left,
    Right,
    Spectator,
}

impl Seat {
    pub fn side(self) -> Option<Side> {
        match self {
            Seat::Left => Some(Side::Left),
            Seat::Right => Some(Side::Right),
            Seat::Spectator => None,
        }
    }
}

/// Team kit and line-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub name: String,
    pub jersey: String,
    pub shorts: String,
    pub number: String,
    pub players: Vec<EntityId>,
}

impl Team {
    fn new(name: &str, jersey: &str, shorts: &str, number: &str) -> Self {
        Self {
            name: name.to_string(),
            jersey: jersey.to_string(),
            shorts: shorts.to_string(),
            number: number.to_string(),
            players: Vec::new(),
        }
    }

    pub fn default_left() -> Self {
        Self::new("Blue", "#3B82F6", "#1E40AF", "#FFFFFF")
    }

    pub fn default_right() -> Self {
        Self::new("Red", "#EF4444", "#991B1B", "#FFFFFF")
    }

    fn apply(&mut self, colors: TeamColors) {
        if let Some(name) = colors.name.filter(|s| !s.is_empty()) {
            self.name = name;
        }
        if let Some(jersey) = colors.jersey.filter(|s| !s.is_empty()) {
            self.jersey = jersey;
        }
        if let Some(shorts) = colors.shorts.filter(|s| !s.is_empty()) {
            self.shorts = shorts;
        }
        if let Some(number) = colors.number.filter(|s| !s.is_empty()) {
            self.number = number;
        }
    }
}

/// Partial kit update; missing or empty fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TeamColors {
    pub name: Option<String>,
    pub jersey: Option<String>,
    pub shorts: Option<String>,
    pub number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomPhase {
    Waiting,
    Playing,
}

/// Full room state sent to members
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: Uuid,
    pub name: String,
    pub max_players: usize,
    pub has_password: bool,
    pub owner_id: EntityId,
    pub players: Vec<Member>,
    pub team_left: Team,
    pub team_right: Team,
    pub spectators: Vec<EntityId>,
    pub match_duration: u32,
    pub state: RoomPhase,
}

/// Lobby listing entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: Uuid,
    pub name: String,
    pub player_count: usize,
    pub max_players: usize,
    pub has_password: bool,
    pub state: RoomPhase,
    pub team_left_count: usize,
    pub team_right_count: usize,
}

/// What happened when a member left
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub member: Member,
    pub seat: Seat,
    /// Set when ownership moved to someone else
    pub new_owner: Option<EntityId>,
    /// No humans left; the room should be deleted
    pub abandoned: bool,
}

#[derive(Debug)]
pub struct SessionRoom {
    id: Uuid,
    name: String,
    max_players: usize,
    password: Option<String>,
    owner_id: EntityId,
    /// Join order, used for ownership transfer
    members: Vec<Member>,
    team_left: Team,
    team_right: Team,
    spectators: Vec<EntityId>,
    match_duration: MatchDuration,
    in_match: bool,
    bots_added: u32,
}

impl SessionRoom {
    pub fn new(
        id: Uuid,
        name: String,
        max_players: usize,
        password: Option<String>,
        owner: Member,
    ) -> Self {
        let owner_id = owner.id;
        Self {
            id,
            name,
            max_players: max_players.max(2),
            password: password.filter(|p| !p.is_empty()),
            owner_id,
            members: vec![owner],
            team_left: Team::default_left(),
            team_right: Team::default_right(),
            spectators: vec![owner_id],
            match_duration: MatchDuration::default(),
            in_match: false,
            bots_added: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> EntityId {
        self.owner_id
    }

    pub fn match_duration(&self) -> MatchDuration {
        self.match_duration
    }

    pub fn in_match(&self) -> bool {
        self.in_match
    }

    pub fn set_in_match(&mut self, in_match: bool) {
        self.in_match = in_match;
    }

    pub fn member(&self, id: &EntityId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == *id)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_players
    }

    pub fn seat_of(&self, id: &EntityId) -> Option<Seat> {
        if self.team_left.players.contains(id) {
            Some(Seat::Left)
        } else if self.team_right.players.contains(id) {
            Some(Seat::Right)
        } else if self.spectators.contains(id) {
            Some(Seat::Spectator)
        } else {
            None
        }
    }

    pub fn join(&mut self, member: Member, password: Option<&str>) -> Result<(), RoomError> {
        if let Some(expected) = &self.password {
            if password != Some(expected.as_str()) {
                return Err(RoomError::WrongPassword);
            }
        }
        if self.is_full() {
            return Err(RoomError::Full);
        }
        if self.in_match {
            return Err(RoomError::MatchInProgress);
        }
        if self.member(&member.id).is_some() {
            return Ok(());
        }

        self.spectators.push(member.id);
        self.members.push(member);
        Ok(())
    }

    /// Remove a member from every list. Ownership passes to the earliest
    /// remaining human.
    pub fn leave(&mut self, id: &EntityId) -> Result<Departure, RoomError> {
        let index = self
            .members
            .iter()
            .position(|m| m.id == *id)
            .ok_or(RoomError::UnknownMember(*id))?;
        let seat = self.seat_of(id).unwrap_or(Seat::Spectator);
        let member = self.members.remove(index);
        self.unseat(id);

        let next_owner = self.members.iter().find(|m| !m.is_bot).map(|m| m.id);
        let mut new_owner = None;
        if member.id == self.owner_id {
            if let Some(next) = next_owner {
                self.owner_id = next;
                new_owner = Some(next);
            }
        }

        Ok(Departure {
            member,
            seat,
            new_owner,
            abandoned: next_owner.is_none(),
        })
    }

    pub fn kick(&mut self, requester: &EntityId, target: &EntityId) -> Result<Departure, RoomError> {
        self.require_owner(requester)?;
        if requester == target {
            return Err(RoomError::SelfKick);
        }
        self.leave(target)
    }

    /// Seat `target` on a team or the bench. Members may move themselves;
    /// the owner may move anyone.
    pub fn join_team(
        &mut self,
        requester: &EntityId,
        target: &EntityId,
        seat: Seat,
    ) -> Result<(), RoomError> {
        if self.in_match {
            return Err(RoomError::MatchInProgress);
        }
        if requester != target && *requester != self.owner_id {
            return Err(RoomError::NotOwner);
        }
        if self.member(target).is_none() {
            return Err(RoomError::UnknownMember(*target));
        }

        self.unseat(target);
        match seat {
            Seat::Left => self.team_left.players.push(*target),
            Seat::Right => self.team_right.players.push(*target),
            Seat::Spectator => self.spectators.push(*target),
        }
        Ok(())
    }

    pub fn set_team_colors(
        &mut self,
        requester: &EntityId,
        side: Side,
        colors: TeamColors,
    ) -> Result<(), RoomError> {
        self.require_owner(requester)?;
        match side {
            Side::Left => self.team_left.apply(colors),
            Side::Right => self.team_right.apply(colors),
        }
        Ok(())
    }

    pub fn set_match_duration(&mut self, requester: &EntityId, secs: u32) -> Result<(), RoomError> {
        self.require_owner(requester)?;
        self.match_duration = MatchDuration::try_from(secs)?;
        Ok(())
    }

    /// Add a bot to the bench
    pub fn add_bot(&mut self, requester: &EntityId) -> Result<Member, RoomError> {
        self.require_owner(requester)?;
        if self.is_full() {
            return Err(RoomError::Full);
        }

        self.bots_added += 1;
        let bot = Member {
            id: Uuid::new_v4(),
            name: format!("Bot {}", self.bots_added),
            is_bot: true,
        };
        self.spectators.push(bot.id);
        self.members.push(bot.clone());
        Ok(bot)
    }

    pub fn remove_bot(&mut self, requester: &EntityId, bot_id: &EntityId) -> Result<Departure, RoomError> {
        self.require_owner(requester)?;
        match self.member(bot_id) {
            Some(member) if member.is_bot => self.leave(bot_id),
            _ => Err(RoomError::UnknownMember(*bot_id)),
        }
    }

    /// Validate a start request and build the line-up
    pub fn prepare_match(&self, requester: &EntityId) -> Result<Roster, RoomError> {
        self.require_owner(requester)?;
        if self.in_match {
            return Err(RoomError::MatchInProgress);
        }
        if self.team_left.players.is_empty() || self.team_right.players.is_empty() {
            return Err(RoomError::EmptyTeam);
        }

        Ok(Roster {
            left: self.roster_entries(&self.team_left),
            right: self.roster_entries(&self.team_right),
        })
    }

    /// After a team member left mid-match: `Some(winner)` when a side is
    /// empty, with `winner == None` when both are.
    pub fn forfeit_winner(&self) -> Option<Option<Side>> {
        match (
            self.team_left.players.is_empty(),
            self.team_right.players.is_empty(),
        ) {
            (false, false) => None,
            (true, true) => Some(None),
            (true, false) => Some(Some(Side::Right)),
            (false, true) => Some(Some(Side::Left)),
        }
    }

    pub fn view(&self) -> RoomView {
        RoomView {
            id: self.id,
            name: self.name.clone(),
            max_players: self.max_players,
            has_password: self.password.is_some(),
            owner_id: self.owner_id,
            players: self.members.clone(),
            team_left: self.team_left.clone(),
            team_right: self.team_right.clone(),
            spectators: self.spectators.clone(),
            match_duration: self.match_duration.secs(),
            state: self.phase(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            name: self.name.clone(),
            player_count: self.members.len(),
            max_players: self.max_players,
            has_password: self.password.is_some(),
            state: self.phase(),
            team_left_count: self.team_left.players.len(),
            team_right_count: self.team_right.players.len(),
        }
    }

    fn phase(&self) -> RoomPhase {
        if self.in_match {
            RoomPhase::Playing
        } else {
            RoomPhase::Waiting
        }
    }

    fn roster_entries(&self, team: &Team) -> Vec<RosterEntry> {
        team.players
            .iter()
            .filter_map(|id| self.member(id))
            .map(|m| RosterEntry {
                id: m.id,
                name: m.name.clone(),
                is_bot: m.is_bot,
            })
            .collect()
    }

    fn unseat(&mut self, id: &EntityId) {
        self.team_left.players.retain(|p| p != id);
        self.team_right.players.retain(|p| p != id);
        self.spectators.retain(|p| p != id);
    }

    fn require_owner(&self, requester: &EntityId) -> Result<(), RoomError> {
        if *requester == self.owner_id {
            Ok(())
        } else {
            Err(RoomError::NotOwner)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_with(owner: &Member) -> SessionRoom {
        SessionRoom::new(Uuid::new_v4(), "test".to_string(), 4, None, owner.clone())
    }

    fn human(name: &str) -> Member {
        Member::human(Uuid::new_v4(), name)
    }

    #[test]
    fn new_members_start_on_the_bench() {
        let owner = human("owner");
        let mut room = room_with(&owner);
        let guest = human("guest");
        room.join(guest.clone(), None).unwrap();

        assert_eq!(room.seat_of(&owner.id), Some(Seat::Spectator));
        assert_eq!(room.seat_of(&guest.id), Some(Seat::Spectator));
        assert_eq!(room.view().players.len(), 2);
    }

    #[test]
    fn join_checks_password_capacity_and_match() {
        let owner = human("owner");
        let mut room = SessionRoom::new(
            Uuid::new_v4(),
            "locked".to_string(),
            2,
            Some("hunter2".to_string()),
            owner,
        );

        assert_eq!(room.join(human("a"), None), Err(RoomError::WrongPassword));
        room.join(human("b"), Some("hunter2")).unwrap();
        assert_eq!(room.join(human("c"), Some("hunter2")), Err(RoomError::Full));

        let mut room = room_with(&human("owner"));
        room.set_in_match(true);
        assert_eq!(room.join(human("d"), None), Err(RoomError::MatchInProgress));
    }

    #[test]
    fn ownership_moves_to_earliest_remaining_human() {
        let owner = human("owner");
        let mut room = room_with(&owner);
        let bot = room.add_bot(&owner.id).unwrap();
        let second = human("second");
        let third = human("third");
        room.join(second.clone(), None).unwrap();
        room.join(third.clone(), None).unwrap();

        let departure = room.leave(&owner.id).unwrap();
        assert_eq!(departure.new_owner, Some(second.id));
        assert!(!departure.abandoned);
        assert_eq!(room.owner_id(), second.id);

        room.leave(&second.id).unwrap();
        let departure = room.leave(&third.id).unwrap();
        // Only the bot is left
        assert!(departure.abandoned);
        assert!(room.member(&bot.id).is_some());
    }

    #[test]
    fn kick_is_owner_only_and_never_self() {
        let owner = human("owner");
        let guest = human("guest");
        let mut room = room_with(&owner);
        room.join(guest.clone(), None).unwrap();

        assert_eq!(room.kick(&guest.id, &owner.id), Err(RoomError::NotOwner));
        assert_eq!(room.kick(&owner.id, &owner.id), Err(RoomError::SelfKick));

        let departure = room.kick(&owner.id, &guest.id).unwrap();
        assert_eq!(departure.member, guest);
        assert!(room.member(&guest.id).is_none());
    }

    #[test]
    fn team_moves_by_self_or_owner() {
        let owner = human("owner");
        let guest = human("guest");
        let other = human("other");
        let mut room = room_with(&owner);
        room.join(guest.clone(), None).unwrap();
        room.join(other.clone(), None).unwrap();

        room.join_team(&guest.id, &guest.id, Seat::Left).unwrap();
        assert_eq!(room.seat_of(&guest.id), Some(Seat::Left));

        assert_eq!(
            room.join_team(&guest.id, &other.id, Seat::Right),
            Err(RoomError::NotOwner)
        );
        room.join_team(&owner.id, &other.id, Seat::Right).unwrap();
        assert_eq!(room.seat_of(&other.id), Some(Seat::Right));

        room.join_team(&guest.id, &guest.id, Seat::Spectator).unwrap();
        assert_eq!(room.seat_of(&guest.id), Some(Seat::Spectator));
        assert_eq!(room.view().team_left.players.len(), 0);

        room.set_in_match(true);
        assert_eq!(
            room.join_team(&guest.id, &guest.id, Seat::Left),
            Err(RoomError::MatchInProgress)
        );
    }

    #[test]
    fn colors_and_duration_are_owner_settings() {
        let owner = human("owner");
        let guest = human("guest");
        let mut room = room_with(&owner);
        room.join(guest.clone(), None).unwrap();

        let colors = TeamColors {
            jersey: Some("#000000".to_string()),
            name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            room.set_team_colors(&guest.id, Side::Left, colors.clone()),
            Err(RoomError::NotOwner)
        );
        room.set_team_colors(&owner.id, Side::Left, colors).unwrap();
        let view = room.view();
        assert_eq!(view.team_left.jersey, "#000000");
        assert_eq!(view.team_left.name, "Blue");
        assert_eq!(view.team_right, Team::default_right());

        assert!(matches!(
            room.set_match_duration(&owner.id, 42),
            Err(RoomError::InvalidDuration(_))
        ));
        room.set_match_duration(&owner.id, 600).unwrap();
        assert_eq!(room.match_duration().secs(), 600);
    }

    #[test]
    fn bots_are_capacity_checked() {
        let owner = human("owner");
        let mut room = room_with(&owner);
        let first = room.add_bot(&owner.id).unwrap();
        room.add_bot(&owner.id).unwrap();
        room.add_bot(&owner.id).unwrap();
        assert_eq!(room.add_bot(&owner.id), Err(RoomError::Full));

        assert!(first.is_bot);
        assert_eq!(first.name, "Bot 1");
        assert_eq!(
            room.remove_bot(&owner.id, &owner.id),
            Err(RoomError::UnknownMember(owner.id))
        );
        room.remove_bot(&owner.id, &first.id).unwrap();
        assert!(!room.is_full());
    }

    #[test]
    fn match_needs_owner_and_both_teams() {
        let owner = human("owner");
        let guest = human("guest");
        let mut room = room_with(&owner);
        room.join(guest.clone(), None).unwrap();

        room.join_team(&owner.id, &owner.id, Seat::Left).unwrap();
        assert_eq!(room.prepare_match(&owner.id), Err(RoomError::EmptyTeam));

        let bot = room.add_bot(&owner.id).unwrap();
        room.join_team(&owner.id, &bot.id, Seat::Right).unwrap();
        assert_eq!(room.prepare_match(&guest.id), Err(RoomError::NotOwner));

        let roster = room.prepare_match(&owner.id).unwrap();
        assert_eq!(roster.left[0].id, owner.id);
        assert!(roster.right[0].is_bot);

        room.set_in_match(true);
        assert_eq!(room.prepare_match(&owner.id), Err(RoomError::MatchInProgress));
    }

    #[test]
    fn forfeit_winner_tracks_empty_sides() {
        let owner = human("owner");
        let guest = human("guest");
        let mut room = room_with(&owner);
        room.join(guest.clone(), None).unwrap();
        room.join_team(&owner.id, &owner.id, Seat::Left).unwrap();
        room.join_team(&owner.id, &guest.id, Seat::Right).unwrap();
        assert_eq!(room.forfeit_winner(), None);

        room.leave(&guest.id).unwrap();
        assert_eq!(room.forfeit_winner(), Some(Some(Side::Left)));

        room.leave(&owner.id).unwrap();
        assert_eq!(room.forfeit_winner(), Some(None));
    }
}
