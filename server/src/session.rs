//! Fixed pool of game sessions.

use crate::board::{Board, BOARD_SIZE};
use crate::client_manager::SlotId;
use log::debug;

pub type SessionId = usize;

/// Players per session.
pub const SESSION_PARTICIPANTS: usize = 2;

/// One game between two clients.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub in_use: bool,
    pub board: Board<BOARD_SIZE>,
    participants: Vec<SlotId>,
    /// Client whose move is accepted next.
    pub turn_owner: Option<SlotId>,
}

impl Session {
    pub fn participants(&self) -> &[SlotId] {
        &self.participants
    }

    pub fn has_participant(&self, client: SlotId) -> bool {
        self.participants.contains(&client)
    }

    /// The participant that is not `client`.
    pub fn opponent_of(&self, client: SlotId) -> Option<SlotId> {
        self.participants.iter().copied().find(|&id| id != client)
    }
}

/// Session pool sized once at startup. Indices stay valid for the lifetime
/// of the registry.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: vec![Session::default(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.sessions.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.in_use).count()
    }

    /// Claims the first free session. `None` means every session is taken.
    pub fn allocate(&mut self) -> Option<SessionId> {
        let (id, session) = self
            .sessions
            .iter_mut()
            .enumerate()
            .find(|(_, session)| !session.in_use)?;
        session.in_use = true;
        debug!("Session {} in use", id);
        Some(id)
    }

    /// Frees a session and clears its board and participants.
    pub fn release(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.in_use = false;
            session.board.reset();
            session.participants.clear();
            session.turn_owner = None;
            debug!("Session {} is free", id);
        }
    }

    /// Returns false if the session is unknown or already full.
    pub fn add_participant(&mut self, id: SessionId, client: SlotId) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) if session.participants.len() < SESSION_PARTICIPANTS => {
                session.participants.push(client);
                true
            }
            _ => false,
        }
    }

    pub fn participants(&self, id: SessionId) -> &[SlotId] {
        self.sessions
            .get(id)
            .map(Session::participants)
            .unwrap_or(&[])
    }

    pub fn is_in_use(&self, id: SessionId) -> bool {
        self.sessions.get(id).is_some_and(|s| s.in_use)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_takes_first_free() {
        let mut registry = SessionRegistry::new(3);
        assert_eq!(registry.capacity(), 3);
        assert_eq!(registry.allocate(), Some(0));
        assert_eq!(registry.allocate(), Some(1));
        registry.release(0);
        assert_eq!(registry.allocate(), Some(0));
        assert_eq!(registry.allocate(), Some(2));
        assert_eq!(registry.in_use_count(), 3);
    }

    #[test]
    fn test_allocate_exhausted() {
        let mut registry = SessionRegistry::new(1);
        assert_eq!(registry.allocate(), Some(0));
        assert_eq!(registry.allocate(), None);

        let mut empty = SessionRegistry::new(0);
        assert_eq!(empty.allocate(), None);
    }

    #[test]
    fn test_participants_capped_at_two() {
        let mut registry = SessionRegistry::new(1);
        let id = registry.allocate().unwrap();
        assert!(registry.add_participant(id, 4));
        assert!(registry.add_participant(id, 7));
        assert!(!registry.add_participant(id, 9));
        assert_eq!(registry.participants(id), &[4, 7]);
        assert!(!registry.add_participant(5, 1));
    }

    #[test]
    fn test_release_clears_everything() {
        let mut registry = SessionRegistry::new(1);
        let id = registry.allocate().unwrap();
        registry.add_participant(id, 1);
        registry.add_participant(id, 2);
        let session = registry.get_mut(id).unwrap();
        session.turn_owner = Some(1);
        session.board.apply_move(4);

        registry.release(id);

        let session = registry.get(id).unwrap();
        assert!(!session.in_use);
        assert!(!registry.is_in_use(id));
        assert!(session.participants().is_empty());
        assert_eq!(session.turn_owner, None);
        assert_eq!(session.board.move_count(), 0);
    }

    #[test]
    fn test_opponent_lookup() {
        let mut registry = SessionRegistry::new(1);
        let id = registry.allocate().unwrap();
        registry.add_participant(id, 1);
        registry.add_participant(id, 2);
        let session = registry.get(id).unwrap();
        assert_eq!(session.opponent_of(1), Some(2));
        assert_eq!(session.opponent_of(2), Some(1));
        assert!(session.has_participant(2));
        assert!(!session.has_participant(3));
    }

    #[test]
    fn test_unknown_session_is_empty() {
        let registry = SessionRegistry::new(2);
        assert!(registry.participants(10).is_empty());
        assert!(!registry.is_in_use(10));
        assert!(registry.get(10).is_none());
    }
}
