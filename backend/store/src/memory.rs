use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    Result, Store,
    models::{Ballot, Event, Joined, NewParticipant, Participant, Vote},
};

#[derive(Default)]
struct Tables {
    next_event_id: u64,
    next_participant_id: u64,
    events: BTreeMap<u64, Event>,
    participants: BTreeMap<u64, Participant>,
    sessions: HashMap<(u64, String), u64>,
    ballots: BTreeMap<u64, Vote>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_event(&self, name: &str, expected_players: u32) -> Result<Event> {
        let mut tables = self.tables();

        tables.next_event_id += 1;
        let event = Event {
            id: tables.next_event_id,
            name: name.to_string(),
            expected_players,
            is_voting_open: false,
            created_at: Utc::now(),
        };
        tables.events.insert(event.id, event.clone());

        Ok(event)
    }

    async fn event(&self, id: u64) -> Result<Option<Event>> {
        Ok(self.tables().events.get(&id).cloned())
    }

    async fn open_voting(&self, id: u64) -> Result<()> {
        if let Some(event) = self.tables().events.get_mut(&id) {
            event.is_voting_open = true;
        }

        Ok(())
    }

    async fn join(&self, new: NewParticipant) -> Result<Joined> {
        let mut tables = self.tables();

        let session = (new.event_id, new.session_uid.clone());
        if let Some(existing) = tables
            .sessions
            .get(&session)
            .and_then(|id| tables.participants.get(id))
        {
            return Ok(Joined::Existing(existing.clone()));
        }

        tables.next_participant_id += 1;
        let participant = Participant {
            id: tables.next_participant_id,
            event_id: new.event_id,
            name: new.name,
            photo: new.photo,
            session_uid: new.session_uid,
        };
        tables.sessions.insert(session, participant.id);
        tables
            .participants
            .insert(participant.id, participant.clone());

        Ok(Joined::Created(participant))
    }

    async fn participant(&self, id: u64) -> Result<Option<Participant>> {
        Ok(self.tables().participants.get(&id).cloned())
    }

    async fn participant_by_session(
        &self,
        event_id: u64,
        session_uid: &str,
    ) -> Result<Option<Participant>> {
        let tables = self.tables();

        Ok(tables
            .sessions
            .get(&(event_id, session_uid.to_string()))
            .and_then(|id| tables.participants.get(id))
            .cloned())
    }

    async fn participants(&self, event_id: u64) -> Result<Vec<Participant>> {
        Ok(self
            .tables()
            .participants
            .values()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn vote_of(&self, voter_id: u64) -> Result<Option<Vote>> {
        Ok(self.tables().ballots.get(&voter_id).copied())
    }

    async fn cast_vote(&self, vote: Vote) -> Result<Ballot> {
        let mut tables = self.tables();

        if let Some(existing) = tables.ballots.get(&vote.voter_id) {
            return Ok(Ballot::AlreadyVoted(*existing));
        }
        tables.ballots.insert(vote.voter_id, vote);

        Ok(Ballot::Cast(vote))
    }

    async fn votes(&self, event_id: u64) -> Result<Vec<Vote>> {
        Ok(self
            .tables()
            .ballots
            .values()
            .filter(|v| v.event_id == event_id)
            .copied()
            .collect())
    }

    async fn vote_count(&self, event_id: u64) -> Result<usize> {
        Ok(self
            .tables()
            .ballots
            .values()
            .filter(|v| v.event_id == event_id)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_participant(event_id: u64, name: &str, session_uid: &str) -> NewParticipant {
        NewParticipant {
            event_id,
            name: name.to_string(),
            photo: None,
            session_uid: session_uid.to_string(),
        }
    }

    #[tokio::test]
    async fn test_event_ids_increase() {
        let store = MemoryStore::new();

        let first = store.create_event("a", 2).await.unwrap();
        let second = store.create_event("b", 3).await.unwrap();

        assert_eq!(first.id + 1, second.id);
        assert!(!second.is_voting_open);
        assert_eq!(store.event(second.id).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_open_voting_persists() {
        let store = MemoryStore::new();
        let event = store.create_event("a", 2).await.unwrap();

        store.open_voting(event.id).await.unwrap();

        assert!(store.event(event.id).await.unwrap().unwrap().is_voting_open);
    }

    #[tokio::test]
    async fn test_same_session_joins_once_per_event() {
        let store = MemoryStore::new();
        let event = store.create_event("a", 2).await.unwrap();
        let other = store.create_event("b", 2).await.unwrap();

        let first = store
            .join(new_participant(event.id, "Ala", "sid"))
            .await
            .unwrap();
        let again = store
            .join(new_participant(event.id, "Ola", "sid"))
            .await
            .unwrap();
        let elsewhere = store
            .join(new_participant(other.id, "Ala", "sid"))
            .await
            .unwrap();

        assert!(matches!(first, Joined::Created(_)));
        assert_eq!(again, Joined::Existing(first.participant().clone()));
        assert!(matches!(elsewhere, Joined::Created(_)));
        assert_eq!(store.participants(event.id).await.unwrap().len(), 1);
        assert_eq!(
            store
                .participant_by_session(event.id, "sid")
                .await
                .unwrap()
                .map(|p| p.name),
            Some("Ala".to_string())
        );
    }

    #[tokio::test]
    async fn test_participants_in_join_order() {
        let store = MemoryStore::new();
        let event = store.create_event("a", 3).await.unwrap();

        for (name, sid) in [("c", "1"), ("a", "2"), ("b", "3")] {
            store
                .join(new_participant(event.id, name, sid))
                .await
                .unwrap();
        }

        let names: Vec<_> = store
            .participants(event.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();

        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_one_vote_per_voter() {
        let store = MemoryStore::new();
        let first = Vote {
            event_id: 1,
            voter_id: 1,
            candidate_id: 2,
        };
        let second = Vote {
            candidate_id: 3,
            ..first
        };

        assert_eq!(store.cast_vote(first).await.unwrap(), Ballot::Cast(first));
        assert_eq!(
            store.cast_vote(second).await.unwrap(),
            Ballot::AlreadyVoted(first)
        );
        assert_eq!(store.vote_of(1).await.unwrap(), Some(first));
        assert_eq!(store.vote_count(1).await.unwrap(), 1);
        assert_eq!(store.votes(1).await.unwrap(), vec![first]);
    }
}
