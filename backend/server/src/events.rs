//! Event lifecycle shared by the HTTP routes and the admin CLI.

use std::path::PathBuf;

use serde::Serialize;
use store::{
    Event, Store,
    models::EVENT_NAME_MAX,
    tally::{Standing, standings},
    voting::{ResultsGate, results_gate, should_open},
};
use tracing::info;

use crate::{
    config::Config,
    error::AppError,
    qr::{qr_file_name, qr_url, write_qr},
};

#[derive(Debug, Serialize)]
pub struct CreatedEvent {
    pub event: Event,
    pub join_url: String,
    pub qr_url: String,
    #[serde(skip)]
    pub qr_path: PathBuf,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct EventStatus {
    pub joined: usize,
    pub expected: u32,
    pub players: Vec<String>,
    pub votes: usize,
    pub open: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum EventResults {
    Pending {
        total_participants: usize,
        total_votes: usize,
        remaining: usize,
    },
    Ready {
        standings: Vec<Standing>,
        total_participants: usize,
        total_votes: usize,
    },
}

pub fn validate_new_event(name: &str, expected_players: &str) -> Result<(String, u32), AppError> {
    let name = name.trim();
    let expected_players = expected_players.trim();

    if name.is_empty()
        || expected_players.is_empty()
        || !expected_players.chars().all(|c| c.is_ascii_digit())
    {
        return Err(AppError::Validation(
            "Provide an event name and the number of participants".to_string(),
        ));
    }

    if name.chars().count() > EVENT_NAME_MAX {
        return Err(AppError::Validation(format!(
            "Event name may have at most {EVENT_NAME_MAX} characters"
        )));
    }

    let expected_players: u32 = expected_players
        .parse()
        .map_err(|_| AppError::Validation("Number of participants is too large".to_string()))?;

    // voting only opens once this many joined, so zero would never open
    if expected_players == 0 {
        return Err(AppError::Validation(
            "Number of participants must be at least 1".to_string(),
        ));
    }

    Ok((name.to_string(), expected_players))
}

/// Creates the event and writes the QR code of its join link.
pub async fn create_event(
    store: &dyn Store,
    config: &Config,
    name: &str,
    expected_players: &str,
) -> Result<CreatedEvent, AppError> {
    let (name, expected_players) = validate_new_event(name, expected_players)?;

    let event = store.create_event(&name, expected_players).await?;
    let join_url = config.join_url(event.id);

    let file_name = qr_file_name(event.id);
    let qr_path = write_qr(&config.qr_dir, &file_name, &join_url).await?;

    info!(
        "Created event {} ({name}) expecting {expected_players} players",
        event.id
    );

    Ok(CreatedEvent {
        event,
        join_url,
        qr_url: qr_url(&file_name),
        qr_path,
    })
}

pub async fn load_event(store: &dyn Store, event_id: u64) -> Result<Event, AppError> {
    store
        .event(event_id)
        .await?
        .ok_or(AppError::NotFound("Event"))
}

/// Opens voting once enough participants joined. Never closes it again.
pub async fn refresh_voting(
    store: &dyn Store,
    mut event: Event,
    joined: usize,
) -> Result<Event, AppError> {
    if should_open(&event, joined) {
        store.open_voting(event.id).await?;
        event.is_voting_open = true;

        info!("Voting opened for event {} with {joined} players", event.id);
    }

    Ok(event)
}

pub async fn event_status(store: &dyn Store, event: Event) -> Result<EventStatus, AppError> {
    let participants = store.participants(event.id).await?;
    let votes = store.vote_count(event.id).await?;

    let event = refresh_voting(store, event, participants.len()).await?;

    Ok(EventStatus {
        joined: participants.len(),
        expected: event.expected_players,
        players: participants.into_iter().map(|p| p.name).collect(),
        votes,
        open: event.is_voting_open,
    })
}

pub async fn event_results(store: &dyn Store, event: &Event) -> Result<EventResults, AppError> {
    let participants = store.participants(event.id).await?;
    let votes = store.votes(event.id).await?;

    let total_participants = participants.len();
    let total_votes = votes.len();

    Ok(
        match results_gate(total_participants, total_votes, event.expected_players) {
            ResultsGate::Pending { remaining } => EventResults::Pending {
                total_participants,
                total_votes,
                remaining,
            },
            ResultsGate::Ready => EventResults::Ready {
                standings: standings(&participants, &votes),
                total_participants,
                total_votes,
            },
        },
    )
}

#[cfg(test)]
mod tests {
    use store::{MemoryStore, NewParticipant, Vote};

    use super::*;

    #[test]
    fn test_validate_new_event() {
        assert_eq!(
            validate_new_event("  Gala ", " 12 ").unwrap(),
            ("Gala".to_string(), 12)
        );
        assert_eq!(validate_new_event("Gala", "007").unwrap().1, 7);
    }

    #[test]
    fn test_validate_new_event_rejects() {
        for (name, expected) in [
            ("", "3"),
            ("   ", "3"),
            ("Gala", ""),
            ("Gala", "0"),
            ("Gala", "000"),
            ("Gala", "-1"),
            ("Gala", "3.5"),
            ("Gala", "three"),
            ("Gala", "99999999999999"),
        ] {
            assert!(
                matches!(
                    validate_new_event(name, expected),
                    Err(AppError::Validation(_))
                ),
                "{name:?} {expected:?}"
            );
        }

        let long = "x".repeat(EVENT_NAME_MAX + 1);
        assert!(validate_new_event(&long, "3").is_err());
    }

    async fn join(store: &MemoryStore, event_id: u64, name: &str) -> u64 {
        store
            .join(NewParticipant {
                event_id,
                name: name.to_string(),
                photo: None,
                session_uid: name.to_string(),
            })
            .await
            .unwrap()
            .participant()
            .id
    }

    #[tokio::test]
    async fn test_status_opens_voting_once_full() {
        let store = MemoryStore::new();
        let event = store.create_event("Gala", 2).await.unwrap();

        join(&store, event.id, "a").await;
        let status = event_status(&store, event.clone()).await.unwrap();
        assert!(!status.open);
        assert_eq!(status.joined, 1);

        join(&store, event.id, "b").await;
        let status = event_status(&store, event.clone()).await.unwrap();
        assert!(status.open);
        assert_eq!(status.players, vec!["a", "b"]);
        assert!(store.event(event.id).await.unwrap().unwrap().is_voting_open);
    }

    #[tokio::test]
    async fn test_results_wait_for_votes() {
        let store = MemoryStore::new();
        let event = store.create_event("Gala", 2).await.unwrap();
        let a = join(&store, event.id, "a").await;
        let b = join(&store, event.id, "b").await;

        store
            .cast_vote(Vote {
                event_id: event.id,
                voter_id: a,
                candidate_id: b,
            })
            .await
            .unwrap();

        assert_eq!(
            event_results(&store, &event).await.unwrap(),
            EventResults::Pending {
                total_participants: 2,
                total_votes: 1,
                remaining: 1
            }
        );

        store
            .cast_vote(Vote {
                event_id: event.id,
                voter_id: b,
                candidate_id: a,
            })
            .await
            .unwrap();

        let EventResults::Ready { standings, .. } = event_results(&store, &event).await.unwrap()
        else {
            panic!("results should be ready");
        };
        assert_eq!(standings.len(), 2);
        assert_eq!(standings[0].name, "a");
    }
}
