use chrono::{DateTime, Utc};
use serde::Serialize;

pub const EVENT_NAME_MAX: usize = 160;
pub const PARTICIPANT_NAME_MAX: usize = 120;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: u64,
    pub name: String,
    pub expected_players: u32,
    pub is_voting_open: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub id: u64,
    pub event_id: u64,
    pub name: String,
    /// Stored JPEG file name inside the upload directory.
    pub photo: Option<String>,
    #[serde(skip)]
    pub session_uid: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewParticipant {
    pub event_id: u64,
    pub name: String,
    pub photo: Option<String>,
    pub session_uid: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Vote {
    pub event_id: u64,
    pub voter_id: u64,
    pub candidate_id: u64,
}

/// Outcome of registering a session for an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Joined {
    Created(Participant),
    /// The session had already joined; holds the earlier registration.
    Existing(Participant),
}

impl Joined {
    pub fn participant(&self) -> &Participant {
        match self {
            Joined::Created(p) | Joined::Existing(p) => p,
        }
    }

    pub fn into_participant(self) -> Participant {
        match self {
            Joined::Created(p) | Joined::Existing(p) => p,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ballot {
    Cast(Vote),
    AlreadyVoted(Vote),
}
