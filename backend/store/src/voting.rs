//! Rules deciding when voting opens and when results may be shown.

use crate::models::{Event, Participant};

/// Whether an event should flip to open given how many participants joined.
///
/// Events with no expected players never open on their own.
pub fn should_open(event: &Event, joined: usize) -> bool {
    !event.is_voting_open
        && event.expected_players > 0
        && joined >= event.expected_players as usize
}

pub fn required_votes(total_participants: usize, expected_players: u32) -> usize {
    total_participants.min((expected_players as usize).max(1))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultsGate {
    Pending { remaining: usize },
    Ready,
}

pub fn results_gate(
    total_participants: usize,
    total_votes: usize,
    expected_players: u32,
) -> ResultsGate {
    let required = required_votes(total_participants, expected_players);

    if total_participants == 0 || total_votes < required {
        return ResultsGate::Pending {
            remaining: required.saturating_sub(total_votes),
        };
    }

    ResultsGate::Ready
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateError {
    SelfVote,
    Unknown,
}

/// Checks that `candidate_id` names another participant of the voter's event.
pub fn check_candidate(
    voter: &Participant,
    candidate_id: u64,
    participants: &[Participant],
) -> Result<(), CandidateError> {
    if candidate_id == voter.id {
        return Err(CandidateError::SelfVote);
    }

    participants
        .iter()
        .find(|p| p.id == candidate_id && p.event_id == voter.event_id)
        .map(|_| ())
        .ok_or(CandidateError::Unknown)
}
