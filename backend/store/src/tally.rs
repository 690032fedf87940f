use std::collections::HashMap;

use serde::Serialize;

use crate::models::{Participant, Vote};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub participant_id: u64,
    pub name: String,
    pub photo: Option<String>,
    pub votes: u64,
}

/// Counts votes per participant, most voted first and ties broken by name.
pub fn standings(participants: &[Participant], votes: &[Vote]) -> Vec<Standing> {
    let mut counts: HashMap<u64, u64> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.candidate_id).or_default() += 1;
    }

    let mut rows: Vec<Standing> = participants
        .iter()
        .map(|p| Standing {
            participant_id: p.id,
            name: p.name.clone(),
            photo: p.photo.clone(),
            votes: counts.get(&p.id).copied().unwrap_or(0),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.participant_id.cmp(&b.participant_id))
    });

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: u64, name: &str) -> Participant {
        Participant {
            id,
            event_id: 1,
            name: name.to_string(),
            photo: None,
            session_uid: id.to_string(),
        }
    }

    fn vote(voter_id: u64, candidate_id: u64) -> Vote {
        Vote {
            event_id: 1,
            voter_id,
            candidate_id,
        }
    }

    #[test]
    fn test_orders_by_votes_then_name() {
        let participants = vec![
            participant(1, "zoe"),
            participant(2, "adam"),
            participant(3, "mia"),
        ];
        let votes = vec![vote(1, 3), vote(2, 3), vote(3, 1)];

        let names: Vec<_> = standings(&participants, &votes)
            .into_iter()
            .map(|s| (s.name, s.votes))
            .collect();

        assert_eq!(
            names,
            vec![
                ("mia".to_string(), 2),
                ("zoe".to_string(), 1),
                ("adam".to_string(), 0)
            ]
        );
    }

    #[test]
    fn test_includes_participants_without_votes() {
        let participants = vec![participant(1, "b"), participant(2, "a")];

        let rows = standings(&participants, &[]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "a");
        assert!(rows.iter().all(|r| r.votes == 0));
    }

    #[test]
    fn test_ignores_votes_for_unknown_candidates() {
        let participants = vec![participant(1, "a"), participant(2, "b")];
        let votes = vec![vote(1, 2), vote(2, 42)];

        let rows = standings(&participants, &votes);

        assert_eq!(rows.iter().map(|r| r.votes).sum::<u64>(), 1);
    }
}
