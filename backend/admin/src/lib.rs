//! Organizer commands run against the same store and directories as the server.

use std::{fmt::Write, sync::Arc};

use server::{
    config::Config,
    events::{EventResults, create_event, event_results, event_status, load_event},
    prepare_dirs,
    state::open_store,
};
use store::Store;

pub struct Admin {
    config: Config,
    store: Arc<dyn Store>,
}

impl Admin {
    pub async fn connect() -> anyhow::Result<Self> {
        let config = Config::load()?;
        prepare_dirs(&config).await?;
        let store = open_store(&config).await?;

        Ok(Self::new(config, store))
    }

    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        Self { config, store }
    }

    pub async fn create(&self, name: &str, expected_players: &str) -> anyhow::Result<()> {
        let created =
            create_event(self.store.as_ref(), &self.config, name, expected_players).await?;

        println!("Event: {} ({})", created.event.name, created.event.id);
        println!("Expected Players: {}", created.event.expected_players);
        println!("Join URL: {}", created.join_url);
        println!("QR Code: {}", created.qr_path.display());

        Ok(())
    }

    pub async fn status(&self, event_id: u64) -> anyhow::Result<()> {
        let event = load_event(self.store.as_ref(), event_id).await?;
        let name = event.name.clone();
        let status = event_status(self.store.as_ref(), event).await?;

        println!("Event: {name} ({event_id})");
        println!("Joined: {}/{}", status.joined, status.expected);
        println!("Votes: {}", status.votes);
        println!("Voting Open: {}", status.open);
        for player in status.players {
            println!("  - {player}");
        }

        Ok(())
    }

    pub async fn results(&self, event_id: u64) -> anyhow::Result<()> {
        let event = load_event(self.store.as_ref(), event_id).await?;
        let results = event_results(self.store.as_ref(), &event).await?;

        println!("Event: {} ({event_id})", event.name);
        print!("{}", render_results(&results));

        Ok(())
    }
}

pub fn render_results(results: &EventResults) -> String {
    let mut out = String::new();

    match results {
        EventResults::Pending {
            total_participants,
            total_votes,
            remaining,
        } => {
            let _ = writeln!(out, "Votes: {total_votes} from {total_participants} players");
            let _ = writeln!(out, "Waiting for {remaining} more vote(s)");
        }
        EventResults::Ready {
            standings,
            total_participants,
            total_votes,
        } => {
            let _ = writeln!(out, "Votes: {total_votes} from {total_participants} players");
            for (place, standing) in standings.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{:>3}. {} ({} vote(s))",
                    place + 1,
                    standing.name,
                    standing.votes
                );
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use store::tally::Standing;

    use super::*;

    #[test]
    fn test_render_pending() {
        let out = render_results(&EventResults::Pending {
            total_participants: 4,
            total_votes: 1,
            remaining: 3,
        });

        assert!(out.contains("Waiting for 3 more vote(s)"));
    }

    #[test]
    fn test_render_ready_lists_places() {
        let standing = |id, name: &str, votes| Standing {
            participant_id: id,
            name: name.to_string(),
            photo: None,
            votes,
        };

        let out = render_results(&EventResults::Ready {
            standings: vec![standing(2, "mia", 2), standing(1, "zoe", 0)],
            total_participants: 2,
            total_votes: 2,
        });

        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[1], "  1. mia (2 vote(s))");
        assert_eq!(lines[2], "  2. zoe (0 vote(s))");
    }
}
