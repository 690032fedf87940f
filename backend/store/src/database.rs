use std::{collections::HashMap, fmt::Display, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::{debug, info};

use crate::{
    Result, Store, StoreError,
    models::{Ballot, Event, Joined, NewParticipant, Participant, Vote},
};

const NEXT_EVENT_ID: &str = "event:next_id";
const NEXT_PARTICIPANT_ID: &str = "participant:next_id";

fn event_key(id: u64) -> String {
    format!("event:{id}")
}

fn participant_key(id: u64) -> String {
    format!("participant:{id}")
}

fn participants_key(event_id: u64) -> String {
    format!("event:{event_id}:participants")
}

fn sessions_key(event_id: u64) -> String {
    format!("event:{event_id}:sessions")
}

fn ballots_key(event_id: u64) -> String {
    format!("event:{event_id}:ballots")
}

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    info!("Connected to Redis at {redis_url}");

    Ok(connection_manager)
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub async fn connect(redis_url: &str) -> Result<Self> {
        Ok(Self::new(init_redis(redis_url).await?))
    }
}

fn corrupt(key: &str, reason: impl Display) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn field<'a>(key: &str, fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| corrupt(key, format!("missing field {name}")))
}

fn parse_field<T: FromStr>(key: &str, fields: &HashMap<String, String>, name: &str) -> Result<T>
where
    T::Err: Display,
{
    field(key, fields, name)?
        .parse()
        .map_err(|e| corrupt(key, format!("{name}: {e}")))
}

fn event_from_fields(id: u64, fields: &HashMap<String, String>) -> Result<Event> {
    let key = event_key(id);

    let created_at = DateTime::parse_from_rfc3339(field(&key, fields, "created_at")?)
        .map_err(|e| corrupt(&key, format!("created_at: {e}")))?
        .with_timezone(&Utc);

    Ok(Event {
        id,
        name: field(&key, fields, "name")?.to_string(),
        expected_players: parse_field(&key, fields, "expected_players")?,
        is_voting_open: field(&key, fields, "is_voting_open")? == "1",
        created_at,
    })
}

fn participant_from_fields(id: u64, fields: &HashMap<String, String>) -> Result<Participant> {
    let key = participant_key(id);

    Ok(Participant {
        id,
        event_id: parse_field(&key, fields, "event_id")?,
        name: field(&key, fields, "name")?.to_string(),
        photo: fields.get("photo").cloned(),
        session_uid: field(&key, fields, "session_uid")?.to_string(),
    })
}

#[async_trait]
impl Store for RedisStore {
    async fn create_event(&self, name: &str, expected_players: u32) -> Result<Event> {
        let mut conn = self.connection.clone();

        let id: u64 = conn.incr(NEXT_EVENT_ID, 1).await?;
        let event = Event {
            id,
            name: name.to_string(),
            expected_players,
            is_voting_open: false,
            created_at: Utc::now(),
        };

        let fields = [
            ("name", event.name.clone()),
            ("expected_players", expected_players.to_string()),
            ("is_voting_open", "0".to_string()),
            ("created_at", event.created_at.to_rfc3339()),
        ];
        let _: () = conn.hset_multiple(event_key(id), &fields).await?;

        debug!("Created event {id}");

        Ok(event)
    }

    async fn event(&self, id: u64) -> Result<Option<Event>> {
        let mut conn = self.connection.clone();

        let fields: HashMap<String, String> = conn.hgetall(event_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        event_from_fields(id, &fields).map(Some)
    }

    async fn open_voting(&self, id: u64) -> Result<()> {
        let mut conn = self.connection.clone();

        let _: () = conn.hset(event_key(id), "is_voting_open", "1").await?;

        Ok(())
    }

    async fn join(&self, new: NewParticipant) -> Result<Joined> {
        let mut conn = self.connection.clone();

        let id: u64 = conn.incr(NEXT_PARTICIPANT_ID, 1).await?;

        let mut fields = vec![
            ("event_id", new.event_id.to_string()),
            ("name", new.name.clone()),
            ("session_uid", new.session_uid.clone()),
        ];
        if let Some(photo) = &new.photo {
            fields.push(("photo", photo.clone()));
        }
        // written before the session claim so a winner is always readable
        let _: () = conn.hset_multiple(participant_key(id), &fields).await?;

        let claimed: bool = conn
            .hset_nx(sessions_key(new.event_id), &new.session_uid, id)
            .await?;

        if !claimed {
            let _: () = conn.del(participant_key(id)).await?;

            let existing_id: u64 = conn
                .hget(sessions_key(new.event_id), &new.session_uid)
                .await?;

            return match self.participant(existing_id).await? {
                Some(existing) => Ok(Joined::Existing(existing)),
                None => Err(corrupt(
                    &sessions_key(new.event_id),
                    format!("dangling participant {existing_id}"),
                )),
            };
        }

        let _: () = conn.rpush(participants_key(new.event_id), id).await?;

        Ok(Joined::Created(Participant {
            id,
            event_id: new.event_id,
            name: new.name,
            photo: new.photo,
            session_uid: new.session_uid,
        }))
    }

    async fn participant(&self, id: u64) -> Result<Option<Participant>> {
        let mut conn = self.connection.clone();

        let fields: HashMap<String, String> = conn.hgetall(participant_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        participant_from_fields(id, &fields).map(Some)
    }

    async fn participant_by_session(
        &self,
        event_id: u64,
        session_uid: &str,
    ) -> Result<Option<Participant>> {
        let mut conn = self.connection.clone();

        let id: Option<u64> = conn.hget(sessions_key(event_id), session_uid).await?;

        match id {
            Some(id) => self.participant(id).await,
            None => Ok(None),
        }
    }

    async fn participants(&self, event_id: u64) -> Result<Vec<Participant>> {
        let mut conn = self.connection.clone();

        let ids: Vec<u64> = conn.lrange(participants_key(event_id), 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(participant_key(*id));
        }
        let rows: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        ids.iter()
            .zip(rows.iter())
            .map(|(id, fields)| participant_from_fields(*id, fields))
            .collect()
    }

    async fn vote_of(&self, voter_id: u64) -> Result<Option<Vote>> {
        let Some(voter) = self.participant(voter_id).await? else {
            return Ok(None);
        };

        let mut conn = self.connection.clone();
        let candidate_id: Option<u64> = conn.hget(ballots_key(voter.event_id), voter_id).await?;

        Ok(candidate_id.map(|candidate_id| Vote {
            event_id: voter.event_id,
            voter_id,
            candidate_id,
        }))
    }

    async fn cast_vote(&self, vote: Vote) -> Result<Ballot> {
        let mut conn = self.connection.clone();

        let cast: bool = conn
            .hset_nx(ballots_key(vote.event_id), vote.voter_id, vote.candidate_id)
            .await?;

        if cast {
            return Ok(Ballot::Cast(vote));
        }

        let candidate_id: u64 = conn
            .hget(ballots_key(vote.event_id), vote.voter_id)
            .await?;

        Ok(Ballot::AlreadyVoted(Vote {
            candidate_id,
            ..vote
        }))
    }

    async fn votes(&self, event_id: u64) -> Result<Vec<Vote>> {
        let mut conn = self.connection.clone();

        let ballots: HashMap<u64, u64> = conn.hgetall(ballots_key(event_id)).await?;

        let mut votes: Vec<Vote> = ballots
            .into_iter()
            .map(|(voter_id, candidate_id)| Vote {
                event_id,
                voter_id,
                candidate_id,
            })
            .collect();
        votes.sort_by_key(|v| v.voter_id);

        Ok(votes)
    }

    async fn vote_count(&self, event_id: u64) -> Result<usize> {
        let mut conn = self.connection.clone();

        Ok(conn.hlen(ballots_key(event_id)).await?)
    }
}
