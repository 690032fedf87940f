use std::sync::Arc;

use axum::{
    Form, Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Request, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use store::{
    Ballot, Event, Joined, NewParticipant, Participant, Vote,
    models::PARTICIPANT_NAME_MAX,
    tally::Standing,
    voting::{CandidateError, check_candidate},
};
use tokio::fs;
use tracing::{info, warn};

use crate::{
    error::AppError,
    events::{
        EventResults, create_event, event_results, event_status, load_event, refresh_voting,
    },
    photos::{is_allowed, photo_url, store_photo},
    session::{current_participant, ensure_session, session_jar},
    state::AppState,
};

#[derive(Serialize)]
pub struct ParticipantView {
    pub id: u64,
    pub name: String,
    pub photo_url: Option<String>,
}

impl From<&Participant> for ParticipantView {
    fn from(participant: &Participant) -> Self {
        Self {
            id: participant.id,
            name: participant.name.clone(),
            photo_url: participant.photo.as_deref().map(photo_url),
        }
    }
}

#[derive(Serialize)]
pub struct JoinView {
    pub event: Event,
    pub participant: Option<ParticipantView>,
}

#[derive(Serialize)]
pub struct BallotView {
    pub me: ParticipantView,
    pub candidates: Vec<ParticipantView>,
    pub has_voted: bool,
    pub open: bool,
}

#[derive(Serialize)]
pub struct StandingView {
    pub participant_id: u64,
    pub name: String,
    pub photo_url: Option<String>,
    pub votes: u64,
}

impl From<Standing> for StandingView {
    fn from(standing: Standing) -> Self {
        Self {
            participant_id: standing.participant_id,
            name: standing.name,
            photo_url: standing.photo.as_deref().map(photo_url),
            votes: standing.votes,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResultsView {
    Pending {
        total_participants: usize,
        total_votes: usize,
        remaining: usize,
    },
    Ready {
        standings: Vec<StandingView>,
        total_participants: usize,
        total_votes: usize,
        me_id: Option<u64>,
    },
}

#[derive(Deserialize)]
pub struct CreateEventForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    expected_players: String,
}

/// Forms send every value as text, JSON clients usually send a number.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum CandidateId {
    Number(u64),
    Text(String),
}

impl CandidateId {
    pub fn parse(&self) -> Option<u64> {
        match self {
            CandidateId::Number(id) => Some(*id),
            CandidateId::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[derive(Deserialize)]
pub struct VoteForm {
    #[serde(default)]
    candidate_id: Option<CandidateId>,
}

/// Vote body taken from JSON or from an urlencoded form, by content type.
pub struct VoteBody(pub VoteForm);

impl<S> FromRequest<S> for VoteBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));

        let form = if is_json {
            let Json(form) = Json::<VoteForm>::from_request(req, state)
                .await
                .map_err(|_| AppError::MalformedPayload)?;
            form
        } else {
            let Form(form) = Form::<VoteForm>::from_request(req, state)
                .await
                .map_err(|_| AppError::MalformedPayload)?;
            form
        };

        Ok(Self(form))
    }
}

struct Upload {
    file_name: String,
    bytes: Bytes,
}

#[derive(Default)]
struct JoinForm {
    name: String,
    photo: Option<Upload>,
}

pub async fn index_handler() -> &'static str {
    "Photo vote"
}

pub async fn health_handler() -> &'static str {
    "ok"
}

pub async fn create_event_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CreateEventForm>,
) -> Result<impl IntoResponse, AppError> {
    let created = create_event(
        state.store.as_ref(),
        &state.config,
        &form.name,
        &form.expected_players,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn join_view_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Json<JoinView>, AppError> {
    let event = load_event(state.store.as_ref(), event_id).await?;
    let jar = session_jar(&headers, &state);

    let participant = current_participant(&state, event.id, &jar).await?;

    Ok(Json(JoinView {
        event,
        participant: participant.as_ref().map(ParticipantView::from),
    }))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::MalformedPayload
    }
}

async fn read_join_form(multipart: &mut Multipart) -> Result<JoinForm, AppError> {
    let mut form = JoinForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(str::to_string);

        match field_name.as_deref() {
            Some("name") => form.name = field.text().await.map_err(multipart_error)?,
            Some("photo") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;

                // browsers send an empty part when no file was picked
                if !file_name.is_empty() {
                    form.photo = Some(Upload { file_name, bytes });
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

fn validate_participant_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();

    if name.is_empty() {
        return Err(AppError::Validation("Provide your name".to_string()));
    }
    if name.chars().count() > PARTICIPANT_NAME_MAX {
        return Err(AppError::Validation(format!(
            "Name may have at most {PARTICIPANT_NAME_MAX} characters"
        )));
    }

    Ok(name.to_string())
}

async fn discard_photo(state: &AppState, photo: Option<&str>) {
    let Some(photo) = photo else {
        return;
    };

    if let Err(e) = fs::remove_file(state.config.upload_dir.join(photo)).await {
        warn!("Failed to remove orphaned photo {photo}: {e}");
    }
}

pub async fn join_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<u64>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let event = load_event(state.store.as_ref(), event_id).await?;
    let (jar, sid) = ensure_session(session_jar(&headers, &state));

    if let Some(existing) = state.store.participant_by_session(event.id, &sid).await? {
        return Ok((StatusCode::OK, jar, Json(ParticipantView::from(&existing))).into_response());
    }

    let form = read_join_form(&mut multipart).await?;
    let name = validate_participant_name(&form.name)?;

    let photo = match form.photo {
        Some(upload) => {
            if !is_allowed(&upload.file_name) {
                return Err(AppError::Validation(
                    "Allowed formats: JPG, PNG, WEBP".to_string(),
                ));
            }

            Some(
                store_photo(
                    &state.config.upload_dir,
                    &upload.file_name,
                    upload.bytes.to_vec(),
                )
                .await?,
            )
        }
        None => None,
    };

    let joined = match state
        .store
        .join(NewParticipant {
            event_id: event.id,
            name,
            photo: photo.clone(),
            session_uid: sid,
        })
        .await
    {
        Ok(joined) => joined,
        Err(e) => {
            discard_photo(&state, photo.as_deref()).await;
            return Err(e.into());
        }
    };

    let status = match &joined {
        Joined::Created(participant) => {
            info!("{} joined event {}", participant.name, event.id);
            StatusCode::CREATED
        }
        Joined::Existing(_) => {
            // lost a race with another request of the same session
            discard_photo(&state, photo.as_deref()).await;
            StatusCode::OK
        }
    };

    Ok((status, jar, Json(ParticipantView::from(joined.participant()))).into_response())
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<u64>,
) -> Result<impl IntoResponse, AppError> {
    let event = load_event(state.store.as_ref(), event_id).await?;

    Ok(Json(event_status(state.store.as_ref(), event).await?))
}

async fn require_participant(
    state: &AppState,
    event_id: u64,
    headers: &HeaderMap,
) -> Result<Participant, AppError> {
    let jar = session_jar(headers, state);

    current_participant(state, event_id, &jar)
        .await?
        .ok_or(AppError::NotJoined)
}

pub async fn ballot_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Json<BallotView>, AppError> {
    let event = load_event(state.store.as_ref(), event_id).await?;
    let me = require_participant(&state, event.id, &headers).await?;

    let has_voted = state.store.vote_of(me.id).await?.is_some();
    let candidates = state
        .store
        .participants(event.id)
        .await?
        .iter()
        .filter(|p| p.id != me.id)
        .map(ParticipantView::from)
        .collect();

    Ok(Json(BallotView {
        me: ParticipantView::from(&me),
        candidates,
        has_voted,
        open: event.is_voting_open,
    }))
}

pub async fn vote_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<u64>,
    headers: HeaderMap,
    VoteBody(form): VoteBody,
) -> Result<impl IntoResponse, AppError> {
    let event = load_event(state.store.as_ref(), event_id).await?;
    let me = require_participant(&state, event.id, &headers).await?;

    if state.store.vote_of(me.id).await?.is_some() {
        return Err(AppError::AlreadyVoted);
    }

    let participants = state.store.participants(event.id).await?;
    let event = refresh_voting(state.store.as_ref(), event, participants.len()).await?;
    if !event.is_voting_open {
        return Err(AppError::VotingClosed);
    }

    let candidate_id = form
        .candidate_id
        .as_ref()
        .and_then(CandidateId::parse)
        .ok_or_else(|| AppError::Validation("Pick a candidate".to_string()))?;

    check_candidate(&me, candidate_id, &participants).map_err(|e| match e {
        CandidateError::SelfVote => {
            AppError::Validation("You cannot vote for yourself".to_string())
        }
        CandidateError::Unknown => AppError::Validation("Unknown candidate".to_string()),
    })?;

    let vote = Vote {
        event_id: event.id,
        voter_id: me.id,
        candidate_id,
    };

    match state.store.cast_vote(vote).await? {
        Ballot::Cast(vote) => {
            info!("Participant {} voted in event {}", me.id, event.id);
            Ok((StatusCode::CREATED, Json(vote)))
        }
        Ballot::AlreadyVoted(_) => Err(AppError::AlreadyVoted),
    }
}

pub async fn results_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Json<ResultsView>, AppError> {
    let event = load_event(state.store.as_ref(), event_id).await?;

    let view = match event_results(state.store.as_ref(), &event).await? {
        EventResults::Pending {
            total_participants,
            total_votes,
            remaining,
        } => ResultsView::Pending {
            total_participants,
            total_votes,
            remaining,
        },
        EventResults::Ready {
            standings,
            total_participants,
            total_votes,
        } => {
            let jar = session_jar(&headers, &state);
            let me_id = current_participant(&state, event.id, &jar)
                .await?
                .map(|p| p.id);

            ResultsView::Ready {
                standings: standings.into_iter().map(StandingView::from).collect(),
                total_participants,
                total_votes,
                me_id,
            }
        }
    };

    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_participant_name() {
        assert_eq!(validate_participant_name("  Ala ").unwrap(), "Ala");
        assert!(validate_participant_name("   ").is_err());
        assert!(validate_participant_name(&"x".repeat(PARTICIPANT_NAME_MAX + 1)).is_err());
    }

    #[test]
    fn test_participant_view_links_photo() {
        let participant = Participant {
            id: 3,
            event_id: 1,
            name: "Ala".to_string(),
            photo: Some("ala-1.jpg".to_string()),
            session_uid: "sid".to_string(),
        };

        let view = ParticipantView::from(&participant);

        assert_eq!(view.photo_url.as_deref(), Some("/u/ala-1.jpg"));
    }
}
