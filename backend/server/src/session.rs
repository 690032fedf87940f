use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use store::Participant;
use time::Duration;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub const SESSION_COOKIE: &str = "sid";
const SESSION_DAYS: i64 = 30;

pub fn session_jar(headers: &HeaderMap, state: &AppState) -> SignedCookieJar {
    SignedCookieJar::from_headers(headers, state.cookie_key.clone())
}

pub fn session_id(jar: &SignedCookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|sid| !sid.is_empty())
}

/// Returns the caller's session id, minting and setting a new one when absent.
pub fn ensure_session(jar: SignedCookieJar) -> (SignedCookieJar, String) {
    if let Some(sid) = session_id(&jar) {
        return (jar, sid);
    }

    let sid = Uuid::new_v4().simple().to_string();
    let cookie = Cookie::build((SESSION_COOKIE, sid.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(SESSION_DAYS));

    (jar.add(cookie), sid)
}

pub async fn current_participant(
    state: &AppState,
    event_id: u64,
    jar: &SignedCookieJar,
) -> Result<Option<Participant>, AppError> {
    let Some(sid) = session_id(jar) else {
        return Ok(None);
    };

    Ok(state.store.participant_by_session(event_id, &sid).await?)
}
