use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::SessionSettings;

/// The session a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    pub id: String,
    /// `true` if the id was minted for this request.
    pub fresh: bool,
}

/// Reads and writes the session cookie.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: String,
    ttl: Duration,
}

impl SessionCookie {
    pub fn new(name: &str, ttl_secs: u64) -> Self {
        let ttl_secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1000);
        Self {
            name: name.to_string(),
            ttl: Duration::try_seconds(ttl_secs).unwrap_or_else(|| Duration::hours(1)),
        }
    }

    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self::new(&settings.cookie_name, settings.cookie_ttl_secs)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finds the session id among the values of every `Cookie` header.
    pub fn extract<'a>(&self, cookie_headers: impl IntoIterator<Item = &'a str>) -> Option<String> {
        cookie_headers
            .into_iter()
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .map(|(_, value)| value.trim().trim_matches('"').to_string())
            .filter(|value| !value.is_empty())
    }

    /// The existing session, or a new one with a random id.
    pub fn resolve<'a>(&self, cookie_headers: impl IntoIterator<Item = &'a str>) -> ClientSession {
        match self.extract(cookie_headers) {
            Some(id) => ClientSession { id, fresh: false },
            None => ClientSession {
                id: Uuid::new_v4().to_string(),
                fresh: true,
            },
        }
    }

    /// `Set-Cookie` value refreshing the session for another TTL from `now`.
    pub fn set_cookie(&self, session_id: &str, now: DateTime<Utc>) -> String {
        let expires = now + self.ttl;
        format!(
            "{}={}; Path=/; Expires={}",
            self.name,
            session_id,
            expires.format("%a, %d-%b-%Y %X UTC")
        )
    }
}
