//! Session types

use crate::Record;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated login session.
///
/// The id and validity window are fixed when the session is issued: `id`,
/// `created_at` and `expires_at` have no setters, and `expires_at` is never
/// earlier than `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: String,
    /// Key of the owning `User`. The session does not own the account.
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Issue a session valid for `ttl` from now
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, ttl: Duration) -> Self {
        Self::issued_at(id, user_id, Utc::now(), ttl)
    }

    /// Issue a session at an explicit instant. A negative `ttl` yields a
    /// session that is already expired at `created_at`.
    pub fn issued_at(
        id: impl Into<String>,
        user_id: impl Into<String>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let ttl = ttl.max(Duration::zero());
        Self {
            id: id.into(),
            user_id: user_id.into(),
            user_agent: None,
            created_at,
            expires_at: created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// A session is expired from `expires_at` onwards, inclusive.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry, zero once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

impl Record for Session {
    const COLLECTION: &'static str = "sessions";
    const INDEXES: &'static [&'static str] = &["user_id"];

    fn key(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_expiry_window() {
        let session = Session::issued_at("s1", "u1", t0(), Duration::hours(1));

        assert!(!session.is_expired_at(t0() + Duration::minutes(30)));
        assert!(session.is_expired_at(t0() + Duration::hours(2)));
        assert_eq!(
            session.remaining_at(t0() + Duration::minutes(30)),
            Duration::minutes(30)
        );
        assert_eq!(
            session.remaining_at(t0() + Duration::hours(2)),
            Duration::zero()
        );
    }

    #[test]
    fn test_expiry_boundary_is_expired() {
        let session = Session::issued_at("s1", "u1", t0(), Duration::hours(1));

        assert!(session.is_expired_at(session.expires_at()));
        assert!(!session.is_expired_at(session.expires_at() - Duration::nanoseconds(1)));
    }

    #[test]
    fn test_negative_ttl_is_clamped() {
        let session = Session::issued_at("s1", "u1", t0(), Duration::minutes(-5));

        assert_eq!(session.expires_at(), session.created_at());
        assert!(session.is_expired_at(t0()));
    }

    #[test]
    fn test_live_clock() {
        assert!(!Session::new("s1", "u1", Duration::hours(1)).is_expired());
        assert!(Session::new("s2", "u1", Duration::zero()).is_expired());
    }

    #[test]
    fn test_serde_keeps_subsecond_precision() {
        let created = t0() + Duration::nanoseconds(123_456_789);
        let session = Session::issued_at("s1", "u1", created, Duration::hours(1))
            .with_user_agent("curl/8.0");

        let json = serde_json::to_string(&session).unwrap();
        let decoded: Session = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, session);
        assert_eq!(decoded.created_at(), created);
        assert_eq!(session.key(), "s1");
        assert_eq!(session.id(), "s1");
    }

    #[test]
    fn test_missing_user_agent_is_omitted() {
        let session = Session::issued_at("s1", "u1", t0(), Duration::hours(1));
        let json = serde_json::to_value(&session).unwrap();

        assert!(json.get("user_agent").is_none());
        assert_eq!(json["user_id"], "u1");
    }
}
