//! Field login sessions of agents

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::TransitionError;

/// One field login of an agent, opened with the device's GPS position
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AgentSession {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub device_info: serde_json::Value,
}

/// A session as returned once ended, with how long it lasted
#[derive(Debug, Clone, Serialize)]
pub struct EndedSession {
    #[serde(flatten)]
    pub session: AgentSession,
    pub duration_seconds: i64,
}

impl AgentSession {
    pub fn open(
        agent_id: Uuid,
        latitude: Decimal,
        longitude: Decimal,
        device_info: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            latitude,
            longitude,
            started_at: at,
            ended_at: None,
            is_active: true,
            device_info,
        }
    }

    /// Close the session, stamping its end time
    pub fn close(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.is_active {
            return Err(TransitionError {
                entity: "session",
                from: "closed",
                action: "close",
            });
        }
        self.is_active = false;
        self.ended_at = Some(at);
        Ok(())
    }

    /// Time spent logged in, up to `now` for a session still open
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.ended_at.unwrap_or(now) - self.started_at
    }

    pub fn into_ended(self, now: DateTime<Utc>) -> EndedSession {
        let duration_seconds = self.duration(now).num_seconds();
        EndedSession {
            session: self,
            duration_seconds,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.agent_id == user_id
    }
}

/// Close every open session of `agent_id` ahead of a new login.
///
/// Returns how many sessions were closed.
pub fn supersede(sessions: &mut [AgentSession], agent_id: Uuid, at: DateTime<Utc>) -> usize {
    sessions
        .iter_mut()
        .filter(|s| s.agent_id == agent_id && s.is_active)
        .map(|s| s.close(at))
        .filter(Result::is_ok)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(agent: Uuid, at: DateTime<Utc>) -> AgentSession {
        AgentSession::open(agent, Decimal::ZERO, Decimal::ZERO, serde_json::json!({}), at)
    }

    #[test]
    fn test_close_twice_fails() {
        let now = Utc::now();
        let mut s = session(Uuid::new_v4(), now);
        assert!(s.close(now).is_ok());
        assert!(!s.is_active);
        assert_eq!(s.ended_at, Some(now));

        let err = s.close(now).unwrap_err();
        assert_eq!(err.to_string(), "cannot close a session that is closed");
    }

    #[test]
    fn test_supersede_only_touches_same_agent() {
        let now = Utc::now();
        let agent = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut sessions = vec![session(agent, now), session(other, now)];

        assert_eq!(supersede(&mut sessions, agent, now), 1);
        assert!(!sessions[0].is_active);
        assert!(sessions[1].is_active);
        assert_eq!(supersede(&mut sessions, agent, now), 0);
    }

    #[test]
    fn test_ended_session_reports_duration() {
        let start = Utc::now();
        let mut s = session(Uuid::new_v4(), start);
        let end = start + Duration::minutes(90);
        s.close(end).unwrap();

        let json = serde_json::to_value(s.into_ended(end)).unwrap();
        assert_eq!(json["duration_seconds"], 5400);
        assert_eq!(json["is_active"], false);
        assert!(json.get("session").is_none());
    }

    #[test]
    fn test_duration() {
        let start = Utc::now();
        let mut s = session(Uuid::new_v4(), start);
        assert_eq!(s.duration(start + Duration::minutes(5)), Duration::minutes(5));
        s.close(start + Duration::hours(2)).unwrap();
        assert_eq!(s.duration(start + Duration::hours(9)), Duration::hours(2));
    }
}
