use chrono::{DateTime, Utc};

use crate::error::EngineError;

/// Authenticated identity of whoever invokes an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    /// Mutating operations are refused while this lies in the future.
    pub disabled_until: Option<DateTime<Utc>>,
}

impl Caller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            disabled_until: None,
        }
    }

    pub fn with_disabled_until(mut self, until: Option<DateTime<Utc>>) -> Self {
        self.disabled_until = until;
        self
    }

    pub fn is_suspended(&self, now: DateTime<Utc>) -> bool {
        self.disabled_until.is_some_and(|until| until > now)
    }

    pub fn ensure_active(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        match self.disabled_until {
            Some(until) if until > now => Err(EngineError::Forbidden(format!(
                "user {} is suspended until {}",
                self.user_id,
                until.to_rfc3339()
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn suspension_ends_exactly_at_disabled_until() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let c = Caller::new("u1").with_disabled_until(Some(now + Duration::seconds(1)));
        assert!(matches!(c.ensure_active(now), Err(EngineError::Forbidden(_))));
        assert!(c.ensure_active(now + Duration::seconds(1)).is_ok());
        assert!(Caller::new("u2").ensure_active(now).is_ok());
    }
}
