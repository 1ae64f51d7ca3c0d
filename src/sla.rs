//! SLA evaluation.
//!
//! SLA status is a pure function of a ticket's status and timestamps, the
//! current instant and the configured thresholds. It is never persisted, so a
//! threshold change applies to every ticket on the next read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{SlaStatus, SupportTicket, TicketStatus};
use crate::{Result, SupportError};

/// How long an admin may leave a user waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaThresholds {
    pub at_risk_minutes: i64,
    pub breach_minutes: i64,
}

impl Default for SlaThresholds {
    fn default() -> Self {
        Self { at_risk_minutes: 12 * 60, breach_minutes: 24 * 60 }
    }
}

impl SlaThresholds {
    pub fn from_hours(at_risk: i64, breach: i64) -> Result<Self> {
        let minutes = |hours: i64| {
            hours
                .checked_mul(60)
                .ok_or_else(|| SupportError::Config(format!("SLA threshold of {}h is out of range", hours)))
        };
        let thresholds = Self { at_risk_minutes: minutes(at_risk)?, breach_minutes: minutes(breach)? };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Thresholds must satisfy `0 < at_risk <= breach` and fit a [`Duration`].
    pub fn validate(&self) -> Result<()> {
        if self.at_risk_minutes <= 0 || self.breach_minutes < self.at_risk_minutes {
            return Err(SupportError::Config(format!(
                "SLA thresholds must satisfy 0 < at_risk ({}m) <= breach ({}m)",
                self.at_risk_minutes, self.breach_minutes
            )));
        }
        for minutes in [self.at_risk_minutes, self.breach_minutes] {
            if Duration::try_minutes(minutes).is_none() {
                return Err(SupportError::Config(format!("SLA threshold of {}m is out of range", minutes)));
            }
        }
        Ok(())
    }

    // Saturate so hand-built, unvalidated thresholds never panic in `evaluate`.
    pub fn at_risk(&self) -> Duration {
        Duration::try_minutes(self.at_risk_minutes).unwrap_or(Duration::MAX)
    }

    pub fn breach(&self) -> Duration {
        Duration::try_minutes(self.breach_minutes).unwrap_or(Duration::MAX)
    }
}

/// Classify how well admins are keeping up with `ticket` at `now`.
///
/// Only admin responsiveness is measured. The clock runs from the user's
/// latest message while a ticket is `open` or `pending_admin`.
///
/// A `pending_user` ticket is always `OnTrack`, however long ago the admin
/// replied: the next move belongs to the user, and a silent user does not
/// count against the support team.
pub fn evaluate(ticket: &SupportTicket, now: DateTime<Utc>, thresholds: &SlaThresholds) -> SlaStatus {
    let waiting_since = match ticket.status {
        TicketStatus::Resolved | TicketStatus::Closed => return SlaStatus::NotApplicable,
        TicketStatus::PendingUser => return SlaStatus::OnTrack,
        TicketStatus::Open | TicketStatus::PendingAdmin => ticket.last_user_reply_at,
    };

    let waited = now - waiting_since;
    if waited > thresholds.breach() {
        SlaStatus::Breached
    } else if waited > thresholds.at_risk() {
        SlaStatus::AtRisk
    } else {
        SlaStatus::OnTrack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthorRole, BindType, TicketMutation, TicketPolicy};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap()
    }

    fn ticket(status: TicketStatus, user_waiting_hours: i64) -> SupportTicket {
        let created = now() - Duration::hours(user_waiting_hours);
        let (mut ticket, _) =
            SupportTicket::open(Uuid::new_v4(), BindType::Technical, "It broke", created, &TicketPolicy::default())
                .unwrap();
        ticket.status = status;
        ticket
    }

    #[test]
    fn pending_admin_past_breach_is_breached() {
        let thresholds = SlaThresholds::from_hours(12, 24).unwrap();
        let ticket = ticket(TicketStatus::PendingAdmin, 25);
        assert_eq!(evaluate(&ticket, now(), &thresholds), SlaStatus::Breached);
    }

    #[test]
    fn classification_follows_thresholds() {
        let thresholds = SlaThresholds::from_hours(12, 24).unwrap();
        assert_eq!(evaluate(&ticket(TicketStatus::Open, 1), now(), &thresholds), SlaStatus::OnTrack);
        assert_eq!(evaluate(&ticket(TicketStatus::Open, 13), now(), &thresholds), SlaStatus::AtRisk);
        assert_eq!(evaluate(&ticket(TicketStatus::Open, 30), now(), &thresholds), SlaStatus::Breached);
    }

    #[test]
    fn finished_tickets_are_not_applicable() {
        let thresholds = SlaThresholds::default();
        for status in [TicketStatus::Resolved, TicketStatus::Closed] {
            assert_eq!(evaluate(&ticket(status, 100), now(), &thresholds), SlaStatus::NotApplicable);
        }
    }

    #[test]
    fn waiting_on_user_never_breaches() {
        let thresholds = SlaThresholds::default();
        assert_eq!(evaluate(&ticket(TicketStatus::PendingUser, 100), now(), &thresholds), SlaStatus::OnTrack);
    }

    #[test]
    fn evaluation_is_repeatable_and_tracks_threshold_changes() {
        let ticket = ticket(TicketStatus::PendingAdmin, 6);
        let lenient = SlaThresholds::from_hours(12, 24).unwrap();
        let strict = SlaThresholds::from_hours(2, 4).unwrap();

        assert_eq!(evaluate(&ticket, now(), &lenient), evaluate(&ticket, now(), &lenient));
        assert_eq!(evaluate(&ticket, now(), &lenient), SlaStatus::OnTrack);
        assert_eq!(evaluate(&ticket, now(), &strict), SlaStatus::Breached);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        assert!(SlaThresholds::from_hours(24, 12).is_err());
        assert!(SlaThresholds::from_hours(0, 12).is_err());
    }

    #[test]
    fn out_of_range_thresholds_are_rejected() {
        let err = SlaThresholds::from_hours(i64::MAX, i64::MAX).unwrap_err();
        assert!(matches!(err, SupportError::Config(_)));

        let huge = SlaThresholds { at_risk_minutes: i64::MAX / 2, breach_minutes: i64::MAX / 2 };
        assert!(matches!(huge.validate(), Err(SupportError::Config(_))));
    }

    #[test]
    fn unvalidated_huge_thresholds_saturate() {
        let huge = SlaThresholds { at_risk_minutes: i64::MAX, breach_minutes: i64::MAX };
        assert_eq!(huge.breach(), Duration::MAX);
        assert_eq!(evaluate(&ticket(TicketStatus::PendingAdmin, 100), now(), &huge), SlaStatus::OnTrack);
    }

    #[test]
    fn pending_user_stays_on_track_long_after_admin_reply() {
        let thresholds = SlaThresholds::from_hours(12, 24).unwrap();
        let mut ticket = ticket(TicketStatus::PendingAdmin, 101);
        ticket
            .apply(
                &TicketMutation::AppendMessage {
                    author_id: Uuid::new_v4(),
                    author_role: AuthorRole::Admin,
                    body: "Please send the invoice number".into(),
                },
                now() - Duration::hours(100),
                &TicketPolicy::default(),
            )
            .unwrap();

        assert_eq!(ticket.status, TicketStatus::PendingUser);
        assert_eq!(now() - ticket.last_admin_reply_at.unwrap(), Duration::hours(100));
        assert_eq!(evaluate(&ticket, now(), &thresholds), SlaStatus::OnTrack);
    }
}
