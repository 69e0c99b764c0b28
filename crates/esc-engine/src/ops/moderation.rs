//! Moderation: approve or reject commissions pending review, and suspend
//! requesters who collect too many failed reviews.

use chrono::Duration;
use esc_audit::{FieldValue, HistoryDiff, HistoryField};
use esc_db::NewReview;
use esc_schemas::{HistoryAction, PendingReviewItem, ReviewResult, ReviewTarget};
use tracing::info;

use super::opt_trimmed;
use crate::caller::Caller;
use crate::engine::{log_failure, CommissionEngine};
use crate::error::EngineError;
use crate::payloads::{ReviewDecision, ReviewOutcome};
use crate::state_machine::{next_status, CommissionEvent};

impl CommissionEngine {
    pub async fn approve(&self, reviewer: &Caller, service_code: &str) -> Result<ReviewOutcome, EngineError> {
        self.review(reviewer, ReviewTarget::Commission, service_code, ReviewDecision::pass())
            .await
    }

    pub async fn reject(
        &self,
        reviewer: &Caller,
        service_code: &str,
        reason: &str,
    ) -> Result<ReviewOutcome, EngineError> {
        self.review(reviewer, ReviewTarget::Commission, service_code, ReviewDecision::fail(reason))
            .await
    }

    /// Record a moderation decision and move the commission out of
    /// `PENDING_REVIEW`.
    ///
    /// A failed review counts the requester's failures inside the trailing
    /// window (this one included); at the threshold the requester's
    /// `disabled_until` is raised to `now + suspension_days`. It is never
    /// moved earlier.
    pub async fn review(
        &self,
        reviewer: &Caller,
        target: ReviewTarget,
        service_code: &str,
        decision: ReviewDecision,
    ) -> Result<ReviewOutcome, EngineError> {
        self.review_inner(reviewer, target, service_code, decision)
            .await
            .inspect_err(|e| log_failure("review", &reviewer.user_id, e))
    }

    async fn review_inner(
        &self,
        reviewer: &Caller,
        target: ReviewTarget,
        service_code: &str,
        decision: ReviewDecision,
    ) -> Result<ReviewOutcome, EngineError> {
        let now = self.now();
        reviewer.ensure_active(now)?;
        decision.validate()?;
        let (event, action) = match decision.result {
            ReviewResult::Pass => (CommissionEvent::Approve, HistoryAction::Approve),
            ReviewResult::Fail => (CommissionEvent::Reject, HistoryAction::Reject),
        };
        let reason = opt_trimmed(decision.reason.as_deref());

        let mut tx = self.begin().await?;
        let mut c = Self::lock_commission(&mut *tx, service_code).await?;
        let next = next_status(c.status, event)?;

        let review = esc_db::reviews::insert_review(
            &mut *tx,
            &NewReview {
                target_type: target,
                target_id: c.commission_id,
                requester_id: c.requester_id.clone(),
                reviewer_id: reviewer.user_id.clone(),
                result: decision.result,
                reason: reason.clone(),
                created_at: now,
            },
        )
        .await?;

        let mut diff = HistoryDiff::new();
        diff.record(HistoryField::Status, c.status, next);
        if decision.result == ReviewResult::Fail {
            diff.set(HistoryField::Reason, FieldValue::opt_text(reason.as_deref()));
        }
        c.status = next;
        c.updated_at = now;
        esc_db::commissions::store_commission(&mut *tx, &c).await?;
        esc_db::history::insert_history(&mut *tx, c.commission_id, action, &reviewer.user_id, &diff, now)
            .await?;

        let mut recent_fails = 0;
        let mut suspended_until = None;
        if decision.result == ReviewResult::Fail {
            let m = &self.settings.moderation;
            let since = now - Duration::days(m.fail_window_days);
            recent_fails = esc_db::reviews::count_recent_fails(&mut *tx, &c.requester_id, since).await?;
            if recent_fails >= m.fail_threshold {
                suspended_until = esc_db::users::suspend_until_at_least(
                    &mut *tx,
                    &c.requester_id,
                    now + Duration::days(m.suspension_days),
                )
                .await?;
            }
        }

        Self::commit(tx).await?;
        info!(
            service_code = %c.service_code,
            actor = %reviewer.user_id,
            action = action.as_str(),
            recent_fails,
            "commission reviewed"
        );
        if let Some(until) = suspended_until {
            info!(
                requester = %c.requester_id,
                recent_fails,
                disabled_until = %until.to_rfc3339(),
                "requester suspended"
            );
        }

        Ok(ReviewOutcome {
            review,
            commission: c,
            recent_fails,
            suspended_until,
        })
    }

    /// Moderation queue, oldest first.
    pub async fn pending_for_review(&self, limit: i64) -> Result<Vec<PendingReviewItem>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(esc_db::commissions::list_pending_review(&mut *conn, limit).await?)
    }
}
