//! `esc review` handlers.

use anyhow::{Context, Result};
use esc_engine::{Caller, CommissionEngine, ReviewDecision};
use esc_schemas::{ReviewResult, ReviewTarget};

use super::{opt_dt, opt_str};

pub async fn pending(engine: &CommissionEngine, limit: i64) -> Result<()> {
    let items = engine.pending_for_review(limit).await?;
    println!("pending={}", items.len());
    for item in items {
        let c = &item.commission;
        println!(
            "service_code={} requester={} title={:?} escrow={} created_at={} latest_fail_reason={:?}",
            c.service_code,
            c.requester_id,
            c.title,
            c.escrow_amount,
            c.created_at.to_rfc3339(),
            opt_str(&item.latest_fail_reason),
        );
    }
    Ok(())
}

pub async fn decide(
    engine: &CommissionEngine,
    code: &str,
    result: &str,
    reason: Option<String>,
    reviewer: &str,
    target: &str,
) -> Result<()> {
    let target = ReviewTarget::parse(target.trim())?;
    let result = ReviewResult::parse(&result.trim().to_uppercase())
        .context("invalid --result. expected one of: PASS | FAIL")?;

    let decision = ReviewDecision { result, reason };
    let outcome = engine
        .review(&Caller::new(reviewer), target, code, decision)
        .await?;

    println!(
        "review_id={} service_code={} result={} status={}",
        outcome.review.review_id,
        outcome.commission.service_code,
        outcome.review.result.as_str(),
        outcome.commission.status.as_str(),
    );
    if outcome.review.result == ReviewResult::Fail {
        println!(
            "recent_fails={} suspended_until={}",
            outcome.recent_fails,
            opt_dt(&outcome.suspended_until)
        );
    }
    Ok(())
}
