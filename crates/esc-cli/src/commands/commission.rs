//! `esc commission` handlers.

use anyhow::Result;
use esc_engine::CommissionEngine;

use super::{opt_dt, opt_str};

pub async fn show(engine: &CommissionEngine, code: &str) -> Result<()> {
    let c = engine.commission(code).await?;
    println!("service_code={}", c.service_code);
    println!("status={}", c.status.as_str());
    println!("requester_id={}", c.requester_id);
    println!("title={}", c.title);
    println!("currency={}", c.currency);
    println!("price_micros={}", c.price_micros);
    println!("quantity={}", c.quantity);
    println!("fx_rate_micros={}", c.fx_rate_micros);
    println!("fee={}", c.fee);
    println!("escrow_amount={}", c.escrow_amount);
    println!("deadline={}", c.deadline.to_rfc3339());
    println!("image_ref={}", opt_str(&c.image_ref));

    if let Some(place) = engine.place(code).await? {
        println!("place={} {}", place.external_place_id, place.formatted_address);
    }

    match engine.order(code).await? {
        Some(o) => {
            println!("order_id={}", o.order_id);
            println!("fulfiller_id={}", o.fulfiller_id);
            println!("order_status={}", o.status.as_str());
            println!("order_finished_at={}", opt_dt(&o.finished_at));
        }
        None => println!("order=NULL"),
    }

    if let Some(r) = engine.receipt(code).await? {
        println!("receipt_ref={}", r.receipt_ref);
        println!("receipt_uploaded_at={}", r.uploaded_at.to_rfc3339());
    }
    if let Some(s) = engine.shipping(code).await? {
        println!("logistics_name={}", s.logistics_name);
        println!("tracking_number={}", opt_str(&s.tracking_number));
        println!("shipped_at={}", s.shipped_at.to_rfc3339());
    }
    Ok(())
}

pub async fn history(engine: &CommissionEngine, code: &str) -> Result<()> {
    let entries = engine.history(code).await?;
    for h in entries {
        let (old, new) = h.diff.to_snapshots()?;
        println!(
            "history_id={} action={} actor={} created_at={}",
            h.history_id,
            h.action.as_str(),
            h.actor_id,
            h.created_at.to_rfc3339()
        );
        println!("  old={}", old);
        println!("  new={}", new);
    }
    Ok(())
}
