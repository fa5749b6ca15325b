use relaybot_outreach::{ItemId, ItemState, Location};
use serde::Serialize;

use super::{format_time, CmdResult, Context};

#[derive(Serialize)]
struct LocateReport {
    id: u64,
    location: Option<Location>,
}

pub(crate) async fn cmd_status(ctx: &Context, id: Option<u64>) -> CmdResult {
    let storage = ctx.storage()?;
    let queue = ctx.queue_view(&storage).await?;

    if let Some(id) = id {
        let location = queue.locate(ItemId(id)).await?;
        let report = LocateReport { id, location };
        ctx.emit(&report, || match location {
            Some(Location::Active) => format!("{}: active", id),
            Some(Location::Sent) => format!("{}: sent", id),
            Some(Location::DeadLetter) => format!("{}: dead letter", id),
            None => format!("{}: unknown", id),
        })?;
        return match location {
            Some(_) => Ok(()),
            None => Err(format!("no item with id {}", id).into()),
        };
    }

    let stats = queue.stats().await?;
    let items = queue.snapshot().await?;
    let quiet = ctx.quiet;
    ctx.emit(&stats, || {
        let mut out = format!(
            "pending: {}\nscheduled: {}\nsent: {}\ndead letters: {}",
            stats.pending, stats.scheduled, stats.sent, stats.dead_letters
        );
        if let Some(at) = stats.next_attempt_at {
            out.push_str(&format!("\nnext attempt: {}", format_time(at)));
        }
        if !quiet {
            for item in &items {
                let state = match item.state {
                    ItemState::Pending => "pending".to_string(),
                    ItemState::Scheduled { next_attempt_at } => {
                        format!("retry at {}", format_time(next_attempt_at))
                    }
                };
                out.push_str(&format!(
                    "\n  #{} -> {} ({}, attempts: {})",
                    item.id, item.recipient, state, item.attempt_count
                ));
                if let Some(err) = &item.last_error {
                    out.push_str(&format!(" last error: {}", err));
                }
            }
        }
        out
    })
}

pub(crate) async fn cmd_dead_letters(ctx: &Context) -> CmdResult {
    let storage = ctx.storage()?;
    let queue = ctx.queue_view(&storage).await?;
    let records = queue.dead_letters().list().await?;

    ctx.emit(&records, || {
        if records.is_empty() {
            return "no dead letters".to_string();
        }
        records
            .iter()
            .map(|r| {
                format!(
                    "#{} -> {} after {} attempt(s) at {}: {}",
                    r.id,
                    r.recipient,
                    r.attempt_count,
                    format_time(r.dead_at),
                    r.last_error
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}
