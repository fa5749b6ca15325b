use std::sync::Arc;

use relaybot_outreach::{shutdown_channel, DeliveryWorker, DrainReport, OutreachQueue};

use super::{CmdResult, Context};
use crate::marketplace::{MarketplaceClient, MarketplaceSender};

fn build_worker(
    ctx: &Context,
    queue: OutreachQueue,
) -> Result<DeliveryWorker, Box<dyn std::error::Error>> {
    let client = Arc::new(MarketplaceClient::from_config(&ctx.config.marketplace)?);
    let sender = Arc::new(MarketplaceSender::new(client, ctx.config.templates.clone()));
    Ok(DeliveryWorker::new(queue, sender, ctx.config.worker()))
}

fn summary(report: &DrainReport) -> String {
    format!(
        "attempted: {}, delivered: {}, retried: {}, dead-lettered: {}",
        report.attempted, report.delivered, report.retried, report.dead_lettered
    )
}

pub(crate) async fn cmd_drain(ctx: &Context) -> CmdResult {
    let storage = ctx.storage()?;
    let queue = ctx.queue(&storage).await?;
    let mut worker = build_worker(ctx, queue)?;

    let report = worker.drain_once().await?;
    ctx.emit(&report, || summary(&report))
}

/// Deliver until Ctrl+C. The attempt in flight when the signal arrives is
/// finished and recorded before exiting.
pub(crate) async fn cmd_run(ctx: &Context) -> CmdResult {
    let storage = ctx.storage()?;
    let queue = ctx.queue(&storage).await?;
    let worker = build_worker(ctx, queue)?;

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, finishing current attempt");
        }
        trigger.trigger();
    });

    if !ctx.quiet {
        eprintln!("delivering; press Ctrl+C to stop");
    }
    let report = worker.run(shutdown).await?;
    ctx.emit(&report, || summary(&report))
}
