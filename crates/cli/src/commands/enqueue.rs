use std::collections::BTreeMap;

use relaybot_outreach::{EnqueueOutcome, Payload, Recipient};
use serde::Serialize;

use super::{CmdResult, Context};

pub(crate) struct EnqueueArgs {
    pub recipient: String,
    pub text: Option<String>,
    pub template: Option<String>,
    pub params: BTreeMap<String, String>,
    pub unique: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Enqueued,
    AlreadyPending,
    AlreadySent,
}

#[derive(Serialize)]
struct EnqueueReport {
    id: u64,
    outcome: Outcome,
}

pub(crate) async fn cmd_enqueue(ctx: &Context, args: EnqueueArgs) -> CmdResult {
    let payload = match (args.text, args.template) {
        (Some(text), _) => Payload::text(text),
        (None, Some(template)) => Payload::template(template, args.params),
        (None, None) => return Err("either --text or --template is required".into()),
    };
    // Catch unknown templates and missing params now rather than at send time.
    payload.render(&ctx.config.templates)?;

    let storage = ctx.storage()?;
    let queue = ctx.queue(&storage).await?;
    let recipient = Recipient::new(args.recipient);

    let outcome = if args.unique {
        queue.enqueue_unique(recipient, payload).await?
    } else {
        EnqueueOutcome::Enqueued(queue.enqueue(recipient, payload).await?)
    };

    let report = EnqueueReport {
        id: outcome.id().0,
        outcome: match outcome {
            EnqueueOutcome::Enqueued(_) => Outcome::Enqueued,
            EnqueueOutcome::AlreadyPending(_) => Outcome::AlreadyPending,
            EnqueueOutcome::AlreadySent(_) => Outcome::AlreadySent,
        },
    };
    ctx.emit(&report, || match outcome {
        EnqueueOutcome::Enqueued(id) => format!("enqueued {}", id),
        EnqueueOutcome::AlreadyPending(id) => format!("already pending as {}", id),
        EnqueueOutcome::AlreadySent(id) => format!("already sent as {}", id),
    })
}
