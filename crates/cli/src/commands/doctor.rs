use relaybot_storage::{ProbeOutcome, RootSource};
use serde::Serialize;

use super::{CmdResult, Context};

#[derive(Serialize)]
struct DoctorReport {
    storage: relaybot_storage::RootDiagnostics,
    marketplace_credentials: bool,
    templates: Vec<String>,
}

/// Report where state would live and whether it is usable. Exits non-zero
/// when the storage probe fails.
pub(crate) fn cmd_doctor(ctx: &Context) -> CmdResult {
    let diagnostics = ctx.config.resolver().diagnose();
    let marketplace = &ctx.config.marketplace;
    let report = DoctorReport {
        marketplace_credentials: marketplace.client_id.is_some() && marketplace.api_key.is_some(),
        templates: ctx.config.templates.keys().cloned().collect(),
        storage: diagnostics,
    };

    ctx.emit(&report, || {
        let d = &report.storage;
        let mut out = format!("storage root: {}\n", d.selected.display());
        match &d.source {
            RootSource::Candidate { source } => out.push_str(&format!("  selected by: {}\n", source)),
            RootSource::Fallback => out.push_str("  selected by: fallback\n"),
        }
        for candidate in &d.candidates {
            out.push_str(&format!("  {}\n", candidate));
        }
        match &d.probe {
            ProbeOutcome::Passed => out.push_str("probe: ok\n"),
            ProbeOutcome::Failed { error } => out.push_str(&format!("probe: FAILED ({})\n", error)),
        }
        out.push_str(&format!(
            "marketplace credentials: {}\n",
            if report.marketplace_credentials { "configured" } else { "missing" }
        ));
        out.push_str(&format!("templates: {}", report.templates.join(", ")));
        out
    })?;

    match &report.storage.probe {
        ProbeOutcome::Passed => Ok(()),
        ProbeOutcome::Failed { error } => Err(format!("storage root is not usable: {}", error).into()),
    }
}
