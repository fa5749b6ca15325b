use std::sync::Arc;

use serde::Serialize;

use super::{CmdResult, Context};
use crate::marketplace::{MarketplaceCatalog, MarketplaceClient};

#[derive(Serialize)]
struct TitleReport<'a> {
    item_id: &'a str,
    title: Option<String>,
}

pub(crate) async fn cmd_titles_get(ctx: &Context, item_id: &str, fetch: bool) -> CmdResult {
    let storage = ctx.storage()?;
    let titles = ctx.titles(&storage)?;

    let title = if fetch {
        let client = Arc::new(MarketplaceClient::from_config(&ctx.config.marketplace)?);
        titles
            .get_or_fetch(item_id, &MarketplaceCatalog::new(client))
            .await?
    } else {
        titles.get(item_id).await?
    };

    let report = TitleReport {
        item_id,
        title: title.clone(),
    };
    ctx.emit(&report, || match &title {
        Some(t) => t.clone(),
        None => format!("{}: no cached title", item_id),
    })?;
    match title {
        Some(_) => Ok(()),
        None => Err(format!("no title for {}", item_id).into()),
    }
}

pub(crate) async fn cmd_titles_put(ctx: &Context, item_id: &str, title: &str) -> CmdResult {
    let storage = ctx.storage()?;
    let titles = ctx.titles(&storage)?;
    if !titles.put(item_id, title).await? {
        return Err("item id and title must not be empty".into());
    }
    let report = TitleReport {
        item_id: item_id.trim(),
        title: Some(title.trim().to_string()),
    };
    ctx.emit(&report, || format!("cached {}", item_id.trim()))
}
