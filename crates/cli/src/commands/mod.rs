pub(crate) mod deliver;
pub(crate) mod doctor;
pub(crate) mod enqueue;
pub(crate) mod status;
pub(crate) mod titles;

use std::error::Error;
use std::sync::Arc;

use relaybot_catalog::TitleCache;
use relaybot_outreach::OutreachQueue;
use relaybot_storage::{Clock, StorageContext, SystemClock};
use serde::Serialize;

use crate::config::RelayConfig;
use crate::OutputFormat;

pub(crate) type CmdResult = Result<(), Box<dyn Error>>;

/// Shared state for one CLI invocation.
pub(crate) struct Context {
    pub config: RelayConfig,
    pub output: OutputFormat,
    pub quiet: bool,
    clock: Arc<dyn Clock>,
}

impl Context {
    pub fn new(config: RelayConfig, output: OutputFormat, quiet: bool) -> Self {
        Context {
            config,
            output,
            quiet,
            clock: Arc::new(SystemClock),
        }
    }

    /// Resolve and probe the storage root. Fatal on failure.
    pub fn storage(&self) -> Result<StorageContext, Box<dyn Error>> {
        Ok(StorageContext::open(&self.config.resolver())?)
    }

    /// Writable queue. One writer per storage root at a time.
    pub async fn queue(&self, storage: &StorageContext) -> Result<OutreachQueue, Box<dyn Error>> {
        Ok(OutreachQueue::open(storage, self.clock.clone()).await?)
    }

    /// Queue view for inspection commands; safe while `relaybot run` is up.
    pub async fn queue_view(
        &self,
        storage: &StorageContext,
    ) -> Result<OutreachQueue, Box<dyn Error>> {
        Ok(OutreachQueue::open_read_only(storage, self.clock.clone()).await?)
    }

    pub fn titles(&self, storage: &StorageContext) -> Result<TitleCache, Box<dyn Error>> {
        Ok(TitleCache::open(
            storage,
            self.clock.clone(),
            self.config.title_ttl(),
        )?)
    }

    /// Print `value` as pretty JSON, or `text()` in text mode.
    pub fn emit<T, F>(&self, value: &T, text: F) -> CmdResult
    where
        T: Serialize,
        F: FnOnce() -> String,
    {
        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => {
                let rendered = text();
                if !rendered.is_empty() {
                    println!("{}", rendered);
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn format_time(at: time::OffsetDateTime) -> String {
    at.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| at.to_string())
}
