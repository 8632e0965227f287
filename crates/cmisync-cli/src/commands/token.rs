//! Token command - show the persisted change log resume token

use anyhow::Result;
use clap::Args;
use cmisync_core::config::Config;
use cmisync_core::ports::IMetaDataStorage;

use super::open_store;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct TokenCommand {}

impl TokenCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let Some(store) = open_store(config).await? else {
            formatter.error(&format!(
                "No database found at {}",
                config.sync.database.display()
            ));
            return Ok(());
        };

        let token = store.change_log_token().await?;
        let mapped = store.count().await?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "change_log_token": token.as_ref().map(|t| t.as_str()),
                "mapped_objects": mapped,
            }));
            return Ok(());
        }

        match token {
            Some(token) => formatter.success(&format!("Change log token: {token}")),
            None => formatter.info("No change log token yet; the next sync will be a full crawl"),
        }
        formatter.info(&format!("{mapped} mapped object(s)"));
        Ok(())
    }
}
