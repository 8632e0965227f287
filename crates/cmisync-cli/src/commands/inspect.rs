//! Inspect command - show what the metadata database knows about a path
//!
//! Relative paths are resolved against the configured sync root.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use cmisync_core::config::Config;
use cmisync_core::domain::MappedObject;
use cmisync_core::ports::IMetaDataStorage;
use tracing::info;

use super::open_store;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct InspectCommand {
    /// Local path, absolute or relative to the sync root
    pub path: PathBuf,
}

impl InspectCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let Some(store) = open_store(config).await? else {
            formatter.error(&format!(
                "No database found at {}",
                config.sync.database.display()
            ));
            return Ok(());
        };

        let path = resolve(&config.sync.root, &self.path);
        info!(path = %path.display(), "Inspecting mapped object");

        let mapped = store
            .get_by_path(&path)
            .await
            .with_context(|| format!("Failed to look up {}", path.display()))?;

        match mapped {
            Some(mapped) if format.is_json() => {
                let mut json = serde_json::to_value(&mapped)
                    .context("Failed to serialize mapped object")?;
                json["path"] = serde_json::Value::String(path.display().to_string());
                formatter.print_json(&json);
            }
            Some(mapped) => {
                formatter.success(&path.display().to_string());
                print_mapped(&*formatter, &mapped);
            }
            None if format.is_json() => {
                formatter.print_json(&serde_json::json!({
                    "path": path.display().to_string(),
                    "mapped": false,
                }));
            }
            None => formatter.error(&format!("{} is not mapped", path.display())),
        }
        Ok(())
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn print_mapped(formatter: &dyn OutputFormatter, mapped: &MappedObject) {
    formatter.fields(&[
        ("remote id", mapped.remote_id.to_string()),
        ("parent id", or_dash(mapped.parent_id.as_ref())),
        ("kind", mapped.kind.to_string()),
        ("change token", or_dash(mapped.change_token.as_ref())),
        ("checksum", or_dash(mapped.checksum.as_ref())),
        ("size", or_dash(mapped.content_size)),
        ("identity", or_dash(mapped.local_identity.as_ref())),
        ("last remote write", or_dash(mapped.last_remote_write)),
        ("last local write", or_dash(mapped.last_local_write)),
        ("ignored", mapped.ignored.to_string()),
        ("read only", mapped.read_only.to_string()),
    ]);
}
