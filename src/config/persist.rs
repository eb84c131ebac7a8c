//! Writing the released version back into the configuration file.

use anyhow::{Context, Result};
use std::path::Path;
use toml_edit::{DocumentMut, Item, Table, value};

/// Write `version` into `[product].version` of the config file at `path`.
///
/// The document is edited in place so comments, ordering and formatting of
/// the rest of the file survive.
pub async fn persist_product_version(path: &Path, version: &str) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let mut doc: DocumentMut = content
        .parse()
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;

    if !doc.contains_table("product") {
        doc.insert("product", Item::Table(Table::new()));
    }
    doc["product"]["version"] = value(version);

    tokio::fs::write(path, doc.to_string())
        .await
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    tracing::debug!("Recorded version {} in {}", version, path.display());
    Ok(())
}
