//! Telemetry index commands: print the mapping, or (re)create the index.

use anyhow::{Context, Result};

use conway_core::record::index_mapping;

pub fn cmd_mapping() -> Result<()> {
    let pretty = serde_json::to_string_pretty(&index_mapping())?;
    println!("{}", pretty);
    Ok(())
}

/// Drop `index` if it exists, then create it with the telemetry mapping.
pub async fn cmd_init_index(es_url: &str, index: &str) -> Result<()> {
    let url = format!("{}/{}", es_url.trim_end_matches('/'), index);
    let client = reqwest::Client::new();

    let exists = client
        .head(&url)
        .send()
        .await
        .with_context(|| format!("failed to connect to document store at {} — is it running?", es_url))?
        .status()
        .is_success();

    if exists {
        let resp = client
            .delete(&url)
            .send()
            .await
            .context("failed to delete existing index")?;
        if !resp.status().is_success() {
            anyhow::bail!("deleting index {} failed: HTTP {}", index, resp.status());
        }
        println!("Deleted existing index '{}'.", index);
    }

    let resp = client
        .put(&url)
        .json(&index_mapping())
        .send()
        .await
        .context("failed to create index")?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("creating index {} failed: HTTP {}: {}", index, status, body);
    }

    println!("Index '{}' created.", index);
    Ok(())
}
