//! Backup schedule importer
//!
//! Reads an existing remote backup schedule and prints a CloudBackupSchedule
//! manifest that reproduces it, so the schedule can be brought under management.
//!
//! Usage: schedule-import <import-id> <name> [namespace]
//!
//! The import id is either a state identity token or `<project_id>-<cluster_name>`.
//! ATLAS_API_TOKEN is required; ATLAS_API_BASE_URL and CREDENTIALS_SECRET are optional.

use anyhow::{bail, Context as _};

use cloud_backup_schedule_operator::{
    adapters::import_manifest,
    atlas::{AtlasClient, RetryConfig, RetryingScheduleApi, DEFAULT_BASE_URL},
    identity::parse_import_id,
    reconcilers::schedule::fetch_for_import,
};

const DEFAULT_CREDENTIALS_SECRET: &str = "atlas-api-credentials";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (import_id, name, namespace) = match args.as_slice() {
        [id, name] => (id, name, None),
        [id, name, namespace] => (id, name, Some(namespace.as_str())),
        _ => bail!("usage: schedule-import <import-id> <name> [namespace]"),
    };

    let key = parse_import_id(import_id)?;
    let token = std::env::var("ATLAS_API_TOKEN").context("ATLAS_API_TOKEN must be set")?;
    let base_url =
        std::env::var("ATLAS_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let credentials_secret = std::env::var("CREDENTIALS_SECRET")
        .unwrap_or_else(|_| DEFAULT_CREDENTIALS_SECRET.to_string());

    let api = RetryingScheduleApi::new(AtlasClient::new(base_url, token)?, RetryConfig::default());
    let remote = fetch_for_import(&api, &key)
        .await
        .with_context(|| format!("reading backup schedule for {}", key))?;

    let manifest = import_manifest(name, namespace, &key, &remote, &credentials_secret);
    print!("{}", serde_yaml::to_string(&manifest)?);
    eprintln!("imported {} as state id {}", key, key.state_id());
    Ok(())
}
