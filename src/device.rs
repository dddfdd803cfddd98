// Device identity helpers

use crate::store::LocalStore;
use anyhow::Result;
use tracing::info;
use uuid::Uuid;

pub const DEVICE_ID_KEY: &str = "device_id";

/// Resolve the recorder's device id
///
/// An explicit override (CLI or config) always wins and is never written
/// back. Otherwise the persisted id is reused, and on first run a fresh one
/// is generated and persisted so the device keeps its identity across
/// restarts.
pub async fn resolve_device_id(store: &LocalStore, configured: Option<&str>) -> Result<String> {
    if let Some(id) = configured {
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }

    if let Some(id) = store.read::<String>(DEVICE_ID_KEY).await {
        return Ok(id);
    }

    let id = generate_device_id();
    store.write(DEVICE_ID_KEY, &id).await?;
    info!("Generated device id '{}'", id);
    Ok(id)
}

/// Generate a short human-readable device id, e.g. "RS-4F21A0B3"
pub fn generate_device_id() -> String {
    let uuid = Uuid::new_v4().to_string();
    format!("RS-{}", uuid[..8].to_uppercase())
}
