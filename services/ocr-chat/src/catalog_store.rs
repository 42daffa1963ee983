//! Persisting the model catalog
//!
//! The selected ids and the last fetched model list are kept as JSON strings
//! under two keys of their own store, separate from the key pool's file.

use chat::{ModelCatalog, ModelInfo};
use key_pool::{Error, KeyValueStore, Result, StoredValue};
use tracing::warn;

const SELECTED_KEY: &str = "selected_models";
const AVAILABLE_KEY: &str = "available_models";

/// Rebuild the catalog. Unreadable entries are treated as absent.
pub async fn load_catalog(store: &dyn KeyValueStore) -> Result<ModelCatalog> {
    let entries = store.read_all().await?;

    let selected: Vec<String> = decode_json(entries.get(SELECTED_KEY), SELECTED_KEY);
    let available: Vec<ModelInfo> = decode_json(entries.get(AVAILABLE_KEY), AVAILABLE_KEY);
    Ok(ModelCatalog::new(available, selected))
}

/// Write the selection and available list in one batch.
pub async fn save_catalog(store: &dyn KeyValueStore, catalog: &ModelCatalog) -> Result<()> {
    let selected = serde_json::to_string(catalog.selected_ids())
        .map_err(|e| Error::Store(format!("serializing selected models: {e}")))?;
    let available = serde_json::to_string(catalog.available())
        .map_err(|e| Error::Store(format!("serializing model list: {e}")))?;

    store
        .write_batch(vec![
            (SELECTED_KEY.to_string(), StoredValue::Str(selected)),
            (AVAILABLE_KEY.to_string(), StoredValue::Str(available)),
        ])
        .await
}

fn decode_json<T: serde::de::DeserializeOwned + Default>(value: Option<&StoredValue>, key: &str) -> T {
    let Some(raw) = value.and_then(StoredValue::as_str) else {
        return T::default();
    };
    match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(key, error = %e, "ignoring unreadable model entry");
            T::default()
        }
    }
}
