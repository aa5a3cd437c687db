use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A binary payload lifted out of a tool result into the current execution's
/// side table. `data` is opaque base64 text; `id` matches `blob_[a-z0-9]{6}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
    pub id: String,
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Per-execution table of lifted blobs. Cleared at the start of each
/// execution and populated only from within that execution.
#[derive(Default)]
pub struct BlobTable {
    blobs: Vec<Blob>,
}

impl BlobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a blob, generating a fresh unique id. Retries on collision.
    pub fn insert(&mut self, data: String, mime_type: String) -> String {
        let id = loop {
            let candidate = generate_blob_id();
            if !self.blobs.iter().any(|b| b.id == candidate) {
                break candidate;
            }
        };
        self.blobs.push(Blob {
            id: id.clone(),
            data,
            mime_type,
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<&Blob> {
        self.blobs.iter().find(|b| b.id == id)
    }

    pub fn into_vec(self) -> Vec<Blob> {
        self.blobs
    }

    pub fn as_slice(&self) -> &[Blob] {
        &self.blobs
    }
}

fn generate_blob_id() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| {
            let idx = rng.random_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect();
    format!("blob_{suffix}")
}

/// Recursively rewrite `value`, lifting recognised binary shapes into
/// `table` and replacing them with `{type: "blob_ref", id, mimeType}`.
/// Does not mutate `value`; recursion order is deterministic (array index
/// order, object insertion order).
pub fn extract_blobs(value: &Value, table: &mut BlobTable) -> Value {
    if let Some(blob_ref) = lift_image_or_audio(value, table) {
        return blob_ref;
    }
    if let Some(blob_ref) = lift_resource_blob(value, table) {
        return blob_ref;
    }
    match value {
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| extract_blobs(v, table)).collect())
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), extract_blobs(v, table));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn lift_image_or_audio(value: &Value, table: &mut BlobTable) -> Option<Value> {
    let obj = value.as_object()?;
    let kind = obj.get("type")?.as_str()?;
    if kind != "image" && kind != "audio" {
        return None;
    }
    let data = obj.get("data")?.as_str()?.to_string();
    let mime_type = obj.get("mimeType")?.as_str()?.to_string();
    let id = table.insert(data, mime_type.clone());
    Some(serde_json::json!({"type": "blob_ref", "id": id, "mimeType": mime_type}))
}

fn lift_resource_blob(value: &Value, table: &mut BlobTable) -> Option<Value> {
    let obj = value.as_object()?;
    let data = obj.get("blob")?.as_str()?.to_string();
    let mime_type = obj.get("mimeType")?.as_str()?.to_string();
    let id = table.insert(data, mime_type.clone());
    Some(serde_json::json!({"type": "blob_ref", "id": id, "mimeType": mime_type}))
}
