use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// The two collections the console keeps in the hosted database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Students,
    Workshops,
}

/// File stored in the bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub file_id: String,
    pub view_url: String,
}

/// Document database operations. Documents are JSON objects carrying the
/// backend's `$id` and `$createdAt` metadata next to their data fields.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, collection: Collection, data: Map<String, Value>) -> Result<Value>;
    async fn list_documents(&self, collection: Collection) -> Result<Vec<Value>>;
    async fn get_document(&self, collection: Collection, id: &str) -> Result<Option<Value>>;
    async fn update_document(&self, collection: Collection, id: &str, data: Map<String, Value>) -> Result<Value>;
    async fn delete_document(&self, collection: Collection, id: &str) -> Result<()>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload_file(&self, file_name: &str, content_type: &str, bytes: Vec<u8>) -> Result<StoredFile>;
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;
    async fn delete_file(&self, file_id: &str) -> Result<()>;
    fn file_view_url(&self, file_id: &str) -> String;
}

pub fn unique_id() -> String {
    // Appwrite accepts up to 36 chars of [a-zA-Z0-9_-]
    Uuid::new_v4().simple().to_string()[..20].to_string()
}

/// In-process stand-in for the hosted backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: DashMap<Collection, Vec<Value>>,
    files: DashMap<String, (String, Vec<u8>)>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

fn document_id(doc: &Value) -> Option<&str> {
    doc.get("$id").and_then(Value::as_str)
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn create_document(&self, collection: Collection, mut data: Map<String, Value>) -> Result<Value> {
        data.insert("$id".to_string(), Value::String(unique_id()));
        data.insert("$createdAt".to_string(), Value::String(Utc::now().to_rfc3339()));
        let doc = Value::Object(data);
        self.documents.entry(collection).or_default().push(doc.clone());
        Ok(doc)
    }

    async fn list_documents(&self, collection: Collection) -> Result<Vec<Value>> {
        Ok(self
            .documents
            .get(&collection)
            .map(|docs| docs.value().clone())
            .unwrap_or_default())
    }

    async fn get_document(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        Ok(self.documents.get(&collection).and_then(|docs| {
            docs.iter().find(|doc| document_id(doc) == Some(id)).cloned()
        }))
    }

    async fn update_document(&self, collection: Collection, id: &str, data: Map<String, Value>) -> Result<Value> {
        let mut docs = self.documents.entry(collection).or_default();
        let doc = docs
            .iter_mut()
            .find(|doc| document_id(doc) == Some(id))
            .ok_or_else(|| AppError::NotFound(format!("Document {}", id)))?;
        if let Value::Object(fields) = doc {
            for (key, value) in data {
                fields.insert(key, value);
            }
        }
        Ok(doc.clone())
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<()> {
        let mut docs = self.documents.entry(collection).or_default();
        let before = docs.len();
        docs.retain(|doc| document_id(doc) != Some(id));
        if docs.len() == before {
            return Err(AppError::NotFound(format!("Document {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for MemoryBackend {
    async fn upload_file(&self, file_name: &str, _content_type: &str, bytes: Vec<u8>) -> Result<StoredFile> {
        let file_id = unique_id();
        self.files.insert(file_id.clone(), (file_name.to_string(), bytes));
        Ok(StoredFile {
            view_url: self.file_view_url(&file_id),
            file_id,
        })
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        self.files
            .get(file_id)
            .map(|entry| entry.value().1.clone())
            .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.files
            .remove(file_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))
    }

    fn file_view_url(&self, file_id: &str) -> String {
        format!("memory://files/{}/view", file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[actix_rt::test]
    async fn memory_documents_keep_insertion_order() {
        let backend = MemoryBackend::new();
        let a = backend.create_document(Collection::Students, fields(json!({"USN": "A"}))).await.unwrap();
        backend.create_document(Collection::Students, fields(json!({"USN": "B"}))).await.unwrap();

        let listed = backend.list_documents(Collection::Students).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["USN"], "A");
        assert_eq!(listed[1]["USN"], "B");
        assert!(backend.list_documents(Collection::Workshops).await.unwrap().is_empty());

        let id = a["$id"].as_str().unwrap();
        assert_eq!(backend.get_document(Collection::Students, id).await.unwrap().unwrap()["USN"], "A");
    }

    #[actix_rt::test]
    async fn memory_update_merges_fields() {
        let backend = MemoryBackend::new();
        let doc = backend
            .create_document(Collection::Workshops, fields(json!({"workshopName": "Rust", "students": []})))
            .await
            .unwrap();
        let id = doc["$id"].as_str().unwrap();
        let updated = backend
            .update_document(Collection::Workshops, id, fields(json!({"students": ["s1"]})))
            .await
            .unwrap();
        assert_eq!(updated["workshopName"], "Rust");
        assert_eq!(updated["students"], json!(["s1"]));

        backend.delete_document(Collection::Workshops, id).await.unwrap();
        assert!(matches!(
            backend.delete_document(Collection::Workshops, id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[actix_rt::test]
    async fn memory_files_round_trip() {
        let backend = MemoryBackend::new();
        let stored = backend.upload_file("t.png", "image/png", vec![1, 2, 3]).await.unwrap();
        assert!(stored.view_url.contains(&stored.file_id));
        assert_eq!(backend.download_file(&stored.file_id).await.unwrap(), vec![1, 2, 3]);
        backend.delete_file(&stored.file_id).await.unwrap();
        assert_eq!(backend.file_count(), 0);
    }
}
