use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::backend::{unique_id, Collection, DocumentStore, FileStore, StoredFile};
use crate::config::AppwriteConfig;
use crate::error::{AppError, Result};

const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct DocumentList {
    total: usize,
    documents: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    #[serde(rename = "$id")]
    id: String,
}

/// REST client for the hosted Appwrite database and storage bucket.
pub struct AppwriteClient {
    pub client: reqwest::Client,
    config: AppwriteConfig,
}

impl AppwriteClient {
    pub fn new(config: AppwriteConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn collection_id(&self, collection: Collection) -> &str {
        match collection {
            Collection::Students => &self.config.students_collection_id,
            Collection::Workshops => &self.config.workshops_collection_id,
        }
    }

    fn documents_url(&self, collection: Collection) -> String {
        format!(
            "{}/databases/{}/collections/{}/documents",
            self.config.endpoint,
            self.config.database_id,
            self.collection_id(collection)
        )
    }

    fn document_url(&self, collection: Collection, id: &str) -> String {
        format!("{}/{}", self.documents_url(collection), urlencoding::encode(id))
    }

    fn file_url(&self, file_id: &str) -> String {
        format!(
            "{}/storage/buckets/{}/files/{}",
            self.config.endpoint,
            self.config.bucket_id,
            urlencoding::encode(file_id)
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("X-Appwrite-Project", &self.config.project_id)
            .header("X-Appwrite-Key", &self.config.api_key)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await?;
        tracing::warn!("Appwrite API error {}: {}", status, message);
        Err(AppError::BackendApi { status, message })
    }
}

/// Query strings in the JSON form Appwrite 1.5+ expects.
fn page_queries(offset: usize) -> Vec<(&'static str, String)> {
    vec![
        ("queries[]", json!({"method": "limit", "values": [PAGE_SIZE]}).to_string()),
        ("queries[]", json!({"method": "offset", "values": [offset]}).to_string()),
    ]
}

#[async_trait]
impl DocumentStore for AppwriteClient {
    async fn create_document(&self, collection: Collection, data: Map<String, Value>) -> Result<Value> {
        let response = self
            .request(reqwest::Method::POST, &self.documents_url(collection))
            .json(&json!({ "documentId": unique_id(), "data": data }))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn list_documents(&self, collection: Collection) -> Result<Vec<Value>> {
        let url = self.documents_url(collection);
        let mut documents = Vec::new();
        loop {
            let response = self
                .request(reqwest::Method::GET, &url)
                .query(&page_queries(documents.len()))
                .send()
                .await?;
            let page: DocumentList = Self::check(response).await?.json().await?;
            let fetched = page.documents.len();
            documents.extend(page.documents);
            if fetched < PAGE_SIZE || documents.len() >= page.total {
                break;
            }
        }
        tracing::debug!("Listed {} documents from {:?}", documents.len(), collection);
        Ok(documents)
    }

    async fn get_document(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let response = self
            .request(reqwest::Method::GET, &self.document_url(collection, id))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::check(response).await?.json().await?))
    }

    async fn update_document(&self, collection: Collection, id: &str, data: Map<String, Value>) -> Result<Value> {
        let response = self
            .request(reqwest::Method::PATCH, &self.document_url(collection, id))
            .json(&json!({ "data": data }))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, &self.document_url(collection, id))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl FileStore for AppwriteClient {
    async fn upload_file(&self, file_name: &str, content_type: &str, bytes: Vec<u8>) -> Result<StoredFile> {
        let url = format!("{}/storage/buckets/{}/files", self.config.endpoint, self.config.bucket_id);
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = Form::new().text("fileId", unique_id()).part("file", part);

        let response = self
            .request(reqwest::Method::POST, &url)
            .multipart(form)
            .send()
            .await?;
        let uploaded: FileResponse = Self::check(response).await?.json().await?;
        tracing::info!("Uploaded {} to bucket as {}", file_name, uploaded.id);
        Ok(StoredFile {
            view_url: self.file_view_url(&uploaded.id),
            file_id: uploaded.id,
        })
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/download", self.file_url(file_id));
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, &self.file_url(file_id))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    fn file_view_url(&self, file_id: &str) -> String {
        format!(
            "{}/view?project={}",
            self.file_url(file_id),
            urlencoding::encode(&self.config.project_id)
        )
    }
}
