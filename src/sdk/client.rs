use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use crate::{
    BlobIngestor, Document, DocumentReader, DocumentWriter, Error, Result, SaveReceipt, SnapshotInfo,
    StoreInspector, StoreStatus, UploadRecord,
};

/// Remote [`crate::SyncStore`] speaking to a DocVault daemon over HTTP.
pub struct Client {
    base: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct UploadReply {
    record: UploadRecord,
}

impl Client {
    /// Builds a client for `addr` (`host:port` or a full `http://` URL) without contacting it.
    pub fn new(addr: &str) -> Self {
        let addr = addr.trim_end_matches('/');
        let base = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };
        Self {
            base,
            http: reqwest::Client::new(),
        }
    }

    /// Builds a client and checks that the daemon answers `/api/status`.
    pub async fn connect(addr: &str) -> Result<Self> {
        let client = Self::new(addr);
        client.status().await?;
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Fetches a raw file through `/files/<path>`.
    pub async fn fetch_file(&self, path: &str) -> Result<Vec<u8>> {
        let resp = self.http.get(self.url(&format!("/files/{}", path))).send().await?;
        let resp = check(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    pub async fn load_typed<T: DeserializeOwned>(&self) -> Result<T> {
        let doc = self.load().await?;
        Ok(serde_json::from_value(doc)?)
    }

    pub async fn save_typed<T: Serialize>(&self, value: &T, label: &str, actor: &str) -> Result<SaveReceipt> {
        let doc = serde_json::to_value(value)?;
        self.save(doc, label, actor).await
    }
}

/// Maps non-success responses onto [`Error`]. 409 is the only one with its own variant.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::CONFLICT {
        return Err(Error::Busy);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    Err(Error::Internal(format!("{}: {}", status, message)))
}

#[async_trait]
impl DocumentReader for Client {
    async fn load(&self) -> Result<Document> {
        let resp = self.http.get(self.url("/api/data")).send().await?;
        Ok(check(resp).await?.json().await?)
    }
}

#[async_trait]
impl DocumentWriter for Client {
    async fn save(&self, mut doc: Document, label: &str, actor: &str) -> Result<SaveReceipt> {
        if let Some(fields) = doc.as_object_mut() {
            fields.insert("currentUser".to_string(), json!({ "name": actor }));
        }
        let resp = self
            .http
            .post(self.url("/api/save"))
            .query(&[("label", label)])
            .json(&doc)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

#[async_trait]
impl BlobIngestor for Client {
    async fn ingest(&self, bytes: Vec<u8>, original_name: &str, category: &str) -> Result<UploadRecord> {
        let form = Form::new().part("file", Part::bytes(bytes).file_name(original_name.to_string()));
        let resp = self
            .http
            .post(self.url("/api/upload"))
            .query(&[("category", category)])
            .multipart(form)
            .send()
            .await?;
        let reply: UploadReply = check(resp).await?.json().await?;
        Ok(reply.record)
    }
}

#[async_trait]
impl StoreInspector for Client {
    async fn status(&self) -> Result<StoreStatus> {
        let resp = self.http.get(self.url("/api/status")).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn history(&self) -> Result<Vec<SnapshotInfo>> {
        let resp = self.http.get(self.url("/api/history")).send().await?;
        Ok(check(resp).await?.json().await?)
    }
}
