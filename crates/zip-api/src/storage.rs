use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

/// Bucket holding listing photos.
pub const PROPERTY_FILES_BUCKET: &str = "property.files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUpload {
    pub path: String,
    pub token: String,
}

/// Issues short-lived direct-upload grants for object storage.
#[async_trait]
pub trait UploadSigner: Send + Sync {
    async fn create_signed_upload_url(&self, path: &str) -> Result<SignedUpload>;

    fn public_url(&self, path: &str) -> String;
}

/// Supabase Storage, authenticated with the service-role key.
pub struct SupabaseStorage {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

#[derive(Deserialize)]
struct SignResponse {
    url: String,
}

impl SupabaseStorage {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            bucket: PROPERTY_FILES_BUCKET.to_string(),
        }
    }
}

#[async_trait]
impl UploadSigner for SupabaseStorage {
    async fn create_signed_upload_url(&self, path: &str) -> Result<SignedUpload> {
        let resp = self
            .client
            .post(format!("{}/storage/v1/object/upload/sign/{}/{}", self.base_url, self.bucket, path))
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("apikey", &self.service_key)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("signed upload request failed ({}): {}", status, body);
        }

        let signed: SignResponse = resp.json().await?;
        let token = token_from_signed_url(&self.base_url, &signed.url)?;

        Ok(SignedUpload { path: path.to_string(), token })
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, path)
    }
}

/// The sign endpoint answers with a storage-relative URL carrying the grant
/// in its `token` query parameter.
fn token_from_signed_url(base_url: &str, signed_url: &str) -> Result<String> {
    let url = Url::parse(&format!("{}/storage/v1{}", base_url, signed_url))?;
    url.query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| anyhow!("signed upload URL carried no token"))
}

/// Used when no storage credentials are configured.
pub struct UnconfiguredStorage;

#[async_trait]
impl UploadSigner for UnconfiguredStorage {
    async fn create_signed_upload_url(&self, _path: &str) -> Result<SignedUpload> {
        bail!("object storage is not configured (set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY)")
    }

    fn public_url(&self, path: &str) -> String {
        path.to_string()
    }
}
