use crate::config::FetchConfig;
use crate::fetcher::build_client;
use crate::traits::ObjectStore;
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const STORAGE_SIGNING_KEY_SECRET: &str = "storage_signing_key";

type HmacSha256 = Hmac<Sha256>;

/// Bucket reached over plain HTTP: objects live at `{base}/{key}`.
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    signing_key: String,
}

impl HttpObjectStore {
    pub fn new(base_url: String, signing_key: String, fetch_config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(fetch_config)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            signing_key,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(key);
        debug!("Reading object {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::ObjectStorage(format!("GET {}: {}", key, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::ObjectStorage(format!(
                "GET {} returned HTTP {}",
                key,
                status.as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::ObjectStorage(format!("GET {}: {}", key, e)))?;
        Ok(bytes.to_vec())
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.object_url(key);
        let size = bytes.len();

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| PipelineError::ObjectStorage(format!("PUT {}: {}", key, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::ObjectStorage(format!(
                "PUT {} returned HTTP {}",
                key,
                status.as_u16()
            )));
        }

        info!("Uploaded {} ({} bytes)", key, size);
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<Url> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = sign(&self.signing_key, key, expires)?;

        let mut url = Url::parse(&self.object_url(key))?;
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url)
    }
}

/// `hex(hmac_sha256(secret, "{key}:{expires}"))`
pub fn sign(secret: &str, key: &str, expires: i64) -> Result<String> {
    hmac_hex(secret.as_bytes(), format!("{}:{}", key, expires).as_bytes())
}

fn hmac_hex(secret: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| PipelineError::ObjectStorage(format!("signing key rejected: {}", e)))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// In-process bucket for tests and dry runs.
pub struct MemoryObjectStore {
    base_url: Url,
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryObjectStore {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_object(self, key: &str, bytes: Vec<u8>) -> Self {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(key.to_string(), (bytes, "application/octet-stream".to_string()));
        }
        self
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).map(|(bytes, _)| bytes.clone()))
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).map(|(_, content_type)| content_type.clone()))
    }
}

fn poisoned() -> PipelineError {
    PipelineError::ObjectStorage("object store lock poisoned".to_string())
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .map_err(|_| poisoned())?
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| PipelineError::ObjectStorage(format!("no such object: {}", key)))
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.objects
            .lock()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<Url> {
        let mut url = self.base_url.join(key)?;
        url.query_pairs_mut()
            .append_pair("ttl", &ttl.as_secs().to_string());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_depends_on_every_part() {
        let base = sign("secret", "pokemon/1.png", 100).unwrap();
        assert_eq!(base.len(), 64);
        assert_eq!(base, sign("secret", "pokemon/1.png", 100).unwrap());
        assert_ne!(base, sign("other", "pokemon/1.png", 100).unwrap());
        assert_ne!(base, sign("secret", "pokemon/2.png", 100).unwrap());
        assert_ne!(base, sign("secret", "pokemon/1.png", 101).unwrap());
    }

    #[test]
    fn hmac_matches_rfc_4231_vector() {
        // Test case 2: short key, so no key hashing is involved.
        assert_eq!(
            hmac_hex(b"Jefe", b"what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn signature_is_not_a_plain_prefix_hash() {
        use sha2::Digest;

        let prefixed = hex::encode(Sha256::digest(b"secret:pokemon/1.png:100"));
        assert_ne!(sign("secret", "pokemon/1.png", 100).unwrap(), prefixed);
    }

    #[tokio::test]
    async fn presigned_url_expires_after_ttl() {
        let store = HttpObjectStore::new(
            "http://storage.local/bucket/".to_string(),
            "secret".to_string(),
            &FetchConfig::default(),
        )
        .unwrap();

        let before = Utc::now().timestamp();
        let url = store
            .presign_get("lastPublishedPokemonImage.png", Duration::from_secs(120))
            .await
            .unwrap();

        assert_eq!(url.path(), "/bucket/lastPublishedPokemonImage.png");
        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        let expires: i64 = pairs["expires"].parse().unwrap();
        assert!(expires >= before + 120 && expires <= before + 122);
        assert_eq!(
            pairs["signature"],
            sign("secret", "lastPublishedPokemonImage.png", expires).unwrap()
        );
    }

    #[tokio::test]
    async fn memory_store_round_trips_objects() {
        let store = MemoryObjectStore::new(Url::parse("http://memory.local/").unwrap());
        assert!(store.get_object("missing").await.is_err());

        store.put_object("a.png", vec![1, 2, 3], "image/png").await.unwrap();
        assert_eq!(store.get_object("a.png").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.content_type("a.png").as_deref(), Some("image/png"));
    }
}
