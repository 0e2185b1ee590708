use crate::fetch::client::HttpClient;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that injects an API key as an HTTP header.
///
/// The header name and value are validated once at construction so a bad
/// configuration fails at startup instead of on every poll.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())?;
        let mut value = HeaderValue::from_str(key)?;
        value.set_sensitive(true);
        Ok(Self {
            inner,
            header_name,
            value,
        })
    }

    /// Convenience constructor that uses `Authorization: Bearer <key>`.
    pub fn bearer(inner: C, key: &str) -> Result<Self> {
        Self::new(inner, "Authorization", &format!("Bearer {key}"))
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::auth::testing::Recorder;
    use crate::fetch::fetch_bytes;

    #[tokio::test]
    async fn test_header_is_injected() {
        let client = ApiKey::new(Recorder::default(), "x-api-key", "secret").unwrap();
        fetch_bytes(&client, "https://example.com/feed.pb").await.unwrap();

        let (_, headers) = client.inner.last.lock().unwrap().clone().unwrap();
        assert!(headers.contains(&("x-api-key".to_string(), "secret".to_string())));
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        assert!(ApiKey::new(Recorder::default(), "bad header", "secret").is_err());
    }

    #[tokio::test]
    async fn test_bearer_prefix() {
        let client = ApiKey::bearer(Recorder::default(), "tok").unwrap();
        fetch_bytes(&client, "https://example.com/").await.unwrap();

        let (_, headers) = client.inner.last.lock().unwrap().clone().unwrap();
        assert!(headers.contains(&("authorization".to_string(), "Bearer tok".to_string())));
    }
}
