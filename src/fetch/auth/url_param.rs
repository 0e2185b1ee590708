use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that appends an API key as a URL query parameter.
pub struct UrlParam<C> {
    pub inner: C,
    pub param_name: String,
    pub key: String,
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(&self.param_name, &self.key);
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::auth::testing::Recorder;
    use crate::fetch::fetch_bytes;

    #[tokio::test]
    async fn test_key_is_appended_to_existing_query() {
        let client = UrlParam {
            inner: Recorder::default(),
            param_name: "appID".to_string(),
            key: "abc123".to_string(),
        };
        fetch_bytes(&client, "https://developer.trimet.org/ws/gtfs/VehiclePositions?x=1")
            .await
            .unwrap();

        let (url, _) = client.inner.last.lock().unwrap().clone().unwrap();
        assert_eq!(
            url,
            "https://developer.trimet.org/ws/gtfs/VehiclePositions?x=1&appID=abc123"
        );
    }
}
