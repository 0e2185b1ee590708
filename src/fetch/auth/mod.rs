//! Credential decorators for [`HttpClient`](crate::fetch::HttpClient).
//!
//! Transit agencies hand out feed keys either as a query parameter (TriMet's
//! `appID`) or as a request header.

mod api_key;
mod url_param;

pub use api_key::ApiKey;
pub use url_param::UrlParam;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::fetch::HttpClient;

    /// Records the last request instead of sending it.
    #[derive(Default)]
    pub struct Recorder {
        pub last: Mutex<Option<(String, Vec<(String, String)>)>>,
    }

    #[async_trait]
    impl HttpClient for Recorder {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            let headers = req
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect();
            *self.last.lock().unwrap() = Some((req.url().to_string(), headers));
            Ok(axum::http::Response::new(String::new()).into())
        }
    }
}
