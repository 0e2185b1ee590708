//! HTTP fetching for upstream feeds.
//!
//! [`HttpClient`] is the seam: [`BasicClient`] talks to the network and the
//! [`auth`] wrappers decorate any client with feed credentials.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Result, bail};
use tracing::debug;

/// Performs a GET and returns the body, failing on non-success statuses.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        bail!("GET {url} returned status {status}");
    }
    Ok(resp.bytes().await?.to_vec())
}

/// Loads feed bytes from an `http(s)://` URL or a local file path.
#[tracing::instrument(skip_all, fields(source = %source))]
pub async fn load_source<C: HttpClient + ?Sized>(client: &C, source: &str) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http") {
        fetch_bytes(client, source).await?
    } else {
        tokio::fs::read(source).await?
    };
    debug!(bytes = bytes.len(), "Feed bytes loaded");
    Ok(bytes)
}
