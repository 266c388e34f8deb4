//! Shared REST plumbing for venue adapters.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::VenueError;

/// Client used by all adapters: pooled, keep-alive, strict timeout so a
/// slow venue cannot stall its polling task past one cadence.
pub fn build_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .user_agent(concat!("spreadbot/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// GET a JSON document, classifying HTTP failures into [`VenueError`].
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    params: &[(&str, &str)],
) -> Result<T, VenueError> {
    debug!(url, "venue GET");
    let mut req = client.get(url);
    if !params.is_empty() {
        req = req.query(params);
    }
    let resp = req.send().await.map_err(VenueError::from_reqwest)?;

    let status = resp.status();
    if status.as_u16() == 429 || status.as_u16() == 403 {
        return Err(VenueError::RateLimited {
            status: status.as_u16(),
        });
    }
    if status.is_server_error() {
        return Err(VenueError::Server {
            status: status.as_u16(),
        });
    }
    let resp = resp
        .error_for_status()
        .map_err(VenueError::from_reqwest)?;

    resp.json::<T>().await.map_err(VenueError::from_reqwest)
}
