//! Client side of the query endpoint.

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::HubResult;
use crate::protocol::{stream_base, stream_url};

/// A camera advertised by a running hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableStream {
    pub name: String,
    pub stream_url: Url,
}

/// Fetch `/list_cameras` from `server` and pair each name with its stream URL.
pub async fn list_available_cameras(
    server: &Url,
    stream_host: &str,
    stream_port: u16,
) -> HubResult<Vec<AvailableStream>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let url = server.join("/list_cameras")?;
    debug!("Fetching {url}");

    let names: Vec<String> = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let base = stream_base(stream_host, stream_port)?;
    Ok(names
        .into_iter()
        .map(|name| AvailableStream {
            stream_url: stream_url(&base, &name),
            name,
        })
        .collect())
}
