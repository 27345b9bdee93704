//! Wire types shared by the query service and the `list` client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::registry::CameraRegistryEntry;

/// Generic API response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

/// One registry entry as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSummary {
    pub name: String,
    pub device_path: String,
    pub in_use: bool,
    pub stream_url: Url,
}

impl CameraSummary {
    pub fn from_entry(entry: &CameraRegistryEntry, stream_base: &Url) -> Self {
        Self {
            name: entry.name.clone(),
            device_path: entry.device_path.clone(),
            in_use: entry.in_use,
            stream_url: stream_url(stream_base, &entry.name),
        }
    }
}

/// Registry-wide status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubStatus {
    pub camera_count: usize,
    pub streaming_count: usize,
    pub passes: u64,
    pub last_reconciled: Option<DateTime<Utc>>,
}

/// `rtsp://host:port/` base for stream URLs.
pub fn stream_base(host: &str, port: u16) -> Result<Url, url::ParseError> {
    Url::parse(&format!("rtsp://{host}:{port}/"))
}

/// Stream URL for a camera name under `base`.
pub fn stream_url(base: &Url, name: &str) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("/{name}"));
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url() {
        let base = stream_base("127.0.0.1", 8554).unwrap();
        assert_eq!(
            stream_url(&base, "camera_2").as_str(),
            "rtsp://127.0.0.1:8554/camera_2"
        );
    }

    #[test]
    fn test_api_response_envelope() {
        let ok = serde_json::to_value(ApiResponse::success(vec!["web"])).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["data"][0], "web");

        let err = serde_json::to_value(ApiResponse::<()>::error("nope".to_string())).unwrap();
        assert_eq!(err["success"], false);
        assert!(err["data"].is_null());
        assert_eq!(err["message"], "nope");
    }
}
