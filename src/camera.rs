use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of camera the stream server exposes.
///
/// The wire carries a numeric code: 0 is a network (RTSP) camera, anything
/// else is a local webcam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraKind {
    Rtsp,
    Webcam,
}

impl CameraKind {
    fn from_code(code: i64) -> Self {
        if code == 0 {
            CameraKind::Rtsp
        } else {
            CameraKind::Webcam
        }
    }
}

impl std::fmt::Display for CameraKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraKind::Rtsp => write!(f, "RTSP"),
            CameraKind::Webcam => write!(f, "Webcam"),
        }
    }
}

/// A camera known to the stream server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Camera {
    pub name: String,
    pub kind: CameraKind,
}

/// Operations the dispatcher needs from the stream server.
///
/// Errors from these calls are never fatal: the caller logs them and carries
/// on with empty data.
#[async_trait]
pub trait CameraControl: Send + Sync {
    /// All cameras currently registered with the server.
    async fn list_cameras(&self) -> Result<Vec<Camera>>;

    /// The camera that is broadcasting right now, if any.
    async fn get_active(&self) -> Result<Option<Camera>>;

    /// Make the named camera active. Fire-and-forget.
    async fn select_camera(&self, name: &str) -> Result<()>;

    /// Tell the server the public watch URL of the running broadcast.
    async fn announce_broadcast(&self, url: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SelectCameraRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct AnnounceBroadcastRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct CameraListResponse {
    names: Vec<String>,
    types: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct ActiveCameraResponse {
    name: String,
    #[serde(rename = "type")]
    kind: i64,
}

/// Decode the `/get-cameras` payload: parallel `names` / `types` arrays.
fn parse_cameras(body: &str) -> Result<Vec<Camera>> {
    let decoded: CameraListResponse =
        serde_json::from_str(body).context("Stream server returned bad data for get-cameras")?;

    Ok(decoded
        .names
        .into_iter()
        .zip(decoded.types)
        .map(|(name, code)| Camera {
            name,
            kind: CameraKind::from_code(code),
        })
        .collect())
}

/// Decode the `/get-active` payload. An empty name means no camera is active.
fn parse_active(body: &str) -> Result<Option<Camera>> {
    let decoded: ActiveCameraResponse =
        serde_json::from_str(body).context("Stream server returned bad data for get-active")?;

    if decoded.name.is_empty() {
        return Ok(None);
    }

    Ok(Some(Camera {
        name: decoded.name,
        kind: CameraKind::from_code(decoded.kind),
    }))
}

/// HTTP client for the remote stream server.
pub struct CameraClient {
    http: reqwest::Client,
    base_url: String,
}

impl CameraClient {
    pub fn new(host: &str, port: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("http://{}:{}", host, port),
        }
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach stream server at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Stream server error ({}) for {}", status, path);
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read stream server response for {}", path))
    }
}

#[async_trait]
impl CameraControl for CameraClient {
    async fn list_cameras(&self) -> Result<Vec<Camera>> {
        let body = self.get_text("/get-cameras").await?;
        parse_cameras(&body)
    }

    async fn get_active(&self) -> Result<Option<Camera>> {
        let body = self.get_text("/get-active").await?;
        parse_active(&body)
    }

    async fn select_camera(&self, name: &str) -> Result<()> {
        let url = format!("{}/select-camera", self.base_url);
        self.http
            .post(&url)
            .json(&SelectCameraRequest { name })
            .send()
            .await
            .context("Failed to send select-camera request")?;
        Ok(())
    }

    async fn announce_broadcast(&self, url: &str) -> Result<()> {
        let endpoint = format!("{}/set-broadcast", self.base_url);
        self.http
            .post(&endpoint)
            .json(&AnnounceBroadcastRequest { url })
            .send()
            .await
            .context("Failed to send set-broadcast request")?;
        Ok(())
    }
}
