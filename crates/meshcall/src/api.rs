//! Client for the auxiliary HTTP services: avatar cache and recording upload

use crate::identity::Identity;
use crate::{Error, Result};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// HTTP client for the call server's REST endpoints
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: url::Url,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CacheAvatarRequest<'a> {
    uid: &'a str,
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct CacheAvatarResponse {
    avatar: String,
}

/// Server-side recording session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordingSession {
    /// Recording id used by chunk and finish calls
    pub recording_id: String,
    /// Server start time (seconds, as a string)
    pub started_ts: String,
}

#[derive(Debug, Deserialize)]
struct FinishResponse {
    url: String,
}

impl ApiClient {
    /// Create a client for `base_url` (http:// or https://)
    pub fn new(base_url: &str) -> Result<Self> {
        let base = url::Url::parse(base_url)
            .map_err(|e| Error::InvalidConfig(format!("api base url is not a URL: {}", e)))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(Error::InvalidConfig(format!(
                "api base url must be http or https, got {}",
                base_url
            )));
        }

        Ok(Self {
            base,
            http: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<url::Url> {
        self.base
            .join(path)
            .map_err(|e| Error::InvalidConfig(format!("bad endpoint {}: {}", path, e)))
    }

    /// Ask the server to cache a remote avatar; returns its local web path
    pub async fn cache_avatar(&self, uid: &str, avatar_url: &str) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint("/avatar/cache")?)
            .json(&CacheAvatarRequest {
                uid,
                url: avatar_url,
            })
            .send()
            .await?
            .error_for_status()?;

        let body: CacheAvatarResponse = response.json().await?;
        debug!("Avatar for {} cached at {}", uid, body.avatar);
        Ok(body.avatar)
    }

    /// Rewrite the identity's avatar to the cached copy
    ///
    /// Only http(s) avatars of identities with a user id are cached. Failures
    /// keep the original URL. Returns true when the avatar was rewritten.
    pub async fn cache_identity_avatar(&self, identity: &mut Identity) -> bool {
        let cacheable = identity.avatar_url.starts_with("http://")
            || identity.avatar_url.starts_with("https://");
        if identity.user_id.is_empty() || !cacheable {
            return false;
        }

        match self
            .cache_avatar(&identity.user_id, &identity.avatar_url)
            .await
        {
            Ok(path) if !path.is_empty() => {
                identity.avatar_url = path;
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Avatar cache failed for {}: {}", identity.user_id, e);
                false
            }
        }
    }

    /// Open a server-side recording
    pub async fn start_recording(
        &self,
        room_id: &str,
        owner_uid: &str,
        chat_id: &str,
    ) -> Result<RecordingSession> {
        let form = Form::new()
            .text("room_id", room_id.to_string())
            .text("owner_uid", owner_uid.to_string())
            .text("chat_id", chat_id.to_string());

        let response = self
            .http
            .post(self.endpoint("/record/start")?)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let session: RecordingSession = response.json().await?;
        info!("Recording {} started", session.recording_id);
        Ok(session)
    }

    /// Upload one WebM chunk
    pub async fn upload_chunk(&self, recording_id: &str, seq: u64, chunk: Vec<u8>) -> Result<()> {
        let part = Part::bytes(chunk)
            .file_name(format!("chunk-{}.webm", seq))
            .mime_str("video/webm")?;
        let form = Form::new()
            .text("recording_id", recording_id.to_string())
            .text("seq", seq.to_string())
            .part("file", part);

        self.http
            .post(self.endpoint("/record/chunk")?)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        debug!("Uploaded chunk {} of {}", seq, recording_id);
        Ok(())
    }

    /// Finalize a recording; returns the URL of the finished file
    pub async fn finish_recording(
        &self,
        recording_id: &str,
        send_to_bot: bool,
        owner_uid: &str,
        chat_id: &str,
    ) -> Result<String> {
        let form = Form::new()
            .text("recording_id", recording_id.to_string())
            .text("send_to_bot", if send_to_bot { "1" } else { "0" })
            .text("owner_uid", owner_uid.to_string())
            .text("chat_id", chat_id.to_string());

        let response = self
            .http
            .post(self.endpoint("/record/finish")?)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let body: FinishResponse = response.json().await?;
        info!("Recording {} finished: {}", recording_id, body.url);
        Ok(body.url)
    }
}
