//! Configuration types for the call client

use serde::{Deserialize, Serialize};

/// Main configuration for a call session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Signaling server base URL (ws:// or wss://); rooms live under `/ws/{room_id}`
    pub server_url: String,

    /// Base URL of the auxiliary HTTP services (avatar cache, recording)
    pub api_base_url: Option<String>,

    /// STUN server URLs
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Video codec used for locally produced tracks (default: VP8)
    pub video_codec: VideoCodec,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Supported video codecs for local tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    /// VP8 codec (default, universally supported by browsers)
    VP8,
    /// VP9 codec
    VP9,
    /// H.264 codec
    H264,
}

impl VideoCodec {
    /// RTP mime type for this codec
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodec::VP8 => "video/VP8",
            VideoCodec::VP9 => "video/VP9",
            VideoCodec::H264 => "video/H264",
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8000".to_string(),
            api_base_url: None,
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            video_codec: VideoCodec::VP8,
        }
    }
}

impl CallConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `server_url` is not a ws:// or wss:// URL
    /// - `api_base_url` is set but not an http:// or https:// URL
    /// - a STUN URL does not start with `stun:`/`stuns:`
    /// - a TURN URL does not start with `turn:`/`turns:`
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "server_url must start with ws:// or wss://, got {}",
                self.server_url
            )));
        }
        url::Url::parse(&self.server_url)
            .map_err(|e| Error::InvalidConfig(format!("server_url is not a URL: {}", e)))?;

        if let Some(api) = &self.api_base_url {
            if !api.starts_with("http://") && !api.starts_with("https://") {
                return Err(Error::InvalidConfig(format!(
                    "api_base_url must start with http:// or https://, got {}",
                    api
                )));
            }
        }

        for stun in &self.stun_servers {
            if !stun.starts_with("stun:") && !stun.starts_with("stuns:") {
                return Err(Error::InvalidConfig(format!(
                    "STUN server must start with stun: or stuns:, got {}",
                    stun
                )));
            }
        }

        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN server must start with turn: or turns:, got {}",
                    turn.url
                )));
            }
        }

        Ok(())
    }

    /// WebSocket URL of a room: `{server_url}/ws/{room_id}`
    ///
    /// The room id is pushed as a single path segment, so characters such as
    /// `/` or spaces are percent-encoded.
    pub fn room_url(&self, room_id: &str) -> crate::Result<url::Url> {
        use crate::Error;

        let mut url = url::Url::parse(&self.server_url)
            .map_err(|e| Error::InvalidConfig(format!("server_url is not a URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidConfig("server_url cannot carry a path".to_string()))?
            .pop_if_empty()
            .push("ws")
            .push(room_id);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CallConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_server_url_fails() {
        let mut config = CallConfig::default();
        config.server_url = "http://localhost:8000".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_api_base_url_fails() {
        let mut config = CallConfig::default();
        config.api_base_url = Some("ftp://example.com".to_string());
        assert!(config.validate().is_err());

        config.api_base_url = Some("https://example.com".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_turn_url_fails() {
        let mut config = CallConfig::default();
        config.turn_servers.push(TurnServerConfig {
            url: "stun:turn.example.com:3478".to_string(),
            username: "u".to_string(),
            credential: "p".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_stun_servers_allowed() {
        let mut config = CallConfig::default();
        config.stun_servers.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_room_url() {
        let config = CallConfig {
            server_url: "wss://call.example.com".to_string(),
            ..Default::default()
        };
        let url = config.room_url("abc").unwrap();
        assert_eq!(url.as_str(), "wss://call.example.com/ws/abc");

        let url = config.room_url("team room/1").unwrap();
        assert_eq!(url.as_str(), "wss://call.example.com/ws/team%20room%2F1");
    }

    #[test]
    fn test_config_serialization() {
        let config = CallConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: CallConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.server_url, deserialized.server_url);
        assert_eq!(config.video_codec, deserialized.video_codec);
    }
}
