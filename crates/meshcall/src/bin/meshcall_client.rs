//! Headless mesh call client
//!
//! Joins a room with synthetic capture tracks, negotiates real WebRTC
//! connections with every member and logs the call events.
//!
//! # Usage
//!
//! ```bash
//! # Join room "abc" on a local server
//! cargo run --bin meshcall_client -- --room abc --name Bot
//!
//! # Join as owner through TURN, caching the avatar first
//! cargo run --bin meshcall_client -- \
//!   --server-url wss://call.example.com \
//!   --api-base-url https://call.example.com \
//!   --room abc --uid 42 --owner-link \
//!   --avatar https://cdn.example.com/42.png \
//!   --turn-servers turn:turn.example.com:3478:user:pass
//! ```

use anyhow::Context;
use clap::Parser;
use meshcall::{
    api::ApiClient,
    config::{CallConfig, TurnServerConfig, VideoCodec},
    media::SyntheticCapture,
    peer::WebRtcConnectionFactory,
    session::{self, CallEvent},
    Identity,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Mesh call client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Signaling server base URL (ws:// or wss://)
    #[arg(long, default_value = "ws://localhost:8000", env = "MESHCALL_SERVER_URL")]
    server_url: String,

    /// Auxiliary HTTP base URL (avatar cache, recording)
    #[arg(long, env = "MESHCALL_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Room to join
    #[arg(long, env = "MESHCALL_ROOM")]
    room: String,

    /// Display name
    #[arg(long, default_value = "Guest", env = "MESHCALL_NAME")]
    name: String,

    /// User id (empty when unknown)
    #[arg(long, default_value = "", env = "MESHCALL_UID")]
    uid: String,

    /// Avatar URL
    #[arg(long, default_value = "", env = "MESHCALL_AVATAR")]
    avatar: String,

    /// Join through the owner link
    #[arg(long, default_value_t = false, env = "MESHCALL_OWNER_LINK")]
    owner_link: bool,

    /// Chat receiving finished recordings (defaults to the user id)
    #[arg(long, default_value = "", env = "MESHCALL_CHAT_ID")]
    chat_id: String,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302",
        env = "MESHCALL_STUN_SERVERS"
    )]
    stun_servers: Vec<String>,

    /// TURN servers (format: turn:host:port:username:password, comma-separated)
    #[arg(long, value_delimiter = ',', env = "MESHCALL_TURN_SERVERS")]
    turn_servers: Vec<String>,

    /// Video codec: vp8, vp9, h264
    #[arg(long, default_value = "vp8", env = "MESHCALL_VIDEO_CODEC")]
    video_codec: VideoCodecArg,

    /// Share the (synthetic) screen right after joining
    #[arg(long, default_value_t = false)]
    share_screen: bool,
}

/// Video codec CLI argument wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum VideoCodecArg {
    Vp8,
    Vp9,
    H264,
}

impl From<VideoCodecArg> for VideoCodec {
    fn from(arg: VideoCodecArg) -> Self {
        match arg {
            VideoCodecArg::Vp8 => VideoCodec::VP8,
            VideoCodecArg::Vp9 => VideoCodec::VP9,
            VideoCodecArg::H264 => VideoCodec::H264,
        }
    }
}

/// Parse TURN server string (format: turn:host:port:username:password or turns:...)
fn parse_turn_server(s: &str) -> Result<TurnServerConfig, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 5 {
        return Err(format!(
            "Invalid TURN server format: '{}'. Expected: turn:host:port:username:password",
            s
        ));
    }

    let protocol = parts[0];
    if protocol != "turn" && protocol != "turns" {
        return Err(format!(
            "Invalid TURN protocol: '{}'. Expected 'turn' or 'turns'",
            protocol
        ));
    }

    // Password may contain colons
    Ok(TurnServerConfig {
        url: format!("{}:{}:{}", protocol, parts[1], parts[2]),
        username: parts[3].to_string(),
        credential: parts[4..].join(":"),
    })
}

fn build_config(args: &Args) -> anyhow::Result<CallConfig> {
    let mut turn_servers = Vec::new();
    for turn in &args.turn_servers {
        let turn = parse_turn_server(turn).map_err(anyhow::Error::msg)?;
        info!("Adding TURN server: {} (user: {})", turn.url, turn.username);
        turn_servers.push(turn);
    }

    let config = CallConfig {
        server_url: args.server_url.clone(),
        api_base_url: args.api_base_url.clone(),
        stun_servers: args.stun_servers.clone(),
        turn_servers,
        video_codec: args.video_codec.into(),
    };
    config.validate()?;
    Ok(config)
}

fn build_identity(args: &Args) -> Identity {
    let chat_id = if args.chat_id.is_empty() {
        args.uid.clone()
    } else {
        args.chat_id.clone()
    };

    Identity {
        display_name: args.name.clone(),
        user_id: args.uid.clone(),
        avatar_url: args.avatar.clone(),
        is_owner_by_link: args.owner_link,
        chat_id,
        info: serde_json::json!({ "client": "meshcall", "version": env!("CARGO_PKG_VERSION") }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        room = %args.room,
        "meshcall client starting"
    );

    let config = build_config(&args).context("invalid configuration")?;
    let mut identity = build_identity(&args);

    if let Some(api_base) = &config.api_base_url {
        let api = ApiClient::new(api_base)?;
        if api.cache_identity_avatar(&mut identity).await {
            info!("Using cached avatar {}", identity.avatar_url);
        }
    }

    let factory = Arc::new(WebRtcConnectionFactory::new(Arc::new(config.clone())));
    let device = Arc::new(SyntheticCapture::new(config.video_codec));

    let mut call = session::join(&config, &args.room, identity, factory, device)
        .await
        .with_context(|| format!("failed to join room {}", args.room))?;

    if args.share_screen {
        call.handle.start_screen_share().await?;
    }

    loop {
        tokio::select! {
            event = call.events.recv() => match event {
                Some(event) => {
                    let done = matches!(event, CallEvent::Left | CallEvent::Disconnected);
                    log_event(&event);
                    if done {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, hanging up");
                if let Err(e) = call.handle.hangup().await {
                    warn!("Hangup failed: {}", e);
                }
            }
        }
    }

    call.task.await.context("session task panicked")?;
    info!("meshcall client stopped");
    Ok(())
}

fn log_event(event: &CallEvent) {
    match event {
        CallEvent::PeerAdded(peer) => info!(
            peer_id = %peer.peer_id,
            name = %peer.display_name,
            owner = peer.is_owner,
            "peer added"
        ),
        CallEvent::PeerRemoved { peer_id } => info!(peer_id = %peer_id, "peer removed"),
        CallEvent::TrackUpdated { peer_id, media } => info!(
            peer_id = %peer_id,
            stream = %media.stream_id,
            audio = media.audio.is_some(),
            video = media.video.is_some(),
            "remote media updated"
        ),
        CallEvent::StageChanged { target, meta } => {
            info!(stage = %target, name = %meta.name, "stage changed")
        }
        CallEvent::ServerError(message) => warn!("server error: {}", message),
        CallEvent::CallTimerStopped { duration } => {
            info!("call timer stopped after {}s", duration.as_secs())
        }
        other => info!("{:?}", other),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("meshcall=info,meshcall_client=info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
