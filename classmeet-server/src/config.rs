use classmeet_core::IceServerConfig;
use tracing::{info, warn};

/// Server configuration loaded at startup.
///
/// Every field can be set via an environment variable prefixed with
/// `CLASSMEET_`. Defaults suit local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// STUN server URLs handed to clients.
    pub stun_urls: Vec<String>,
    /// TURN relay URLs handed to clients, sharing one credential pair.
    pub turn_urls: Vec<String>,
    pub turn_username: Option<String>,
    pub turn_credential: Option<String>,

    /// HS256 secret shared with the auth service. Unset means open rooms.
    pub jwt_secret: Option<String>,

    /// `0` means unlimited.
    pub max_room_members: usize,
    pub command_buffer: usize,

    pub allowed_origins: String,
    /// Mount the Socket.IO transport next to `/ws`.
    pub socketio: bool,

    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            stun_urls: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_urls: Vec::new(),
            turn_username: None,
            turn_credential: None,
            jwt_secret: None,
            max_room_members: 0,
            command_buffer: 1024,
            allowed_origins: "*".to_string(),
            socketio: true,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, reading `.env` first
    /// if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] but reading variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ServerConfig::default();
        let env = Env(lookup);

        let jwt_secret = env.get("CLASSMEET_JWT_SECRET").filter(|s| !s.is_empty());

        ServerConfig {
            bind_addr: env.or("CLASSMEET_BIND_ADDR", &defaults.bind_addr),
            stun_urls: env.csv("CLASSMEET_STUN_URLS", defaults.stun_urls),
            turn_urls: env.csv("CLASSMEET_TURN_URLS", defaults.turn_urls),
            turn_username: env.get("CLASSMEET_TURN_USERNAME"),
            turn_credential: env.get("CLASSMEET_TURN_CREDENTIAL"),
            jwt_secret,
            max_room_members: env.parsed("CLASSMEET_MAX_ROOM_MEMBERS", defaults.max_room_members),
            command_buffer: env.parsed("CLASSMEET_COMMAND_BUFFER", defaults.command_buffer),
            allowed_origins: env.or("CLASSMEET_ALLOWED_ORIGINS", &defaults.allowed_origins),
            socketio: env.bool("CLASSMEET_SOCKETIO", defaults.socketio),
            log_level: env.or("CLASSMEET_LOG_LEVEL", &defaults.log_level),
            log_format: match env.get("CLASSMEET_LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }

    /// ICE servers advertised to clients in `ice_config` and `/ice-servers`.
    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        let mut servers: Vec<IceServerConfig> = self
            .stun_urls
            .iter()
            .map(|url| IceServerConfig {
                urls: vec![url.clone()],
                username: None,
                credential: None,
            })
            .collect();

        if !self.turn_urls.is_empty() {
            servers.push(IceServerConfig {
                urls: self.turn_urls.clone(),
                username: self.turn_username.clone(),
                credential: self.turn_credential.clone(),
            });
        }

        servers
    }

    pub fn log_summary(&self) {
        info!("──── ClassMeet Configuration ────");
        info!("  bind_addr         : {}", self.bind_addr);
        info!("  stun_urls         : {:?}", self.stun_urls);
        info!("  turn_urls         : {:?}", self.turn_urls);
        info!(
            "  join auth         : {}",
            if self.jwt_secret.is_some() { "bearer token" } else { "open" }
        );
        info!(
            "  max_room_members  : {}",
            if self.max_room_members == 0 {
                "unlimited".to_string()
            } else {
                self.max_room_members.to_string()
            }
        );
        info!("  command_buffer    : {}", self.command_buffer);
        info!("  socketio          : {}", self.socketio);
        info!(
            "  cors_origins      : {}",
            if self.allowed_origins == "*" {
                "* (permissive)"
            } else {
                &self.allowed_origins
            }
        );
        info!("  log_level         : {}", self.log_level);
        info!("─────────────────────────────────");

        if self.turn_urls.is_empty() {
            warn!("No TURN server configured, clients behind symmetric NAT will fail to connect");
        }
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
            None => default,
        }
    }

    fn csv(&self, key: &str, defaults: Vec<String>) -> Vec<String> {
        match self.get(key) {
            Some(v) if !v.is_empty() => v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => defaults,
        }
    }

    fn parsed<T: std::str::FromStr + Copy>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(key, value = %raw, "unparsable value, using default");
                default
            }),
            None => default,
        }
    }
}
