/// Protocol version string carried in the relay handshake
pub const PROTOCOL_VERSION: &str = "/tandem/1.0.0";

/// Application name
pub const APP_NAME: &str = "Tandem";

/// Trailing-edge typing debounce window in milliseconds
pub const TYPING_IDLE_MS: u64 = 1000;

/// Default STUN servers handed to the peer-connection layer
pub const DEFAULT_STUN_SERVERS: &[&str] = &["stun:stun.l.google.com:19302"];

/// Capacity of the relay/command/notification channels
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Maximum size of a single attachment in bytes (50 MiB)
pub const MAX_ATTACHMENT_BYTES: usize = 50 * 1024 * 1024;
