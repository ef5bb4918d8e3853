//! Two-party chat and call client core.
//!
//! Everything observable happens through [`client::spawn_client`]: local
//! actions go in as [`client::ClientCommand`]s, UI updates come out as
//! [`client::ClientNotification`]s, and the relay connection plus media
//! collaborators are injected as traits.

pub mod client;
pub mod config;
pub mod ledger;
pub mod session;
pub mod typing;

pub use client::{spawn_client, ClientCommand, ClientNotification};
pub use config::ClientConfig;
pub use ledger::{Message, MessageLedger};
pub use session::{PairDirectory, PartnerDirectory, PresenceState, SessionManager};
pub use typing::TypingDebouncer;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise tracing for binaries and examples embedding this client.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("tandem_client=debug,tandem_signal=debug,tandem_media=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
