//! Session identity and partner presence.

use serde::Serialize;
use tracing::{debug, info};

use tandem_shared::error::AuthError;
use tandem_shared::protocol::ClientEvent;
use tandem_shared::types::Username;

/// Resolves who a logged-in user talks to.
///
/// The production relay would back this with a roster lookup; this core only
/// needs the mapping to be explicit rather than hardcoded.
pub trait PartnerDirectory: Send {
    fn partner_of(&self, user: &Username) -> Option<Username>;
}

/// The two-party roster: each user's partner is the other one.
pub struct PairDirectory {
    a: Username,
    b: Username,
}

impl PairDirectory {
    pub fn new(a: impl Into<Username>, b: impl Into<Username>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }
}

impl PartnerDirectory for PairDirectory {
    fn partner_of(&self, user: &Username) -> Option<Username> {
        if *user == self.a {
            Some(self.b.clone())
        } else if *user == self.b {
            Some(self.a.clone())
        } else {
            None
        }
    }
}

/// Partner presence, mutated only by inbound relay events.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PresenceState {
    pub partner_online: bool,
    pub partner_typing: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionIdentity {
    pub username: Username,
    pub partner: Username,
}

/// Owns the login identity and presence of the counterpart. At most one
/// identity and one partner are bound per session.
pub struct SessionManager {
    directory: Box<dyn PartnerDirectory>,
    identity: Option<SessionIdentity>,
    presence: PresenceState,
}

impl SessionManager {
    pub fn new(directory: Box<dyn PartnerDirectory>) -> Self {
        Self {
            directory,
            identity: None,
            presence: PresenceState::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.identity.is_some()
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    pub fn presence(&self) -> PresenceState {
        self.presence
    }

    /// Validate credentials locally and produce the login request. The
    /// session stays unauthenticated until the relay answers.
    pub fn login(&self, username: &str, password: &str) -> Result<ClientEvent, AuthError> {
        if self.identity.is_some() {
            return Err(AuthError::AlreadyAuthenticated);
        }
        let username = username.trim();
        let password = password.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(ClientEvent::Login {
            username: Username::new(username),
            password: password.to_string(),
        })
    }

    /// Bind the resolved identity and its partner. A duplicate success event
    /// for an already-bound identity is stale and returns the existing
    /// binding.
    pub fn on_login_success(&mut self, username: Username) -> Result<SessionIdentity, AuthError> {
        if let Some(identity) = &self.identity {
            debug!(user = %username, "Ignoring duplicate login success");
            return Ok(identity.clone());
        }
        let partner = self
            .directory
            .partner_of(&username)
            .ok_or_else(|| AuthError::UnknownUser(username.to_string()))?;
        info!(user = %username, partner = %partner, "Logged in");
        let identity = SessionIdentity { username, partner };
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    /// Release the identity and presence. Idempotent; returns whether a
    /// session was actually active.
    pub fn logout(&mut self) -> bool {
        self.presence = PresenceState::default();
        match self.identity.take() {
            Some(identity) => {
                info!(user = %identity.username, "Logged out");
                true
            }
            None => false,
        }
    }

    /// Returns whether the presence state changed.
    pub fn on_partner_status(&mut self, username: &Username, online: bool) -> bool {
        let Some(identity) = &self.identity else {
            return false;
        };
        if *username != identity.partner || self.presence.partner_online == online {
            return false;
        }
        debug!(partner = %username, online, "Partner status changed");
        self.presence.partner_online = online;
        // A partner that went offline is no longer typing either
        if !online {
            self.presence.partner_typing = false;
        }
        true
    }

    /// Returns whether the presence state changed.
    pub fn on_partner_typing(&mut self, from: &Username, is_typing: bool) -> bool {
        let Some(identity) = &self.identity else {
            return false;
        };
        if *from != identity.partner || self.presence.partner_typing == is_typing {
            return false;
        }
        self.presence.partner_typing = is_typing;
        true
    }

    /// Derived header line: typing beats online beats nothing.
    pub fn status_line(&self) -> &'static str {
        if self.presence.partner_typing {
            "typing..."
        } else if self.presence.partner_online {
            "online"
        } else {
            ""
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(Box::new(PairDirectory::new("user1", "user2")))
    }

    #[test]
    fn test_login_binds_identity_and_partner() {
        let mut session = manager();
        let event = session.login("user1", "x").unwrap();
        assert!(matches!(event, ClientEvent::Login { .. }));
        assert!(!session.is_active());

        let identity = session.on_login_success(Username::from("user1")).unwrap();
        assert_eq!(identity.partner, Username::from("user2"));
        assert!(session.is_active());
        // Neither typing nor online yet
        assert_eq!(session.status_line(), "");
    }

    #[test]
    fn test_login_requires_credentials() {
        let session = manager();
        assert_eq!(
            session.login("", "pw").unwrap_err(),
            AuthError::MissingCredentials
        );
        assert_eq!(
            session.login("user1", "  ").unwrap_err(),
            AuthError::MissingCredentials
        );
    }

    #[test]
    fn test_unknown_user_is_rejected() {
        let mut session = manager();
        assert!(matches!(
            session.on_login_success(Username::from("stranger")),
            Err(AuthError::UnknownUser(_))
        ));
        assert!(!session.is_active());
    }

    #[test]
    fn test_status_line_precedence() {
        let mut session = manager();
        session.on_login_success(Username::from("user1")).unwrap();

        assert!(session.on_partner_status(&Username::from("user2"), true));
        assert_eq!(session.status_line(), "online");

        assert!(session.on_partner_typing(&Username::from("user2"), true));
        assert_eq!(session.status_line(), "typing...");

        assert!(session.on_partner_typing(&Username::from("user2"), false));
        assert_eq!(session.status_line(), "online");
    }

    #[test]
    fn test_presence_from_non_partner_ignored() {
        let mut session = manager();
        session.on_login_success(Username::from("user1")).unwrap();

        assert!(!session.on_partner_status(&Username::from("stranger"), true));
        assert!(!session.on_partner_typing(&Username::from("stranger"), true));
        assert_eq!(session.status_line(), "");
    }

    #[test]
    fn test_offline_partner_stops_typing() {
        let mut session = manager();
        session.on_login_success(Username::from("user1")).unwrap();
        session.on_partner_status(&Username::from("user2"), true);
        session.on_partner_typing(&Username::from("user2"), true);

        assert!(session.on_partner_status(&Username::from("user2"), false));
        assert_eq!(session.status_line(), "");
    }

    #[test]
    fn test_logout_is_idempotent() {
        let mut session = manager();
        session.on_login_success(Username::from("user1")).unwrap();
        assert!(session.logout());
        assert!(!session.logout());
        assert!(!session.is_active());
        assert_eq!(session.status_line(), "");
    }

    #[test]
    fn test_login_while_active_rejected() {
        let mut session = manager();
        session.on_login_success(Username::from("user1")).unwrap();
        assert_eq!(
            session.login("user2", "pw").unwrap_err(),
            AuthError::AlreadyAuthenticated
        );
    }
}
