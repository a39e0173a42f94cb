//! Credential source consumed by the chat client.
//!
//! The authentication subsystem lives outside this crate. The client only
//! reads two things from it: whether the user is signed in, and the current
//! bearer credential. It never mutates either.

use tokio::sync::watch;

/// Read-only view of the host application's authentication state.
pub trait CredentialSource: Send + Sync {
    /// Whether the user is currently signed in.
    fn is_authenticated(&self) -> bool;

    /// The bearer credential, if one is available.
    fn current_credential(&self) -> Option<String>;

    /// Notifications of sign-in state changes.
    ///
    /// Sources that can report sign-out return a receiver here; the client
    /// closes itself as soon as the value turns `false`.
    fn auth_changes(&self) -> Option<watch::Receiver<bool>> {
        None
    }
}

/// In-process credential holder backed by `watch` cells.
///
/// Suitable for hosts that keep the token in memory (the CLI, tests).
pub struct SessionCredentials {
    authenticated: watch::Sender<bool>,
    token: watch::Sender<Option<String>>,
}

impl SessionCredentials {
    /// Create a signed-out session.
    pub fn new() -> Self {
        Self {
            authenticated: watch::Sender::new(false),
            token: watch::Sender::new(None),
        }
    }

    /// Create a session that is already signed in with `token`.
    pub fn signed_in(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.sign_in(token);
        session
    }

    /// Record a successful sign-in.
    pub fn sign_in(&self, token: impl Into<String>) {
        self.token.send_replace(Some(token.into()));
        self.authenticated.send_replace(true);
    }

    /// Record a sign-out; subscribers are notified.
    pub fn sign_out(&self) {
        self.token.send_replace(None);
        self.authenticated.send_replace(false);
    }

    /// Replace the credential without changing sign-in state (token refresh).
    pub fn set_token(&self, token: Option<String>) {
        self.token.send_replace(token);
    }
}

impl Default for SessionCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialSource for SessionCredentials {
    fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    fn current_credential(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    fn auth_changes(&self) -> Option<watch::Receiver<bool>> {
        Some(self.authenticated.subscribe())
    }
}
