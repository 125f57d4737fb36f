//! Session service capability
//!
//! The provider never authenticates users itself. It asks an external
//! session service whether a session exists and, if not, starts a sign-in
//! that may only complete after a redirect.

use crate::config::OAuthConfig;
use crate::Result;
use alloy::primitives::Address;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Wallet address bound to the session
    pub address: Address,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Session {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInOptions {
    pub redirect: bool,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOutOptions {
    pub redirect: bool,
    pub callback_url: Option<String>,
}

impl OAuthConfig {
    pub fn sign_in_options(&self) -> Option<SignInOptions> {
        self.sign_in_redirect.as_ref().map(|r| SignInOptions {
            redirect: r.enabled,
            callback_url: Some(r.url.clone()),
        })
    }

    pub fn sign_out_options(&self) -> Option<SignOutOptions> {
        self.sign_out_redirect.as_ref().map(|r| SignOutOptions {
            redirect: r.enabled,
            callback_url: Some(r.url.clone()),
        })
    }
}

#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    /// Current session, if the user is signed in
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Start a sign-in. May not return until an external redirect resolves,
    /// and returning does not imply a session now exists.
    async fn sign_in(&self, provider_id: &str, options: Option<SignInOptions>) -> Result<()>;

    async fn sign_out(&self, options: Option<SignOutOptions>) -> Result<()>;
}

/// In-process session service
#[derive(Debug, Default)]
pub struct MemorySessionAuthenticator {
    session: Mutex<Option<Session>>,
    /// Session granted on the next sign-in
    grant_on_sign_in: Mutex<Option<Session>>,
    lookups: AtomicUsize,
    sign_ins: Mutex<Vec<(String, Option<SignInOptions>)>>,
    sign_outs: AtomicUsize,
}

impl MemorySessionAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the user already signed in
    pub fn signed_in(session: Session) -> Self {
        let auth = Self::default();
        *auth.session.lock() = Some(session);
        auth
    }

    /// Make the next sign-in create `session`, as a completed redirect would
    pub fn grant_on_sign_in(&self, session: Session) {
        *self.grant_on_sign_in.lock() = Some(session);
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.lock() = session;
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn sign_ins(&self) -> Vec<(String, Option<SignInOptions>)> {
        self.sign_ins.lock().clone()
    }

    pub fn sign_out_count(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionAuthenticator for MemorySessionAuthenticator {
    async fn get_session(&self) -> Result<Option<Session>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.session.lock().clone())
    }

    async fn sign_in(&self, provider_id: &str, options: Option<SignInOptions>) -> Result<()> {
        tracing::info!(provider_id, "Sign-in requested");
        self.sign_ins.lock().push((provider_id.to_string(), options));
        if let Some(session) = self.grant_on_sign_in.lock().take() {
            *self.session.lock() = Some(session);
        }
        Ok(())
    }

    async fn sign_out(&self, _options: Option<SignOutOptions>) -> Result<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        *self.session.lock() = None;
        Ok(())
    }
}
