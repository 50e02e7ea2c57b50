//! Identity-provider sign-in glue.
//!
//! The identity provider (and its SDK) owns authentication. This module only
//! reacts to its sign-in state changes: it exchanges the provider's ID token
//! with the backend and decides whether the user is ready or must finish
//! sign-up.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::api::{ApiClient, CheckUser};
use crate::session::{Credential, Session};

/// A signed-in user as reported by the identity provider.
#[derive(Debug, Clone)]
pub struct IdentityUser {
    pub display_name: Option<String>,
    pub email: String,
    /// ID token issued by the provider
    pub id_token: String,
}

/// Name to greet the user with: the provider display name, or the e-mail.
pub fn welcome_name(user: &IdentityUser) -> String {
    user.display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(&user.email)
        .to_string()
}

/// Where the client stands after a sign-in state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    /// The backend accepted the token; `session` is ready for use
    Ready {
        welcome_name: String,
        session: Session,
    },
    /// The backend has no profile for this identity yet
    NeedsSignup {
        welcome_name: String,
        session: Session,
    },
}

/// Sign-in flow against one backend.
#[derive(Debug)]
pub struct AuthFlow<'a> {
    api: &'a ApiClient,
    host: String,
    protocol: String,
}

impl<'a> AuthFlow<'a> {
    pub fn new(api: &'a ApiClient, host: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            api,
            host: host.into(),
            protocol: protocol.into(),
        }
    }

    /// Reacts to the identity provider reporting a user (or none).
    ///
    /// # Errors
    /// Returns an error if the token exchange fails with anything other
    /// than "profile not found".
    pub async fn on_auth_state_changed(&self, user: Option<&IdentityUser>) -> Result<AuthState> {
        let Some(user) = user else {
            tracing::info!("identity provider reports no signed-in user");
            return Ok(AuthState::SignedOut);
        };

        let welcome_name = welcome_name(user);
        let mut session = Session::new(
            self.host.as_str(),
            self.protocol.as_str(),
            Credential::bearer(user.id_token.as_str()),
        )?
        .with_user(welcome_name.clone());

        let outcome = self
            .api
            .check_user(&mut session)
            .await
            .context("check user with backend")?;

        Ok(match outcome {
            CheckUser::Known => AuthState::Ready {
                welcome_name,
                session,
            },
            CheckUser::NeedsSignup => AuthState::NeedsSignup {
                welcome_name,
                session,
            },
        })
    }

    /// Creates the backend profile for a pending sign-up, then re-checks.
    ///
    /// The returned session carries the backend cookie issued by the
    /// re-check.
    ///
    /// # Errors
    /// Returns an error if profile creation fails or the backend still does
    /// not recognize the user afterwards.
    pub async fn complete_signup(
        &self,
        pending: &Session,
        display_name: &str,
        handle: &str,
    ) -> Result<AuthState> {
        self.api
            .create_profile(pending, display_name, handle)
            .await
            .context("create profile")?;

        let mut session = pending.clone();
        match self.api.check_user(&mut session).await.context("check user")? {
            CheckUser::Known => Ok(AuthState::Ready {
                welcome_name: session
                    .user
                    .clone()
                    .unwrap_or_else(|| display_name.to_string()),
                session,
            }),
            CheckUser::NeedsSignup => bail!("backend still has no profile after sign-up"),
        }
    }
}

/// Signs out of the backend and forgets the local session.
///
/// A failed backend call is logged; the local session is cleared regardless.
/// Returns whether a stored session was removed.
///
/// # Errors
/// Returns an error only if the stored session cannot be removed.
pub async fn sign_out(api: &ApiClient, session: &Session, session_path: &Path) -> Result<bool> {
    if let Err(err) = api.sign_out(session).await {
        tracing::warn!(error = %err, "backend sign-out failed");
    }
    Session::clear_at(session_path)
}
