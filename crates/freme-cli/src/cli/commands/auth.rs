//! Sign-in and sign-out command handlers.

use anyhow::{Context, Result, bail};
use freme_core::api::SignUp;
use freme_core::auth::{self, AuthFlow, AuthState, IdentityUser};
use freme_core::config::{self, Config};
use freme_core::session::Session;

use super::{Target, client, require_session};

pub struct SignupArgs<'a> {
    pub email: &'a str,
    pub display_name: &'a str,
    pub handle: &'a str,
    pub password: &'a str,
}

/// Persists a fresh session and remembers its host as the default.
fn store(config: &Config, session: &Session) -> Result<()> {
    session.save().context("save session")?;
    if config.host.is_none() {
        Config::save_host(&session.host, &session.protocol).context("save default host")?;
    }
    tracing::info!(host = %session.host, credential = %session.masked_credential(), "session stored");
    Ok(())
}

pub async fn signup(config: &Config, target: &Target, args: &SignupArgs<'_>) -> Result<()> {
    let (host, protocol) = target.resolve(config)?;
    let api = client(config)?;
    let session = api
        .sign_up(
            &host,
            &protocol,
            &SignUp {
                email: args.email,
                display_name: args.display_name,
                handle: args.handle,
                password: args.password,
            },
        )
        .await
        .with_context(|| format!("sign up at {host}"))?;
    store(config, &session)?;
    println!("Signed up as {}@{host}", args.handle);
    Ok(())
}

pub async fn login(config: &Config, target: &Target, email: &str, password: &str) -> Result<()> {
    let (host, protocol) = target.resolve(config)?;
    let api = client(config)?;
    let session = api
        .login(&host, &protocol, email, password)
        .await
        .with_context(|| format!("log in to {host}"))?;
    store(config, &session)?;
    println!("Logged in to {host} as {email}");
    Ok(())
}

pub async fn logout(config: &Config) -> Result<()> {
    let Some(session) = Session::load().context("load session")? else {
        println!("Not logged in.");
        return Ok(());
    };
    let api = client(config)?;
    auth::sign_out(&api, &session, &config::paths::session_path()).await?;
    println!("Logged out of {}", session.host);
    Ok(())
}

pub async fn whoami(config: &Config) -> Result<()> {
    let session = require_session()?;
    let api = client(config)?;
    if let Err(err) = api.validate_session(&session).await {
        if err.is_unauthorized() {
            bail!("Session for {} has expired. Log in again.", session.host);
        }
        return Err(err).context("validate session");
    }
    println!(
        "{} on {} ({} {})",
        session.user.as_deref().unwrap_or("(unknown user)"),
        session.base_url(),
        session.credential.kind(),
        session.masked_credential()
    );
    Ok(())
}

pub async fn token(
    config: &Config,
    target: &Target,
    id_token: String,
    name: Option<String>,
    email: Option<String>,
) -> Result<()> {
    let (host, protocol) = target.resolve(config)?;
    let api = client(config)?;
    let flow = AuthFlow::new(&api, host, protocol);
    let user = IdentityUser {
        display_name: name,
        email: email.unwrap_or_default(),
        id_token,
    };

    match flow.on_auth_state_changed(Some(&user)).await? {
        AuthState::Ready {
            welcome_name,
            session,
        } => {
            store(config, &session)?;
            println!("Welcome, {welcome_name}!");
        }
        AuthState::NeedsSignup {
            welcome_name,
            session,
        } => {
            store(config, &session)?;
            println!("Welcome, {welcome_name}! No profile exists on {} yet.", session.host);
            println!("Finish sign-up with: freme create-profile --display-name <NAME> --handle <HANDLE>");
        }
        AuthState::SignedOut => println!("Not signed in."),
    }
    Ok(())
}

pub async fn create_profile(config: &Config, display_name: &str, handle: &str) -> Result<()> {
    let session = require_session()?;
    let api = client(config)?;
    let flow = AuthFlow::new(&api, session.host.as_str(), session.protocol.as_str());
    match flow.complete_signup(&session, display_name, handle).await? {
        AuthState::Ready {
            welcome_name,
            session,
        } => {
            store(config, &session)?;
            println!("Profile created. Welcome, {welcome_name}!");
            Ok(())
        }
        _ => bail!("profile creation did not complete"),
    }
}
