//! HTTP client for the social-messaging backend.
//!
//! One method per backend endpoint. Every authenticated call takes the
//! [`Session`] explicitly; nothing is cached between calls.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

mod error;
mod types;

pub use error::{ApiError, ApiErrorKind, ApiResult};
pub use types::{
    CheckUser, Comment, Connection, ConnectionAction, ConnectionStatus, Message, Profile,
};

use crate::config::Config;
use crate::session::{Credential, SESSION_COOKIE, Session};

/// Standard User-Agent header for freme requests.
pub const USER_AGENT: &str = concat!("freme/", env!("CARGO_PKG_VERSION"));

/// A file attached to a message or comment.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Sniffed MIME type, if recognizable
    pub mime: Option<String>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let mime = infer::get(&bytes).map(|kind| kind.mime_type().to_string());
        Self {
            file_name: file_name.into(),
            bytes,
            mime,
        }
    }

    /// Reads an attachment from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read attachment {}", path.display()))?;
        let file_name = path
            .file_name()
            .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().to_string());
        Ok(Self::new(file_name, bytes))
    }

    fn into_part(self) -> ApiResult<Part> {
        let part = Part::bytes(self.bytes).file_name(self.file_name);
        match self.mime.as_deref() {
            Some(mime) if !mime.trim().is_empty() => part
                .mime_str(mime)
                .map_err(|err| ApiError::parse(format!("invalid attachment mime type: {err}"))),
            _ => Ok(part),
        }
    }
}

/// Builds a multipart form with text fields followed by `file-<n>` parts.
fn multipart_form(fields: &[(&str, &str)], attachments: Vec<Attachment>) -> ApiResult<Form> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text((*name).to_string(), (*value).to_string());
    }
    let total_bytes: usize = attachments.iter().map(|a| a.bytes.len()).sum();
    let count = attachments.len();
    for (index, attachment) in attachments.into_iter().enumerate() {
        form = form.part(format!("file-{index}"), attachment.into_part()?);
    }
    if count > 0 {
        tracing::debug!(files = count, bytes = total_bytes, "uploading attachments");
    }
    Ok(form)
}

/// Extracts the backend `session` cookie from `Set-Cookie` headers.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Backend API client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
}

impl ApiClient {
    /// Creates a client with an optional per-request timeout.
    ///
    /// Redirects are not followed: the password sign-up endpoint answers
    /// with a redirect that carries the session cookie.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Option<Duration>) -> ApiResult<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
        })
    }

    /// Creates a client using the configured request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> ApiResult<Self> {
        Self::new(config.request_timeout())
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    /// Exchanges an identity-provider token with the backend.
    ///
    /// A `session` cookie set by the backend is stored on the session's
    /// credential; later calls need it.
    ///
    /// # Errors
    /// Returns an error for any status other than success or 404.
    pub async fn check_user(&self, session: &mut Session) -> ApiResult<CheckUser> {
        let url = endpoint_url(session, &["firebase", "check-user"])?;
        let response = session
            .credential
            .authorize(self.http.get(url))
            .send()
            .await?;
        if let Some(cookie) = session_cookie(response.headers()) {
            tracing::debug!(host = %session.host, "check-user: backend session cookie issued");
            session.credential.remember_cookie(cookie);
        }
        let status = response.status();
        if status.is_success() {
            tracing::debug!(host = %session.host, "check-user: known profile");
            return Ok(CheckUser::Known);
        }
        if status == StatusCode::NOT_FOUND {
            tracing::info!(host = %session.host, "check-user: no profile, sign-up required");
            return Ok(CheckUser::NeedsSignup);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::http_status(status.as_u16(), &body))
    }

    /// Creates the backend profile for an identity-provider user.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the request.
    pub async fn create_profile(
        &self,
        session: &Session,
        display_name: &str,
        handle: &str,
    ) -> ApiResult<()> {
        let url = endpoint_url(session, &["firebase", "create-profile"])?;
        let request = self
            .http
            .post(url)
            .form(&[("display-name", display_name), ("handle", handle)]);
        self.send(session, request, "create-profile").await?;
        Ok(())
    }

    /// Checks that the stored session is still accepted.
    ///
    /// # Errors
    /// Returns an error (usually [`ApiErrorKind::Unauthorized`]) if not.
    pub async fn validate_session(&self, session: &Session) -> ApiResult<()> {
        let url = endpoint_url(session, &["validate-session"])?;
        self.send(session, self.http.get(url), "validate-session")
            .await?;
        Ok(())
    }

    /// Logs in with e-mail and password and returns a cookie session.
    ///
    /// # Errors
    /// Returns an error if the credentials are rejected or no session
    /// cookie is returned.
    pub async fn login(
        &self,
        host: &str,
        protocol: &str,
        email: &str,
        password: &str,
    ) -> ApiResult<Session> {
        let url = anonymous_url(host, protocol, "login-api")?;
        let request = self
            .http
            .post(url)
            .form(&[("email", email), ("password", password)]);
        let session = self.cookie_session(host, protocol, request, "login-api").await?;
        Ok(session.with_user(email))
    }

    /// Registers a new account and returns a cookie session.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the sign-up or no session
    /// cookie is returned.
    pub async fn sign_up(
        &self,
        host: &str,
        protocol: &str,
        signup: &SignUp<'_>,
    ) -> ApiResult<Session> {
        let url = anonymous_url(host, protocol, "signup")?;
        let request = self.http.post(url).form(&[
            ("email", signup.email),
            ("name", signup.display_name),
            ("handle", signup.handle),
            ("password", signup.password),
        ]);
        let session = self.cookie_session(host, protocol, request, "signup").await?;
        Ok(session.with_user(signup.email))
    }

    /// Ends the backend session.
    ///
    /// # Errors
    /// Returns an error if the backend call fails.
    pub async fn sign_out(&self, session: &Session) -> ApiResult<()> {
        let url = endpoint_url(session, &["sign-out"])?;
        self.send(session, self.http.get(url), "sign-out").await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Lists the current user's own messages, newest first.
    ///
    /// # Errors
    /// Returns an error if the call fails or the body is not a message list.
    pub async fn get_messages(&self, session: &Session) -> ApiResult<Vec<Message>> {
        let url = endpoint_url(session, &["get-messages"])?;
        self.get_json(session, url, "get-messages").await
    }

    /// Posts a new message with optional attachments.
    ///
    /// # Errors
    /// Returns an error if the upload fails or the body is not a message.
    pub async fn create_message(
        &self,
        session: &Session,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> ApiResult<Message> {
        let url = endpoint_url(session, &["create-message"])?;
        let form = multipart_form(&[("message", text)], attachments)?;
        let response = self
            .send(session, self.http.post(url).multipart(form), "create-message")
            .await?;
        decode(response).await
    }

    /// Adds a comment to a message received through a connection.
    ///
    /// # Errors
    /// Returns an error if the upload fails or the body is not a comment.
    pub async fn add_comment(
        &self,
        session: &Session,
        message_id: &str,
        connection_id: &str,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> ApiResult<Comment> {
        let url = endpoint_url(session, &["add-comment", message_id])?;
        let form = multipart_form(
            &[("comment", text), ("connectionId", connection_id)],
            attachments,
        )?;
        let response = self
            .send(session, self.http.post(url).multipart(form), "add-comment")
            .await?;
        decode(response).await
    }

    /// Marks a received message as read.
    ///
    /// # Errors
    /// Returns an error if the call fails (404 for unknown ids).
    pub async fn mark_message_read(&self, session: &Session, message_id: &str) -> ApiResult<()> {
        let url = endpoint_url(session, &["mark-message-read", message_id])?;
        self.send(session, self.http.get(url), "mark-message-read")
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Lists connections with their unread message counts.
    ///
    /// # Errors
    /// Returns an error if the call fails or the body is not a connection list.
    pub async fn get_connection_info(&self, session: &Session) -> ApiResult<Vec<Connection>> {
        let url = endpoint_url(session, &["get-connection-info"])?;
        self.get_json(session, url, "get-connection-info").await
    }

    /// Fetches the messages a connection has shared with us.
    ///
    /// # Errors
    /// Returns an error if the call fails or the body is not a message list.
    pub async fn get_connection_messages(
        &self,
        session: &Session,
        connection_id: &str,
    ) -> ApiResult<Vec<Message>> {
        let url = endpoint_url(session, &["get-connection-messages", connection_id])?;
        self.get_json(session, url, "get-connection-messages")
            .await
    }

    /// Asks `handle@host` to connect.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the request.
    pub async fn request_connection(
        &self,
        session: &Session,
        handle: &str,
        host: &str,
    ) -> ApiResult<()> {
        let url = endpoint_url(session, &["request-connection"])?;
        let request = self
            .http
            .post(url)
            .form(&[("handle", handle), ("host", host)]);
        self.send(session, request, "request-connection").await?;
        Ok(())
    }

    /// Accepts, declines or deletes a connection.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the request.
    pub async fn manage_connection(
        &self,
        session: &Session,
        connection_id: &str,
        action: ConnectionAction,
    ) -> ApiResult<()> {
        let url = endpoint_url(session, &["manage-connection"])?;
        let request = self.http.post(url).form(&[
            ("connection_id", connection_id),
            ("action", action.as_str()),
        ]);
        self.send(session, request, "manage-connection").await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn send(
        &self,
        session: &Session,
        request: RequestBuilder,
        endpoint: &'static str,
    ) -> ApiResult<Response> {
        let response = session.credential.authorize(request).send().await?;
        check_status(response, endpoint).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: &Session,
        url: Url,
        endpoint: &'static str,
    ) -> ApiResult<T> {
        let response = self.send(session, self.http.get(url), endpoint).await?;
        decode(response).await
    }

    async fn cookie_session(
        &self,
        host: &str,
        protocol: &str,
        request: RequestBuilder,
        endpoint: &'static str,
    ) -> ApiResult<Session> {
        let response = request.send().await?;
        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(endpoint, status = status.as_u16(), "backend call failed");
            return Err(ApiError::http_status(status.as_u16(), &body));
        }
        let cookie = session_cookie(response.headers()).ok_or_else(|| {
            ApiError::new(
                ApiErrorKind::Unauthorized,
                format!("{endpoint} did not return a session cookie"),
            )
        })?;
        Ok(Session {
            host: host.trim().trim_end_matches('/').to_string(),
            protocol: protocol.trim().to_string(),
            credential: Credential::Cookie { value: cookie },
            user: None,
        })
    }
}

/// Fields for a password sign-up.
#[derive(Debug, Clone, Copy)]
pub struct SignUp<'a> {
    pub email: &'a str,
    pub display_name: &'a str,
    pub handle: &'a str,
    pub password: &'a str,
}

async fn check_status(response: Response, endpoint: &'static str) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        tracing::debug!(endpoint, status = status.as_u16(), "backend call succeeded");
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(endpoint, status = status.as_u16(), "backend call failed");
    Err(ApiError::http_status(status.as_u16(), &body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|err| ApiError::parse(format!("invalid response body: {err}")))
}

fn endpoint_url(session: &Session, segments: &[&str]) -> ApiResult<Url> {
    let mut url = Url::parse(&session.base_url())
        .map_err(|err| ApiError::parse(format!("invalid backend URL: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| ApiError::parse("backend URL cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn anonymous_url(host: &str, protocol: &str, path: &str) -> ApiResult<Url> {
    let base = format!("{}://{}", protocol.trim(), host.trim().trim_end_matches('/'));
    let mut url =
        Url::parse(&base).map_err(|err| ApiError::parse(format!("invalid backend URL: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| ApiError::parse("backend URL cannot carry a path"))?
        .pop_if_empty()
        .push(path);
    Ok(url)
}
