//! Connection command handlers.

use anyhow::{Context, Result};
use freme_core::api::ConnectionAction;
use freme_core::config::Config;
use freme_core::feed::MessageFeed;
use freme_core::read_tracker::{ReadOutcome, ReadTracker};
use freme_core::render::Renderer;

use super::{client, require_session};

#[derive(Debug, Clone, Copy)]
pub enum Action {
    Accept,
    Decline,
    Delete,
}

impl From<Action> for ConnectionAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Accept => ConnectionAction::Connect,
            Action::Decline => ConnectionAction::Decline,
            Action::Delete => ConnectionAction::Delete,
        }
    }
}

impl Action {
    fn past_tense(self) -> &'static str {
        match self {
            Action::Accept => "Accepted",
            Action::Decline => "Declined",
            Action::Delete => "Deleted",
        }
    }
}

pub async fn list(config: &Config) -> Result<()> {
    let session = require_session()?;
    let api = client(config)?;
    let connections = api
        .get_connection_info(&session)
        .await
        .context("get connection info")?;
    println!("{}", Renderer::new()?.connections(&connections)?);
    Ok(())
}

pub async fn request(config: &Config, handle: &str, host: &str) -> Result<()> {
    let session = require_session()?;
    let api = client(config)?;
    api.request_connection(&session, handle, host)
        .await
        .with_context(|| format!("request connection with {handle}@{host}"))?;
    println!("Connection requested: {handle}@{host}");
    Ok(())
}

pub async fn manage(config: &Config, id: &str, action: Action) -> Result<()> {
    let session = require_session()?;
    let api = client(config)?;
    let backend_action = ConnectionAction::from(action);
    api.manage_connection(&session, id, backend_action)
        .await
        .with_context(|| format!("{} connection {id}", backend_action.as_str()))?;
    println!("{} connection {id}", action.past_tense());
    Ok(())
}

pub async fn messages(config: &Config, id: &str, mark_read: bool) -> Result<()> {
    let session = require_session()?;
    let api = client(config)?;
    let renderer = Renderer::new()?;

    let fetched = api
        .get_connection_messages(&session, id)
        .await
        .with_context(|| format!("get messages for connection {id}"))?;
    let mut feed = MessageFeed::new();
    let messages = feed.ingest(Some(id), fetched);
    if messages.is_empty() {
        println!("No messages from connection {id}.");
        return Ok(());
    }

    if !mark_read {
        println!("{}", renderer.messages(&messages, Some(id))?);
        return Ok(());
    }

    let connections = api
        .get_connection_info(&session)
        .await
        .context("get connection info")?;
    let tracker = ReadTracker::new(api, session, config.mark_read_delay());
    tracker.sync_counts(&connections);

    for (index, message) in messages.iter().enumerate() {
        if index > 0 {
            println!();
        }
        println!("{}", renderer.message(message, Some(id))?);
        let Some(dwell) = tracker.hover(&feed, &message.id) else {
            continue;
        };
        match dwell.await {
            Ok(ReadOutcome::Marked { remaining }) => {
                println!("  (read; {remaining} unread left)");
            }
            Ok(ReadOutcome::Failed) => println!("  (could not mark read)"),
            Ok(ReadOutcome::Cancelled) => {}
            Err(err) => tracing::warn!(error = %err, "read timer task failed"),
        }
    }
    tracker.leave();
    Ok(())
}
