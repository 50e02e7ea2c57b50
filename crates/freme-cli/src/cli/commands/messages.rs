//! Message command handlers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use freme_core::api::Attachment;
use freme_core::config::Config;
use freme_core::render::Renderer;

use super::{client, require_session};

async fn load_attachments(files: &[PathBuf]) -> Result<Vec<Attachment>> {
    let mut attachments = Vec::with_capacity(files.len());
    for file in files {
        attachments.push(Attachment::from_path(file).await?);
    }
    Ok(attachments)
}

pub async fn get(config: &Config) -> Result<()> {
    let session = require_session()?;
    let api = client(config)?;
    let messages = api.get_messages(&session).await.context("get messages")?;
    if messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }
    println!("{}", Renderer::new()?.messages(&messages, None)?);
    Ok(())
}

pub async fn post(config: &Config, text: &str, files: &[PathBuf]) -> Result<()> {
    let session = require_session()?;
    let attachments = load_attachments(files).await?;
    let api = client(config)?;
    let message = api
        .create_message(&session, text, attachments)
        .await
        .context("post message")?;
    println!("{}", Renderer::new()?.message(&message, None)?);
    Ok(())
}

pub async fn comment(
    config: &Config,
    connection_id: &str,
    message_id: &str,
    text: &str,
    files: &[PathBuf],
) -> Result<()> {
    let session = require_session()?;
    let attachments = load_attachments(files).await?;
    let api = client(config)?;
    let comment = api
        .add_comment(&session, message_id, connection_id, text, attachments)
        .await
        .with_context(|| format!("comment on message {message_id}"))?;
    println!("Added comment {} to message {message_id}", comment.id);
    Ok(())
}

pub async fn read(config: &Config, message_id: &str) -> Result<()> {
    let session = require_session()?;
    let api = client(config)?;
    api.mark_message_read(&session, message_id)
        .await
        .with_context(|| format!("mark message {message_id} read"))?;
    println!("Marked message {message_id} read");
    Ok(())
}
