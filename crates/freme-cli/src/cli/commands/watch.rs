//! Watch mode: periodic connection refresh until Ctrl-C.

use std::time::Duration;

use anyhow::Result;
use freme_core::api::ApiClient;
use freme_core::config::Config;
use freme_core::feed::MessageFeed;
use freme_core::poller::{ConnectionPoller, Snapshot};
use freme_core::render::Renderer;
use freme_core::session::Session;
use tokio::sync::watch;

use super::{client, require_session};

pub async fn run(config: &Config, interval_secs: Option<u64>, follow: bool) -> Result<()> {
    let session = require_session()?;
    let api = client(config)?;
    let renderer = Renderer::new()?;
    let interval = interval_secs.map_or_else(
        || config.poll_interval(),
        |secs| Duration::from_secs(secs.max(1)),
    );

    let poller = ConnectionPoller::new(api.clone(), session.clone(), interval).start();
    let mut snapshots = poller.subscribe();

    eprintln!(
        "Watching {} every {}s. Press Ctrl-C to stop.",
        session.host,
        interval.as_secs()
    );

    let watched = watch_loop(&mut snapshots, &api, &session, &renderer, follow).await;
    poller.stop().await;
    watched
}

/// Prints each new snapshot until Ctrl-C or the poller goes away.
async fn watch_loop(
    snapshots: &mut watch::Receiver<Option<Snapshot>>,
    api: &ApiClient,
    session: &Session,
    renderer: &Renderer,
    follow: bool,
) -> Result<()> {
    let mut feed = MessageFeed::new();
    let mut last_rendered = String::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted; stopping watch");
                return Ok(());
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
        }

        let Some(snapshot) = snapshots.borrow_and_update().clone() else {
            continue;
        };

        let rendered = renderer.connections(&snapshot.connections)?;
        if rendered != last_rendered {
            println!("--- {} ---", snapshot.fetched_at.format("%H:%M:%S"));
            println!("{rendered}");
            last_rendered = rendered;
        }

        if follow {
            print_new_messages(api, session, renderer, &mut feed, &snapshot).await?;
        }
    }
}

/// Prints messages not yet shown from every connection with unread messages.
async fn print_new_messages(
    api: &ApiClient,
    session: &Session,
    renderer: &Renderer,
    feed: &mut MessageFeed,
    snapshot: &Snapshot,
) -> Result<()> {
    for conn in snapshot
        .connections
        .iter()
        .filter(|c| c.unread_message_count > 0)
    {
        let fetched = match api.get_connection_messages(session, &conn.id).await {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(connection = %conn.id, error = %err, "fetch connection messages failed");
                continue;
            }
        };
        let fresh = feed.ingest(Some(&conn.id), fetched);
        if !fresh.is_empty() {
            println!();
            println!("{}", renderer.messages(&fresh, Some(&conn.id))?);
        }
    }
    Ok(())
}
