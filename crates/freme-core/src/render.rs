//! Text rendering of connections and messages.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::api::{Comment, Connection, Message, Profile};

const CONNECTIONS_TEMPLATE: &str = "\
{% if pending %}
Pending Connections
{% for conn in pending %}
({{ conn.id }}) {{ conn.handle }}@{{ conn.host }} - {{ conn.label }}  [accept or decline: freme connection accept|decline {{ conn.id }}]
{% endfor %}

{% endif %}
Existing Connections
{% for conn in existing %}
({{ conn.id }}) {{ conn.handle }}@{{ conn.host }}{{ (\" (\" ~ conn.unread ~ \")\") if conn.unread > 0 else \"\" }}
{% else %}
(none)
{% endfor %}
";

const MESSAGE_TEMPLATE: &str = "\
[{{ message.id }}] {{ message.author }}{{ (\" - \" ~ message.created) if message.created else \"\" }}
{{ message.text }}
{% for file in message.files %}
  attachment: {{ file }}
{% endfor %}
{% for comment in message.comments %}
  > {{ comment.author }}: {{ comment.text }}
{% for file in comment.files %}
    attachment: {{ file }}
{% endfor %}
{% endfor %}
{% if reply %}
  reply: freme message comment {{ reply }} {{ message.id }} \"<text>\"
{% endif %}
";

#[derive(Debug, Serialize)]
struct ConnectionView<'a> {
    id: &'a str,
    handle: &'a str,
    host: &'a str,
    label: String,
    unread: u32,
}

impl<'a> From<&'a Connection> for ConnectionView<'a> {
    fn from(conn: &'a Connection) -> Self {
        Self {
            id: &conn.id,
            handle: &conn.handle,
            host: &conn.host,
            label: conn.label(),
            unread: conn.unread_message_count,
        }
    }
}

#[derive(Debug, Serialize)]
struct CommentView<'a> {
    author: String,
    text: &'a str,
    files: &'a [String],
}

#[derive(Debug, Serialize)]
struct MessageView<'a> {
    id: &'a str,
    author: String,
    created: Option<String>,
    text: &'a str,
    files: &'a [String],
    comments: Vec<CommentView<'a>>,
}

fn author(profile: Option<&Profile>) -> String {
    profile
        .and_then(|p| {
            p.display_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .or_else(|| Some(p.handle.as_str()).filter(|h| !h.is_empty()))
        })
        .unwrap_or("someone")
        .to_string()
}

impl<'a> From<&'a Comment> for CommentView<'a> {
    fn from(comment: &'a Comment) -> Self {
        Self {
            author: author(comment.profile.as_ref()),
            text: &comment.text,
            files: &comment.files,
        }
    }
}

impl<'a> From<&'a Message> for MessageView<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            id: &message.id,
            author: author(message.profile.as_ref()),
            created: message.created.as_deref().map(format_timestamp),
            text: &message.text,
            files: &message.files,
            comments: message.comments.iter().map(CommentView::from).collect(),
        }
    }
}

/// Formats a backend timestamp in local time.
///
/// The backend sends Python `str(datetime)` values
/// (`2021-03-04 05:06:07.123456+00:00`); RFC 3339 is accepted too. Anything
/// else is returned unchanged.
pub fn format_timestamp(raw: &str) -> String {
    format_timestamp_in(raw, &Local)
}

fn format_timestamp_in<Tz: TimeZone>(raw: &str, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let parsed = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(tz));
    match parsed {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .map_or_else(|_| raw.to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string()),
    }
}

/// Template-backed renderer.
#[derive(Debug)]
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    /// # Errors
    /// Returns an error if a built-in template fails to compile.
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("connections", CONNECTIONS_TEMPLATE)
            .context("compile connections template")?;
        env.add_template("message", MESSAGE_TEMPLATE)
            .context("compile message template")?;
        Ok(Self { env })
    }

    /// Renders the connection list: pending first, then everything else.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn connections(&self, connections: &[Connection]) -> Result<String> {
        let (pending, existing): (Vec<&Connection>, Vec<&Connection>) =
            connections.iter().partition(|c| c.status.is_pending());
        let pending: Vec<ConnectionView<'_>> = pending.into_iter().map(Into::into).collect();
        let existing: Vec<ConnectionView<'_>> = existing.into_iter().map(Into::into).collect();
        let rendered = self
            .env
            .get_template("connections")?
            .render(context! { pending => pending, existing => existing })
            .context("render connections")?;
        Ok(rendered.trim_end().to_string())
    }

    /// Renders one message. `connection_id` adds a reply hint for messages
    /// received through a connection.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn message(&self, message: &Message, connection_id: Option<&str>) -> Result<String> {
        let view = MessageView::from(message);
        let rendered = self
            .env
            .get_template("message")?
            .render(context! { message => view, reply => connection_id })
            .context("render message")?;
        Ok(rendered.trim_end().to_string())
    }

    /// Renders a list of messages separated by blank lines.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn messages(&self, messages: &[Message], connection_id: Option<&str>) -> Result<String> {
        let rendered = messages
            .iter()
            .map(|m| self.message(m, connection_id))
            .collect::<Result<Vec<_>>>()?;
        Ok(rendered.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ConnectionStatus;
    use chrono::{FixedOffset, Utc};

    fn connection(id: &str, status: ConnectionStatus, unread: u32) -> Connection {
        Connection {
            id: id.to_string(),
            host: "example.com".to_string(),
            handle: format!("user{id}"),
            display_name: Some(format!("User {id}")),
            status,
            unread_message_count: unread,
            profile: None,
            created: None,
            updated: None,
        }
    }

    #[test]
    fn test_connections_pending_listed_first_with_hints() {
        let renderer = Renderer::new().unwrap();
        let out = renderer
            .connections(&[
                connection("1", ConnectionStatus::Connected, 0),
                connection("2", ConnectionStatus::Pending, 0),
            ])
            .unwrap();

        let pending_at = out.find("Pending Connections").unwrap();
        let existing_at = out.find("Existing Connections").unwrap();
        assert!(pending_at < existing_at);
        assert!(out.contains("(2) user2@example.com - User 2"));
        assert!(out.contains("freme connection accept|decline 2"));
        assert!(out.contains("(1) user1@example.com"));
    }

    #[test]
    fn test_unread_badge_only_when_positive() {
        let renderer = Renderer::new().unwrap();
        let out = renderer
            .connections(&[
                connection("1", ConnectionStatus::Connected, 3),
                connection("2", ConnectionStatus::Connected, 0),
            ])
            .unwrap();

        assert!(out.contains("(1) user1@example.com (3)\n"));
        assert!(out.ends_with("(2) user2@example.com"));
        assert!(!out.contains("Pending Connections"));
    }

    #[test]
    fn test_empty_connection_list() {
        let renderer = Renderer::new().unwrap();
        let out = renderer.connections(&[]).unwrap();
        assert_eq!(out, "Existing Connections\n(none)");
    }

    #[test]
    fn test_message_with_comment_and_reply_hint() {
        let renderer = Renderer::new().unwrap();
        let message = Message {
            id: "m1".to_string(),
            text: "hello there".to_string(),
            files: vec!["https://files.example.com/a.png".to_string()],
            comments: vec![Comment {
                id: "k1".to_string(),
                text: "hi!".to_string(),
                profile: Some(Profile {
                    handle: "bob".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            profile: Some(Profile {
                display_name: Some("Ada".to_string()),
                handle: "ada".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let out = renderer.message(&message, Some("c1")).unwrap();
        assert!(out.starts_with("[m1] Ada\nhello there\n"));
        assert!(out.contains("  attachment: https://files.example.com/a.png"));
        assert!(out.contains("  > bob: hi!"));
        assert!(out.ends_with("reply: freme message comment c1 m1 \"<text>\""));
    }

    #[test]
    fn test_own_message_has_no_reply_hint() {
        let renderer = Renderer::new().unwrap();
        let message = Message {
            id: "m2".to_string(),
            text: "mine".to_string(),
            ..Default::default()
        };
        let out = renderer.message(&message, None).unwrap();
        assert_eq!(out, "[m2] someone\nmine");
    }

    #[test]
    fn test_format_timestamp_unparseable_passthrough() {
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn test_format_timestamp_python_style() {
        let raw = "2021-03-04 05:06:07.123456+00:00";
        assert_eq!(format_timestamp_in(raw, &Utc), "2021-03-04 05:06");

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(format_timestamp_in(raw, &plus_two), "2021-03-04 07:06");
    }

    #[test]
    fn test_format_timestamp_rfc3339_and_naive() {
        assert_eq!(
            format_timestamp_in("2021-03-04T23:30:00-01:00", &Utc),
            "2021-03-05 00:30"
        );
        assert_eq!(
            format_timestamp_in("2021-03-04 05:06:07.5", &Utc),
            "2021-03-04 05:06"
        );
    }
}
