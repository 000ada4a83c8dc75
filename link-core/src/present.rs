//! Turning a tracked notification into something a presenter can show.
//!
//! Missed calls and SMS get special treatment when the sender is a known
//! contact. Everything else is shown as app name plus ticker, unless the
//! remote already put the app name in the title.

use crate::tracker::NotificationRecord;
use std::path::PathBuf;

/// Title the remote uses for missed call notifications.
pub const MISSED_CALL_TITLE: &str = "Missed call";

/// A contact known to the local address book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    /// Display name.
    pub name: Option<String>,
    /// Phone numbers, most relevant first.
    pub numbers: Vec<String>,
    /// Cached avatar image.
    pub avatar: Option<PathBuf>,
}

impl Contact {
    /// Name if known, else the first number.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.numbers.first().map(String::as_str))
    }
}

/// What kind of notification this is, for formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A missed call.
    MissedCall,
    /// An SMS message.
    Sms,
    /// Anything else.
    Other,
}

impl NotificationKind {
    /// Classify a record.
    pub fn of(record: &NotificationRecord) -> Self {
        if record.title.as_deref() == Some(MISSED_CALL_TITLE) {
            NotificationKind::MissedCall
        } else if record.id.as_deref().is_some_and(|id| id.contains("sms")) {
            NotificationKind::Sms
        } else {
            NotificationKind::Other
        }
    }

    /// Name or number to look up in the address book, if this kind comes
    /// from a contact. Missed calls carry the caller in the text, SMS in the
    /// title.
    pub fn contact_query<'a>(&self, record: &'a NotificationRecord) -> Option<&'a str> {
        match self {
            NotificationKind::MissedCall => record.text.as_deref(),
            NotificationKind::Sms => record.title.as_deref(),
            NotificationKind::Other => None,
        }
        .filter(|q| !q.is_empty())
    }
}

/// Icon to show with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Icon {
    /// Raw image bytes, e.g. downloaded from the remote.
    Bytes(Vec<u8>),
    /// An image file, e.g. a contact avatar.
    File(PathBuf),
    /// Themed icon names, in order of preference.
    Themed(Vec<String>),
}

impl Icon {
    /// Themed fallback for a notification that brought no icon of its own.
    pub fn fallback(kind: NotificationKind, app_name: Option<&str>, device_type: &str) -> Self {
        let names = match kind {
            NotificationKind::MissedCall => vec!["call-missed-symbolic".to_string()],
            NotificationKind::Sms => vec!["sms-symbolic".to_string()],
            NotificationKind::Other => {
                let mut names = Vec::with_capacity(2);
                if let Some(app) = app_name.filter(|a| !a.trim().is_empty()) {
                    names.push(themed_name(app));
                }
                names.push(format!("{}-symbolic", device_type));
                names
            }
        };
        Icon::Themed(names)
    }
}

/// Lowercase app name with whitespace runs replaced by `-`.
pub fn themed_name(app_name: &str) -> String {
    app_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Presentation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Regular notification.
    #[default]
    Normal,
    /// Messages from people.
    High,
}

/// A notification ready for the presenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    /// Remote id, used later to dismiss it.
    pub id: String,
    /// Posting application.
    pub app_name: String,
    /// Title line.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Icon.
    pub icon: Icon,
    /// Priority.
    pub priority: Priority,
    /// Show without sound.
    pub silent: bool,
    /// Reply token, if the remote accepts a reply.
    pub reply_id: Option<String>,
}

/// Device the notification came from.
#[derive(Debug, Clone, Copy)]
pub struct Origin<'a> {
    /// User-visible device name.
    pub name: &'a str,
    /// Device type, e.g. `phone` or `tablet`.
    pub device_type: &'a str,
}

/// Format `record` for display.
///
/// `icon` is whatever the caller already has (downloaded bytes or a contact
/// avatar); without one a themed fallback is chosen.
pub fn present(
    record: &NotificationRecord,
    contact: Option<&Contact>,
    icon: Option<Icon>,
    origin: Origin<'_>,
) -> Presentation {
    let kind = NotificationKind::of(record);
    let app_name = record.app_name.clone().unwrap_or_default();
    let title = record.title.clone().unwrap_or_default();
    let text = record.text.clone().unwrap_or_default();

    let known = contact.and_then(|c| {
        c.display_name()
            .map(str::to_string)
            .or_else(|| kind.contact_query(record).map(str::to_string))
    });

    let (title, body, priority) = match (kind, known) {
        (NotificationKind::MissedCall, Some(who)) => (
            "Missed Call".to_string(),
            format!("Missed call from {} on {}", who, origin.name),
            Priority::Normal,
        ),
        (NotificationKind::Sms, Some(who)) => (who, text, Priority::High),
        _ if kind == NotificationKind::Sms || record.app_name == record.title => {
            (title, text, Priority::Normal)
        }
        _ => (
            app_name.clone(),
            record.ticker.clone().unwrap_or_default(),
            Priority::Normal,
        ),
    };

    let icon = icon
        .unwrap_or_else(|| Icon::fallback(kind, record.app_name.as_deref(), origin.device_type));

    Presentation {
        id: record.id.clone().unwrap_or_default(),
        app_name,
        title,
        body,
        icon,
        priority,
        silent: record.silent.unwrap_or(false),
        reply_id: record.request_reply_id.clone(),
    }
}
