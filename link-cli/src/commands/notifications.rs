//! Fetch and list a peer's notifications.

use anyhow::Result;
use pairlink_client::DeviceSession;
use pairlink_core::NotificationRecord;
use std::time::Duration;

/// Ask the peer for its notifications, collect for `wait`, then print them.
pub async fn run(session: &DeviceSession, wait: Duration) -> Result<()> {
    // `run` sends the request from its connect hook.
    if tokio::time::timeout(wait, session.run()).await.is_err() {
        tracing::debug!("collection window elapsed");
    }

    let records = session.notifications().await;
    if records.is_empty() {
        println!("No notifications.");
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

/// One line for a tracked notification.
pub fn format_record(record: &NotificationRecord) -> String {
    let id = record
        .id
        .as_deref()
        .or(record.local_id.as_deref())
        .unwrap_or("?");
    let app = record.app_name.as_deref().unwrap_or("unknown");
    let title = record.title.as_deref().unwrap_or("");
    let text = record.text.as_deref().unwrap_or("");

    let mut line = format!("[{}] {}: {}", id, app, title);
    if !text.is_empty() {
        line.push_str(" - ");
        line.push_str(text);
    }
    if record.request_reply_id.is_some() {
        line.push_str(" (replyable)");
    }
    line
}
