//! Feature plugins.

pub mod notification;
pub mod share;

pub use notification::{LocalNotification, NotificationPlugin};
pub use share::{unique_path, SharePlugin, TRANSFER_ICON};
