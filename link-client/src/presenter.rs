//! Notification presenter collaborator.
//!
//! The session never draws anything itself. It hands finished
//! [`Presentation`]s to a [`Presenter`] and later asks it to withdraw them by
//! id. Desktop integrations implement the trait; [`LogPresenter`] writes to
//! the log and [`MockPresenter`] records calls for tests.

use async_trait::async_trait;
use pairlink_core::Presentation;
use pairlink_types::DeviceId;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Displays and dismisses system notifications.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Show `presentation`, replacing any earlier one with the same id.
    async fn show(&self, device: &DeviceId, presentation: &Presentation);

    /// Dismiss the notification shown under `id`. Unknown ids are ignored.
    async fn withdraw(&self, device: &DeviceId, id: &str);
}

/// Presenter that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPresenter;

#[async_trait]
impl Presenter for LogPresenter {
    async fn show(&self, device: &DeviceId, presentation: &Presentation) {
        info!(
            device = %device,
            id = %presentation.id,
            app = %presentation.app_name,
            "{}: {}",
            presentation.title,
            presentation.body
        );
    }

    async fn withdraw(&self, device: &DeviceId, id: &str) {
        info!(device = %device, id, "notification withdrawn");
    }
}

/// Presenter double that records every call.
#[derive(Debug, Clone, Default)]
pub struct MockPresenter {
    inner: Arc<Mutex<MockPresenterInner>>,
}

#[derive(Debug, Default)]
struct MockPresenterInner {
    shown: Vec<Presentation>,
    withdrawn: Vec<String>,
}

impl MockPresenter {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything shown, in order.
    pub fn shown(&self) -> Vec<Presentation> {
        self.lock().shown.clone()
    }

    /// Shown presentations with the given id.
    pub fn shown_with_id(&self, id: &str) -> Vec<Presentation> {
        self.lock()
            .shown
            .iter()
            .filter(|p| p.id == id)
            .cloned()
            .collect()
    }

    /// Ids withdrawn, in order.
    pub fn withdrawn(&self) -> Vec<String> {
        self.lock().withdrawn.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockPresenterInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Presenter for MockPresenter {
    async fn show(&self, _device: &DeviceId, presentation: &Presentation) {
        self.lock().shown.push(presentation.clone());
    }

    async fn withdraw(&self, _device: &DeviceId, id: &str) {
        self.lock().withdrawn.push(id.to_string());
    }
}
