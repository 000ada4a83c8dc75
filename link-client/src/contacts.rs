//! Contact resolver collaborator.

use async_trait::async_trait;
use pairlink_core::Contact;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Address book lookups for missed calls and SMS.
#[async_trait]
pub trait ContactResolver: Send + Sync {
    /// Contact whose name or one of whose numbers matches `query`.
    async fn lookup(&self, query: &str) -> Option<Contact>;

    /// Remember `avatar` as the picture of `contact`.
    async fn set_avatar(&self, contact: &Contact, avatar: &Path);
}

/// In-memory address book.
///
/// Numbers are compared by their digits only, so `+1 555-0100` matches
/// `15550100`.
#[derive(Debug, Clone, Default)]
pub struct StaticContacts {
    contacts: Arc<Mutex<Vec<Contact>>>,
}

impl StaticContacts {
    /// Address book holding `contacts`.
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self {
            contacts: Arc::new(Mutex::new(contacts)),
        }
    }

    /// Current avatar of the first contact named `name`.
    pub fn avatar_of(&self, name: &str) -> Option<PathBuf> {
        self.lock()
            .iter()
            .find(|c| c.name.as_deref() == Some(name))
            .and_then(|c| c.avatar.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Contact>> {
        self.contacts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn digits(number: &str) -> String {
    number.chars().filter(char::is_ascii_digit).collect()
}

fn matches(contact: &Contact, query: &str) -> bool {
    if contact.name.as_deref() == Some(query) {
        return true;
    }
    let wanted = digits(query);
    !wanted.is_empty() && contact.numbers.iter().any(|n| digits(n) == wanted)
}

#[async_trait]
impl ContactResolver for StaticContacts {
    async fn lookup(&self, query: &str) -> Option<Contact> {
        self.lock().iter().find(|c| matches(c, query)).cloned()
    }

    async fn set_avatar(&self, contact: &Contact, avatar: &Path) {
        let mut contacts = self.lock();
        if let Some(entry) = contacts.iter_mut().find(|c| **c == *contact) {
            entry.avatar = Some(avatar.to_path_buf());
        }
    }
}
