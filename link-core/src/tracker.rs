//! Notification tracker for one remote device.
//!
//! Keeps the set of notifications that are showing (or expected to show)
//! and decides whether an incoming notification is new, an update of one we
//! already track, or a duplicate that arrived through another path (a local
//! telephony event and the remote's own notification for the same call).
//!
//! Records are correlated by content, not position. Lookups are tried in a
//! fixed order and the first hit wins:
//!
//! 1. equal `time`: merge the query into the record
//! 2. query `id` equals a record's `local_id`
//! 3. query `id` equals a record's remote `id`: merge
//! 4. a local placeholder (has `local_id`, no `time`) with an equal `ticker`:
//!    merge, and close it right away if it was marked for closing
//!
//! Like the rest of this crate the tracker does no I/O. Operations return
//! [`TrackerAction`]s that the client carries out.

use pairlink_types::NotificationBody;

/// Canonical state of one tracked notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationRecord {
    /// Remote-assigned identifier, once known.
    pub id: Option<String>,
    /// Locally-assigned identifier, for records that started as a placeholder.
    pub local_id: Option<String>,
    /// Remote timestamp.
    pub time: Option<String>,
    /// Short text used for duplicate correlation.
    pub ticker: Option<String>,
    /// Posting application.
    pub app_name: Option<String>,
    /// Title.
    pub title: Option<String>,
    /// Body text.
    pub text: Option<String>,
    /// Marked to be closed as soon as the remote id is known.
    pub is_cancel: bool,
    /// Whether the remote lets the user dismiss it.
    pub is_clearable: Option<bool>,
    /// Reply token, when the notification accepts a reply.
    pub request_reply_id: Option<String>,
    /// Show without sound.
    pub silent: Option<bool>,
}

impl NotificationRecord {
    /// Record for a notification received from the remote.
    pub fn from_body(body: &NotificationBody) -> Self {
        Self {
            id: (!body.id.is_empty()).then(|| body.id.clone()),
            local_id: None,
            time: body.time.clone(),
            ticker: body.ticker.clone(),
            app_name: body.app_name.clone(),
            title: body.title.clone(),
            text: body.text.clone(),
            is_cancel: body.is_cancel,
            is_clearable: body.is_clearable,
            request_reply_id: body.request_reply_id.clone(),
            silent: body.silent,
        }
    }

    /// Placeholder for a notification we expect the remote to send, e.g. for
    /// a missed call already reported through telephony.
    pub fn placeholder(local_id: impl Into<String>, ticker: impl Into<String>) -> Self {
        Self {
            local_id: Some(local_id.into()),
            ticker: Some(ticker.into()),
            ..Self::default()
        }
    }

    /// Overwrite fields that are present in `other`. Returns whether anything
    /// a user would see changed.
    pub fn merge(&mut self, other: &NotificationRecord) -> bool {
        fn take<T: Clone + PartialEq>(slot: &mut Option<T>, value: &Option<T>) -> bool {
            match value {
                Some(v) if slot.as_ref() != Some(v) => {
                    *slot = Some(v.clone());
                    true
                }
                _ => false,
            }
        }

        take(&mut self.id, &other.id);
        take(&mut self.local_id, &other.local_id);
        take(&mut self.time, &other.time);
        take(&mut self.is_clearable, &other.is_clearable);
        take(&mut self.request_reply_id, &other.request_reply_id);
        take(&mut self.silent, &other.silent);
        self.is_cancel |= other.is_cancel;

        let mut visible = take(&mut self.ticker, &other.ticker);
        visible |= take(&mut self.app_name, &other.app_name);
        visible |= take(&mut self.title, &other.title);
        visible |= take(&mut self.text, &other.text);
        visible
    }

    /// Whether this record is still waiting for the remote copy.
    pub fn is_placeholder(&self) -> bool {
        self.local_id.is_some() && self.time.is_none()
    }
}

/// Which lookup rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Same remote timestamp.
    Timestamp,
    /// Query id is the record's local id.
    LocalId,
    /// Query id is the record's remote id.
    RemoteId,
    /// Remote copy of a local placeholder, matched by ticker.
    PendingTicker,
}

/// Side effects requested by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerAction {
    /// The tracked set changed; observers should refresh.
    ListChanged,
    /// Ask the remote to dismiss this notification.
    RequestClose {
        /// Remote identifier to put in the cancel request.
        remote_id: String,
    },
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    /// Rule that matched.
    pub kind: MatchKind,
    /// Record state after any merge.
    pub record: NotificationRecord,
    /// A merge changed visible content.
    pub changed: bool,
    /// The record was marked for closing and has now been closed and removed.
    pub closed: bool,
    /// Side effects of the lookup itself.
    pub actions: Vec<TrackerAction>,
}

/// Active and expected notifications for one device.
#[derive(Debug, Clone, Default)]
pub struct NotificationTracker {
    records: Vec<NotificationRecord>,
}

impl NotificationTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently tracked records, in no particular order.
    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    /// Number of tracked records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record with the given remote id, without merging anything.
    pub fn get(&self, remote_id: &str) -> Option<&NotificationRecord> {
        self.records
            .iter()
            .find(|r| r.id.as_deref() == Some(remote_id))
    }

    /// Look up a record matching `query`, merging where the rule says so.
    ///
    /// A placeholder that was marked for closing is closed as soon as the
    /// remote copy supplies its id; `Found::closed` reports that and the
    /// returned actions carry the cancel request.
    pub fn find(&mut self, query: &NotificationRecord) -> Option<Found> {
        let (index, kind, changed) = self.locate(query)?;
        let record = self.records[index].clone();

        if kind == MatchKind::PendingTicker && record.is_cancel {
            if let Some(remote_id) = record.id.clone() {
                self.records.remove(index);
                return Some(Found {
                    kind,
                    record,
                    changed,
                    closed: true,
                    actions: vec![
                        TrackerAction::RequestClose { remote_id },
                        TrackerAction::ListChanged,
                    ],
                });
            }
        }

        Some(Found {
            kind,
            record,
            changed,
            closed: false,
            actions: vec![],
        })
    }

    /// Start tracking `record`. Callers look it up first; a record that
    /// already matches must not be tracked twice.
    pub fn track(&mut self, record: NotificationRecord) -> Vec<TrackerAction> {
        self.records.push(record);
        vec![TrackerAction::ListChanged]
    }

    /// Make sure a placeholder for `record` exists.
    pub fn track_duplicate(&mut self, record: NotificationRecord) -> Vec<TrackerAction> {
        match self.find(&record) {
            Some(found) => found.actions,
            None => self.track(record),
        }
    }

    /// Stop tracking whatever matches `query`. No-op if nothing does.
    pub fn untrack(&mut self, query: &NotificationRecord) -> Vec<TrackerAction> {
        match self.locate(query) {
            Some((index, _, _)) => {
                self.records.remove(index);
                vec![TrackerAction::ListChanged]
            }
            None => vec![],
        }
    }

    /// A duplicate was dismissed locally. Close the remote copy now if its id
    /// is known, otherwise mark it so the close happens when it arrives.
    pub fn close_duplicate(&mut self, query: &NotificationRecord) -> Vec<TrackerAction> {
        let Some((index, _, _)) = self.locate(query) else {
            return vec![];
        };
        match self.records[index].id.clone() {
            Some(remote_id) => {
                self.records.remove(index);
                vec![
                    TrackerAction::RequestClose { remote_id },
                    TrackerAction::ListChanged,
                ]
            }
            None => {
                self.records[index].is_cancel = true;
                vec![]
            }
        }
    }

    /// Close a notification by its remote id, local id or timestamp.
    ///
    /// Emits one cancel request and removes the record. Closing something
    /// that is not tracked (including a second close) does nothing.
    pub fn close(&mut self, identifier: &str) -> Vec<TrackerAction> {
        let Some(index) = self.records.iter().position(|r| {
            r.id.as_deref() == Some(identifier)
                || r.local_id.as_deref() == Some(identifier)
                || r.time.as_deref() == Some(identifier)
        }) else {
            return vec![];
        };

        let record = self.records.remove(index);
        let remote_id = record.id.unwrap_or_else(|| identifier.to_string());
        vec![
            TrackerAction::RequestClose { remote_id },
            TrackerAction::ListChanged,
        ]
    }

    /// Forget everything, e.g. when the device disconnects.
    pub fn clear(&mut self) -> Vec<TrackerAction> {
        if self.records.is_empty() {
            return vec![];
        }
        self.records.clear();
        vec![TrackerAction::ListChanged]
    }

    fn locate(&mut self, query: &NotificationRecord) -> Option<(usize, MatchKind, bool)> {
        for (index, record) in self.records.iter_mut().enumerate() {
            if record.time.is_some() && record.time == query.time {
                let changed = record.merge(query);
                return Some((index, MatchKind::Timestamp, changed));
            }
            if record.local_id.is_some() && record.local_id == query.id {
                return Some((index, MatchKind::LocalId, false));
            }
            if record.id.is_some() && record.id == query.id {
                let changed = record.merge(query);
                return Some((index, MatchKind::RemoteId, changed));
            }
            if record.is_placeholder() && record.ticker.is_some() && record.ticker == query.ticker
            {
                let changed = record.merge(query);
                return Some((index, MatchKind::PendingTicker, changed));
            }
        }
        None
    }
}
