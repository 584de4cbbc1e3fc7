use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use chrono::{DateTime, Local};
use log::info;
use crate::lock;

/// Maximum number of entries kept in the call history.
pub const HISTORY_CAPACITY: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub label: String,
    pub time: DateTime<Local>,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.time.format("%H:%M:%S"))
    }
}

/// Rolling record of recently dialed and received calls, most recent first.
#[derive(Default)]
pub struct HistoryLog {
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl HistoryLog {
    pub fn record(&self, label: impl Into<String>) {
        let entry = HistoryEntry {
            label: label.into(),
            time: Local::now(),
        };
        info!("History: {}", entry);
        let mut entries = lock(&self.entries);
        entries.push_front(entry);
        entries.truncate(HISTORY_CAPACITY);
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        lock(&self.entries).iter().cloned().collect()
    }

    pub fn labels(&self) -> Vec<String> {
        lock(&self.entries).iter().map(|e| e.label.clone()).collect()
    }
}
