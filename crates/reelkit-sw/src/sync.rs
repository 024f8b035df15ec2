//! Background sync tasks.
//!
//! The host hands the proxy a tag string when a deferred sync fires;
//! [`SyncTask::from_tag`] maps it onto an explicit task enum so adding real
//! sync work later is a closed decision instead of string matching spread
//! through handlers.

/// Tag the application registers for deferred reel-data uploads.
pub const DATA_SYNC_TAG: &str = "sync-logreel-data";

/// A background task the proxy knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncTask {
    /// Upload locally captured reel data to the server. Reserved: no endpoint
    /// is contacted yet, the handler only records that the task fired.
    DataSync,
    /// Anything registered under an unrecognized tag; handled as a no-op.
    #[default]
    Ignored,
}

impl SyncTask {
    /// Map a host sync tag onto a task.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            DATA_SYNC_TAG => SyncTask::DataSync,
            _ => SyncTask::Ignored,
        }
    }

    /// The tag this task is registered under, if any.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            SyncTask::DataSync => Some(DATA_SYNC_TAG),
            SyncTask::Ignored => None,
        }
    }
}
