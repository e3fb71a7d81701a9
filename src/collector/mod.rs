//! Pending updates enumeration.

mod powershell;

pub(crate) use powershell::PowershellCollector;

use failure::Fallible;
use std::fmt::Debug;

/// Search filter for updates not yet installed.
pub(crate) static PENDING_QUERY: &str = "IsInstalled=0";

/// A pending update, as reported by the local update facility.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct UpdateRecord {
    /// Knowledge-base identifier (e.g. `KB5034441`), may be empty.
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) product: String,
}

/// Source of pending updates.
///
/// Implementations are blocking; callers must keep them off the
/// control loop.
pub(crate) trait Collector: Debug + Send + Sync + 'static {
    /// Return all updates matching `query`.
    fn collect(&self, query: &str) -> Fallible<Vec<UpdateRecord>>;
}
