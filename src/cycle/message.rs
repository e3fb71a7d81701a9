//! Outbound update report.

use crate::collector::UpdateRecord;
use failure::Fallible;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::{SystemTime, UNIX_EPOCH};

lazy_static! {
    /// Knowledge-base identifier embedded in an update title.
    static ref KB_IN_TITLE: Regex = Regex::new(r"KB\w*").expect("invalid KB regex");
}

/// Report of pending updates for one host.
///
/// Field names are part of the wire format, consumers rely on them
/// (including the `tittle` spelling).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct UpdateReport {
    pub(crate) hostname: String,
    /// Unix timestamp, in seconds.
    pub(crate) time: i64,
    pub(crate) updates: Vec<UpdateEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct UpdateEntry {
    pub(crate) kb: String,
    pub(crate) tittle: String,
    pub(crate) software: String,
}

impl UpdateReport {
    pub(crate) fn new(hostname: &str, time: i64, records: Vec<UpdateRecord>) -> Self {
        let updates = records.into_iter().map(UpdateEntry::from).collect();
        Self {
            hostname: hostname.to_lowercase(),
            time,
            updates,
        }
    }

    /// Serialize to the JSON wire format.
    pub(crate) fn to_payload(&self) -> Fallible<Vec<u8>> {
        let payload = serde_json::to_vec(self)?;
        Ok(payload)
    }
}

impl From<UpdateRecord> for UpdateEntry {
    fn from(record: UpdateRecord) -> Self {
        let kb = if record.id.is_empty() {
            KB_IN_TITLE
                .find(&record.title)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        } else {
            record.id
        };

        Self {
            kb: kb.to_lowercase(),
            tittle: record.title,
            software: record.product.to_lowercase(),
        }
    }
}

/// Hostname to report, either configured or from the OS.
pub(crate) fn resolve_hostname(configured: Option<&str>) -> Fallible<String> {
    if let Some(name) = configured {
        return Ok(name.to_string());
    }

    let os_name = hostname::get()?;
    os_name
        .into_string()
        .map_err(|raw| format_err!("non UTF-8 hostname {:?}", raw))
}

/// Current time as Unix seconds.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
