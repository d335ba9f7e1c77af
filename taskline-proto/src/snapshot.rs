//! Full-listing (`GETALL`) payload grammar.
//!
//! ```text
//! DATE,20250115
//! Buy milk,false
//! Walk dog,true
//! DATE,20250116
//! Pay rent,false
//! ```
//!
//! Lines are separated by any run of CR/LF. A header (`DATE,` plus 7 or 8
//! digits, `DATE` matched case-insensitively) sets the current day; a
//! 7-digit run is left-padded with a single `0` before being read as
//! `yyyyMMdd`, which usually yields an invalid day. An invalid header is
//! dropped and the previous day stays in effect. Every other line is a task:
//! the text before the last comma is the name, the token after it is the
//! state (`true`, case-insensitive, means completed).
//!
//! Parsing never fails. Lines that cannot be used are skipped and reported
//! as [`SnapshotAnomaly`] values so the caller can log them.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};

use crate::command::{WIRE_DATE_FORMAT, parse_wire_date};
use crate::task::{PendingKind, Task};

const HEADER_PREFIX: &str = "DATE,";

/// A line the parser skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotAnomaly {
    /// A header whose digits do not form a valid day.
    #[error("unparseable date header {line:?}")]
    HeaderParse {
        /// The offending line.
        line: String,
    },
    /// A task line with no separating comma or an empty name.
    #[error("malformed task line {line:?}: {reason}")]
    MalformedTaskLine {
        /// The offending line.
        line: String,
        /// Why the line was rejected.
        reason: &'static str,
    },
    /// A task line seen before any valid header.
    #[error("task line {line:?} has no date header")]
    NoDateContext {
        /// The offending line.
        line: String,
    },
}

/// Result of parsing a listing payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Tasks in payload order, all with [`PendingKind::None`].
    pub tasks: Vec<Task>,
    /// Lines that were skipped.
    pub anomalies: Vec<SnapshotAnomaly>,
}

/// Parses a decoded `GETALL` payload.
#[must_use]
pub fn parse(payload: &str) -> Snapshot {
    let now = Utc::now();
    let mut current: Option<NaiveDate> = None;
    let mut snapshot = Snapshot::default();

    for raw in payload.split(['\r', '\n']) {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(digits) = header_digits(line) {
            match header_date(digits) {
                Some(date) => current = Some(date),
                None => snapshot.anomalies.push(SnapshotAnomaly::HeaderParse {
                    line: line.to_string(),
                }),
            }
            continue;
        }

        let Some(date) = current else {
            snapshot.anomalies.push(SnapshotAnomaly::NoDateContext {
                line: line.to_string(),
            });
            continue;
        };

        let Some((name, state)) = line.rsplit_once(',') else {
            snapshot.anomalies.push(SnapshotAnomaly::MalformedTaskLine {
                line: line.to_string(),
                reason: "no separating comma",
            });
            continue;
        };
        let completed = state.trim().eq_ignore_ascii_case("true");

        match Task::from_parts(name, date, completed, now, PendingKind::None) {
            Ok(task) => snapshot.tasks.push(task),
            Err(_) => snapshot.anomalies.push(SnapshotAnomaly::MalformedTaskLine {
                line: line.to_string(),
                reason: "empty name",
            }),
        }
    }

    snapshot
}

/// Renders tasks in listing grammar, grouped by day in ascending order.
///
/// Within a day, tasks keep their input order. Lines end in CRLF.
#[must_use]
pub fn render(tasks: &[Task]) -> String {
    let mut by_day: BTreeMap<NaiveDate, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        by_day.entry(task.date()).or_default().push(task);
    }

    let mut out = String::new();
    for (date, day_tasks) in by_day {
        out.push_str(HEADER_PREFIX);
        out.push_str(&date.format(WIRE_DATE_FORMAT).to_string());
        out.push_str("\r\n");
        for task in day_tasks {
            out.push_str(task.name());
            out.push(',');
            out.push_str(task.state_token());
            out.push_str("\r\n");
        }
    }
    out
}

/// Returns the digit run if `line` has header shape.
fn header_digits(line: &str) -> Option<&str> {
    let prefix = line.get(..HEADER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(HEADER_PREFIX) {
        return None;
    }
    let digits = &line[HEADER_PREFIX.len()..];
    let shaped = matches!(digits.len(), 7 | 8) && digits.bytes().all(|b| b.is_ascii_digit());
    shaped.then_some(digits)
}

fn header_date(digits: &str) -> Option<NaiveDate> {
    if digits.len() == 7 {
        parse_wire_date(&format!("0{digits}"))
    } else {
        parse_wire_date(digits)
    }
}
