//! Command encoding for the line-oriented task protocol.
//!
//! Every request is one line ending in [`TERMINATOR`]:
//!
//! ```text
//! GETALL|END
//! ADD|DATE20250115|TASKBuy milk!STATEfalse|END
//! UPDATE|DATE20250115|TASKBuy milk!STATEtrue|END
//! DELETE|DATE20250115|TASKBuy milk!STATEtrue|END
//! ```
//!
//! Task names are written verbatim. There is no escaping, so a name that
//! itself contains `|END` cuts the frame short on the receiving side. This is
//! a limitation of the wire format and is left as-is.

use chrono::{NaiveDate, Utc};

use crate::task::{PendingKind, Task, TaskError};

/// Literal sentinel closing every command and every response.
pub const TERMINATOR: &str = "|END";

/// `strftime` pattern for the 8-digit wire date.
pub const WIRE_DATE_FORMAT: &str = "%Y%m%d";

const GETALL: &str = "GETALL";
const ADD: &str = "ADD";
const UPDATE: &str = "UPDATE";
const DELETE: &str = "DELETE";

const DATE_FIELD: &str = "DATE";
const TASK_FIELD: &str = "|TASK";
const STATE_FIELD: &str = "!STATE";

/// Errors raised when a received command line cannot be understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    /// Nothing but whitespace was received.
    #[error("empty command")]
    Empty,
    /// The leading verb is not one of the four known commands.
    #[error("unknown command verb: {0}")]
    UnknownVerb(String),
    /// A required field marker is absent.
    #[error("missing {0} field")]
    MissingField(&'static str),
    /// The date field is not a valid 8-digit `yyyyMMdd` day.
    #[error("invalid date field: {0}")]
    InvalidDate(String),
    /// The task fields did not form a valid task.
    #[error("invalid task: {0}")]
    InvalidTask(#[from] TaskError),
}

/// One request sent to the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request the full listing.
    GetAll,
    /// Create a task.
    Add(Task),
    /// Replace a task's state, matched by name and date.
    Update(Task),
    /// Remove a task, matched by name and date.
    Delete(Task),
}

impl Command {
    /// Protocol verb of this command.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::GetAll => GETALL,
            Self::Add(_) => ADD,
            Self::Update(_) => UPDATE,
            Self::Delete(_) => DELETE,
        }
    }

    /// Task carried by the command, if any.
    #[must_use]
    pub const fn task(&self) -> Option<&Task> {
        match self {
            Self::GetAll => None,
            Self::Add(task) | Self::Update(task) | Self::Delete(task) => Some(task),
        }
    }

    /// Encodes the command as a terminated wire line.
    #[must_use]
    pub fn encode(&self) -> String {
        match self.task() {
            None => format!("{}{TERMINATOR}", self.verb()),
            Some(task) => format!(
                "{}|{DATE_FIELD}{}{TASK_FIELD}{}{STATE_FIELD}{}{TERMINATOR}",
                self.verb(),
                task.date().format(WIRE_DATE_FORMAT),
                task.name(),
                task.state_token(),
            ),
        }
    }

    /// Parses a command line, with or without its trailing [`TERMINATOR`].
    ///
    /// The date field is fixed-width, and the state marker is located from
    /// the right, so a name containing `|` or `!` still round-trips as long
    /// as it does not contain `|END` or `!STATE`.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandParseError`] describing the first problem found.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let line = line.trim();
        let line = line.strip_suffix(TERMINATOR).unwrap_or(line);
        if line.is_empty() {
            return Err(CommandParseError::Empty);
        }
        if line == GETALL {
            return Ok(Self::GetAll);
        }

        let (verb, rest) = line
            .split_once('|')
            .ok_or_else(|| CommandParseError::UnknownVerb(line.to_string()))?;
        let build: fn(Task) -> Self = match verb {
            ADD => Self::Add,
            UPDATE => Self::Update,
            DELETE => Self::Delete,
            other => return Err(CommandParseError::UnknownVerb(other.to_string())),
        };

        let rest = rest
            .strip_prefix(DATE_FIELD)
            .ok_or(CommandParseError::MissingField(DATE_FIELD))?;
        let digits = rest
            .get(..8)
            .ok_or_else(|| CommandParseError::InvalidDate(rest.to_string()))?;
        let date = parse_wire_date(digits)
            .ok_or_else(|| CommandParseError::InvalidDate(digits.to_string()))?;

        let body = rest[8..]
            .strip_prefix(TASK_FIELD)
            .ok_or(CommandParseError::MissingField("TASK"))?;
        let (name, state) = body
            .rsplit_once(STATE_FIELD)
            .ok_or(CommandParseError::MissingField("STATE"))?;
        let completed = state.trim().eq_ignore_ascii_case("true");

        let task = Task::from_parts(name, date, completed, Utc::now(), PendingKind::None)?;
        Ok(build(task))
    }
}

/// Parses an 8-digit `yyyyMMdd` string into a calendar day.
///
/// Returns `None` for anything that is not exactly eight ASCII digits or
/// that names a non-existent day.
#[must_use]
pub fn parse_wire_date(digits: &str) -> Option<NaiveDate> {
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = digits[..4].parse().ok()?;
    let month: u32 = digits[4..6].parse().ok()?;
    let day: u32 = digits[6..].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
