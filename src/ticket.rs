//! Ticket identifiers
//!
//! Subjects carry an explicit `Ticket ID: 12345` label, while case
//! folders are simply named after the ticket (`12345 - Acme`). The two
//! are matched with separate patterns.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static SUBJECT_TICKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Ticket ID:\s*(\d+)").expect("valid regex"));

static FOLDER_TICKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{5,}").expect("valid regex"));

/// A ticket number as a digit string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// The ticket labelled `Ticket ID:` in a message subject.
    #[must_use]
    pub fn from_subject(subject: &str) -> Option<Self> {
        SUBJECT_TICKET
            .captures(subject)
            .and_then(|caps| caps.get(1))
            .map(|m| Self(m.as_str().to_string()))
    }

    /// The first run of five or more digits in a folder name.
    #[must_use]
    pub fn from_folder_name(name: &str) -> Option<Self> {
        FOLDER_TICKET
            .find(name)
            .map(|m| Self(m.as_str().to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `subject` mentions this ticket anywhere.
    #[must_use]
    pub fn mentioned_in(&self, subject: &str) -> bool {
        subject.contains(&self.0)
    }

    /// The ticket's URL under a configured prefix.
    #[must_use]
    pub fn url(&self, template: &str) -> String {
        format!("{template}{}", self.0)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
