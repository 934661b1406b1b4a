use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Entry;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Key,
    Expiration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Ordering applied when listing a namespace's entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl EntrySort {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Clicking the active column flips direction; a new column starts ascending.
    pub fn toggle(self, field: SortField) -> Self {
        if self.field == field {
            let direction = match self.direction {
                SortDirection::Asc => SortDirection::Desc,
                SortDirection::Desc => SortDirection::Asc,
            };
            Self { field, direction }
        } else {
            Self {
                field,
                direction: SortDirection::Asc,
            }
        }
    }

    pub fn apply(&self, entries: &mut [Entry]) {
        entries.sort_by(|a, b| {
            let ord = match self.field {
                SortField::Key => a.key.cmp(&b.key),
                // Entries without expiration sort before any timestamp.
                SortField::Expiration => cmp_expiration(a.expiration, b.expiration)
                    .then_with(|| a.key.cmp(&b.key)),
            };
            match self.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    }
}

fn cmp_expiration(a: Option<i64>, b: Option<i64>) -> Ordering {
    a.unwrap_or(0).cmp(&b.unwrap_or(0))
}

/// Renders an expiration (unix seconds) as a UTC calendar date.
pub fn format_expiration(expiration: Option<i64>) -> String {
    let Some(ts) = expiration.filter(|ts| *ts != 0) else {
        return "No expiration".to_string();
    };
    match OffsetDateTime::from_unix_timestamp(ts) {
        Ok(dt) => {
            let date = dt.date();
            format!(
                "{:04}-{:02}-{:02}",
                date.year(),
                u8::from(date.month()),
                date.day()
            )
        }
        Err(_) => format!("@{}", ts),
    }
}
