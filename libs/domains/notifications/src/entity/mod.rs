//! Sea-ORM entities for the notification tables.
//!
//! Enum columns are stored as their snake_case string form.

pub mod alert;
pub mod error_log;
pub mod notification;
pub mod opt_out;
pub mod template;

use std::str::FromStr;

use crate::error::NotificationError;

pub(crate) fn parse_column<T: FromStr>(column: &str, raw: &str) -> Result<T, NotificationError> {
    T::from_str(raw).map_err(|_| {
        NotificationError::DatabaseError(format!("unexpected value '{}' in column {}", raw, column))
    })
}
