//! Column codecs shared by the CRUD modules.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;

/// Fixed-width RFC-3339 so that text ordering matches time ordering.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(col: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion(col, Type::Text, e))
}

/// Wrap a decoding failure as a rusqlite conversion error for column `col`.
pub(crate) fn conversion<E>(col: usize, ty: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(col, ty, Box::new(err))
}
