//! Read-receipt aggregation.
//!
//! A message carries a per-user acknowledgment map; the UI shows one of three
//! states derived from the acknowledgments of everyone except the viewer.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::Username;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadStatus {
    Sent,
    PartiallyRead,
    FullyRead,
}

/// Reduce `read_by` to a display status from the point of view of `self_user`.
pub fn status(
    read_by: &BTreeMap<Username, bool>,
    participants: &BTreeSet<Username>,
    self_user: &Username,
) -> ReadStatus {
    let others = participants.iter().filter(|u| *u != self_user);

    let (total, read) = others.fold((0usize, 0usize), |(total, read), u| {
        let acked = read_by.get(u).copied().unwrap_or(false);
        (total + 1, read + usize::from(acked))
    });

    match (total, read) {
        (0, _) => ReadStatus::FullyRead,
        (_, 0) => ReadStatus::Sent,
        (t, r) if r < t => ReadStatus::PartiallyRead,
        _ => ReadStatus::FullyRead,
    }
}

/// Initial acknowledgments for a freshly sent message: the sender has read it.
pub fn initial_read_by(
    participants: &BTreeSet<Username>,
    sender: &Username,
) -> BTreeMap<Username, bool> {
    participants
        .iter()
        .map(|u| (u.clone(), u == sender))
        .collect()
}

/// Mark `reader` as having read a message. Returns whether anything changed.
///
/// Senders and non-participants never change the map, and a second call is a
/// no-op.
pub fn apply_read(
    read_by: &mut BTreeMap<Username, bool>,
    participants: &BTreeSet<Username>,
    sender: &Username,
    reader: &Username,
) -> bool {
    if reader == sender || !participants.contains(reader) {
        return false;
    }
    match read_by.get(reader) {
        Some(true) => false,
        _ => {
            read_by.insert(reader.clone(), true);
            true
        }
    }
}
