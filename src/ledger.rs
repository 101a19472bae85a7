// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading and retiring entries of the SNEx1 `db_changes` ledger.
//!
//! Triggers on the SNEx1 side append one ledger row per mutation: the mutated
//! table's name, the mutated row's id (or a textual locator for mutations
//! that can't be found by id any more, like renames and deletions of keyed
//! rows), and the action taken. Entries are applied oldest-first and deleted
//! once their change has committed to SNEx2, so the ledger only ever holds
//! outstanding work and an interrupted run picks up where it left off.

use rusqlite::{params, Connection};
use strum_macros::{Display, EnumIter};

/// The SNEx1 tables whose mutations are mirrored into SNEx2.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, EnumIter)]
pub(crate) enum ChangeTable {
    #[strum(serialize = "targets")]
    Targets,
    #[strum(serialize = "targetnames")]
    TargetNames,
    #[strum(serialize = "photlco")]
    Photometry,
    #[strum(serialize = "spec")]
    Spectra,
    #[strum(serialize = "users")]
    Users,
    #[strum(serialize = "groups")]
    Groups,
}

/// What happened to the source row.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, EnumIter)]
pub(crate) enum ChangeAction {
    #[strum(serialize = "delete")]
    Delete,
    #[strum(serialize = "insert")]
    Insert,
    #[strum(serialize = "update")]
    Update,
}

/// One outstanding ledger entry.
#[derive(Debug, Clone)]
pub(crate) struct ChangeRecord {
    /// The ledger row's own id; consuming the entry deletes this row.
    pub(crate) id: i64,
    pub(crate) table: ChangeTable,
    pub(crate) action: ChangeAction,
    /// The id of the mutated row in `table`, or 0 when the entry is keyed by
    /// `locator` instead.
    pub(crate) row_id: i64,
    /// A key for mutations that can't be resolved by row id, e.g. the
    /// username behind a deleted `users` row.
    pub(crate) locator: Option<String>,
}

/// Read all outstanding entries for one table and action, oldest first.
pub(crate) fn read_changes(
    conn: &Connection,
    table: ChangeTable,
    action: ChangeAction,
) -> Result<Vec<ChangeRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, rowid, locator FROM db_changes WHERE tablename = ?1 AND action = ?2 ORDER BY id",
    )?;
    let records = stmt
        .query_map(params![table.to_string(), action.to_string()], |row| {
            Ok(ChangeRecord {
                id: row.get(0)?,
                table,
                action,
                row_id: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                locator: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// How many entries are outstanding for one table and action.
pub(crate) fn pending_count(
    conn: &Connection,
    table: ChangeTable,
    action: ChangeAction,
) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) FROM db_changes WHERE tablename = ?1 AND action = ?2",
        params![table.to_string(), action.to_string()],
        |row| row.get(0),
    )
}

/// Retire a ledger entry once its change has committed to SNEx2. Consuming an
/// already-consumed entry is a no-op, so replaying after a crash is safe.
pub(crate) fn consume(conn: &Connection, record_id: i64) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM db_changes WHERE id = ?1", params![record_id])?;
    Ok(())
}

/// Retire every ledger entry for one row of one table, regardless of action.
/// Used when the row's destination data is gone and any queued changes for it
/// are moot.
pub(crate) fn purge_row(
    conn: &Connection,
    table: ChangeTable,
    row_id: i64,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM db_changes WHERE tablename = ?1 AND rowid = ?2",
        params![table.to_string(), row_id],
    )
}
