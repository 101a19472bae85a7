// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Read-only access to the legacy SNEx1 store.
//!
//! Each resolver snapshots one row by its ledger-recorded id. A resolver
//! returning `None` is expected and routine: the row was mutated and then
//! deleted upstream before this run got to it. Columns that the legacy
//! pipeline cannot work without (ids, bitmask group codes, magnitudes) are
//! typed as required here, so a NULL where one should never be surfaces as a
//! per-record error rather than silently producing a malformed destination
//! row.

use std::collections::HashSet;

use indexmap::IndexMap;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A row of `targets`. `ra`/`dec` come from the legacy `ra0`/`dec0` columns.
#[derive(Debug, Clone)]
pub(crate) struct TargetRow {
    pub(crate) id: i64,
    pub(crate) ra: Option<f64>,
    pub(crate) dec: Option<f64>,
    pub(crate) last_modified: Option<String>,
    pub(crate) date_created: Option<String>,
    pub(crate) group_bitmask: i64,
    pub(crate) redshift: Option<f64>,
    pub(crate) classification_id: Option<i64>,
}

impl TargetRow {
    /// SNEx1 backfilled `datecreated` late, so old rows only carry a
    /// modification time.
    pub(crate) fn created(&self) -> Option<&str> {
        self.date_created
            .as_deref()
            .or(self.last_modified.as_deref())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TargetNameRow {
    pub(crate) id: i64,
    pub(crate) target_id: i64,
    pub(crate) name: String,
}

/// A row of `photlco`, the photometry reduction table.
#[derive(Debug, Clone)]
pub(crate) struct PhotRow {
    pub(crate) id: i64,
    pub(crate) target_id: i64,
    pub(crate) date_obs: Option<String>,
    pub(crate) ut: Option<String>,
    pub(crate) mag: f64,
    pub(crate) dmag: Option<f64>,
    pub(crate) file_type: i64,
    pub(crate) filter: Option<String>,
    pub(crate) diff_type: Option<i64>,
    pub(crate) filename: Option<String>,
    pub(crate) telescope: Option<String>,
    pub(crate) instrument: Option<String>,
    pub(crate) group_bitmask: Option<i64>,
}

/// A row of `spec`, the spectroscopy reduction table.
#[derive(Debug, Clone)]
pub(crate) struct SpecRow {
    pub(crate) id: i64,
    pub(crate) target_id: i64,
    pub(crate) date_obs: String,
    pub(crate) ut: String,
    pub(crate) filepath: String,
    pub(crate) filename: String,
    pub(crate) telescope: Option<String>,
    pub(crate) instrument: Option<String>,
    pub(crate) exptime: Option<f64>,
    pub(crate) slit: Option<String>,
    pub(crate) airmass: Option<f64>,
    pub(crate) reducer: Option<String>,
    pub(crate) group_bitmask: Option<i64>,
}

#[derive(Debug, Clone)]
pub(crate) struct UserRow {
    pub(crate) username: String,
    /// The crypt(3) hash, without the `crypt$$` prefix Django expects.
    pub(crate) pw: String,
    pub(crate) firstname: Option<String>,
    pub(crate) lastname: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) date_joined: Option<String>,
    pub(crate) group_bitmask: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct GroupRow {
    pub(crate) name: String,
}

pub(crate) fn resolve_target(
    conn: &Connection,
    id: i64,
) -> Result<Option<TargetRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, ra0, dec0, lastmodified, datecreated, groupidcode, redshift, classificationid
         FROM targets WHERE id = ?1",
        params![id],
        |row| {
            Ok(TargetRow {
                id: row.get(0)?,
                ra: row.get(1)?,
                dec: row.get(2)?,
                last_modified: row.get(3)?,
                date_created: row.get(4)?,
                group_bitmask: row.get(5)?,
                redshift: row.get(6)?,
                classification_id: row.get(7)?,
            })
        },
    )
    .optional()
}

pub(crate) fn resolve_target_name(
    conn: &Connection,
    id: i64,
) -> Result<Option<TargetNameRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, targetid, name FROM targetnames WHERE id = ?1",
        params![id],
        |row| {
            Ok(TargetNameRow {
                id: row.get(0)?,
                target_id: row.get(1)?,
                name: row.get(2)?,
            })
        },
    )
    .optional()
}

fn phot_from_row(row: &Row) -> Result<PhotRow, rusqlite::Error> {
    Ok(PhotRow {
        id: row.get(0)?,
        target_id: row.get(1)?,
        date_obs: row.get(2)?,
        ut: row.get(3)?,
        mag: row.get(4)?,
        dmag: row.get(5)?,
        file_type: row.get(6)?,
        filter: row.get(7)?,
        diff_type: row.get(8)?,
        filename: row.get(9)?,
        telescope: row.get(10)?,
        instrument: row.get(11)?,
        group_bitmask: row.get(12)?,
    })
}

pub(crate) fn resolve_phot(
    conn: &Connection,
    id: i64,
) -> Result<Option<PhotRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, targetid, dateobs, ut, mag, dmag, filetype, filter, difftype, filename,
                telescope, instrument, groupidcode
         FROM photlco WHERE id = ?1",
        params![id],
        |row| phot_from_row(row),
    )
    .optional()
}

pub(crate) fn resolve_spec(
    conn: &Connection,
    id: i64,
) -> Result<Option<SpecRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, targetid, dateobs, ut, filepath, filename, telescope, instrument, exptime,
                slit, airmass, reducer, groupidcode
         FROM spec WHERE id = ?1",
        params![id],
        |row| {
            Ok(SpecRow {
                id: row.get(0)?,
                target_id: row.get(1)?,
                date_obs: row.get(2)?,
                ut: row.get(3)?,
                filepath: row.get(4)?,
                filename: row.get(5)?,
                telescope: row.get(6)?,
                instrument: row.get(7)?,
                exptime: row.get(8)?,
                slit: row.get(9)?,
                airmass: row.get(10)?,
                reducer: row.get(11)?,
                group_bitmask: row.get(12)?,
            })
        },
    )
    .optional()
}

pub(crate) fn resolve_user(
    conn: &Connection,
    id: i64,
) -> Result<Option<UserRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT name, pw, firstname, lastname, email, datecreated, groupidcode
         FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok(UserRow {
                username: row.get(0)?,
                pw: row.get(1)?,
                firstname: row.get(2)?,
                lastname: row.get(3)?,
                email: row.get(4)?,
                date_joined: row.get(5)?,
                group_bitmask: row.get(6)?,
            })
        },
    )
    .optional()
}

pub(crate) fn resolve_group(
    conn: &Connection,
    id: i64,
) -> Result<Option<GroupRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT name FROM groups WHERE id = ?1",
        params![id],
        |row| Ok(GroupRow { name: row.get(0)? }),
    )
    .optional()
}

/// The display name of a target, taken from its oldest `targetnames` row.
/// `None` means the target was created and deleted without ever being named.
pub(crate) fn first_name_for_target(
    conn: &Connection,
    target_id: i64,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT name FROM targetnames WHERE targetid = ?1 ORDER BY id LIMIT 1",
        params![target_id],
        |row| row.get(0),
    )
    .optional()
}

pub(crate) fn classification_name(
    conn: &Connection,
    classification_id: i64,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT name FROM classifications WHERE id = ?1",
        params![classification_id],
        |row| row.get(0),
    )
    .optional()
}

/// The ids of targets classified as calibration standards. Standards live in
/// SNEx1 for the photometric pipeline's benefit and are never shown in SNEx2,
/// so their measurements aren't synced.
pub(crate) fn standard_target_ids(conn: &Connection) -> Result<HashSet<i64>, rusqlite::Error> {
    let standard_classification: Option<i64> = conn
        .query_row(
            "SELECT id FROM classifications WHERE name = 'Standard' ORDER BY id LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    // No 'Standard' classification means no standards; -1 matches nothing.
    let standard_classification = standard_classification.unwrap_or(-1);

    let mut stmt = conn.prepare("SELECT id FROM targets WHERE classificationid = ?1")?;
    let ids = stmt
        .query_map(params![standard_classification], |row| row.get(0))?
        .collect::<Result<HashSet<i64>, _>>()?;
    Ok(ids)
}

/// The legacy group name -> bitmask id map. Entry order follows the `groups`
/// table so that grants are issued in a stable order.
pub(crate) fn group_map(conn: &Connection) -> Result<IndexMap<String, i64>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT name, idcode FROM groups ORDER BY id")?;
    let mut map = IndexMap::new();
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (name, idcode) = row?;
        map.insert(name, idcode);
    }
    Ok(map)
}
