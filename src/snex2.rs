// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Write access to the SNEx2 (TOM Toolkit) store.
//!
//! Every function here is a single statement or a short read-then-write and
//! expects to be called inside the per-record transaction owned by the sync
//! pipelines. Ids are assigned by the destination database except for
//! targets, which deliberately reuse their SNEx1 ids so the two stores can be
//! joined by eye.
//!
//! Measurement rows ("datums") are polymorphic: `data_type` distinguishes
//! photometry from spectroscopy and `value` holds a JSON payload. Photometry
//! payloads carry a `snex_id` key tying them back to their `photlco` row;
//! spectra are tied back through link rows in `custom_code_reduceddatumextra`
//! because their payloads only hold the traced spectrum.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

/// A full target row as written on insert. Targets are always sidereal
/// supernovae here, so `type`, `epoch`, `scheme` and `permissions` are fixed
/// in the SQL.
#[derive(Debug, Clone)]
pub(crate) struct TargetUpsert<'a> {
    pub(crate) id: i64,
    pub(crate) name: &'a str,
    pub(crate) ra: Option<f64>,
    pub(crate) dec: Option<f64>,
    pub(crate) created: Option<&'a str>,
    pub(crate) modified: Option<&'a str>,
}

/// The subset of target columns an update is allowed to touch. Notably not
/// the name: renames arrive as `targetnames` changes, not `targets` changes.
#[derive(Debug, Clone)]
pub(crate) struct TargetPatch<'a> {
    pub(crate) id: i64,
    pub(crate) ra: Option<f64>,
    pub(crate) dec: Option<f64>,
    pub(crate) created: Option<&'a str>,
    pub(crate) modified: Option<&'a str>,
}

/// Create a target under its SNEx1 id, or refresh every synced column if it
/// already exists. Replaying an insert entry therefore converges instead of
/// colliding.
pub(crate) fn upsert_target(
    conn: &Connection,
    target: &TargetUpsert,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO tom_targets_basetarget
             (id, name, type, created, modified, ra, dec, epoch, scheme, permissions)
         VALUES (?1, ?2, 'SIDEREAL', ?3, ?4, ?5, ?6, 2000, '', 'PRIVATE')
         ON CONFLICT (id) DO UPDATE SET
             name = excluded.name,
             type = excluded.type,
             created = excluded.created,
             modified = excluded.modified,
             ra = excluded.ra,
             dec = excluded.dec,
             epoch = excluded.epoch,
             scheme = excluded.scheme,
             permissions = excluded.permissions",
        params![
            target.id,
            target.name,
            target.created,
            target.modified,
            target.ra,
            target.dec
        ],
    )?;
    Ok(())
}

/// Returns the number of rows patched: 0 means the target was never synced.
pub(crate) fn patch_target(
    conn: &Connection,
    patch: &TargetPatch,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "UPDATE tom_targets_basetarget SET
             ra = ?2,
             dec = ?3,
             created = ?4,
             modified = ?5,
             type = 'SIDEREAL',
             epoch = 2000,
             scheme = ''
         WHERE id = ?1",
        params![patch.id, patch.ra, patch.dec, patch.created, patch.modified],
    )
}

pub(crate) fn delete_target(conn: &Connection, id: i64) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM tom_targets_basetarget WHERE id = ?1",
        params![id],
    )
}

pub(crate) fn target_name_of(
    conn: &Connection,
    id: i64,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT name FROM tom_targets_basetarget WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
    .optional()
}

pub(crate) fn set_target_display_name(
    conn: &Connection,
    id: i64,
    name: &str,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "UPDATE tom_targets_basetarget SET name = ?2 WHERE id = ?1",
        params![id, name],
    )
}

/// Keep the autoincrement counter ahead of the SNEx1-assigned id, so a target
/// created natively in SNEx2 later can't collide with a synced one.
pub(crate) fn advance_target_sequence(conn: &Connection, id: i64) -> Result<(), rusqlite::Error> {
    let updated = conn.execute(
        "UPDATE sqlite_sequence SET seq = max(seq, ?1) WHERE name = 'tom_targets_basetarget'",
        params![id],
    )?;
    if updated == 0 {
        // No target has ever been autoinserted.
        conn.execute(
            "INSERT INTO sqlite_sequence (name, seq) VALUES ('tom_targets_basetarget', ?1)",
            params![id],
        )?;
    }
    Ok(())
}

/// Set or refresh one key of a target's extra-attributes table.
pub(crate) fn upsert_target_extra(
    conn: &Connection,
    target_id: i64,
    key: &str,
    value: &str,
    float_value: Option<f64>,
) -> Result<(), rusqlite::Error> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM tom_targets_targetextra WHERE target_id = ?1 AND key = ?2",
            params![target_id, key],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE tom_targets_targetextra SET value = ?2, float_value = ?3 WHERE id = ?1",
                params![id, value, float_value],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO tom_targets_targetextra (target_id, key, value, float_value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![target_id, key, value, float_value],
            )?;
        }
    }
    Ok(())
}

/// Record an alias for a target unless it's already known. Returns whether a
/// row was added.
pub(crate) fn ensure_alias(
    conn: &Connection,
    target_id: i64,
    name: &str,
    now: &str,
) -> Result<bool, rusqlite::Error> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM tom_targets_targetname WHERE target_id = ?1 AND name = ?2",
            params![target_id, name],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO tom_targets_targetname (target_id, name, created, modified)
         VALUES (?1, ?2, ?3, ?3)",
        params![target_id, name, now],
    )?;
    Ok(true)
}

/// The datum ids matching a photometry point's logical identity, oldest
/// first. More than one means earlier runs left duplicates behind.
pub(crate) fn phot_datum_ids(
    conn: &Connection,
    target_id: i64,
    timestamp: &str,
    snex_id: i64,
    background_subtracted: Option<bool>,
) -> Result<Vec<i64>, rusqlite::Error> {
    match background_subtracted {
        Some(flag) => {
            let mut stmt = conn.prepare(
                "SELECT id FROM tom_dataproducts_reduceddatum
                 WHERE target_id = ?1 AND timestamp = ?2 AND data_type = 'photometry'
                   AND json_extract(value, '$.snex_id') = ?3
                   AND json_extract(value, '$.background_subtracted') = ?4
                 ORDER BY id",
            )?;
            let ids = stmt
                .query_map(params![target_id, timestamp, snex_id, flag], |row| {
                    row.get(0)
                })?
                .collect();
            ids
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id FROM tom_dataproducts_reduceddatum
                 WHERE target_id = ?1 AND timestamp = ?2 AND data_type = 'photometry'
                   AND json_extract(value, '$.snex_id') = ?3
                 ORDER BY id",
            )?;
            let ids = stmt
                .query_map(params![target_id, timestamp, snex_id], |row| row.get(0))?
                .collect();
            ids
        }
    }
}

/// The oldest datum whose payload carries this `snex_id`, whatever its type.
pub(crate) fn datum_id_by_snex_id(
    conn: &Connection,
    snex_id: i64,
) -> Result<Option<i64>, rusqlite::Error> {
    conn.query_row(
        "SELECT id FROM tom_dataproducts_reduceddatum
         WHERE json_extract(value, '$.snex_id') = ?1 ORDER BY id LIMIT 1",
        params![snex_id],
        |row| row.get(0),
    )
    .optional()
}

pub(crate) fn insert_datum(
    conn: &Connection,
    target_id: i64,
    data_product_id: Option<i64>,
    data_type: &str,
    timestamp: &str,
    value: &Value,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO tom_dataproducts_reduceddatum
             (target_id, data_product_id, data_type, source_name, source_location, timestamp, value)
         VALUES (?1, ?2, ?3, '', '', ?4, ?5)",
        params![target_id, data_product_id, data_type, timestamp, value],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Replace a datum's payload, blanking the source fields the way the Django
/// side does when it re-saves synced data.
pub(crate) fn patch_datum_value(
    conn: &Connection,
    id: i64,
    value: &Value,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "UPDATE tom_dataproducts_reduceddatum
         SET value = ?2, source_name = '', source_location = '' WHERE id = ?1",
        params![id, value],
    )
}

/// Rewrite a spectroscopy datum in place: anchor, timestamp and payload.
pub(crate) fn repoint_spec_datum(
    conn: &Connection,
    id: i64,
    target_id: i64,
    timestamp: &str,
    value: &Value,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "UPDATE tom_dataproducts_reduceddatum
         SET target_id = ?2, timestamp = ?3, value = ?4, data_type = 'spectroscopy',
             source_name = '', source_location = ''
         WHERE id = ?1",
        params![id, target_id, timestamp, value],
    )
}

pub(crate) fn delete_datum(conn: &Connection, id: i64) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM tom_dataproducts_reduceddatum WHERE id = ?1",
        params![id],
    )
}

/// Delete a datum together with the artifact it references, if any. The
/// artifact goes first; its cascade takes the datum with it, and the explicit
/// datum delete covers the artifact-less case. Returns whether an artifact
/// existed.
pub(crate) fn delete_datum_and_artifact(
    conn: &Connection,
    datum_id: i64,
) -> Result<bool, rusqlite::Error> {
    let artifact: Option<i64> = conn
        .query_row(
            "SELECT data_product_id FROM tom_dataproducts_reduceddatum WHERE id = ?1",
            params![datum_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    if let Some(dp_id) = artifact {
        delete_dataproduct(conn, dp_id)?;
    }
    delete_datum(conn, datum_id)?;
    Ok(artifact.is_some())
}

/// A datum as needed for duplicate consolidation.
#[derive(Debug, Clone)]
pub(crate) struct DatumSnapshot {
    pub(crate) id: i64,
    pub(crate) target_id: i64,
    pub(crate) timestamp: String,
    pub(crate) value: Value,
}

pub(crate) fn datum_snapshot(
    conn: &Connection,
    id: i64,
) -> Result<Option<DatumSnapshot>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, target_id, timestamp, value FROM tom_dataproducts_reduceddatum WHERE id = ?1",
        params![id],
        |row| {
            Ok(DatumSnapshot {
                id: row.get(0)?,
                target_id: row.get(1)?,
                timestamp: row.get(2)?,
                value: row.get(3)?,
            })
        },
    )
    .optional()
}

/// Spectroscopy datums carrying the same target, timestamp and payload as
/// `original`, including `original` itself. Payloads are compared as parsed
/// JSON, not text, so formatting differences don't hide duplicates.
pub(crate) fn equal_spec_datums(
    conn: &Connection,
    original: &DatumSnapshot,
) -> Result<Vec<i64>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, value FROM tom_dataproducts_reduceddatum
         WHERE target_id = ?1 AND data_type = 'spectroscopy' AND timestamp = ?2
         ORDER BY id",
    )?;
    let rows = stmt.query_map(params![original.target_id, original.timestamp], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, Value>(1)?))
    })?;
    let mut ids = Vec::new();
    for row in rows {
        let (id, value) = row?;
        if value == original.value {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Create the artifact record for a spectrum's traced ascii file. `name`
/// doubles as `product_id` and (until finalised) `data`; timestamps mirror
/// the observation time rather than wall-clock time so re-syncs are stable.
pub(crate) fn insert_dataproduct(
    conn: &Connection,
    target_id: i64,
    name: &str,
    timestamp: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO tom_dataproducts_dataproduct
             (target_id, product_id, data, extra_data, data_product_type, created, modified, featured)
         VALUES (?1, ?2, ?2, '', 'spectroscopy', ?3, ?3, 0)",
        params![target_id, name, timestamp],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Rewrite the artifact's `data` into the path layout Django's upload handler
/// would have produced: `<target name>/<product type>/<filename>`.
pub(crate) fn finalise_dataproduct_path(
    conn: &Connection,
    dp_id: i64,
    target_name: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE tom_dataproducts_dataproduct
         SET data = ?2 || '/' || data_product_type || '/' || data
         WHERE id = ?1",
        params![dp_id, target_name],
    )?;
    Ok(())
}

pub(crate) fn delete_dataproduct(conn: &Connection, id: i64) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM tom_dataproducts_dataproduct WHERE id = ?1",
        params![id],
    )
}

/// Find the SNEx2 datum id a legacy spectrum was linked to at insert time.
/// `target_id` narrows the scan when the caller knows it.
pub(crate) fn spec_link(
    conn: &Connection,
    target_id: Option<i64>,
    snex_id: i64,
) -> Result<Option<i64>, rusqlite::Error> {
    let value: Option<Value> = match target_id {
        Some(tid) => conn
            .query_row(
                "SELECT value FROM custom_code_reduceddatumextra
                 WHERE target_id = ?1 AND data_type = 'spectroscopy' AND key = 'snex_id'
                   AND json_extract(value, '$.snex_id') = ?2
                 ORDER BY id LIMIT 1",
                params![tid, snex_id],
                |row| row.get(0),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT value FROM custom_code_reduceddatumextra
                 WHERE data_type = 'spectroscopy' AND key = 'snex_id'
                   AND json_extract(value, '$.snex_id') = ?1
                 ORDER BY id LIMIT 1",
                params![snex_id],
                |row| row.get(0),
            )
            .optional()?,
    };
    Ok(value
        .as_ref()
        .and_then(|v| v.get("snex2_id"))
        .and_then(Value::as_i64))
}

pub(crate) fn insert_datum_extra(
    conn: &Connection,
    target_id: i64,
    key: &str,
    value: &Value,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO custom_code_reduceddatumextra (target_id, data_type, key, value)
         VALUES (?1, 'spectroscopy', ?2, ?3)",
        params![target_id, key, value],
    )?;
    Ok(())
}

/// Drop the link and spec-extras rows tied to a legacy spectrum. Without
/// this, a deleted spectrum's stale link would make a later re-insert look
/// already applied.
pub(crate) fn purge_spec_extras(conn: &Connection, snex_id: i64) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM custom_code_reduceddatumextra
         WHERE data_type = 'spectroscopy' AND json_extract(value, '$.snex_id') = ?1",
        params![snex_id],
    )
}

/// Everything written on user creation; password already carries Django's
/// hasher prefix.
#[derive(Debug, Clone)]
pub(crate) struct UserInsert<'a> {
    pub(crate) username: &'a str,
    pub(crate) password: &'a str,
    pub(crate) first_name: Option<&'a str>,
    pub(crate) last_name: Option<&'a str>,
    pub(crate) email: Option<&'a str>,
    pub(crate) date_joined: Option<&'a str>,
}

pub(crate) fn user_id_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<i64>, rusqlite::Error> {
    conn.query_row(
        "SELECT id FROM auth_user WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )
    .optional()
}

pub(crate) fn insert_user(conn: &Connection, user: &UserInsert) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO auth_user
             (username, password, first_name, last_name, email,
              is_staff, is_active, is_superuser, date_joined)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, 1, 0, ?6)",
        params![
            user.username,
            user.password,
            user.first_name,
            user.last_name,
            user.email,
            user.date_joined
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Refresh the mutable account columns of the user currently named
/// `username`, possibly renaming them to `user.username`.
pub(crate) fn patch_user(
    conn: &Connection,
    username: &str,
    user: &UserInsert,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "UPDATE auth_user SET
             username = ?2, password = ?3, first_name = ?4, last_name = ?5, email = ?6
         WHERE username = ?1",
        params![
            username,
            user.username,
            user.password,
            user.first_name,
            user.last_name,
            user.email
        ],
    )
}

pub(crate) fn delete_user(conn: &Connection, username: &str) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM auth_user WHERE username = ?1",
        params![username],
    )
}

pub(crate) fn group_id_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<i64>, rusqlite::Error> {
    conn.query_row(
        "SELECT id FROM auth_group WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
}

/// Group names are unique destination-side; recreating an existing group is
/// a no-op.
pub(crate) fn ensure_group(conn: &Connection, name: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO auth_group (name) VALUES (?1) ON CONFLICT (name) DO NOTHING",
        params![name],
    )?;
    Ok(())
}

pub(crate) fn rename_group(
    conn: &Connection,
    old_name: &str,
    new_name: &str,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "UPDATE auth_group SET name = ?2 WHERE name = ?1",
        params![old_name, new_name],
    )
}

pub(crate) fn delete_group(conn: &Connection, name: &str) -> Result<usize, rusqlite::Error> {
    conn.execute("DELETE FROM auth_group WHERE name = ?1", params![name])
}

/// Add a user to a group unless they're already in it. Returns whether a row
/// was added.
pub(crate) fn ensure_membership(
    conn: &Connection,
    user_id: i64,
    group_id: i64,
) -> Result<bool, rusqlite::Error> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM auth_user_groups WHERE user_id = ?1 AND group_id = ?2",
            params![user_id, group_id],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO auth_user_groups (user_id, group_id) VALUES (?1, ?2)",
        params![user_id, group_id],
    )?;
    Ok(true)
}
