// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Propagation of SNEx1's bitmask group encoding into per-object grants.
//!
//! SNEx1 assigns every collaboration group a power-of-two `idcode` and stores
//! an object's visibility as the sum of the groups allowed to see it. SNEx2
//! models the same thing as django-guardian group-object-permission rows, so
//! each set bit becomes one grant of a named permission to that group's
//! destination counterpart.

use indexmap::IndexMap;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::snex2;

#[derive(Error, Debug)]
pub(crate) enum GrantError {
    #[error("SNEx2 has no '{0}' permission; is the destination fully migrated?")]
    MissingPermission(&'static str),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Decompose a bitmask into its set bits, smallest first: `powers_of_two(11)`
/// is `[1, 2, 8]`.
pub(crate) fn powers_of_two(num: i64) -> Vec<i64> {
    let mut powers = Vec::new();
    let mut i: i64 = 1;
    while i > 0 && i <= num {
        if i & num != 0 {
            powers.push(i);
        }
        i <<= 1;
    }
    powers
}

/// Grant `codename` on object `object_pk` to every destination group whose
/// bit is set in `bitmask`. Granting an already-held permission is a no-op. A
/// bit whose group has no destination counterpart yet is skipped with a
/// warning; the grant is retried the next time this object changes.
pub(crate) fn grant_for_bitmask(
    conn: &Connection,
    groups: &IndexMap<String, i64>,
    bitmask: i64,
    codename: &'static str,
    object_pk: i64,
) -> Result<(), GrantError> {
    let permission_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM auth_permission WHERE codename = ?1",
            params![codename],
            |row| row.get(0),
        )
        .optional()?;
    let permission_id = permission_id.ok_or(GrantError::MissingPermission(codename))?;

    // guardian stores object keys as text to stay model-agnostic.
    let object_pk = object_pk.to_string();
    let member_bits = powers_of_two(bitmask);
    for (name, idcode) in groups {
        if !member_bits.contains(idcode) {
            continue;
        }

        let group_id = match snex2::group_id_by_name(conn, name)? {
            Some(id) => id,
            None => {
                warn!("Group '{name}' has no SNEx2 counterpart; not granting '{codename}'");
                continue;
            }
        };

        let held: Option<i64> = conn
            .query_row(
                "SELECT id FROM guardian_groupobjectpermission
                 WHERE permission_id = ?1 AND group_id = ?2 AND object_pk = ?3",
                params![permission_id, group_id, object_pk],
                |row| row.get(0),
            )
            .optional()?;
        if held.is_none() {
            conn.execute(
                "INSERT INTO guardian_groupobjectpermission (permission_id, group_id, object_pk)
                 VALUES (?1, ?2, ?3)",
                params![permission_id, group_id, object_pk],
            )?;
            debug!("Granted '{codename}' on object {object_pk} to group '{name}'");
        }
    }

    Ok(())
}
