// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mirroring SNEx1 targets and their aliases.
//!
//! A destination target keeps its SNEx1 id, so the measurement pipelines can
//! anchor datums without a mapping table. Its display name comes from the
//! oldest `targetnames` row; later aliases only add `targetname` rows. The
//! `targets` table itself carries no name at all, which is why a target that
//! was never named cannot be synced and why renames arrive through the alias
//! pipeline instead of the target one.

use log::{debug, info};
use rusqlite::Connection;

use super::{utc_now, SkipReason, SyncContext, SyncError, SyncOutcome};
use crate::{
    grants,
    ledger::{ChangeAction, ChangeRecord},
    snex1, snex2,
};

const TARGET_PERMISSIONS: [&str; 3] = ["change_target", "delete_target", "view_target"];

pub(crate) fn apply_target_change(
    snex1_conn: &Connection,
    snex2_conn: &mut Connection,
    ctx: &SyncContext,
    record: &ChangeRecord,
) -> Result<SyncOutcome, SyncError> {
    let tx = snex2_conn.transaction()?;

    if record.action == ChangeAction::Delete {
        // The source row is gone; nothing to resolve. Destination-side
        // cascades take aliases, extras and measurements with the target.
        let outcome = if snex2::delete_target(&tx, record.row_id)? == 0 {
            SyncOutcome::Skipped(SkipReason::AlreadyGone)
        } else {
            SyncOutcome::Applied
        };
        tx.commit()?;
        return Ok(outcome);
    }

    let target = match snex1::resolve_target(snex1_conn, record.row_id)? {
        Some(t) => t,
        None => {
            tx.commit()?;
            return Ok(SyncOutcome::Skipped(SkipReason::RowVanished));
        }
    };
    let name = match snex1::first_name_for_target(snex1_conn, target.id)? {
        Some(n) => n,
        None => {
            // Created and thrown away without ever being named; there is
            // nothing presentable to sync.
            tx.commit()?;
            return Ok(SyncOutcome::Skipped(SkipReason::NeverNamed));
        }
    };

    match record.action {
        ChangeAction::Insert => {
            snex2::upsert_target(
                &tx,
                &snex2::TargetUpsert {
                    id: target.id,
                    name: &name,
                    ra: target.ra,
                    dec: target.dec,
                    created: target.created(),
                    modified: target.last_modified.as_deref(),
                },
            )?;
            snex2::advance_target_sequence(&tx, target.id)?;
            info!("Created target {} '{}'", target.id, name);
        }
        ChangeAction::Update => {
            let patched = snex2::patch_target(
                &tx,
                &snex2::TargetPatch {
                    id: target.id,
                    ra: target.ra,
                    dec: target.dec,
                    created: target.created(),
                    modified: target.last_modified.as_deref(),
                },
            )?;
            if patched == 0 {
                // An update for a target that predates syncing; promote it
                // to a full insert rather than retrying forever.
                info!("Target {} was never synced; creating it now", target.id);
                snex2::upsert_target(
                    &tx,
                    &snex2::TargetUpsert {
                        id: target.id,
                        name: &name,
                        ra: target.ra,
                        dec: target.dec,
                        created: target.created(),
                        modified: target.last_modified.as_deref(),
                    },
                )?;
                snex2::advance_target_sequence(&tx, target.id)?;
            }
        }
        ChangeAction::Delete => unreachable!("handled above"),
    }

    apply_extras(&tx, snex1_conn, &target)?;
    for codename in TARGET_PERMISSIONS {
        grants::grant_for_bitmask(&tx, ctx.groups, target.group_bitmask, codename, target.id)?;
    }

    tx.commit()?;
    Ok(SyncOutcome::Applied)
}

/// Refresh the target's extra attributes: redshift (with its float shadow
/// column for range queries) and the classification, resolved to its display
/// name.
fn apply_extras(
    tx: &Connection,
    snex1_conn: &Connection,
    target: &snex1::TargetRow,
) -> Result<(), SyncError> {
    if let Some(z) = target.redshift {
        snex2::upsert_target_extra(tx, target.id, "redshift", &z.to_string(), Some(z))?;
    }
    if let Some(class_id) = target.classification_id {
        match snex1::classification_name(snex1_conn, class_id)? {
            Some(class_name) => {
                snex2::upsert_target_extra(tx, target.id, "classification", &class_name, None)?;
            }
            None => debug!(
                "Target {} references missing classification {class_id}; leaving the extra alone",
                target.id
            ),
        }
    }
    Ok(())
}

pub(crate) fn apply_name_change(
    snex1_conn: &Connection,
    snex2_conn: &mut Connection,
    ctx: &SyncContext,
    record: &ChangeRecord,
) -> Result<SyncOutcome, SyncError> {
    if record.action == ChangeAction::Delete {
        // TODO: populate db_changes.locator for targetnames deletions on the
        // SNEx1 side; without it we can't tell which alias row to remove.
        return Ok(SyncOutcome::Skipped(SkipReason::LocatorMissing));
    }

    let name_row = match snex1::resolve_target_name(snex1_conn, record.row_id)? {
        Some(n) => n,
        None => return Ok(SyncOutcome::Skipped(SkipReason::RowVanished)),
    };
    if ctx.standard_targets.contains(&name_row.target_id) {
        return Ok(SyncOutcome::Skipped(SkipReason::Standard));
    }

    let tx = snex2_conn.transaction()?;
    let outcome = match record.action {
        ChangeAction::Update => {
            if snex2::set_target_display_name(&tx, name_row.target_id, &name_row.name)? == 0 {
                SyncOutcome::Skipped(SkipReason::Unlinked)
            } else {
                snex2::ensure_alias(&tx, name_row.target_id, &name_row.name, &utc_now())?;
                SyncOutcome::Applied
            }
        }
        ChangeAction::Insert => {
            snex2::ensure_alias(&tx, name_row.target_id, &name_row.name, &utc_now())?;
            SyncOutcome::Applied
        }
        ChangeAction::Delete => unreachable!("handled above"),
    };
    tx.commit()?;
    Ok(outcome)
}
