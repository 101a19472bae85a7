// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mirroring rows of SNEx1's photometry reduction table.
//!
//! Each synced `photlco` row becomes one photometry datum whose JSON payload
//! carries the measurement and a `snex_id` back-link. A point can exist twice
//! at the same timestamp, once unsubtracted (filetype 1) and once
//! template-subtracted (filetype 3), so lookups match on the
//! `background_subtracted` flag whenever the payload has one.

use log::{debug, info};
use rusqlite::Connection;
use serde_json::{json, Value};

use super::{observation_timestamp, SkipReason, SyncContext, SyncError, SyncOutcome};
use crate::{
    grants,
    ledger::{self, ChangeAction, ChangeRecord, ChangeTable},
    snex1, snex2,
};

pub(crate) fn apply_phot_change(
    snex1_conn: &Connection,
    snex2_conn: &mut Connection,
    ctx: &SyncContext,
    record: &ChangeRecord,
) -> Result<SyncOutcome, SyncError> {
    if record.action == ChangeAction::Delete {
        let tx = snex2_conn.transaction()?;
        let outcome = match snex2::datum_id_by_snex_id(&tx, record.row_id)? {
            Some(datum_id) => {
                snex2::delete_datum(&tx, datum_id)?;
                SyncOutcome::Applied
            }
            None => SyncOutcome::Skipped(SkipReason::AlreadyGone),
        };
        tx.commit()?;

        // With the destination datum gone, any queued inserts or updates for
        // this point are moot; retire them so later passes don't resurrect it.
        let purged = ledger::purge_row(snex1_conn, ChangeTable::Photometry, record.row_id)?;
        if purged > 0 {
            debug!(
                "Retired {purged} other pending changes for deleted photometry row {}",
                record.row_id
            );
        }
        return Ok(outcome);
    }

    let phot = match snex1::resolve_phot(snex1_conn, record.row_id)? {
        Some(p) => p,
        None => return Ok(SyncOutcome::Skipped(SkipReason::RowVanished)),
    };
    if ctx.standard_targets.contains(&phot.target_id) {
        return Ok(SyncOutcome::Skipped(SkipReason::Standard));
    }
    if !matches!(phot.file_type, 1 | 3) {
        return Ok(SyncOutcome::Skipped(SkipReason::UnsyncedFiletype));
    }

    let timestamp = observation_timestamp(phot.date_obs.as_deref(), phot.ut.as_deref());
    let payload = build_payload(&phot)?;
    let background_subtracted = payload
        .get("background_subtracted")
        .and_then(Value::as_bool);

    let tx = snex2_conn.transaction()?;
    if snex2::target_name_of(&tx, phot.target_id)?.is_none() {
        return Err(SyncError::MissingTarget(phot.target_id));
    }

    let existing = snex2::phot_datum_ids(
        &tx,
        phot.target_id,
        &timestamp,
        phot.id,
        background_subtracted,
    )?;
    let datum_id = match consolidate(&tx, &existing)? {
        Some(id) => {
            snex2::patch_datum_value(&tx, id, &payload)?;
            id
        }
        None => snex2::insert_datum(&tx, phot.target_id, None, "photometry", &timestamp, &payload)?,
    };

    if let Some(bitmask) = phot.group_bitmask {
        grants::grant_for_bitmask(&tx, ctx.groups, bitmask, "view_reduceddatum", datum_id)?;
    }
    tx.commit()?;
    Ok(SyncOutcome::Applied)
}

/// The JSON payload for one photometry point. A 9999 magnitude is the legacy
/// marker for "no measurement yet"; such points sync as a bare back-link so
/// the datum's slot exists and later reductions can fill it in.
fn build_payload(phot: &snex1::PhotRow) -> Result<Value, SyncError> {
    if phot.mag as i64 == 9999 {
        return Ok(json!({ "snex_id": phot.id }));
    }
    match phot.file_type {
        1 => Ok(json!({
            "magnitude": phot.mag,
            "filter": phot.filter,
            "error": require(phot.id, phot.dmag, "dmag")?,
            "snex_id": phot.id,
            "background_subtracted": false,
            "telescope": phot.telescope,
            "instrument": phot.instrument,
        })),
        3 => match phot.diff_type {
            Some(diff_type) => {
                let algorithm = match diff_type {
                    0 => "Hotpants",
                    1 => "PyZOGY",
                    other => {
                        return Err(SyncError::UnknownDiffType {
                            row_id: phot.id,
                            diff_type: other,
                        })
                    }
                };
                let filename = require(phot.id, phot.filename.as_deref(), "filename")?;
                let template_source = if filename.contains("SDSS") {
                    "SDSS"
                } else {
                    "LCO"
                };
                Ok(json!({
                    "magnitude": phot.mag,
                    "filter": phot.filter,
                    "error": require(phot.id, phot.dmag, "dmag")?,
                    "snex_id": phot.id,
                    "background_subtracted": true,
                    "subtraction_algorithm": algorithm,
                    "template_source": template_source,
                    "reduction_type": "manual",
                    "telescope": phot.telescope,
                    "instrument": phot.instrument,
                }))
            }
            // A subtraction without a recorded algorithm; keep the slot.
            None => Ok(json!({ "snex_id": phot.id })),
        },
        _ => Ok(json!({ "snex_id": phot.id })),
    }
}

fn require<T>(row_id: i64, value: Option<T>, column: &'static str) -> Result<T, SyncError> {
    value.ok_or(SyncError::IncompletePhotometry { row_id, column })
}

/// Collapse duplicates left behind by earlier runs. Every match carries the
/// same back-link and timestamp, so only one row may remain: the newest
/// survives for the caller to patch, and the rest are dropped whether or not
/// their stale payloads agree.
fn consolidate(tx: &Connection, ids: &[i64]) -> Result<Option<i64>, SyncError> {
    match ids {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        [elders @ .., newest] => {
            info!("{} datums match one photometry point; consolidating", ids.len());
            for &id in elders {
                snex2::delete_datum(tx, id)?;
                debug!("Dropped duplicate datum {id}");
            }
            Ok(Some(*newest))
        }
    }
}
