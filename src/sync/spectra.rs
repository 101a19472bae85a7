// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mirroring rows of SNEx1's spectroscopy reduction table.
//!
//! A spectrum syncs as three things at once: a data product pointing at the
//! traced ascii file, a datum whose payload is the trace itself, and a pair
//! of `custom_code_reduceddatumextra` rows. The `snex_id` extra links the
//! legacy row to its datum (the trace payload has no room for a back-link),
//! and the `spec_extras` extra carries the observing conditions. The link row
//! is what later updates and deletes resolve, so all of it is written in one
//! transaction.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use thiserror::Error;

use super::{SkipReason, SyncContext, SyncError, SyncOutcome};
use crate::{
    grants,
    ledger::{ChangeAction, ChangeRecord},
    snex1, snex2,
};

#[derive(Error, Debug)]
pub(crate) enum SpectrumReadError {
    #[error("couldn't open spectrum file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} line {line}: expected wavelength and flux columns", path.display())]
    MissingColumns { path: PathBuf, line: usize },

    #[error("{} line {line}: {token:?} is not a number", path.display())]
    NotANumber {
        path: PathBuf,
        line: usize,
        token: String,
    },

    #[error("{} line {line}: non-finite value can't be stored as JSON", path.display())]
    NonFinite { path: PathBuf, line: usize },
}

/// Read a traced ascii spectrum into the datum payload: a map from line
/// number to a wavelength/flux pair. The reduction writes a literal `nan`
/// flux for masked pixels; those lines are dropped but keep their line
/// numbers, so the keys can be sparse.
pub(crate) fn read_spectrum(path: &Path) -> Result<Value, SpectrumReadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SpectrumReadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut trace = Map::new();
    for (line, text) in contents.lines().enumerate() {
        let mut tokens = text.split_whitespace();
        let (wavelength_token, flux_token) = match (tokens.next(), tokens.next()) {
            (Some(w), Some(f)) => (w, f),
            _ => {
                return Err(SpectrumReadError::MissingColumns {
                    path: path.to_path_buf(),
                    line,
                })
            }
        };
        if flux_token == "nan" {
            continue;
        }
        let wavelength = parse_float(path, line, wavelength_token)?;
        let flux = parse_float(path, line, flux_token)?;
        trace.insert(
            line.to_string(),
            json!({ "wavelength": wavelength, "flux": flux }),
        );
    }
    Ok(Value::Object(trace))
}

fn parse_float(path: &Path, line: usize, token: &str) -> Result<f64, SpectrumReadError> {
    let value: f64 = token.parse().map_err(|_| SpectrumReadError::NotANumber {
        path: path.to_path_buf(),
        line,
        token: token.to_string(),
    })?;
    if !value.is_finite() {
        return Err(SpectrumReadError::NonFinite {
            path: path.to_path_buf(),
            line,
        });
    }
    Ok(value)
}

/// Where the traced ascii file for this spectrum lives on this host, and its
/// bare filename. SNEx1 records where the raw FITS file sat on its own
/// archive mount; we swap the mount prefix and the extension.
fn local_spectrum_path(ctx: &SyncContext, spec: &snex1::SpecRow) -> (PathBuf, String) {
    let ascii_name = spec.filename.replace(".fits", ".ascii");
    let dir = spec
        .filepath
        .replace(ctx.legacy_data_root, ctx.local_data_root);
    (Path::new(&dir).join(&ascii_name), ascii_name)
}

pub(crate) fn apply_spec_change(
    snex1_conn: &Connection,
    snex2_conn: &mut Connection,
    ctx: &SyncContext,
    record: &ChangeRecord,
) -> Result<SyncOutcome, SyncError> {
    if record.action == ChangeAction::Delete {
        let tx = snex2_conn.transaction()?;
        let linked_datum = snex2::spec_link(&tx, None, record.row_id)?;
        if let Some(datum_id) = linked_datum {
            if snex2::delete_datum_and_artifact(&tx, datum_id)? {
                debug!("Deleted datum {datum_id} and its ascii data product");
            }
        }
        // Drop the link and extras rows too, or a re-inserted spectrum with
        // this id would look already applied.
        let purged = snex2::purge_spec_extras(&tx, record.row_id)?;
        let outcome = if linked_datum.is_some() || purged > 0 {
            SyncOutcome::Applied
        } else {
            SyncOutcome::Skipped(SkipReason::AlreadyGone)
        };
        tx.commit()?;
        return Ok(outcome);
    }

    let spec = match snex1::resolve_spec(snex1_conn, record.row_id)? {
        Some(s) => s,
        None => return Ok(SyncOutcome::Skipped(SkipReason::RowVanished)),
    };
    if ctx.standard_targets.contains(&spec.target_id) {
        return Ok(SyncOutcome::Skipped(SkipReason::Standard));
    }

    let timestamp = format!("{} {}", spec.date_obs, spec.ut);
    let (path, ascii_name) = local_spectrum_path(ctx, &spec);
    let trace = read_spectrum(&path)?;

    match record.action {
        ChangeAction::Insert => {
            let tx = snex2_conn.transaction()?;
            if snex2::spec_link(&tx, None, spec.id)?.is_some() {
                tx.commit()?;
                return Ok(SyncOutcome::Skipped(SkipReason::AlreadyApplied));
            }
            let target_name = snex2::target_name_of(&tx, spec.target_id)?
                .ok_or(SyncError::MissingTarget(spec.target_id))?;

            let dp_id = snex2::insert_dataproduct(&tx, spec.target_id, &ascii_name, &timestamp)?;
            let datum_id = snex2::insert_datum(
                &tx,
                spec.target_id,
                Some(dp_id),
                "spectroscopy",
                &timestamp,
                &trace,
            )?;
            snex2::finalise_dataproduct_path(&tx, dp_id, &target_name)?;

            if let Some(bitmask) = spec.group_bitmask {
                grants::grant_for_bitmask(&tx, ctx.groups, bitmask, "view_reduceddatum", datum_id)?;
            }

            snex2::insert_datum_extra(
                &tx,
                spec.target_id,
                "snex_id",
                &json!({ "snex_id": spec.id, "snex2_id": datum_id }),
            )?;
            snex2::insert_datum_extra(&tx, spec.target_id, "spec_extras", &extras_payload(&spec))?;

            tx.commit()?;
            Ok(SyncOutcome::Applied)
        }

        ChangeAction::Update => {
            let tx = snex2_conn.transaction()?;
            let datum_id = match snex2::spec_link(&tx, Some(spec.target_id), spec.id)? {
                Some(id) => id,
                None => {
                    tx.commit()?;
                    return Ok(SyncOutcome::Skipped(SkipReason::Unlinked));
                }
            };
            let original = match snex2::datum_snapshot(&tx, datum_id)? {
                Some(snapshot) => snapshot,
                None => {
                    warn!(
                        "Spectrum {}'s link points at datum {datum_id}, which no longer exists",
                        spec.id
                    );
                    tx.commit()?;
                    return Ok(SyncOutcome::Skipped(SkipReason::Unlinked));
                }
            };

            // Earlier runs sometimes wrote the same trace twice; keep only
            // the datum the link row names.
            for duplicate in snex2::equal_spec_datums(&tx, &original)? {
                if duplicate != datum_id {
                    snex2::delete_datum(&tx, duplicate)?;
                    debug!("Dropped duplicate spectroscopy datum {duplicate}");
                }
            }

            snex2::repoint_spec_datum(&tx, datum_id, spec.target_id, &timestamp, &trace)?;
            if let Some(bitmask) = spec.group_bitmask {
                grants::grant_for_bitmask(&tx, ctx.groups, bitmask, "view_reduceddatum", datum_id)?;
            }
            tx.commit()?;
            Ok(SyncOutcome::Applied)
        }

        ChangeAction::Delete => unreachable!("handled above"),
    }
}

/// The observing-condition extras shown next to a spectrum. Only columns with
/// a usable value are included; the legacy rows are sparse and a null or zero
/// means "not recorded".
fn extras_payload(spec: &snex1::SpecRow) -> Value {
    let mut extras = Map::new();
    if let Some(telescope) = nonempty(spec.telescope.as_deref()) {
        extras.insert("telescope".to_string(), telescope.into());
    }
    if let Some(instrument) = nonempty(spec.instrument.as_deref()) {
        extras.insert("instrument".to_string(), instrument.into());
    }
    if let Some(exptime) = spec.exptime.filter(|v| *v != 0.0) {
        extras.insert("exptime".to_string(), json!(exptime));
    }
    if let Some(slit) = nonempty(spec.slit.as_deref()) {
        extras.insert("slit".to_string(), slit.into());
    }
    if let Some(airmass) = spec.airmass.filter(|v| *v != 0.0) {
        extras.insert("airmass".to_string(), json!(airmass));
    }
    if let Some(reducer) = nonempty(spec.reducer.as_deref()) {
        extras.insert("reducer".to_string(), reducer.into());
    }
    extras.insert("snex_id".to_string(), json!(spec.id));
    Value::Object(extras)
}

fn nonempty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
