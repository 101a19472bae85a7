// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The per-entity pipelines that turn ledger entries into SNEx2 mutations.
//!
//! Every pipeline function has the same shape: resolve the legacy row,
//! translate it, apply it inside one destination transaction, and report a
//! typed outcome. `Ok(Skipped(..))` covers the routine nothing-to-do cases
//! and consumes the ledger entry exactly like `Ok(Applied)`; only an `Err`
//! leaves the entry in the ledger for the next run to retry.

pub(crate) mod accounts;
pub(crate) mod phot;
pub(crate) mod spectra;
pub(crate) mod targets;

use std::collections::HashSet;

use chrono::Local;
use indexmap::IndexMap;
use strum_macros::Display;
use thiserror::Error;

use crate::grants::GrantError;
use spectra::SpectrumReadError;

/// What applying one ledger entry did to SNEx2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncOutcome {
    Applied,
    Skipped(SkipReason),
}

/// Routine reasons for consuming a ledger entry without changing SNEx2.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    /// The source row was deleted upstream before this run saw it.
    #[strum(serialize = "row vanished upstream")]
    RowVanished,
    /// The target was created and deleted without ever being named.
    #[strum(serialize = "target was never named")]
    NeverNamed,
    /// Calibration standards stay out of SNEx2 altogether.
    #[strum(serialize = "target is a calibration standard")]
    Standard,
    /// Only reduction filetypes 1 and 3 are published.
    #[strum(serialize = "filetype is not synced")]
    UnsyncedFiletype,
    /// No destination row is linked to this legacy row.
    #[strum(serialize = "never linked to a destination row")]
    Unlinked,
    /// An earlier, interrupted run already applied this entry.
    #[strum(serialize = "already applied")]
    AlreadyApplied,
    /// Whatever this entry would have removed is already gone.
    #[strum(serialize = "nothing left to delete")]
    AlreadyGone,
    /// The ledger didn't record the locator this action needs.
    #[strum(serialize = "no locator recorded")]
    LocatorMissing,
}

#[derive(Error, Debug)]
pub(crate) enum SyncError {
    #[error("photometry row {row_id} has no {column}, which its filetype requires")]
    IncompletePhotometry { row_id: i64, column: &'static str },

    #[error("photometry row {row_id} has unrecognised difference-image type {diff_type}")]
    UnknownDiffType { row_id: i64, diff_type: i64 },

    #[error("SNEx2 has no target {0} yet; its measurements can't be synced until it arrives")]
    MissingTarget(i64),

    #[error("SNEx2 has no group named '{0}', which a user's bitmask requires")]
    MissingGroup(String),

    #[error(transparent)]
    Spectrum(#[from] SpectrumReadError),

    #[error(transparent)]
    Grant(#[from] GrantError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Read-only state shared by every record in one pass.
pub(crate) struct SyncContext<'a> {
    /// Legacy group name -> bitmask idcode, straight from SNEx1's `groups`
    /// table.
    pub(crate) groups: &'a IndexMap<String, i64>,
    /// Targets classified as calibration standards at the start of the pass.
    pub(crate) standard_targets: &'a HashSet<i64>,
    /// The prefix spectra file paths carry in SNEx1 (the mount point of the
    /// data archive on the SNEx1 host).
    pub(crate) legacy_data_root: &'a str,
    /// What that prefix is replaced with to find the same archive from here.
    pub(crate) local_data_root: &'a str,
}

/// Assemble a datum timestamp from photometry's date and time columns,
/// defaulting the way the legacy exporter does: a missing time means
/// midnight, a missing date means today.
pub(crate) fn observation_timestamp(date_obs: Option<&str>, ut: Option<&str>) -> String {
    let date = match date_obs {
        Some(d) => d.to_string(),
        None => Local::now().format("%Y-%m-%d").to_string(),
    };
    format!("{} {}", date, ut.unwrap_or("00:00:00"))
}

/// Wall-clock UTC in the destination's naive datetime format.
pub(crate) fn utc_now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
