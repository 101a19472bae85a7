// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameters for a synchronisation run, and the loop that drives it.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use rusqlite::Connection;
use strum_macros::Display;
use thiserror::Error;

use crate::{
    ledger::{self, ChangeAction, ChangeRecord, ChangeTable},
    schema::{self, SchemaError},
    snex1,
    sync::{self, SyncContext, SyncError, SyncOutcome},
    PROGRESS_BARS,
};

/// One entity kind in the schedule.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntityKind {
    #[strum(serialize = "groups")]
    Groups,
    #[strum(serialize = "users")]
    Users,
    #[strum(serialize = "targets")]
    Targets,
    #[strum(serialize = "photometry")]
    Photometry,
    #[strum(serialize = "spectra")]
    Spectra,
}

impl EntityKind {
    /// The ledger tables feeding this entity. Targets are fed by two: the
    /// rows themselves and their names.
    fn tables(self) -> &'static [ChangeTable] {
        match self {
            EntityKind::Groups => &[ChangeTable::Groups],
            EntityKind::Users => &[ChangeTable::Users],
            EntityKind::Targets => &[ChangeTable::Targets, ChangeTable::TargetNames],
            EntityKind::Photometry => &[ChangeTable::Photometry],
            EntityKind::Spectra => &[ChangeTable::Spectra],
        }
    }
}

/// The fixed order of one run. This table is load-bearing: deletes run first
/// so a row deleted and recreated under the same identity in one ledger
/// window doesn't collide with its old self, and inserts run before updates
/// so updates always have a row to land on. Within each action, groups lead
/// because users and grants resolve against them, and targets precede the
/// measurements anchored to them.
pub(crate) const SCHEDULE: [(ChangeAction, EntityKind); 15] = [
    (ChangeAction::Delete, EntityKind::Groups),
    (ChangeAction::Delete, EntityKind::Users),
    (ChangeAction::Delete, EntityKind::Targets),
    (ChangeAction::Delete, EntityKind::Photometry),
    (ChangeAction::Delete, EntityKind::Spectra),
    (ChangeAction::Insert, EntityKind::Groups),
    (ChangeAction::Insert, EntityKind::Users),
    (ChangeAction::Insert, EntityKind::Targets),
    (ChangeAction::Insert, EntityKind::Photometry),
    (ChangeAction::Insert, EntityKind::Spectra),
    (ChangeAction::Update, EntityKind::Groups),
    (ChangeAction::Update, EntityKind::Users),
    (ChangeAction::Update, EntityKind::Targets),
    (ChangeAction::Update, EntityKind::Photometry),
    (ChangeAction::Update, EntityKind::Spectra),
];

#[derive(Error, Debug)]
pub(crate) enum SyncRunError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// What a run did, summed over its passes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SyncTally {
    pub(crate) applied: usize,
    pub(crate) skipped: usize,
    /// Records whose ledger entries were left in place for the next run.
    pub(crate) failed: usize,
}

impl SyncTally {
    fn merge(&mut self, other: SyncTally) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    fn total(&self) -> usize {
        self.applied + self.skipped + self.failed
    }
}

/// Everything a run needs: both stores open, and the data-root mapping for
/// locating spectrum files.
pub(crate) struct SyncParams {
    pub(crate) snex1: Connection,
    pub(crate) snex2: Connection,
    /// The archive mount prefix recorded in SNEx1's spectrum file paths.
    pub(crate) legacy_data_root: String,
    /// Its replacement on this host.
    pub(crate) local_data_root: String,
}

impl SyncParams {
    /// Drain the ledger once. A dry run only reports what a real one would
    /// look at.
    pub(crate) fn run(&mut self, dry_run: bool) -> Result<SyncTally, SyncRunError> {
        let Self {
            snex1,
            snex2,
            legacy_data_root,
            local_data_root,
        } = self;

        schema::verify(snex1, schema::SNEX1_TABLES, "SNEx1")?;
        schema::verify(snex2, schema::SNEX2_TABLES, "SNEx2")?;

        if dry_run {
            report_pending(snex1)?;
            return Ok(SyncTally::default());
        }

        let groups = snex1::group_map(snex1)?;
        debug!("{} legacy groups known", groups.len());

        let mut total = SyncTally::default();
        for (action, entity) in SCHEDULE {
            // Refreshed every pass; an earlier pass may have reclassified a
            // target as a standard.
            let standard_targets = snex1::standard_target_ids(snex1)?;
            let ctx = SyncContext {
                groups: &groups,
                standard_targets: &standard_targets,
                legacy_data_root: legacy_data_root.as_str(),
                local_data_root: local_data_root.as_str(),
            };

            let tally = run_pass(snex1, snex2, &ctx, action, entity)?;
            if tally.total() > 0 {
                info!(
                    "{action} {entity}: {} applied, {} skipped, {} failed",
                    tally.applied, tally.skipped, tally.failed
                );
            }
            total.merge(tally);
        }

        info!(
            "Sync finished: {} applied, {} skipped, {} left for the next run",
            total.applied, total.skipped, total.failed
        );
        Ok(total)
    }
}

fn run_pass(
    snex1_conn: &Connection,
    snex2_conn: &mut Connection,
    ctx: &SyncContext,
    action: ChangeAction,
    entity: EntityKind,
) -> Result<SyncTally, SyncRunError> {
    let mut tally = SyncTally::default();
    for &table in entity.tables() {
        let records = ledger::read_changes(snex1_conn, table, action)?;
        if records.is_empty() {
            continue;
        }
        debug!("{action} {table}: {} pending changes", records.len());

        let pb = ProgressBar::new(records.len() as _)
            .with_style(
                ProgressStyle::default_bar()
                    .template("{msg:18}: [{wide_bar:.blue}] {pos:4}/{len:4} changes ({elapsed_precise}<{eta_precise})").unwrap()
                    .progress_chars("=> "),
            )
            .with_position(0)
            .with_message(format!("{action} {table}"));
        pb.set_draw_target(if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        });
        pb.tick();

        for record in &records {
            match apply_record(snex1_conn, snex2_conn, ctx, record) {
                Ok(outcome) => {
                    match outcome {
                        SyncOutcome::Applied => tally.applied += 1,
                        SyncOutcome::Skipped(reason) => {
                            debug!("{table} row {}: {reason}", record.row_id);
                            tally.skipped += 1;
                        }
                    }
                    // The change is committed; only now is the entry retired.
                    ledger::consume(snex1_conn, record.id)?;
                }
                Err(e) => {
                    warn!(
                        "{action} of {table} row {} failed, leaving it for the next run: {e}",
                        record.row_id
                    );
                    tally.failed += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
    }
    Ok(tally)
}

fn apply_record(
    snex1_conn: &Connection,
    snex2_conn: &mut Connection,
    ctx: &SyncContext,
    record: &ChangeRecord,
) -> Result<SyncOutcome, SyncError> {
    match record.table {
        ChangeTable::Groups => sync::accounts::apply_group_change(snex1_conn, snex2_conn, record),
        ChangeTable::Users => sync::accounts::apply_user_change(snex1_conn, snex2_conn, ctx, record),
        ChangeTable::Targets => sync::targets::apply_target_change(snex1_conn, snex2_conn, ctx, record),
        ChangeTable::TargetNames => sync::targets::apply_name_change(snex1_conn, snex2_conn, ctx, record),
        ChangeTable::Photometry => sync::phot::apply_phot_change(snex1_conn, snex2_conn, ctx, record),
        ChangeTable::Spectra => sync::spectra::apply_spec_change(snex1_conn, snex2_conn, ctx, record),
    }
}

fn report_pending(conn: &Connection) -> Result<(), rusqlite::Error> {
    let mut outstanding = 0;
    for (action, entity) in SCHEDULE {
        for &table in entity.tables() {
            let pending = ledger::pending_count(conn, table, action)?;
            if pending > 0 {
                info!("{action} {table}: {pending} pending changes");
                outstanding += pending;
            }
        }
    }
    if outstanding == 0 {
        info!("The ledger is empty; nothing to sync");
    } else {
        info!("{outstanding} pending changes in total");
    }
    Ok(())
}
