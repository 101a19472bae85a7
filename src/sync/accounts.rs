// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mirroring SNEx1 collaboration groups and user accounts.
//!
//! Groups sync first in every pass so that the target and measurement
//! pipelines can resolve grants against them. Renames and deletions are keyed
//! by the ledger's locator (the old name), because by the time we run, the
//! source row either carries the new name or is gone.

use log::{debug, info};
use rusqlite::Connection;

use super::{SkipReason, SyncContext, SyncError, SyncOutcome};
use crate::{
    grants,
    ledger::{ChangeAction, ChangeRecord},
    snex1, snex2,
};

pub(crate) fn apply_group_change(
    snex1_conn: &Connection,
    snex2_conn: &mut Connection,
    record: &ChangeRecord,
) -> Result<SyncOutcome, SyncError> {
    let tx = snex2_conn.transaction()?;
    let outcome = match record.action {
        ChangeAction::Delete => match record.locator.as_deref() {
            Some(old_name) => {
                if snex2::delete_group(&tx, old_name)? == 0 {
                    SyncOutcome::Skipped(SkipReason::AlreadyGone)
                } else {
                    SyncOutcome::Applied
                }
            }
            None => SyncOutcome::Skipped(SkipReason::LocatorMissing),
        },

        ChangeAction::Insert => match snex1::resolve_group(snex1_conn, record.row_id)? {
            Some(group) => {
                snex2::ensure_group(&tx, &group.name)?;
                SyncOutcome::Applied
            }
            None => SyncOutcome::Skipped(SkipReason::RowVanished),
        },

        ChangeAction::Update => {
            match (
                record.locator.as_deref(),
                snex1::resolve_group(snex1_conn, record.row_id)?,
            ) {
                (Some(old_name), Some(group)) => {
                    if snex2::rename_group(&tx, old_name, &group.name)? == 0 {
                        // The old name was never synced; self-heal by
                        // creating the group under its current name.
                        snex2::ensure_group(&tx, &group.name)?;
                    }
                    SyncOutcome::Applied
                }
                (None, _) => SyncOutcome::Skipped(SkipReason::LocatorMissing),
                (_, None) => SyncOutcome::Skipped(SkipReason::RowVanished),
            }
        }
    };
    tx.commit()?;
    Ok(outcome)
}

pub(crate) fn apply_user_change(
    snex1_conn: &Connection,
    snex2_conn: &mut Connection,
    ctx: &SyncContext,
    record: &ChangeRecord,
) -> Result<SyncOutcome, SyncError> {
    let tx = snex2_conn.transaction()?;
    let outcome = match record.action {
        ChangeAction::Delete => match record.locator.as_deref() {
            Some(username) => {
                if snex2::delete_user(&tx, username)? == 0 {
                    SyncOutcome::Skipped(SkipReason::AlreadyGone)
                } else {
                    SyncOutcome::Applied
                }
            }
            None => SyncOutcome::Skipped(SkipReason::LocatorMissing),
        },

        ChangeAction::Insert => match snex1::resolve_user(snex1_conn, record.row_id)? {
            Some(user) => insert_user(&tx, ctx, &user)?,
            None => SyncOutcome::Skipped(SkipReason::RowVanished),
        },

        ChangeAction::Update => {
            match (
                record.locator.as_deref(),
                snex1::resolve_user(snex1_conn, record.row_id)?,
            ) {
                (Some(old_username), Some(user)) => {
                    let password = django_password(&user.pw);
                    let patch = user_columns(&user, &password);
                    if snex2::patch_user(&tx, old_username, &patch)? == 0 {
                        SyncOutcome::Skipped(SkipReason::AlreadyGone)
                    } else {
                        SyncOutcome::Applied
                    }
                }
                (None, _) => SyncOutcome::Skipped(SkipReason::LocatorMissing),
                (_, None) => SyncOutcome::Skipped(SkipReason::RowVanished),
            }
        }
    };
    tx.commit()?;
    Ok(outcome)
}

/// SNEx1 stores bare crypt(3) hashes; Django's CryptPasswordHasher expects
/// them prefixed with its algorithm tag and an empty salt field.
fn django_password(pw: &str) -> String {
    format!("crypt$${pw}")
}

fn user_columns<'a>(user: &'a snex1::UserRow, password: &'a str) -> snex2::UserInsert<'a> {
    snex2::UserInsert {
        username: &user.username,
        password,
        first_name: user.firstname.as_deref(),
        last_name: user.lastname.as_deref(),
        email: user.email.as_deref(),
        date_joined: user.date_joined.as_deref(),
    }
}

fn insert_user(
    tx: &Connection,
    ctx: &SyncContext,
    user: &snex1::UserRow,
) -> Result<SyncOutcome, SyncError> {
    let password = django_password(&user.pw);
    let columns = user_columns(user, &password);

    let user_id = match snex2::user_id_by_username(tx, &user.username)? {
        Some(id) => {
            info!(
                "User '{}' already exists; refreshing their account",
                user.username
            );
            snex2::patch_user(tx, &user.username, &columns)?;
            id
        }
        None => snex2::insert_user(tx, &columns)?,
    };

    enrol_user(tx, ctx, user_id, user.group_bitmask)?;
    Ok(SyncOutcome::Applied)
}

/// Put the user in every group their bitmask names. Unlike object grants, a
/// missing destination group is fatal here: memberships decide what a user
/// can see at all, and silently dropping one locks them out of their own
/// data.
fn enrol_user(
    conn: &Connection,
    ctx: &SyncContext,
    user_id: i64,
    bitmask: i64,
) -> Result<(), SyncError> {
    let member_bits = grants::powers_of_two(bitmask);
    for (name, idcode) in ctx.groups {
        if !member_bits.contains(idcode) {
            continue;
        }
        let group_id = snex2::group_id_by_name(conn, name)?
            .ok_or_else(|| SyncError::MissingGroup(name.clone()))?;
        if snex2::ensure_membership(conn, user_id, group_id)? {
            debug!("Enrolled user {user_id} in '{name}'");
        }
    }
    Ok(())
}
