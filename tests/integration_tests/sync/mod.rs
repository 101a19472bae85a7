// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! End-to-end tests of the "sync" subcommand against real store files.

mod arg_files;
mod cli_args;

use approx::assert_abs_diff_eq;
use serde_json::Value;
use tempfile::TempDir;

use crate::{count, get_cmd_output, open, seeded_stores, snex_sync};

#[test]
fn a_full_run_drains_the_ledger_and_mirrors_every_entity() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let stores = seeded_stores(tmp_dir.path());

    #[rustfmt::skip]
    let cmd = snex_sync()
        .args([
            "sync",
            "--snex1", &stores.snex1(),
            "--snex2", &stores.snex2(),
            "--legacy-data-root", "/supernova/",
            "--local-data-root", &stores.archive_root(),
        ])
        .ok();
    assert!(cmd.is_ok(), "sync failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(
        stdout.contains("6 applied, 0 skipped, 0 left for the next run"),
        "unexpected tally in stdout: {stdout}"
    );

    let snex1 = open(&stores.snex1);
    assert_eq!(count(&snex1, "SELECT COUNT(*) FROM db_changes"), 0);

    let snex2 = open(&stores.snex2);
    let (name, ra, dec): (String, f64, f64) = snex2
        .query_row(
            "SELECT name, ra, dec FROM tom_targets_basetarget WHERE id = 40",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(name, "SN2021abc");
    assert_abs_diff_eq!(ra, 241.25);
    assert_abs_diff_eq!(dec, -11.48);

    let redshift: String = snex2
        .query_row(
            "SELECT value FROM tom_targets_targetextra WHERE target_id = 40 AND key = 'redshift'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(redshift, "0.082");

    let password: String = snex2
        .query_row(
            "SELECT password FROM auth_user WHERE username = 'ehosseini'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(password, "crypt$$abcdef");
    assert_eq!(count(&snex2, "SELECT COUNT(*) FROM auth_user_groups"), 1);

    let phot_value: Value = snex2
        .query_row(
            "SELECT value FROM tom_dataproducts_reduceddatum WHERE data_type = 'photometry'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(phot_value["magnitude"], 18.2);
    assert_eq!(phot_value["snex_id"], 31);

    let artifact: String = snex2
        .query_row(
            "SELECT data FROM tom_dataproducts_dataproduct",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(artifact, "SN2021abc/spectroscopy/sn2021abc_20210505.ascii");

    // change/delete/view on the target, view on each of the two datums.
    assert_eq!(
        count(&snex2, "SELECT COUNT(*) FROM guardian_groupobjectpermission"),
        5
    );

    // A second run finds an empty ledger and changes nothing.
    #[rustfmt::skip]
    let cmd = snex_sync()
        .args([
            "sync",
            "--snex1", &stores.snex1(),
            "--snex2", &stores.snex2(),
            "--legacy-data-root", "/supernova/",
            "--local-data-root", &stores.archive_root(),
        ])
        .ok();
    assert!(cmd.is_ok(), "rerun failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(
        stdout.contains("0 applied, 0 skipped, 0 left for the next run"),
        "rerun was not a no-op: {stdout}"
    );

    let snex2 = open(&stores.snex2);
    assert_eq!(
        count(&snex2, "SELECT COUNT(*) FROM tom_dataproducts_reduceddatum"),
        2
    );
}

#[test]
fn a_dry_run_reports_without_applying() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let stores = seeded_stores(tmp_dir.path());

    #[rustfmt::skip]
    let cmd = snex_sync()
        .args([
            "sync",
            "--snex1", &stores.snex1(),
            "--snex2", &stores.snex2(),
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "dry run failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(
        stdout.contains("6 pending changes in total"),
        "unexpected dry-run report: {stdout}"
    );

    let snex1 = open(&stores.snex1);
    assert_eq!(count(&snex1, "SELECT COUNT(*) FROM db_changes"), 6);
    let snex2 = open(&stores.snex2);
    assert_eq!(count(&snex2, "SELECT COUNT(*) FROM tom_targets_basetarget"), 0);
}

#[test]
fn a_missing_store_path_is_refused() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let stores = seeded_stores(tmp_dir.path());

    let cmd = snex_sync().args(["sync", "--snex1", &stores.snex1()]).ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(
        stderr.contains("No SNEx2 database was specified"),
        "unexpected error: {stderr}"
    );

    // The stores are never created implicitly; a typo'd path must not leave
    // an empty database behind.
    let missing = tmp_dir.path().join("nope.sqlite3");
    #[rustfmt::skip]
    let cmd = snex_sync()
        .args([
            "sync",
            "--snex1", &stores.snex1(),
            "--snex2", &missing.display().to_string(),
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("Couldn't open"), "unexpected error: {stderr}");
    assert!(!missing.exists());
}
