// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests to ensure there is no stderr output for successful commands.

use tempfile::TempDir;

use crate::{get_cmd_output, seeded_stores, snex_sync};

#[test]
fn test_sync_no_stderr() {
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
    assert!(
        cmd.is_ok(),
        "sync failed on seeded stores: {}",
        cmd.err().unwrap()
    );
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
}

#[test]
fn test_sync_dry_run_no_stderr() {
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
    assert!(
        cmd.is_ok(),
        "dry run failed on seeded stores: {}",
        cmd.err().unwrap()
    );
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
}

#[test]
fn test_verify_schema_no_stderr() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let stores = seeded_stores(tmp_dir.path());

    #[rustfmt::skip]
    let cmd = snex_sync()
        .args([
            "verify-schema",
            "--snex1", &stores.snex1(),
            "--snex2", &stores.snex2(),
        ])
        .ok();
    assert!(
        cmd.is_ok(),
        "verify-schema failed on seeded stores: {}",
        cmd.err().unwrap()
    );
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
}
