// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests of the "sync" subcommand with toml and json argument files.

use std::fs;

use indoc::formatdoc;
use serde_json::json;
use tempfile::TempDir;

use crate::{count, get_cmd_output, open, seeded_stores, snex_sync};

#[test]
fn toml_arg_files_work() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let stores = seeded_stores(tmp_dir.path());

    let toml = tmp_dir.path().join("sync.toml");
    fs::write(
        &toml,
        formatdoc! {r#"
            legacy_data_root = "/supernova/"
            local_data_root = "{archive}"

            [databases]
            snex1 = "{snex1}"
            snex2 = "{snex2}"
        "#,
            archive = stores.archive_root(),
            snex1 = stores.snex1(),
            snex2 = stores.snex2(),
        },
    )
    .unwrap();

    let cmd = snex_sync()
        .args(["sync", &toml.display().to_string(), "--dry-run"])
        .ok();
    assert!(cmd.is_ok(), "{}", get_cmd_output(cmd).1);
}

#[test]
fn json_arg_files_work() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let stores = seeded_stores(tmp_dir.path());

    let json = tmp_dir.path().join("sync.json");
    fs::write(
        &json,
        json!({
            "databases": {
                "snex1": stores.snex1(),
                "snex2": stores.snex2(),
            },
            "local_data_root": stores.archive_root(),
        })
        .to_string(),
    )
    .unwrap();

    let cmd = snex_sync()
        .args(["sync", &json.display().to_string(), "--dry-run"])
        .ok();
    assert!(cmd.is_ok(), "{}", get_cmd_output(cmd).1);
}

#[test]
fn cli_flags_override_the_arg_file() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let stores = seeded_stores(tmp_dir.path());

    // The file points SNEx1 at a path that doesn't exist; the flag rescues it.
    let toml = tmp_dir.path().join("sync.toml");
    fs::write(
        &toml,
        formatdoc! {r#"
            [databases]
            snex1 = "{missing}"
            snex2 = "{snex2}"
        "#,
            missing = tmp_dir.path().join("nope.sqlite3").display(),
            snex2 = stores.snex2(),
        },
    )
    .unwrap();

    #[rustfmt::skip]
    let cmd = snex_sync()
        .args([
            "sync", &toml.display().to_string(),
            "--snex1", &stores.snex1(),
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "{}", get_cmd_output(cmd).1);
}

#[test]
fn save_toml_round_trips() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let stores = seeded_stores(tmp_dir.path());
    let saved = tmp_dir.path().join("saved.toml");

    #[rustfmt::skip]
    let cmd = snex_sync()
        .args([
            "sync",
            "--snex1", &stores.snex1(),
            "--snex2", &stores.snex2(),
            "--legacy-data-root", "/supernova/",
            "--local-data-root", &stores.archive_root(),
            "--save-toml", &saved.display().to_string(),
        ])
        .ok();
    assert!(cmd.is_ok(), "{}", get_cmd_output(cmd).1);

    // The first run drained the ledger; replaying from the saved file is a
    // clean no-op.
    let cmd = snex_sync()
        .args(["sync", &saved.display().to_string()])
        .ok();
    assert!(cmd.is_ok(), "{}", get_cmd_output(cmd).1);
    let (stdout, _) = get_cmd_output(cmd);
    assert!(
        stdout.contains("0 applied, 0 skipped, 0 left for the next run"),
        "replay from saved args was not a no-op: {stdout}"
    );

    let snex2 = open(&stores.snex2);
    assert_eq!(
        count(&snex2, "SELECT COUNT(*) FROM tom_dataproducts_reduceddatum"),
        2
    );
}
