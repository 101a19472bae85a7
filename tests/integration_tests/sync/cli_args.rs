// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests against the command-line interface.

use crate::{get_cmd_output, snex_sync};

#[test]
fn top_level_help_is_correct() {
    let mut stdouts = vec![];

    // First with --help
    let cmd = snex_sync().arg("--help").ok();
    assert!(cmd.is_ok());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty());
    stdouts.push(stdout);

    // Then with -h
    let cmd = snex_sync().arg("-h").ok();
    assert!(cmd.is_ok());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty());
    stdouts.push(stdout);

    for stdout in stdouts {
        assert!(stdout.contains("sync"));
        assert!(stdout.contains("verify-schema"));
        assert!(stdout.contains("Replays row changes from the legacy SNEx1 supernova database"));
    }
}

#[test]
fn sync_help_is_correct() {
    let mut stdouts = vec![];

    // First with --help
    let cmd = snex_sync().args(["sync", "--help"]).ok();
    assert!(cmd.is_ok());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty());
    stdouts.push(stdout);

    // Then with -h
    let cmd = snex_sync().args(["sync", "-h"]).ok();
    assert!(cmd.is_ok());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty());
    stdouts.push(stdout);

    for stdout in stdouts {
        assert!(stdout.contains("DATABASES"));
        assert!(stdout.contains("--snex1"));
        assert!(stdout.contains("--snex2"));
        assert!(stdout.contains("DATA ROOTS"));
        assert!(stdout.contains("--legacy-data-root"));
        assert!(stdout.contains("--dry-run"));
        assert!(stdout.contains("ARGUMENTS_FILE"));
    }
}

#[test]
fn subcommands_can_be_abbreviated() {
    // infer_subcommands is on, so an unambiguous prefix works.
    let cmd = snex_sync().args(["verify", "--help"]).ok();
    assert!(cmd.is_ok());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("--snex1"));

    // The legacy spelling of the sync subcommand is an alias.
    let cmd = snex_sync().args(["run", "--help"]).ok();
    assert!(cmd.is_ok());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("--legacy-data-root"));
}
