// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parse sync arguments into parameters.

use clap::Parser;
use log::debug;
use rusqlite::OpenFlags;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{
    common::{StoreArgs, ARG_FILE_HELP},
    SnexSyncError,
};
use crate::params::SyncParams;

/// The path prefix recorded in SNEx1's spectrum file paths.
const DEFAULT_LEGACY_DATA_ROOT: &str = "/supernova/";

/// Where the same files live on the host running the sync.
const DEFAULT_LOCAL_DATA_ROOT: &str = "/snex2/";

lazy_static::lazy_static! {
    static ref LEGACY_DATA_ROOT_HELP: String =
        format!("The path prefix recorded in SNEx1's spectrum file paths. Default: {DEFAULT_LEGACY_DATA_ROOT}");

    static ref LOCAL_DATA_ROOT_HELP: String =
        format!("The path prefix that replaces the legacy data root when locating spectrum files on this host. Default: {DEFAULT_LOCAL_DATA_ROOT}");
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SyncArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "databases")]
    #[serde(default)]
    store_args: StoreArgs,

    #[clap(long, help = LEGACY_DATA_ROOT_HELP.as_str(), help_heading = "DATA ROOTS")]
    legacy_data_root: Option<String>,

    #[clap(long, help = LOCAL_DATA_ROOT_HELP.as_str(), help_heading = "DATA ROOTS")]
    local_data_root: Option<String>,
}

impl SyncArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified
    /// into a single struct. Where applicable, it will prefer CLI parameters
    /// over those in the file.
    pub(super) fn merge(self) -> Result<SyncArgs, SnexSyncError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            // Read in the file arguments. Ensure all of the file args are
            // accounted for by pattern matching.
            let SyncArgs {
                args_file: _,
                store_args,
                legacy_data_root,
                local_data_root,
            } = unpack_arg_file!(arg_file);

            // Merge all the arguments, preferring the CLI args when available.
            Ok(SyncArgs {
                args_file: None,
                store_args: cli_args.store_args.merge(store_args),
                legacy_data_root: cli_args.legacy_data_root.or(legacy_data_root),
                local_data_root: cli_args.local_data_root.or(local_data_root),
            })
        } else {
            Ok(cli_args)
        }
    }

    /// Parse the arguments into parameters ready for a run.
    fn parse(self) -> Result<SyncParams, SnexSyncError> {
        debug!("{:#?}", self);

        let SyncArgs {
            args_file: _,
            store_args,
            legacy_data_root,
            local_data_root,
        } = self;

        let (snex1, snex2) =
            store_args.open(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;

        let legacy_data_root =
            legacy_data_root.unwrap_or_else(|| DEFAULT_LEGACY_DATA_ROOT.to_string());
        let local_data_root =
            local_data_root.unwrap_or_else(|| DEFAULT_LOCAL_DATA_ROOT.to_string());
        debug!("Spectrum files: {legacy_data_root} -> {local_data_root}");

        Ok(SyncParams {
            snex1,
            snex2,
            legacy_data_root,
            local_data_root,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), SnexSyncError> {
        debug!("Converting arguments into parameters");
        let mut params = self.parse()?;
        params.run(dry_run)?;
        Ok(())
    }
}
