// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Argument types shared by the subcommands.

use std::path::PathBuf;

use clap::Args;
use itertools::Itertools;
use log::info;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref ARG_FILE_HELP: String =
        format!("All arguments may be specified in a file. Any CLI arguments override arguments set in the file. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => ({
        use std::{fs::File, io::Read, str::FromStr};

        use crate::cli::common::{ArgFileTypes, ARG_FILE_TYPES_COMMA_SEPARATED};

        debug!("Attempting to parse argument file {}", $arg_file.display());

        let mut contents = String::new();
        let arg_file_type = $arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());

        match arg_file_type {
            Some(ArgFileTypes::Toml) => {
                debug!("Parsing toml file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match toml::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(SnexSyncError::ArgFile(format!(
                            "Couldn't decode toml structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }
            Some(ArgFileTypes::Json) => {
                debug!("Parsing json file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match serde_json::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(SnexSyncError::ArgFile(format!(
                            "Couldn't decode json structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }

            _ => {
                return Err(SnexSyncError::ArgFile(format!(
                    "Argument file '{:?}' doesn't have a recognised file extension! Valid extensions are: {}", $arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED)
                ))
            }
        }
    });
}

/// The two databases every subcommand operates on.
#[derive(Args, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct StoreArgs {
    /// Path to the SNEx1 mirror database.
    #[clap(short = '1', long, help_heading = "DATABASES")]
    pub(super) snex1: Option<PathBuf>,

    /// Path to the SNEx2 database.
    #[clap(short = '2', long, help_heading = "DATABASES")]
    pub(super) snex2: Option<PathBuf>,
}

impl StoreArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            snex1: self.snex1.or(other.snex1),
            snex2: self.snex2.or(other.snex2),
        }
    }

    /// Open both databases. Neither is created if missing; a sync against an
    /// accidentally-empty store must fail loudly instead.
    pub(super) fn open(self, flags: OpenFlags) -> Result<(Connection, Connection), StoreArgsError> {
        let snex1 = self.snex1.ok_or(StoreArgsError::NoSnex1)?;
        let snex2 = self.snex2.ok_or(StoreArgsError::NoSnex2)?;
        info!("SNEx1 mirror: {}", snex1.display());
        info!("SNEx2:        {}", snex2.display());
        let snex1_conn = open_store(&snex1, flags)?;
        let snex2_conn = open_store(&snex2, flags)?;
        // The SNEx2 schema leans on cascading deletes (e.g. removing a data
        // product takes its reduced datums with it).
        snex2_conn
            .pragma_update(None, "foreign_keys", true)
            .map_err(|err| StoreArgsError::Open { path: snex2, err })?;
        Ok((snex1_conn, snex2_conn))
    }
}

fn open_store(path: &PathBuf, flags: OpenFlags) -> Result<Connection, StoreArgsError> {
    Connection::open_with_flags(path, flags).map_err(|err| StoreArgsError::Open {
        path: path.clone(),
        err,
    })
}

#[derive(Error, Debug)]
pub(super) enum StoreArgsError {
    #[error("No SNEx1 mirror database was specified")]
    NoSnex1,

    #[error("No SNEx2 database was specified")]
    NoSnex2,

    #[error("Couldn't open {}: {err}", path.display())]
    Open { path: PathBuf, err: rusqlite::Error },
}
