// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all snex_sync-related errors. This should be the *only*
//! error enum that is publicly visible.

use thiserror::Error;

use super::common::StoreArgsError;
use crate::{params::SyncRunError, schema::SchemaError};

/// The *only* publicly visible error from snex_sync.
#[derive(Error, Debug)]
pub enum SnexSyncError {
    /// A store is missing tables or columns the sync would touch.
    #[error("{0}\n\nThe database schemas must be migrated before syncing can resume.")]
    Schema(String),

    /// An error related to opening or selecting the databases.
    #[error("{0}")]
    Store(String),

    /// An error related to argument files.
    #[error("{0}")]
    ArgFile(String),

    /// An SQLite error from either store.
    #[error("SQLite error: {0}")]
    Sqlite(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<StoreArgsError> for SnexSyncError {
    fn from(e: StoreArgsError) -> Self {
        match e {
            StoreArgsError::NoSnex1 | StoreArgsError::NoSnex2 | StoreArgsError::Open { .. } => {
                Self::Store(e.to_string())
            }
        }
    }
}

impl From<SyncRunError> for SnexSyncError {
    fn from(e: SyncRunError) -> Self {
        match e {
            SyncRunError::Schema(e) => Self::from(e),
            SyncRunError::Sqlite(e) => Self::from(e),
        }
    }
}

impl From<SchemaError> for SnexSyncError {
    fn from(e: SchemaError) -> Self {
        let s = e.to_string();
        match e {
            SchemaError::MissingTable { .. } | SchemaError::MissingColumns { .. } => {
                Self::Schema(s)
            }
            SchemaError::Sqlite(e) => Self::from(e),
        }
    }
}

impl From<rusqlite::Error> for SnexSyncError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e.to_string())
    }
}

impl From<std::io::Error> for SnexSyncError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
