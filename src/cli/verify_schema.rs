// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Check that both stores carry every table and column a sync would touch,
//! without applying anything. Useful after SNEx2 migrations.

use clap::Parser;
use log::info;
use rusqlite::OpenFlags;

use super::{common::StoreArgs, SnexSyncError};
use crate::schema;

#[derive(Parser, Debug, Clone, Default)]
pub(super) struct VerifySchemaArgs {
    #[clap(flatten)]
    store_args: StoreArgs,
}

impl VerifySchemaArgs {
    pub(super) fn run(self) -> Result<(), SnexSyncError> {
        let (snex1, snex2) = self.store_args.open(OpenFlags::SQLITE_OPEN_READ_ONLY)?;

        schema::verify(&snex1, schema::SNEX1_TABLES, "SNEx1")?;
        info!(
            "SNEx1 mirror: all {} expected tables present",
            schema::SNEX1_TABLES.len()
        );
        schema::verify(&snex2, schema::SNEX2_TABLES, "SNEx2")?;
        info!(
            "SNEx2: all {} expected tables present",
            schema::SNEX2_TABLES.len()
        );

        Ok(())
    }
}
