// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Static declarations of the source and destination tables this tool touches.
//!
//! Both schemas are owned by other projects (SNEx1's MySQL-era tables and the
//! SNEx2 Django migrations); we only read and write them. Declaring the
//! expected columns up front lets a run fail before any ledger entry is
//! consumed, rather than partway through a pass when a query first hits a
//! renamed column.

use itertools::Itertools;
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum SchemaError {
    #[error("{store} database has no table '{table}'")]
    MissingTable {
        store: &'static str,
        table: &'static str,
    },

    #[error("{store} table '{table}' is missing expected columns: {columns}")]
    MissingColumns {
        store: &'static str,
        table: &'static str,
        columns: String,
    },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// A table we expect to exist, with every column we read or write. Extra
/// columns are fine; missing ones are not.
pub(crate) struct TableSpec {
    pub(crate) name: &'static str,
    pub(crate) columns: &'static [&'static str],
}

pub(crate) const SNEX1_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "db_changes",
        columns: &["id", "tablename", "rowid", "action", "locator"],
    },
    TableSpec {
        name: "photlco",
        columns: &[
            "id",
            "targetid",
            "dateobs",
            "ut",
            "mag",
            "dmag",
            "filetype",
            "filter",
            "difftype",
            "filename",
            "telescope",
            "instrument",
            "groupidcode",
        ],
    },
    TableSpec {
        name: "spec",
        columns: &[
            "id",
            "targetid",
            "dateobs",
            "ut",
            "filepath",
            "filename",
            "telescope",
            "instrument",
            "exptime",
            "slit",
            "airmass",
            "reducer",
            "groupidcode",
        ],
    },
    TableSpec {
        name: "targets",
        columns: &[
            "id",
            "ra0",
            "dec0",
            "lastmodified",
            "datecreated",
            "groupidcode",
            "redshift",
            "classificationid",
        ],
    },
    TableSpec {
        name: "targetnames",
        columns: &["id", "targetid", "name"],
    },
    TableSpec {
        name: "classifications",
        columns: &["id", "name"],
    },
    TableSpec {
        name: "users",
        columns: &[
            "id",
            "name",
            "pw",
            "firstname",
            "lastname",
            "email",
            "datecreated",
            "groupidcode",
        ],
    },
    TableSpec {
        name: "groups",
        columns: &["id", "name", "idcode"],
    },
];

pub(crate) const SNEX2_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "tom_targets_basetarget",
        columns: &[
            "id",
            "name",
            "type",
            "created",
            "modified",
            "ra",
            "dec",
            "epoch",
            "scheme",
            "permissions",
        ],
    },
    TableSpec {
        name: "tom_targets_targetextra",
        columns: &["id", "target_id", "key", "value", "float_value"],
    },
    TableSpec {
        name: "tom_targets_targetname",
        columns: &["id", "target_id", "name", "created", "modified"],
    },
    TableSpec {
        name: "tom_dataproducts_reduceddatum",
        columns: &[
            "id",
            "target_id",
            "data_product_id",
            "data_type",
            "source_name",
            "source_location",
            "timestamp",
            "value",
        ],
    },
    TableSpec {
        name: "tom_dataproducts_dataproduct",
        columns: &[
            "id",
            "target_id",
            "product_id",
            "data",
            "extra_data",
            "data_product_type",
            "created",
            "modified",
            "featured",
        ],
    },
    TableSpec {
        name: "custom_code_reduceddatumextra",
        columns: &["id", "target_id", "data_type", "key", "value"],
    },
    TableSpec {
        name: "auth_user",
        columns: &[
            "id",
            "username",
            "password",
            "first_name",
            "last_name",
            "email",
            "is_staff",
            "is_active",
            "is_superuser",
            "date_joined",
        ],
    },
    TableSpec {
        name: "auth_group",
        columns: &["id", "name"],
    },
    TableSpec {
        name: "auth_user_groups",
        columns: &["id", "user_id", "group_id"],
    },
    TableSpec {
        name: "auth_permission",
        columns: &["id", "codename"],
    },
    TableSpec {
        name: "guardian_groupobjectpermission",
        columns: &["id", "permission_id", "group_id", "object_pk"],
    },
];

/// Check that every expected table and column is present. `store` names the
/// database in error messages ("SNEx1" or "SNEx2").
pub(crate) fn verify(
    conn: &Connection,
    tables: &[TableSpec],
    store: &'static str,
) -> Result<(), SchemaError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    for table in tables {
        let present: Vec<String> = stmt
            .query_map([table.name], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        if present.is_empty() {
            return Err(SchemaError::MissingTable {
                store,
                table: table.name,
            });
        }

        let missing = table
            .columns
            .iter()
            .filter(|c| !present.iter().any(|p| p == *c))
            .join(", ");
        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns {
                store,
                table: table.name,
                columns: missing,
            });
        }
    }

    Ok(())
}
