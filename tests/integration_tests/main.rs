// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod no_stderr;
mod sync;

use std::{
    fs,
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};
use rusqlite::Connection;

fn snex_sync() -> Command {
    Command::cargo_bin("snex_sync").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

/// The store files a test drives the binary against, and the directory
/// standing in for the local spectra archive mount.
struct Stores {
    snex1: PathBuf,
    snex2: PathBuf,
    archive: PathBuf,
}

impl Stores {
    fn snex1(&self) -> String {
        self.snex1.display().to_string()
    }

    fn snex2(&self) -> String {
        self.snex2.display().to_string()
    }

    /// The trailing slash matters: data roots are swapped by plain prefix
    /// replacement.
    fn archive_root(&self) -> String {
        format!("{}/", self.archive.display())
    }
}

const SNEX1_DDL: &str = "
    CREATE TABLE db_changes (
        id INTEGER PRIMARY KEY,
        tablename TEXT NOT NULL,
        rowid INTEGER,
        action TEXT NOT NULL,
        locator TEXT
    );
    CREATE TABLE groups (id INTEGER PRIMARY KEY, name TEXT NOT NULL, idcode INTEGER NOT NULL);
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        pw TEXT NOT NULL,
        firstname TEXT,
        lastname TEXT,
        email TEXT,
        datecreated TEXT,
        groupidcode INTEGER NOT NULL
    );
    CREATE TABLE classifications (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE targets (
        id INTEGER PRIMARY KEY,
        ra0 REAL,
        dec0 REAL,
        lastmodified TEXT,
        datecreated TEXT,
        groupidcode INTEGER NOT NULL,
        redshift REAL,
        classificationid INTEGER
    );
    CREATE TABLE targetnames (id INTEGER PRIMARY KEY, targetid INTEGER NOT NULL, name TEXT NOT NULL);
    CREATE TABLE photlco (
        id INTEGER PRIMARY KEY,
        targetid INTEGER NOT NULL,
        dateobs TEXT,
        ut TEXT,
        mag REAL NOT NULL,
        dmag REAL,
        filetype INTEGER NOT NULL,
        filter TEXT,
        difftype INTEGER,
        filename TEXT,
        telescope TEXT,
        instrument TEXT,
        groupidcode INTEGER
    );
    CREATE TABLE spec (
        id INTEGER PRIMARY KEY,
        targetid INTEGER NOT NULL,
        dateobs TEXT NOT NULL,
        ut TEXT NOT NULL,
        filepath TEXT NOT NULL,
        filename TEXT NOT NULL,
        telescope TEXT,
        instrument TEXT,
        exptime REAL,
        slit TEXT,
        airmass REAL,
        reducer TEXT,
        groupidcode INTEGER
    );";

const SNEX2_DDL: &str = "
    CREATE TABLE tom_targets_basetarget (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        type TEXT NOT NULL,
        created TEXT,
        modified TEXT,
        ra REAL,
        dec REAL,
        epoch REAL,
        scheme TEXT NOT NULL,
        permissions TEXT NOT NULL
    );
    CREATE TABLE tom_targets_targetextra (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target_id INTEGER NOT NULL REFERENCES tom_targets_basetarget (id) ON DELETE CASCADE,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        float_value REAL
    );
    CREATE TABLE tom_targets_targetname (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target_id INTEGER NOT NULL REFERENCES tom_targets_basetarget (id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        created TEXT,
        modified TEXT
    );
    CREATE TABLE tom_dataproducts_dataproduct (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target_id INTEGER NOT NULL REFERENCES tom_targets_basetarget (id) ON DELETE CASCADE,
        product_id TEXT,
        data TEXT,
        extra_data TEXT,
        data_product_type TEXT,
        created TEXT,
        modified TEXT,
        featured INTEGER NOT NULL
    );
    CREATE TABLE tom_dataproducts_reduceddatum (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target_id INTEGER NOT NULL REFERENCES tom_targets_basetarget (id) ON DELETE CASCADE,
        data_product_id INTEGER REFERENCES tom_dataproducts_dataproduct (id) ON DELETE CASCADE,
        data_type TEXT NOT NULL,
        source_name TEXT,
        source_location TEXT,
        timestamp TEXT NOT NULL,
        value TEXT NOT NULL
    );
    CREATE TABLE custom_code_reduceddatumextra (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target_id INTEGER NOT NULL,
        data_type TEXT,
        key TEXT,
        value TEXT
    );
    CREATE TABLE auth_user (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        first_name TEXT,
        last_name TEXT,
        email TEXT,
        is_staff INTEGER NOT NULL,
        is_active INTEGER NOT NULL,
        is_superuser INTEGER NOT NULL,
        date_joined TEXT
    );
    CREATE TABLE auth_group (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL UNIQUE);
    CREATE TABLE auth_user_groups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        group_id INTEGER NOT NULL,
        UNIQUE (user_id, group_id)
    );
    CREATE TABLE auth_permission (id INTEGER PRIMARY KEY AUTOINCREMENT, codename TEXT NOT NULL);
    CREATE TABLE guardian_groupobjectpermission (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        permission_id INTEGER NOT NULL,
        group_id INTEGER NOT NULL,
        object_pk TEXT NOT NULL
    );
    INSERT INTO auth_permission (codename) VALUES
        ('view_target'),
        ('change_target'),
        ('delete_target'),
        ('view_reduceddatum');";

/// Create both store files in `dir`, with one pending ledger entry per entity
/// kind: a group, a user, a target with an alias, a photometry point and a
/// spectrum whose traced ascii file lands under the archive directory.
fn seeded_stores(dir: &Path) -> Stores {
    let stores = Stores {
        snex1: dir.join("snex1.sqlite3"),
        snex2: dir.join("snex2.sqlite3"),
        archive: dir.join("archive"),
    };

    let snex1 = Connection::open(&stores.snex1).unwrap();
    snex1.execute_batch(SNEX1_DDL).unwrap();
    snex1
        .execute_batch(
            "INSERT INTO groups (id, name, idcode) VALUES (1, 'LCO', 1);
             INSERT INTO users (id, name, pw, firstname, lastname, email, datecreated, groupidcode)
             VALUES (9, 'ehosseini', 'abcdef', 'Elahe', 'Hosseini', 'e@example.edu',
                     '2021-01-01 00:00:00', 1);
             INSERT INTO targets (id, ra0, dec0, groupidcode, redshift)
             VALUES (40, 241.25, -11.48, 1, 0.082);
             INSERT INTO targetnames (id, targetid, name) VALUES (400, 40, 'SN2021abc');
             INSERT INTO photlco (id, targetid, dateobs, ut, mag, dmag, filetype, filter, groupidcode)
             VALUES (31, 40, '2021-05-05', '07:41:12', 18.2, 0.03, 1, 'gp', 1);
             INSERT INTO spec
                 (id, targetid, dateobs, ut, filepath, filename, telescope, exptime, groupidcode)
             VALUES (77, 40, '2021-05-05', '07:00:00', '/supernova/data/spectra/',
                     'sn2021abc_20210505.fits', 'ftn', 900.0, 1);
             INSERT INTO db_changes (id, tablename, action, rowid) VALUES
                 (1, 'groups', 'insert', 1),
                 (2, 'users', 'insert', 9),
                 (3, 'targets', 'insert', 40),
                 (4, 'targetnames', 'insert', 400),
                 (5, 'photlco', 'insert', 31),
                 (6, 'spec', 'insert', 77);",
        )
        .unwrap();

    let snex2 = Connection::open(&stores.snex2).unwrap();
    snex2.execute_batch(SNEX2_DDL).unwrap();

    let spectra_dir = stores.archive.join("data/spectra");
    fs::create_dir_all(&spectra_dir).unwrap();
    fs::write(
        spectra_dir.join("sn2021abc_20210505.ascii"),
        "4000.0 1.2e-15\n4002.4 1.4e-15\n",
    )
    .unwrap();

    stores
}

fn open(path: &Path) -> Connection {
    Connection::open(path).unwrap()
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}
