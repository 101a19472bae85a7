// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Change-data-capture synchronisation from the legacy SNEx1 supernova database
into SNEx2.

SNEx1 records row-level mutations in its `db_changes` ledger; one run of this
tool replays every pending mutation into the SNEx2 (TOM Toolkit) database,
reconciling the two schemas as it goes, then retires the consumed ledger
entries. Interrupted runs are safe to repeat; every entry is applied inside
its own destination transaction and consumed only after that transaction
commits.
*/

mod cli;
mod grants;
mod ledger;
mod params;
mod schema;
mod snex1;
mod snex2;
mod sync;

pub use cli::{SnexSync, SnexSyncError};

use crossbeam_utils::atomic::AtomicCell;

/// Are progress bars being drawn?
pub(crate) static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);
