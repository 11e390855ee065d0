#![cfg_attr(docsrs, feature(doc_cfg))]
/*!
Versioned, reversible SQL schema migrations driven by plain `.sql` files.

Every schema change is a pair of scripts sharing a numeric version token and a label:

```text
migrations/
  1700000000_create_users.up.sql
  1700000000_create_users.down.sql
  1700000300_add_email.up.sql
  1700000300_add_email.down.sql
```

Applied versions are recorded in a bookkeeping table (`_MigrationInfo` by default) that lives
in the target database. Each script runs in its own transaction together with the history
row it adds or removes, so the history never disagrees with the schema about a single script.

# Usage

```
# #[cfg(feature = "sqlite")]
# fn main() -> Result<(), updown::Error> {
use updown::sqlite::SqliteHistory;
use updown::{MemoryStore, Migrator, Version};
use rusqlite::Connection;

let store = MemoryStore::new()
    .with_pair("1000_users", "CREATE TABLE users (id INTEGER PRIMARY KEY);", "DROP TABLE users;")
    .with_pair("1001_posts", "CREATE TABLE posts (id INTEGER PRIMARY KEY);", "DROP TABLE posts;");
let migrator = Migrator::new(store);
let mut db = SqliteHistory::new(Connection::open_in_memory()?);

// apply everything not yet applied
let report = migrator.upgrade(&mut db)?;
assert_eq!(report.steps_run.len(), 2);

// roll back to the first version
migrator.migrate_to(&mut db, Version::new(1000))?;
assert_eq!(migrator.history(&mut db)?, vec![Version::new(1000)]);
# Ok(())
# }
# #[cfg(not(feature = "sqlite"))]
# fn main() {}
```

Scripts normally come from a [DirectoryStore]; [Migrator::new_version] creates a fresh,
empty pair there.

# Operations

- [Migrator::initialize]: first-time setup. Creates the history table and applies every Up
  script. Requires an empty history and that every version has both scripts.
- [Migrator::upgrade]: applies every Up script newer than the latest applied version.
- [Migrator::migrate_to]: reverts newer versions when the target is already applied,
  otherwise applies everything up to and including the target.

The `plan_*` variants compute the same steps without touching the database.

# Failures

A failing script stops the run. Earlier scripts stay committed, the failing one is rolled back,
and the error is [Error::ExecutionFailed]. Fix the script and run the same operation again; it
resumes from the recorded history.

# Features

- `sqlite` (default): [sqlite::SqliteHistory] via `rusqlite`.
- `mysql`: `mysql::MysqlHistory` via the `mysql` crate. Note that MySQL commits DDL implicitly.
- `tracing`: emits a span per script and events for start, completion and failure.
*/

mod error;
mod history;
mod migrator;
mod plan;
mod source;
mod version;

#[cfg(feature = "mysql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mysql")))]
pub mod mysql;
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;
#[cfg(all(test, feature = "mysql"))]
mod test_mysql;

pub use error::{Error, MissingCounterpart};
pub use history::{parse_history_rows, HistoryStore, DEFAULT_HISTORY_TABLE};
pub use migrator::{MigrationReport, Migrator, Outcome, Status};
pub use plan::{Effect, MigrationPlan, PlanKind, PlanStep};
pub use source::{
    Direction, DirectoryStore, MemoryStore, MigrationScript, MigrationSource, PairingPolicy,
    RawScript, ScriptFilter, ScriptStore, SCRIPT_EXTENSION,
};
pub use version::{
    compare, normalize_label, sort_by_version, Identifier, SortOrder, Version, Versioned,
};
