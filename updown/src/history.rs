//! The persisted record of applied versions.

use crate::error::Error;
use crate::source::MigrationScript;
use crate::version::{sort_by_version, SortOrder, Version};
use std::collections::BTreeSet;

/// Default name of the bookkeeping table.
pub const DEFAULT_HISTORY_TABLE: &str = "_MigrationInfo";

/// A database holding the history table, able to run scripts against itself.
///
/// Implementations must make [HistoryStore::execute] atomic: the script's statements and the
/// matching history mutation commit together or not at all.
pub trait HistoryStore {
    /// Name of the history table.
    fn table(&self) -> &str;

    /// Create the history table if it does not exist yet.
    /// Returns `true` if this call created it.
    fn bootstrap(&mut self) -> Result<bool, Error>;

    /// Every recorded version, ascending. An absent history table reads as empty.
    fn applied_versions(&mut self) -> Result<Vec<Version>, Error>;

    /// The greatest recorded version by numeric comparison, regardless of insertion order.
    fn latest_applied(&mut self) -> Result<Option<Version>, Error> {
        Ok(self.applied_versions()?.into_iter().max())
    }

    /// Run `script` and record (Up) or remove (Down) its version, in one transaction.
    fn execute(&mut self, script: &MigrationScript) -> Result<(), Error>;
}

/// Turn raw `version` column values into sorted versions.
///
/// A row is either a bare token (`1000`) or a script stem (`1000_create_users`); only the token
/// before the first `_` counts. Blank rows are skipped. Unreadable rows, or two rows with the same
/// token, make the history unusable: membership and "latest applied" would both be ambiguous.
pub fn parse_history_rows<I, S>(rows: I) -> Result<Vec<Version>, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    let mut versions = Vec::new();
    for row in rows {
        let row = row.as_ref().trim();
        if row.is_empty() {
            continue;
        }
        let version = row
            .parse::<Version>()
            .map_err(|_| Error::HistoryInconsistent(format!("unreadable version row '{}'", row)))?;
        if !seen.insert(version) {
            return Err(Error::HistoryInconsistent(format!(
                "version {} is recorded more than once",
                version
            )));
        }
        versions.push(version);
    }
    sort_by_version(SortOrder::Ascending, &mut versions);
    Ok(versions)
}

/// `LIKE` pattern matching stem rows (`<token>_<label>`) of `version`.
///
/// Uses `\` as the escape character.
pub(crate) fn stem_pattern(version: Version) -> String {
    format!("{}\\_%", version)
}

/// Whether `sql` holds anything besides whitespace, semicolons and comments.
///
/// MySQL rejects a comment-only query with "Query was empty", so blank scripts are skipped there.
/// Executable comments (`/*! ... */`, `/*+ ... */`) count as statements.
#[cfg_attr(not(feature = "mysql"), allow(dead_code))]
pub(crate) fn has_statements(sql: &str) -> bool {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ';');
        if rest.is_empty() {
            return false;
        }
        if rest.starts_with("/*!") || rest.starts_with("/*+") {
            return true;
        }
        if let Some(comment) = rest.strip_prefix("--").or_else(|| rest.strip_prefix('#')) {
            rest = comment.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            return true;
        }
    }
}

/// Quote `name` as an SQL identifier using `quote` as the delimiter. Embedded delimiters are
/// doubled.
pub(crate) fn quote_ident(name: &str, quote: char) -> String {
    let escaped = name.replace(quote, &format!("{quote}{quote}"));
    format!("{quote}{escaped}{quote}")
}
