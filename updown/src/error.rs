use crate::source::Direction;
use crate::version::Version;

/// A version whose Up or Down script is absent from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCounterpart {
    pub version: Version,
    /// The direction that has no script.
    pub missing: Direction,
}

impl std::fmt::Display for MissingCounterpart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "version {} is missing {} migration file",
            self.version,
            self.missing.as_str().to_uppercase()
        )
    }
}

/// Error type for the updown crate.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("migration source '{location}' is unavailable: {reason}")]
    SourceUnavailable { location: String, reason: String },
    #[error("malformed migration name '{name}': {reason}")]
    MalformedName { name: String, reason: String },
    #[error("duplicate schema version {0} found in migration source")]
    DuplicateVersion(Version),
    #[error("version {version} is missing {} migration file", .missing.as_str().to_uppercase())]
    MissingCounterpart { version: Version, missing: Direction },
    #[error("{} version(s) are not paired: {}", .0.len(), join_unpaired(.0))]
    Unpaired(Vec<MissingCounterpart>),
    #[error("database is unavailable: {0}")]
    StorageUnavailable(String),
    #[error("the target database already has {applied} recorded migration(s); reset the database before initializing")]
    AlreadyInitialized { applied: usize },
    #[error("target version {0} does not match any known UP migration")]
    UnknownTargetVersion(Version),
    #[error("target version {target} is older than the latest applied version {latest} but was never applied")]
    TargetBehindLatest { target: Version, latest: Version },
    #[error("{direction} migration {version} failed after {applied} script(s) were committed: {cause}")]
    ExecutionFailed {
        version: Version,
        direction: Direction,
        cause: String,
        applied: usize,
    },
    #[error("migration history is inconsistent: {0}")]
    HistoryInconsistent(String),
    #[cfg(feature = "sqlite")]
    #[error("{0}")]
    Rusqlite(rusqlite::Error),
    #[cfg(feature = "mysql")]
    #[error("{0}")]
    Mysql(String),
    #[error("{0}")]
    Generic(String),
}

fn join_unpaired(unpaired: &[MissingCounterpart]) -> String {
    unpaired
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<MissingCounterpart> for Error {
    fn from(value: MissingCounterpart) -> Self {
        Self::MissingCounterpart {
            version: value.version,
            missing: value.missing,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Rusqlite(value)
    }
}

#[cfg(feature = "mysql")]
impl From<mysql::Error> for Error {
    fn from(value: mysql::Error) -> Self {
        Self::Mysql(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Self::Generic(value)
    }
}
