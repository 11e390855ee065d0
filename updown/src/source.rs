//! Enumeration and validation of the Up/Down script files backing a migration run.

use crate::error::{Error, MissingCounterpart};
use crate::version::{sort_by_version, Identifier, SortOrder, Version, Versioned};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Which way a script moves the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// The file suffix for scripts in this direction, e.g. `.up.sql`.
    pub fn suffix(self) -> &'static str {
        match self {
            Direction::Up => ".up.sql",
            Direction::Down => ".down.sql",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

pub const SCRIPT_EXTENSION: &str = ".sql";

/// The three logical views a [ScriptStore] is queried with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFilter {
    /// `*.sql`
    All,
    /// `*.up.sql`
    Up,
    /// `*.down.sql`
    Down,
}

impl ScriptFilter {
    pub fn matches(self, name: &str) -> bool {
        match self {
            ScriptFilter::All => name.ends_with(SCRIPT_EXTENSION),
            ScriptFilter::Up => name.ends_with(Direction::Up.suffix()),
            ScriptFilter::Down => name.ends_with(Direction::Down.suffix()),
        }
    }
}

impl From<Direction> for ScriptFilter {
    fn from(value: Direction) -> Self {
        match value {
            Direction::Up => ScriptFilter::Up,
            Direction::Down => ScriptFilter::Down,
        }
    }
}

/// A script as the store sees it: a name, its text and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScript {
    pub name: String,
    pub content: String,
    pub location: String,
}

/// A backing store of migration scripts.
pub trait ScriptStore {
    /// Human-readable description of where the scripts live, used in error messages.
    fn location(&self) -> String;

    /// All scripts matching `filter`, ordered by name.
    fn enumerate(&self, filter: ScriptFilter) -> Result<Vec<RawScript>, Error>;

    /// Create a new script. Fails if `name` already exists.
    fn create(&mut self, name: &str, content: &str) -> Result<(), Error>;
}

/// Scripts stored as `.sql` files directly inside one directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unavailable(&self, reason: impl fmt::Display) -> Error {
        Error::SourceUnavailable {
            location: self.location(),
            reason: reason.to_string(),
        }
    }
}

impl ScriptStore for DirectoryStore {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn enumerate(&self, filter: ScriptFilter) -> Result<Vec<RawScript>, Error> {
        if !self.root.is_dir() {
            return Err(self.unavailable("not a readable directory"));
        }
        let mut scripts = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| self.unavailable(e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !filter.matches(name) {
                continue;
            }
            let content = fs::read_to_string(entry.path()).map_err(|e| {
                self.unavailable(format!("reading {}: {}", entry.path().display(), e))
            })?;
            scripts.push(RawScript {
                name: name.to_string(),
                content,
                location: entry.path().display().to_string(),
            });
        }
        Ok(scripts)
    }

    fn create(&mut self, name: &str, content: &str) -> Result<(), Error> {
        fs::create_dir_all(&self.root).map_err(|e| self.unavailable(e))?;
        let path = self.root.join(name);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| self.unavailable(format!("creating {}: {}", path.display(), e)))?;
        file.write_all(content.as_bytes())
            .map_err(|e| self.unavailable(format!("writing {}: {}", path.display(), e)))?;
        Ok(())
    }
}

/// Scripts held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    scripts: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.scripts.insert(name.into(), content.into());
        self
    }

    /// Add `<stem>.up.sql` and `<stem>.down.sql` in one go.
    pub fn with_pair(self, stem: &str, up: &str, down: &str) -> Self {
        self.with_script(format!("{}{}", stem, Direction::Up.suffix()), up)
            .with_script(format!("{}{}", stem, Direction::Down.suffix()), down)
    }
}

impl ScriptStore for MemoryStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn enumerate(&self, filter: ScriptFilter) -> Result<Vec<RawScript>, Error> {
        Ok(self
            .scripts
            .iter()
            .filter(|(name, _)| filter.matches(name))
            .map(|(name, content)| RawScript {
                name: name.clone(),
                content: content.clone(),
                location: format!("memory:{}", name),
            })
            .collect())
    }

    fn create(&mut self, name: &str, content: &str) -> Result<(), Error> {
        if self.scripts.contains_key(name) {
            return Err(Error::SourceUnavailable {
                location: self.location(),
                reason: format!("{} already exists", name),
            });
        }
        self.scripts.insert(name.to_string(), content.to_string());
        Ok(())
    }
}

/// One Up or Down script, tagged with its direction at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationScript {
    pub identifier: Identifier,
    pub direction: Direction,
    #[serde(skip)]
    pub content: String,
    pub location: String,
}

impl MigrationScript {
    pub fn label(&self) -> &str {
        &self.identifier.label
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.identifier.stem(), self.direction.suffix())
    }
}

impl Versioned for MigrationScript {
    fn version(&self) -> Version {
        self.identifier.version
    }
}

/// How pairing violations are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairingPolicy {
    /// Stop at the first violation in ascending version order.
    #[default]
    FailFast,
    /// Report every violation at once.
    CollectAll,
}

/// A point-in-time read of a [ScriptStore], partitioned by direction and sorted ascending.
#[derive(Debug, Clone, Default)]
pub struct MigrationSource {
    ups: Vec<MigrationScript>,
    downs: Vec<MigrationScript>,
}

impl MigrationSource {
    /// Every `.sql` file in the store. Fails on any name that is not a well-formed
    /// `<version>_<label>.<up|down>.sql`.
    pub fn list_all(store: &dyn ScriptStore) -> Result<Vec<RawScript>, Error> {
        let all = store.enumerate(ScriptFilter::All)?;
        for raw in &all {
            if !ScriptFilter::Up.matches(&raw.name) && !ScriptFilter::Down.matches(&raw.name) {
                return Err(Error::MalformedName {
                    name: raw.name.clone(),
                    reason: "expected a '.up.sql' or '.down.sql' suffix".to_string(),
                });
            }
            Identifier::parse(&raw.name)?;
        }
        Ok(all)
    }

    /// Enumerate the store and build a validated, sorted source.
    /// Names are checked and duplicate versions within a direction rejected; pairing is
    /// checked separately by [MigrationSource::validate_pairing].
    pub fn load(store: &dyn ScriptStore) -> Result<Self, Error> {
        Self::list_all(store)?;
        let ups = Self::load_direction(store, Direction::Up)?;
        let downs = Self::load_direction(store, Direction::Down)?;
        Ok(Self { ups, downs })
    }

    fn load_direction(
        store: &dyn ScriptStore,
        direction: Direction,
    ) -> Result<Vec<MigrationScript>, Error> {
        let mut scripts = store
            .enumerate(direction.into())?
            .into_iter()
            .map(|raw| {
                Ok(MigrationScript {
                    identifier: Identifier::parse(&raw.name)?,
                    direction,
                    content: raw.content,
                    location: raw.location,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        sort_by_version(SortOrder::Ascending, &mut scripts);
        for pair in scripts.windows(2) {
            if pair[0].version() == pair[1].version() {
                return Err(Error::DuplicateVersion(pair[0].version()));
            }
        }
        Ok(scripts)
    }

    /// Scripts in `direction`, ascending by version.
    pub fn list_by_direction(&self, direction: Direction) -> &[MigrationScript] {
        match direction {
            Direction::Up => &self.ups,
            Direction::Down => &self.downs,
        }
    }

    pub fn find(&self, direction: Direction, version: Version) -> Option<&MigrationScript> {
        let scripts = self.list_by_direction(direction);
        scripts
            .binary_search_by(|s| s.version().cmp(&version))
            .ok()
            .map(|i| &scripts[i])
    }

    /// Every distinct version known to either partition, ascending.
    pub fn versions(&self) -> Vec<Version> {
        self.ups
            .iter()
            .chain(&self.downs)
            .map(|s| s.version())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn knows(&self, version: Version) -> bool {
        self.find(Direction::Up, version).is_some() || self.find(Direction::Down, version).is_some()
    }

    /// Require every known version to have both an Up and a Down script.
    pub fn validate_pairing(&self, policy: PairingPolicy) -> Result<(), Error> {
        self.require(&self.versions(), &[Direction::Up, Direction::Down], policy)
    }

    /// Require each of `versions` to have a script in `direction`.
    pub fn require_direction(
        &self,
        versions: &[Version],
        direction: Direction,
        policy: PairingPolicy,
    ) -> Result<(), Error> {
        let mut sorted = versions.to_vec();
        sort_by_version(SortOrder::Ascending, &mut sorted);
        self.require(&sorted, &[direction], policy)
    }

    fn require(
        &self,
        versions: &[Version],
        directions: &[Direction],
        policy: PairingPolicy,
    ) -> Result<(), Error> {
        let mut missing = Vec::new();
        for &version in versions {
            for &direction in directions {
                if self.find(direction, version).is_none() {
                    let violation = MissingCounterpart {
                        version,
                        missing: direction,
                    };
                    if policy == PairingPolicy::FailFast {
                        return Err(violation.into());
                    }
                    missing.push(violation);
                }
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Unpaired(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> MemoryStore {
        MemoryStore::new()
            .with_pair("1002_c", "CREATE TABLE c (id INTEGER);", "DROP TABLE c;")
            .with_pair("1000_a", "CREATE TABLE a (id INTEGER);", "DROP TABLE a;")
            .with_pair("1001_b", "CREATE TABLE b (id INTEGER);", "DROP TABLE b;")
    }

    fn versions_of(scripts: &[MigrationScript]) -> Vec<u64> {
        scripts.iter().map(|s| s.version().get()).collect()
    }

    #[test]
    fn load_partitions_and_sorts() {
        let source = MigrationSource::load(&abc()).unwrap();
        let ups = source.list_by_direction(Direction::Up);
        assert_eq!(versions_of(ups), vec![1000, 1001, 1002]);
        assert!(ups.iter().all(|s| s.direction == Direction::Up));
        assert_eq!(ups[1].label(), "b");
        assert_eq!(ups[1].content, "CREATE TABLE b (id INTEGER);");
        assert_eq!(ups[1].file_name(), "1001_b.up.sql");

        let downs = source.list_by_direction(Direction::Down);
        assert_eq!(versions_of(downs), vec![1000, 1001, 1002]);
        assert!(downs.iter().all(|s| s.direction == Direction::Down));
        assert!(source.validate_pairing(PairingPolicy::FailFast).is_ok());
    }

    #[test]
    fn numeric_order_beats_name_order() {
        let store = MemoryStore::new()
            .with_pair("999_z", "", "")
            .with_pair("1000_a", "", "");
        let source = MigrationSource::load(&store).unwrap();
        assert_eq!(
            versions_of(source.list_by_direction(Direction::Up)),
            vec![999, 1000]
        );
    }

    #[test]
    fn direction_comes_from_suffix_not_substring() {
        // "up" appears in the label of a down script
        let store = MemoryStore::new()
            .with_script("1000_backup_users.down.sql", "")
            .with_script("1000_backup_users.up.sql", "");
        let source = MigrationSource::load(&store).unwrap();
        assert_eq!(source.list_by_direction(Direction::Down).len(), 1);
        assert_eq!(source.list_by_direction(Direction::Up).len(), 1);
    }

    #[test]
    fn malformed_names_are_rejected() {
        let store = abc().with_script("1003_d.sql", "");
        assert!(matches!(
            MigrationSource::load(&store),
            Err(Error::MalformedName { ref name, .. }) if name == "1003_d.sql"
        ));

        let store = abc().with_script("initial.up.sql", "");
        assert!(matches!(
            MigrationSource::load(&store),
            Err(Error::MalformedName { .. })
        ));
    }

    #[test]
    fn non_sql_files_are_ignored() {
        let store = abc().with_script("README.md", "notes");
        assert!(MigrationSource::load(&store).is_ok());
    }

    #[test]
    fn duplicate_versions_in_one_direction_are_rejected() {
        let store = abc().with_script("1001_other.up.sql", "");
        assert_eq!(
            MigrationSource::load(&store).unwrap_err(),
            Error::DuplicateVersion(Version::new(1001))
        );
    }

    #[test]
    fn pairing_fails_fast_on_first_violation_in_ascending_order() {
        let store = MemoryStore::new()
            .with_pair("1000_a", "", "")
            .with_script("1002_c.down.sql", "")
            .with_script("1001_b.up.sql", "");
        let source = MigrationSource::load(&store).unwrap();
        assert_eq!(
            source.validate_pairing(PairingPolicy::FailFast),
            Err(Error::MissingCounterpart {
                version: Version::new(1001),
                missing: Direction::Down
            })
        );
    }

    #[test]
    fn pairing_can_collect_every_violation() {
        let store = MemoryStore::new()
            .with_pair("1000_a", "", "")
            .with_script("1002_c.down.sql", "")
            .with_script("1001_b.up.sql", "");
        let source = MigrationSource::load(&store).unwrap();
        assert_eq!(
            source.validate_pairing(PairingPolicy::CollectAll),
            Err(Error::Unpaired(vec![
                MissingCounterpart {
                    version: Version::new(1001),
                    missing: Direction::Down
                },
                MissingCounterpart {
                    version: Version::new(1002),
                    missing: Direction::Up
                },
            ]))
        );
    }

    #[test]
    fn pairing_fails_iff_a_version_is_in_exactly_one_partition() {
        let cases: Vec<(Vec<&str>, bool)> = vec![
            (vec![], true),
            (vec!["1_a.up.sql", "1_a.down.sql"], true),
            (vec!["1_a.up.sql"], false),
            (vec!["1_a.down.sql"], false),
            (vec!["1_a.up.sql", "1_b.down.sql"], true),
            (vec!["1_a.up.sql", "1_a.down.sql", "2_b.up.sql"], false),
            (
                vec!["1_a.up.sql", "2_b.down.sql", "2_b.up.sql", "1_a.down.sql"],
                true,
            ),
        ];
        for (names, paired) in cases {
            let store = names
                .iter()
                .fold(MemoryStore::new(), |store, name| store.with_script(*name, ""));
            let source = MigrationSource::load(&store).unwrap();
            for policy in [PairingPolicy::FailFast, PairingPolicy::CollectAll] {
                assert_eq!(
                    source.validate_pairing(policy).is_ok(),
                    paired,
                    "{:?} with {:?}",
                    names,
                    policy
                );
            }
        }
    }

    #[test]
    fn require_direction_checks_only_the_given_versions() {
        let store = MemoryStore::new()
            .with_pair("1000_a", "", "")
            .with_script("1001_b.up.sql", "");
        let source = MigrationSource::load(&store).unwrap();
        assert!(source
            .require_direction(&[Version::new(1000)], Direction::Down, PairingPolicy::FailFast)
            .is_ok());
        assert_eq!(
            source.require_direction(
                &[Version::new(1001), Version::new(1000)],
                Direction::Down,
                PairingPolicy::FailFast
            ),
            Err(Error::MissingCounterpart {
                version: Version::new(1001),
                missing: Direction::Down
            })
        );
    }

    #[test]
    fn directory_store_reads_sorted_sql_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1001_b.up.sql"), "CREATE TABLE b (id INTEGER);").unwrap();
        fs::write(dir.path().join("1001_b.down.sql"), "DROP TABLE b;").unwrap();
        fs::write(dir.path().join("1000_a.up.sql"), "CREATE TABLE a (id INTEGER);").unwrap();
        fs::write(dir.path().join("1000_a.down.sql"), "DROP TABLE a;").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("nested.up.sql")).unwrap();

        let store = DirectoryStore::new(dir.path());
        let names = store
            .enumerate(ScriptFilter::Up)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["1000_a.up.sql", "1001_b.up.sql"]);
        assert_eq!(store.enumerate(ScriptFilter::All).unwrap().len(), 4);

        let source = MigrationSource::load(&store).unwrap();
        assert_eq!(
            source.find(Direction::Down, Version::new(1001)).unwrap().content,
            "DROP TABLE b;"
        );
    }

    #[test]
    fn directory_store_missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("nope"));
        assert!(matches!(
            MigrationSource::load(&store),
            Err(Error::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn directory_store_create_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirectoryStore::new(dir.path().join("migrations"));
        store.create("1000_a.up.sql", "-- up\n").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("migrations/1000_a.up.sql")).unwrap(),
            "-- up\n"
        );
        assert!(matches!(
            store.create("1000_a.up.sql", ""),
            Err(Error::SourceUnavailable { .. })
        ));
    }
}
