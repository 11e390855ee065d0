use crate::error::Error;
use crate::history::HistoryStore;
use crate::plan::{MigrationPlan, PlanKind, PlanStep};
use crate::source::{Direction, MigrationSource, PairingPolicy, ScriptStore};
use crate::version::{Identifier, Version};
use serde::Serialize;
use std::time::{Duration, Instant};

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// At least one script ran.
    Applied,
    /// Nothing was pending.
    UpToDate,
    /// The requested target is already the latest applied version.
    AlreadyAtTarget,
}

/// A report of actions performed during a migration run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    pub history_table_created: bool,
    pub kind: PlanKind,
    pub outcome: Outcome,
    pub steps_run: Vec<PlanStep>,
}

/// Applied versions next to the Up scripts a plain upgrade would run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub applied: Vec<Version>,
    pub pending: Vec<Identifier>,
}

/// The migration engine: reconciles a [ScriptStore] with a [HistoryStore] and runs the difference.
///
/// The store is re-read on every call, so scripts added between calls are always seen.
/// Every script runs in its own transaction together with its history row; a failure stops the run
/// and leaves earlier scripts committed. Re-running the same operation resumes from the history.
pub struct Migrator {
    store: Box<dyn ScriptStore>,
    pairing_policy: PairingPolicy,
    on_script_start: Option<Box<dyn Fn(&PlanStep) + Send + Sync>>,
    on_script_complete: Option<Box<dyn Fn(&PlanStep, Duration) + Send + Sync>>,
    on_script_error: Option<Box<dyn Fn(&PlanStep, &Error) + Send + Sync>>,
}

// Manual Debug impl since closures don't implement Debug
impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("store", &self.store.location())
            .field("pairing_policy", &self.pairing_policy)
            .field("on_script_start", &self.on_script_start.is_some())
            .field("on_script_complete", &self.on_script_complete.is_some())
            .field("on_script_error", &self.on_script_error.is_some())
            .finish()
    }
}

impl Migrator {
    pub fn new(store: impl ScriptStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            pairing_policy: PairingPolicy::default(),
            on_script_start: None,
            on_script_complete: None,
            on_script_error: None,
        }
    }

    /// Report only the first pairing violation, or all of them.
    pub fn with_pairing_policy(mut self, policy: PairingPolicy) -> Self {
        self.pairing_policy = policy;
        self
    }

    /// Set a callback to be invoked before each script runs.
    pub fn on_script_start<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PlanStep) + Send + Sync + 'static,
    {
        self.on_script_start = Some(Box::new(callback));
        self
    }

    /// Set a callback to be invoked after each script commits, with its duration.
    pub fn on_script_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PlanStep, Duration) + Send + Sync + 'static,
    {
        self.on_script_complete = Some(Box::new(callback));
        self
    }

    /// Set a callback to be invoked when a script fails and the run stops.
    pub fn on_script_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PlanStep, &Error) + Send + Sync + 'static,
    {
        self.on_script_error = Some(Box::new(callback));
        self
    }

    pub fn store(&self) -> &dyn ScriptStore {
        self.store.as_ref()
    }

    /// Read and validate the scripts currently in the store.
    pub fn source(&self) -> Result<MigrationSource, Error> {
        MigrationSource::load(self.store.as_ref())
    }

    /// Create an empty Up/Down pair for `label` with a fresh time-based version.
    pub fn new_version(&mut self, label: &str) -> Result<Identifier, Error> {
        let existing = self.source()?.versions();
        let identifier = Identifier::generate(label, &existing)?;
        for direction in [Direction::Up, Direction::Down] {
            let name = format!("{}{}", identifier.stem(), direction.suffix());
            let header = format!("-- {} ({})\n", identifier, direction.as_str().to_uppercase());
            self.store.create(&name, &header)?;
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            version = %identifier.version,
            label = %identifier.label,
            "Created new migration files"
        );

        Ok(identifier)
    }

    /// Applied versions, ascending. Read-only; a missing history table reads as empty.
    pub fn history(&self, db: &mut dyn HistoryStore) -> Result<Vec<Version>, Error> {
        db.applied_versions()
    }

    pub fn status(&self, db: &mut dyn HistoryStore) -> Result<Status, Error> {
        let applied = db.applied_versions()?;
        let plan = MigrationPlan::upgrade(&self.source()?, &applied, self.pairing_policy)?;
        Ok(Status {
            applied,
            pending: plan
                .steps
                .into_iter()
                .map(|s| s.script.identifier)
                .collect(),
        })
    }

    /// What [Migrator::initialize] would run, without touching the database.
    pub fn plan_initialize(&self, db: &mut dyn HistoryStore) -> Result<MigrationPlan, Error> {
        let source = self.source()?;
        MigrationPlan::initialize(&source, &db.applied_versions()?, self.pairing_policy)
    }

    /// What [Migrator::upgrade] would run, without touching the database.
    pub fn plan_upgrade(&self, db: &mut dyn HistoryStore) -> Result<MigrationPlan, Error> {
        let source = self.source()?;
        MigrationPlan::upgrade(&source, &db.applied_versions()?, self.pairing_policy)
    }

    /// What [Migrator::migrate_to] would run, without touching the database.
    pub fn plan_migrate_to(
        &self,
        db: &mut dyn HistoryStore,
        target: Version,
    ) -> Result<MigrationPlan, Error> {
        let source = self.source()?;
        MigrationPlan::migrate_to(&source, &db.applied_versions()?, target, self.pairing_policy)
    }

    // Each mutating operation plans first and bootstraps second, so a validation
    // failure leaves the database untouched, history table included.

    /// First-time setup: create the history table and apply every Up script.
    /// Refuses to run against a database that already has history.
    pub fn initialize(&self, db: &mut dyn HistoryStore) -> Result<MigrationReport, Error> {
        let plan = self.plan_initialize(db)?;
        let created = db.bootstrap()?;
        self.execute(db, plan, created)
    }

    /// Apply every Up script newer than the latest applied version.
    pub fn upgrade(&self, db: &mut dyn HistoryStore) -> Result<MigrationReport, Error> {
        let plan = self.plan_upgrade(db)?;
        let created = db.bootstrap()?;
        self.execute(db, plan, created)
    }

    /// Move the database to exactly `target`: revert newer versions if it is applied,
    /// otherwise apply everything up to and including it.
    pub fn migrate_to(
        &self,
        db: &mut dyn HistoryStore,
        target: Version,
    ) -> Result<MigrationReport, Error> {
        let plan = self.plan_migrate_to(db, target)?;
        let created = db.bootstrap()?;
        self.execute(db, plan, created)
    }

    fn execute(
        &self,
        db: &mut dyn HistoryStore,
        plan: MigrationPlan,
        history_table_created: bool,
    ) -> Result<MigrationReport, Error> {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            kind = ?plan.kind,
            steps = ?plan.summary(),
            table = db.table(),
            "Executing migration plan"
        );

        let kind = plan.kind;
        let mut steps_run = Vec::with_capacity(plan.len());
        for step in plan.steps {
            #[cfg(feature = "tracing")]
            let _span = match step.direction() {
                Direction::Up => tracing::info_span!(
                    "script_up",
                    version = %step.version(),
                    label = %step.script.label()
                ),
                Direction::Down => tracing::info_span!(
                    "script_down",
                    version = %step.version(),
                    label = %step.script.label()
                ),
            }
            .entered();

            #[cfg(feature = "tracing")]
            tracing::info!("Starting script");

            if let Some(ref callback) = self.on_script_start {
                callback(&step);
            }

            let started = Instant::now();
            if let Err(cause) = db.execute(&step.script) {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %cause, "Script failed");

                if let Some(ref callback) = self.on_script_error {
                    callback(&step, &cause);
                }
                return Err(Error::ExecutionFailed {
                    version: step.version(),
                    direction: step.direction(),
                    cause: cause.to_string(),
                    applied: steps_run.len(),
                });
            }
            let elapsed = started.elapsed();

            #[cfg(feature = "tracing")]
            tracing::info!(
                duration_ms = elapsed.as_millis(),
                "Script completed successfully"
            );

            if let Some(ref callback) = self.on_script_complete {
                callback(&step, elapsed);
            }
            steps_run.push(step);
        }

        let outcome = match kind {
            PlanKind::AlreadyAtTarget(_) => Outcome::AlreadyAtTarget,
            _ if steps_run.is_empty() => Outcome::UpToDate,
            _ => Outcome::Applied,
        };

        #[cfg(feature = "tracing")]
        tracing::info!(?outcome, steps = steps_run.len(), "Migration run finished");

        Ok(MigrationReport {
            history_table_created,
            kind,
            outcome,
            steps_run,
        })
    }
}
