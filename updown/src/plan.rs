//! Reconciliation of the on-disk scripts with the recorded history.
//!
//! Everything here is pure: given a [MigrationSource] and the applied versions it computes the
//! ordered steps a run must take, or the reason it must not run at all. Nothing touches the
//! database.

use crate::error::Error;
use crate::source::{Direction, MigrationScript, MigrationSource, PairingPolicy};
use crate::version::{Version, Versioned};
use serde::Serialize;

/// What executing a step does to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Run an Up script and record its version.
    Apply,
    /// Run a Down script and remove its version.
    Revert,
}

/// One script of a plan with its intended effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub script: MigrationScript,
    pub effect: Effect,
}

impl PlanStep {
    pub fn new(script: MigrationScript) -> Self {
        let effect = match script.direction {
            Direction::Up => Effect::Apply,
            Direction::Down => Effect::Revert,
        };
        Self { script, effect }
    }

    pub fn version(&self) -> Version {
        self.script.version()
    }

    pub fn direction(&self) -> Direction {
        self.script.direction
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// First-time run against an empty history.
    Initialize,
    /// Forward to the newest script.
    UpgradeToLatest,
    /// Forward to an explicit version.
    UpgradeTo(Version),
    /// Backward to an explicit, already applied version.
    DowngradeTo(Version),
    /// The target is already the latest applied version.
    AlreadyAtTarget(Version),
}

/// The ordered, direction-tagged steps one invocation will execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub kind: PlanKind,
    pub steps: Vec<PlanStep>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// `(version, direction)` for each step, in execution order.
    pub fn summary(&self) -> Vec<(Version, Direction)> {
        self.steps
            .iter()
            .map(|s| (s.version(), s.direction()))
            .collect()
    }

    /// Apply every Up script, ascending. Requires an empty history and complete pairing.
    pub fn initialize(
        source: &MigrationSource,
        applied: &[Version],
        policy: PairingPolicy,
    ) -> Result<Self, Error> {
        if !applied.is_empty() {
            return Err(Error::AlreadyInitialized {
                applied: applied.len(),
            });
        }
        source.validate_pairing(policy)?;
        Ok(Self {
            kind: PlanKind::Initialize,
            steps: steps(source.list_by_direction(Direction::Up).iter()),
        })
    }

    /// Every Up script strictly after the latest applied version.
    ///
    /// Every known version needs an Up script. Down scripts are not required here: a missing
    /// Down blocks reverting, not upgrading.
    pub fn upgrade(
        source: &MigrationSource,
        applied: &[Version],
        policy: PairingPolicy,
    ) -> Result<Self, Error> {
        source.require_direction(&source.versions(), Direction::Up, policy)?;
        let ups = source.list_by_direction(Direction::Up);
        let start = match applied.iter().max() {
            None => 0,
            Some(&latest) => position_of_latest(source, latest)? + 1,
        };
        Ok(Self {
            kind: PlanKind::UpgradeToLatest,
            steps: steps(ups[start..].iter()),
        })
    }

    /// Move to `target`, downgrading when it is already applied and upgrading otherwise.
    pub fn migrate_to(
        source: &MigrationSource,
        applied: &[Version],
        target: Version,
        policy: PairingPolicy,
    ) -> Result<Self, Error> {
        let latest = applied.iter().max().copied();
        if applied.contains(&target) {
            if latest == Some(target) {
                return Ok(Self {
                    kind: PlanKind::AlreadyAtTarget(target),
                    steps: Vec::new(),
                });
            }
            return Self::downgrade_to(source, applied, target, policy);
        }
        source.require_direction(&source.versions(), Direction::Up, policy)?;
        Self::upgrade_to(source, latest, target)
    }

    fn downgrade_to(
        source: &MigrationSource,
        applied: &[Version],
        target: Version,
        policy: PairingPolicy,
    ) -> Result<Self, Error> {
        let mut newer = applied
            .iter()
            .copied()
            .filter(|&v| v > target)
            .collect::<Vec<_>>();
        if let Some(&unknown) = newer.iter().find(|&&v| !source.knows(v)) {
            return Err(no_script_for(unknown));
        }
        source.require_direction(&newer, Direction::Down, policy)?;
        newer.sort_by(|a, b| b.cmp(a));
        let steps = newer
            .into_iter()
            .filter_map(|v| source.find(Direction::Down, v))
            .cloned()
            .map(PlanStep::new)
            .collect();
        Ok(Self {
            kind: PlanKind::DowngradeTo(target),
            steps,
        })
    }

    fn upgrade_to(
        source: &MigrationSource,
        latest: Option<Version>,
        target: Version,
    ) -> Result<Self, Error> {
        let ups = source.list_by_direction(Direction::Up);
        let end = ups
            .iter()
            .position(|s| s.version() == target)
            .ok_or(Error::UnknownTargetVersion(target))?;
        let start = match latest {
            None => 0,
            Some(latest) if latest > target => {
                return Err(Error::TargetBehindLatest { target, latest })
            }
            Some(latest) => position_of_latest(source, latest)? + 1,
        };
        Ok(Self {
            kind: PlanKind::UpgradeTo(target),
            steps: steps(ups[start..=end].iter()),
        })
    }
}

fn steps<'a>(scripts: impl Iterator<Item = &'a MigrationScript>) -> Vec<PlanStep> {
    scripts.cloned().map(PlanStep::new).collect()
}

fn position_of_latest(source: &MigrationSource, latest: Version) -> Result<usize, Error> {
    source
        .list_by_direction(Direction::Up)
        .iter()
        .position(|s| s.version() == latest)
        .ok_or_else(|| no_script_for(latest))
}

fn no_script_for(version: Version) -> Error {
    Error::HistoryInconsistent(format!(
        "version {} is recorded as applied but has no matching migration script",
        version
    ))
}
