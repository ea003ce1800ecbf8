//! Simulation scenarios.

use rand::Rng;
use serde::Serialize;

use crate::fault::Fault;

/// What a single coordinated run should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    /// Fault carried by the injected participant.
    pub fault: Fault,
    /// Whether the caller's action returns an error.
    pub action_fails: bool,
}

impl RunPlan {
    /// A run with no faults.
    pub fn clean() -> Self {
        Self {
            fault: Fault::None,
            action_fails: false,
        }
    }
}

/// A named simulation scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Every run commits.
    HappyPath,
    /// Every action fails after staging its transfer.
    ActionFailure,
    /// The injected participant fails to commit after the ledger committed.
    CommitFailure,
    /// The injected participant fails to begin.
    BeginFailure,
    /// Faults of every kind, each with probability `fault_rate`.
    RandomFaults,
}

impl Scenario {
    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "happy-path" => Ok(Scenario::HappyPath),
            "action-failure" => Ok(Scenario::ActionFailure),
            "commit-failure" => Ok(Scenario::CommitFailure),
            "begin-failure" => Ok(Scenario::BeginFailure),
            "random-faults" => Ok(Scenario::RandomFaults),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Scenario name as accepted by [`Scenario::load`].
    pub fn name(&self) -> &'static str {
        match self {
            Scenario::HappyPath => "happy-path",
            Scenario::ActionFailure => "action-failure",
            Scenario::CommitFailure => "commit-failure",
            Scenario::BeginFailure => "begin-failure",
            Scenario::RandomFaults => "random-faults",
        }
    }

    /// Description.
    pub fn description(&self) -> &'static str {
        match self {
            Scenario::HappyPath => "Transfers and events commit on every run",
            Scenario::ActionFailure => "The action fails, every participant rolls back",
            Scenario::CommitFailure => "A later participant fails to commit after the ledger",
            Scenario::BeginFailure => "A participant fails to begin, earlier ones roll back",
            Scenario::RandomFaults => "Random begin, action, commit and rollback faults",
        }
    }

    /// Decide what the next run does.
    pub fn plan<R: Rng>(&self, rng: &mut R, fault_rate: f64) -> RunPlan {
        match self {
            Scenario::HappyPath => RunPlan::clean(),
            Scenario::ActionFailure => RunPlan {
                fault: Fault::None,
                action_fails: true,
            },
            Scenario::CommitFailure => RunPlan {
                fault: Fault::Commit,
                action_fails: false,
            },
            Scenario::BeginFailure => RunPlan {
                fault: Fault::Begin,
                action_fails: false,
            },
            Scenario::RandomFaults => {
                if !rng.gen_bool(fault_rate) {
                    return RunPlan::clean();
                }

                match rng.gen_range(0..4) {
                    0 => RunPlan {
                        fault: Fault::Begin,
                        action_fails: false,
                    },
                    1 => RunPlan {
                        fault: Fault::None,
                        action_fails: true,
                    },
                    2 => RunPlan {
                        fault: Fault::Commit,
                        action_fails: false,
                    },
                    // A rollback fault only surfaces when something else fails
                    _ => RunPlan {
                        fault: Fault::Rollback,
                        action_fails: true,
                    },
                }
            }
        }
    }
}
