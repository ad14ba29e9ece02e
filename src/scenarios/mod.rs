//! Built-in conformance scenarios
//!
//! Each scenario is a checkpoint chain over a [`Context`]. Suites pick
//! scenarios by name and supply the [`ControlInfo`] describing the program
//! under test.

pub mod breakpoint_resolve;
pub mod context;
pub mod hot_reload;
pub mod stepping;

pub use context::{Context, ControlInfo};

use crate::checkpoint::CheckpointChain;
use crate::common::Result;

/// A named, buildable scenario
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    build: fn() -> Result<CheckpointChain<Context>>,
}

impl Scenario {
    /// Build and validate the scenario's chain
    pub fn chain(&self) -> Result<CheckpointChain<Context>> {
        (self.build)()
    }
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "stepping",
        description: "Step in, over and out of a helper, then run to exit",
        build: stepping::chain,
    },
    Scenario {
        name: "breakpoint_resolve",
        description: "Source path resolution, alias collapsing, nested functions and constructors",
        build: breakpoint_resolve::chain,
    },
    Scenario {
        name: "hot_reload_jmc",
        description: "Just-my-code stepping through methods added by a delta",
        build: hot_reload::jmc_chain,
    },
    Scenario {
        name: "hot_reload_async_stepping",
        description: "Stepping through async methods added by a delta",
        build: hot_reload::async_stepping_chain,
    },
];

/// Look up a built-in scenario by name
pub fn find(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scenario_builds() {
        for scenario in SCENARIOS {
            let chain = scenario
                .chain()
                .unwrap_or_else(|e| panic!("{} failed validation: {}", scenario.name, e));
            assert_eq!(chain.entry(), "init", "{}", scenario.name);
            assert!(chain.names().any(|n| n == "finish"), "{}", scenario.name);
            assert_eq!(chain.next_of("finish"), Some(""), "{}", scenario.name);
        }
    }

    #[test]
    fn test_find() {
        assert!(find("stepping").is_some());
        assert!(find("hot_reload_jmc").is_some());
        assert!(find("missing").is_none());

        let names: Vec<_> = SCENARIOS.iter().map(|s| s.name).collect();
        let mut unique = names.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(names.len(), unique.len());
    }

    #[test]
    fn test_stepping_order() {
        let chain = stepping::chain().unwrap();
        assert_eq!(
            chain.names().collect::<Vec<_>>(),
            vec!["init", "bp_test", "step_in", "step_over", "step_out", "finish"]
        );
        assert_eq!(chain.next_of("step_out"), Some("finish"));
    }
}
