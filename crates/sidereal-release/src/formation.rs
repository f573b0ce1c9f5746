//! Process formations and their derivation from a previous release.
//!
//! A [`Formation`] is the desired process topology for one release. When a
//! new release is created, its formation is derived from the formation of
//! the release immediately before it and the process types declared by the
//! new slug:
//!
//! - types in both keep their quantity and constraints but take the new command
//! - types only in the slug get the configured defaults
//! - types only in the old formation are dropped

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::FormationConfig;
use crate::types::ProcessType;

/// Resource limits for a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Memory limit in MB.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,
    /// Relative CPU weight.
    #[serde(default = "default_cpu_shares")]
    pub cpu_shares: u32,
}

const fn default_memory_mb() -> u32 {
    512
}

const fn default_cpu_shares() -> u32 {
    256
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            memory_mb: default_memory_mb(),
            cpu_shares: default_cpu_shares(),
        }
    }
}

/// A single process type within a formation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    /// Process type name, unique within the formation.
    pub process_type: ProcessType,
    /// Command used to start the process.
    pub command: String,
    /// Desired number of instances.
    pub quantity: u32,
    /// Resource limits.
    pub constraints: Constraints,
}

/// Desired process topology for a release, keyed by process type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Formation(BTreeMap<ProcessType, Process>);

impl Formation {
    /// Create an empty formation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a process by type.
    #[must_use]
    pub fn get(&self, process_type: &ProcessType) -> Option<&Process> {
        self.0.get(process_type)
    }

    /// Insert a process, replacing any existing entry of the same type.
    pub fn insert(&mut self, process: Process) -> Option<Process> {
        self.0.insert(process.process_type.clone(), process)
    }

    /// Iterate over processes ordered by type name.
    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.0.values()
    }

    /// Number of process types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the formation has no processes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Process> for Formation {
    fn from_iter<I: IntoIterator<Item = Process>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|p| (p.process_type.clone(), p))
                .collect(),
        )
    }
}

/// Derives new formations from a previous formation and a slug's process types.
#[derive(Debug, Clone, Default)]
pub struct FormationBuilder {
    default_quantity: u32,
    quantities: BTreeMap<ProcessType, u32>,
    constraints: Constraints,
}

impl FormationBuilder {
    /// Create a builder whose new processes start at zero instances.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder from configuration.
    #[must_use]
    pub fn from_config(config: &FormationConfig) -> Self {
        Self {
            default_quantity: config.default_quantity,
            quantities: config
                .quantities
                .iter()
                .map(|(name, qty)| (ProcessType::new(name.as_str()), *qty))
                .collect(),
            constraints: config.constraints,
        }
    }

    /// Set the instance count for new processes of a specific type.
    #[must_use]
    pub fn with_quantity(mut self, process_type: ProcessType, quantity: u32) -> Self {
        self.quantities.insert(process_type, quantity);
        self
    }

    /// Set the constraints given to new processes.
    #[must_use]
    pub const fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Default quantity for a process type that has no previous entry.
    #[must_use]
    pub fn default_quantity(&self, process_type: &ProcessType) -> u32 {
        self.quantities
            .get(process_type)
            .copied()
            .unwrap_or(self.default_quantity)
    }

    /// Derive the formation for a new release.
    ///
    /// Only the immediately preceding formation is consulted. The result
    /// contains exactly the process types in `process_types`.
    #[must_use]
    pub fn derive(
        &self,
        existing: &Formation,
        process_types: &BTreeMap<ProcessType, String>,
    ) -> Formation {
        process_types
            .iter()
            .map(|(process_type, command)| match existing.get(process_type) {
                Some(previous) => Process {
                    command: command.clone(),
                    ..previous.clone()
                },
                None => Process {
                    process_type: process_type.clone(),
                    command: command.clone(),
                    quantity: self.default_quantity(process_type),
                    constraints: self.constraints,
                },
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn process(name: &str, command: &str, quantity: u32) -> Process {
        Process {
            process_type: ProcessType::new(name),
            command: command.to_owned(),
            quantity,
            constraints: Constraints::default(),
        }
    }

    fn declared(types: &[(&str, &str)]) -> BTreeMap<ProcessType, String> {
        types
            .iter()
            .map(|(name, cmd)| (ProcessType::new(*name), (*cmd).to_owned()))
            .collect()
    }

    #[test]
    fn carries_forward_quantity_and_adopts_new_command() {
        let existing: Formation = [process("web", "./web --old", 2)].into_iter().collect();
        let types = declared(&[("web", "./web --new"), ("worker", "./worker")]);

        let formation = FormationBuilder::new().derive(&existing, &types);

        let web = formation.get(&ProcessType::new("web")).unwrap();
        assert_eq!(web.quantity, 2);
        assert_eq!(web.command, "./web --new");

        let worker = formation.get(&ProcessType::new("worker")).unwrap();
        assert_eq!(worker.quantity, 0);
        assert_eq!(worker.command, "./worker");
        assert_eq!(formation.len(), 2);
    }

    #[test]
    fn drops_types_missing_from_slug() {
        let existing: Formation = [process("web", "./web", 2), process("worker", "./worker", 1)]
            .into_iter()
            .collect();
        let types = declared(&[("web", "./web")]);

        let formation = FormationBuilder::new().derive(&existing, &types);

        assert_eq!(formation.len(), 1);
        assert_eq!(formation.get(&ProcessType::new("web")).unwrap().quantity, 2);
        assert!(formation.get(&ProcessType::new("worker")).is_none());
    }

    #[test]
    fn carries_forward_constraints() {
        let tuned = Constraints {
            memory_mb: 2048,
            cpu_shares: 1024,
        };
        let mut web = process("web", "./web", 3);
        web.constraints = tuned;
        let existing: Formation = [web].into_iter().collect();

        let formation = FormationBuilder::new()
            .with_constraints(Constraints {
                memory_mb: 128,
                cpu_shares: 64,
            })
            .derive(&existing, &declared(&[("web", "./web")]));

        assert_eq!(formation.get(&ProcessType::new("web")).unwrap().constraints, tuned);
    }

    #[rstest]
    #[case::no_types(&[], 0)]
    #[case::one_type(&[("web", "./web")], 1)]
    #[case::two_types(&[("web", "./web"), ("clock", "./clock")], 2)]
    fn first_release_defaults_every_type(#[case] types: &[(&str, &str)], #[case] expected: usize) {
        let formation = FormationBuilder::new().derive(&Formation::new(), &declared(types));

        assert_eq!(formation.len(), expected);
        for p in formation.iter() {
            assert_eq!(p.quantity, 0);
            assert_eq!(p.constraints, Constraints::default());
        }
    }

    #[rstest]
    #[case::override_applies("web", 1)]
    #[case::falls_back_to_default("worker", 0)]
    fn per_type_default_quantity(#[case] name: &str, #[case] expected: u32) {
        let builder = FormationBuilder::new().with_quantity(ProcessType::new("web"), 1);
        let formation = builder.derive(&Formation::new(), &declared(&[(name, "./run")]));

        assert_eq!(formation.get(&ProcessType::new(name)).unwrap().quantity, expected);
    }

    #[test]
    fn from_config_uses_configured_defaults() {
        let mut config = FormationConfig::default();
        config.default_quantity = 2;
        config.quantities.insert("web".to_owned(), 5);

        let builder = FormationBuilder::from_config(&config);

        assert_eq!(builder.default_quantity(&ProcessType::new("web")), 5);
        assert_eq!(builder.default_quantity(&ProcessType::new("worker")), 2);
    }

    #[test]
    fn formation_serialises_as_map() {
        let formation: Formation = [process("web", "./web", 1)].into_iter().collect();
        let json = serde_json::to_value(&formation).unwrap();
        assert_eq!(json["web"]["quantity"], 1);
        assert_eq!(json["web"]["command"], "./web");
    }
}
