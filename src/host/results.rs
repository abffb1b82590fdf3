//! Result and coverage records exchanged with the external test host.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome the host recorded for one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// Test passed.
    Passed,
    /// Test failed.
    Failed,
    /// Test was skipped by the host.
    Skipped,
    /// Host wrote a record but could not determine pass/fail (process died or hung).
    Crashed,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Crashed => write!(f, "crashed"),
        }
    }
}

/// One test's recorded outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Fully qualified test name.
    pub name: String,
    /// Recorded outcome.
    pub outcome: TestOutcome,
}

impl TestResult {
    /// Build a result record.
    pub fn new(name: impl Into<String>, outcome: TestOutcome) -> Self {
        Self {
            name: name.into(),
            outcome,
        }
    }
}

/// Ordered results decoded from one artifact, or accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResultsBatch {
    /// Results in the order they were recorded.
    pub tests: Vec<TestResult>,
}

impl TestResultsBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result.
    pub fn push(&mut self, result: TestResult) {
        self.tests.push(result);
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// True when no results are present.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Iterate results in order.
    pub fn iter(&self) -> impl Iterator<Item = &TestResult> {
        self.tests.iter()
    }

    /// Look up a result by test name.
    pub fn get(&self, name: &str) -> Option<&TestResult> {
        self.tests.iter().find(|result| result.name == name)
    }

    /// Count results with `outcome`.
    pub fn count(&self, outcome: TestOutcome) -> usize {
        self.tests
            .iter()
            .filter(|result| result.outcome == outcome)
            .count()
    }

    /// True when at least one test failed, i.e. the run detected the mutation.
    pub fn any_failed(&self) -> bool {
        self.tests
            .iter()
            .any(|result| result.outcome == TestOutcome::Failed)
    }
}

impl FromIterator<TestResult> for TestResultsBatch {
    fn from_iter<I: IntoIterator<Item = TestResult>>(iter: I) -> Self {
        Self {
            tests: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TestResultsBatch {
    type Item = TestResult;
    type IntoIter = std::vec::IntoIter<TestResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.tests.into_iter()
    }
}

/// A code entity registered by the coverage collector.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoverageEntry {
    /// Module (assembly) containing the entity.
    pub module_name: String,
    /// Metadata handle of the covered method within the module.
    pub entity_handle: i32,
}

impl CoverageEntry {
    /// Build a coverage entry.
    pub fn new(module_name: impl Into<String>, entity_handle: i32) -> Self {
        Self {
            module_name: module_name.into(),
            entity_handle,
        }
    }
}

/// Test name to covered entities, produced by one coverage pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationCoverageMap {
    /// Entities each test executed.
    pub tests: BTreeMap<String, Vec<CoverageEntry>>,
}

impl MutationCoverageMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `test` executed `entry`.
    pub fn register(&mut self, test: impl Into<String>, entry: CoverageEntry) {
        let covered = self.tests.entry(test.into()).or_default();
        if !covered.contains(&entry) {
            covered.push(entry);
        }
    }

    /// Number of tests with coverage data.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// True when no test registered coverage.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Test names present in the map, sorted.
    pub fn tests(&self) -> impl Iterator<Item = &str> {
        self.tests.keys().map(String::as_str)
    }

    /// Entities executed by `test`.
    pub fn covered_by(&self, test: &str) -> &[CoverageEntry] {
        self.tests.get(test).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tests that executed `entry`; these are the only tests worth running
    /// against a mutation of that entity.
    pub fn tests_covering(&self, entry: &CoverageEntry) -> Vec<String> {
        self.tests
            .iter()
            .filter(|(_, covered)| covered.contains(entry))
            .map(|(test, _)| test.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_display() {
        assert_eq!(TestOutcome::Passed.to_string(), "passed");
        assert_eq!(TestOutcome::Failed.to_string(), "failed");
        assert_eq!(TestOutcome::Skipped.to_string(), "skipped");
        assert_eq!(TestOutcome::Crashed.to_string(), "crashed");
    }

    #[test]
    fn batch_queries() {
        let batch: TestResultsBatch = [
            TestResult::new("A", TestOutcome::Passed),
            TestResult::new("B", TestOutcome::Failed),
            TestResult::new("C", TestOutcome::Crashed),
        ]
        .into_iter()
        .collect();

        assert_eq!(batch.len(), 3);
        assert!(batch.any_failed());
        assert_eq!(batch.count(TestOutcome::Crashed), 1);
        assert_eq!(
            batch.get("B").map(|result| result.outcome),
            Some(TestOutcome::Failed)
        );
        assert!(batch.get("D").is_none());
    }

    #[test]
    fn coverage_lookup_by_entity() {
        let add = CoverageEntry::new("Calc.dll", 0x0600_0001);
        let sub = CoverageEntry::new("Calc.dll", 0x0600_0002);

        let mut map = MutationCoverageMap::new();
        map.register("Tests.AddWorks", add.clone());
        map.register("Tests.AddWorks", add.clone());
        map.register("Tests.Mixed", add.clone());
        map.register("Tests.Mixed", sub.clone());

        assert_eq!(map.len(), 2);
        assert_eq!(map.covered_by("Tests.AddWorks"), &[add.clone()]);
        assert!(map.covered_by("Tests.Unknown").is_empty());
        assert_eq!(
            map.tests_covering(&add),
            vec!["Tests.AddWorks".to_string(), "Tests.Mixed".to_string()]
        );
        assert_eq!(map.tests_covering(&sub), vec!["Tests.Mixed".to_string()]);
    }
}
