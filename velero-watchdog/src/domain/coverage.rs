//! Namespace coverage: which namespaces no schedule backs up.

use std::collections::BTreeSet;

use super::schedule::ScheduleSnapshot;

/// Namespaces left out of every schedule's scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceCoverageReport {
    /// Uncovered namespace names, sorted ascending.
    pub uncovered: Vec<String>,
    /// Number of namespaces in the cluster.
    pub total: usize,
}

impl NamespaceCoverageReport {
    /// Compare the cluster namespaces against the union of every schedule's
    /// `included_namespaces`.
    pub fn compute(namespaces: &[String], schedules: &ScheduleSnapshot) -> Self {
        let covered: BTreeSet<&str> = schedules
            .values()
            .flat_map(|s| s.included_namespaces.iter().map(String::as_str))
            .collect();

        let uncovered: BTreeSet<&str> = namespaces
            .iter()
            .map(String::as_str)
            .filter(|ns| !covered.contains(ns))
            .collect();

        Self {
            uncovered: uncovered.into_iter().map(str::to_string).collect(),
            total: namespaces.len(),
        }
    }

    pub fn uncovered_count(&self) -> usize {
        self.uncovered.len()
    }

    pub fn has_gaps(&self) -> bool {
        !self.uncovered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScheduleRecord;

    fn namespaces(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn schedules(scopes: &[(&str, &[&str])]) -> ScheduleSnapshot {
        scopes
            .iter()
            .map(|(name, included)| {
                (
                    name.to_string(),
                    ScheduleRecord {
                        included_namespaces: namespaces(included),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_uncovered_namespaces_sorted() {
        let report = NamespaceCoverageReport::compute(
            &namespaces(&["zeta", "ns1", "alpha", "ns2"]),
            &schedules(&[("s1", &["ns1"]), ("s2", &["ns2", "missing"])]),
        );

        assert_eq!(report.uncovered, namespaces(&["alpha", "zeta"]));
        assert_eq!(report.uncovered_count(), 2);
        assert_eq!(report.total, 4);
        assert!(report.has_gaps());
    }

    #[test]
    fn test_full_coverage() {
        let report = NamespaceCoverageReport::compute(
            &namespaces(&["ns1", "ns2"]),
            &schedules(&[("s1", &["ns1", "ns2"])]),
        );
        assert!(!report.has_gaps());
        assert_eq!(report.total, 2);
    }

    #[test]
    fn test_no_schedules_leaves_everything_uncovered() {
        let report =
            NamespaceCoverageReport::compute(&namespaces(&["b", "a"]), &ScheduleSnapshot::new());
        assert_eq!(report.uncovered, namespaces(&["a", "b"]));
    }
}
