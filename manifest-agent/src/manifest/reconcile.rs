//! Manifest reconciliation.
//!
//! Compares the manifest captured from the source tree (`original`) with the
//! one generated from a restored copy (`candidate`), joining on path. Size and
//! content are checked independently, so one path can show up in both
//! mismatch lists.

use serde::{Deserialize, Serialize};

use super::Manifest;

/// Size differs for a path present in both manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeMismatch {
    pub path: String,
    pub original_size: u64,
    pub candidate_size: u64,
}

/// Digest differs for a path present in both manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMismatch {
    pub path: String,
    pub original_digest: String,
    pub candidate_digest: String,
}

/// Everything that differs between two manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub only_in_original: Vec<String>,
    pub only_in_candidate: Vec<String>,
    pub size_mismatches: Vec<SizeMismatch>,
    pub content_mismatches: Vec<ContentMismatch>,
}

impl DiscrepancyReport {
    /// True when all four lists are empty: the backup is consistent.
    pub fn is_consistent(&self) -> bool {
        self.only_in_original.is_empty()
            && self.only_in_candidate.is_empty()
            && self.size_mismatches.is_empty()
            && self.content_mismatches.is_empty()
    }

    /// Total number of findings across all lists.
    pub fn discrepancy_count(&self) -> usize {
        self.only_in_original.len()
            + self.only_in_candidate.len()
            + self.size_mismatches.len()
            + self.content_mismatches.len()
    }
}

/// Compute the discrepancy report between `original` and `candidate`.
///
/// Pure and linear in the size of both manifests. Findings follow the
/// discovery order of the manifest being walked.
pub fn reconcile(original: &Manifest, candidate: &Manifest) -> DiscrepancyReport {
    let mut report = DiscrepancyReport::default();

    for orig in original {
        let Some(cand) = candidate.get(&orig.path) else {
            report.only_in_original.push(orig.path.clone());
            continue;
        };

        if orig.size != cand.size {
            report.size_mismatches.push(SizeMismatch {
                path: orig.path.clone(),
                original_size: orig.size,
                candidate_size: cand.size,
            });
        }

        if orig.digest != cand.digest {
            report.content_mismatches.push(ContentMismatch {
                path: orig.path.clone(),
                original_digest: orig.digest.clone(),
                candidate_digest: cand.digest.clone(),
            });
        }
    }

    report.only_in_candidate = candidate
        .paths()
        .filter(|path| !original.contains(path))
        .map(str::to_string)
        .collect();

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::entry;
    use std::collections::HashSet;

    fn manifest(entries: &[(&str, u64, &str)]) -> Manifest {
        Manifest::from_entries(entries.iter().map(|(p, s, d)| entry(p, *s, d)))
    }

    #[test]
    fn test_identical_manifests_are_consistent() {
        let m = manifest(&[("a.txt", 10, "X"), ("dir/b.bin", 0, "Y"), ("c", 7, "Z")]);
        let report = reconcile(&m, &m);
        assert!(report.is_consistent());
        assert_eq!(report.discrepancy_count(), 0);
        assert!(reconcile(&Manifest::new(), &Manifest::new()).is_consistent());
    }

    #[test]
    fn test_missing_from_candidate() {
        let original = manifest(&[("a.txt", 10, "X")]);
        let report = reconcile(&original, &Manifest::new());

        assert_eq!(report.only_in_original, vec!["a.txt".to_string()]);
        assert!(report.only_in_candidate.is_empty());
        assert!(report.size_mismatches.is_empty());
        assert!(report.content_mismatches.is_empty());
        assert!(!report.is_consistent());
    }

    #[test]
    fn test_size_mismatch_without_content_mismatch() {
        let original = manifest(&[("a.txt", 10, "X")]);
        let candidate = manifest(&[("a.txt", 12, "X")]);
        let report = reconcile(&original, &candidate);

        assert_eq!(
            report.size_mismatches,
            vec![SizeMismatch {
                path: "a.txt".to_string(),
                original_size: 10,
                candidate_size: 12,
            }]
        );
        assert!(report.content_mismatches.is_empty());
        assert!(report.only_in_original.is_empty());
        assert!(report.only_in_candidate.is_empty());
    }

    #[test]
    fn test_size_and_content_checked_independently() {
        let original = manifest(&[("a.txt", 10, "X"), ("b.txt", 5, "P")]);
        let candidate = manifest(&[("a.txt", 11, "Y"), ("b.txt", 5, "Q")]);
        let report = reconcile(&original, &candidate);

        assert_eq!(report.size_mismatches.len(), 1);
        assert_eq!(report.size_mismatches[0].path, "a.txt");
        let content: Vec<_> = report.content_mismatches.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(content, vec!["a.txt", "b.txt"]);
        assert_eq!(report.content_mismatches[1].original_digest, "P");
        assert_eq!(report.content_mismatches[1].candidate_digest, "Q");
    }

    #[test]
    fn test_mtime_is_ignored() {
        let mut newer = entry("a.txt", 10, "X");
        newer.mtime = 1_900_000_000.0;
        let original = manifest(&[("a.txt", 10, "X")]);
        let candidate = Manifest::from_entries(vec![newer]);
        assert!(reconcile(&original, &candidate).is_consistent());
    }

    #[test]
    fn test_only_lists_partition_correctly() {
        let a = manifest(&[("shared", 1, "S"), ("gone-1", 1, "G"), ("gone-2", 2, "H")]);
        let b = manifest(&[("new-1", 3, "N"), ("shared", 1, "S")]);
        let report = reconcile(&a, &b);

        assert_eq!(report.only_in_original, vec!["gone-1", "gone-2"]);
        assert_eq!(report.only_in_candidate, vec!["new-1"]);

        for path in &report.only_in_original {
            assert!(a.contains(path) && !b.contains(path));
        }
        for path in &report.only_in_candidate {
            assert!(b.contains(path) && !a.contains(path));
        }
        let left: HashSet<_> = report.only_in_original.iter().collect();
        assert!(report.only_in_candidate.iter().all(|p| !left.contains(p)));
    }

    #[test]
    fn test_report_does_not_depend_on_order() {
        let forward = manifest(&[("a", 1, "A"), ("b", 2, "B"), ("c", 3, "C")]);
        let reversed = manifest(&[("c", 3, "C"), ("b", 2, "B"), ("a", 1, "A")]);
        assert!(reconcile(&forward, &reversed).is_consistent());
        assert!(reconcile(&reversed, &forward).is_consistent());
    }

    #[test]
    fn test_report_serializes_all_lists() {
        let report = reconcile(&manifest(&[("a.txt", 10, "X")]), &Manifest::new());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["only_in_original"], serde_json::json!(["a.txt"]));
        assert_eq!(value["only_in_candidate"], serde_json::json!([]));
        assert_eq!(value["size_mismatches"], serde_json::json!([]));
        assert_eq!(value["content_mismatches"], serde_json::json!([]));
    }
}
