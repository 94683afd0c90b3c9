//! Source/destination classification.
//!
//! Classifies two scans into New, Changed and Removed sets keyed by relative
//! path. A path present on both sides with the same size is unchanged: file
//! size is the only change signal, so a same-size content edit goes
//! undetected. Content is never hashed here.

use crate::model::{DiffResult, FileRecord};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Classify `source` against `dest`.
///
/// `new` and `changed` keep the order of `source`; `removed` keeps the order
/// of `dest`. Runs in linear time.
pub fn diff(source: &[FileRecord], dest: &[FileRecord]) -> DiffResult {
    let dest_sizes: HashMap<&Path, u64> = dest
        .iter()
        .map(|r| (r.relative_path.as_path(), r.size))
        .collect();
    let source_paths: HashSet<&Path> = source.iter().map(|r| r.relative_path.as_path()).collect();

    let mut result = DiffResult::default();

    for record in source {
        match dest_sizes.get(record.relative_path.as_path()) {
            None => result.new.push(record.clone()),
            Some(&size) if size != record.size => result.changed.push(record.clone()),
            Some(_) => {}
        }
    }

    result.removed = dest
        .iter()
        .filter(|r| !source_paths.contains(r.relative_path.as_path()))
        .cloned()
        .collect();

    tracing::info!(
        new = result.new.len(),
        changed = result.changed.len(),
        removed = result.removed.len(),
        "classified source against destination"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn records(items: &[(&str, u64)]) -> Vec<FileRecord> {
        items.iter().map(|(p, s)| FileRecord::new(*p, *s)).collect()
    }

    fn paths(records: &[FileRecord]) -> HashSet<PathBuf> {
        records.iter().map(|r| r.relative_path.clone()).collect()
    }

    #[test]
    fn test_identical_trees_have_no_changes() {
        let tree = records(&[("a.wav", 10), ("dir/b.xlsx", 3), ("c", 0)]);
        let result = diff(&tree, &tree);
        assert!(result.is_empty());
    }

    #[test]
    fn test_classification() {
        let source = records(&[("new.wav", 1), ("same.wav", 5), ("grown.wav", 7)]);
        let dest = records(&[("same.wav", 5), ("grown.wav", 6), ("old.wav", 200)]);

        let result = diff(&source, &dest);
        assert_eq!(result.new, records(&[("new.wav", 1)]));
        assert_eq!(result.changed, records(&[("grown.wav", 7)]));
        assert_eq!(result.removed, records(&[("old.wav", 200)]));
    }

    #[test]
    fn test_sets_are_mutually_exclusive() {
        let source = records(&[("a", 1), ("b", 2), ("c", 3), ("d", 4)]);
        let dest = records(&[("b", 2), ("c", 30), ("e", 5), ("f", 6)]);

        let result = diff(&source, &dest);
        let new = paths(&result.new);
        let changed = paths(&result.changed);
        let removed = paths(&result.removed);
        assert!(new.is_disjoint(&changed));
        assert!(new.is_disjoint(&removed));
        assert!(changed.is_disjoint(&removed));
        assert_eq!(result.len(), 5);
    }

    #[test]
    fn test_same_size_edit_is_unchanged() {
        // Size is the only heuristic; equal sizes are treated as unchanged
        let source = records(&[("a.wav", 100)]);
        let dest = records(&[("a.wav", 100)]);
        assert!(diff(&source, &dest).is_empty());
    }

    #[test]
    fn test_empty_destination_marks_everything_new() {
        let source = records(&[("song.wav", 5000), ("notes.xlsx", 12)]);
        let result = diff(&source, &[]);
        assert_eq!(result.new, source);
        assert!(result.changed.is_empty());
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_empty_source_marks_everything_removed() {
        let dest = records(&[("old.wav", 200)]);
        let result = diff(&[], &dest);
        assert_eq!(result.removed, dest);
        assert!(result.new.is_empty());
    }
}
