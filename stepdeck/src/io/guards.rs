//! Filesystem predicates for guarded actions.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::model::action::GuardPredicate;

/// Evaluate `predicate` against `path`.
///
/// - `exists`: `path` is an existing regular file.
/// - `missing`: nothing exists at `path`.
/// - `dir-empty`: `path` is missing, unreadable, or a directory with no entries.
/// - `dir-not-empty`: `path` is a readable directory with at least one entry.
pub fn predicate_holds(predicate: GuardPredicate, path: &Path) -> bool {
    let holds = match predicate {
        GuardPredicate::Exists => path.is_file(),
        GuardPredicate::Missing => !path.exists(),
        GuardPredicate::DirEmpty => !dir_has_entries(path),
        GuardPredicate::DirNotEmpty => dir_has_entries(path),
    };
    debug!(predicate = predicate.as_str(), path = %path.display(), holds, "guard evaluated");
    holds
}

fn dir_has_entries(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exists_and_missing_are_complementary_for_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join(".env");
        assert!(!predicate_holds(GuardPredicate::Exists, &file));
        assert!(predicate_holds(GuardPredicate::Missing, &file));

        fs::write(&file, "APP_ENV=dev\n").expect("write");
        assert!(predicate_holds(GuardPredicate::Exists, &file));
        assert!(!predicate_holds(GuardPredicate::Missing, &file));
    }

    #[test]
    fn exists_is_false_for_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(!predicate_holds(GuardPredicate::Exists, temp.path()));
        assert!(!predicate_holds(GuardPredicate::Missing, temp.path()));
    }

    #[test]
    fn missing_directory_counts_as_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vendor = temp.path().join("vendor");
        assert!(predicate_holds(GuardPredicate::DirEmpty, &vendor));
        assert!(!predicate_holds(GuardPredicate::DirNotEmpty, &vendor));
    }

    #[test]
    fn directory_with_entry_is_not_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vendor = temp.path().join("vendor");
        fs::create_dir(&vendor).expect("mkdir");
        assert!(predicate_holds(GuardPredicate::DirEmpty, &vendor));

        fs::write(vendor.join("autoload.php"), "<?php\n").expect("write");
        assert!(!predicate_holds(GuardPredicate::DirEmpty, &vendor));
        assert!(predicate_holds(GuardPredicate::DirNotEmpty, &vendor));
    }
}
