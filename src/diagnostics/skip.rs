//! Why the extractor passed over a walked path.

use serde::Serialize;
use std::fmt;

/// Filter decision for one path, in the order the filter checks them.
///
/// The derived ordering follows that precedence.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotAFile,
    /// `.git`, `node_modules`, `target`, IR database files
    IgnoredInternal,
    OutsideRoot,
    NotIncluded,
    ExcludedByGlob,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NotAFile => "not a regular file",
            SkipReason::IgnoredInternal => "internal ignore rule",
            SkipReason::OutsideRoot => "outside project root",
            SkipReason::NotIncluded => "no include pattern matched",
            SkipReason::ExcludedByGlob => "matched an exclude pattern",
        })
    }
}
