//! Configuration merge engine
//!
//! Walks a document's dropins and includes in a defined order — default
//! dropins, then the document's own children with includes expanded, then
//! override dropins — merging elements by identity according to a
//! per-include conflict policy.

mod engine;
mod flatten;
mod vars;

pub use engine::{MergeEngine, merge_element};
pub use flatten::flatten;
pub use vars::collect_variables;

/// Conflict policy of an `<include>`. Nested includes inherit the policy of
/// their parent include unless they specify their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnConflict {
    #[default]
    Merge,
    Replace,
    Ignore,
}

impl OnConflict {
    /// Unrecognized policy strings fall back to merge
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("replace") {
            OnConflict::Replace
        } else if s.eq_ignore_ascii_case("ignore") {
            OnConflict::Ignore
        } else {
            OnConflict::Merge
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OnConflict::Merge => "MERGE",
            OnConflict::Replace => "REPLACE",
            OnConflict::Ignore => "IGNORE",
        }
    }
}
