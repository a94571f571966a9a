//! Include/exclude rule derivation for sievefile.
//!
//! Given a tree whose selection has been edited with the
//! [`SelectionEngine`](sievefile_core::SelectionEngine), this crate derives
//! an ordered list of include/exclude rules that reproduces it under
//! most-specific-path-wins matching, with one rule per selection boundary,
//! and renders it for transfer tools.
//!
//! ```rust,ignore
//! use sievefile_core::{Selection, SelectionEngine};
//! use sievefile_rules::{derive_rules, rsync_filter};
//! use sievefile_scan::{JwalkScanner, ScanConfig};
//!
//! let tree = JwalkScanner::new().scan(&ScanConfig::new("/home/me")).unwrap();
//! let mut engine = SelectionEngine::new(tree);
//! engine.set_selection("projects", Selection::Included).unwrap();
//! engine.set_selection("projects/big/target", Selection::Excluded).unwrap();
//!
//! let rules = derive_rules(engine.tree());
//! for line in rsync_filter(&rules).unwrap() {
//!     println!("{line}");
//! }
//! ```

mod derive;
mod rsync;
mod rule;

pub use derive::{derive_rules, RuleDeriver};
pub use rsync::{rsync_filter, RsyncError};
pub use rule::{Polarity, Rule, RuleSet};

// Re-export core types
pub use sievefile_core::{Resolved, Selection, Tree};
