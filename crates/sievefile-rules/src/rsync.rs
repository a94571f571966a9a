//! Rendering of a [`RuleSet`] as an rsync filter list.
//!
//! rsync applies the first matching filter and does not descend into an
//! excluded directory, so the list is emitted deepest rules first, every
//! included path gets `+ /dir/` lines for its ancestors, and a final `- *`
//! excludes everything the rules do not mention.
//!
//! Names are written with `*`, `?`, `[` and `\` backslash-escaped so they
//! only ever match themselves.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::rule::{Polarity, RuleSet};

/// Errors rendering a rule set for rsync.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RsyncError {
    /// A rule path has a component that is not valid UTF-8 and cannot be
    /// written to a filter file without changing it.
    #[error("Path is not valid UTF-8: {}", path.display())]
    NonUtf8Path { path: PathBuf },
}

/// Render `rules` for `rsync --filter='merge FILE'` or `--include-from`.
pub fn rsync_filter(rules: &RuleSet) -> Result<Vec<String>, RsyncError> {
    let mut ordered: Vec<_> = rules.iter().collect();
    ordered.sort_by_key(|rule| std::cmp::Reverse(rule.specificity()));

    let mut lines = Vec::new();
    let mut opened = HashSet::new();

    for rule in ordered {
        let parts = escaped_components(&rules.root, &rule.path)?;
        if parts.is_empty() {
            if rule.polarity == Polarity::Include {
                lines.push("+ *".to_string());
            }
            continue;
        }

        if rule.polarity == Polarity::Include {
            let mut prefix = String::new();
            for part in &parts[..parts.len() - 1] {
                prefix.push('/');
                prefix.push_str(part);
                if opened.insert(prefix.clone()) {
                    lines.push(format!("+ {prefix}/"));
                }
            }
        }

        let anchored = format!("/{}", parts.join("/"));
        let pattern = if rule.dir {
            format!("{anchored}/***")
        } else {
            anchored
        };
        lines.push(format!("{} {pattern}", rule.polarity.sign()));
    }

    lines.push("- *".to_string());
    Ok(lines)
}

/// Components of `path` below `root`, each escaped for an rsync pattern.
fn escaped_components(root: &Path, path: &Path) -> Result<Vec<String>, RsyncError> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .iter()
        .map(|part| {
            part.to_str()
                .map(escape_component)
                .ok_or_else(|| RsyncError::NonUtf8Path {
                    path: path.to_path_buf(),
                })
        })
        .collect()
}

fn escape_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if matches!(c, '*' | '?' | '[' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
