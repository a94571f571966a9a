//! Rule and rule set types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::Display;

use sievefile_core::{Resolved, Selection, Tree};

/// Whether a rule adds or removes paths from the backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Polarity {
    /// `+`: back the path up.
    Include,
    /// `-`: leave the path out.
    Exclude,
}

impl Polarity {
    /// Filter-list prefix character.
    pub fn sign(self) -> char {
        match self {
            Polarity::Include => '+',
            Polarity::Exclude => '-',
        }
    }

    /// Selection a matching path gets.
    pub fn as_selection(self) -> Selection {
        match self {
            Polarity::Include => Selection::Included,
            Polarity::Exclude => Selection::Excluded,
        }
    }
}

impl From<Selection> for Polarity {
    fn from(selection: Selection) -> Self {
        match selection {
            Selection::Included => Polarity::Include,
            Selection::Excluded => Polarity::Exclude,
        }
    }
}

/// One include or exclude rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Include or exclude.
    pub polarity: Polarity,
    /// Absolute path the rule applies to, along with everything below it.
    pub path: PathBuf,
    /// Whether the path is a directory.
    pub dir: bool,
}

impl Rule {
    /// Create an include rule.
    pub fn include(path: impl Into<PathBuf>, dir: bool) -> Self {
        Self {
            polarity: Polarity::Include,
            path: path.into(),
            dir,
        }
    }

    /// Create an exclude rule.
    pub fn exclude(path: impl Into<PathBuf>, dir: bool) -> Self {
        Self {
            polarity: Polarity::Exclude,
            path: path.into(),
            dir,
        }
    }

    /// Whether the rule covers `path` (the path itself or anything below).
    pub fn matches(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }

    /// Number of path components, used to rank specificity.
    pub fn specificity(&self) -> usize {
        self.path.components().count()
    }
}

/// Ordered rules for one tree.
///
/// Rules are read with most-specific-path-wins semantics; a path matched by
/// no rule is excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Root the rule paths are relative to.
    pub root: PathBuf,
    /// Rules in emission order: every rule follows the rules of its ancestors.
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            rules: Vec::new(),
        }
    }

    /// Append a rule.
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate over the rules in emission order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// The most specific rule covering `path`. On equal specificity the
    /// later rule wins.
    pub fn matching_rule(&self, path: &Path) -> Option<&Rule> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| rule.specificity())
    }

    /// The selection the rules give to `path`.
    pub fn evaluate(&self, path: impl AsRef<Path>) -> Selection {
        let path = path.as_ref();
        let path = if path.is_relative() {
            self.root.join(path)
        } else {
            path.to_path_buf()
        };
        self.matching_rule(&path)
            .map_or(Selection::Excluded, |rule| rule.polarity.as_selection())
    }

    /// Resolve every node of `tree` from the rules alone, indexed by node id.
    ///
    /// Leaves take the evaluated selection; directories combine their
    /// children like the selection engine does.
    pub fn resolve(&self, tree: &Tree) -> Vec<Resolved> {
        let mut states = vec![Resolved::Excluded; tree.len()];
        // Arena order puts parents before children.
        for node in tree.nodes().iter().rev() {
            let state = match node.children() {
                Some(children) if !children.is_empty() => {
                    Resolved::combine(children.iter().map(|c| states[c.index()]))
                        .unwrap_or(Resolved::Excluded)
                }
                _ => self.evaluate(node.path()).into(),
            };
            states[node.id().index()] = state;
        }
        states
    }

    /// Rule path relative to the root, `/`-separated and anchored with `/`.
    ///
    /// For display; non-UTF-8 names are shown lossily. Use
    /// [`rsync_filter`](crate::rsync_filter) for filter files.
    pub fn anchored(&self, rule: &Rule) -> String {
        anchored_path(&self.root, &rule.path)
    }

    /// Plain filter lines: `+ /path` or `- /path`, in emission order.
    pub fn to_lines(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|rule| format!("{} {}", rule.polarity.sign(), self.anchored(rule)))
            .collect()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

pub(crate) fn anchored_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut out = String::from("/");
    for (i, part) in relative.iter().enumerate() {
        if i > 0 {
            out.push('/');
        }
        out.push_str(&part.to_string_lossy());
    }
    out
}
