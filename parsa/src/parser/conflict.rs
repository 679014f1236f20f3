//! Conflict reporting for the table builders. Conflicts never carry enough
//! blame to abort an LL(1) compilation (the table keeps a deterministic
//! default); the SLR(1) builder aborts only on the fatal combinations it
//! flags itself. The report is advisory: it maps each table cell to the
//! rules that fought over it and the resolution that won.

use crate::grammar::{Grammar, ParserGrammar};
use std::collections::HashMap;

/// The rules competing for one table cell. `row` is the non-terminal id for
/// LL(1) tables and the state id for SLR(1) tables; `col` is the terminal
/// id (or the end-marker column). A `None` entry in `rules` is the shift
/// sentinel: the cell was also claimed by a shift action, which has no rule
/// of its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    row: usize,
    col: usize,
    rules: Vec<Option<usize>>,
    default_rule: Option<usize>,
}

impl Conflict {
    fn new(row: usize, col: usize) -> Self {
        Self {
            row,
            col,
            rules: Vec::new(),
            default_rule: None,
        }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    /// The conflicting rules as global rule indices; `None` stands for a
    /// shift action.
    pub fn rules(&self) -> &[Option<usize>] {
        &self.rules
    }

    /// The rule the cell defaulted to. The first rule recorded wins, which
    /// the builders use to encode their resolution policy.
    pub fn default_rule(&self) -> Option<usize> {
        self.default_rule
    }

    fn add_rule(&mut self, rule: Option<usize>) {
        if self.rules.contains(&rule) {
            return;
        }
        self.rules.push(rule);
        if self.default_rule.is_none() {
            self.default_rule = rule;
        }
    }

    fn involves_shift(&self) -> bool {
        self.rules.iter().any(|rule| rule.is_none())
    }

    fn render(&self, grammar: &Grammar, rules: &ParserGrammar, out: &mut String) {
        if !self.involves_shift() {
            for rule in self.rules.iter().flatten() {
                out.push_str(&rules.rules()[*rule].render(grammar));
                out.push('\n');
            }
            if let Some(default) = self.default_rule {
                out.push_str("defaulting to: ");
                out.push_str(&rules.rules()[default].render(grammar));
                out.push('\n');
            }
        } else if self.rules.iter().any(|rule| rule.is_some()) {
            out.push_str("shift/reduce\ndefaulting to shift\n");
        } else {
            out.push_str("shift/shift\n");
        }
    }
}

/// The outcome of a table compilation: every conflict that was detected,
/// keyed by cell, in detection order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileResult {
    conflicts: Vec<Conflict>,
    index: HashMap<(usize, usize), usize>,
}

impl CompileResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_conflict_rule(&mut self, row: usize, col: usize, rule: Option<usize>) {
        let slot = match self.index.get(&(row, col)) {
            Some(&slot) => slot,
            None => {
                self.conflicts.push(Conflict::new(row, col));
                self.index.insert((row, col), self.conflicts.len() - 1);
                self.conflicts.len() - 1
            }
        };
        self.conflicts[slot].add_rule(rule);
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Renders the whole report with rule and symbol names resolved against
    /// the grammar the table was compiled from.
    pub fn render(&self, grammar: &Grammar, rules: &ParserGrammar) -> String {
        let mut out = format!("{} conflicts\n", self.len());
        for (number, conflict) in self.conflicts.iter().enumerate() {
            out.push_str(&format!(
                "conflict {} at [{}, {}]:\n",
                number + 1,
                conflict.row(),
                conflict.col()
            ));
            conflict.render(grammar, rules, &mut out);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_recorded_rule_is_the_default() {
        let mut result = CompileResult::new();
        result.add_conflict_rule(2, 3, Some(1));
        result.add_conflict_rule(2, 3, Some(4));
        result.add_conflict_rule(2, 3, Some(1)); // duplicate, not re-added
        assert_eq!(result.len(), 1);
        let conflict = &result.conflicts()[0];
        assert_eq!(conflict.rules(), &[Some(1), Some(4)]);
        assert_eq!(conflict.default_rule(), Some(1));
    }

    #[test]
    fn cells_are_tracked_independently() {
        let mut result = CompileResult::new();
        result.add_conflict_rule(0, 0, None);
        result.add_conflict_rule(0, 0, Some(2));
        result.add_conflict_rule(1, 0, Some(3));
        assert_eq!(result.len(), 2);
        assert!(result.conflicts()[0].rules().contains(&None));
        // the shift sentinel never becomes the default rule
        assert_eq!(result.conflicts()[0].default_rule(), Some(2));
    }
}
