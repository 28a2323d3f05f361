use serde::Serialize;
use std::fmt;

use crate::rule::Rule;
use crate::ruleset::Policy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Allow,
    Block,
    NoMatch,
    Conflict,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Allow => "ALLOW",
            Verdict::Block => "BLOCK",
            Verdict::NoMatch => "NO_MATCH",
            Verdict::Conflict => "CONFLICT",
        };
        f.write_str(name)
    }
}

/// Two consecutively matched rules that disagree on the action.
#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub rule1: Rule,
    pub rule2: Rule,
    pub reason: String,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Conflict: {} line {} vs line {} - {}",
            self.rule1.chain(),
            self.rule1.line_number(),
            self.rule2.line_number(),
            self.reason
        )
    }
}

/// Outcome of evaluating one query.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub verdict: Verdict,
    pub chain: String,
    pub matched_rules: Vec<Rule>,
    pub conflicts: Vec<Conflict>,
    pub explanation: String,
    pub default_policy: Option<Policy>,
    trace: Vec<String>,
}

impl EvaluationResult {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::NoMatch,
            chain: chain.into(),
            matched_rules: vec![],
            conflicts: vec![],
            explanation: "No matching rules found".to_string(),
            default_policy: None,
            trace: vec![],
        }
    }

    /// Trace lines are kept in the order they were added.
    pub fn push_trace(&mut self, step: impl Into<String>) {
        self.trace.push(step.into());
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn add_conflict(&mut self, rule1: &Rule, rule2: &Rule, reason: impl Into<String>) {
        self.conflicts.push(Conflict {
            rule1: rule1.clone(),
            rule2: rule2.clone(),
            reason: reason.into(),
        });
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn matched_lines(&self) -> Vec<usize> {
        self.matched_rules.iter().map(Rule::line_number).collect()
    }
}

/// An earlier rule that makes a later one unreachable.
#[derive(Debug, Clone, Serialize)]
pub struct RedundantPair {
    pub general: Rule,
    pub specific: Rule,
    pub reason: String,
}

impl RedundantPair {
    pub fn new(general: &Rule, specific: &Rule) -> Self {
        Self {
            reason: format!(
                "Rule {} shadows rule {}",
                general.line_number(),
                specific.line_number()
            ),
            general: general.clone(),
            specific: specific.clone(),
        }
    }

    pub fn lines(&self) -> (usize, usize) {
        (self.general.line_number(), self.specific.line_number())
    }
}

impl fmt::Display for RedundantPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in chain {}", self.reason, self.general.chain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Action;

    fn rule(action: Action, line: usize) -> Rule {
        Rule::builder(action, "input", line).build().unwrap()
    }

    #[test]
    fn test_trace_is_append_only() {
        let mut result = EvaluationResult::new("input");
        result.push_trace("first");
        result.push_trace("second");
        result.push_trace("first");
        assert_eq!(result.trace(), ["first", "second", "first"]);
    }

    #[test]
    fn test_conflict_display() {
        let mut result = EvaluationResult::new("input");
        result.add_conflict(&rule(Action::Jump, 4), &rule(Action::Drop, 6), "differ");
        assert!(result.has_conflicts());
        assert_eq!(
            result.conflicts[0].to_string(),
            "Conflict: input line 4 vs line 6 - differ"
        );
    }

    #[test]
    fn test_verdict_wire_names() {
        assert_eq!(serde_json::to_string(&Verdict::NoMatch).unwrap(), "\"NO_MATCH\"");
        assert_eq!(Verdict::Conflict.to_string(), "CONFLICT");
    }

    #[test]
    fn test_redundant_pair_reason() {
        let pair = RedundantPair::new(&rule(Action::Accept, 1), &rule(Action::Accept, 2));
        assert_eq!(pair.lines(), (1, 2));
        assert_eq!(pair.reason, "Rule 1 shadows rule 2");
    }
}
