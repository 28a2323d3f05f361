use nfa_core::matcher::matches_all;
use nfa_core::{Action, EvaluationResult, ParseResult, Policy, Query, RedundantPair, Rule, Verdict};
use std::collections::HashMap;

use crate::redundancy;

/// Simulates first-match-wins scanning of a ruleset.
pub struct RuleEvaluator {
    rules: Vec<Rule>,
    /// Base chain policies by hook name
    policies: HashMap<String, Policy>,
}

fn describe(value: Option<&str>) -> &str {
    value.unwrap_or("any")
}

impl RuleEvaluator {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            policies: HashMap::new(),
        }
    }

    /// Evaluator over every rule in `result`, aware of base chain policies.
    /// When several base chains share a hook, `drop` wins.
    pub fn from_parse_result(result: &ParseResult) -> Self {
        let mut policies = HashMap::new();
        for chain in result.chains().filter(|c| c.is_base_chain()) {
            if let Some(hook) = &chain.hook {
                let entry = policies.entry(hook.to_ascii_lowercase()).or_insert(chain.policy);
                if chain.policy == Policy::Drop {
                    *entry = Policy::Drop;
                }
            }
        }

        Self {
            rules: result.get_all_rules(),
            policies,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn evaluate(&self, query: &Query) -> EvaluationResult {
        let chain = query.direction().chain_name();
        let mut result = EvaluationResult::new(chain);
        result.default_policy = self.policies.get(chain).copied();

        result.push_trace(format!("Evaluating query: {}", query));
        result.push_trace(format!("Total rules to check: {}", self.rules.len()));

        let relevant: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| r.chain().eq_ignore_ascii_case(chain))
            .collect();
        result.push_trace(format!(
            "Relevant rules for chain '{}': {}",
            chain,
            relevant.len()
        ));

        for rule in relevant {
            if !matches_all(rule, query) {
                continue;
            }

            tracing::debug!(line = rule.line_number(), action = %rule.action(), "rule matched");
            result.push_trace(format!(
                "Rule {} matches: {} (src={}, dst={}, sport={}, dport={})",
                rule.line_number(),
                rule.action(),
                describe(rule.source()),
                describe(rule.destination()),
                describe(rule.sport()),
                describe(rule.dport()),
            ));
            result.matched_rules.push(rule.clone());

            if !rule.action().continues_scan() {
                break;
            }
        }

        if result.matched_rules.len() > 1 {
            Self::detect_conflicts(&mut result);
        }

        Self::assign_verdict(&mut result);
        tracing::debug!(verdict = %result.verdict, "evaluation finished");
        result
    }

    /// Adjacent matched rules with different actions conflict.
    fn detect_conflicts(result: &mut EvaluationResult) {
        let pairs: Vec<(Rule, Rule)> = result
            .matched_rules
            .windows(2)
            .filter(|w| w[0].action() != w[1].action())
            .map(|w| (w[0].clone(), w[1].clone()))
            .collect();

        for (first, second) in pairs {
            let reason = format!(
                "Rule {} ({}) conflicts with rule {} ({})",
                first.line_number(),
                first.action(),
                second.line_number(),
                second.action()
            );
            result.push_trace(reason.clone());
            result.add_conflict(&first, &second, reason);
        }
    }

    fn assign_verdict(result: &mut EvaluationResult) {
        match result.matched_rules.last() {
            None => {
                result.verdict = Verdict::NoMatch;
                result.explanation = format!("No rules matched for chain '{}'", result.chain);
                let note = match result.default_policy {
                    Some(policy) => format!("Default policy would apply: {}", policy),
                    None => "Default policy would apply (usually ACCEPT)".to_string(),
                };
                result.push_trace(note);
            }
            Some(last) => {
                let line = last.line_number();
                let (verdict, explanation) = match last.action() {
                    Action::Accept => (Verdict::Allow, format!("Traffic allowed by rule {}", line)),
                    Action::Drop | Action::Reject => {
                        (Verdict::Block, format!("Traffic blocked by rule {}", line))
                    }
                    Action::Jump | Action::Return => {
                        (Verdict::NoMatch, "Matched jump/return rules only".to_string())
                    }
                    Action::Counter | Action::Log => {
                        (Verdict::NoMatch, "Matched non-terminal rules only".to_string())
                    }
                };
                result.verdict = verdict;
                result.explanation = explanation;
            }
        }

        if let Some(conflict) = result.conflicts.last() {
            result.verdict = Verdict::Conflict;
            result.explanation = format!(
                "Conflicting actions: {} vs {}",
                conflict.rule1.action(),
                conflict.rule2.action()
            );
        }
    }

    pub fn find_redundant_rules(&self) -> Vec<RedundantPair> {
        redundancy::find_redundant_rules(&self.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfa_core::{Protocol, QueryParams};

    fn query(params: QueryParams) -> Query {
        Query::try_from(params).unwrap()
    }

    fn ssh_query() -> Query {
        query(QueryParams {
            dst_port: Some(22),
            protocol: Some("tcp".into()),
            ..Default::default()
        })
    }

    fn tcp_rule(action: Action, line: usize, dport: &str) -> Rule {
        Rule::builder(action, "input", line)
            .protocol(Protocol::Tcp)
            .dport(dport)
            .build()
            .unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let evaluator = RuleEvaluator::new(vec![
            tcp_rule(Action::Accept, 1, "22"),
            tcp_rule(Action::Drop, 2, "22"),
        ]);
        let result = evaluator.evaluate(&ssh_query());

        assert_eq!(result.verdict, Verdict::Allow);
        assert_eq!(result.matched_lines(), vec![1]);
        assert_eq!(result.explanation, "Traffic allowed by rule 1");
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_block() {
        let evaluator = RuleEvaluator::new(vec![
            tcp_rule(Action::Accept, 1, "80"),
            tcp_rule(Action::Reject, 2, "22"),
        ]);
        let result = evaluator.evaluate(&ssh_query());
        assert_eq!(result.verdict, Verdict::Block);
        assert_eq!(result.explanation, "Traffic blocked by rule 2");
    }

    #[test]
    fn test_trace_order() {
        let evaluator = RuleEvaluator::new(vec![tcp_rule(Action::Accept, 4, "22")]);
        let result = evaluator.evaluate(&ssh_query());
        assert_eq!(
            result.trace(),
            [
                "Evaluating query: proto=tcp (in)",
                "Total rules to check: 1",
                "Relevant rules for chain 'input': 1",
                "Rule 4 matches: accept (src=any, dst=any, sport=any, dport=22)",
            ]
        );
    }

    #[test]
    fn test_no_match_notes_default_policy() {
        let evaluator = RuleEvaluator::new(vec![tcp_rule(Action::Accept, 1, "80")]);
        let result = evaluator.evaluate(&ssh_query());
        assert_eq!(result.verdict, Verdict::NoMatch);
        assert!(result.matched_rules.is_empty());
        assert_eq!(result.explanation, "No rules matched for chain 'input'");
        assert_eq!(
            result.trace().last().map(String::as_str),
            Some("Default policy would apply (usually ACCEPT)")
        );
    }

    #[test]
    fn test_direction_selects_chain() {
        let evaluator = RuleEvaluator::new(vec![
            tcp_rule(Action::Accept, 1, "22"),
            Rule::builder(Action::Drop, "OUTPUT", 2).build().unwrap(),
        ]);
        let out = query(QueryParams {
            dst_port: Some(22),
            protocol: Some("tcp".into()),
            direction: Some("out".into()),
            ..Default::default()
        });
        let result = evaluator.evaluate(&out);
        assert_eq!(result.chain, "output");
        assert_eq!(result.verdict, Verdict::Block);
        assert_eq!(result.matched_lines(), vec![2]);
    }

    #[test]
    fn test_jump_continues_and_conflicts() {
        let evaluator = RuleEvaluator::new(vec![
            Rule::builder(Action::Jump, "input", 1).jump_target("audit").build().unwrap(),
            tcp_rule(Action::Accept, 2, "22"),
            tcp_rule(Action::Drop, 3, "22"),
        ]);
        let result = evaluator.evaluate(&ssh_query());

        assert_eq!(result.matched_lines(), vec![1, 2]);
        assert_eq!(result.verdict, Verdict::Conflict);
        assert_eq!(result.explanation, "Conflicting actions: jump vs accept");
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].reason, "Rule 1 (jump) conflicts with rule 2 (accept)");
    }

    #[test]
    fn test_only_jump_and_return() {
        let evaluator = RuleEvaluator::new(vec![
            Rule::builder(Action::Jump, "input", 1).build().unwrap(),
            Rule::builder(Action::Jump, "input", 2).build().unwrap(),
        ]);
        let result = evaluator.evaluate(&ssh_query());
        assert_eq!(result.verdict, Verdict::NoMatch);
        assert_eq!(result.explanation, "Matched jump/return rules only");
        assert!(result.conflicts.is_empty());

        let evaluator = RuleEvaluator::new(vec![
            Rule::builder(Action::Jump, "input", 1).build().unwrap(),
            Rule::builder(Action::Return, "input", 2).build().unwrap(),
        ]);
        let result = evaluator.evaluate(&ssh_query());
        assert_eq!(result.verdict, Verdict::Conflict);
        assert_eq!(result.explanation, "Conflicting actions: jump vs return");
    }

    #[test]
    fn test_counter_stops_scan() {
        let evaluator = RuleEvaluator::new(vec![
            tcp_rule(Action::Counter, 1, "22"),
            tcp_rule(Action::Drop, 2, "22"),
        ]);
        let result = evaluator.evaluate(&ssh_query());
        assert_eq!(result.verdict, Verdict::NoMatch);
        assert_eq!(result.matched_lines(), vec![1]);
        assert_eq!(result.explanation, "Matched non-terminal rules only");
    }

    #[test]
    fn test_set_references_never_match() {
        let evaluator = RuleEvaluator::new(vec![
            Rule::builder(Action::Drop, "input", 1)
                .source("@blocklist")
                .set_reference("blocklist")
                .build()
                .unwrap(),
        ]);
        let result = evaluator.evaluate(&query(QueryParams {
            src_ip: Some("10.0.0.1".into()),
            ..Default::default()
        }));
        assert_eq!(result.verdict, Verdict::NoMatch);
    }

    #[test]
    fn test_empty_ruleset() {
        let result = RuleEvaluator::new(vec![]).evaluate(&ssh_query());
        assert_eq!(result.verdict, Verdict::NoMatch);
        assert_eq!(result.trace()[1], "Total rules to check: 0");
    }
}
