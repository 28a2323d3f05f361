use serde::Serialize;
use std::collections::BTreeMap;

use crate::rule::Rule;
use crate::ruleset::{Chain, SetDefinition, Table, TableKey};

/// A line or object the parser skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    /// Source line for text input, rule ordinal for JSON input
    pub line: usize,
    pub message: String,
}

/// Everything one parse produced: the table hierarchy plus skipped input.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseResult {
    pub tables: BTreeMap<TableKey, Table>,
    pub warnings: Vec<ParseWarning>,
}

/// Counts over a parse result, keyed by display names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseSummary {
    pub total_tables: usize,
    pub total_chains: usize,
    pub total_sets: usize,
    pub total_rules: usize,
    pub rules_by_action: BTreeMap<String, usize>,
    pub rules_by_protocol: BTreeMap<String, usize>,
    pub rules_by_table: BTreeMap<String, usize>,
}

impl ParseResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table, merging into an existing one with the same key.
    pub fn add_table(&mut self, table: Table) {
        let key = table.key();
        match self.tables.get_mut(&key) {
            Some(existing) => existing.merge(table),
            None => {
                self.tables.insert(key, table);
            }
        }
    }

    pub fn table(&self, key: &TableKey) -> Option<&Table> {
        self.tables.get(key)
    }

    pub fn table_mut(&mut self, key: &TableKey) -> Option<&mut Table> {
        self.tables.get_mut(key)
    }

    pub fn warn(&mut self, line: usize, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("Skipped input at {}: {}", line, message);
        self.warnings.push(ParseWarning { line, message });
    }

    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.tables.values().flat_map(|t| t.chains.values())
    }

    /// Flat rule list in source order
    pub fn get_all_rules(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self
            .chains()
            .flat_map(|c| c.rules().iter().cloned())
            .collect();
        rules.sort_by_key(Rule::line_number);
        rules
    }

    pub fn get_all_sets(&self) -> Vec<&SetDefinition> {
        self.tables.values().flat_map(|t| t.sets.values()).collect()
    }

    pub fn rule_count(&self) -> usize {
        self.tables.values().map(Table::rule_count).sum()
    }

    /// Nothing usable was found
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() || (self.rule_count() == 0 && self.get_all_sets().is_empty())
    }

    pub fn summary(&self) -> ParseSummary {
        let mut summary = ParseSummary {
            total_tables: self.tables.len(),
            total_chains: self.tables.values().map(Table::chain_count).sum(),
            total_sets: self.tables.values().map(Table::set_count).sum(),
            total_rules: self.rule_count(),
            ..Default::default()
        };

        for (key, table) in &self.tables {
            summary
                .rules_by_table
                .insert(key.to_string(), table.rule_count());
        }

        for rule in self.chains().flat_map(|c| c.rules()) {
            *summary
                .rules_by_action
                .entry(rule.action().to_string())
                .or_insert(0) += 1;

            let protocol = rule
                .protocol()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "any".to_string());
            *summary.rules_by_protocol.entry(protocol).or_insert(0) += 1;
        }

        summary
    }
}
