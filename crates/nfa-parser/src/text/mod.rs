// Front end for `nft list ruleset` style text.

mod rule_line;
mod scanner;
mod scope;

pub use rule_line::{RuleContext, parse_rule_line};
pub use scanner::{Event, scan};

use nfa_core::{Chain, ParseResult, Policy, SetDefinition, Table, TableKey};
use regex::Regex;
use scope::{Frame, Scope, ScopeStack};
use std::sync::LazyLock;

static CHAIN_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^type\s+(\S+)\s+hook\s+(\S+)(?:\s+device\s+\S+)?\s+priority\s+([^;\s]+(?:\s*[+-]\s*\d+)?)\s*$",
    )
    .unwrap()
});

static SET_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"|([^,\s{}]+)"#).unwrap());

/// Stateful walk over scanner events that builds the table hierarchy.
pub struct TextParser {
    result: ParseResult,
    stack: ScopeStack,
    last_rule_line: usize,
}

impl TextParser {
    pub fn new() -> Self {
        Self {
            result: ParseResult::new(),
            stack: ScopeStack::new(),
            last_rule_line: 0,
        }
    }

    pub fn parse(mut self, content: &str) -> ParseResult {
        for event in scan(content) {
            match event {
                Event::Open { header, line } => self.open_block(&header, line, true),
                Event::Statement { text, line } => self.statement(&text, line),
                Event::Close { line } => self.close_block(line),
                Event::Unbalanced { text, line } => {
                    self.result.warn(line, format!("Unbalanced brace, statement skipped: {}", text))
                }
            }
        }

        let open = self.stack.pop_all();
        if open.iter().any(|f| f.braced) {
            tracing::warn!("Input ended with {} unclosed block(s)", open.len());
        }
        self.finish(open);

        tracing::info!(
            "Parsed {} table(s), {} rule(s), {} warning(s)",
            self.result.tables.len(),
            self.result.rule_count(),
            self.result.warnings.len()
        );
        self.result
    }

    fn finish(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            tracing::debug!("Leaving {:?}", frame.scope);
            if let Scope::Set { table, set } = frame.scope {
                if let Some(table) = self.result.table_mut(&table) {
                    if table.insert_set(set) {
                        tracing::warn!("Set redeclared in table {}, keeping the later one", table.name);
                    }
                }
            }
        }
    }

    fn open_block(&mut self, header: &str, line: usize, braced: bool) {
        let words: Vec<&str> = header.split_whitespace().collect();
        let keyword = words.first().copied().unwrap_or_default();

        match keyword {
            "table" => {
                let open = self.stack.pop_all();
                self.finish(open);

                let key = match words.as_slice() {
                    [_, family, name, ..] => TableKey::new(*family, *name),
                    [_, name] => TableKey::new("ip", *name),
                    _ => {
                        self.result.warn(line, format!("Malformed table header: {}", header));
                        self.ignore(keyword, braced);
                        return;
                    }
                };
                self.result.add_table(Table::new(&key, line));
                self.stack.push(Scope::Table(key), braced);
            }
            "chain" | "set" => {
                let open = self.stack.pop_to_level(2);
                self.finish(open);

                let (Some(key), Some(name)) = (self.stack.current_table().cloned(), words.get(1)) else {
                    self.result
                        .warn(line, format!("{} declared outside a table", header));
                    self.ignore(keyword, braced);
                    return;
                };

                if keyword == "chain" {
                    let chain = Chain::new(&key, *name, line);
                    if let Some(table) = self.result.table_mut(&key) {
                        if table.insert_chain(chain) {
                            tracing::warn!(
                                "Chain {} redeclared in table {}, keeping the later one",
                                name,
                                key
                            );
                        }
                    }
                    self.stack.push(
                        Scope::Chain {
                            table: key,
                            name: name.to_string(),
                        },
                        braced,
                    );
                } else {
                    let set = SetDefinition::new(&key, *name, line);
                    self.stack.push(Scope::Set { table: key, set }, braced);
                }
            }
            _ => self.ignore(keyword, braced),
        }
    }

    fn ignore(&mut self, kind: &str, braced: bool) {
        let level = self.stack.depth() + 1;
        self.stack.push(
            Scope::Ignored {
                kind: kind.to_string(),
                level,
            },
            braced,
        );
    }

    fn close_block(&mut self, line: usize) {
        let popped = self.stack.pop_braced();
        if popped.is_empty() {
            self.result.warn(line, "Unbalanced closing brace");
            return;
        }
        self.finish(popped);
    }

    fn statement(&mut self, text: &str, line: usize) {
        let keyword = text.split_whitespace().next().unwrap_or_default();

        // Brace-less headers open implicit blocks
        let at_table_level = matches!(self.stack.top(), None | Some(Scope::Table(_)));
        let implicit_header = match keyword {
            "table" => true,
            "chain" => self.stack.current_table().is_some(),
            "set" | "map" | "flowtable" => at_table_level,
            _ => false,
        };
        if implicit_header && scanner::is_block_header(text) {
            self.open_block(text, line, false);
            return;
        }

        match self.stack.top_mut() {
            Some(Scope::Set { set, .. }) => set_statement(set, text),
            Some(Scope::Chain { table, name }) => {
                let (table, name) = (table.clone(), name.clone());
                self.chain_statement(&table, &name, text, line);
            }
            Some(Scope::Ignored { kind, .. }) => {
                tracing::debug!("Skipping line {} inside {} block", line, kind)
            }
            _ => tracing::debug!("Ignoring line {}: {}", line, text),
        }
    }

    fn chain_statement(&mut self, key: &TableKey, chain_name: &str, text: &str, line: usize) {
        if text.starts_with("type ") {
            if let Some(caps) = CHAIN_TYPE.captures(text) {
                if let Some(chain) = self.chain_mut(key, chain_name) {
                    chain.chain_type = Some(caps[1].to_string());
                    chain.hook = Some(caps[2].to_string());
                    chain.priority = Some(caps[3].trim().to_string());
                }
            } else {
                self.result.warn(line, format!("Unrecognized chain type line: {}", text));
            }
            return;
        }

        if let Some(value) = text.strip_prefix("policy ") {
            match value.parse::<Policy>() {
                Ok(policy) => {
                    if let Some(chain) = self.chain_mut(key, chain_name) {
                        chain.policy = policy;
                    }
                }
                Err(e) => self.result.warn(line, e.to_string()),
            }
            return;
        }

        if text.starts_with("comment ") {
            return;
        }

        let ctx = RuleContext {
            table: key,
            chain: chain_name,
        };
        let line_number = line.max(self.last_rule_line + 1);
        match parse_rule_line(text, &ctx, line_number) {
            Ok(Some(rule)) => {
                self.last_rule_line = line_number;
                if let Some(chain) = self.chain_mut(key, chain_name) {
                    chain.push_rule(rule);
                }
            }
            Ok(None) => tracing::debug!("Line {} is not a rule: {}", line, text),
            Err(e) => self.result.warn(line, e.to_string()),
        }
    }

    fn chain_mut(&mut self, key: &TableKey, name: &str) -> Option<&mut Chain> {
        self.result
            .table_mut(key)
            .and_then(|t| t.chains.get_mut(name))
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new()
    }
}

fn set_statement(set: &mut SetDefinition, text: &str) {
    let (keyword, rest) = text
        .split_once(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or((text, ""));

    match keyword {
        "type" | "typeof" => set.set_type = rest.trim().to_string(),
        "flags" => {
            set.flags = rest
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
        }
        "elements" => {
            let body = rest.trim_start().trim_start_matches('=');
            for caps in SET_ELEMENT.captures_iter(body) {
                if let Some(element) = caps.get(1).or_else(|| caps.get(2)) {
                    set.elements.push(element.as_str().trim().to_string());
                }
            }
        }
        _ => tracing::debug!("Ignoring set statement: {}", text),
    }
}

/// Parse text input. Never fails: problems become warnings on the result.
pub fn parse_text(content: &str) -> ParseResult {
    TextParser::new().parse(content)
}
