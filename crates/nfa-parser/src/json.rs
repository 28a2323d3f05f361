// Front end for `nft -j list ruleset` output.

use nfa_core::{
    Action, Chain, Error, ParseResult, Policy, Protocol, Result, Rule, SetDefinition, Table,
    TableKey,
};
use serde_json::Value;

const DEFAULT_FAMILY: &str = "inet";
const DEFAULT_TABLE: &str = "filter";
const DEFAULT_CHAIN: &str = "input";

/// Verdict keys, any of which may appear as an `expr` entry
const VERDICTS: &[(&str, Action)] = &[
    ("accept", Action::Accept),
    ("drop", Action::Drop),
    ("reject", Action::Reject),
    ("jump", Action::Jump),
    ("goto", Action::Jump),
    ("return", Action::Return),
];

fn str_field<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(|v| v.as_str())
}

/// Render a match operand the way the text grammar would spell it.
fn operand_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Object(obj) => {
            if let Some([start, end]) = obj.get("range").and_then(|r| r.as_array()).map(Vec::as_slice) {
                return format!("{}-{}", operand_to_string(start), operand_to_string(end));
            }
            if let Some(prefix) = obj.get("prefix") {
                if let (Some(addr), Some(len)) = (prefix.get("addr"), prefix.get("len")) {
                    return format!("{}/{}", operand_to_string(addr), operand_to_string(len));
                }
            }
            value.to_string()
        }
        other => other.to_string(),
    }
}

#[derive(Default)]
struct RuleFields {
    source: Option<String>,
    destination: Option<String>,
    sport: Option<String>,
    dport: Option<String>,
    protocol: Option<String>,
    payload_protocol: Option<String>,
    iif: Option<String>,
    oif: Option<String>,
}

impl RuleFields {
    fn collect(exprs: &[Value]) -> Self {
        let mut fields = Self::default();

        for expr in exprs {
            let Some(m) = expr.get("match") else {
                continue;
            };
            let (Some(left), Some(right)) = (m.get("left"), m.get("right")) else {
                continue;
            };
            let right = operand_to_string(right);

            if let Some(payload) = left.get("payload") {
                match str_field(payload, "field") {
                    Some("saddr") => fields.source = Some(right),
                    Some("daddr") => fields.destination = Some(right),
                    Some("sport") => fields.sport = Some(right),
                    Some("dport") => fields.dport = Some(right),
                    Some("protocol") | Some("nexthdr") => fields.protocol = Some(right),
                    _ => continue,
                }
                // `tcp dport 22` carries its protocol on the payload
                if let Some(proto @ ("tcp" | "udp")) = str_field(payload, "protocol") {
                    fields.payload_protocol = Some(proto.to_string());
                }
            } else if let Some(meta) = left.get("meta") {
                match str_field(meta, "key") {
                    Some("l4proto") => fields.protocol = Some(right),
                    Some("iifname") | Some("iif") => fields.iif = Some(right),
                    Some("oifname") | Some("oif") => fields.oif = Some(right),
                    _ => {}
                }
            }
        }

        fields
    }
}

/// Last verdict entry wins; `accept` when there is none.
fn rule_action(exprs: &[Value]) -> (Action, Option<String>) {
    let mut action = Action::Accept;
    let mut target = None;

    for expr in exprs {
        for (key, verdict) in VERDICTS {
            if let Some(body) = expr.get(*key) {
                action = *verdict;
                target = str_field(body, "target").map(String::from);
            }
        }
    }

    (action, target)
}

struct JsonParser {
    result: ParseResult,
    rules_seen: usize,
}

impl JsonParser {
    fn new() -> Self {
        Self {
            result: ParseResult::new(),
            rules_seen: 0,
        }
    }

    fn table_key(obj: &Value) -> TableKey {
        TableKey::new(
            str_field(obj, "family").unwrap_or(DEFAULT_FAMILY),
            str_field(obj, "table")
                .or_else(|| str_field(obj, "name"))
                .unwrap_or(DEFAULT_TABLE),
        )
    }

    fn ensure_table(&mut self, key: &TableKey, ordinal: usize) -> Option<&mut Table> {
        if self.result.table(key).is_none() {
            self.result.add_table(Table::new(key, ordinal));
        }
        self.result.table_mut(key)
    }

    fn ensure_chain(&mut self, key: &TableKey, name: &str, ordinal: usize) -> Option<&mut Chain> {
        let table = self.ensure_table(key, ordinal)?;
        Some(
            table
                .chains
                .entry(name.to_string())
                .or_insert_with(|| Chain::new(key, name, ordinal)),
        )
    }

    fn item(&mut self, item: &Value, ordinal: usize) {
        if let Some(table) = item.get("table") {
            let key = Self::table_key(table);
            self.ensure_table(&key, ordinal);
        } else if let Some(chain) = item.get("chain") {
            self.chain(chain, ordinal);
        } else if let Some(set) = item.get("set") {
            self.set(set, ordinal);
        } else if let Some(rule) = item.get("rule") {
            self.rule(rule, ordinal);
        } else {
            tracing::debug!("Ignoring nftables item {}", ordinal);
        }
    }

    fn chain(&mut self, obj: &Value, ordinal: usize) {
        let key = Self::table_key(obj);
        let Some(name) = str_field(obj, "name") else {
            self.result.warn(ordinal, "chain object without a name");
            return;
        };

        let policy = match str_field(obj, "policy").map(str::parse::<Policy>).transpose() {
            Ok(policy) => policy,
            Err(e) => {
                self.result.warn(ordinal, e.to_string());
                None
            }
        };

        // Rules may precede their chain object; keep them
        if let Some(chain) = self.ensure_chain(&key, name, ordinal) {
            chain.chain_type = str_field(obj, "type").map(String::from);
            chain.hook = str_field(obj, "hook").map(String::from);
            chain.priority = obj.get("prio").map(operand_to_string);
            if let Some(policy) = policy {
                chain.policy = policy;
            }
        }
    }

    fn set(&mut self, obj: &Value, ordinal: usize) {
        let key = Self::table_key(obj);
        let Some(name) = str_field(obj, "name") else {
            self.result.warn(ordinal, "set object without a name");
            return;
        };

        let mut set = SetDefinition::new(&key, name, ordinal);
        if let Some(set_type) = obj.get("type") {
            set.set_type = match set_type {
                Value::Array(parts) => parts.iter().map(operand_to_string).collect::<Vec<_>>().join(" . "),
                other => operand_to_string(other),
            };
        }
        if let Some(flags) = obj.get("flags").and_then(|f| f.as_array()) {
            set.flags = flags.iter().map(operand_to_string).collect();
        }
        if let Some(elems) = obj.get("elem").and_then(|e| e.as_array()) {
            set.elements = elems.iter().map(operand_to_string).collect();
        }

        if let Some(table) = self.ensure_table(&key, ordinal) {
            table.insert_set(set);
        }
    }

    fn rule(&mut self, obj: &Value, ordinal: usize) {
        let line_number = self.rules_seen + 1;
        match Self::build_rule(obj, line_number) {
            Ok(rule) => {
                self.rules_seen = line_number;
                let key = TableKey::new(rule.family(), rule.table());
                let chain_name = rule.chain().to_string();
                if let Some(chain) = self.ensure_chain(&key, &chain_name, ordinal) {
                    chain.push_rule(rule);
                }
            }
            Err(e) => self.result.warn(ordinal, format!("Failed to parse rule: {}", e)),
        }
    }

    fn build_rule(obj: &Value, line_number: usize) -> Result<Rule> {
        if !obj.is_object() {
            return Err(Error::InvalidRule {
                line: line_number,
                reason: "rule is not an object".to_string(),
            });
        }

        let exprs: &[Value] = obj
            .get("expr")
            .and_then(|e| e.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let (action, target) = rule_action(exprs);
        let fields = RuleFields::collect(exprs);

        let mut builder = Rule::builder(
            action,
            str_field(obj, "chain").unwrap_or(DEFAULT_CHAIN),
            line_number,
        )
        .table(str_field(obj, "table").unwrap_or(DEFAULT_TABLE))
        .family(str_field(obj, "family").unwrap_or(DEFAULT_FAMILY))
        .raw(obj.to_string());

        if let Some(target) = target {
            builder = builder.jump_target(target);
        }
        if let Some(proto) = fields.protocol.or(fields.payload_protocol) {
            builder = builder.protocol(proto.parse::<Protocol>()?);
        }

        let match_values = [
            (fields.source, 0),
            (fields.destination, 1),
            (fields.sport, 2),
            (fields.dport, 3),
            (fields.iif, 4),
            (fields.oif, 5),
        ];
        for (value, slot) in match_values {
            let Some(value) = value else {
                continue;
            };
            if let Some(set) = value.strip_prefix('@') {
                builder = builder.set_reference(set);
            }
            builder = match slot {
                0 => builder.source(value),
                1 => builder.destination(value),
                2 => builder.sport(value),
                3 => builder.dport(value),
                4 => builder.iif(value),
                _ => builder.oif(value),
            };
        }

        builder.build()
    }
}

/// Parse JSON input: `{"nftables": [...]}` or a bare array of rule objects.
///
/// Invalid JSON and unsupported top-level shapes fail the whole parse;
/// individual bad objects are skipped with a warning.
pub fn parse_json(content: &str) -> Result<ParseResult> {
    let data: Value = serde_json::from_str(content)?;
    let mut parser = JsonParser::new();

    match &data {
        Value::Object(map) => {
            let items = map
                .get("nftables")
                .and_then(|n| n.as_array())
                .ok_or_else(|| Error::UnsupportedShape("object without an \"nftables\" array".to_string()))?;
            for (idx, item) in items.iter().enumerate() {
                parser.item(item, idx + 1);
            }
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                let rule = item.get("rule").unwrap_or(item);
                parser.rule(rule, idx + 1);
            }
        }
        other => {
            let kind = match other {
                Value::Null => "null",
                Value::Bool(_) => "boolean",
                Value::Number(_) => "number",
                _ => "string",
            };
            return Err(Error::UnsupportedShape(format!("top-level {}", kind)));
        }
    }

    tracing::info!(
        "Parsed {} JSON rule(s) into {} table(s)",
        parser.rules_seen,
        parser.result.tables.len()
    );
    Ok(parser.result)
}
