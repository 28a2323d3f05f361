use anyhow::Result;
use nfa_core::{
    Action, EvaluationResult, ParseResult, ParseSummary, ParseWarning, RedundantPair, Rule, Verdict,
};
use serde::Serialize;
use std::collections::BTreeMap;

const RULE_HEADER: [&str; 8] = ["Line", "Chain", "Source", "Destination", "Protocol", "Sport", "Dport", "Action"];

fn dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn verdict_symbol(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Allow => "✅",
        Verdict::Block => "⛔",
        Verdict::NoMatch => "❔",
        Verdict::Conflict => "⚠️ ",
    }
}

fn rule_cells(rule: &Rule) -> [String; 8] {
    let action = match rule.jump_target() {
        Some(target) if rule.action() == Action::Jump => format!("JUMP {}", target),
        _ => rule.action().as_str().to_uppercase(),
    };
    [
        rule.line_number().to_string(),
        rule.chain().to_string(),
        dash(rule.source()).to_string(),
        dash(rule.destination()).to_string(),
        rule.protocol().map_or_else(|| "-".to_string(), |p| p.to_string()),
        dash(rule.sport()).to_string(),
        dash(rule.dport()).to_string(),
        action,
    ]
}

/// Render rules as a fixed-column table sized to the widest cell.
pub fn rules_table(rules: &[Rule]) -> String {
    let rows: Vec<[String; 8]> = rules.iter().map(rule_cells).collect();

    let mut widths = RULE_HEADER.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let separator: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    let mut lines = vec![render(RULE_HEADER.to_vec())];
    lines.push(render(separator.iter().map(String::as_str).collect()));
    for row in &rows {
        lines.push(render(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}

pub fn print_rules(rules: &[Rule], title: &str) {
    println!("📜 {} ({}):", title, rules.len());
    if rules.is_empty() {
        println!("  (none)");
        return;
    }
    for line in rules_table(rules).lines() {
        println!("  {}", line);
    }
}

pub fn print_evaluation(result: &EvaluationResult, show_trace: bool) {
    println!("\n{} Verdict: {}", verdict_symbol(result.verdict), result.verdict);
    println!("   {}", result.explanation);

    if let Some(policy) = result.default_policy {
        println!("   Chain '{}' default policy: {}", result.chain, policy);
    }

    if !result.matched_rules.is_empty() {
        println!();
        print_rules(&result.matched_rules, "Matched rules");
    }

    if result.has_conflicts() {
        println!("\n⚠️  Conflicts ({}):", result.conflicts.len());
        for conflict in &result.conflicts {
            println!("  • {}", conflict);
        }
    }

    if show_trace {
        println!("\n🔍 Evaluation trace:");
        for step in result.trace() {
            println!("  {}", step);
        }
    }
}

pub fn print_redundant(pairs: &[RedundantPair]) {
    if pairs.is_empty() {
        println!("✅ No redundant rules found");
        return;
    }

    println!("🔁 Redundant rules ({}):\n", pairs.len());
    for pair in pairs {
        println!("  {}:", pair.reason);
        println!("    General:  {}", pair.general);
        println!("    Specific: {}\n", pair.specific);
    }
}

pub fn print_hierarchy(result: &ParseResult) {
    println!("🗂️  Ruleset ({} tables):", result.tables.len());
    if result.tables.is_empty() {
        println!("  (none)");
    }

    for (key, table) in &result.tables {
        println!("  • table {} {}", key.family, key.name);
        for chain in table.chains.values() {
            let base = match (&chain.hook, &chain.priority) {
                (Some(hook), Some(priority)) => format!(" [hook {} priority {}, policy {}]", hook, priority, chain.policy),
                (Some(hook), None) => format!(" [hook {}, policy {}]", hook, chain.policy),
                _ => String::new(),
            };
            println!("    ├─ chain {}{} - {} rules", chain.name, base, chain.rule_count());
        }
        for set in table.sets.values() {
            println!(
                "    ├─ set {} ({}) - {} elements",
                set.name,
                set.set_type,
                set.elements.len()
            );
        }
    }
}

fn print_counts(title: &str, counts: &BTreeMap<String, usize>) {
    if counts.is_empty() {
        return;
    }
    let parts: Vec<String> = counts.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    println!("  {}: {}", title, parts.join(", "));
}

pub fn print_summary(summary: &ParseSummary) {
    println!("\n📊 Summary");
    println!(
        "  {} tables, {} chains, {} sets, {} rules",
        summary.total_tables, summary.total_chains, summary.total_sets, summary.total_rules
    );
    print_counts("By action", &summary.rules_by_action);
    print_counts("By protocol", &summary.rules_by_protocol);
    print_counts("By table", &summary.rules_by_table);
}

pub fn print_warnings(warnings: &[ParseWarning]) {
    if warnings.is_empty() {
        return;
    }
    println!("\n⚠️  Skipped input ({}):", warnings.len());
    for warning in warnings {
        println!("  line {}: {}", warning.line, warning.message);
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct ParseReport<'a> {
    summary: ParseSummary,
    #[serde(flatten)]
    result: &'a ParseResult,
    /// Every rule in line order
    rules: Vec<Rule>,
}

fn parse_report(result: &ParseResult) -> ParseReport<'_> {
    ParseReport {
        summary: result.summary(),
        result,
        rules: result.get_all_rules(),
    }
}

/// Hierarchy, flat rule list, warnings and summary as one JSON document.
pub fn print_parse_json(result: &ParseResult) -> Result<()> {
    print_json(&parse_report(result))
}
