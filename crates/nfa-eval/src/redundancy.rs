use nfa_core::matcher::ip_contains;
use nfa_core::{RedundantPair, Rule};
use std::collections::BTreeMap;

fn address_covers(general: Option<&str>, specific: Option<&str>) -> bool {
    match (general, specific) {
        (None, _) => true,
        (Some(general), Some(specific)) => ip_contains(general, specific),
        (Some(_), None) => false,
    }
}

fn field_covers<T: PartialEq>(general: Option<T>, specific: Option<T>) -> bool {
    general.is_none() || general == specific
}

/// Does `general` match everything `specific` matches, with the same action?
pub fn shadows(general: &Rule, specific: &Rule) -> bool {
    general.action() == specific.action()
        && address_covers(general.source(), specific.source())
        && address_covers(general.destination(), specific.destination())
        && field_covers(general.sport(), specific.sport())
        && field_covers(general.dport(), specific.dport())
        && field_covers(general.protocol(), specific.protocol())
}

/// Every (earlier, later) pair in the same chain where the earlier rule
/// makes the later one unreachable, ordered by line numbers.
pub fn find_redundant_rules(rules: &[Rule]) -> Vec<RedundantPair> {
    let mut chains: BTreeMap<(&str, &str, &str), Vec<&Rule>> = BTreeMap::new();
    for rule in rules {
        chains
            .entry((rule.family(), rule.table(), rule.chain()))
            .or_default()
            .push(rule);
    }

    let mut redundant = Vec::new();
    for ((_, table, chain), mut members) in chains {
        members.sort_by_key(|r| r.line_number());
        tracing::debug!("Checking {} rule(s) in {} {}", members.len(), table, chain);

        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                if shadows(members[i], members[j]) {
                    redundant.push(RedundantPair::new(members[i], members[j]));
                }
            }
        }
    }

    redundant.sort_by_key(|pair| pair.lines());
    tracing::info!("Found {} redundant rule pair(s)", redundant.len());
    redundant
}
