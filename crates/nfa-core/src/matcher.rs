// Match predicates shared by the evaluator and the redundancy analyzer.
//
// Every predicate is total: malformed input never matches and never panics.
// An absent rule value is a wildcard; an absent candidate only satisfies a
// wildcard.

use ipnet::IpNet;
use std::net::IpAddr;

use crate::query::Query;
use crate::rule::Rule;

enum Addr {
    Host(IpAddr),
    Net(IpNet),
}

fn parse_addr(value: &str) -> Option<Addr> {
    let value = value.trim();
    if value.contains('/') {
        value.parse::<IpNet>().ok().map(|net| Addr::Net(net.trunc()))
    } else {
        value.parse::<IpAddr>().ok().map(Addr::Host)
    }
}

/// Does `candidate` fall inside the address or network in `rule_value`?
///
/// A candidate network matches a rule network it is a subnet of, and an
/// exact-address rule only when it is a single host prefix of that address.
pub fn ip_matches(candidate: Option<&str>, rule_value: Option<&str>) -> bool {
    let Some(rule_value) = rule_value else {
        return true;
    };
    let Some(candidate) = candidate else {
        return false;
    };

    match (parse_addr(candidate), parse_addr(rule_value)) {
        (Some(Addr::Host(addr)), Some(Addr::Net(net))) => net.contains(&addr),
        (Some(Addr::Host(addr)), Some(Addr::Host(rule))) => addr == rule,
        (Some(Addr::Net(sub)), Some(Addr::Net(net))) => net.contains(&sub),
        (Some(Addr::Net(sub)), Some(Addr::Host(rule))) => {
            sub.prefix_len() == sub.max_prefix_len() && sub.addr() == rule
        }
        _ => false,
    }
}

/// Exact port or inclusive `start-end` range.
pub fn port_matches(candidate: Option<u16>, rule_value: Option<&str>) -> bool {
    let Some(rule_value) = rule_value else {
        return true;
    };
    let Some(candidate) = candidate else {
        return false;
    };

    let rule_value = rule_value.trim();
    if let Some((start, end)) = rule_value.split_once('-') {
        match (start.trim().parse::<u16>(), end.trim().parse::<u16>()) {
            (Ok(start), Ok(end)) => (start..=end).contains(&candidate),
            _ => false,
        }
    } else {
        rule_value
            .parse::<u16>()
            .map(|port| port == candidate)
            .unwrap_or(false)
    }
}

/// Case-insensitive protocol comparison; `any` on the rule side is a wildcard.
pub fn protocol_matches(candidate: Option<&str>, rule_value: Option<&str>) -> bool {
    let rule_value = match rule_value {
        None => return true,
        Some(v) if v.eq_ignore_ascii_case("any") => return true,
        Some(v) => v,
    };

    candidate
        .map(|c| c.trim().eq_ignore_ascii_case(rule_value.trim()))
        .unwrap_or(false)
}

/// Conjunction of every match family between a query and a rule.
pub fn matches_all(rule: &Rule, query: &Query) -> bool {
    ip_matches(query.src_ip(), rule.source())
        && port_matches(query.src_port(), rule.sport())
        && ip_matches(query.dst_ip(), rule.destination())
        && port_matches(query.dst_port(), rule.dport())
        && protocol_matches(
            query.protocol().map(|p| p.as_str()),
            rule.protocol().map(|p| p.as_str()),
        )
}

/// Is every address matched by `specific` also matched by `general`?
///
/// Two non-network literals are contained only when textually identical.
pub fn ip_contains(general: &str, specific: &str) -> bool {
    if !general.contains('/') {
        return general == specific;
    }

    let Ok(general) = general.trim().parse::<IpNet>() else {
        return false;
    };

    match parse_addr(specific) {
        Some(Addr::Net(net)) => general.contains(&net),
        Some(Addr::Host(addr)) => general.contains(&addr),
        None => false,
    }
}
