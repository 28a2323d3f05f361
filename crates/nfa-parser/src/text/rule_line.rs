use nfa_core::{Action, Protocol, Result, Rule, TableKey};
use regex::Regex;
use std::sync::LazyLock;

/// Checked in priority order; the first hit decides the action.
static ACTIONS: LazyLock<Vec<(Action, Regex)>> = LazyLock::new(|| {
    [
        (Action::Accept, r"\baccept\b"),
        (Action::Drop, r"\bdrop\b"),
        (Action::Reject, r"\breject\b"),
        (Action::Jump, r"\b(?:jump|goto)\s+\S"),
        (Action::Return, r"\breturn\b"),
        (Action::Counter, r"\bcounter\b"),
        (Action::Log, r"\blog\b"),
    ]
    .into_iter()
    .map(|(action, pattern)| (action, Regex::new(pattern).unwrap()))
    .collect()
});

static MATCH_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:tcp|udp|icmp|icmpv6|ip6?|iif(?:name)?|oif(?:name)?|ct)\b").unwrap()
});

static PROTOCOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(tcp|udp|icmpv6|icmp|ah|esp)(?:\s|$)").unwrap());

static SADDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsaddr\s+([0-9a-fA-F.:/]+|@[\w-]+)").unwrap());

static DADDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdaddr\s+([0-9a-fA-F.:/]+|@[\w-]+)").unwrap());

static SPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsport\s+(\d+(?:-\d+)?|@[\w-]+)").unwrap());

static DPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdport\s+(\d+(?:-\d+)?|@[\w-]+)").unwrap());

static IIF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\biif(?:name)?\s+"?(@[\w-]+|[\w.\-]+)"?"#).unwrap());

static OIF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\boif(?:name)?\s+"?(@[\w-]+|[\w.\-]+)"?"#).unwrap());

static JUMP_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:jump|goto)\s+([\w-]+)").unwrap());

static SET_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([\w-]+)").unwrap());

/// Where a rule statement sits in the hierarchy
pub struct RuleContext<'a> {
    pub table: &'a TableKey,
    pub chain: &'a str,
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn detect_action(text: &str) -> Option<Action> {
    ACTIONS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(action, _)| *action)
        .or_else(|| MATCH_KEYWORD.is_match(text).then_some(Action::Accept))
}

/// Turn one statement inside a chain into a rule.
///
/// Returns `Ok(None)` for statements that are not rules, and an error when
/// the statement looks like a rule but violates a rule invariant.
pub fn parse_rule_line(text: &str, ctx: &RuleContext<'_>, line_number: usize) -> Result<Option<Rule>> {
    let text = text.trim();
    let Some(action) = detect_action(text) else {
        return Ok(None);
    };

    let mut builder = Rule::builder(action, ctx.chain, line_number)
        .table(&ctx.table.name)
        .family(&ctx.table.family)
        .raw(text);

    if let Some(proto) = capture(&PROTOCOL, text) {
        builder = builder.protocol(proto.parse::<Protocol>()?);
    }
    if let Some(source) = capture(&SADDR, text) {
        builder = builder.source(source);
    }
    if let Some(destination) = capture(&DADDR, text) {
        builder = builder.destination(destination);
    }
    if let Some(sport) = capture(&SPORT, text) {
        builder = builder.sport(sport);
    }
    if let Some(dport) = capture(&DPORT, text) {
        builder = builder.dport(dport);
    }
    if let Some(iif) = capture(&IIF, text) {
        builder = builder.iif(iif);
    }
    if let Some(oif) = capture(&OIF, text) {
        builder = builder.oif(oif);
    }
    if action == Action::Jump {
        if let Some(target) = capture(&JUMP_TARGET, text) {
            builder = builder.jump_target(target);
        }
    }
    for set in SET_REF.captures_iter(text) {
        builder = builder.set_reference(&set[1]);
    }

    builder.build().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Option<Rule> {
        let key = TableKey::new("inet", "filter");
        let ctx = RuleContext {
            table: &key,
            chain: "input",
        };
        parse_rule_line(text, &ctx, 7).unwrap()
    }

    #[test]
    fn test_basic_rule() {
        let rule = parse("tcp dport 22 accept").unwrap();
        assert_eq!(rule.action(), Action::Accept);
        assert_eq!(rule.protocol(), Some(Protocol::Tcp));
        assert_eq!(rule.dport(), Some("22"));
        assert_eq!(rule.chain(), "input");
        assert_eq!(rule.table(), "filter");
        assert_eq!(rule.family(), "inet");
        assert_eq!(rule.line_number(), 7);
        assert_eq!(rule.raw(), "tcp dport 22 accept");
    }

    #[test]
    fn test_action_priority() {
        assert_eq!(parse("ip saddr 10.0.0.1 counter drop").unwrap().action(), Action::Drop);
        assert_eq!(parse("log prefix \"x\" accept").unwrap().action(), Action::Accept);
        assert_eq!(parse("tcp dport 80 counter").unwrap().action(), Action::Counter);
        assert_eq!(parse("ip saddr 10.0.0.0/8 log").unwrap().action(), Action::Log);
        assert_eq!(parse("reject with icmp type port-unreachable").unwrap().action(), Action::Reject);
    }

    #[test]
    fn test_jump_and_return() {
        let rule = parse("ip saddr @trusted jump trusted_in").unwrap();
        assert_eq!(rule.action(), Action::Jump);
        assert_eq!(rule.jump_target(), Some("trusted_in"));
        assert_eq!(rule.source(), Some("@trusted"));

        assert_eq!(parse("goto other").unwrap().action(), Action::Jump);
        assert_eq!(parse("return").unwrap().action(), Action::Return);
    }

    #[test]
    fn test_default_action_needs_match_keyword() {
        assert_eq!(parse("ct state established,related").unwrap().action(), Action::Accept);
        assert_eq!(parse("iifname lo").unwrap().action(), Action::Accept);
        assert!(parse("meta nfproto ipv4").is_none());
        assert!(parse("masquerade").is_none());
        // keywords only count as whole words: `ct` inside `redirect` is not a match
        assert!(parse("redirect to :8080").is_none());
        assert!(parse("meta skuid 1000").is_none());
    }

    #[test]
    fn test_addresses() {
        let rule = parse("ip saddr 192.168.1.0/24 ip daddr 10.0.0.5 accept").unwrap();
        assert_eq!(rule.source(), Some("192.168.1.0/24"));
        assert_eq!(rule.destination(), Some("10.0.0.5"));

        let rule = parse("ip6 saddr 2001:db8::/32 drop").unwrap();
        assert_eq!(rule.source(), Some("2001:db8::/32"));
    }

    #[test]
    fn test_ports_and_ranges() {
        let rule = parse("udp sport 1024-65535 dport 53 accept").unwrap();
        assert_eq!(rule.protocol(), Some(Protocol::Udp));
        assert_eq!(rule.sport(), Some("1024-65535"));
        assert_eq!(rule.dport(), Some("53"));

        let rule = parse("tcp dport @web_ports accept").unwrap();
        assert_eq!(rule.dport(), Some("@web_ports"));
    }

    #[test]
    fn test_interfaces() {
        let rule = parse(r#"iifname "eth0" oifname "wg0" accept"#).unwrap();
        assert_eq!(rule.iif(), Some("eth0"));
        assert_eq!(rule.oif(), Some("wg0"));

        let rule = parse("iif @lan_ifaces accept").unwrap();
        assert_eq!(rule.iif(), Some("@lan_ifaces"));
    }

    #[test]
    fn test_protocol_tokens() {
        assert_eq!(parse("icmpv6 type echo-request accept").unwrap().protocol(), Some(Protocol::Icmpv6));
        assert_eq!(parse("ip protocol esp accept").unwrap().protocol(), Some(Protocol::Esp));
        assert_eq!(parse("ip saddr 10.0.0.1 accept").unwrap().protocol(), None);
    }

    #[test]
    fn test_set_references() {
        let rule = parse("ip saddr @allowed tcp dport @ports ip daddr @allowed accept").unwrap();
        let sets: Vec<&str> = rule.sets_referenced().iter().map(String::as_str).collect();
        assert_eq!(sets, vec!["allowed", "ports"]);
    }

    #[test]
    fn test_invalid_port_is_error() {
        let key = TableKey::new("inet", "filter");
        let ctx = RuleContext {
            table: &key,
            chain: "input",
        };
        assert!(parse_rule_line("tcp dport 70000 accept", &ctx, 3).is_err());
    }
}
