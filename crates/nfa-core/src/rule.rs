use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Statement a rule ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Accept,
    Drop,
    Reject,
    Jump,
    Return,
    Counter,
    Log,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Accept => "accept",
            Action::Drop => "drop",
            Action::Reject => "reject",
            Action::Jump => "jump",
            Action::Return => "return",
            Action::Counter => "counter",
            Action::Log => "log",
        }
    }

    /// Flow-control verdicts the evaluator scans past
    pub fn continues_scan(&self) -> bool {
        matches!(self, Action::Jump | Action::Return)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layer 4 protocol a rule can be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    Ah,
    Esp,
    Any,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::Icmpv6 => "icmpv6",
            Protocol::Ah => "ah",
            Protocol::Esp => "esp",
            Protocol::Any => "any",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "icmp" => Ok(Protocol::Icmp),
            "icmpv6" | "ipv6-icmp" => Ok(Protocol::Icmpv6),
            "ah" => Ok(Protocol::Ah),
            "esp" => Ok(Protocol::Esp),
            "any" => Ok(Protocol::Any),
            other => Err(Error::InvalidProtocol(other.to_string())),
        }
    }
}

/// A single parsed rule. Absent match fields mean "unrestricted".
///
/// Rules are only created through [`RuleBuilder`] and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    action: Action,
    chain: String,
    table: String,
    family: String,
    source: Option<String>,
    destination: Option<String>,
    sport: Option<String>,
    dport: Option<String>,
    protocol: Option<Protocol>,
    iif: Option<String>,
    oif: Option<String>,
    line_number: usize,
    raw: String,
    sets_referenced: BTreeSet<String>,
    jump_target: Option<String>,
}

impl Rule {
    pub fn builder(action: Action, chain: impl Into<String>, line_number: usize) -> RuleBuilder {
        RuleBuilder::new(action, chain, line_number)
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn sport(&self) -> Option<&str> {
        self.sport.as_deref()
    }

    pub fn dport(&self) -> Option<&str> {
        self.dport.as_deref()
    }

    pub fn protocol(&self) -> Option<Protocol> {
        self.protocol
    }

    pub fn iif(&self) -> Option<&str> {
        self.iif.as_deref()
    }

    pub fn oif(&self) -> Option<&str> {
        self.oif.as_deref()
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn sets_referenced(&self) -> &BTreeSet<String> {
        &self.sets_referenced
    }

    /// Chain named by a `jump`/`goto` statement
    pub fn jump_target(&self) -> Option<&str> {
        self.jump_target.as_deref()
    }
}

/// One-line summary: `table/chain src=... dport=... -> action`
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.chain)?;
        if let Some(source) = &self.source {
            write!(f, " src={}", source)?;
        }
        if let Some(destination) = &self.destination {
            write!(f, " dst={}", destination)?;
        }
        if let Some(protocol) = self.protocol {
            write!(f, " proto={}", protocol)?;
        }
        if let Some(sport) = &self.sport {
            write!(f, " sport={}", sport)?;
        }
        if let Some(dport) = &self.dport {
            write!(f, " dport={}", dport)?;
        }
        write!(f, " -> {}", self.action)
    }
}

/// Collects rule fields and checks them once in [`RuleBuilder::build`].
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    rule: Rule,
}

impl RuleBuilder {
    pub fn new(action: Action, chain: impl Into<String>, line_number: usize) -> Self {
        Self {
            rule: Rule {
                action,
                chain: chain.into(),
                table: "filter".to_string(),
                family: "inet".to_string(),
                source: None,
                destination: None,
                sport: None,
                dport: None,
                protocol: None,
                iif: None,
                oif: None,
                line_number,
                raw: String::new(),
                sets_referenced: BTreeSet::new(),
                jump_target: None,
            },
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.rule.table = table.into();
        self
    }

    pub fn family(mut self, family: impl Into<String>) -> Self {
        self.rule.family = family.into();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.rule.source = Some(source.into());
        self
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.rule.destination = Some(destination.into());
        self
    }

    pub fn sport(mut self, sport: impl Into<String>) -> Self {
        self.rule.sport = Some(sport.into());
        self
    }

    pub fn dport(mut self, dport: impl Into<String>) -> Self {
        self.rule.dport = Some(dport.into());
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.rule.protocol = Some(protocol);
        self
    }

    pub fn iif(mut self, iif: impl Into<String>) -> Self {
        self.rule.iif = Some(iif.into());
        self
    }

    pub fn oif(mut self, oif: impl Into<String>) -> Self {
        self.rule.oif = Some(oif.into());
        self
    }

    pub fn raw(mut self, raw: impl Into<String>) -> Self {
        self.rule.raw = raw.into();
        self
    }

    pub fn set_reference(mut self, name: impl Into<String>) -> Self {
        self.rule.sets_referenced.insert(name.into());
        self
    }

    pub fn jump_target(mut self, target: impl Into<String>) -> Self {
        self.rule.jump_target = Some(target.into());
        self
    }

    pub fn build(self) -> Result<Rule> {
        let rule = self.rule;
        let invalid = |reason: String| Error::InvalidRule {
            line: rule.line_number,
            reason,
        };

        if rule.line_number == 0 {
            return Err(invalid("line numbers start at 1".to_string()));
        }
        if rule.chain.trim().is_empty() {
            return Err(invalid("empty chain name".to_string()));
        }
        if rule.table.trim().is_empty() {
            return Err(invalid("empty table name".to_string()));
        }
        if let Some(sport) = &rule.sport {
            validate_port_expr(sport).map_err(|reason| invalid(format!("sport {}", reason)))?;
        }
        if let Some(dport) = &rule.dport {
            validate_port_expr(dport).map_err(|reason| invalid(format!("dport {}", reason)))?;
        }

        Ok(rule)
    }
}

/// Numeric literals and ranges must fit a port. Set references and other
/// expressions are kept verbatim; the matcher never matches them.
fn validate_port_expr(value: &str) -> std::result::Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("is empty".to_string());
    }

    let is_numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    if let Some((start, end)) = value.split_once('-') {
        if !(is_numeric(start) && is_numeric(end)) {
            return Ok(());
        }
        let start = parse_port_literal(start)?;
        let end = parse_port_literal(end)?;
        if start > end {
            return Err(format!("range {} is reversed", value));
        }
        return Ok(());
    }

    if is_numeric(value) {
        parse_port_literal(value)?;
    }
    Ok(())
}

fn parse_port_literal(value: &str) -> std::result::Result<u16, String> {
    value
        .parse::<u16>()
        .map_err(|_| format!("{} is outside 0-65535", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names() {
        assert_eq!(Action::Accept.to_string(), "accept");
        assert_eq!(serde_json::to_string(&Action::Jump).unwrap(), "\"jump\"");
        assert!(Action::Return.continues_scan());
        assert!(!Action::Drop.continues_scan());
        assert!(!Action::Log.continues_scan());
    }

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("Tcp".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("icmpv6".parse::<Protocol>().unwrap(), Protocol::Icmpv6);
        assert!(matches!(
            "sctp".parse::<Protocol>(),
            Err(Error::InvalidProtocol(p)) if p == "sctp"
        ));
    }

    #[test]
    fn test_builder_defaults() {
        let rule = Rule::builder(Action::Accept, "input", 3)
            .dport("22")
            .protocol(Protocol::Tcp)
            .raw("tcp dport 22 accept")
            .build()
            .unwrap();

        assert_eq!(rule.table(), "filter");
        assert_eq!(rule.family(), "inet");
        assert_eq!(rule.dport(), Some("22"));
        assert_eq!(rule.source(), None);
        assert_eq!(rule.line_number(), 3);
        assert!(rule.sets_referenced().is_empty());
    }

    #[test]
    fn test_builder_rejects_bad_ports() {
        let too_big = Rule::builder(Action::Accept, "input", 1).dport("70000").build();
        assert!(matches!(too_big, Err(Error::InvalidRule { line: 1, .. })));

        let reversed = Rule::builder(Action::Accept, "input", 1).sport("443-80").build();
        assert!(reversed.is_err());

        assert!(Rule::builder(Action::Accept, "input", 1).dport("80-443").build().is_ok());
        assert!(Rule::builder(Action::Accept, "input", 1).dport("@web_ports").build().is_ok());
        assert!(Rule::builder(Action::Accept, "input", 1).dport("0").build().is_ok());
    }

    #[test]
    fn test_display() {
        let rule = Rule::builder(Action::Drop, "input", 2)
            .source("10.0.0.0/8")
            .protocol(Protocol::Udp)
            .dport("53")
            .build()
            .unwrap();
        assert_eq!(rule.to_string(), "filter/input src=10.0.0.0/8 proto=udp dport=53 -> drop");
    }

    #[test]
    fn test_builder_rejects_missing_identity() {
        assert!(Rule::builder(Action::Drop, "input", 0).build().is_err());
        assert!(Rule::builder(Action::Drop, " ", 1).build().is_err());
        assert!(Rule::builder(Action::Drop, "input", 1).table("").build().is_err());
    }

    #[test]
    fn test_set_references_are_deduplicated() {
        let rule = Rule::builder(Action::Accept, "input", 1)
            .source("@allowed")
            .set_reference("allowed")
            .set_reference("allowed")
            .set_reference("blocked")
            .build()
            .unwrap();

        let names: Vec<&str> = rule.sets_referenced().iter().map(String::as_str).collect();
        assert_eq!(names, vec!["allowed", "blocked"]);
    }

    #[test]
    fn test_action_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Action::Reject).unwrap(), "\"reject\"");
        assert_eq!(serde_json::to_string(&Protocol::Icmpv6).unwrap(), "\"icmpv6\"");
    }
}
