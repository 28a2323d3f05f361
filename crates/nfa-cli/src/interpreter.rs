use anyhow::{Context, Result};
use nfa_core::QueryParams;
use regex::Regex;
use std::sync::LazyLock;

const ADDR: &str = r"([0-9a-f]*:[0-9a-f:./]*|[0-9][0-9./]*)";

fn keyword_patterns(keywords: &[&str], value: &str) -> Vec<Regex> {
    keywords
        .iter()
        .map(|kw| Regex::new(&format!(r"\b{}\s+{}", kw, value)).unwrap())
        .collect()
}

static SRC_IP: LazyLock<Vec<Regex>> = LazyLock::new(|| keyword_patterns(&["from", "source"], ADDR));
static DST_IP: LazyLock<Vec<Regex>> =
    LazyLock::new(|| keyword_patterns(&["to", "destination", "dest"], ADDR));
static SRC_PORT: LazyLock<Vec<Regex>> =
    LazyLock::new(|| keyword_patterns(&["from port", "source port", "sport"], r"(\d+)"));
static DST_PORT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    keyword_patterns(
        &["to port", "port", "destination port", "dport", "on port"],
        r"(\d+)",
    )
});
static PROTOCOLS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    ["tcp", "udp", "icmp"]
        .into_iter()
        .map(|p| (p, Regex::new(&format!(r"\b{}\b", p)).unwrap()))
        .collect()
});
static INBOUND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:incoming|inbound|in)\b").unwrap());
static OUTBOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:outgoing|outbound|out)\b").unwrap());
static FORWARD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bforward").unwrap());

/// First capture of the first pattern that matches, with the match span.
fn first_capture<'t>(patterns: &[Regex], text: &'t str) -> Option<(&'t str, std::ops::Range<usize>)> {
    patterns.iter().find_map(|re| {
        let caps = re.captures(text)?;
        let whole = caps.get(0)?;
        Some((caps.get(1)?.as_str(), whole.range()))
    })
}

fn parse_port(value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .with_context(|| format!("Port number out of range: {}", value))
}

fn direction(text: &str) -> &'static str {
    if INBOUND.is_match(text) {
        "in"
    } else if OUTBOUND.is_match(text) {
        "out"
    } else if FORWARD.is_match(text) {
        "forward"
    } else {
        "in"
    }
}

/// Extract query fields from free text such as
/// `"from 192.168.1.10 to 10.0.0.5 port 80 tcp"`.
pub fn extract(text: &str) -> Result<QueryParams> {
    let mut text = text.trim().to_lowercase();

    let src_ip = first_capture(&SRC_IP, &text).map(|(ip, _)| ip.to_string());
    let dst_ip = first_capture(&DST_IP, &text).map(|(ip, _)| ip.to_string());

    let mut src_port = None;
    if let Some((port, span)) = first_capture(&SRC_PORT, &text) {
        src_port = Some(parse_port(port)?);
        // so the bare `port` keyword cannot pick the source port up again
        text.replace_range(span.clone(), &" ".repeat(span.len()));
    }
    let dst_port = first_capture(&DST_PORT, &text)
        .map(|(port, _)| parse_port(port))
        .transpose()?;

    let protocol = PROTOCOLS
        .iter()
        .find(|(_, re)| re.is_match(&text))
        .map(|(name, _)| name.to_string());

    let params = QueryParams {
        src_ip,
        dst_ip,
        src_port,
        dst_port,
        protocol,
        direction: Some(direction(&text).to_string()),
    };
    tracing::debug!("Interpreted {:?} as {:?}", text, params);
    Ok(params)
}

pub fn help_text() -> &'static str {
    r#"
Natural Language Query Examples:

  "from 192.168.1.10 to 10.0.0.5 port 80 tcp"
  "incoming traffic from 192.168.0.0/24 to port 443"
  "outgoing tcp to 8.8.8.8 port 53"
  "from 172.16.0.1 source port 12345 to 192.168.1.1 port 22"

Keywords:
  - Source: from, source
  - Destination: to, destination, dest
  - Port: port, dport, sport, on port
  - Protocol: tcp, udp, icmp
  - Direction: in/incoming/inbound, out/outgoing/outbound, forward
"#
}
