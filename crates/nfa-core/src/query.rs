use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Traffic direction; each maps onto the base chain that sees it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    In,
    Out,
    Forward,
}

impl Direction {
    pub fn chain_name(&self) -> &'static str {
        match self {
            Direction::In => "input",
            Direction::Out => "output",
            Direction::Forward => "forward",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Forward => "forward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" | "incoming" | "inbound" => Ok(Direction::In),
            "out" | "outgoing" | "outbound" => Ok(Direction::Out),
            "forward" | "forwarded" => Ok(Direction::Forward),
            other => Err(Error::InvalidDirection(other.to_string())),
        }
    }
}

/// Protocols a query may name. Narrower than the rule protocol set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryProtocol {
    Tcp,
    Udp,
    Icmp,
    Any,
}

impl QueryProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryProtocol::Tcp => "tcp",
            QueryProtocol::Udp => "udp",
            QueryProtocol::Icmp => "icmp",
            QueryProtocol::Any => "any",
        }
    }
}

impl fmt::Display for QueryProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(QueryProtocol::Tcp),
            "udp" => Ok(QueryProtocol::Udp),
            "icmp" => Ok(QueryProtocol::Icmp),
            "any" => Ok(QueryProtocol::Any),
            other => Err(Error::InvalidProtocol(other.to_string())),
        }
    }
}

/// Unvalidated query fields as they arrive from a CLI, a JSON body or the
/// natural-language interpreter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub src_ip: Option<String>,
    #[serde(default)]
    pub dst_ip: Option<String>,
    #[serde(default)]
    pub src_port: Option<i64>,
    #[serde(default)]
    pub dst_port: Option<i64>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
}

/// A synthetic packet description to evaluate against a ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QueryParams")]
pub struct Query {
    src_ip: Option<String>,
    dst_ip: Option<String>,
    src_port: Option<u16>,
    dst_port: Option<u16>,
    protocol: Option<QueryProtocol>,
    direction: Direction,
}

impl Query {
    pub fn src_ip(&self) -> Option<&str> {
        self.src_ip.as_deref()
    }

    pub fn dst_ip(&self) -> Option<&str> {
        self.dst_ip.as_deref()
    }

    pub fn src_port(&self) -> Option<u16> {
        self.src_port
    }

    pub fn dst_port(&self) -> Option<u16> {
        self.dst_port
    }

    pub fn protocol(&self) -> Option<QueryProtocol> {
        self.protocol
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

fn validate_port(field: &str, value: Option<i64>) -> Result<Option<u16>> {
    match value {
        None => Ok(None),
        Some(port) if (1..=65535).contains(&port) => Ok(Some(port as u16)),
        Some(port) => Err(Error::InvalidPort {
            field: field.to_string(),
            value: port.to_string(),
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<QueryParams> for Query {
    type Error = Error;

    fn try_from(params: QueryParams) -> Result<Self> {
        let protocol = non_empty(params.protocol)
            .map(|p| p.parse::<QueryProtocol>())
            .transpose()?;
        let direction = non_empty(params.direction)
            .map(|d| d.parse::<Direction>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            src_ip: non_empty(params.src_ip),
            dst_ip: non_empty(params.dst_ip),
            src_port: validate_port("src_port", params.src_port)?,
            dst_port: validate_port("dst_port", params.dst_port)?,
            protocol,
            direction,
        })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(src) = &self.src_ip {
            parts.push(format!("from {}", src));
            if let Some(port) = self.src_port {
                parts.push(format!(":{}", port));
            }
        }
        if let Some(dst) = &self.dst_ip {
            parts.push(format!("to {}", dst));
            if let Some(port) = self.dst_port {
                parts.push(format!(":{}", port));
            }
        }
        if let Some(protocol) = self.protocol {
            parts.push(format!("proto={}", protocol));
        }
        parts.push(format!("({})", self.direction));
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> QueryParams {
        QueryParams::default()
    }

    #[test]
    fn test_defaults() {
        let query = Query::try_from(params()).unwrap();
        assert_eq!(query.direction(), Direction::In);
        assert_eq!(query.direction().chain_name(), "input");
        assert_eq!(query.protocol(), None);
        assert_eq!(query.to_string(), "(in)");
    }

    #[test]
    fn test_port_bounds() {
        for bad in [0, -1, 65536, 70000] {
            let result = Query::try_from(QueryParams {
                dst_port: Some(bad),
                ..params()
            });
            assert!(matches!(result, Err(Error::InvalidPort { .. })), "port {}", bad);
        }

        let ok = Query::try_from(QueryParams {
            src_port: Some(1),
            dst_port: Some(65535),
            ..params()
        })
        .unwrap();
        assert_eq!(ok.src_port(), Some(1));
        assert_eq!(ok.dst_port(), Some(65535));
    }

    #[test]
    fn test_protocol_is_normalized() {
        let query = Query::try_from(QueryParams {
            protocol: Some("TCP".into()),
            ..params()
        })
        .unwrap();
        assert_eq!(query.protocol(), Some(QueryProtocol::Tcp));

        let bad = Query::try_from(QueryParams {
            protocol: Some("sctp".into()),
            ..params()
        });
        assert!(matches!(bad, Err(Error::InvalidProtocol(_))));
    }

    #[test]
    fn test_direction_parsing() {
        let query = Query::try_from(QueryParams {
            direction: Some("outbound".into()),
            ..params()
        })
        .unwrap();
        assert_eq!(query.direction(), Direction::Out);
        assert_eq!(query.direction().chain_name(), "output");

        let bad = Query::try_from(QueryParams {
            direction: Some("sideways".into()),
            ..params()
        });
        assert!(matches!(bad, Err(Error::InvalidDirection(_))));
    }

    #[test]
    fn test_display() {
        let query = Query::try_from(QueryParams {
            src_ip: Some("192.168.1.10".into()),
            src_port: Some(5000),
            dst_ip: Some("10.0.0.5".into()),
            dst_port: Some(80),
            protocol: Some("tcp".into()),
            direction: Some("forward".into()),
        })
        .unwrap();
        assert_eq!(
            query.to_string(),
            "from 192.168.1.10 :5000 to 10.0.0.5 :80 proto=tcp (forward)"
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let query: Query = serde_json::from_str(r#"{"dst_port": 22, "protocol": "tcp"}"#).unwrap();
        assert_eq!(query.dst_port(), Some(22));

        assert!(serde_json::from_str::<Query>(r#"{"dst_port": 0}"#).is_err());
    }
}
