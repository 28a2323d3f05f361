use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::rule::Rule;

/// Verdict a base chain applies when no rule matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    #[default]
    Accept,
    Drop,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Accept => f.write_str("accept"),
            Policy::Drop => f.write_str("drop"),
        }
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_end_matches(';').to_ascii_lowercase().as_str() {
            "accept" => Ok(Policy::Accept),
            "drop" => Ok(Policy::Drop),
            other => Err(Error::InvalidPolicy(other.to_string())),
        }
    }
}

/// Identity of a table: tables with the same family and name are merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    pub family: String,
    pub name: String,
}

impl TableKey {
    pub fn new(family: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.family, self.name)
    }
}

// Serialized as its display form so it can key a JSON object.
impl Serialize for TableKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Chain {
    pub name: String,
    pub table: String,
    pub family: String,
    #[serde(rename = "type")]
    pub chain_type: Option<String>,
    pub hook: Option<String>,
    pub priority: Option<String>,
    pub policy: Policy,
    pub line_number: usize,
    rules: Vec<Rule>,
}

impl Chain {
    pub fn new(key: &TableKey, name: impl Into<String>, line_number: usize) -> Self {
        Self {
            name: name.into(),
            table: key.name.clone(),
            family: key.family.clone(),
            chain_type: None,
            hook: None,
            priority: None,
            policy: Policy::default(),
            line_number,
            rules: vec![],
        }
    }

    /// Base chains are attached to a netfilter hook
    pub fn is_base_chain(&self) -> bool {
        self.chain_type.is_some() && self.hook.is_some()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Appends in evaluation order
    pub fn push_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetDefinition {
    pub name: String,
    pub table: String,
    pub family: String,
    #[serde(rename = "type")]
    pub set_type: String,
    pub flags: Vec<String>,
    pub elements: Vec<String>,
    pub line_number: usize,
}

impl SetDefinition {
    pub fn new(key: &TableKey, name: impl Into<String>, line_number: usize) -> Self {
        Self {
            name: name.into(),
            table: key.name.clone(),
            family: key.family.clone(),
            set_type: "unknown".to_string(),
            flags: vec![],
            elements: vec![],
            line_number,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub name: String,
    pub family: String,
    pub line_number: usize,
    pub chains: BTreeMap<String, Chain>,
    pub sets: BTreeMap<String, SetDefinition>,
}

impl Table {
    pub fn new(key: &TableKey, line_number: usize) -> Self {
        Self {
            name: key.name.clone(),
            family: key.family.clone(),
            line_number,
            chains: BTreeMap::new(),
            sets: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> TableKey {
        TableKey::new(&self.family, &self.name)
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn rule_count(&self) -> usize {
        self.chains.values().map(Chain::rule_count).sum()
    }

    /// Registers a chain, replacing any earlier chain of the same name.
    /// Returns true when a chain was replaced.
    pub fn insert_chain(&mut self, chain: Chain) -> bool {
        self.chains.insert(chain.name.clone(), chain).is_some()
    }

    /// Registers a set, replacing any earlier set of the same name.
    pub fn insert_set(&mut self, set: SetDefinition) -> bool {
        self.sets.insert(set.name.clone(), set).is_some()
    }

    /// Union with a later block of the same table. Same-named chains and
    /// sets from `other` win; everything else from both sides survives.
    pub fn merge(&mut self, other: Table) {
        for (name, chain) in other.chains {
            if self.chains.insert(name.clone(), chain).is_some() {
                tracing::warn!("Chain {} in table {} redeclared, keeping the later one", name, self.name);
            }
        }
        for (name, set) in other.sets {
            if self.sets.insert(name.clone(), set).is_some() {
                tracing::warn!("Set {} in table {} redeclared, keeping the later one", name, self.name);
            }
        }
    }
}
