//! Capture filter expressions.
//!
//! A filter is a comma separated list of terms; a packet passes when any term
//! matches. An empty expression passes everything.
//!
//! | Term | Matches |
//! |------|---------|
//! | `hero.hireHero` | that action, case-insensitive |
//! | `hero.*` | actions starting with `hero.` |
//! | `cmd:1001` | command id 1001 |
//! | `dir:request`, `dir:response` | packets in that direction |
//! | `category:castle` | actions the registry files under that category |

use std::fmt;

use thiserror::Error;

use lyssna_core::Packet;
use lyssna_protocols::Direction;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Invalid command id in '{0}'")]
    CommandId(String),
    #[error("Unknown direction in '{0}'")]
    Direction(String),
    #[error("Empty value in '{0}'")]
    EmptyValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Action(String),
    Prefix(String),
    CommandId(u32),
    Direction(Direction),
    Category(String),
}

impl Term {
    fn parse(term: &str) -> Result<Self, FilterError> {
        if let Some(id) = term.strip_prefix("cmd:") {
            return id
                .trim()
                .parse()
                .map(Term::CommandId)
                .map_err(|_| FilterError::CommandId(term.to_owned()));
        }
        if let Some(direction) = term.strip_prefix("dir:") {
            return match direction.trim().to_lowercase().as_str() {
                "request" | "req" => Ok(Term::Direction(Direction::Request)),
                "response" | "resp" => Ok(Term::Direction(Direction::Response)),
                _ => Err(FilterError::Direction(term.to_owned())),
            };
        }
        if let Some(category) = term.strip_prefix("category:") {
            let category = category.trim();
            if category.is_empty() {
                return Err(FilterError::EmptyValue(term.to_owned()));
            }
            return Ok(Term::Category(category.to_lowercase()));
        }
        if let Some(prefix) = term.strip_suffix('*') {
            return Ok(Term::Prefix(prefix.to_lowercase()));
        }
        Ok(Term::Action(term.to_lowercase()))
    }

    fn matches(&self, packet: &Packet) -> bool {
        let action = packet.action.as_deref();
        match self {
            Term::Action(name) => action.is_some_and(|a| a.eq_ignore_ascii_case(name)),
            Term::Prefix(prefix) => action.is_some_and(|a| a.to_lowercase().starts_with(prefix)),
            Term::CommandId(id) => packet.command_id == Some(*id),
            Term::Direction(direction) => packet.direction == *direction,
            Term::Category(category) => packet
                .category
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(category)),
        }
    }
}

/// Parsed filter expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketFilter {
    expression: String,
    terms: Vec<Term>,
}

impl PacketFilter {
    pub fn parse(expression: &str) -> Result<Self, FilterError> {
        let terms = expression
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Term::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            expression: expression.trim().to_owned(),
            terms,
        })
    }

    /// Filter that passes every packet.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, packet: &Packet) -> bool {
        self.terms.is_empty() || self.terms.iter().any(|t| t.matches(packet))
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl fmt::Display for PacketFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}
