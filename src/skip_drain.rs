//! Operator policy for skipping drain on some or all instances.

use std::collections::BTreeSet;
use std::str::FromStr;

use thiserror::Error;

use crate::instance::Instance;

/// Which instances should be stopped without draining.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum SkipDrain {
    /// Drain every instance.
    #[default]
    None,
    /// Skip draining for every instance.
    All,
    /// Skip draining for instances in the named groups.
    Groups(BTreeSet<String>),
}

impl SkipDrain {
    /// Parses an operator selector.
    ///
    /// An empty selector drains everything, `*` or `all` skips everything,
    /// and a comma separated list names the instance groups to skip.
    ///
    /// # Errors
    ///
    /// Returns [`SkipDrainError::EmptyGroup`] when a list entry is blank.
    pub fn parse(selector: &str) -> Result<Self, SkipDrainError> {
        let trimmed = selector.trim();
        if trimmed.is_empty() {
            return Ok(Self::None);
        }
        Self::from_entries(trimmed.split(','))
    }

    /// Builds a policy from selector entries that were already split apart,
    /// such as a list in a configuration file.
    ///
    /// A single `*` or `all` entry skips everything; otherwise every entry
    /// names an instance group. An empty list drains everything.
    ///
    /// # Errors
    ///
    /// Returns [`SkipDrainError::EmptyGroup`] when an entry is blank.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, SkipDrainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut groups = BTreeSet::new();
        for (position, entry) in entries.into_iter().enumerate() {
            let name = entry.as_ref().trim();
            if name.is_empty() {
                return Err(SkipDrainError::EmptyGroup { position });
            }
            groups.insert(name.to_owned());
        }

        let wildcard = groups.len() == 1 && groups.first().is_some_and(|name| is_wildcard(name));
        if wildcard {
            return Ok(Self::All);
        }
        if groups.is_empty() {
            return Ok(Self::None);
        }
        Ok(Self::Groups(groups))
    }

    /// Whether draining should be skipped for `instance`.
    #[must_use]
    pub fn applies_to(&self, instance: &Instance) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Groups(groups) => groups.contains(instance.group()),
        }
    }
}

fn is_wildcard(entry: &str) -> bool {
    entry == "*" || entry.eq_ignore_ascii_case("all")
}

impl FromStr for SkipDrain {
    type Err = SkipDrainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Errors raised while parsing a skip-drain selector.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SkipDrainError {
    /// Raised when a comma separated entry is blank.
    #[error("skip-drain entry {position} is empty")]
    EmptyGroup {
        /// Zero-based position of the blank entry.
        position: usize,
    },
}
