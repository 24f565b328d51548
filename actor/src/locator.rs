// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor locator
//!
//! The `locator` module provides the `Locator` type. A locator is the cluster-wide address of an
//! actor: a `/`-delimited path that starts at the reserved root sentinel `-/`, where each segment
//! is the name of an actor. Children append their name to the parent's locator, so `-/bank`
//! is a top level actor and `-/bank/alice` is its child.
//!

use crate::Error;

use serde::{Deserialize, Serialize};

use std::fmt::{Formatter, Result as FmtResult};
use std::str::FromStr;

/// The reserved sentinel for the root of the actor tree.
pub const ROOT_LOCATOR: &str = "-/";

/// Hierarchical, immutable address of an actor within the cluster.
///
/// Segments never contain `/` and are never empty. The root locator has no segments.
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator(Vec<String>);

impl Locator {
    /// The root locator (`-/`).
    pub fn root() -> Self {
        Locator(Vec::new())
    }

    /// Parses a locator string such as `-/bank/alice`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLocator` if the string does not start with the root sentinel or
    /// contains an empty segment.
    ///
    pub fn parse(locator: &str) -> Result<Self, Error> {
        let rest = locator.strip_prefix(ROOT_LOCATOR).ok_or_else(|| {
            Error::InvalidLocator(format!(
                "{} does not start with {}",
                locator, ROOT_LOCATOR
            ))
        })?;
        if rest.is_empty() {
            return Ok(Locator::root());
        }
        let mut segments = Vec::new();
        for segment in rest.split('/') {
            if segment.trim().is_empty() {
                return Err(Error::InvalidLocator(format!(
                    "{} has an empty segment",
                    locator
                )));
            }
            segments.push(segment.to_owned());
        }
        Ok(Locator(segments))
    }

    /// Locator of the child named `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLocator` if the name is empty or contains `/`.
    ///
    pub fn child(&self, name: &str) -> Result<Self, Error> {
        validate_name(name)?;
        let mut segments = self.0.clone();
        segments.push(name.to_owned());
        Ok(Locator(segments))
    }

    /// Locator of the parent, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            let mut segments = self.0.clone();
            segments.truncate(segments.len() - 1);
            Some(Locator(segments))
        }
    }

    /// The actor name (last segment). Empty for the root.
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn level(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_top_level(&self) -> bool {
        self.0.len() == 1
    }

    pub fn is_ancestor_of(&self, other: &Locator) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    pub fn is_descendant_of(&self, other: &Locator) -> bool {
        other.is_ancestor_of(self)
    }

    pub fn is_parent_of(&self, other: &Locator) -> bool {
        other.parent().as_ref() == Some(self)
    }

    pub fn is_child_of(&self, other: &Locator) -> bool {
        self.parent().as_ref() == Some(other)
    }
}

/// Checks an actor name against the addressing rules.
pub(crate) fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::InvalidLocator("actor name is empty".to_owned()));
    }
    if name.contains('/') {
        return Err(Error::InvalidLocator(format!(
            "actor name {} cannot contain /",
            name
        )));
    }
    Ok(())
}

impl FromStr for Locator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locator::parse(s)
    }
}

impl TryFrom<String> for Locator {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Locator::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}{}", ROOT_LOCATOR, self.0.join("/"))
    }
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}{}", ROOT_LOCATOR, self.0.join("/"))
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn parse_root() {
        let locator = Locator::parse("-/").unwrap();
        assert!(locator.is_root());
        assert_eq!(locator.to_string(), "-/");
        assert_eq!(locator.parent(), None);
    }

    #[test]
    fn parse_three_deep() {
        let locator = Locator::parse("-/acme/building/room").unwrap();
        assert_eq!(locator.segments(), ["acme", "building", "room"]);
        assert_eq!(locator.level(), 3);
        assert_eq!(locator.name(), "room");
    }

    #[test]
    fn parse_rejects_missing_sentinel() {
        assert!(Locator::parse("/acme").is_err());
        assert!(Locator::parse("acme").is_err());
    }

    #[test]
    fn parse_rejects_empty_segment() {
        assert!(Locator::parse("-/acme//room").is_err());
        assert!(Locator::parse("-/acme/").is_err());
    }

    #[test]
    fn child_appends_name() {
        let root = Locator::root();
        let bank = root.child("bank").unwrap();
        assert_eq!(bank.to_string(), "-/bank");
        let alice = bank.child("alice").unwrap();
        assert_eq!(alice.to_string(), "-/bank/alice");
        assert!(bank.is_parent_of(&alice));
        assert!(alice.is_child_of(&bank));
        assert!(root.is_ancestor_of(&alice));
        assert!(alice.is_descendant_of(&root));
        assert!(!alice.is_descendant_of(&alice));
    }

    #[test]
    fn child_rejects_slash() {
        let root = Locator::root();
        assert!(matches!(
            root.child("a/b"),
            Err(Error::InvalidLocator(_))
        ));
        assert!(root.child("").is_err());
    }

    #[test]
    fn display_round_trips() {
        let text = "-/acme/building/room/sensor";
        let locator: Locator = text.parse().unwrap();
        assert_eq!(locator.to_string(), text);
        assert_eq!(locator.parent().unwrap().to_string(), "-/acme/building/room");
    }

    #[test]
    fn serde_uses_string_form() {
        let locator = Locator::parse("-/a/b").unwrap();
        let json = serde_json::to_string(&locator).unwrap();
        assert_eq!(json, "\"-/a/b\"");
        let back: Locator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, locator);
        assert!(serde_json::from_str::<Locator>("\"a/b\"").is_err());
    }
}
