use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::{is_valid_domain, normalize_domain};
use crate::error::ValidationError;
use crate::storage::keys;

/// Which of the two site lists an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Blacklist,
    Whitelist,
}

impl ListKind {
    pub fn storage_key(self) -> &'static str {
        match self {
            ListKind::Blacklist => keys::BLACKLIST,
            ListKind::Whitelist => keys::WHITELIST,
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKind::Blacklist => write!(f, "blocked"),
            ListKind::Whitelist => write!(f, "allowed"),
        }
    }
}

/// An ordered, duplicate-free list of validated domains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteList(Vec<String>);

impl SiteList {
    /// Normalize and validate every entry. Duplicates collapse onto their
    /// first occurrence; any malformed entry rejects the whole list.
    pub fn parse<I, S>(entries: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for entry in entries {
            let domain = normalize_domain(entry.as_ref());
            if !is_valid_domain(&domain) {
                return Err(ValidationError::InvalidDomain(entry.as_ref().trim().to_string()));
            }
            if !list.contains(&domain) {
                list.0.push(domain);
            }
        }
        Ok(list)
    }

    /// Parse a bulk-edit text block: one domain per line, blank lines ignored.
    pub fn parse_lines(text: &str) -> Result<Self, ValidationError> {
        Self::parse(text.lines().map(str::trim).filter(|l| !l.is_empty()))
    }

    /// Wrap already-stored entries without re-validating them.
    pub fn from_stored(entries: Vec<String>) -> Self {
        let mut list = Self::default();
        for entry in entries {
            if !list.contains(&entry) {
                list.0.push(entry);
            }
        }
        list
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.0.iter().any(|d| d == domain)
    }

    /// Append one domain. Rejects malformed input and duplicates.
    pub fn add(&mut self, input: &str, kind: ListKind) -> Result<&str, ValidationError> {
        let domain = normalize_domain(input);
        if !is_valid_domain(&domain) {
            return Err(ValidationError::InvalidDomain(input.trim().to_string()));
        }
        if self.contains(&domain) {
            return Err(ValidationError::DuplicateSite {
                domain,
                list: kind.to_string(),
            });
        }
        self.0.push(domain);
        Ok(self.0.last().map(String::as_str).unwrap_or_default())
    }

    /// Remove one domain. Returns whether it was present.
    pub fn remove(&mut self, input: &str) -> bool {
        let domain = normalize_domain(input);
        let before = self.0.len();
        self.0.retain(|d| *d != domain);
        self.0.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}
