//! Block rule derivation.
//!
//! Turns the two site lists into the ordered set of declarative redirect
//! rules the host rule engine installs. Derivation is pure; the result always
//! replaces whatever was installed before.

use serde::{Deserialize, Serialize};

use super::sites::SiteList;

/// Ceiling on dynamic rules imposed by the host rule engine.
pub const MAX_RULES: usize = 50;

/// Page blocked navigations land on.
pub const DEFAULT_REDIRECT_PATH: &str = "/pages/blocked.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    /// `||domain` matches the domain and all of its subdomains.
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleAction {
    Redirect {
        #[serde(rename = "extensionPath")]
        extension_path: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl BlockRule {
    pub fn redirect(id: u32, domain: &str, redirect_path: &str) -> Self {
        Self {
            id,
            priority: 1,
            action: RuleAction::Redirect {
                extension_path: redirect_path.to_string(),
            },
            condition: RuleCondition {
                url_filter: format!("||{domain}"),
                resource_types: vec![ResourceType::MainFrame],
            },
        }
    }

    /// The domain this rule blocks.
    pub fn domain(&self) -> &str {
        self.condition
            .url_filter
            .strip_prefix("||")
            .unwrap_or(&self.condition.url_filter)
    }
}

/// Domains that are blocked: `blacklist - whitelist`, in blacklist order.
/// A domain on both lists is always allowed.
pub fn domains_to_block<'a>(blacklist: &'a SiteList, whitelist: &SiteList) -> Vec<&'a str> {
    blacklist
        .iter()
        .filter(|domain| !whitelist.contains(domain))
        .collect()
}

/// Derive the complete rule set.
///
/// Inactive sessions produce no rules. Past `max_rules` entries are dropped
/// silently; that is the rule engine's ceiling, not an error. `max_rules` never
/// exceeds [`MAX_RULES`].
pub fn derive_rules(
    blacklist: &SiteList,
    whitelist: &SiteList,
    active: bool,
    redirect_path: &str,
    max_rules: usize,
) -> Vec<BlockRule> {
    if !active {
        return Vec::new();
    }

    let max_rules = max_rules.min(MAX_RULES);
    let blocked = domains_to_block(blacklist, whitelist);
    if blocked.len() > max_rules {
        log::debug!(
            "{} domains to block, only the first {max_rules} get rules",
            blocked.len()
        );
    }

    blocked
        .into_iter()
        .take(max_rules)
        .zip(1u32..)
        .map(|(domain, id)| BlockRule::redirect(id, domain, redirect_path))
        .collect()
}
