//! Focus mode: site lists, block rules and the session state machine.

mod domain;
mod manager;
mod rules;
mod session;
mod sites;

pub use domain::{is_valid_domain, normalize_domain};
pub use manager::{BlockingInfo, FireOutcome, FocusManager, SiteLists};
pub use rules::{
    derive_rules, domains_to_block, BlockRule, ResourceType, RuleAction, RuleCondition,
    DEFAULT_REDIRECT_PATH, MAX_RULES,
};
pub use session::{
    compute_window, BlockMode, ClockTime, SessionPlan, SessionRecord, SessionState,
    SessionStatus, StartRequest, StartSpec,
};
pub use sites::{ListKind, SiteList};
