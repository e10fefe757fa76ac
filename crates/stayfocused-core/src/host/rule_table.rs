use async_trait::async_trait;
use rusqlite::params;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::RuleEnforcer;
use crate::error::HostApiError;
use crate::focus::{BlockRule, MAX_RULES};
use crate::storage::Database;

/// Apply a remove-then-add update to `installed`, all or nothing.
fn apply_update(
    installed: &mut BTreeMap<u32, BlockRule>,
    remove_rule_ids: &[u32],
    add_rules: Vec<BlockRule>,
    max_rules: usize,
) -> Result<(), HostApiError> {
    let mut next = installed.clone();
    for id in remove_rule_ids {
        next.remove(id);
    }
    for rule in add_rules {
        if next.contains_key(&rule.id) {
            return Err(HostApiError::RuleUpdateRejected(format!(
                "rule id {} is already installed",
                rule.id
            )));
        }
        next.insert(rule.id, rule);
    }
    if next.len() > max_rules {
        return Err(HostApiError::RuleLimitExceeded {
            requested: next.len(),
            max: max_rules,
        });
    }
    *installed = next;
    Ok(())
}

/// Dynamic rules persisted in the `dynamic_rules` table, so installed rules
/// survive restarts the way the browser's dynamic rules do.
pub struct RuleTable {
    db: Arc<Database>,
    max_rules: usize,
}

impl RuleTable {
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_limit(db, MAX_RULES)
    }

    /// Table accepting at most `max_rules` rules, capped at [`MAX_RULES`].
    pub fn with_limit(db: Arc<Database>, max_rules: usize) -> Self {
        Self {
            db,
            max_rules: max_rules.min(MAX_RULES),
        }
    }

    fn load(&self) -> Result<BTreeMap<u32, BlockRule>, HostApiError> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, rule_json FROM dynamic_rules ORDER BY id")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        rows.into_iter()
            .map(|(id, json)| Ok((id, serde_json::from_str(&json)?)))
            .collect()
    }
}

#[async_trait]
impl RuleEnforcer for RuleTable {
    async fn update_dynamic_rules(
        &self,
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<BlockRule>,
    ) -> Result<(), HostApiError> {
        let mut installed = self.load()?;
        apply_update(&mut installed, &remove_rule_ids, add_rules, self.max_rules)?;

        let encoded: Vec<(u32, String)> = installed
            .values()
            .map(|rule| Ok((rule.id, serde_json::to_string(rule)?)))
            .collect::<Result<_, serde_json::Error>>()?;

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM dynamic_rules", [])?;
            for (id, json) in &encoded {
                tx.execute(
                    "INSERT INTO dynamic_rules (id, rule_json) VALUES (?1, ?2)",
                    params![id, json],
                )?;
            }
            tx.commit()
        })?;
        Ok(())
    }

    async fn dynamic_rules(&self) -> Result<Vec<BlockRule>, HostApiError> {
        Ok(self.load()?.into_values().collect())
    }
}

/// In-memory rule engine. Can be told to reject the next update.
#[derive(Debug)]
pub struct MemoryRuleEnforcer {
    installed: Mutex<BTreeMap<u32, BlockRule>>,
    max_rules: usize,
    reject_next: Mutex<Option<String>>,
}

impl Default for MemoryRuleEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRuleEnforcer {
    pub fn new() -> Self {
        Self {
            installed: Mutex::new(BTreeMap::new()),
            max_rules: MAX_RULES,
            reject_next: Mutex::new(None),
        }
    }

    /// Make the next `update_dynamic_rules` call fail with `reason`.
    pub fn reject_next_update(&self, reason: &str) {
        if let Ok(mut guard) = self.reject_next.lock() {
            *guard = Some(reason.to_string());
        }
    }

    fn poisoned() -> HostApiError {
        HostApiError::RuleUpdateRejected("rule state mutex poisoned".into())
    }
}

#[async_trait]
impl RuleEnforcer for MemoryRuleEnforcer {
    async fn update_dynamic_rules(
        &self,
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<BlockRule>,
    ) -> Result<(), HostApiError> {
        if let Some(reason) = self.reject_next.lock().map_err(|_| Self::poisoned())?.take() {
            return Err(HostApiError::RuleUpdateRejected(reason));
        }
        let mut installed = self.installed.lock().map_err(|_| Self::poisoned())?;
        apply_update(&mut installed, &remove_rule_ids, add_rules, self.max_rules)?;
        Ok(())
    }

    async fn dynamic_rules(&self) -> Result<Vec<BlockRule>, HostApiError> {
        let installed = self.installed.lock().map_err(|_| Self::poisoned())?;
        Ok(installed.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::DEFAULT_REDIRECT_PATH;

    fn rule(id: u32, domain: &str) -> BlockRule {
        BlockRule::redirect(id, domain, DEFAULT_REDIRECT_PATH)
    }

    #[tokio::test]
    async fn table_persists_rules_in_id_order() {
        let db = Arc::new(Database::open_memory().unwrap());
        let table = RuleTable::new(db.clone());
        table
            .update_dynamic_rules(vec![], vec![rule(2, "b.com"), rule(1, "a.com")])
            .await
            .unwrap();

        let reopened = RuleTable::new(db);
        let ids: Vec<u32> = reopened.dynamic_rules().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn colliding_id_rejects_whole_update() {
        let enforcer = MemoryRuleEnforcer::new();
        enforcer.update_dynamic_rules(vec![], vec![rule(1, "a.com")]).await.unwrap();

        let err = enforcer
            .update_dynamic_rules(vec![], vec![rule(2, "b.com"), rule(1, "c.com")])
            .await
            .unwrap_err();
        assert!(matches!(err, HostApiError::RuleUpdateRejected(_)));
        assert_eq!(enforcer.dynamic_rules().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn limit_is_enforced() {
        let db = Arc::new(Database::open_memory().unwrap());
        let table = RuleTable::with_limit(db, 2);
        let err = table
            .update_dynamic_rules(vec![], vec![rule(1, "a.com"), rule(2, "b.com"), rule(3, "c.com")])
            .await
            .unwrap_err();
        assert_eq!(err, HostApiError::RuleLimitExceeded { requested: 3, max: 2 });
        assert!(table.dynamic_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_then_add_in_one_update() {
        let enforcer = MemoryRuleEnforcer::new();
        enforcer.update_dynamic_rules(vec![], vec![rule(1, "a.com")]).await.unwrap();
        enforcer
            .update_dynamic_rules(vec![1], vec![rule(1, "z.com")])
            .await
            .unwrap();
        let rules = enforcer.dynamic_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].domain(), "z.com");
    }

    #[tokio::test]
    async fn injected_rejection_fires_once() {
        let enforcer = MemoryRuleEnforcer::new();
        enforcer.reject_next_update("quota");
        assert!(enforcer.update_dynamic_rules(vec![], vec![]).await.is_err());
        assert!(enforcer.update_dynamic_rules(vec![], vec![]).await.is_ok());
    }
}
