use std::collections::HashSet;

use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

use crate::database::Database;
use crate::models::error::{is_unique_violation, FirewallError};
use crate::models::rule::{
    GroupedRules, Rule, RuleEntry, RuleMode, RuleType, RuleValue, StatusUpdate,
};
use crate::services::validation::is_valid_value;

/// Validates, deduplicates and inserts a batch. Either every value is inserted or none is.
pub async fn add_rules(
    db: &Database,
    values: &[RuleValue],
    rule_type: RuleType,
    mode: RuleMode,
) -> Result<Vec<Rule>, FirewallError> {
    for value in values {
        if !is_valid_value(rule_type, value) {
            warn!("Invalid {}: {value}", rule_type.label());
            return Err(FirewallError::Validation {
                rule_type,
                value: value.to_string(),
            });
        }
    }

    let stored: Vec<String> = values.iter().map(RuleValue::to_stored).collect();

    let inserted = db
        .call(move |conn| {
            let tx = conn.transaction()?;

            let mut seen = HashSet::new();
            for value in &stored {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM firewall_rules WHERE value = ?1 AND type = ?2 AND mode = ?3)",
                    params![value, rule_type, mode],
                    |row| row.get(0),
                )?;
                if exists || !seen.insert(value.as_str()) {
                    return Err(FirewallError::Duplicate {
                        value: value.clone(),
                    });
                }
            }

            let mut inserted = Vec::with_capacity(stored.len());
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO firewall_rules (value, type, mode, active) VALUES (?1, ?2, ?3, 1) RETURNING {}",
                    Rule::COLUMNS
                ))?;
                for value in &stored {
                    let rule = stmt
                        .query_row(params![value, rule_type, mode], Rule::from_row)
                        .map_err(|e| {
                            if is_unique_violation(&e) {
                                FirewallError::Duplicate {
                                    value: value.clone(),
                                }
                            } else {
                                FirewallError::from(e)
                            }
                        })?;
                    inserted.push(rule);
                }
            }

            tx.commit()?;
            Ok(inserted)
        })
        .await
        .inspect_err(|e| {
            if let FirewallError::Duplicate { value } = e {
                warn!("Duplicate {rule_type} {mode} rule: {value}");
            }
        })?;

    debug!("Rules added: {}", inserted.len());
    Ok(inserted)
}

/// Deletes at most one row per value and returns the ids that were actually removed.
pub async fn remove_rules(
    db: &Database,
    values: &[RuleValue],
    rule_type: RuleType,
    mode: RuleMode,
) -> Result<Vec<i64>, FirewallError> {
    let stored: Vec<String> = values.iter().map(RuleValue::to_stored).collect();

    let removed = db
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "DELETE FROM firewall_rules
                 WHERE id = (
                     SELECT id FROM firewall_rules
                     WHERE value = ?1 AND type = ?2 AND mode = ?3
                     LIMIT 1
                 )
                 RETURNING id",
            )?;

            let mut removed = Vec::new();
            for value in &stored {
                if let Some(id) = stmt
                    .query_row(params![value, rule_type, mode], |row| row.get(0))
                    .optional()?
                {
                    removed.push(id);
                }
            }
            Ok(removed)
        })
        .await?;

    debug!("Rules removed: {}", removed.len());
    Ok(removed)
}

/// Every rule grouped by type and mode. Rows with an unknown type or mode are skipped.
pub async fn get_all_rules(db: &Database) -> Result<GroupedRules, FirewallError> {
    db.call(|conn| {
        let mut stmt = conn.prepare("SELECT id, value, type, mode FROM firewall_rules ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut grouped = GroupedRules::default();
        for row in rows {
            let (id, value, rule_type, mode) = row?;
            match (rule_type.parse::<RuleType>(), mode.parse::<RuleMode>()) {
                (Ok(rule_type), Ok(mode)) => grouped.push(rule_type, mode, RuleEntry { id, value }),
                _ => debug!("Skipping rule {id} with type {rule_type:?} and mode {mode:?}"),
            }
        }
        Ok(grouped)
    })
    .await
}

pub async fn update_rule_status(
    db: &Database,
    rule_type: RuleType,
    mode: RuleMode,
    ids: Vec<i64>,
    active: bool,
) -> Result<Vec<Rule>, FirewallError> {
    update_rule_statuses(
        db,
        vec![StatusUpdate {
            rule_type,
            mode,
            ids,
            active,
        }],
    )
    .await
}

/// Applies every group in one transaction. An id whose row does not carry the group's
/// type and mode aborts the whole update and nothing is changed.
pub async fn update_rule_statuses(
    db: &Database,
    updates: Vec<StatusUpdate>,
) -> Result<Vec<Rule>, FirewallError> {
    let updated = db
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut updated = Vec::new();
            {
                let mut stmt = tx.prepare(&format!(
                    "UPDATE firewall_rules SET active = ?1
                     WHERE id = ?2 AND type = ?3 AND mode = ?4
                     RETURNING {}",
                    Rule::COLUMNS
                ))?;

                for update in &updates {
                    for id in &update.ids {
                        let rule = stmt
                            .query_row(
                                params![update.active, id, update.rule_type, update.mode],
                                Rule::from_row,
                            )
                            .optional()?
                            .ok_or_else(|| {
                                FirewallError::NotFound(format!(
                                    "No {} {} rule with id {id}",
                                    update.rule_type, update.mode
                                ))
                            })?;
                        updated.push(rule);
                    }
                }
            }
            tx.commit()?;
            Ok(updated)
        })
        .await?;

    debug!("Rules updated: {}", updated.len());
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    async fn row_count(db: &Database) -> i64 {
        db.call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM firewall_rules", [], |row| row.get(0))?))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_then_list_round_trip() {
        let db = db();
        let added = add_rules(&db, &["8.8.8.8".into()], RuleType::Ip, RuleMode::Blacklist)
            .await
            .unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].value, "8.8.8.8");
        assert_eq!(added[0].rule_type, RuleType::Ip);
        assert!(added[0].active);

        let rules = get_all_rules(&db).await.unwrap();
        assert_eq!(
            rules.ips.blacklist,
            vec![RuleEntry {
                id: added[0].id,
                value: "8.8.8.8".to_string()
            }]
        );
        assert!(rules.ips.whitelist.is_empty());
        assert!(rules.ports.blacklist.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_add_is_rejected() {
        let db = db();
        add_rules(&db, &["8.8.8.8".into()], RuleType::Ip, RuleMode::Blacklist)
            .await
            .unwrap();

        let err = add_rules(&db, &["8.8.8.8".into()], RuleType::Ip, RuleMode::Blacklist)
            .await
            .unwrap_err();
        assert!(matches!(err, FirewallError::Duplicate { ref value } if value == "8.8.8.8"));
        assert_eq!(row_count(&db).await, 1);

        // Same value under the other mode is a different key.
        add_rules(&db, &["8.8.8.8".into()], RuleType::Ip, RuleMode::Whitelist)
            .await
            .unwrap();
        assert_eq!(row_count(&db).await, 2);
    }

    #[tokio::test]
    async fn test_invalid_value_aborts_batch() {
        let db = db();
        let err = add_rules(
            &db,
            &["1.1.1.1".into(), "01.2.3.4".into()],
            RuleType::Ip,
            RuleMode::Blacklist,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FirewallError::Validation { ref value, .. } if value == "01.2.3.4"));
        assert_eq!(row_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_late_duplicate_aborts_batch() {
        let db = db();
        add_rules(&db, &[RuleValue::Number(443)], RuleType::Port, RuleMode::Whitelist)
            .await
            .unwrap();

        let err = add_rules(&db, &[RuleValue::Number(80), RuleValue::Number(443)], RuleType::Port, RuleMode::Whitelist)
            .await
            .unwrap_err();
        assert!(matches!(err, FirewallError::Duplicate { ref value } if value == "443"));
        assert_eq!(row_count(&db).await, 1);

        let err = add_rules(&db, &[RuleValue::Number(81), RuleValue::Number(81)], RuleType::Port, RuleMode::Whitelist)
            .await
            .unwrap_err();
        assert!(matches!(err, FirewallError::Duplicate { .. }));
        assert_eq!(row_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_port_text_is_rejected() {
        let db = db();
        let err = add_rules(&db, &["not_a_number".into()], RuleType::Port, RuleMode::Blacklist)
            .await
            .unwrap_err();
        assert!(matches!(err, FirewallError::Validation { rule_type: RuleType::Port, .. }));
    }

    #[tokio::test]
    async fn test_remove_rules() {
        let db = db();
        let added = add_rules(&db, &["google.com".into(), "test.com".into()], RuleType::Url, RuleMode::Blacklist)
            .await
            .unwrap();

        let removed = remove_rules(&db, &["test.com".into()], RuleType::Url, RuleMode::Blacklist)
            .await
            .unwrap();
        assert_eq!(removed, vec![added[1].id]);

        let rules = get_all_rules(&db).await.unwrap();
        assert_eq!(rules.urls.blacklist.len(), 1);
        assert_eq!(rules.urls.blacklist[0].value, "google.com");
    }

    #[tokio::test]
    async fn test_remove_missing_value_is_empty() {
        let db = db();
        add_rules(&db, &[RuleValue::Number(12345)], RuleType::Port, RuleMode::Blacklist)
            .await
            .unwrap();

        let removed = remove_rules(&db, &["not_a_port".into()], RuleType::Port, RuleMode::Blacklist)
            .await
            .unwrap();
        assert!(removed.is_empty());

        // Wrong mode does not match either.
        let removed = remove_rules(&db, &[RuleValue::Number(12345)], RuleType::Port, RuleMode::Whitelist)
            .await
            .unwrap();
        assert!(removed.is_empty());
        assert_eq!(row_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_get_all_rules_is_idempotent() {
        let db = db();
        add_rules(&db, &["1.2.3.4".into()], RuleType::Ip, RuleMode::Whitelist)
            .await
            .unwrap();
        add_rules(&db, &[RuleValue::Number(80)], RuleType::Port, RuleMode::Blacklist)
            .await
            .unwrap();
        add_rules(&db, &["example.com".into()], RuleType::Url, RuleMode::Whitelist)
            .await
            .unwrap();

        let first = get_all_rules(&db).await.unwrap();
        let second = get_all_rules(&db).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.ports.blacklist[0].value, "80");
        assert_eq!(first.urls.whitelist[0].value, "example.com");
    }

    #[tokio::test]
    async fn test_unknown_rows_are_skipped() {
        let db = db();
        db.call(|conn| {
            conn.execute(
                "INSERT INTO firewall_rules (value, type, mode) VALUES ('x', 'mac', 'blacklist'), ('y', 'ip', 'greylist')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(get_all_rules(&db).await.unwrap(), GroupedRules::default());
    }

    #[tokio::test]
    async fn test_update_rule_status() {
        let db = db();
        let added = add_rules(&db, &[RuleValue::Number(5555)], RuleType::Port, RuleMode::Whitelist)
            .await
            .unwrap();

        let updated = update_rule_status(&db, RuleType::Port, RuleMode::Whitelist, vec![added[0].id], false)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert!(!updated[0].active);
        assert_eq!(updated[0].created_at, added[0].created_at);

        let active: bool = db
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT active FROM firewall_rules WHERE id = ?1",
                    [added[0].id],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert!(!active);
    }

    #[tokio::test]
    async fn test_update_unknown_id_changes_nothing() {
        let db = db();
        let added = add_rules(&db, &[RuleValue::Number(5555)], RuleType::Port, RuleMode::Whitelist)
            .await
            .unwrap();
        let id = added[0].id;

        let err = update_rule_status(&db, RuleType::Port, RuleMode::Whitelist, vec![id, 999_999], false)
            .await
            .unwrap_err();
        assert!(matches!(err, FirewallError::NotFound(_)));

        // Mismatched mode is a miss as well.
        let err = update_rule_status(&db, RuleType::Port, RuleMode::Blacklist, vec![id], false)
            .await
            .unwrap_err();
        assert!(matches!(err, FirewallError::NotFound(_)));

        let active: bool = db
            .call(move |conn| {
                Ok(conn.query_row("SELECT active FROM firewall_rules WHERE id = ?1", [id], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert!(active);
    }

    #[tokio::test]
    async fn test_grouped_update_spans_types() {
        let db = db();
        let ip = add_rules(&db, &["10.10.10.10".into()], RuleType::Ip, RuleMode::Whitelist)
            .await
            .unwrap();
        let url = add_rules(&db, &["update.com".into()], RuleType::Url, RuleMode::Blacklist)
            .await
            .unwrap();

        let updated = update_rule_statuses(
            &db,
            vec![
                StatusUpdate {
                    rule_type: RuleType::Ip,
                    mode: RuleMode::Whitelist,
                    ids: vec![ip[0].id],
                    active: false,
                },
                StatusUpdate {
                    rule_type: RuleType::Url,
                    mode: RuleMode::Blacklist,
                    ids: vec![url[0].id],
                    active: false,
                },
            ],
        )
        .await
        .unwrap();

        let ids: Vec<i64> = updated.iter().map(|rule| rule.id).collect();
        assert_eq!(ids, vec![ip[0].id, url[0].id]);
        assert!(updated.iter().all(|rule| !rule.active));
    }

    #[tokio::test]
    async fn test_timed_out_add_leaves_no_rule() {
        use crate::database::StoreSettings;
        use std::time::Duration;

        let db = Database::new(StoreSettings {
            uri: ":memory:".to_string(),
            retry_interval: Duration::from_millis(1),
            max_retries: 0,
            call_timeout: Duration::from_millis(100),
        });
        db.connect_with_retry().await.unwrap();

        let hold = db.call(|_| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        });
        let add = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            add_rules(&db, &["8.8.8.8".into()], RuleType::Ip, RuleMode::Blacklist).await
        };
        let (held, added) = tokio::join!(hold, add);
        assert!(held.is_ok());
        assert!(matches!(added, Err(FirewallError::StoreUnavailable(_))));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(row_count(&db).await, 0);

        let retried = add_rules(&db, &["8.8.8.8".into()], RuleType::Ip, RuleMode::Blacklist)
            .await
            .unwrap();
        assert_eq!(retried.len(), 1);
    }
}
