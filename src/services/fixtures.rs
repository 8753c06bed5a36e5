//! Rules used to seed a development store: fixed edge cases plus random valid values.

use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::params;
use tracing::{info, warn};

use crate::database::Database;
use crate::models::error::FirewallError;
use crate::models::rule::{RuleMode, RuleType, RuleValue};
use crate::services::validation::is_valid_value;

const DOMAIN_SUFFIXES: [&str; 6] = ["com", "net", "org", "io", "dev", "info"];

pub struct Fixture {
    pub value: RuleValue,
    pub rule_type: RuleType,
    pub mode: RuleMode,
    pub active: bool,
}

fn fixture(value: RuleValue, rule_type: RuleType, mode: RuleMode, active: bool) -> Fixture {
    Fixture {
        value,
        rule_type,
        mode,
        active,
    }
}

pub fn edge_cases() -> Vec<Fixture> {
    use RuleMode::{Blacklist, Whitelist};
    use RuleType::{Ip, Port, Url};

    vec![
        fixture("0.0.0.0".into(), Ip, Blacklist, true),
        fixture("255.255.255.255".into(), Ip, Whitelist, false),
        fixture("1.2.3.4".into(), Ip, Blacklist, true),
        fixture("192.168.0.1".into(), Ip, Whitelist, true),
        fixture(RuleValue::Number(1), Port, Blacklist, true),
        fixture(RuleValue::Number(65535), Port, Whitelist, false),
        fixture(RuleValue::Number(80), Port, Blacklist, true),
        fixture(RuleValue::Number(443), Port, Whitelist, true),
        fixture("localhost.abc".into(), Url, Blacklist, true),
        fixture("127.0.0.1.abc".into(), Url, Whitelist, false),
        fixture("example.com".into(), Url, Blacklist, true),
        fixture("ftp.example.com".into(), Url, Whitelist, true),
    ]
}

/// `per_type` random valid rules of each type with random mode and status.
pub fn random_rules(rng: &mut impl Rng, per_type: usize) -> Vec<Fixture> {
    let mut fixtures = Vec::with_capacity(per_type * 3);
    for rule_type in [RuleType::Ip, RuleType::Port, RuleType::Url] {
        for _ in 0..per_type {
            let value = match rule_type {
                RuleType::Ip => random_ip(rng),
                RuleType::Port => RuleValue::Number(rng.gen_range(1..=65535)),
                RuleType::Url => random_domain(rng),
            };
            let mode = if rng.gen_bool(0.5) {
                RuleMode::Blacklist
            } else {
                RuleMode::Whitelist
            };
            fixtures.push(fixture(value, rule_type, mode, rng.gen_bool(0.5)));
        }
    }
    fixtures
}

fn random_ip(rng: &mut impl Rng) -> RuleValue {
    let first: u8 = rng.gen_range(1..=255);
    let [b, c, d]: [u8; 3] = rng.gen();
    RuleValue::Text(format!("{first}.{b}.{c}.{d}"))
}

fn random_domain(rng: &mut impl Rng) -> RuleValue {
    let len = rng.gen_range(3..=10);
    let label: String = (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
    let suffix = DOMAIN_SUFFIXES.choose(rng).copied().unwrap_or("com");
    RuleValue::Text(format!("{label}.{suffix}"))
}

/// Writes every fixture in one transaction and returns how many rows were new.
/// Rows that already exist keep their id but take the fixture's status.
pub async fn populate(db: &Database, fixtures: Vec<Fixture>) -> Result<usize, FirewallError> {
    let mut rows = Vec::with_capacity(fixtures.len());
    for fixture in fixtures {
        if !is_valid_value(fixture.rule_type, &fixture.value) {
            warn!("Skipping invalid {} fixture: {}", fixture.rule_type.label(), fixture.value);
            continue;
        }
        rows.push((fixture.value.to_stored(), fixture.rule_type, fixture.mode, fixture.active));
    }

    let inserted = db
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut insert = tx.prepare(
                    "INSERT OR IGNORE INTO firewall_rules (value, type, mode, active) VALUES (?1, ?2, ?3, ?4)",
                )?;
                let mut status = tx.prepare(
                    "UPDATE firewall_rules SET active = ?4 WHERE value = ?1 AND type = ?2 AND mode = ?3",
                )?;
                for (value, rule_type, mode, active) in &rows {
                    inserted += insert.execute(params![value, rule_type, mode, active])?;
                    status.execute(params![value, rule_type, mode, active])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await?;

    info!("Inserted {inserted} fixture firewall rules.");
    Ok(inserted)
}

pub async fn populate_edge_cases(db: &Database) -> Result<usize, FirewallError> {
    populate(db, edge_cases()).await
}
