use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Syntactic class of a rule value.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Ip,
    Port,
    Url,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Ip => "ip",
            RuleType::Port => "port",
            RuleType::Url => "url",
        }
    }

    /// Human readable name used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            RuleType::Ip => "IP address",
            RuleType::Port => "port",
            RuleType::Url => "URL",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip" => Ok(RuleType::Ip),
            "port" => Ok(RuleType::Port),
            "url" => Ok(RuleType::Url),
            other => Err(format!("unknown rule type: {other}")),
        }
    }
}

/// Policy stance of a rule.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    Blacklist,
    Whitelist,
}

impl RuleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleMode::Blacklist => "blacklist",
            RuleMode::Whitelist => "whitelist",
        }
    }
}

impl fmt::Display for RuleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blacklist" => Ok(RuleMode::Blacklist),
            "whitelist" => Ok(RuleMode::Whitelist),
            other => Err(format!("unknown rule mode: {other}")),
        }
    }
}

macro_rules! impl_sql_text {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

impl_sql_text!(RuleType);
impl_sql_text!(RuleMode);

/// A candidate value as it arrives on the wire: ports are numbers, the rest text.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(untagged)]
pub enum RuleValue {
    Number(i64),
    Text(String),
}

impl RuleValue {
    /// Text form persisted in the `value` column.
    pub fn to_stored(&self) -> String {
        match self {
            RuleValue::Number(n) => n.to_string(),
            RuleValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleValue::Number(n) => write!(f, "{n}"),
            RuleValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RuleValue {
    fn from(value: &str) -> Self {
        RuleValue::Text(value.to_string())
    }
}

/// A persisted rule row.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Rule {
    pub id: i64,
    pub value: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub mode: RuleMode,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

impl Rule {
    pub(crate) const COLUMNS: &'static str = "id, value, type, mode, active, created_at";

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            value: row.get(1)?,
            rule_type: row.get(2)?,
            mode: row.get(3)?,
            active: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct RuleEntry {
    pub id: i64,
    pub value: String,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct ModeBuckets {
    pub blacklist: Vec<RuleEntry>,
    pub whitelist: Vec<RuleEntry>,
}

impl ModeBuckets {
    fn get_mut(&mut self, mode: RuleMode) -> &mut Vec<RuleEntry> {
        match mode {
            RuleMode::Blacklist => &mut self.blacklist,
            RuleMode::Whitelist => &mut self.whitelist,
        }
    }
}

/// All rules partitioned by type, then by mode.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct GroupedRules {
    pub ips: ModeBuckets,
    pub urls: ModeBuckets,
    pub ports: ModeBuckets,
}

impl GroupedRules {
    pub fn push(&mut self, rule_type: RuleType, mode: RuleMode, entry: RuleEntry) {
        let bucket = match rule_type {
            RuleType::Ip => &mut self.ips,
            RuleType::Port => &mut self.ports,
            RuleType::Url => &mut self.urls,
        };
        bucket.get_mut(mode).push(entry);
    }
}

/// One group of a grouped status update.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct StatusUpdate {
    pub rule_type: RuleType,
    pub mode: RuleMode,
    pub ids: Vec<i64>,
    pub active: bool,
}

#[derive(Deserialize, Debug)]
pub struct RulesDTO {
    pub values: Vec<RuleValue>,
    pub mode: RuleMode,
}

#[derive(Serialize, Debug)]
pub struct RulesResponse {
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub mode: RuleMode,
    pub values: Vec<RuleValue>,
    pub status: &'static str,
}

#[derive(Deserialize, Debug)]
pub struct StatusDTO {
    pub ids: Vec<i64>,
    pub mode: RuleMode,
    pub active: bool,
}

#[derive(Deserialize, Debug)]
pub struct UpdateRulesDTO {
    pub ips: Option<StatusDTO>,
    pub urls: Option<StatusDTO>,
    pub ports: Option<StatusDTO>,
}

impl UpdateRulesDTO {
    pub fn into_updates(self) -> Vec<StatusUpdate> {
        [
            (RuleType::Ip, self.ips),
            (RuleType::Url, self.urls),
            (RuleType::Port, self.ports),
        ]
        .into_iter()
        .filter_map(|(rule_type, dto)| {
            dto.map(|dto| StatusUpdate {
                rule_type,
                mode: dto.mode,
                ids: dto.ids,
                active: dto.active,
            })
        })
        .collect()
    }
}

#[derive(Serialize, Debug)]
pub struct UpdatedRulesResponse {
    pub updated: Vec<Rule>,
}
