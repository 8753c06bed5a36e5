//! Per-type syntax checks for rule values.

use crate::models::rule::{RuleType, RuleValue};

pub const PORT_MIN: i64 = 1;
pub const PORT_MAX: i64 = 65535;

/// Width of the `value` column.
pub const MAX_VALUE_LEN: usize = 255;

/// Dotted-quad IPv4 with no leading zeros.
pub fn is_valid_ip(ip: &str) -> bool {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return false;
    }

    parts.iter().all(|part| {
        !part.is_empty()
            && part.bytes().all(|b| b.is_ascii_digit())
            && !(part.len() > 1 && part.starts_with('0'))
            && part.parse::<u8>().is_ok()
    })
}

pub fn is_valid_port(port: i64) -> bool {
    (PORT_MIN..=PORT_MAX).contains(&port)
}

/// Bare domain name such as `example.com`. Schemes and paths are rejected.
pub fn is_valid_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    if url.is_empty() || lower.starts_with("http://") || lower.starts_with("https://") {
        return false;
    }
    if url.contains('/') || url.starts_with('.') || url.ends_with('.') || !url.contains('.') {
        return false;
    }
    if !url
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return false;
    }
    if url.contains("..") {
        return false;
    }

    match url.rsplit('.').next() {
        Some(tld) => tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()),
        None => false,
    }
}

/// Checks that `value` has the shape `rule_type` expects: text for ip/url, an integer for port.
pub fn is_valid_value(rule_type: RuleType, value: &RuleValue) -> bool {
    match (rule_type, value) {
        (RuleType::Ip, RuleValue::Text(s)) => s.len() <= MAX_VALUE_LEN && is_valid_ip(s),
        (RuleType::Url, RuleValue::Text(s)) => s.len() <= MAX_VALUE_LEN && is_valid_url(s),
        (RuleType::Port, RuleValue::Number(n)) => is_valid_port(*n),
        _ => false,
    }
}
