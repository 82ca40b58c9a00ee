// SPDX-License-Identifier: Apache-2.0

//! Driver error classification
//!
//! Driver errors carry no stable codes we can rely on across MySQL/MariaDB
//! versions and transports, so the text is matched against ordered rules. The
//! first rule whose needle occurs (case-insensitively) wins; no match falls
//! back to a generic message that keeps the original error text.

use warden_core::{ConnectionConfig, EngineError};

/// What a rule needs to phrase its message.
pub struct DialTarget<'a> {
    pub host: &'a str,
    pub port: u16,
    pub username: &'a str,
    pub database: &'a str,
}

impl<'a> DialTarget<'a> {
    /// `host` is the address actually dialed, after loopback rewriting.
    pub fn new(config: &'a ConnectionConfig, host: &'a str) -> Self {
        Self {
            host,
            port: config.port,
            username: &config.username,
            database: &config.database,
        }
    }
}

struct Rule {
    needles: &'static [&'static str],
    build: fn(&DialTarget<'_>) -> EngineError,
}

const CONNECT_RULES: &[Rule] = &[
    Rule {
        needles: &["connection refused"],
        build: |t| {
            EngineError::connection_failed(format!(
                "connection refused: MySQL server is not running on {}:{}, or the port is blocked by a firewall",
                t.host, t.port
            ))
        },
    },
    Rule {
        needles: &["access denied"],
        build: |t| {
            EngineError::auth_failed(format!(
                "access denied: incorrect username '{}' or password. Check your credentials",
                t.username
            ))
        },
    },
    Rule {
        needles: &["unknown database"],
        build: |t| {
            EngineError::connection_failed(format!(
                "unknown database '{}': the database does not exist. Create it first or use a different database name",
                t.database
            ))
        },
    },
    Rule {
        needles: &["timeout", "timed out"],
        build: |t| {
            EngineError::connection_failed(format!(
                "connection timeout: could not reach {}:{} within 30 seconds. Check network connectivity",
                t.host, t.port
            ))
        },
    },
];

const LOST_CONNECTION_NEEDLES: &[&str] = &["connection refused", "broken pipe", "connection reset"];

fn matches_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Turns an error raised while dialing into an actionable message.
pub fn classify_connect_error(raw: &str, target: &DialTarget<'_>) -> EngineError {
    let lowered = raw.to_lowercase();
    CONNECT_RULES
        .iter()
        .find(|rule| matches_any(&lowered, rule.needles))
        .map(|rule| (rule.build)(target))
        .unwrap_or_else(|| {
            EngineError::connection_failed(format!("failed to connect to database: {raw}"))
        })
}

/// Turns a failed liveness ping into either "connection lost" or a generic
/// health check failure.
pub fn classify_health_error(raw: &str) -> EngineError {
    if matches_any(&raw.to_lowercase(), LOST_CONNECTION_NEEDLES) {
        EngineError::connection_lost(
            "connection lost: database server is not reachable. Please reconnect",
        )
    } else {
        EngineError::connection_lost(format!("health check failed: {raw}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> DialTarget<'static> {
        DialTarget {
            host: "127.0.0.1",
            port: 3306,
            username: "root",
            database: "shop",
        }
    }

    #[test]
    fn refused_names_dialed_address() {
        let err = classify_connect_error(
            "error communicating with database: Connection refused (os error 111)",
            &target(),
        );
        assert_eq!(err.kind(), "connection_failed");
        assert_eq!(
            err.to_string(),
            "connection refused: MySQL server is not running on 127.0.0.1:3306, or the port is blocked by a firewall"
        );
    }

    #[test]
    fn access_denied_is_authentication_failure() {
        let err = classify_connect_error(
            "error returned from database: 1045 (28000): Access denied for user 'root'@'172.17.0.1' (using password: YES)",
            &target(),
        );
        assert_eq!(err.kind(), "authentication_failed");
        assert!(err.to_string().starts_with("access denied: incorrect username 'root'"));
    }

    #[test]
    fn unknown_database_names_schema() {
        let err = classify_connect_error(
            "error returned from database: 1049 (42000): Unknown database 'shop'",
            &target(),
        );
        assert!(err.to_string().starts_with("unknown database 'shop'"));
    }

    #[test]
    fn pool_timeout_is_a_timeout() {
        let err = classify_connect_error(
            "pool timed out while waiting for an open connection",
            &target(),
        );
        assert!(err.to_string().starts_with("connection timeout: could not reach 127.0.0.1:3306"));
    }

    #[test]
    fn first_matching_rule_wins() {
        // refused comes before timeout in the rule order
        let err = classify_connect_error("connection refused after timeout", &target());
        assert!(err.to_string().starts_with("connection refused"));
    }

    #[test]
    fn unmatched_error_keeps_original_text() {
        let err = classify_connect_error("tls handshake eof", &target());
        assert_eq!(err.to_string(), "failed to connect to database: tls handshake eof");
    }

    #[test]
    fn health_errors() {
        assert_eq!(
            classify_health_error("io error: Broken pipe (os error 32)").to_string(),
            "connection lost: database server is not reachable. Please reconnect"
        );
        assert_eq!(
            classify_health_error("server has gone away").to_string(),
            "health check failed: server has gone away"
        );
    }
}
