pub mod admin;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

use crate::errors::{AppError, Result};

pub use admin::{DatabaseAdmin, PostgresAdmin};

/// Suffix of the scratch database a restore is loaded into before the swap.
pub const SCRATCH_SUFFIX: &str = "_restore";

// PostgreSQL truncates identifiers at 63 bytes.
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]{0,62}$").expect("identifier pattern is valid")
});

/// Connection parameters for one PostgreSQL server and database.
///
/// `Debug` redacts the password so the value can show up in error chains.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "db")]
    pub database: String,
}

fn default_port() -> u16 {
    5432
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionParams {
    /// Same server and credentials, different database.
    pub fn with_database(&self, database: &str) -> Self {
        Self {
            database: database.to_string(),
            ..self.clone()
        }
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }

    /// libpq client flags addressing the server. The database and the
    /// password are passed separately.
    pub fn client_args(&self) -> Vec<String> {
        vec![
            format!("--host={}", self.host),
            format!("--port={}", self.port),
            format!("--username={}", self.user),
        ]
    }

    /// `user@host:port/db` for log lines.
    pub fn redacted(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// Accepts names made of ASCII letters, digits, `_` and `-`, not starting
/// with a digit or `-`, at most 63 bytes.
pub fn validate_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(AppError::InvalidIdentifier(name.to_string()))
    }
}

/// Validated, double-quoted identifier ready to splice into DDL.
pub fn quote_identifier(name: &str) -> Result<String> {
    validate_identifier(name).map(|n| format!("\"{}\"", n))
}

pub fn scratch_database_name(target: &str) -> String {
    format!("{}{}", target, SCRATCH_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams {
            host: "db.internal".to_string(),
            port: 5433,
            user: "app".to_string(),
            password: "s3cret".to_string(),
            database: "app".to_string(),
        }
    }

    #[test]
    fn debug_output_never_contains_the_password() {
        let rendered = format!("{:?}", params());
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
        assert!(!params().redacted().contains("s3cret"));
    }

    #[test]
    fn client_args_carry_no_secret() {
        let args = params().client_args();
        assert_eq!(args, vec!["--host=db.internal", "--port=5433", "--username=app"]);
    }

    #[test]
    fn identifiers_are_allow_listed() {
        for ok in ["app", "app_restore", "_private", "hotel-rule_2", "A1"] {
            assert!(validate_identifier(ok).is_ok(), "{ok} should be accepted");
        }
        let too_long = "a".repeat(64);
        for bad in [
            "",
            "1app",
            "-app",
            "app; DROP DATABASE x",
            "app\"",
            "app db",
            "ünicode",
            too_long.as_str(),
        ] {
            assert!(
                matches!(validate_identifier(bad), Err(AppError::InvalidIdentifier(_))),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(quote_identifier("app").unwrap(), "\"app\"");
    }

    #[test]
    fn scratch_name_follows_the_target() {
        assert_eq!(scratch_database_name("app"), "app_restore");
        assert_eq!(params().with_database("other").database, "other");
        assert_eq!(params().with_database("other").password, "s3cret");
    }
}
