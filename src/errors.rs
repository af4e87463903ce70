use std::time::Duration;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start '{program}': {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: BoxError,
    },

    #[error("'{program}' exited with {}\n{output}", exit_label(.code))]
    ProcessExit {
        program: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Storage operation failed: {context}")]
    Storage {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("Backup artifact not found in storage: {0}")]
    NotFound(String),

    #[error("No backup found for '{0}', run the list action to see available backups")]
    NoBackupFound(String),

    #[error("Database '{0}' already exists")]
    DatabaseExistsConflict(String),

    #[error("SQL execution failed ({statement}): {source}")]
    SqlExecution {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid database identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{step} did not finish within {}s", .limit.as_secs())]
    Timeout { step: String, limit: Duration },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl AppError {
    pub fn storage<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AppError::Storage {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn sql(statement: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::SqlExecution {
            statement: statement.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
