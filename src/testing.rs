//! Test doubles shared by the pipeline tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::database::{ConnectionParams, DatabaseAdmin};
use crate::errors::{AppError, Result};
use crate::storage::StorageBackend;
use crate::utils::process::{ProcessCommand, ProcessOutput, ProcessRunner};

pub fn params(database: &str) -> ConnectionParams {
    ConnectionParams {
        host: "localhost".to_string(),
        port: 5432,
        user: "app".to_string(),
        password: "secret".to_string(),
        database: database.to_string(),
    }
}

/// In-memory database server. Database content is a string; the dump
/// executable writes it to the `-f` path and the restore executable loads a
/// file's content into the `--dbname` database.
#[derive(Default)]
pub struct FakeCluster {
    databases: Mutex<BTreeMap<String, String>>,
    calls: Mutex<Vec<String>>,
    dump_exit: i32,
    restore_exit: i32,
    table_count_delay: Option<Duration>,
}

impl FakeCluster {
    pub fn with_databases(databases: &[(&str, &str)]) -> Self {
        let cluster = Self::default();
        {
            let mut map = cluster.databases.lock().unwrap();
            for (name, content) in databases {
                map.insert(name.to_string(), content.to_string());
            }
        }
        cluster
    }

    pub fn failing_dump(mut self, exit_code: i32) -> Self {
        self.dump_exit = exit_code;
        self
    }

    pub fn failing_restore(mut self, exit_code: i32) -> Self {
        self.restore_exit = exit_code;
        self
    }

    /// Makes `table_count` hang for `delay` before answering.
    pub fn slow_table_count(mut self, delay: Duration) -> Self {
        self.table_count_delay = Some(delay);
        self
    }

    pub fn content(&self, db: &str) -> Option<String> {
        self.databases.lock().unwrap().get(db).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.databases.lock().unwrap().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(code: i32, message: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: message.to_string(),
        }
    }
}

fn dbname(command: &ProcessCommand) -> Option<String> {
    command
        .args
        .iter()
        .find_map(|a| a.strip_prefix("--dbname="))
        .map(str::to_string)
}

#[async_trait]
impl ProcessRunner for FakeCluster {
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        let line = command.display_line();
        self.record(format!("run {}", command.program));
        let db = dbname(command).expect("commands always name a database");

        if line.contains("pg_dump") {
            let dest = command.flag_value("-f").expect("dump writes to -f");
            if self.dump_exit != 0 {
                std::fs::write(dest, b"partial")?;
                return Ok(Self::failure(self.dump_exit, "pg_dump: error: connection lost"));
            }
            let content = self.content(&db).unwrap_or_default();
            std::fs::write(dest, content)?;
            return Ok(ProcessOutput {
                exit_code: Some(0),
                ..Default::default()
            });
        }

        let source = command.args.last().expect("restore reads a file");
        if self.restore_exit != 0 {
            return Ok(Self::failure(self.restore_exit, "pg_restore: error: invalid archive"));
        }
        let content = std::fs::read_to_string(source)?;
        self.databases.lock().unwrap().insert(db, content);
        Ok(ProcessOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

#[async_trait]
impl DatabaseAdmin for FakeCluster {
    async fn terminate_connections(&self, db: &str) -> Result<u64> {
        self.record(format!("terminate {}", db));
        Ok(0)
    }

    async fn drop_database(&self, db: &str) -> Result<()> {
        self.record(format!("drop {}", db));
        self.databases.lock().unwrap().remove(db);
        Ok(())
    }

    async fn create_database(&self, db: &str, owner: &str) -> Result<()> {
        self.record(format!("create {} owner {}", db, owner));
        let mut databases = self.databases.lock().unwrap();
        if databases.contains_key(db) {
            return Err(AppError::DatabaseExistsConflict(db.to_string()));
        }
        databases.insert(db.to_string(), String::new());
        Ok(())
    }

    async fn rename_database(&self, from: &str, to: &str) -> Result<()> {
        self.record(format!("rename {} {}", from, to));
        let mut databases = self.databases.lock().unwrap();
        if databases.contains_key(to) {
            return Err(AppError::DatabaseExistsConflict(to.to_string()));
        }
        let content = databases
            .remove(from)
            .ok_or_else(|| AppError::InvalidInput(format!("database {} does not exist", from)))?;
        databases.insert(to.to_string(), content);
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(self.names())
    }

    async fn table_count(&self, db: &str) -> Result<i64> {
        if let Some(delay) = self.table_count_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(match self.content(db) {
            Some(content) if !content.is_empty() => 1,
            _ => 0,
        })
    }
}

/// Wraps a backend, counting calls and optionally failing uploads.
pub struct ProbeStorage<S> {
    inner: S,
    fail_put: bool,
    lists: AtomicUsize,
    puts: AtomicUsize,
    gets: AtomicUsize,
}

impl<S: StorageBackend> ProbeStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_put: false,
            lists: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
        }
    }

    pub fn failing_put(mut self) -> Self {
        self.fail_put = true;
        self
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: StorageBackend> StorageBackend for ProbeStorage<S> {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list(prefix).await
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put {
            let reset = std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            );
            return Err(AppError::storage(format!("upload {}", key), reset));
        }
        self.inner.put(local_path, key).await
    }

    async fn get(&self, key: &str, local_path: &Path) -> Result<()> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key, local_path).await
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}
