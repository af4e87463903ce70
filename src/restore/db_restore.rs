// pgmanager/src/restore/db_restore.rs
use std::path::Path;

use tracing::debug;

use crate::database::ConnectionParams;
use crate::errors::Result;
use crate::utils::process::{ProcessCommand, ProcessOutput, ProcessRunner};

/// Builds the restore invocation loading `archive` into `params.database`.
/// Ownership statements in the archive are skipped so the restored objects
/// belong to the connecting user.
pub fn restore_command(
    command_line: &str,
    params: &ConnectionParams,
    archive: &Path,
    verbose: bool,
) -> Result<ProcessCommand> {
    let mut command = ProcessCommand::from_command_line(command_line)?.arg("--no-owner");
    command.args.extend(params.client_args());
    command = command.arg(format!("--dbname={}", params.database));
    if verbose {
        command = command.arg("-v");
    }
    command = command.arg(archive.display().to_string());
    if !params.password.is_empty() {
        command = command.env("PGPASSWORD", params.password.as_str());
    }
    Ok(command)
}

pub async fn run_restore(
    runner: &dyn ProcessRunner,
    command: &ProcessCommand,
) -> Result<ProcessOutput> {
    let output = runner.run(command).await?.into_checked(&command.program)?;
    for line in output.stdout.lines().chain(output.stderr.lines()) {
        debug!(target: "pgmanager::restore", "{}", line);
    }
    Ok(output)
}
