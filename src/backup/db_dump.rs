// pgmanager/src/backup/db_dump.rs
use std::path::Path;

use tracing::debug;

use crate::database::ConnectionParams;
use crate::errors::Result;
use crate::utils::process::{ProcessCommand, ProcessOutput, ProcessRunner};

/// Builds the dump invocation: custom-format archive of `params.database`
/// written to `dest`. `command_line` is the configured dump executable,
/// possibly with a wrapper in front of it.
pub fn dump_command(
    command_line: &str,
    params: &ConnectionParams,
    dest: &Path,
    verbose: bool,
) -> Result<ProcessCommand> {
    let mut command = ProcessCommand::from_command_line(command_line)?;
    command.args.extend(params.client_args());
    command = command
        .arg(format!("--dbname={}", params.database))
        .arg("-Fc")
        .arg("-f")
        .arg(dest.display().to_string());
    if verbose {
        command = command.arg("-v");
    }
    if !params.password.is_empty() {
        command = command.env("PGPASSWORD", params.password.as_str());
    }
    Ok(command)
}

/// Runs the dump. A nonzero exit becomes [`crate::errors::AppError::ProcessExit`].
pub async fn run_dump(
    runner: &dyn ProcessRunner,
    command: &ProcessCommand,
) -> Result<ProcessOutput> {
    let output = runner.run(command).await?.into_checked(&command.program)?;
    for line in output.stdout.lines().chain(output.stderr.lines()) {
        debug!(target: "pgmanager::dump", "{}", line);
    }
    Ok(output)
}
