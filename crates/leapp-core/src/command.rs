use std::collections::BTreeMap;
use std::io;
use std::process::Command;

use crate::{CommandError, IpuError, IpuResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub checked: bool,
    pub env: BTreeMap<String, String>,
}

impl CallOptions {
    pub fn checked() -> Self {
        Self {
            checked: true,
            env: BTreeMap::new(),
        }
    }

    pub fn unchecked() -> Self {
        Self {
            checked: false,
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

pub trait CommandRunner {
    fn execute(&self, argv: &[String], env: &BTreeMap<String, String>) -> io::Result<CommandOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn execute(&self, argv: &[String], env: &BTreeMap<String, String>) -> io::Result<CommandOutput> {
        let Some((program, args)) = argv.split_first() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty command line",
            ));
        };

        let output = Command::new(program).args(args).envs(env).output()?;
        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

pub fn run(
    runner: &dyn CommandRunner,
    argv: &[String],
    options: &CallOptions,
) -> IpuResult<CommandOutput> {
    tracing::debug!(command = %argv.join(" "), "running external command");
    let output = runner
        .execute(argv, &options.env)
        .map_err(|source| IpuError::Spawn {
            command: argv.join(" "),
            source,
        })?;

    if options.checked && !output.success() {
        return Err(IpuError::Command(CommandError {
            command: argv.to_vec(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }));
    }
    Ok(output)
}

pub fn run_checked(runner: &dyn CommandRunner, argv: &[String]) -> IpuResult<CommandOutput> {
    run(runner, argv, &CallOptions::checked())
}
