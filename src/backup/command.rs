use crate::backup::function_path;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use function_name::named;
use itertools::Itertools;
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::process::{Command, Stdio};

/// A single command line argument. Secrets never show up in `Debug` or
/// `Display` output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandArg {
    Plain(String),
    Secret {
        prefix: String,
        secret: RedactedString,
    },
}

impl CommandArg {
    fn to_os_string(&self) -> OsString {
        match self {
            CommandArg::Plain(arg) => arg.into(),
            CommandArg::Secret { prefix, secret } => format!("{prefix}{}", secret.inner()).into(),
        }
    }
}

impl Display for CommandArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandArg::Plain(arg) => write!(f, "{arg}"),
            CommandArg::Secret { prefix, secret } => write!(f, "{prefix}{secret}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    args: Vec<CommandArg>,
}

impl ExternalCommand {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(CommandArg::Plain(arg.into()));
        self
    }

    /// Adds `<prefix><secret>` as one argument, e.g. `--password=...`.
    pub fn secret_arg<S: Into<String>>(mut self, prefix: S, secret: RedactedString) -> Self {
        self.args.push(CommandArg::Secret {
            prefix: prefix.into(),
            secret,
        });
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[CommandArg] {
        &self.args
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.args.iter().map(CommandArg::to_os_string));
        command
    }
}

impl Display for ExternalCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.program)
        } else {
            write!(f, "{} {}", self.program, self.args.iter().join(" "))
        }
    }
}

/// Where the child's standard output goes.
#[derive(Debug)]
pub enum StdoutTarget {
    Capture(File),
    Discard,
}

impl From<File> for StdoutTarget {
    fn from(file: File) -> Self {
        StdoutTarget::Capture(file)
    }
}

impl From<StdoutTarget> for Stdio {
    fn from(target: StdoutTarget) -> Self {
        match target {
            StdoutTarget::Capture(file) => Stdio::from(file),
            StdoutTarget::Discard => Stdio::null(),
        }
    }
}

/// Runs external programs to completion.
///
/// There is no timeout: a hung child blocks the run until it is killed.
pub trait CommandRunner {
    /// Blocks until the child exits. A non-zero exit is reported as
    /// [`Error::ProcessFailed`].
    fn run(&self, command: &ExternalCommand, stdout: StdoutTarget) -> Result<()>;
}

/// Spawns real processes with `std::process::Command`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    #[named]
    fn run(&self, command: &ExternalCommand, stdout: StdoutTarget) -> Result<()> {
        tracing::debug!("Running `{}`", command);
        let status = command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .status()
            .map_err(Error::from)
            .add_msg(format!("Failed to start {:?}", command.program()))
            .add_fn_name(function_path!())?;

        if status.success() {
            tracing::debug!("`{}` finished", command.program());
            Ok(())
        } else {
            tracing::warn!("`{}` exited with {}", command, status);
            Err(Error::ProcessFailed {
                tool: command.program().to_string(),
                code: status.code(),
            })
        }
    }
}
