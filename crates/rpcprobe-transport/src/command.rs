//! Command line of the child process

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Executable plus arguments for the child process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    /// Path or name of the executable
    pub program: String,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Extra environment variables
    pub env: HashMap<String, String>,

    /// Start from an empty environment instead of inheriting the parent's
    pub clear_env: bool,

    /// Working directory, inherited when `None`
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Create a command with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            clear_env: false,
            current_dir: None,
        }
    }

    /// Build from an argv vector (`argv[0]` is the program)
    ///
    /// Returns `None` for an empty vector.
    pub fn from_argv<I, S>(argv: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = argv.into_iter().map(Into::into);
        let program = iter.next()?;
        Some(Self::new(program).with_args(iter))
    }

    /// Add an argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Pass only the variables set with [`CommandSpec::with_env`]
    pub fn with_clear_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Run the child in `dir`
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Render as a shell-like string for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Tokio command with all three streams piped and kill-on-drop set
    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if self.clear_env {
            cmd.env_clear();
        }
        cmd.envs(&self.env);

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_argv() {
        let spec = CommandSpec::from_argv(["node", "build/src/index.js", "--stdio"]).unwrap();
        assert_eq!(spec.program, "node");
        assert_eq!(spec.args, vec!["build/src/index.js", "--stdio"]);
        assert_eq!(spec.display(), "node build/src/index.js --stdio");
    }

    #[test]
    fn test_from_empty_argv() {
        assert!(CommandSpec::from_argv(Vec::<String>::new()).is_none());
    }

    #[test]
    fn test_builder() {
        let spec = CommandSpec::new("server")
            .with_arg("--stdio")
            .with_env("LOG_LEVEL", "debug")
            .with_clear_env()
            .with_current_dir("/tmp");

        assert_eq!(spec.args, vec!["--stdio"]);
        assert_eq!(spec.env.get("LOG_LEVEL"), Some(&"debug".to_string()));
        assert!(spec.clear_env);
        assert_eq!(spec.current_dir, Some(PathBuf::from("/tmp")));
    }
}
