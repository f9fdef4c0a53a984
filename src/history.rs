use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
    string::FromUtf8Error,
};

use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("failed to run {program:?} for {path:?}")]
    Spawn {
        program: OsString,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("git log for {path:?} exited with {status}: {stderr}")]
    Failed {
        path: PathBuf,
        status: ExitStatus,
        stderr: String,
    },

    #[error("git log for {path:?} printed non UTF-8 output")]
    Utf8 {
        path: PathBuf,
        #[source]
        source: FromUtf8Error,
    },
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// Commit history of a single file.
#[derive(Debug, Clone)]
pub(crate) struct FileHistory {
    path: PathBuf,
    program: OsString,
}

impl FileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            program: "git".into(),
        }
    }

    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// `git log -1 --format=%aI -- <file>`, run from the file's directory.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["log", "-1", "--format=%aI", "--"]);
        match (self.path.parent(), self.path.file_name()) {
            (Some(dir), Some(name)) if !dir.as_os_str().is_empty() => {
                cmd.current_dir(dir).arg(name);
            }
            _ => {
                cmd.arg(&self.path);
            }
        }
        cmd
    }

    /// Author date (strict ISO 8601) of the latest commit touching the file.
    /// Empty when the file has no history.
    pub fn last_modified_time(&self) -> Result<String> {
        let mut cmd = self.command();
        debug!("running {cmd:?}");
        let output = cmd.output().map_err(|source| Error::Spawn {
            program: self.program.clone(),
            path: self.path.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(Error::Failed {
                path: self.path.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|source| Error::Utf8 {
            path: self.path.clone(),
            source,
        })?;
        Ok(stdout.trim_end().to_string())
    }
}

/// Where the orchestrator gets last-modified times from.
pub(crate) trait Lookup {
    fn last_modified_time(&self, path: &Path) -> Result<String>;
}

impl<F> Lookup for F
where
    F: Fn(&Path) -> Result<String>,
{
    fn last_modified_time(&self, path: &Path) -> Result<String> {
        self(path)
    }
}

/// Looks files up with a git executable.
#[derive(Debug, Clone)]
pub(crate) struct Git {
    program: OsString,
}

impl Git {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Lookup for Git {
    fn last_modified_time(&self, path: &Path) -> Result<String> {
        FileHistory::new(path)
            .with_program(self.program.clone())
            .last_modified_time()
    }
}
