// SPDX-License-Identifier: Mulan PSL v2
/*
 * Copyright (c) 2024 Huawei Technologies Co., Ltd.
 * rpmfab-common is licensed under Mulan PSL v2.
 * You can use this software according to the terms and conditions of the Mulan PSL v2.
 * You may obtain a copy of Mulan PSL v2 at:
 *         http://license.coscl.org.cn/MulanPSL2
 *
 * THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
 * EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
 * MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
 * See the Mulan PSL v2 for more details.
 */

use std::{
    ffi::OsStr,
    fmt::Write,
    path::Path,
    process,
};

use anyhow::{Context, Result};
use log::{debug, Level};

mod child;
mod output;

pub use child::{ExitStatus, Output};

/// External command wrapper.
///
/// The command line is logged before execution and the child's stdout and
/// stderr are forwarded into the log line by line while it runs.
pub struct Command {
    inner: process::Command,
    log_level: output::LogLevel,
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            inner: process::Command::new(program),
            log_level: output::LogLevel::default(),
        }
    }

    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.inner.arg(arg);
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg.as_ref());
        }
        self
    }

    pub fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self {
        self.inner.current_dir(dir);
        self
    }

    pub fn stdout(&mut self, level: Option<Level>) -> &mut Self {
        self.log_level.stdout = level;
        self
    }

    pub fn stderr(&mut self, level: Option<Level>) -> &mut Self {
        self.log_level.stderr = level;
        self
    }

    pub fn program_name(&self) -> String {
        Path::new(self.inner.get_program())
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Shell-like rendering of the command line, for reproducing a failure by hand.
    pub fn command_line(&self) -> String {
        let mut cmdline = self.inner.get_program().to_string_lossy().to_string();
        for arg in self.inner.get_args() {
            let _ = write!(cmdline, " {}", arg.to_string_lossy());
        }
        cmdline
    }

    fn spawn(&mut self) -> Result<child::Child> {
        let program = self.program_name();
        match self.inner.get_current_dir() {
            Some(dir) => debug!("Executing \"{}\" in {}", self.command_line(), dir.display()),
            None => debug!("Executing \"{}\"", self.command_line()),
        }

        let inner = self
            .inner
            .stdin(process::Stdio::null())
            .stdout(process::Stdio::piped())
            .stderr(process::Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", program))?;

        Ok(child::Child {
            program,
            log_level: self.log_level,
            inner,
        })
    }

    /// Runs the command to completion, forwarding its output into the log.
    pub fn run(&mut self) -> Result<ExitStatus> {
        Ok(self.spawn()?.wait_with_output()?.status)
    }

    /// Runs the command to completion and returns its captured output.
    pub fn run_with_output(&mut self) -> Result<Output> {
        self.spawn()?.wait_with_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let mut cmd = Command::new("/usr/bin/mock");
        cmd.args(["-r", "fedora-40-x86_64", "--buildsrpm"]);

        assert_eq!(cmd.program_name(), "mock");
        assert_eq!(
            cmd.command_line(),
            "/usr/bin/mock -r fedora-40-x86_64 --buildsrpm"
        );
    }

    #[test]
    fn test_command_run() {
        let status = Command::new("true").run().unwrap();
        assert!(status.success());
        assert!(status.exit_ok().is_ok());
    }

    #[test]
    fn test_command_run_failure() {
        let status = Command::new("false").run().unwrap();
        assert!(!status.success());
        assert_eq!(status.code(), Some(1));

        let err = status.exit_ok().unwrap_err();
        assert!(err.to_string().contains("exit_code=1"));
    }

    #[test]
    fn test_command_run_with_output() {
        let output = Command::new("sh")
            .arg("-c")
            .arg("echo 0123456789abcdef; echo warning >&2")
            .run_with_output()
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "0123456789abcdef");
        assert_eq!(output.stderr.trim(), "warning");
    }

    #[test]
    fn test_command_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = Command::new("pwd")
            .current_dir(dir.path())
            .run_with_output()
            .unwrap();

        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(output.stdout.trim(), expected.to_string_lossy());
    }

    #[test]
    fn test_command_not_found() {
        let result = Command::new("rpmfab-no-such-program").run();
        assert!(result.is_err());
    }
}
