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
    ops::Deref,
    os::unix::process::ExitStatusExt,
    process::{Child as StdChild, ExitStatus as StdExitStatus},
};

use anyhow::{bail, Context, Result};
use log::trace;

use super::output::{self, LogLevel};

/// Spawned process whose output is being logged.
pub(super) struct Child {
    pub(super) program: String,
    pub(super) log_level: LogLevel,
    pub(super) inner: StdChild,
}

impl Child {
    pub(super) fn wait_with_output(mut self) -> Result<Output> {
        let pid = self.inner.id();
        let (stdout, stderr) = match (self.inner.stdout.take(), self.inner.stderr.take()) {
            (Some(stdout), Some(stderr)) => output::collect(stdout, stderr, self.log_level),
            _ => bail!("Failed to capture output of {} ({})", self.program, pid),
        };

        let status = self
            .inner
            .wait()
            .with_context(|| format!("Failed to wait for {} ({})", self.program, pid))?;
        trace!("Process {} ({}) exited, {}", self.program, pid, status);

        Ok(Output {
            status: ExitStatus {
                pid,
                program: self.program,
                status,
            },
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

pub struct ExitStatus {
    pid: u32,
    program: String,
    status: StdExitStatus,
}

impl ExitStatus {
    /// Exit code, `None` when the process was killed by a signal.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn exit_ok(&self) -> Result<()> {
        match self.status.code() {
            Some(0) => Ok(()),
            Some(code) => bail!(
                "Process {} ({}) exited unsuccessfully, exit_code={}",
                self.program,
                self.pid,
                code
            ),
            None => bail!(
                "Process {} ({}) was killed by signal {}",
                self.program,
                self.pid,
                self.status.signal().unwrap_or_default()
            ),
        }
    }
}

pub struct Output {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Deref for Output {
    type Target = ExitStatus;

    fn deref(&self) -> &Self::Target {
        &self.status
    }
}
