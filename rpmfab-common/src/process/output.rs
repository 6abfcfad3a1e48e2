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
    io::{self, Read},
    os::unix::io::AsRawFd,
    process::{ChildStderr, ChildStdout},
};

use log::{error, log, Level};
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags},
};

const CHUNK_SIZE: usize = 4096;
const POLL_FOREVER: i32 = -1;

/// Levels child output is logged at, `None` keeps a stream out of the log.
#[derive(Debug, Clone, Copy)]
pub struct LogLevel {
    pub stdout: Option<Level>,
    pub stderr: Option<Level>,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self {
            stdout: Some(Level::Debug),
            stderr: Some(Level::Warn),
        }
    }
}

/// Child pipe that is captured whole and logged line by line.
struct Pipe<R> {
    reader: R,
    level: Option<Level>,
    captured: Vec<u8>,
    line: Vec<u8>,
    open: bool,
}

impl<R: Read + AsRawFd> Pipe<R> {
    fn new(reader: R, level: Option<Level>) -> Self {
        Self {
            reader,
            level,
            captured: Vec::new(),
            line: Vec::new(),
            open: true,
        }
    }

    fn poll_fd(&self) -> PollFd {
        match self.open {
            true => PollFd::new(self.reader.as_raw_fd(), PollFlags::POLLIN),
            false => PollFd::new(-1, PollFlags::empty()),
        }
    }

    fn on_ready(&mut self, revents: PollFlags) {
        let ready = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
        if !self.open || !revents.intersects(ready) {
            return;
        }

        let mut chunk = [0u8; CHUNK_SIZE];
        match self.reader.read(&mut chunk) {
            Ok(0) => self.close(),
            Ok(len) => self.feed(&chunk[..len]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                error!("Failed to read process output, {}", e);
                self.close();
            }
        }
    }

    fn feed(&mut self, data: &[u8]) {
        self.captured.extend_from_slice(data);
        for &byte in data {
            match byte {
                b'\n' => self.flush_line(),
                _ => self.line.push(byte),
            }
        }
    }

    fn flush_line(&mut self) {
        if let Some(level) = self.level {
            if !self.line.is_empty() {
                log!(level, "{}", String::from_utf8_lossy(&self.line));
            }
        }
        self.line.clear();
    }

    fn close(&mut self) {
        self.flush_line();
        self.open = false;
    }
}

/// Reads both pipes of a child until they are closed, returning the
/// captured stdout and stderr.
///
/// Both pipes are polled from the calling thread so neither can fill up
/// and block the child.
pub fn collect(
    stdout: ChildStdout,
    stderr: ChildStderr,
    log_level: LogLevel,
) -> (Vec<u8>, Vec<u8>) {
    let mut stdout = Pipe::new(stdout, log_level.stdout);
    let mut stderr = Pipe::new(stderr, log_level.stderr);

    while stdout.open || stderr.open {
        let mut fds = [stdout.poll_fd(), stderr.poll_fd()];
        match poll(&mut fds, POLL_FOREVER) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(e) => {
                error!("Failed to poll process output, {}", e);
                break;
            }
        }

        let revents = fds.map(|fd| fd.revents().unwrap_or_else(PollFlags::empty));
        stdout.on_ready(revents[0]);
        stderr.on_ready(revents[1]);
    }

    (stdout.captured, stderr.captured)
}
