// SPDX-License-Identifier: Mulan PSL v2
/*
 * Copyright (c) 2024 Huawei Technologies Co., Ltd.
 * rpmfab is licensed under Mulan PSL v2.
 * You can use this software according to the terms and conditions of the Mulan PSL v2.
 * You may obtain a copy of Mulan PSL v2 at:
 *         http://license.coscl.org.cn/MulanPSL2
 *
 * THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
 * EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
 * MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
 * See the Mulan PSL v2 for more details.
 */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flexi_logger::{
    DeferredNow, Duplicate, FileSpec, LogSpecification, Logger as FlexiLogger, LoggerHandle,
    WriteMode,
};
use log::{LevelFilter, Record};
use once_cell::sync::OnceCell;

const LOG_FILE_NAME: &str = "rpmfab";
const LOG_FILE_EXT: &str = "log";
const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

static LOGGER: OnceCell<Logger> = OnceCell::new();

/// Process wide logger writing everything into a log file and a summary to stdout.
pub struct Logger {
    _handle: LoggerHandle,
    log_file: PathBuf,
}

impl Logger {
    fn format_log(
        w: &mut dyn std::io::Write,
        now: &mut DeferredNow,
        record: &Record,
    ) -> Result<(), std::io::Error> {
        write!(
            w,
            "{} [{}] {}",
            now.format(LOG_TIME_FORMAT),
            record.level(),
            record.args()
        )
    }

    fn start(log_dir: &Path, verbose: bool) -> Result<Self> {
        let stdout_level = match verbose {
            false => LevelFilter::Info,
            true => LevelFilter::Debug,
        };
        let file_spec = FileSpec::default()
            .directory(log_dir)
            .basename(LOG_FILE_NAME)
            .suffix(LOG_FILE_EXT)
            .use_timestamp(false);
        let log_file = log_dir.join(format!("{}.{}", LOG_FILE_NAME, LOG_FILE_EXT));

        let log_spec = LogSpecification::builder()
            .default(LevelFilter::Trace)
            .build();
        let handle = FlexiLogger::with(log_spec)
            .log_to_file(file_spec)
            .duplicate_to_stdout(Duplicate::from(stdout_level))
            .format(Self::format_log)
            .write_mode(WriteMode::Direct)
            .start()
            .context("Failed to start logger")?;

        Ok(Self {
            _handle: handle,
            log_file,
        })
    }
}

impl Logger {
    /// Logs every record into `<log_dir>/rpmfab.log`. Records at info level,
    /// or debug level when `verbose`, are copied to stdout.
    pub fn initialize<P: AsRef<Path>>(log_dir: P, verbose: bool) -> Result<()> {
        LOGGER.get_or_try_init(|| Self::start(log_dir.as_ref(), verbose))?;
        Ok(())
    }

    pub fn is_inited() -> bool {
        LOGGER.get().is_some()
    }

    pub fn log_file() -> Option<&'static Path> {
        LOGGER.get().map(|logger| logger.log_file.as_path())
    }
}
