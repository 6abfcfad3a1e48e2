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

use std::{
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tempfile::TempDir;

use rpmfab_common::fs;

use crate::fetch;

const SYSTEM_CONFIG_DIR: &str = "/etc/mock";
const SITE_DEFAULTS_NAME: &str = "site-defaults.cfg";
const LOGGING_CONFIG_NAME: &str = "logging.ini";

const TEMP_DIR_PREFIX: &str = "rpmfab-";
const CONFIG_FILE_PREFIX: &str = "mock-";
const CONFIG_FILE_SUFFIX: &str = ".cfg";

// Mock rebuilds its root cache when the configuration looks newer than the cache
const CONFIG_FILE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const DEFAULT_SITE_DEFAULTS: &str = "\
# Generated config file
# DO NOT EDIT
config_opts['plugin_conf']['yum_repo_enable'] = True
";

const DEFAULT_LOGGING_CONFIG: &str = "\
[formatters]
keys: detailed,simple

[handlers]
keys: simple_console

[loggers]
keys: root

[formatter_simple]
format: %(levelname)s: %(message)s

[formatter_detailed]
format: %(levelname)s %(filename)s:%(lineno)d:  %(message)s

[handler_simple_console]
class: StreamHandler
args: (sys.stderr,)
formatter: simple
level: INFO

[logger_root]
level: NOTSET
handlers: simple_console
";

/// Temporary mock configuration directory.
///
/// The directory is removed when this value is dropped.
#[derive(Debug)]
pub struct MockConfig {
    temp_dir: TempDir,
    config_file: PathBuf,
}

impl MockConfig {
    /// Builds a configuration directory around the config file at `config_uri`.
    pub fn create(config_uri: &str) -> Result<Self> {
        Self::create_with(config_uri, Path::new(SYSTEM_CONFIG_DIR))
    }

    pub(crate) fn create_with(config_uri: &str, system_config_dir: &Path) -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir()
            .context("Failed to create temporary mock config directory")?;
        let config_dir = temp_dir.path();

        info!("Reading mock config {}", config_uri);
        let config_data = fetch::read_uri(config_uri)
            .with_context(|| format!("Failed to read mock config {}", config_uri))?;

        let (mut file, config_file) = tempfile::Builder::new()
            .prefix(CONFIG_FILE_PREFIX)
            .suffix(CONFIG_FILE_SUFFIX)
            .tempfile_in(config_dir)
            .context("Failed to create temporary mock config")?
            .keep()
            .context("Failed to keep temporary mock config")?;
        file.write_all(&config_data)
            .and_then(|_| file.sync_all())
            .with_context(|| format!("Failed to write {}", config_file.display()))?;
        info!("Created temporary mock config {}", config_file.display());

        Self::install_file(
            system_config_dir,
            config_dir,
            SITE_DEFAULTS_NAME,
            DEFAULT_SITE_DEFAULTS,
        )?;
        Self::install_file(
            system_config_dir,
            config_dir,
            LOGGING_CONFIG_NAME,
            DEFAULT_LOGGING_CONFIG,
        )?;

        let old_time = SystemTime::now() - CONFIG_FILE_AGE;
        for file_name in [SITE_DEFAULTS_NAME, LOGGING_CONFIG_NAME] {
            fs::set_file_mtime(config_dir.join(file_name), old_time)?;
        }
        fs::set_file_mtime(&config_file, old_time)?;

        Ok(Self {
            temp_dir,
            config_file,
        })
    }

    /// Copies the system file `name` into `config_dir`, or writes
    /// `default_content` when the system does not provide one.
    fn install_file(
        system_config_dir: &Path,
        config_dir: &Path,
        name: &str,
        default_content: &str,
    ) -> Result<()> {
        let system_file = system_config_dir.join(name);
        let target_file = config_dir.join(name);

        if system_file.is_file() {
            debug!("Copying {}", system_file.display());
            fs::copy_preserve(&system_file, &target_file)?;
        } else {
            warn!(
                "Cannot find {}, generating default {}",
                system_file.display(),
                name
            );
            fs::write(&target_file, default_content)?;
        }

        Ok(())
    }

    pub fn config_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Chroot name mock resolves to the temporary config file.
    pub fn chroot_name(&self) -> String {
        self.config_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}
