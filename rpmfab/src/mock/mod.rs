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

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, Level};

use rpmfab_common::process::Command;

mod config;

pub use config::MockConfig;

const MOCK_BIN: &str = "mock";

/// What a chroot build should produce.
#[derive(Debug, Clone, Copy)]
pub enum BuildMode<'a> {
    /// Source package from a spec file and a directory holding its sources.
    BuildSrpm {
        spec_file: &'a Path,
        sources_dir: &'a Path,
    },
    /// Binary packages from a source package.
    Rebuild { srpm: &'a Path },
}

/// Isolated package builder.
///
/// Either the requested artifacts end up in `result_dir` or an error is
/// returned.
pub trait ChrootBuilder {
    fn name(&self) -> &str;

    fn build(&self, result_dir: &Path, mode: BuildMode<'_>) -> Result<()>;
}

pub struct Mock {
    chroot: String,
    options: Vec<String>,
    // Keeps a temporary configuration alive until the builder is dropped
    _config: Option<MockConfig>,
}

impl Mock {
    pub fn new(chroot: String, options: Vec<String>) -> Self {
        Self {
            chroot,
            options,
            _config: None,
        }
    }

    /// Uses a temporary mock configuration instead of a system chroot.
    pub fn with_config(config: MockConfig, options: Vec<String>) -> Self {
        debug!("Using mock config {}", config.config_file().display());

        let mut mock_options = vec![
            "--configdir".to_owned(),
            config.config_dir().to_string_lossy().to_string(),
        ];
        mock_options.extend(options);

        Self {
            chroot: config.chroot_name(),
            options: mock_options,
            _config: Some(config),
        }
    }

    fn command(&self, result_dir: &Path, mode: BuildMode<'_>) -> Command {
        let mut cmd = Command::new(MOCK_BIN);
        cmd.arg("-r")
            .arg(&self.chroot)
            .arg("--resultdir")
            .arg(result_dir)
            .args(&self.options)
            .stdout(Some(Level::Info))
            .stderr(Some(Level::Info));

        match mode {
            BuildMode::BuildSrpm {
                spec_file,
                sources_dir,
            } => {
                cmd.arg("--buildsrpm")
                    .arg("--spec")
                    .arg(spec_file)
                    .arg("--sources")
                    .arg(sources_dir);
            }
            BuildMode::Rebuild { srpm } => {
                cmd.arg("--rebuild").arg(srpm);
            }
        }

        cmd
    }
}

impl ChrootBuilder for Mock {
    fn name(&self) -> &str {
        &self.chroot
    }

    fn build(&self, result_dir: &Path, mode: BuildMode<'_>) -> Result<()> {
        info!(
            "Running mock in {} using chroot {}",
            result_dir.display(),
            self.chroot
        );
        self.command(result_dir, mode)
            .run()?
            .exit_ok()
            .with_context(|| format!("Mock build with chroot {} failed", self.chroot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buildsrpm_command() {
        let mock = Mock::new(
            "fedora-40-x86_64".to_owned(),
            vec!["--no-clean".to_owned(), "--with=tests".to_owned()],
        );
        let cmd = mock.command(
            Path::new("/srv/results"),
            BuildMode::BuildSrpm {
                spec_file: Path::new("/srv/build/myapp/myapp.spec"),
                sources_dir: Path::new("/srv/build/myapp"),
            },
        );

        assert_eq!(
            cmd.command_line(),
            "mock -r fedora-40-x86_64 --resultdir /srv/results --no-clean --with=tests \
             --buildsrpm --spec /srv/build/myapp/myapp.spec --sources /srv/build/myapp"
        );
        assert_eq!(mock.name(), "fedora-40-x86_64");
    }

    #[test]
    fn test_rebuild_command() {
        let mock = Mock::new("epel-9-x86_64".to_owned(), Vec::new());
        let cmd = mock.command(
            Path::new("/srv/results"),
            BuildMode::Rebuild {
                srpm: Path::new("/srv/myapp-1.0-1.src.rpm"),
            },
        );

        assert_eq!(
            cmd.command_line(),
            "mock -r epel-9-x86_64 --resultdir /srv/results --rebuild /srv/myapp-1.0-1.src.rpm"
        );
    }

    #[test]
    fn test_with_config_prepends_configdir() {
        let system_dir = tempfile::tempdir().unwrap();
        let source_dir = tempfile::tempdir().unwrap();
        let config_src = source_dir.path().join("custom.cfg");
        std::fs::write(&config_src, "config_opts['root'] = 'custom'\n").unwrap();

        let config = MockConfig::create_with(&config_src.to_string_lossy(), system_dir.path())
            .unwrap();
        let config_dir = config.config_dir().to_path_buf();
        let chroot = config.chroot_name();

        let mock = Mock::with_config(config, vec!["--no-clean".to_owned()]);
        assert_eq!(mock.name(), chroot);
        assert_eq!(
            mock.options,
            vec![
                "--configdir".to_owned(),
                config_dir.to_string_lossy().to_string(),
                "--no-clean".to_owned()
            ]
        );

        drop(mock);
        assert!(!config_dir.exists());
    }
}
