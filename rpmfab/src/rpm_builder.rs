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

use anyhow::{ensure, Context, Result};
use log::info;

use rpmfab_common::fs;

use crate::mock::{BuildMode, ChrootBuilder};

const SRPM_FILE_SUFFIX: &str = ".src.rpm";
const RPM_FILE_SUFFIX: &str = ".rpm";

/// Rebuilds binary packages from a source package.
pub struct RpmBuilder {
    chroot: Box<dyn ChrootBuilder>,
}

impl RpmBuilder {
    pub fn new(chroot: Box<dyn ChrootBuilder>) -> Self {
        Self { chroot }
    }

    /// Returns the binary packages found in `result_dir` afterwards.
    pub fn build(&self, srpm: &Path, result_dir: &Path) -> Result<Vec<PathBuf>> {
        ensure!(
            srpm.to_string_lossy().ends_with(SRPM_FILE_SUFFIX),
            "{} is not a source package",
            srpm.display()
        );
        ensure!(srpm.is_file(), "Cannot find source package {}", srpm.display());
        fs::create_dir_all(result_dir)?;

        info!(
            "Rebuilding {} in {} using chroot {}",
            srpm.display(),
            result_dir.display(),
            self.chroot.name()
        );
        self.chroot
            .build(result_dir, BuildMode::Rebuild { srpm })
            .with_context(|| format!("Failed to rebuild {}", srpm.display()))?;

        let rpms = fs::list_files_by_suffix(
            result_dir,
            RPM_FILE_SUFFIX,
            fs::TraverseOptions { recursive: false },
        )?
        .into_iter()
        .filter(|file| !file.to_string_lossy().ends_with(SRPM_FILE_SUFFIX))
        .collect::<Vec<_>>();
        ensure!(
            !rpms.is_empty(),
            "Cannot find any binary package in {}",
            result_dir.display()
        );

        for rpm in &rpms {
            info!("Built {}", rpm.display());
        }
        Ok(rpms)
    }
}
