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
use log::debug;

use rpmfab_common::{fs, process::Command};

const GIT_BIN: &str = "git";
const TAR_BIN: &str = "tar";

const MAIN_ARCHIVE_NAME: &str = "archive.tar";
const SUBMODULE_LIST_SCRIPT: &str = "echo \"$displaypath\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    pub fn from_file_name(file_name: &str) -> Self {
        if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
            Self::Gzip
        } else if file_name.ends_with(".tar.bz2") || file_name.ends_with(".tbz2") {
            Self::Bzip2
        } else if file_name.ends_with(".tar.xz") || file_name.ends_with(".txz") {
            Self::Xz
        } else {
            Self::None
        }
    }

    fn program(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::None => None,
            Self::Gzip => Some(("gzip", "gz")),
            Self::Bzip2 => Some(("bzip2", "bz2")),
            Self::Xz => Some(("xz", "xz")),
        }
    }

    /// Compresses `tar_file` in place, returning the compressed file path.
    fn compress(&self, tar_file: &Path) -> Result<PathBuf> {
        let (program, extension) = match self.program() {
            Some(program) => program,
            None => return Ok(tar_file.to_path_buf()),
        };

        let mut cmd = Command::new(program);
        if *self == Self::Gzip {
            // Keep file name and timestamp out of the gzip header
            cmd.arg("-n");
        }
        cmd.arg("-f").arg(tar_file).run()?.exit_ok()?;

        let mut compressed_file = tar_file.as_os_str().to_os_string();
        compressed_file.push(".");
        compressed_file.push(extension);

        Ok(PathBuf::from(compressed_file))
    }
}

/// Archive top-level directory for a tarball, `myapp-1.0.tar.gz` gives `myapp-1.0/`.
pub fn archive_topdir(tarball_name: &str) -> String {
    let stem = match tarball_name.rsplit_once(".tar") {
        Some((stem, _)) => stem,
        None => [".tgz", ".tbz2", ".txz"]
            .iter()
            .find_map(|ext| tarball_name.strip_suffix(ext))
            .unwrap_or(tarball_name),
    };
    format!("{}/", stem)
}

fn git_archive(work_dir: &Path, prefix: &str, output: &Path) -> Result<()> {
    Command::new(GIT_BIN)
        .arg("archive")
        .arg("--format=tar")
        .arg("--prefix")
        .arg(prefix)
        .arg("-o")
        .arg(output)
        .arg("HEAD")
        .current_dir(work_dir)
        .run()?
        .exit_ok()
}

fn list_submodules(tree: &Path) -> Result<Vec<String>> {
    let output = Command::new(GIT_BIN)
        .arg("submodule")
        .arg("--quiet")
        .arg("foreach")
        .arg("--recursive")
        .arg(SUBMODULE_LIST_SCRIPT)
        .current_dir(tree)
        .run_with_output()?;
    output.exit_ok()?;

    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Archives `HEAD` of a git working tree including all recursive submodules.
///
/// Each submodule is archived separately under `<topdir><submodule path>/`
/// and appended to the superproject archive, since `git archive` alone
/// leaves submodule directories empty.
pub fn create_git_archive(tree: &Path, topdir: &str, tarball: &Path) -> Result<()> {
    let tarball_name = fs::file_name(tarball).to_string_lossy().to_string();
    let output_dir = tarball.parent().unwrap_or_else(|| Path::new("."));
    let temp_dir = tempfile::Builder::new()
        .prefix(".rpmfab-archive-")
        .tempdir_in(output_dir)
        .with_context(|| {
            format!(
                "Failed to create temporary directory in {}",
                output_dir.display()
            )
        })?;

    let main_archive = temp_dir.path().join(MAIN_ARCHIVE_NAME);
    git_archive(tree, topdir, &main_archive)?;

    for (index, submodule) in list_submodules(tree)?.into_iter().enumerate() {
        let sub_prefix = format!("{}{}/", topdir, submodule);
        let sub_archive = temp_dir.path().join(format!("submodule-{}.tar", index));
        debug!("Archiving submodule {} as {}", submodule, sub_prefix);

        git_archive(&tree.join(&submodule), &sub_prefix, &sub_archive)?;
        Command::new(TAR_BIN)
            .arg("--concatenate")
            .arg("--file")
            .arg(&main_archive)
            .arg(&sub_archive)
            .run()?
            .exit_ok()?;
    }

    let compressed = Compression::from_file_name(&tarball_name).compress(&main_archive)?;
    fs::rename(compressed, tarball)?;

    Ok(())
}
