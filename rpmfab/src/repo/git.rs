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
use log::{debug, info};

use rpmfab_common::process::Command;

use super::{archive, locator::checkout_name, prepare_checkout_dir, Repo};

const GIT_BIN: &str = "git";
const GIT_URL_SUFFIX: &str = ".git";
const FRIENDLY_REVISION_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct GitRepo {
    url: String,
    reference: Option<String>,
    tree: Option<PathBuf>,
    revision: Option<String>,
}

impl GitRepo {
    pub fn new(url: String, reference: Option<String>) -> Self {
        Self {
            url,
            reference,
            tree: None,
            revision: None,
        }
    }

    /// Wraps an existing working tree, which is used as is.
    pub fn local(path: PathBuf, reference: Option<String>) -> Self {
        Self {
            url: path.to_string_lossy().to_string(),
            reference,
            tree: Some(path),
            revision: None,
        }
    }

    fn git(tree: &Path) -> Command {
        let mut cmd = Command::new(GIT_BIN);
        cmd.current_dir(tree);
        cmd
    }
}

impl Repo for GitRepo {
    fn url(&self) -> &str {
        &self.url
    }

    fn tree(&self) -> Option<&Path> {
        self.tree.as_deref()
    }

    fn checkout(&mut self, dest_dir: &Path) -> Result<()> {
        if self.tree.is_some() {
            return Ok(());
        }

        let tree = prepare_checkout_dir(dest_dir, &checkout_name(&self.url, Some(GIT_URL_SUFFIX)))?;
        info!("Cloning git repository {} to {}", self.url, tree.display());
        Command::new(GIT_BIN)
            .arg("clone")
            .arg("-q")
            .arg("--recursive")
            .arg(&self.url)
            .arg(&tree)
            .run()?
            .exit_ok()
            .with_context(|| format!("Failed to clone git repository {}", self.url))?;

        if let Some(reference) = &self.reference {
            info!("Checking out ref {}", reference);
            Self::git(&tree)
                .arg("checkout")
                .arg("-q")
                .arg(reference)
                .run()?
                .exit_ok()
                .with_context(|| format!("Failed to check out ref {}", reference))?;
            Self::git(&tree)
                .arg("submodule")
                .arg("update")
                .arg("-q")
                .arg("--init")
                .arg("--recursive")
                .run()?
                .exit_ok()
                .context("Failed to update git submodules")?;
        }

        self.tree = Some(tree);
        Ok(())
    }

    fn record_revision(&mut self) -> Result<()> {
        let tree = self
            .tree
            .as_deref()
            .context("Checkout must precede record_revision")?;

        let output = Self::git(tree).arg("rev-parse").arg("HEAD").run_with_output()?;
        output
            .exit_ok()
            .with_context(|| format!("Failed to resolve revision of {}", self.url))?;

        let revision = output.stdout.trim().to_owned();
        ensure!(
            !revision.is_empty(),
            "Cannot resolve revision of {}",
            self.url
        );
        debug!(
            "git ref {} is {}",
            self.reference.as_deref().unwrap_or("HEAD"),
            revision
        );

        self.revision = Some(revision);
        Ok(())
    }

    fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    fn create_tarball(&self, tarball_name: &str, dest_dir: &Path) -> Result<PathBuf> {
        let tree = self
            .tree
            .as_deref()
            .context("Checkout must precede create_tarball")?;

        let topdir = archive::archive_topdir(tarball_name);
        let tarball = dest_dir.join(tarball_name);
        debug!("Creating tarball {}", tarball.display());

        archive::create_git_archive(tree, &topdir, &tarball)
            .with_context(|| format!("Failed to create tarball {}", tarball_name))?;

        Ok(tarball)
    }

    fn friendly_revision(&self) -> Option<String> {
        self.revision
            .as_ref()
            .map(|revision| revision.chars().take(FRIENDLY_REVISION_LEN).collect())
    }
}
