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

const BZR_BIN: &str = "bzr";

#[derive(Debug, Clone)]
pub struct BzrRepo {
    url: String,
    reference: Option<String>,
    tree: Option<PathBuf>,
    revision: Option<String>,
}

impl BzrRepo {
    pub fn new(url: String, reference: Option<String>) -> Self {
        Self {
            url,
            reference,
            tree: None,
            revision: None,
        }
    }

    pub fn local(path: PathBuf, reference: Option<String>) -> Self {
        Self {
            url: path.to_string_lossy().to_string(),
            reference,
            tree: Some(path),
            revision: None,
        }
    }
}

impl Repo for BzrRepo {
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

        let tree = prepare_checkout_dir(dest_dir, &checkout_name(&self.url, None))?;
        let mut cmd = Command::new(BZR_BIN);
        cmd.arg("checkout").arg("-q").arg("--lightweight");
        match &self.reference {
            Some(reference) => {
                info!(
                    "Checking out bzr repository {} rev {} to {}",
                    self.url,
                    reference,
                    tree.display()
                );
                cmd.arg("-r").arg(reference);
            }
            None => {
                info!(
                    "Checking out bzr repository {} to {}",
                    self.url,
                    tree.display()
                );
            }
        }
        cmd.arg(&self.url)
            .arg(&tree)
            .run()?
            .exit_ok()
            .with_context(|| format!("Failed to check out bzr repository {}", self.url))?;

        self.tree = Some(tree);
        Ok(())
    }

    fn record_revision(&mut self) -> Result<()> {
        let tree = self
            .tree
            .as_deref()
            .context("Checkout must precede record_revision")?;

        // A lightweight checkout pinned with -r lags behind its branch
        let output = Command::new(BZR_BIN)
            .arg("revno")
            .arg("-q")
            .arg("--tree")
            .arg(tree)
            .run_with_output()?;
        output
            .exit_ok()
            .with_context(|| format!("Failed to resolve revision of {}", self.url))?;

        let revision = output.stdout.trim().to_owned();
        ensure!(
            !revision.is_empty(),
            "Cannot resolve revision of {}",
            self.url
        );
        match &self.reference {
            Some(reference) => debug!("bzr rev {} is {}", reference, revision),
            None => debug!("bzr tip is {}", revision),
        }

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

        let mut cmd = Command::new(BZR_BIN);
        cmd.arg("export")
            .arg("-q")
            .arg(format!("--root={}", topdir.trim_end_matches('/')));
        if let Some(revision) = self.revision.as_ref().or(self.reference.as_ref()) {
            cmd.arg("-r").arg(revision);
        }
        cmd.arg(&tarball)
            .arg(tree)
            .run()?
            .exit_ok()
            .with_context(|| format!("Failed to create tarball {}", tarball_name))?;

        Ok(tarball)
    }
}
