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
    fmt::Display,
    path::{Path, PathBuf},
};

use anyhow::{bail, Result};
use log::{info, warn};

use rpmfab_common::fs;

mod archive;
mod bzr;
mod git;
mod locator;

pub use bzr::BzrRepo;
pub use git::GitRepo;
pub use locator::{LocatorKind, RepoLocator};

const GIT_METADATA_DIR: &str = ".git";
const BZR_METADATA_DIR: &str = ".bzr";

/// Version control working tree that can be checked out, pinned to a
/// revision and exported as a tarball.
pub trait Repo {
    fn url(&self) -> &str;

    /// Working tree, `None` until checked out.
    fn tree(&self) -> Option<&Path>;

    /// Creates a fresh working tree inside `dest_dir`.
    /// Does nothing when a working tree is already known.
    fn checkout(&mut self, dest_dir: &Path) -> Result<()>;

    fn record_revision(&mut self) -> Result<()>;

    fn revision(&self) -> Option<&str>;

    /// Writes `tarball_name` into `dest_dir`, returning the tarball path.
    fn create_tarball(&self, tarball_name: &str, dest_dir: &Path) -> Result<PathBuf>;

    /// Human readable form of the recorded revision.
    fn friendly_revision(&self) -> Option<String> {
        self.revision().map(String::from)
    }
}

#[derive(Debug, Clone)]
pub enum Repository {
    Git(GitRepo),
    Bzr(BzrRepo),
}

impl Repository {
    /// Builds a repository from a locator string.
    ///
    /// Returns `Ok(None)` for an empty locator. Remote locators are mapped by
    /// scheme, `lp:` shortcuts are bzr branches and anything else must be an
    /// existing local git or bzr working tree.
    pub fn from_locator<S: AsRef<str>>(locator: S) -> Result<Option<Self>> {
        let locator = locator.as_ref().trim();
        if locator.is_empty() {
            return Ok(None);
        }

        let parsed = RepoLocator::parse(locator);
        let (url, reference) = (parsed.url.clone(), parsed.reference.clone());
        let repo = match parsed.kind() {
            LocatorKind::Remote { scheme } => match scheme {
                "git" | "git+ssh" => Self::Git(GitRepo::new(url, reference)),
                "bzr" | "bzr+ssh" => Self::Bzr(BzrRepo::new(url, reference)),
                _ => bail!("Unsupported repository scheme \"{}\"", scheme),
            },
            LocatorKind::BzrShortcut => Self::Bzr(BzrRepo::new(url, reference)),
            LocatorKind::LocalPath => {
                let path = fs::normalize(&url)?;
                if reference.is_some() {
                    warn!(
                        "Reference of local repository {} is ignored, using its current state",
                        path.display()
                    );
                }
                if path.join(BZR_METADATA_DIR).exists() {
                    Self::Bzr(BzrRepo::local(path, reference))
                } else if path.join(GIT_METADATA_DIR).exists() {
                    Self::Git(GitRepo::local(path, reference))
                } else {
                    bail!("Unrecognized local repository {}", path.display());
                }
            }
        };

        Ok(Some(repo))
    }

    fn inner(&self) -> &dyn Repo {
        match self {
            Self::Git(repo) => repo,
            Self::Bzr(repo) => repo,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Repo {
        match self {
            Self::Git(repo) => repo,
            Self::Bzr(repo) => repo,
        }
    }
}

impl Repo for Repository {
    fn url(&self) -> &str {
        self.inner().url()
    }

    fn tree(&self) -> Option<&Path> {
        self.inner().tree()
    }

    fn checkout(&mut self, dest_dir: &Path) -> Result<()> {
        self.inner_mut().checkout(dest_dir)
    }

    fn record_revision(&mut self) -> Result<()> {
        self.inner_mut().record_revision()
    }

    fn revision(&self) -> Option<&str> {
        self.inner().revision()
    }

    fn create_tarball(&self, tarball_name: &str, dest_dir: &Path) -> Result<PathBuf> {
        self.inner().create_tarball(tarball_name, dest_dir)
    }

    fn friendly_revision(&self) -> Option<String> {
        self.inner().friendly_revision()
    }
}

impl Display for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git(repo) => write!(f, "git repository {}", repo.url()),
            Self::Bzr(repo) => write!(f, "bzr repository {}", repo.url()),
        }
    }
}

/// Returns an empty checkout directory for `name` inside `dest_dir`,
/// wiping any leftover from a previous run.
fn prepare_checkout_dir(dest_dir: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty() || name == "." || name == ".." {
        bail!("Cannot derive checkout directory name");
    }

    let tree = dest_dir.join(name);
    if tree.exists() {
        info!("Cleaning directory {}", tree.display());
        fs::remove_dir_all(&tree)?;
    }

    Ok(tree)
}
