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

use std::{collections::BTreeMap, process};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{debug, error, info};

use rpmfab_common::fs;

mod args;
mod fetch;
mod logger;
mod mock;
mod repo;
mod rpm_builder;
mod spec;
mod srpm_builder;

#[cfg(test)]
mod test_utils;

use args::{Arguments, ChrootArgs, RebuildArgs, SrpmArgs, SubCommand};
use logger::Logger;
use mock::{ChrootBuilder, Mock, MockConfig};
use repo::Repository;
use rpm_builder::RpmBuilder;
use spec::RpmSpecParser;
use srpm_builder::SrpmBuilder;

pub const CLI_NAME: &str = env!("CARGO_PKG_NAME");
pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CLI_ABOUT: &str = env!("CARGO_PKG_DESCRIPTION");

const SRPM_TOOLS: [&str; 2] = ["mock", "rpmspec"];
const RPM_TOOLS: [&str; 1] = ["mock"];
const GIT_TOOLS: [&str; 2] = ["git", "tar"];
const BZR_TOOLS: [&str; 1] = ["bzr"];

struct Rpmfab {
    args: Arguments,
}

/* Initialization */
impl Rpmfab {
    fn new() -> Result<Self> {
        let args = Arguments::new()?;

        let log_dir = match &args.subcommand {
            SubCommand::Srpm(srpm_args) => &srpm_args.workspace,
            SubCommand::Rebuild(rebuild_args) => &rebuild_args.result_dir,
        };
        fs::create_dir_all(log_dir)?;

        Logger::initialize(log_dir, args.verbose)?;
        debug!("Start with {}", args);

        Ok(Self { args })
    }
}

/* Tool functions */
impl Rpmfab {
    fn check_tools(tools: &[&str]) -> Result<()> {
        for tool in tools {
            let path = which::which(tool)
                .with_context(|| format!("Cannot find required tool \"{}\"", tool))?;
            debug!("Using {}", path.display());
        }

        Ok(())
    }

    fn create_chroot(args: &ChrootArgs) -> Result<Box<dyn ChrootBuilder>> {
        let mock = match (&args.chroot, &args.mock_config) {
            (_, Some(config_uri)) => {
                let config = MockConfig::create(config_uri)
                    .context("Failed to create temporary mock config")?;
                Mock::with_config(config, args.mock_options())
            }
            (Some(chroot), None) => Mock::new(chroot.to_owned(), args.mock_options()),
            (None, None) => bail!("Mock chroot is not specified"),
        };

        Ok(Box::new(mock))
    }

    fn create_repositories(args: &SrpmArgs) -> Result<(Repository, BTreeMap<u32, Repository>)> {
        let pkg_repo = Repository::from_locator(&args.pkg_repo)
            .with_context(|| format!("Invalid packaging repository \"{}\"", args.pkg_repo))?
            .context("Packaging repository is not specified")?;

        let mut sources = BTreeMap::new();
        for (index, locator) in args.sources()? {
            let repo = Repository::from_locator(&locator).with_context(|| {
                format!("Invalid repository \"{}\" for source {}", locator, index)
            })?;
            if let Some(repo) = repo {
                sources.insert(index, repo);
            }
        }

        let mut tools = SRPM_TOOLS.to_vec();
        for repo in std::iter::once(&pkg_repo).chain(sources.values()) {
            match repo {
                Repository::Git(_) => tools.extend(GIT_TOOLS),
                Repository::Bzr(_) => tools.extend(BZR_TOOLS),
            }
        }
        tools.sort_unstable();
        tools.dedup();
        Self::check_tools(&tools)?;

        Ok((pkg_repo, sources))
    }
}

/* Main process */
impl Rpmfab {
    fn build_srpm(&self, args: &SrpmArgs) -> Result<()> {
        let macros = args.macros()?;
        let (pkg_repo, sources) = Self::create_repositories(args)?;
        let chroot = Self::create_chroot(&args.chroot)?;

        info!("Packaging repository: {}", pkg_repo);
        for (index, source) in &sources {
            info!("Source {}: {}", index, source);
        }

        let mut builder = SrpmBuilder::new(pkg_repo, sources, Box::new(RpmSpecParser), chroot);
        let srpm = builder.run(&args.workspace, &args.result_dir, &macros, Utc::now())?;
        info!("Built {}", srpm.display());

        Ok(())
    }

    fn rebuild(&self, args: &RebuildArgs) -> Result<()> {
        Self::check_tools(&RPM_TOOLS)?;
        let chroot = Self::create_chroot(&args.chroot)?;

        RpmBuilder::new(chroot).build(&args.srpm, &args.result_dir)?;
        info!("Rebuild complete, results in {}", args.result_dir.display());

        Ok(())
    }

    fn run(&self) -> Result<()> {
        info!("==============================");
        info!("{}", CLI_ABOUT);
        info!("==============================");

        match &self.args.subcommand {
            SubCommand::Srpm(args) => self.build_srpm(args),
            SubCommand::Rebuild(args) => self.rebuild(args),
        }
    }
}

fn main() {
    let app = match Rpmfab::new() {
        Ok(instance) => instance,
        Err(e) => {
            match Logger::is_inited() {
                false => eprintln!("Error: {:?}", e),
                true => error!("Error: {:?}", e),
            }
            process::exit(-1);
        }
    };

    if let Err(e) = app.run() {
        error!("Error: {:?}", e);
        if let Some(log_file) = Logger::log_file() {
            error!("For more information, please check {}", log_file.display());
        }

        drop(app);
        process::exit(-1);
    }
}
