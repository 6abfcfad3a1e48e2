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

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{bail, ensure, Context, Result};
use clap::{AppSettings, Args, ColorChoice, Parser, Subcommand};

use rpmfab_common::fs;

use super::{CLI_ABOUT, CLI_NAME, CLI_VERSION};

const URI_SCHEME_SEPARATOR: &str = "://";

#[derive(Parser, Debug)]
#[clap(
    bin_name = CLI_NAME,
    version = CLI_VERSION,
    about = CLI_ABOUT,
    arg_required_else_help(true),
    color(ColorChoice::Never),
    disable_help_subcommand(true),
    global_setting(AppSettings::DeriveDisplayOrder),
    term_width(120),
)]
pub struct Arguments {
    /// Command name
    #[clap(subcommand)]
    pub subcommand: SubCommand,

    /// Provide more detailed info
    #[clap(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum SubCommand {
    /// Build a source package from a packaging repository
    Srpm(SrpmArgs),
    /// Rebuild binary packages from a source package
    Rebuild(RebuildArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ChrootArgs {
    /// Mock chroot to use
    #[clap(short = 'r', long)]
    pub chroot: Option<String>,

    /// Mock config file to use instead of a chroot (path or url)
    #[clap(long, value_name = "URI")]
    pub mock_config: Option<String>,

    /// Options to pass to mock
    #[clap(
        long,
        value_name = "OPTS",
        default_value = "",
        allow_hyphen_values = true
    )]
    pub mock_options: String,
}

#[derive(Debug, Clone, Args)]
pub struct SrpmArgs {
    /// Define a macro in the spec file
    #[clap(
        short,
        long = "macro",
        value_name = "KEY=VALUE",
        number_of_values = 1,
        multiple_occurrences = true
    )]
    pub macros: Vec<String>,

    /// Build a tarball for spec file source N from revision control
    #[clap(
        short = 's',
        value_names = &["N", "URL"],
        number_of_values = 2,
        multiple_occurrences = true
    )]
    pub sources: Vec<String>,

    #[clap(flatten)]
    pub chroot: ChrootArgs,

    /// Directory to use as a workspace
    #[clap(short, long)]
    pub workspace: PathBuf,

    /// Directory to place results into
    #[clap(short = 'o', long = "resultdir")]
    pub result_dir: PathBuf,

    /// Packaging repository
    #[clap(value_name = "PKG_REPO")]
    pub pkg_repo: String,
}

#[derive(Debug, Clone, Args)]
pub struct RebuildArgs {
    #[clap(flatten)]
    pub chroot: ChrootArgs,

    /// Directory to place results into
    #[clap(short = 'o', long = "resultdir")]
    pub result_dir: PathBuf,

    /// Source package
    #[clap(value_name = "SRPM")]
    pub srpm: PathBuf,
}

impl Arguments {
    pub fn new() -> Result<Self> {
        let mut args = Self::parse();
        args.normalize()?.check()?;

        Ok(args)
    }

    fn normalize(&mut self) -> Result<&mut Self> {
        match &mut self.subcommand {
            SubCommand::Srpm(args) => {
                args.workspace = fs::normalize(&args.workspace)?;
                args.result_dir = fs::normalize(&args.result_dir)?;
                args.chroot.normalize()?;
            }
            SubCommand::Rebuild(args) => {
                args.result_dir = fs::normalize(&args.result_dir)?;
                args.srpm = fs::normalize(&args.srpm)?;
                args.chroot.normalize()?;
            }
        }

        Ok(self)
    }

    fn check(&self) -> Result<()> {
        match &self.subcommand {
            SubCommand::Srpm(args) => {
                args.chroot.check()?;
                args.macros()?;
                args.sources()?;
            }
            SubCommand::Rebuild(args) => {
                args.chroot.check()?;
                ensure!(
                    args.srpm.is_file(),
                    "Cannot find file {}",
                    args.srpm.display()
                );
            }
        }

        Ok(())
    }
}

impl ChrootArgs {
    fn normalize(&mut self) -> Result<()> {
        if let Some(config) = &mut self.mock_config {
            if !config.contains(URI_SCHEME_SEPARATOR) {
                *config = fs::normalize(config.as_str())?.to_string_lossy().to_string();
            }
        }

        Ok(())
    }

    fn check(&self) -> Result<()> {
        ensure!(
            self.chroot.is_some() != self.mock_config.is_some(),
            "Exactly one of --chroot and --mock-config must be specified"
        );

        Ok(())
    }

    pub fn mock_options(&self) -> Vec<String> {
        self.mock_options
            .split_whitespace()
            .map(String::from)
            .collect()
    }
}

impl SrpmArgs {
    /// Macro definitions, keyed by name. A later definition wins.
    pub fn macros(&self) -> Result<BTreeMap<String, String>> {
        let mut macros = BTreeMap::new();
        for definition in &self.macros {
            let (name, value) = match definition.split_once('=') {
                Some((name, value)) if !name.trim().is_empty() => (name.trim(), value),
                _ => bail!(
                    "Macro definition \"{}\" must have form KEY=VALUE",
                    definition
                ),
            };
            macros.insert(name.to_owned(), value.to_owned());
        }

        Ok(macros)
    }

    /// Numbered source locators, keyed by source index.
    pub fn sources(&self) -> Result<BTreeMap<u32, String>> {
        let mut sources = BTreeMap::new();
        for pair in self.sources.chunks(2) {
            let (index, locator) = match pair {
                [index, locator] => (index, locator),
                _ => bail!("Source {} has no url", pair[0]),
            };
            let index = index
                .parse::<u32>()
                .with_context(|| format!("Invalid source index \"{}\"", index))?;
            ensure!(
                sources.insert(index, locator.to_owned()).is_none(),
                "Source {} is specified more than once",
                index
            );
        }

        Ok(sources)
    }
}

impl std::fmt::Display for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:?}", self))
    }
}
