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

use rpmfab_common::fs;

use crate::fetch;

mod macros;
mod rpmspec;

pub use macros::{MacroContext, SpecMacros};
pub use rpmspec::{parse_source_tags, RpmSpecParser};

pub const SPEC_FILE_SUFFIX: &str = ".spec";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Source,
    Patch,
}

/// A numbered `SourceN`/`PatchN` declaration, after macro expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSource {
    pub uri: String,
    pub index: u32,
    pub kind: SourceKind,
}

impl SpecSource {
    /// Local file name the source is expected under.
    pub fn file_name(&self) -> String {
        fetch::uri_file_name(&self.uri).to_owned()
    }
}

impl Display for SpecSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.kind {
            SourceKind::Source => "Source",
            SourceKind::Patch => "Patch",
        };
        write!(f, "{}{}: {}", tag, self.index, self.uri)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageNvr {
    pub name: String,
    pub version: String,
    pub release: String,
}

impl Display for PackageNvr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.version, self.release)
    }
}

/// Spec file metadata provider.
pub trait SpecParser {
    /// Declared sources and patches, in declaration order.
    fn parse_sources(&self, spec_file: &Path) -> Result<Vec<SpecSource>>;

    fn query_nvr(&self, spec_file: &Path) -> Result<PackageNvr>;
}

/// Finds the one spec file in the root of `directory`.
pub fn find_spec_file<P: AsRef<Path>>(directory: P) -> Result<PathBuf> {
    let directory = directory.as_ref();
    let mut spec_files = fs::list_files_by_suffix(
        directory,
        SPEC_FILE_SUFFIX,
        fs::TraverseOptions { recursive: false },
    )?;

    match spec_files.len() {
        1 => Ok(spec_files.remove(0)),
        0 => bail!("Cannot find any spec file in {}", directory.display()),
        n => bail!(
            "Found {} spec files in {}, expected exactly one",
            n,
            directory.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_spec_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_spec_file(dir.path())
            .unwrap_err()
            .to_string()
            .contains("Cannot find any spec file"));

        fs::write(dir.path().join("myapp.spec"), "").unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/other.spec"), "").unwrap();
        assert_eq!(
            find_spec_file(dir.path()).unwrap(),
            dir.path().join("myapp.spec")
        );

        fs::write(dir.path().join("other.spec"), "").unwrap();
        assert!(find_spec_file(dir.path())
            .unwrap_err()
            .to_string()
            .contains("Found 2 spec files"));
    }

    #[test]
    fn test_source_file_name() {
        let source = SpecSource {
            uri: "https://example.com/releases/myapp-1.0.tar.gz".to_owned(),
            index: 0,
            kind: SourceKind::Source,
        };
        assert_eq!(source.file_name(), "myapp-1.0.tar.gz");
        assert_eq!(source.to_string(), "Source0: https://example.com/releases/myapp-1.0.tar.gz");

        let source = SpecSource {
            uri: "https://github.com/o/myapp/archive/v1.0.tar.gz#/myapp-1.0.tar.gz".to_owned(),
            index: 1,
            kind: SourceKind::Source,
        };
        assert_eq!(source.file_name(), "myapp-1.0.tar.gz");

        let source = SpecSource {
            uri: "https://example.com/releases/".to_owned(),
            index: 2,
            kind: SourceKind::Source,
        };
        assert_eq!(source.file_name(), "");

        let source = SpecSource {
            uri: "fix-build.patch".to_owned(),
            index: 3,
            kind: SourceKind::Patch,
        };
        assert_eq!(source.file_name(), "fix-build.patch");
    }
}
