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

use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;

use rpmfab_common::process::Command;

use super::{PackageNvr, SourceKind, SpecParser, SpecSource};

const RPMSPEC_BIN: &str = "rpmspec";
const NVR_QUERY_FORMAT: &str = "%{NAME}|%{VERSION}|%{RELEASE}\\n";
const CHANGELOG_SECTION: &str = "%changelog";

lazy_static! {
    static ref SOURCE_TAG_REGEX: Regex =
        Regex::new(r"(?i)^(source|patch)([0-9]*)\s*:\s*(\S.*)$").expect("Invalid source tag regex");
}

/// Parses `SourceN:`/`PatchN:` tags from spec text.
///
/// Unnumbered tags count as index 0. Parsing stops at `%changelog`, whose
/// free text could otherwise look like a tag.
pub fn parse_source_tags(content: &str) -> Vec<SpecSource> {
    let mut sources = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with(CHANGELOG_SECTION) {
            break;
        }

        let captures = match SOURCE_TAG_REGEX.captures(line) {
            Some(captures) => captures,
            None => continue,
        };
        let kind = match captures[1].to_ascii_lowercase().as_str() {
            "source" => SourceKind::Source,
            _ => SourceKind::Patch,
        };
        let index = match &captures[2] {
            "" => 0,
            digits => match digits.parse::<u32>() {
                Ok(index) => index,
                Err(_) => continue,
            },
        };

        sources.push(SpecSource {
            uri: captures[3].trim().to_owned(),
            index,
            kind,
        });
    }

    sources
}

/// Spec parser backed by `rpmspec`, so sources are seen with all macros expanded.
pub struct RpmSpecParser;

impl SpecParser for RpmSpecParser {
    fn parse_sources(&self, spec_file: &Path) -> Result<Vec<SpecSource>> {
        let output = Command::new(RPMSPEC_BIN)
            .arg("--parse")
            .arg(spec_file)
            .stdout(None)
            .run_with_output()?;
        output
            .exit_ok()
            .with_context(|| format!("Failed to parse spec file {}", spec_file.display()))?;

        Ok(parse_source_tags(&output.stdout))
    }

    fn query_nvr(&self, spec_file: &Path) -> Result<PackageNvr> {
        let output = Command::new(RPMSPEC_BIN)
            .arg("--query")
            .arg("--srpm")
            .arg("--queryformat")
            .arg(NVR_QUERY_FORMAT)
            .arg(spec_file)
            .run_with_output()?;
        output
            .exit_ok()
            .with_context(|| format!("Failed to query spec file {}", spec_file.display()))?;

        parse_nvr(&output.stdout)
            .with_context(|| format!("Failed to parse package info of {}", spec_file.display()))
    }
}

fn parse_nvr(query_result: &str) -> Result<PackageNvr> {
    let line = query_result.lines().next().unwrap_or_default().trim();
    let fields = line.split('|').collect::<Vec<_>>();
    if fields.len() != 3 || fields.iter().any(|field| field.is_empty()) {
        bail!("Unexpected query result \"{}\"", line);
    }

    Ok(PackageNvr {
        name: fields[0].to_owned(),
        version: fields[1].to_owned(),
        release: fields[2].to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC_CONTENT: &str = "\
Name:           myapp
Version:        1.0
Release:        1
Source0:        https://example.com/myapp-1.0.tar.gz
Source:         myapp.conf
SOURCE2 :       extra-data.tar.xz
Patch1:         fix-build.patch
# Source9:      commented.tar.gz
URL:            https://example.com

%description
Test package

%changelog
* Mon Jan 01 2024 Packager <packager@example.com> - 1.0-1
- Source10: mentioned in changelog
";

    #[test]
    fn test_parse_source_tags() {
        let sources = parse_source_tags(SPEC_CONTENT);

        assert_eq!(
            sources,
            vec![
                SpecSource {
                    uri: "https://example.com/myapp-1.0.tar.gz".to_owned(),
                    index: 0,
                    kind: SourceKind::Source,
                },
                SpecSource {
                    uri: "myapp.conf".to_owned(),
                    index: 0,
                    kind: SourceKind::Source,
                },
                SpecSource {
                    uri: "extra-data.tar.xz".to_owned(),
                    index: 2,
                    kind: SourceKind::Source,
                },
                SpecSource {
                    uri: "fix-build.patch".to_owned(),
                    index: 1,
                    kind: SourceKind::Patch,
                },
            ]
        );
    }

    #[test]
    fn test_parse_nvr() {
        let nvr = parse_nvr("myapp|1.0|3.fc40\n").unwrap();
        assert_eq!(nvr.to_string(), "myapp-1.0-3.fc40");

        assert!(parse_nvr("").is_err());
        assert!(parse_nvr("myapp|1.0").is_err());
        assert!(parse_nvr("myapp||1").is_err());
    }
}
