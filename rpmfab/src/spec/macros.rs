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
    collections::{BTreeMap, BTreeSet},
    io::Write,
    path::Path,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;

use rpmfab_common::fs;

const DATE_PLACEHOLDER: &str = "@DATE@";
const DATETIME_PLACEHOLDER: &str = "@DATETIME@";
const DATE_FORMAT: &str = "%Y%m%d";
const DATETIME_FORMAT: &str = "%Y%m%d%H%M";

lazy_static! {
    static ref REV_PLACEHOLDER_REGEX: Regex =
        Regex::new(r"@REV([0-9]+)@").expect("Invalid revision placeholder regex");
}

/// Values the placeholders in macro values resolve to.
///
/// Supported placeholders are `@DATE@` (UTC, `YYYYMMDD`), `@DATETIME@`
/// (UTC, `YYYYMMDDHHMM`) and `@REVn@`, the friendly revision of numbered
/// source `n`.
#[derive(Debug, Clone)]
pub struct MacroContext {
    now: DateTime<Utc>,
    revisions: BTreeMap<u32, String>,
}

impl MacroContext {
    pub fn new(now: DateTime<Utc>, revisions: BTreeMap<u32, String>) -> Self {
        Self { now, revisions }
    }

    pub fn substitute(&self, name: &str, value: &str) -> String {
        let mut new_value = value
            .replace(DATETIME_PLACEHOLDER, &self.now.format(DATETIME_FORMAT).to_string())
            .replace(DATE_PLACEHOLDER, &self.now.format(DATE_FORMAT).to_string());

        let placeholders = REV_PLACEHOLDER_REGEX
            .captures_iter(value)
            .map(|captures| (captures[0].to_owned(), captures[1].parse::<u32>().ok()))
            .collect::<BTreeSet<_>>();

        for (placeholder, index) in placeholders {
            match index.and_then(|index| self.revisions.get(&index)) {
                Some(revision) => {
                    new_value = new_value.replace(&placeholder, revision);
                }
                None => {
                    warn!(
                        "Source {} is not supplied, {} in macro \"{}\" is not substituted",
                        placeholder.trim_matches('@').trim_start_matches("REV"),
                        placeholder,
                        name
                    );
                }
            }
        }

        new_value
    }
}

/// Injects `%global` definitions into a spec file.
pub struct SpecMacros;

impl SpecMacros {
    /// Checks whether the spec text refers to macro `name` in any of the
    /// forms `%{name}`, `%{?name}`, `%{!?name}` or `%name`. The conditional
    /// forms also match with a body, as in `%{?name:...}`.
    pub fn is_referenced(content: &str, name: &str) -> bool {
        [
            format!("%{{{}}}", name),
            format!("%{{?{}}}", name),
            format!("%{{?{}:", name),
            format!("%{{!?{}}}", name),
            format!("%{{!?{}:", name),
            format!("%{}", name),
        ]
        .iter()
        .any(|form| content.contains(form.as_str()))
    }

    /// Resolves the macros the spec text refers to, in name order.
    pub fn resolve(
        content: &str,
        macros: &BTreeMap<String, String>,
        context: &MacroContext,
    ) -> BTreeMap<String, String> {
        macros
            .iter()
            .filter(|(name, _)| Self::is_referenced(content, name))
            .map(|(name, value)| (name.to_owned(), context.substitute(name, value)))
            .collect()
    }

    /// Prepends a `%global` line for every referenced macro to the spec
    /// file, returning the names written.
    ///
    /// The file is replaced atomically and left untouched when no macro is
    /// referenced.
    pub fn apply(
        spec_file: &Path,
        macros: &BTreeMap<String, String>,
        context: &MacroContext,
    ) -> Result<Vec<String>> {
        let original = fs::read_to_string(spec_file)?;
        let applicable = Self::resolve(&original, macros, context);
        if applicable.is_empty() {
            return Ok(Vec::new());
        }

        let names = applicable.keys().cloned().collect::<Vec<_>>();
        info!(
            "Adding {} macro(s) to spec file: {}",
            names.len(),
            names.join(", ")
        );
        debug!("Macro values: {:?}", applicable);

        let mut content = String::new();
        for (name, value) in &applicable {
            content.push_str(&format!("%global {} {}\n", name, value));
        }
        content.push('\n');
        content.push_str(&original);

        fs::write_atomic(spec_file, |file| file.write_all(content.as_bytes()))
            .with_context(|| format!("Failed to add macros to {}", spec_file.display()))?;

        Ok(names)
    }
}
