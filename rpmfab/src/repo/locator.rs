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

use std::fmt::Display;

const QUERY_SEPARATOR: char = '?';
const REF_SEPARATOR: char = '#';
const SCHEME_SEPARATOR: &str = "://";
const BZR_SHORTCUT_PREFIX: &str = "lp:";

/// Repository locator, `[scheme://]host-or-path[?query][#ref]`.
///
/// The query part only serves to carry the reference fragment and is not
/// kept in the url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocator {
    pub url: String,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind<'a> {
    Remote { scheme: &'a str },
    BzrShortcut,
    LocalPath,
}

impl RepoLocator {
    pub fn parse<S: AsRef<str>>(locator: S) -> Self {
        let locator = locator.as_ref();

        let (url, reference) = match locator.split_once(QUERY_SEPARATOR) {
            Some((url, query)) => {
                let reference = query
                    .rsplit_once(REF_SEPARATOR)
                    .map(|(_, reference)| reference);
                (url, reference)
            }
            None => match locator.split_once(REF_SEPARATOR) {
                Some((url, reference)) => (url, Some(reference)),
                None => (locator, None),
            },
        };

        Self {
            url: url.to_owned(),
            reference: reference
                .filter(|reference| !reference.is_empty())
                .map(String::from),
        }
    }

    pub fn kind(&self) -> LocatorKind<'_> {
        if let Some((scheme, _)) = self.url.split_once(SCHEME_SEPARATOR) {
            return LocatorKind::Remote { scheme };
        }
        if self.url.starts_with(BZR_SHORTCUT_PREFIX) {
            return LocatorKind::BzrShortcut;
        }
        LocatorKind::LocalPath
    }
}

impl Display for RepoLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reference {
            Some(reference) => write!(f, "{}#{}", self.url, reference),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Directory name a fresh checkout of `url` is placed in.
pub fn checkout_name(url: &str, strip_suffix: Option<&str>) -> String {
    let base_name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let base_name = base_name
        .strip_prefix(BZR_SHORTCUT_PREFIX)
        .unwrap_or(base_name);

    strip_suffix
        .and_then(|suffix| base_name.strip_suffix(suffix))
        .unwrap_or(base_name)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_url() {
        let locator = RepoLocator::parse("git://example.com/myapp.git");
        assert_eq!(locator.url, "git://example.com/myapp.git");
        assert_eq!(locator.reference, None);
    }

    #[test]
    fn test_parse_ref_fragment() {
        let locator = RepoLocator::parse("git+ssh://example.com/myapp.git#v1.2.0");
        assert_eq!(locator.url, "git+ssh://example.com/myapp.git");
        assert_eq!(locator.reference.as_deref(), Some("v1.2.0"));
    }

    #[test]
    fn test_parse_query_takes_last_fragment() {
        let locator = RepoLocator::parse("git://example.com/repo?a=1#b=2#release-3");
        assert_eq!(locator.url, "git://example.com/repo");
        assert_eq!(locator.reference.as_deref(), Some("release-3"));
    }

    #[test]
    fn test_parse_query_without_fragment() {
        let locator = RepoLocator::parse("git://example.com/repo?branch=main");
        assert_eq!(locator.url, "git://example.com/repo");
        assert_eq!(locator.reference, None);
    }

    #[test]
    fn test_parse_empty_fragment() {
        let locator = RepoLocator::parse("bzr://example.com/trunk#");
        assert_eq!(locator.reference, None);
    }

    #[test]
    fn test_kind() {
        assert_eq!(
            RepoLocator::parse("bzr+ssh://example.com/trunk#42").kind(),
            LocatorKind::Remote { scheme: "bzr+ssh" }
        );
        assert_eq!(
            RepoLocator::parse("lp:myproject").kind(),
            LocatorKind::BzrShortcut
        );
        assert_eq!(
            RepoLocator::parse("../packaging/myapp").kind(),
            LocatorKind::LocalPath
        );
    }

    #[test]
    fn test_display() {
        let locator = RepoLocator::parse("git://example.com/myapp.git#main");
        assert_eq!(locator.to_string(), "git://example.com/myapp.git#main");
    }

    #[test]
    fn test_checkout_name() {
        assert_eq!(
            checkout_name("git://example.com/group/myapp.git", Some(".git")),
            "myapp"
        );
        assert_eq!(
            checkout_name("git://example.com/group/myapp/", Some(".git")),
            "myapp"
        );
        assert_eq!(checkout_name("bzr://example.com/trunk", None), "trunk");
        assert_eq!(checkout_name("lp:myproject", None), "myproject");
    }
}
