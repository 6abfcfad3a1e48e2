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
    fmt::Display,
    path::{Path, PathBuf},
};

use anyhow::{bail, ensure, Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};

use rpmfab_common::fs;

use crate::{
    fetch::{self, Location},
    mock::{BuildMode, ChrootBuilder},
    repo::{Repo, Repository},
    spec::{self, MacroContext, SourceKind, SpecMacros, SpecParser},
};

const BUILD_DIR_NAME: &str = "builddir";
const SRPM_FILE_SUFFIX: &str = ".src.rpm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    Init,
    PkgRepoCheckedOut,
    SourcesResolved,
    MacrosApplied,
    TarballsBuilt,
    SourcesFetched,
    SrpmBuilt,
}

impl Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::PkgRepoCheckedOut => "packaging repository checked out",
            Self::SourcesResolved => "sources resolved",
            Self::MacrosApplied => "macros applied",
            Self::TarballsBuilt => "tarballs built",
            Self::SourcesFetched => "sources fetched",
            Self::SrpmBuilt => "source package built",
        })
    }
}

/// Assembles a source package from a packaging repository and numbered
/// upstream repositories.
///
/// Every step must be called in order, once. A failed step leaves the
/// builder at the last completed stage.
pub struct SrpmBuilder {
    pkg_repo: Repository,
    sources: BTreeMap<u32, Repository>,
    spec_parser: Box<dyn SpecParser>,
    chroot: Box<dyn ChrootBuilder>,
    spec_file: Option<PathBuf>,
    stage: BuildStage,
}

impl SrpmBuilder {
    pub fn new(
        pkg_repo: Repository,
        sources: BTreeMap<u32, Repository>,
        spec_parser: Box<dyn SpecParser>,
        chroot: Box<dyn ChrootBuilder>,
    ) -> Self {
        Self {
            pkg_repo,
            sources,
            spec_parser,
            chroot,
            spec_file: None,
            stage: BuildStage::Init,
        }
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    fn expect_stage(&self, expected: BuildStage, action: &str) -> Result<()> {
        ensure!(
            self.stage == expected,
            "Cannot {} at stage \"{}\", expected stage \"{}\"",
            action,
            self.stage,
            expected
        );
        Ok(())
    }

    /// Packaging tree, which also collects every source file of the build.
    fn work_dir(&self) -> Result<&Path> {
        self.pkg_repo
            .tree()
            .context("Packaging repository is not checked out")
    }

    fn spec_file_path(&self) -> Result<&Path> {
        self.spec_file
            .as_deref()
            .context("Spec file is not located")
    }

    pub fn checkout_packaging_repo(&mut self, build_dir: &Path) -> Result<()> {
        self.expect_stage(BuildStage::Init, "check out packaging repository")?;

        self.pkg_repo
            .checkout(build_dir)
            .with_context(|| format!("Failed to check out {}", self.pkg_repo))?;
        let work_dir = self.work_dir()?;
        info!("Packaging repository checked out to {}", work_dir.display());

        let spec_file = spec::find_spec_file(work_dir)?;
        info!("Using spec file {}", spec_file.display());

        self.spec_file = Some(spec_file);
        self.stage = BuildStage::PkgRepoCheckedOut;
        Ok(())
    }

    pub fn checkout_sources(&mut self, workspace: &Path) -> Result<()> {
        self.expect_stage(BuildStage::PkgRepoCheckedOut, "check out sources")?;

        for (index, source) in self.sources.iter_mut() {
            source
                .checkout(workspace)
                .with_context(|| format!("Failed to check out source {}", index))?;
            source
                .record_revision()
                .with_context(|| format!("Failed to record revision of source {}", index))?;
            info!(
                "Source {} is {} at revision {}",
                index,
                source,
                source.revision().unwrap_or_default()
            );
        }

        self.stage = BuildStage::SourcesResolved;
        Ok(())
    }

    pub fn apply_macros(
        &mut self,
        macros: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.expect_stage(BuildStage::SourcesResolved, "apply macros")?;

        let revisions = self
            .sources
            .iter()
            .filter_map(|(index, source)| {
                source
                    .friendly_revision()
                    .map(|revision| (*index, revision))
            })
            .collect();
        let context = MacroContext::new(now, revisions);

        let spec_file = self.spec_file_path()?;
        SpecMacros::apply(spec_file, macros, &context)?;

        let nvr = self.spec_parser.query_nvr(spec_file)?;
        info!("Building package {}", nvr);

        self.stage = BuildStage::MacrosApplied;
        Ok(())
    }

    pub fn build_tarballs(&mut self) -> Result<()> {
        self.expect_stage(BuildStage::MacrosApplied, "build tarballs")?;

        let spec_file = self.spec_file_path()?;
        let declared = self
            .spec_parser
            .parse_sources(spec_file)?
            .into_iter()
            .filter(|source| source.kind == SourceKind::Source)
            .map(|source| (source.index, source.file_name()))
            .collect::<BTreeMap<_, _>>();

        let work_dir = self.work_dir()?;
        for (index, source) in &self.sources {
            match declared.get(index) {
                Some(tarball) => {
                    info!(
                        "Building Source{}: {} from {}",
                        index,
                        tarball,
                        source.tree().unwrap_or(work_dir).display()
                    );
                    source
                        .create_tarball(tarball, work_dir)
                        .with_context(|| format!("Failed to build tarball for source {}", index))?;
                }
                None => {
                    warn!(
                        "Spec file does not contain Source{}, skipping tarball build for {}",
                        index,
                        source.url()
                    );
                }
            }
        }

        self.stage = BuildStage::TarballsBuilt;
        Ok(())
    }

    pub fn fetch_sources(&mut self) -> Result<()> {
        self.expect_stage(BuildStage::TarballsBuilt, "fetch sources")?;

        let spec_file = self.spec_file_path()?;
        let work_dir = self.work_dir()?;
        let mut seen = BTreeSet::new();

        for source in self.spec_parser.parse_sources(spec_file)? {
            let file_name = source.file_name();
            if file_name.is_empty() || !seen.insert(file_name.clone()) {
                continue;
            }
            if work_dir.join(&file_name).exists() {
                continue;
            }

            if Location::of(&source.uri).is_resolved() {
                info!("Fetching {} from {}", file_name, source.uri);
                fetch::fetch_file(&source.uri, work_dir)
                    .with_context(|| format!("Failed to fetch {}", source))?;
            } else {
                warn!("Unable to obtain {}", source);
            }
        }

        self.stage = BuildStage::SourcesFetched;
        Ok(())
    }

    /// Runs the chroot builder and returns the source package it produced.
    pub fn build_srpm(&mut self, result_dir: &Path) -> Result<PathBuf> {
        self.expect_stage(BuildStage::SourcesFetched, "build source package")?;

        let spec_file = self.spec_file_path()?;
        let work_dir = self.work_dir()?;
        info!(
            "Building source package in {} using chroot {}",
            result_dir.display(),
            self.chroot.name()
        );
        self.chroot.build(
            result_dir,
            BuildMode::BuildSrpm {
                spec_file,
                sources_dir: work_dir,
            },
        )?;

        let mut srpms = fs::list_files_by_suffix(
            result_dir,
            SRPM_FILE_SUFFIX,
            fs::TraverseOptions { recursive: false },
        )?;
        let srpm = match srpms.len() {
            1 => srpms.remove(0),
            0 => bail!("Cannot find any source package in {}", result_dir.display()),
            n => bail!(
                "Found {} source packages in {}, expected exactly one",
                n,
                result_dir.display()
            ),
        };

        self.stage = BuildStage::SrpmBuilt;
        Ok(srpm)
    }

    /// Performs every step, checking out the packaging repository under
    /// `workspace/builddir` and numbered sources under `workspace`.
    pub fn run(
        &mut self,
        workspace: &Path,
        result_dir: &Path,
        macros: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let build_dir = workspace.join(BUILD_DIR_NAME);
        fs::create_dir_all(&build_dir)?;
        fs::create_dir_all(result_dir)?;

        self.checkout_packaging_repo(&build_dir)
            .context("Failed to prepare packaging repository")?;
        self.checkout_sources(workspace)
            .context("Failed to prepare sources")?;
        self.apply_macros(macros, now)
            .context("Failed to apply macros")?;
        self.build_tarballs()
            .context("Failed to build tarballs")?;
        self.fetch_sources().context("Failed to fetch sources")?;
        let srpm = self
            .build_srpm(result_dir)
            .context("Failed to build source package")?;

        info!("Build complete, results in {}", result_dir.display());
        Ok(srpm)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use chrono::TimeZone;

    use super::*;
    use crate::{
        repo::GitRepo,
        spec::{parse_source_tags, PackageNvr, SpecSource},
        test_utils::{git_available, GitFixture},
    };

    /// Expands `%global` and `%{name}` style references, then reads tags.
    struct FakeSpecParser;

    impl FakeSpecParser {
        fn expand(spec_file: &Path) -> String {
            let content = std::fs::read_to_string(spec_file).unwrap();
            let mut defines = Vec::new();
            for line in content.lines() {
                let mut fields = line.split_whitespace();
                let first = fields.next().unwrap_or_default();
                let name = fields.next().unwrap_or_default();
                let value = fields.collect::<Vec<_>>().join(" ");
                if first == "%global" {
                    defines.push((name.to_owned(), value));
                } else if let Some(tag) = first.strip_suffix(':') {
                    defines.push((tag.to_lowercase(), name.to_owned()));
                }
            }

            let mut expanded = content;
            for (name, value) in defines {
                expanded = expanded.replace(&format!("%{{{}}}", name), &value);
            }
            expanded
        }

        fn tag(content: &str, tag: &str) -> String {
            content
                .lines()
                .find_map(|line| line.strip_prefix(tag))
                .map(|value| value.trim().to_owned())
                .unwrap_or_default()
        }
    }

    impl SpecParser for FakeSpecParser {
        fn parse_sources(&self, spec_file: &Path) -> Result<Vec<SpecSource>> {
            Ok(parse_source_tags(&Self::expand(spec_file)))
        }

        fn query_nvr(&self, spec_file: &Path) -> Result<PackageNvr> {
            let content = Self::expand(spec_file);
            Ok(PackageNvr {
                name: Self::tag(&content, "Name:"),
                version: Self::tag(&content, "Version:"),
                release: Self::tag(&content, "Release:"),
            })
        }
    }

    #[derive(Default)]
    struct BuildRecord {
        calls: usize,
        sources: Vec<String>,
    }

    /// Writes `srpm_count` source packages, or fails.
    struct FakeChroot {
        srpm_count: usize,
        fail: bool,
        record: Rc<RefCell<BuildRecord>>,
    }

    impl FakeChroot {
        fn new(
            srpm_count: usize,
            fail: bool,
        ) -> (Box<dyn ChrootBuilder>, Rc<RefCell<BuildRecord>>) {
            let record = Rc::new(RefCell::new(BuildRecord::default()));
            let chroot = Self {
                srpm_count,
                fail,
                record: record.clone(),
            };
            (Box::new(chroot), record)
        }
    }

    impl ChrootBuilder for FakeChroot {
        fn name(&self) -> &str {
            "fake-chroot"
        }

        fn build(&self, result_dir: &Path, mode: BuildMode<'_>) -> Result<()> {
            let mut record = self.record.borrow_mut();
            record.calls += 1;
            if let BuildMode::BuildSrpm { sources_dir, .. } = mode {
                let mut names = std::fs::read_dir(sources_dir)
                    .unwrap()
                    .flatten()
                    .map(|entry| entry.file_name().to_string_lossy().to_string())
                    .collect::<Vec<_>>();
                names.sort();
                record.sources = names;
            }
            if self.fail {
                bail!("Process mock exited unsuccessfully, exit_code=1");
            }
            for i in 0..self.srpm_count {
                std::fs::write(result_dir.join(format!("myapp-{}.src.rpm", i)), "").unwrap();
            }
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 7, 9, 11).unwrap()
    }

    const SPEC_TEMPLATE: &str = "\
Name:           myapp
Version:        1.0
Release:        1%{?dist}
Source1:        myapp-%{myversion}.tar.gz
Source3:        EXTRA_SOURCE
Patch0:         fix-build.patch

%description
Test package
";

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        packaging: GitFixture,
        upstream: GitFixture,
        upstream_head: String,
    }

    impl Fixture {
        /// Packaging repo `myapp-packaging` and upstream repo `myapp`.
        fn create(extra_source: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().to_path_buf();

            let upstream = GitFixture::create(&root.join("upstream/myapp"));
            upstream.commit("src/main.c", "int main(void) { return 0; }\n", "add source");
            let upstream_head = upstream.commit("README", "myapp\n", "add readme");
            upstream.tag("v1.0");

            let packaging = GitFixture::create(&root.join("upstream/myapp-packaging"));
            packaging.commit(
                "myapp.spec",
                &SPEC_TEMPLATE.replace("EXTRA_SOURCE", extra_source),
                "add spec",
            );
            packaging.commit("fix-build.patch", "--- a\n+++ b\n", "add patch");

            Self {
                _dir: dir,
                root,
                packaging,
                upstream,
                upstream_head,
            }
        }

        fn pkg_repo(&self) -> Repository {
            Repository::Git(GitRepo::new(self.packaging.url(), None))
        }

        fn upstream_repo(&self) -> Repository {
            Repository::Git(GitRepo::new(self.upstream.url(), Some("v1.0".to_owned())))
        }

        fn workspace(&self) -> PathBuf {
            self.root.join("workspace")
        }

        fn result_dir(&self) -> PathBuf {
            self.root.join("results")
        }
    }

    fn macros() -> BTreeMap<String, String> {
        let mut macros = BTreeMap::new();
        macros.insert("myversion".to_owned(), "@REV1@".to_owned());
        macros.insert("unused".to_owned(), "@DATE@".to_owned());
        macros
    }

    #[test]
    fn test_build_from_tagged_source() {
        if !git_available() {
            return;
        }
        let fixture = Fixture::create("extra.txt");
        let extra = fixture.root.join("extra.txt");
        std::fs::write(&extra, "extra").unwrap();
        fixture.packaging.commit(
            "myapp.spec",
            &SPEC_TEMPLATE.replace("EXTRA_SOURCE", &extra.to_string_lossy()),
            "use local extra source",
        );

        let mut sources = BTreeMap::new();
        sources.insert(1, fixture.upstream_repo());
        let (chroot, record) = FakeChroot::new(1, false);
        let mut builder =
            SrpmBuilder::new(fixture.pkg_repo(), sources, Box::new(FakeSpecParser), chroot);

        let srpm = builder
            .run(&fixture.workspace(), &fixture.result_dir(), &macros(), now())
            .unwrap();
        assert_eq!(builder.stage(), BuildStage::SrpmBuilt);
        assert_eq!(srpm, fixture.result_dir().join("myapp-0.src.rpm"));

        let work_dir = fixture.workspace().join("builddir/myapp-packaging");
        let spec_file = work_dir.join("myapp.spec");
        assert_eq!(builder.spec_file.as_deref(), Some(spec_file.as_path()));

        let friendly = &fixture.upstream_head[..8];
        let content = std::fs::read_to_string(&spec_file).unwrap();
        assert!(content.starts_with(&format!("%global myversion {}\n\n", friendly)));
        assert!(!content.contains("%global unused"));

        let tarball = format!("myapp-{}.tar.gz", friendly);
        assert!(work_dir.join(&tarball).is_file());
        assert!(fixture.workspace().join("myapp/src/main.c").is_file());

        let record = record.borrow();
        assert_eq!(record.calls, 1);
        assert!(record.sources.contains(&tarball));
        assert!(record.sources.contains(&"extra.txt".to_owned()));
        assert!(record.sources.contains(&"fix-build.patch".to_owned()));
    }

    #[test]
    fn test_orphaned_source_is_skipped() {
        if !git_available() {
            return;
        }
        let fixture = Fixture::create("unreachable-data.bin");

        let mut sources = BTreeMap::new();
        sources.insert(1, fixture.upstream_repo());
        sources.insert(2, Repository::from_locator(fixture.upstream.url()).unwrap().unwrap());
        let (chroot, record) = FakeChroot::new(1, false);
        let mut builder =
            SrpmBuilder::new(fixture.pkg_repo(), sources, Box::new(FakeSpecParser), chroot);

        builder
            .run(&fixture.workspace(), &fixture.result_dir(), &macros(), now())
            .unwrap();
        assert_eq!(builder.stage(), BuildStage::SrpmBuilt);

        let tarballs = record
            .borrow()
            .sources
            .iter()
            .filter(|name| name.ends_with(".tar.gz"))
            .count();
        assert_eq!(tarballs, 1);
    }

    #[test]
    fn test_builder_failure_aborts() {
        if !git_available() {
            return;
        }
        let fixture = Fixture::create("unreachable-data.bin");

        let (chroot, record) = FakeChroot::new(1, true);
        let mut builder = SrpmBuilder::new(
            fixture.pkg_repo(),
            BTreeMap::new(),
            Box::new(FakeSpecParser),
            chroot,
        );

        let err = builder
            .run(&fixture.workspace(), &fixture.result_dir(), &macros(), now())
            .unwrap_err();
        assert_eq!(builder.stage(), BuildStage::SourcesFetched);
        assert_eq!(record.borrow().calls, 1);
        assert!(format!("{:#}", err).contains("exit_code=1"));
        assert!(!format!("{:#}", err).contains("source package in"));
    }

    #[test]
    fn test_srpm_count_is_checked() {
        if !git_available() {
            return;
        }
        for count in [0, 2] {
            let fixture = Fixture::create("unreachable-data.bin");
            let (chroot, _) = FakeChroot::new(count, false);
            let mut builder = SrpmBuilder::new(
                fixture.pkg_repo(),
                BTreeMap::new(),
                Box::new(FakeSpecParser),
                chroot,
            );

            let err = builder
                .run(&fixture.workspace(), &fixture.result_dir(), &macros(), now())
                .unwrap_err();
            assert_eq!(builder.stage(), BuildStage::SourcesFetched);
            assert!(format!("{:#}", err).contains("source package"));
        }
    }

    #[test]
    fn test_stage_order_is_enforced() {
        let repo = Repository::Git(GitRepo::new(
            "git://example.com/myapp.git".to_owned(),
            None,
        ));
        let (chroot, record) = FakeChroot::new(1, false);
        let mut builder = SrpmBuilder::new(repo, BTreeMap::new(), Box::new(FakeSpecParser), chroot);

        let dir = tempfile::tempdir().unwrap();
        let err = builder.build_srpm(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Cannot build source package at stage \"init\""));
        assert!(builder.checkout_sources(dir.path()).is_err());
        assert!(builder.fetch_sources().is_err());
        assert_eq!(builder.stage(), BuildStage::Init);
        assert_eq!(record.borrow().calls, 0);
    }

    #[test]
    fn test_missing_spec_file() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let packaging = GitFixture::create(&dir.path().join("packaging"));
        packaging.commit("README", "no spec\n", "init");

        let repo = Repository::from_locator(packaging.url()).unwrap().unwrap();
        let (chroot, _) = FakeChroot::new(1, false);
        let mut builder = SrpmBuilder::new(repo, BTreeMap::new(), Box::new(FakeSpecParser), chroot);

        let err = builder.checkout_packaging_repo(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Cannot find any spec file"));
        assert_eq!(builder.stage(), BuildStage::Init);
    }
}
