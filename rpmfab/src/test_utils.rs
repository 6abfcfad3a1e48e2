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
    path::{Path, PathBuf},
    process::Command,
};

pub fn git_available() -> bool {
    ["git", "tar", "gzip"]
        .iter()
        .all(|tool| which::which(tool).is_ok())
}

/// Scratch git repository with a fixed identity.
pub struct GitFixture {
    path: PathBuf,
}

impl GitFixture {
    pub fn create(path: &Path) -> Self {
        std::fs::create_dir_all(path).unwrap();
        let fixture = Self {
            path: path.to_path_buf(),
        };
        fixture.git(&["init", "-q"]);
        fixture
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    /// Writes `file`, commits it and returns the new commit hash.
    pub fn commit(&self, file: &str, content: &str, message: &str) -> String {
        let file_path = self.path.join(file);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&file_path, content).unwrap();

        self.git(&["add", file]);
        self.git(&["commit", "-q", "-m", message]);
        self.git(&["rev-parse", "HEAD"])
    }

    /// Registers `url` as a submodule at `path`, including its own
    /// submodules, and commits it.
    pub fn add_submodule(&self, url: &str, path: &str) -> String {
        self.git(&["submodule", "add", "-q", url, path]);
        self.git(&["submodule", "update", "-q", "--init", "--recursive"]);
        self.git(&["commit", "-q", "-m", &format!("Add submodule {}", path)]);
        self.git(&["rev-parse", "HEAD"])
    }

    pub fn tag(&self, name: &str) {
        self.git(&["tag", name]);
    }

    fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
            .args(["-c", "protocol.file.allow=always"])
            .args(args)
            .current_dir(&self.path)
            .env("GIT_AUTHOR_NAME", "rpmfab")
            .env("GIT_AUTHOR_EMAIL", "rpmfab@example.com")
            .env("GIT_AUTHOR_DATE", "2024-03-05T07:09:11Z")
            .env("GIT_COMMITTER_NAME", "rpmfab")
            .env("GIT_COMMITTER_EMAIL", "rpmfab@example.com")
            .env("GIT_COMMITTER_DATE", "2024-03-05T07:09:11Z")
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );

        String::from_utf8_lossy(&output.stdout).trim().to_owned()
    }
}
