// SPDX-License-Identifier: Mulan PSL v2
/*
 * Copyright (c) 2024 Huawei Technologies Co., Ltd.
 * rpmfab-common is licensed under Mulan PSL v2.
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
    env,
    ffi::{OsStr, OsString},
    fs::{File, FileType, Metadata, ReadDir},
    io,
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

use filetime::FileTime;

trait RewriteError {
    fn rewrite_err(self, err_msg: String) -> Self;
}

impl<T> RewriteError for io::Result<T> {
    #[inline]
    fn rewrite_err(self, err_msg: String) -> Self {
        self.map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("{}, {}", err_msg, e.to_string().to_lowercase()),
            )
        })
    }
}

/* std::fs functions */
#[inline]
pub fn read<P: AsRef<Path>>(path: P) -> io::Result<Vec<u8>> {
    std::fs::read(&path).rewrite_err(format!("Cannot read file {}", path.as_ref().display()))
}

#[inline]
pub fn read_to_string<P: AsRef<Path>>(path: P) -> io::Result<String> {
    std::fs::read_to_string(&path)
        .rewrite_err(format!("Cannot read file {}", path.as_ref().display()))
}

#[inline]
pub fn write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> io::Result<()> {
    std::fs::write(&path, contents)
        .rewrite_err(format!("Cannot write file {}", path.as_ref().display()))
}

#[inline]
pub fn metadata<P: AsRef<Path>>(path: P) -> io::Result<Metadata> {
    std::fs::metadata(&path).rewrite_err(format!("Cannot access {}", path.as_ref().display()))
}

#[inline]
pub fn rename<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> io::Result<()> {
    std::fs::rename(&from, &to).rewrite_err(format!(
        "Cannot rename {} to {}",
        from.as_ref().display(),
        to.as_ref().display()
    ))
}

#[inline]
pub fn copy<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> io::Result<u64> {
    std::fs::copy(&from, &to).rewrite_err(format!(
        "Cannot copy {} to {}",
        from.as_ref().display(),
        to.as_ref().display()
    ))
}

#[inline]
pub fn create_dir_all<P: AsRef<Path>>(path: P) -> io::Result<()> {
    std::fs::create_dir_all(&path).rewrite_err(format!(
        "Cannot create directory {}",
        path.as_ref().display(),
    ))
}

#[inline]
pub fn remove_dir_all<P: AsRef<Path>>(path: P) -> io::Result<()> {
    std::fs::remove_dir_all(&path).rewrite_err(format!(
        "Cannot remove directory {}",
        path.as_ref().display(),
    ))
}

#[inline]
pub fn read_dir<P: AsRef<Path>>(path: P) -> io::Result<ReadDir> {
    std::fs::read_dir(&path)
        .rewrite_err(format!("Cannot read directory {}", path.as_ref().display()))
}

/* Extended functions */
pub fn file_name<P: AsRef<Path>>(path: P) -> OsString {
    path.as_ref()
        .file_name()
        .map(OsStr::to_os_string)
        .unwrap_or_default()
}

/// Copies a file, carrying over its permission bits and access/modification times.
pub fn copy_preserve<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> io::Result<u64> {
    let len = self::copy(&from, &to)?;

    let src_meta = self::metadata(&from)?;
    filetime::set_file_times(
        &to,
        FileTime::from_last_access_time(&src_meta),
        FileTime::from_last_modification_time(&src_meta),
    )
    .rewrite_err(format!(
        "Cannot set file time of {}",
        to.as_ref().display()
    ))?;

    Ok(len)
}

pub fn set_file_mtime<P: AsRef<Path>>(path: P, time: SystemTime) -> io::Result<()> {
    let file_time = FileTime::from_system_time(time);
    filetime::set_file_times(&path, file_time, file_time).rewrite_err(format!(
        "Cannot set file time of {}",
        path.as_ref().display()
    ))
}

/// Replaces file content atomically.
///
/// Content is produced by `write_fn` into a temporary file next to `path`,
/// which is renamed over `path` only after `write_fn` succeeded. On any
/// failure the temporary file is removed and `path` keeps its old content.
pub fn write_atomic<P, F>(path: P, write_fn: F) -> io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let file_path = path.as_ref();
    let parent_dir = match file_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp_file = tempfile::Builder::new()
        .prefix(".rpmfab-")
        .tempfile_in(parent_dir)
        .rewrite_err(format!(
            "Cannot create temporary file in {}",
            parent_dir.display()
        ))?;

    write_fn(temp_file.as_file_mut())
        .rewrite_err(format!("Cannot write file {}", temp_file.path().display()))?;
    temp_file
        .as_file()
        .sync_all()
        .rewrite_err(format!("Cannot sync file {}", temp_file.path().display()))?;

    if let Ok(orig_meta) = std::fs::metadata(file_path) {
        temp_file
            .as_file()
            .set_permissions(orig_meta.permissions())
            .rewrite_err(format!(
                "Cannot set permission of {}",
                temp_file.path().display()
            ))?;
    }

    temp_file
        .persist(file_path)
        .map_err(|e| e.error)
        .rewrite_err(format!("Cannot replace file {}", file_path.display()))?;

    Ok(())
}

pub fn normalize<P: AsRef<Path>>(path: P) -> io::Result<PathBuf> {
    let mut new_path = PathBuf::new();

    let orig_path = path.as_ref();
    if orig_path.as_os_str().is_empty() {
        return Ok(new_path);
    }

    if orig_path.is_relative() {
        new_path.push(env::current_dir()?);
    }

    for component in orig_path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                new_path.pop();
                if !new_path.has_root() {
                    new_path.push(Component::RootDir);
                }
            }
            _ => {
                new_path.push(component);
            }
        }
    }

    Ok(new_path)
}

#[derive(Clone, Copy)]
pub struct TraverseOptions {
    pub recursive: bool,
}

pub fn traverse<P, F>(
    directory: P,
    options: TraverseOptions,
    predicate: F,
) -> io::Result<Vec<PathBuf>>
where
    P: AsRef<Path>,
    F: Fn(&FileType, &Path) -> bool + Copy,
{
    let mut results = Vec::new();
    let mut subdirs = Vec::new();

    for dir_entry in read_dir(directory)?.flatten() {
        let file_type = dir_entry.file_type()?;
        let file_path = dir_entry.path();

        if predicate(&file_type, &file_path) {
            results.push(file_path.clone());
        }
        if options.recursive && file_type.is_dir() {
            subdirs.push(file_path);
        }
    }

    for subdir in subdirs {
        results.extend(traverse(subdir, options, predicate)?);
    }
    results.sort();

    Ok(results)
}

/// Lists regular files whose name ends with `suffix`, e.g. `.spec` or `.src.rpm`.
pub fn list_files_by_suffix<P>(
    directory: P,
    suffix: &str,
    options: TraverseOptions,
) -> io::Result<Vec<PathBuf>>
where
    P: AsRef<Path>,
{
    traverse(directory, options, |file_type, file_path| {
        if !file_type.is_file() {
            return false;
        }
        file_path
            .file_name()
            .map(|name| name.to_string_lossy().ends_with(suffix))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Write, time::Duration};

    #[test]
    fn test_rewrite_err_carries_path() {
        let err = read_to_string("/nonexistent/rpmfab/test.spec").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("/nonexistent/rpmfab/test.spec"));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test.spec");
        write(&file, "Name: test\n").unwrap();

        write_atomic(&file, |f| f.write_all(b"%global foo bar\n\nName: test\n")).unwrap();

        assert_eq!(
            read_to_string(&file).unwrap(),
            "%global foo bar\n\nName: test\n"
        );
        let files = traverse(dir.path(), TraverseOptions { recursive: false }, |_, _| true);
        assert_eq!(files.unwrap().len(), 1);
    }

    #[test]
    fn test_write_atomic_failure_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test.spec");
        write(&file, "Name: test\n").unwrap();

        let result = write_atomic(&file, |f| {
            f.write_all(b"%global half")?;
            Err(io::Error::new(io::ErrorKind::Other, "injected failure"))
        });

        assert!(result.is_err());
        assert_eq!(read_to_string(&file).unwrap(), "Name: test\n");
        assert_eq!(
            traverse(dir.path(), TraverseOptions { recursive: false }, |_, _| true).unwrap(),
            vec![file]
        );
    }

    #[test]
    fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test.spec");
        write(&file, "old").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        write_atomic(&file, |f| f.write_all(b"new")).unwrap();

        let mode = metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_copy_preserve_keeps_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.tar.gz");
        let dst = dir.path().join("dst.tar.gz");
        write(&src, "data").unwrap();

        let old_time = SystemTime::now() - Duration::from_secs(7 * 24 * 3600);
        set_file_mtime(&src, old_time).unwrap();
        copy_preserve(&src, &dst).unwrap();

        let src_mtime = FileTime::from_last_modification_time(&metadata(&src).unwrap());
        let dst_mtime = FileTime::from_last_modification_time(&metadata(&dst).unwrap());
        assert_eq!(src_mtime, dst_mtime);
        assert_eq!(read_to_string(&dst).unwrap(), "data");
    }

    #[test]
    fn test_list_files_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path().join("a.src.rpm"), "").unwrap();
        write(dir.path().join("a.x86_64.rpm"), "").unwrap();
        write(dir.path().join("build.log"), "").unwrap();

        let options = TraverseOptions { recursive: false };
        let srpms = list_files_by_suffix(dir.path(), ".src.rpm", options).unwrap();
        let rpms = list_files_by_suffix(dir.path(), ".rpm", options).unwrap();

        assert_eq!(srpms, vec![dir.path().join("a.src.rpm")]);
        assert_eq!(rpms.len(), 2);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize("/var/lib/../tmp/./rpmfab").unwrap(),
            PathBuf::from("/var/tmp/rpmfab")
        );
        assert!(normalize("workspace").unwrap().is_absolute());
        assert_eq!(normalize("").unwrap(), PathBuf::new());
    }
}
