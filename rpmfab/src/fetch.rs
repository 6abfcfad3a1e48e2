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
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use log::{debug, info};
use reqwest::blocking::{Client, Response};
use suppaftp::{types::FileType, FtpStream};
use url::Url;

use rpmfab_common::fs;

const NETWORK_TIMEOUT: Duration = Duration::from_secs(300);
const HTTP_SCHEMES: [&str; 2] = ["http", "https"];
const FTP_SCHEME: &str = "ftp";
const FTP_DEFAULT_PORT: u16 = 21;
const FTP_ANONYMOUS_USER: &str = "anonymous";
const FTP_ANONYMOUS_PASSWORD: &str = "anonymous@";

/// Where the content of a URI can be obtained from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Network(Url),
    LocalFile(PathBuf),
    Unresolved,
}

impl Location {
    pub fn of(uri: &str) -> Self {
        match Url::parse(uri) {
            Ok(url) if HTTP_SCHEMES.contains(&url.scheme()) || url.scheme() == FTP_SCHEME => {
                Self::Network(url)
            }
            Ok(url) if url.scheme() == "file" => match url.to_file_path() {
                Ok(path) => Self::LocalFile(path),
                Err(_) => Self::Unresolved,
            },
            Ok(_) => Self::Unresolved,
            Err(_) => {
                let path = Path::new(uri);
                match path.is_absolute() {
                    true => Self::LocalFile(path.to_path_buf()),
                    false => Self::Unresolved,
                }
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}

/// File name a URI is stored under, the text after its last `/`.
///
/// As with rpm, a trailing `#/name` renames the file, so
/// `https://host/archive/v1.0.tar.gz#/myapp-1.0.tar.gz` gives
/// `myapp-1.0.tar.gz`.
pub fn uri_file_name(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or_default()
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(NETWORK_TIMEOUT)
        .build()
        .context("Failed to create http client")
}

fn request(client: &Client, url: &Url) -> Result<Response> {
    debug!("Requesting {}", url);
    client
        .get(url.clone())
        .send()
        .and_then(Response::error_for_status)
        .with_context(|| format!("Failed to download {}", url))
}

fn ftp_connect(url: &Url) -> Result<FtpStream> {
    let addr = url
        .socket_addrs(|| Some(FTP_DEFAULT_PORT))
        .with_context(|| format!("Cannot resolve host of {}", url))?
        .into_iter()
        .next()
        .with_context(|| format!("Cannot resolve host of {}", url))?;
    debug!("Connecting to ftp server {}", addr);

    let mut ftp = FtpStream::connect_timeout(addr, NETWORK_TIMEOUT)
        .with_context(|| format!("Failed to connect to {}", addr))?;
    let (user, password) = match url.username() {
        "" => (FTP_ANONYMOUS_USER, FTP_ANONYMOUS_PASSWORD),
        user => (user, url.password().unwrap_or(FTP_ANONYMOUS_PASSWORD)),
    };
    ftp.login(user, password)
        .with_context(|| format!("Failed to log in to {}", addr))?;
    ftp.transfer_type(FileType::Binary)
        .with_context(|| format!("Failed to set binary mode on {}", addr))?;

    Ok(ftp)
}

fn ftp_quit(mut ftp: FtpStream) {
    if let Err(e) = ftp.quit() {
        debug!("Failed to close ftp session: {}", e);
    }
}

fn download_ftp(url: &Url, dest_file: &Path) -> Result<()> {
    let mut ftp = ftp_connect(url)?;
    let mut stream = ftp
        .retr_as_stream(url.path())
        .with_context(|| format!("Failed to download {}", url))?;

    fs::write_atomic(dest_file, |file| {
        io::copy(&mut stream, file)?;
        ftp.finalize_retr_stream(stream)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    })
    .with_context(|| format!("Failed to download {}", url))?;
    ftp_quit(ftp);

    Ok(())
}

fn read_ftp(url: &Url) -> Result<Vec<u8>> {
    let mut ftp = ftp_connect(url)?;
    let buffer = ftp
        .retr_as_buffer(url.path())
        .with_context(|| format!("Failed to download {}", url))?;
    ftp_quit(ftp);

    Ok(buffer.into_inner())
}

fn download_with(client: &Client, url: &Url, dest_file: &Path) -> Result<()> {
    if url.scheme() == FTP_SCHEME {
        return download_ftp(url, dest_file);
    }

    let mut response = request(client, url)?;
    fs::write_atomic(dest_file, |file| io::copy(&mut response, file).map(|_| ()))
        .with_context(|| format!("Failed to download {}", url))
}

fn fetch_with(client: &Client, uri: &str, dest_dir: &Path) -> Result<PathBuf> {
    let dest_file = match uri_file_name(uri) {
        "" => bail!("Cannot resolve {} to a file", uri),
        name => dest_dir.join(name),
    };

    match Location::of(uri) {
        Location::Network(url) => {
            info!("Downloading {}", url);
            download_with(client, &url, &dest_file)?;
        }
        Location::LocalFile(path) => {
            debug!("Copying local file {}", path.display());
            fs::copy_preserve(path, &dest_file)?;
        }
        Location::Unresolved => bail!("Cannot resolve {} to a file", uri),
    }

    Ok(dest_file)
}

/// Retrieves `uri` into `dest_dir`, under the name given by [`uri_file_name`].
///
/// Network URIs (`http`, `https` and `ftp`) are downloaded, local paths and
/// `file://` URIs are copied along with their timestamps.
pub fn fetch_file<P: AsRef<Path>>(uri: &str, dest_dir: P) -> Result<PathBuf> {
    fetch_with(&http_client()?, uri, dest_dir.as_ref())
}

/// Reads the whole content behind `uri`.
pub fn read_uri(uri: &str) -> Result<Vec<u8>> {
    match Location::of(uri) {
        Location::Network(url) if url.scheme() == FTP_SCHEME => read_ftp(&url),
        Location::Network(url) => {
            let client = http_client()?;
            let response = request(&client, &url)?;
            let bytes = response
                .bytes()
                .with_context(|| format!("Failed to download {}", url))?;
            Ok(bytes.to_vec())
        }
        Location::LocalFile(path) => Ok(fs::read(path)?),
        Location::Unresolved => bail!("Unsupported uri {}", uri),
    }
}
