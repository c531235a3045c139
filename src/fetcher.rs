use std::fs::{self, OpenOptions};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_RANGE, HeaderMap, HeaderValue, RANGE, USER_AGENT};
use serde::Serialize;
use tracing::{debug, info};

use crate::archive;
use crate::error::OasisError;
use crate::manifest::{ResourceEntry, ResourceOptions};
use crate::store::{Receipt, Store};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchControls {
    pub resume: bool,
    pub force: bool,
    pub verbose: u8,
}

impl Default for FetchControls {
    fn default() -> Self {
        Self {
            resume: true,
            force: false,
            verbose: 1,
        }
    }
}

pub trait Fetcher {
    fn fetch(
        &self,
        entries: &[ResourceEntry],
        controls: &FetchControls,
    ) -> Result<Vec<Utf8PathBuf>, OasisError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    store: Store,
}

impl HttpFetcher {
    pub fn new(store: Store) -> Result<Self, OasisError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("oasis-vbm/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| OasisError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|err| OasisError::Http(err.to_string()))?;
        Ok(Self { client, store })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn handle_status(
        url: &str,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, OasisError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "download request failed".to_string());
        Err(OasisError::HttpStatus {
            status,
            url: url.to_string(),
            message,
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, OasisError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(OasisError::Http(err.to_string()));
                }
            }
        }
    }

    fn download(
        &self,
        url: &str,
        file_name: &str,
        controls: &FetchControls,
    ) -> Result<Utf8PathBuf, OasisError> {
        let partial = self.store.partial_path(file_name);
        let complete = self.store.download_path(file_name);
        if let Some(parent) = partial.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        }
        if controls.force || !controls.resume {
            Store::remove_file_if_exists(&partial)?;
        }

        let offset = fs::metadata(partial.as_std_path())
            .map(|meta| meta.len())
            .unwrap_or(0);
        if offset > 0 {
            report(
                controls.verbose,
                &format!("resuming {url} from byte {offset}"),
            );
        } else {
            report(controls.verbose, &format!("downloading {url}"));
        }

        let mut response = self.send_with_retries(|| {
            let request = self.client.get(url);
            if offset > 0 {
                request.header(RANGE, format!("bytes={offset}-"))
            } else {
                request
            }
        })?;

        let append = match response.status() {
            StatusCode::PARTIAL_CONTENT => true,
            StatusCode::RANGE_NOT_SATISFIABLE if offset > 0 => {
                let total = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|value| value.to_str().ok())
                    .and_then(unsatisfied_range_total);
                if total == Some(offset) {
                    debug!(url, offset, "partial download already complete");
                    Store::move_file(&partial, &complete)?;
                    return Ok(complete);
                }
                debug!(url, offset, remote = ?total, "discarding stale partial download");
                Store::remove_file_if_exists(&partial)?;
                let restarted = self.send_with_retries(|| self.client.get(url))?;
                response = Self::handle_status(url, restarted)?;
                false
            }
            _ => {
                response = Self::handle_status(url, response)?;
                false
            }
        };

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(partial.as_std_path())
            .map_err(|err| OasisError::Filesystem(format!("open {partial}: {err}")))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| OasisError::Http(format!("transfer of {url} interrupted: {err}")))?;
        drop(file);

        Store::move_file(&partial, &complete)?;
        Ok(complete)
    }

    fn place(
        &self,
        url: &str,
        options: ResourceOptions,
        targets: &[&Utf8Path],
        controls: &FetchControls,
    ) -> Result<(), OasisError> {
        let file_name = url_file_name(url)?;
        let downloaded = self.download(url, &file_name, controls)?;
        let size_bytes = fs::metadata(downloaded.as_std_path())
            .map(|meta| meta.len())
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;

        if options.uncompress {
            report(controls.verbose, &format!("uncompressing {file_name}"));
            archive::uncompress(
                downloaded.as_std_path(),
                &file_name,
                self.store.dataset_dir().as_std_path(),
            )?;
            Store::remove_file_if_exists(&downloaded)?;
        } else if let Some((last, rest)) = targets.split_last() {
            for target in rest {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent.as_std_path())
                        .map_err(|err| OasisError::Filesystem(err.to_string()))?;
                }
                fs::copy(downloaded.as_std_path(), target.as_std_path())
                    .map_err(|err| OasisError::Filesystem(err.to_string()))?;
            }
            Store::move_file(&downloaded, last)?;
        }

        let receipt = Receipt {
            url: url.to_string(),
            downloaded_at: Utc::now().to_rfc3339(),
            uncompressed: options.uncompress,
            size_bytes,
        };
        Store::write_receipt(&self.store.receipt_path(&file_name), &receipt)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        entries: &[ResourceEntry],
        controls: &FetchControls,
    ) -> Result<Vec<Utf8PathBuf>, OasisError> {
        self.store.ensure_dataset_dir()?;
        let targets = entries
            .iter()
            .map(|entry| self.store.target_path(&entry.relative_path))
            .collect::<Vec<_>>();

        let mut pending: Vec<(&str, ResourceOptions, Vec<&Utf8Path>)> = Vec::new();
        for (entry, target) in entries.iter().zip(&targets) {
            if !controls.force && self.store.exists(target) {
                debug!(path = %target, "using cached file");
                continue;
            }
            match pending.iter_mut().find(|(url, _, _)| *url == entry.url) {
                Some((_, _, group)) => group.push(target.as_path()),
                None => pending.push((entry.url.as_str(), entry.options, vec![target.as_path()])),
            }
        }

        for (url, options, group) in &pending {
            self.place(url, *options, group, controls)?;
        }

        if let Some(missing) = targets.iter().find(|target| !self.store.exists(target)) {
            return Err(OasisError::MissingAfterFetch(
                missing.as_std_path().to_path_buf(),
            ));
        }
        report(
            controls.verbose,
            &format!("{} files available under {}", targets.len(), self.store.dataset_dir()),
        );
        Ok(targets)
    }
}

pub fn url_file_name(url: &str) -> Result<String, OasisError> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    match path.split_once('/') {
        Some((_, tail)) => tail
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string())
            .ok_or_else(|| OasisError::InvalidUrl(url.to_string())),
        None => Err(OasisError::InvalidUrl(url.to_string())),
    }
}

// `Content-Range: bytes */<total>` as sent with a 416 reply.
fn unsatisfied_range_total(value: &str) -> Option<u64> {
    value.trim().strip_prefix("bytes */")?.trim().parse().ok()
}

fn report(verbose: u8, message: &str) {
    if verbose > 0 {
        info!("{message}");
    } else {
        debug!("{message}");
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
