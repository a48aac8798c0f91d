use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::error::KiraError;

static MANIFEST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9a-fA-F]{32})\s+(\S+)\s*$").expect("valid regex"));

/// Single-attempt transfer primitive.
pub trait Transport: Send + Sync {
    fn download(&self, url: &str, destination: &Path) -> Result<(), KiraError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &RetrievalConfig) -> Result<Self, KiraError> {
        let client = Client::builder()
            .default_headers(default_headers()?)
            .timeout(config.timeout())
            .build()
            .map_err(|err| KiraError::Transport {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }
}

pub(crate) fn default_headers() -> Result<HeaderMap, KiraError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("kira-proteome/{}", env!("CARGO_PKG_VERSION")))
            .map_err(KiraError::fs)?,
    );
    if let Ok(api_key) = std::env::var("NCBI_API_KEY") {
        if !api_key.trim().is_empty() {
            headers.insert(
                "api-key",
                HeaderValue::from_str(api_key.trim()).map_err(KiraError::fs)?,
            );
        }
    }
    Ok(headers)
}

pub(crate) fn transport_error(url: &str, err: reqwest::Error) -> KiraError {
    KiraError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &str, destination: &Path) -> Result<(), KiraError> {
        debug!(url, "GET");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| transport_error(url, err))?;
        if !response.status().is_success() {
            return Err(KiraError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let mut file = File::create(destination).map_err(KiraError::fs)?;
        response
            .copy_to(&mut file)
            .map_err(|err| transport_error(url, err))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded,
    /// The destination existed already; nothing was transferred or re-verified.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub hash: String,
    pub file_name: String,
}

pub struct VerifiedFetcher<'a, T: Transport> {
    transport: &'a T,
}

impl<'a, T: Transport> VerifiedFetcher<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Downloads `url` to `destination` unless it already exists and `update` is off.
    ///
    /// The body lands in a temporary sibling first and is renamed into place, so an
    /// interrupted transfer never leaves a file that the skip rule would accept.
    pub fn fetch(
        &self,
        url: &str,
        destination: &Utf8Path,
        update: bool,
    ) -> Result<FetchOutcome, KiraError> {
        if destination.as_std_path().exists() {
            if !update {
                info!(path = %destination, "file exists already; download skipped");
                return Ok(FetchOutcome::Skipped);
            }
            warn!(path = %destination, "file exists already and will be overwritten");
        }

        let parent = parent_dir(destination)?;
        fs::create_dir_all(parent.as_std_path()).map_err(KiraError::fs)?;
        let temp = tempfile::Builder::new()
            .prefix(".kira-proteome")
            .suffix(".part")
            .tempfile_in(parent.as_std_path())
            .map_err(KiraError::fs)?;

        self.transport.download(url, temp.path())?;

        if destination.as_std_path().exists() {
            fs::remove_file(destination.as_std_path()).map_err(KiraError::fs)?;
        }
        temp.persist(destination.as_std_path()).map_err(KiraError::fs)?;
        info!(url, path = %destination, "download completed");
        Ok(FetchOutcome::Downloaded)
    }

    /// Checks `file` against the row `expected_key` of the remote md5 manifest.
    ///
    /// Any failure removes `file`: an archive that could not be vouched for must not
    /// be picked up later by the skip rule.
    pub fn verify(
        &self,
        file: &Utf8Path,
        manifest_url: &str,
        expected_key: &str,
    ) -> Result<(), KiraError> {
        let result = self.verify_inner(file, manifest_url, expected_key);
        if result.is_err() && file.as_std_path().exists() {
            fs::remove_file(file.as_std_path()).map_err(KiraError::fs)?;
        }
        result
    }

    fn verify_inner(
        &self,
        file: &Utf8Path,
        manifest_url: &str,
        expected_key: &str,
    ) -> Result<(), KiraError> {
        let parent = parent_dir(file)?;
        // Unique per call, so concurrent retrievals of one organism never share a manifest.
        let manifest = tempfile::Builder::new()
            .prefix("md5checksums")
            .suffix(".txt")
            .tempfile_in(parent.as_std_path())
            .map_err(KiraError::fs)?;
        self.transport.download(manifest_url, manifest.path())?;

        let text = fs::read_to_string(manifest.path()).map_err(KiraError::fs)?;
        let entries = parse_md5_manifest(&text);
        let expected = entries
            .iter()
            .find(|entry| entry.file_name == expected_key)
            .ok_or_else(|| KiraError::ChecksumEntryMissing {
                manifest: manifest_url.to_string(),
                key: expected_key.to_string(),
            })?;

        info!(path = %file, "checking md5 hash");
        let actual = file_md5(file.as_std_path())?;
        if !actual.eq_ignore_ascii_case(&expected.hash) {
            return Err(KiraError::ChecksumMismatch {
                file: file.to_string(),
                expected: expected.hash.clone(),
                actual,
            });
        }
        manifest.close().map_err(KiraError::fs)?;
        info!(path = %file, "md5 hash matches");
        Ok(())
    }
}

/// Parses `<hash>  <file>` rows; lines that do not look like that are ignored.
pub fn parse_md5_manifest(text: &str) -> Vec<ManifestEntry> {
    text.lines()
        .filter_map(|line| MANIFEST_LINE.captures(line.trim_end_matches('\r')))
        .map(|caps| ManifestEntry {
            hash: caps[1].to_lowercase(),
            file_name: caps[2].to_string(),
        })
        .collect()
}

pub fn file_md5(path: &Path) -> Result<String, KiraError> {
    let mut file = File::open(path).map_err(KiraError::fs)?;
    let mut context = md5::Context::new();
    io::copy(&mut file, &mut context).map_err(KiraError::fs)?;
    Ok(format!("{:x}", context.compute()))
}

fn parent_dir(path: &Utf8Path) -> Result<&Utf8Path, KiraError> {
    match path.parent() {
        Some(parent) if parent.as_str().is_empty() => Ok(Utf8Path::new(".")),
        Some(parent) => Ok(parent),
        None => Err(KiraError::Filesystem(format!("invalid destination path: {path}"))),
    }
}
