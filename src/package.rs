//! Package resolution and PKGBUILD field derivation
//!
//! Turns the loosely-structured registry records into a fully populated
//! [`Package`], applying the version resolution, artifact selection, and
//! naming rules.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use clap::ValueEnum;
use dialoguer::Input;
use regex::Regex;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::registry::{RegistryClient, ReleaseData, ReleaseUrl};
use crate::{Error, Result};

const MAX_RETRIES: usize = 5;
const RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_PROMPT_ATTEMPTS: usize = 3;

/// Filenames that qualify as a source artifact.
static SOURCEFILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i).*\.(tar|zip|gz|z|bz2?|xz)").unwrap());

/// Classifier marking a package as a library, which prefixes the output name.
static LIBRARY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Librar(ies|y)").unwrap());

/// Target python interpreter for the generated recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PyVersion {
    Python,
    Python2,
}

impl PyVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            PyVersion::Python => "python",
            PyVersion::Python2 => "python2",
        }
    }

    /// Build-time package providing setuptools for this interpreter.
    pub fn distribute_package(self) -> &'static str {
        match self {
            PyVersion::Python => "python3",
            PyVersion::Python2 => "python2-distribute",
        }
    }
}

impl std::fmt::Display for PyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the PKGBUILD template needs for one package.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub outname: String,
    pub version: String,
    pub pyversion: PyVersion,
    pub description: String,
    pub url: String,
    pub download_url: String,
    pub md5: String,
    pub license: String,
    pub depends: Vec<String>,
    pub makedepends: Vec<String>,
    pub distributepackage: String,
    pub setup_args: String,
}

impl Package {
    /// Resolve a package end to end: pick a version, fetch the release
    /// records (retrying on rate limits), and derive the recipe fields.
    pub async fn fetch(
        client: &RegistryClient,
        name: &str,
        outname: Option<&str>,
        pyversion: PyVersion,
        version: Option<&str>,
        interactive: bool,
    ) -> Result<Package> {
        let version = match version {
            // An explicit version is used verbatim, no existence check.
            Some(v) => v.to_string(),
            None => {
                let versions = client.package_releases(name).await?;
                match select_version(name, versions, interactive)? {
                    VersionChoice::Resolved(v) => v,
                    VersionChoice::Prompt(candidates) => choose_version(&candidates)?,
                }
            }
        };

        let data = call_with_retry("release_data", || client.release_data(name, &version))
            .await
            .flatten();
        info!("Got release_data from PyPI");

        let urls = call_with_retry("release_urls", || client.release_urls(name, &version))
            .await
            .unwrap_or_default();
        info!("Got release_urls from PyPI");

        Self::from_release(name, outname, pyversion, &version, data, urls)
    }

    /// Assemble a package from already-fetched release records. Pure, so
    /// the derivation rules can be exercised without a registry.
    pub fn from_release(
        name: &str,
        outname: Option<&str>,
        pyversion: PyVersion,
        version: &str,
        data: Option<ReleaseData>,
        urls: Vec<ReleaseUrl>,
    ) -> Result<Package> {
        let data = data.ok_or_else(|| {
            Error::VersionNotFound(format!(
                "PyPI did not return any information for version {version}"
            ))
        })?;

        let (download_url, md5) = select_source(&data, &urls)?;

        let distributepackage = pyversion.distribute_package().to_string();
        info!("Set distribute package as {}", distributepackage);

        let outname = match outname {
            Some(explicit) => explicit.to_lowercase(),
            None if data.classifiers.iter().any(|c| LIBRARY_RE.is_match(c)) => {
                info!("Library package, prefixing the output name with {pyversion}");
                format!("{}-{}", pyversion.as_str(), name).to_lowercase()
            }
            None => name.to_lowercase(),
        };

        let license = match data.license.as_deref() {
            None => "UNKNOWN".to_string(),
            Some(text) if text.chars().count() > 10 => "CUSTOM".to_string(),
            Some(text) => text.to_string(),
        };

        let (name, description) = match (data.name, data.summary) {
            (Some(name), Some(summary)) => (name, summary),
            _ => {
                return Err(Error::Package(
                    "PyPI did not return needed information".to_string(),
                ))
            }
        };

        Ok(Package {
            name,
            outname,
            version: version.to_string(),
            pyversion,
            description,
            url: data.home_page.unwrap_or_default(),
            download_url,
            md5,
            license,
            depends: data.requires,
            makedepends: Vec::new(),
            distributepackage,
            setup_args: String::new(),
        })
    }

    pub fn add_depends(&mut self, extra: impl IntoIterator<Item = String>) {
        self.depends.extend(extra);
    }

    pub fn add_makedepends(&mut self, extra: impl IntoIterator<Item = String>) {
        self.makedepends.extend(extra);
    }
}

#[derive(Debug, PartialEq)]
enum VersionChoice {
    Resolved(String),
    Prompt(Vec<String>),
}

/// Decide how to resolve a version from the registry's release list. With a
/// single release no prompt ever happens; several releases prompt only in
/// interactive mode and fail otherwise.
fn select_version(name: &str, mut versions: Vec<String>, interactive: bool) -> Result<VersionChoice> {
    match versions.len() {
        0 => Err(Error::VersionNotFound(format!(
            "PyPI lists no releases for {name}"
        ))),
        1 => {
            let version = versions.remove(0);
            info!("Using version {}", version);
            Ok(VersionChoice::Resolved(version))
        }
        _ if interactive => Ok(VersionChoice::Prompt(versions)),
        _ => Err(Error::Package(format!(
            "multiple versions found for {name}: {}; pick one with --pkg-version or run with --interactive",
            versions.join(", ")
        ))),
    }
}

/// Ask the user to type one of the listed versions, bounded attempts.
fn choose_version(versions: &[String]) -> Result<String> {
    println!("Multiple versions found:");
    println!("{}", versions.join(", "));
    for _ in 0..MAX_PROMPT_ATTEMPTS {
        let answer: String = Input::new()
            .with_prompt("Which version would you like to use?")
            .interact_text()?;
        let answer = answer.trim();
        if versions.iter().any(|v| v == answer) {
            return Ok(answer.to_string());
        }
        println!("That was not one of the choices, try again");
    }
    Err(Error::Package(
        "no matching version selected".to_string(),
    ))
}

/// Run one registry call, retrying on rate-limit faults with a fixed delay.
/// Any other error is logged and the call gives up with `None`, letting the
/// caller proceed with a partial result.
async fn call_with_retry<T, F, Fut>(what: &str, mut call: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=MAX_RETRIES {
        match call().await {
            Ok(value) => return Some(value),
            Err(err) if err.is_rate_limit() => {
                warn!(
                    "{}: rate limit exceeded (attempt {}/{}), retrying in {}s",
                    what,
                    attempt,
                    MAX_RETRIES,
                    RETRY_DELAY.as_secs()
                );
                sleep(RETRY_DELAY).await;
            }
            Err(err) => {
                error!("{} failed: {}", what, err);
                return None;
            }
        }
    }
    error!("{}: max retries reached, could not fetch data", what);
    None
}

/// Pick the source artifact URL and checksum. With artifact records present
/// the last filename matching the archive pattern wins; with none, the
/// declared download URL is the fallback.
fn select_source(data: &ReleaseData, urls: &[ReleaseUrl]) -> Result<(String, String)> {
    if urls.is_empty() {
        return match data.download_url.as_deref() {
            Some(url) if SOURCEFILE_RE.is_match(url) => {
                warn!("Got a download link but no md5, you may have to fill it in yourself");
                Ok((url.to_string(), String::new()))
            }
            Some(_) => Err(Error::LackOfInformation(
                "could not find any suitable source".to_string(),
            )),
            None => Err(Error::LackOfInformation(
                "PyPI did not return the necessary information to create the PKGBUILD".to_string(),
            )),
        };
    }

    urls.iter()
        .filter(|u| SOURCEFILE_RE.is_match(&u.filename))
        .next_back()
        .map(|u| (u.url.clone(), u.md5_digest.clone()))
        .ok_or_else(|| {
            Error::Package("selected package version had no suitable sources".to_string())
        })
}
