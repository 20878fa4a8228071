//! PyPI XML-RPC registry client
//!
//! Provides functionality to query the package index for releases,
//! release metadata, downloadable artifacts, and search results.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::xmlrpc::{self, Value};
use crate::{Error, Result};

pub const DEFAULT_ENDPOINT: &str = "https://pypi.org/pypi";

/// Release metadata as returned by `release_data`. Every field is optional
/// on the wire; the essential subset is enforced during field derivation,
/// not here.
#[derive(Debug, Clone, Default)]
pub struct ReleaseData {
    pub name: Option<String>,
    pub summary: Option<String>,
    pub home_page: Option<String>,
    pub license: Option<String>,
    pub classifiers: Vec<String>,
    pub requires: Vec<String>,
    pub download_url: Option<String>,
}

impl ReleaseData {
    /// `None` when the registry answered with an empty struct, which is how
    /// it signals an unknown version.
    fn from_value(value: &Value) -> Option<ReleaseData> {
        let fields = value.as_struct()?;
        if fields.is_empty() {
            return None;
        }
        Some(ReleaseData {
            name: opt_string(value.get("name")),
            summary: opt_string(value.get("summary")),
            home_page: opt_string(value.get("home_page")),
            license: opt_string(value.get("license")),
            classifiers: string_list(value.get("classifiers")),
            requires: string_list(value.get("requires")),
            download_url: opt_string(value.get("download_url")),
        })
    }
}

/// One downloadable artifact record from `release_urls`.
#[derive(Debug, Clone, Default)]
pub struct ReleaseUrl {
    pub filename: String,
    pub url: String,
    pub md5_digest: String,
    pub python_version: String,
}

impl ReleaseUrl {
    fn from_value(value: &Value) -> Option<ReleaseUrl> {
        value.as_struct()?;
        Some(ReleaseUrl {
            filename: opt_string(value.get("filename")).unwrap_or_default(),
            url: opt_string(value.get("url")).unwrap_or_default(),
            md5_digest: opt_string(value.get("md5_digest")).unwrap_or_default(),
            python_version: opt_string(value.get("python_version")).unwrap_or_default(),
        })
    }
}

/// One search result row.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub name: String,
    pub summary: String,
}

impl SearchHit {
    fn from_value(value: &Value) -> Option<SearchHit> {
        value.as_struct()?;
        Some(SearchHit {
            name: opt_string(value.get("name")).unwrap_or_default(),
            summary: opt_string(value.get("summary")).unwrap_or_default(),
        })
    }
}

fn opt_string(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_owned)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// XML-RPC client for the package index.
#[derive(Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RegistryClient {
    /// Create a client with an explicit request timeout.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pip2arch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    async fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        debug!("Calling {} on {}", method, self.endpoint);
        let body = xmlrpc::encode_call(method, params)?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Registry(format!(
                "{} request failed: {}",
                method,
                response.status()
            )));
        }

        xmlrpc::parse_response(&response.text().await?)
    }

    /// List the released version strings for a package.
    pub async fn package_releases(&self, name: &str) -> Result<Vec<String>> {
        let value = self
            .call("package_releases", &[Value::string(name)])
            .await?;
        Ok(value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Fetch release metadata; `None` when the registry has nothing for this
    /// version.
    pub async fn release_data(&self, name: &str, version: &str) -> Result<Option<ReleaseData>> {
        let value = self
            .call(
                "release_data",
                &[Value::string(name), Value::string(version)],
            )
            .await?;
        Ok(ReleaseData::from_value(&value))
    }

    /// Fetch the downloadable artifact records for a release.
    pub async fn release_urls(&self, name: &str, version: &str) -> Result<Vec<ReleaseUrl>> {
        let value = self
            .call(
                "release_urls",
                &[Value::string(name), Value::string(version)],
            )
            .await?;
        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(ReleaseUrl::from_value).collect())
            .unwrap_or_default())
    }

    /// Search the index on name and description, OR-combined.
    pub async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        let mut query = BTreeMap::new();
        query.insert("description".to_string(), Value::string(term));
        query.insert("name".to_string(), Value::string(term));
        let value = self
            .call("search", &[Value::Struct(query), Value::string("or")])
            .await?;
        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(SearchHit::from_value).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn struct_value(pairs: &[(&str, Value)]) -> Value {
        Value::Struct(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn release_data_from_empty_struct_is_none() {
        assert!(ReleaseData::from_value(&Value::Struct(BTreeMap::new())).is_none());
        assert!(ReleaseData::from_value(&Value::Array(Vec::new())).is_none());
    }

    #[test]
    fn release_data_decodes_known_fields() {
        let value = struct_value(&[
            ("name", Value::string("requests")),
            ("summary", Value::string("HTTP for Humans")),
            ("home_page", Value::string("https://example.org")),
            ("license", Value::Nil),
            (
                "classifiers",
                Value::Array(vec![Value::string(
                    "Topic :: Software Development :: Libraries",
                )]),
            ),
            ("requires", Value::Array(vec![Value::string("urllib3")])),
        ]);
        let data = ReleaseData::from_value(&value).unwrap();
        assert_eq!(data.name.as_deref(), Some("requests"));
        assert_eq!(data.summary.as_deref(), Some("HTTP for Humans"));
        // nil license decodes as absent
        assert_eq!(data.license, None);
        assert_eq!(data.requires, vec!["urllib3".to_string()]);
        assert_eq!(data.download_url, None);
    }

    #[test]
    fn release_url_defaults_missing_fields() {
        let value = struct_value(&[("filename", Value::string("pkg-1.0.tar.gz"))]);
        let url = ReleaseUrl::from_value(&value).unwrap();
        assert_eq!(url.filename, "pkg-1.0.tar.gz");
        assert_eq!(url.url, "");
        assert_eq!(url.md5_digest, "");
    }

    #[test]
    fn search_hit_skips_non_structs() {
        assert!(SearchHit::from_value(&Value::string("bogus")).is_none());
    }
}
