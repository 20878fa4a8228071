//! pip2arch: PKGBUILD generator for PyPI packages
//!
//! This crate provides tools for:
//! - Querying the PyPI XML-RPC registry for releases, artifacts, and search
//! - Resolving a release version, interactively when several exist
//! - Deriving PKGBUILD fields from loosely-structured registry records
//! - Rendering the PKGBUILD recipe from a fixed template

pub mod error;
pub mod package;
pub mod pkgbuild;
pub mod registry;
pub mod search;
pub mod xmlrpc;

pub use error::{Error, Result};
pub use package::{Package, PyVersion};
pub use registry::{RegistryClient, ReleaseData, ReleaseUrl, SearchHit};
