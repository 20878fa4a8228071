//! PKGBUILD rendering
//!
//! Deterministic rendering of the fixed recipe template from a populated
//! [`Package`] and a generation date.

use std::fs;
use std::path::Path;

use chrono::{Local, NaiveDate};

use crate::package::Package;
use crate::Result;

/// Render the PKGBUILD text. Pure: the same package state and date always
/// produce byte-identical output.
pub fn render(pkg: &Package, date: NaiveDate) -> String {
    let depends = shell_array(
        std::iter::once(pkg.pyversion.as_str()).chain(pkg.depends.iter().map(String::as_str)),
    );
    let makedepends = shell_array(
        std::iter::once(pkg.distributepackage.as_str())
            .chain(pkg.makedepends.iter().map(String::as_str)),
    );
    let setup_args = if pkg.setup_args.is_empty() {
        String::new()
    } else {
        format!(" {}", pkg.setup_args)
    };

    format!(
        r#"# Automatically generated by pip2arch on {date}

pkgname={outname}
pkgver={version}
pkgrel=1
pkgdesc="{description}"
url="{url}"
depends=({depends})
makedepends=({makedepends})
license=('{license}')
arch=('any')
source=('{download_url}')
md5sums=('{md5}')

build() {{
    cd $srcdir/{name}-{version}
    {pyversion} setup.py build
}}

package() {{
    cd $srcdir/{name}-{version}
    {pyversion} setup.py install --root="$pkgdir" --optimize=1{setup_args}
}}
"#,
        date = date,
        outname = pkg.outname,
        version = pkg.version,
        description = pkg.description,
        url = pkg.url,
        depends = depends,
        makedepends = makedepends,
        license = pkg.license,
        download_url = pkg.download_url,
        md5 = pkg.md5,
        name = pkg.name,
        pyversion = pkg.pyversion,
        setup_args = setup_args,
    )
}

/// Write the recipe stamped with today's date.
pub fn write(pkg: &Package, path: &Path) -> Result<()> {
    fs::write(path, render(pkg, Local::now().date_naive()))?;
    Ok(())
}

/// Single-quoted, space-separated bash array body. Callers pass at least one
/// token, so the output is never an empty string.
fn shell_array<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items
        .into_iter()
        .map(|item| format!("'{item}'"))
        .collect::<Vec<_>>()
        .join(" ")
}
