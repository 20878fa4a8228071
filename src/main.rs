//! pip2arch CLI
//!
//! Command-line interface for generating Arch Linux PKGBUILDs from PyPI
//! package metadata.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use pip2arch::package::Package;
use pip2arch::registry::{RegistryClient, DEFAULT_ENDPOINT};
use pip2arch::{pkgbuild, search, PyVersion, Result};

#[derive(Parser)]
#[command(name = "pip2arch")]
#[command(about = "Convert a PyPI package into an Arch Linux PKGBUILD", long_about = None)]
#[command(version)]
struct Cli {
    /// Name of the PyPI package to process (search term with --search)
    pkgname: String,

    /// The version of the specified PyPI package to process
    #[arg(short = 'v', long)]
    pkg_version: Option<String>,

    /// The python version to build and install the package with
    #[arg(short = 'p', long = "python-version", value_enum, default_value_t = PyVersion::Python)]
    pyversion: PyVersion,

    /// The file to write the generated PKGBUILD to
    #[arg(short, long, default_value = "PKGBUILD")]
    output: PathBuf,

    /// Search for the given package name instead of building a PKGBUILD
    #[arg(short, long)]
    search: bool,

    /// Prompt for input whenever a choice has to be made
    #[arg(short, long)]
    interactive: bool,

    /// Package to add to the depends array (repeatable)
    #[arg(short = 'd', long = "dependencies")]
    depends: Vec<String>,

    /// Package to add to the makedepends array (repeatable)
    #[arg(short = 'm', long = "make-dependencies")]
    makedepends: Vec<String>,

    /// Override the name of the generated package
    #[arg(short = 'n', long = "output-package-name")]
    outname: Option<String>,

    /// Log level (warning, info, debug)
    #[arg(long, default_value = "warning", value_parser = ["warning", "info", "debug"])]
    log_level: String,

    /// Custom arguments for the setup.py install invocation
    #[arg(short = 'b', long)]
    build_args: Option<String>,

    /// XML-RPC endpoint of the package index
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    registry: String,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

fn setup_logging(level: &str) {
    let level = match level {
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    if let Err(err) = run(cli).await {
        eprintln!("pip2arch error: {err}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = RegistryClient::new(&cli.registry, Duration::from_secs(cli.timeout))?;

    let package = if cli.search {
        search::run(&client, &cli.pkgname, cli.interactive, cli.pyversion).await?
    } else {
        Some(
            Package::fetch(
                &client,
                &cli.pkgname,
                cli.outname.as_deref(),
                cli.pyversion,
                cli.pkg_version.as_deref(),
                cli.interactive,
            )
            .await?,
        )
    };

    // A search without a selection prints its results and writes nothing.
    let Some(mut package) = package else {
        return Ok(());
    };

    package.add_depends(cli.depends);
    package.add_makedepends(cli.makedepends);
    if let Some(args) = cli.build_args {
        package.setup_args = args;
    }

    println!("Got package information for {} {}", package.name, package.version);
    pkgbuild::write(&package, &cli.output)?;
    println!("PKGBUILD written to {}", cli.output.display());
    Ok(())
}
