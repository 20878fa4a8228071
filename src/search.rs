//! Registry search, with optional interactive package selection.

use dialoguer::{Confirm, Input};
use tracing::info;

use crate::package::{Package, PyVersion};
use crate::registry::{RegistryClient, SearchHit};
use crate::Result;

/// Search the registry and print a numbered result list. In interactive
/// mode the user may pick a result, which is then resolved like a direct
/// invocation with the chosen name as output-name override.
pub async fn run(
    client: &RegistryClient,
    term: &str,
    interactive: bool,
    pyversion: PyVersion,
) -> Result<Option<Package>> {
    let term = strip_sentinel(term);
    let results = client.search(term).await?;
    info!("Got search results for term {} from PyPI", term);

    if results.is_empty() {
        println!("No packages found");
        return Ok(None);
    }
    for (i, hit) in results.iter().enumerate() {
        println!("{}. {} - {}", i + 1, hit.name, hit.summary);
    }

    if !interactive {
        return Ok(None);
    }

    let chosen = match pick_result(&results)? {
        Some(hit) => hit,
        None => return Ok(None),
    };
    let package = Package::fetch(
        client,
        &chosen.name,
        Some(&chosen.name),
        pyversion,
        None,
        true,
    )
    .await?;
    Ok(Some(package))
}

/// The search term carries a leading sentinel character, dropped before the
/// query.
fn strip_sentinel(term: &str) -> &str {
    let mut chars = term.chars();
    chars.next();
    chars.as_str()
}

/// Prompt for a 1-indexed selection. Invalid input offers a retry (default
/// yes); declining cancels the selection.
fn pick_result(results: &[SearchHit]) -> Result<Option<&SearchHit>> {
    loop {
        let line: String = Input::new()
            .with_prompt("Enter the number of the PyPI package you would like to process")
            .interact_text()?;
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=results.len()).contains(&n) => return Ok(Some(&results[n - 1])),
            _ => {
                println!(
                    "Not a valid selection. Must be an integer in range 1 - {}",
                    results.len()
                );
                if !Confirm::new()
                    .with_prompt("Retry?")
                    .default(true)
                    .interact()?
                {
                    return Ok(None);
                }
            }
        }
    }
}
