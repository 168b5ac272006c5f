//! Get command implementation

use anyhow::Result;
use colored::Colorize;
use voxconf_runtime::ConfigurationContext;
use voxconf_runtime::settings::ResolverSettings;

use crate::keys;
use crate::table::display_value;

pub fn execute(settings: &ResolverSettings, key: &str) -> Result<()> {
    let joined = ConfigurationContext::from_settings(settings)?.snapshot();

    if key.contains('/') {
        match keys::strict_get(&joined, key) {
            Ok(Some(value)) => println!("{}", display_value(value).red()),
            Ok(None) => eprintln!("No value at {key}"),
            Err(e) => println!("{e}"),
        }
        return Ok(());
    }

    let found = keys::walk(&joined, key, false);
    if found.is_empty() {
        println!("No key with the name {key} found");
    }
    for hit in found {
        println!(
            "Value: {}, found in {}",
            display_value(&hit.value).red(),
            format!("/{}", hit.joined()).red()
        );
    }
    Ok(())
}
