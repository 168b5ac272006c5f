//! Set command implementation

use anyhow::Result;
use colored::Colorize;
use voxconf_runtime::settings::ResolverSettings;
use voxconf_runtime::{ConfigurationContext, RuntimeError};

use super::{prompt, prompt_choice};
use crate::keys::{self, KeyMatch};
use crate::table::display_value;

pub fn execute(settings: &ResolverSettings, key: &str, value: Option<String>) -> Result<()> {
    let context = ConfigurationContext::from_settings(settings)?;
    let joined = context.snapshot();

    let candidates = candidates(&joined, key);
    let selected = match candidates.len() {
        0 => {
            println!("{} No key that fits the query", "Error:".red());
            return Ok(());
        }
        1 => &candidates[0],
        count => {
            println!("{:>3}  {:40}  Value", "#", "Path");
            for (i, candidate) in candidates.iter().enumerate() {
                println!(
                    "{i:>3}  {:40}  {}",
                    candidate.joined(),
                    display_value(&candidate.value)
                );
            }
            let choice = prompt_choice(
                &format!("Which value should be changed? ({count}='Exit')"),
                count,
            )?;
            if choice == count {
                println!("{}", "User exit".red());
                return Ok(());
            }
            &candidates[choice]
        }
    };

    let input = match value {
        Some(value) => value,
        None => keys::strip_quotes(&prompt(&format!(
            "Please enter the value to be stored (type: {}) ",
            keys::type_name(&selected.value).red()
        ))?),
    };

    let user = context
        .layers()
        .user_layer()
        .ok_or(RuntimeError::NoUserLayer)?;

    let user_snapshot = user.snapshot();
    let user_list = keys::strict_get(&user_snapshot, &format!("/{}", selected.joined()))?;
    if selected.value.is_array() && user_list.is_none() {
        println!(
            "{}",
            "Note: defining lists in the user config will override subsequent list configurations"
                .dimmed()
        );
    }

    let coerced = match keys::coerce(&selected.value, &input, user_list) {
        Ok(value) => value,
        Err(e) => {
            println!("{} {e}", "Error:".red());
            return Ok(());
        }
    };

    user.merge(&keys::tree(&selected.path, coerced))?;
    user.store(None)?;
    if let Some(path) = user.origin() {
        println!("Config updated: {}", path.display());
    }
    Ok(())
}

/// Leaves matching `key`; an exact `/` path selects that leaf alone.
fn candidates(joined: &voxconf_core::ConfigMap, key: &str) -> Vec<KeyMatch> {
    let trimmed = key.trim_start_matches('/');
    if trimmed.contains('/')
        && let Ok(Some(value)) = keys::strict_get(joined, &format!("/{trimmed}"))
        && !value.is_object()
    {
        return vec![KeyMatch {
            path: keys::segments(trimmed),
            value: value.clone(),
        }];
    }
    keys::walk(joined, trimmed, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_candidates_exact_path() {
        let joined = match json!({"tts": {"module": "a", "fallback_module": "b"}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let exact = candidates(&joined, "/tts/module");
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].joined(), "tts/module");

        let loose = candidates(&joined, "module");
        assert_eq!(loose.len(), 2);
    }
}
