//! Language tag normalisation for `autoconfigure`.

/// Region assumed for a bare language code.
const DEFAULT_REGIONS: &[(&str, &str)] = &[
    ("ar", "SA"),
    ("bg", "BG"),
    ("ca", "ES"),
    ("cs", "CZ"),
    ("da", "DK"),
    ("de", "DE"),
    ("el", "GR"),
    ("en", "US"),
    ("es", "ES"),
    ("eu", "ES"),
    ("fa", "IR"),
    ("fi", "FI"),
    ("fr", "FR"),
    ("gl", "ES"),
    ("he", "IL"),
    ("hi", "IN"),
    ("hr", "HR"),
    ("hu", "HU"),
    ("it", "IT"),
    ("ja", "JP"),
    ("ko", "KR"),
    ("nb", "NO"),
    ("nl", "NL"),
    ("pl", "PL"),
    ("pt", "PT"),
    ("ro", "RO"),
    ("ru", "RU"),
    ("sk", "SK"),
    ("sl", "SI"),
    ("sv", "SE"),
    ("tr", "TR"),
    ("uk", "UA"),
    ("zh", "CN"),
];

/// Normalises a language tag to `ll-RR` form.
///
/// `_` separators are accepted, the language is lowercased and the region
/// uppercased. A bare code gets its default region when one is known; a
/// four-letter script subtag is title-cased and kept.
pub fn standardize(tag: &str) -> String {
    let mut parts = tag.trim().split(['-', '_']).filter(|p| !p.is_empty());
    let Some(language) = parts.next() else {
        return String::new();
    };
    let language = match language.to_lowercase().as_str() {
        "no" => "nb".to_string(),
        other => other.to_string(),
    };

    let mut subtags = vec![language.clone()];
    for part in parts {
        subtags.push(match part.len() {
            4 => title_case(part),
            _ => part.to_uppercase(),
        });
    }

    let has_region = subtags.iter().skip(1).any(|s| s.len() != 4);
    if !has_region
        && let Some((_, region)) = DEFAULT_REGIONS.iter().find(|(code, _)| *code == language)
    {
        subtags.push((*region).to_string());
    }
    subtags.join("-")
}

/// The language subtag of a tag, lowercased.
pub fn primary(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn title_case(part: &str) -> String {
    let lower = part.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardize_region_casing() {
        assert_eq!(standardize("en-us"), "en-US");
        assert_eq!(standardize("PT_br"), "pt-BR");
        assert_eq!(standardize(" de-DE "), "de-DE");
    }

    #[test]
    fn test_standardize_bare_code() {
        assert_eq!(standardize("pt"), "pt-PT");
        assert_eq!(standardize("EN"), "en-US");
        assert_eq!(standardize("no"), "nb-NO");
        assert_eq!(standardize("xx"), "xx");
    }

    #[test]
    fn test_standardize_script() {
        assert_eq!(standardize("zh-hant"), "zh-Hant-CN");
        assert_eq!(standardize("sr-latn-rs"), "sr-Latn-RS");
    }

    #[test]
    fn test_primary() {
        assert_eq!(primary("pt-BR"), "pt");
        assert_eq!(primary("EN_us"), "en");
    }
}
