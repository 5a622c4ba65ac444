//! Language routing for enrichment prompts. No runtime localization: a
//! language code is purely an input to the LLM prompt contract.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    En,
    Ru,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only English and Russian are recognized, the latter widened to cover
/// Ukrainian and Belarusian at the caller. Any other code, or
/// none at all, degrades to English. Accepts BCP-47-ish tags with a
/// region subtag (`ru-RU`) by matching on the primary subtag only.
pub fn parse_lang(code: Option<&str>) -> Language {
    let Some(code) = code else { return Language::En };
    let primary = code.split(['-', '_']).next().unwrap_or("").trim().to_lowercase();
    match primary.as_str() {
        "ru" | "uk" | "be" => Language::Ru,
        _ => Language::En,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_subtag_is_ignored() {
        assert_eq!(parse_lang(Some("ru-RU")), Language::Ru);
    }

    #[test]
    fn ukrainian_widens_to_russian_prompting() {
        assert_eq!(parse_lang(Some("uk")), Language::Ru);
        assert_eq!(parse_lang(Some("be")), Language::Ru);
    }

    #[test]
    fn unrecognized_code_degrades_to_english() {
        assert_eq!(parse_lang(Some("fr")), Language::En);
        assert_eq!(parse_lang(None), Language::En);
    }
}
