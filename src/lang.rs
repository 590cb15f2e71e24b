use serde::{Deserialize, Serialize};
use std::fmt;

/// A BCP-47-style language code, lowercased (e.g. "en", "es", "pt-br").
///
/// Used to key target pipelines within a session and to tag inbound
/// messages for routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    /// Create a language code, normalizing to lowercase.
    ///
    /// Returns `None` for an empty or non-ASCII code.
    pub fn new(code: impl AsRef<str>) -> Option<Self> {
        let code = code.as_ref().trim();
        if code.is_empty() || !code.is_ascii() {
            return None;
        }
        Some(Self(code.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageCode {
    /// Infallible conversion for literals; falls back to "und" (undetermined)
    /// when the input is unusable.
    fn from(code: &str) -> Self {
        LanguageCode::new(code).unwrap_or_else(|| Self("und".to_string()))
    }
}

macro_rules! languages {
    ($($name:ident => $code:literal),* $(,)?) => {
        $(
            pub fn $name() -> LanguageCode {
                LanguageCode(String::from($code))
            }
        )*
    };
}

/// Common language constructors.
impl LanguageCode {
    languages! {
        en => "en",
        es => "es",
        fr => "fr",
        de => "de",
        it => "it",
        pt => "pt",
        ja => "ja",
        ko => "ko",
        zh => "zh",
        ar => "ar",
        ru => "ru",
        tr => "tr",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_lowercase() {
        let lang = LanguageCode::new("ES").unwrap();
        assert_eq!(lang.as_str(), "es");
        assert_eq!(lang, LanguageCode::es());
    }

    #[test]
    fn rejects_empty_and_non_ascii() {
        assert!(LanguageCode::new("").is_none());
        assert!(LanguageCode::new("  ").is_none());
        assert!(LanguageCode::new("日本語").is_none());
    }

    #[test]
    fn serializes_transparently() {
        let lang = LanguageCode::fr();
        assert_eq!(serde_json::to_string(&lang).unwrap(), "\"fr\"");
        let back: LanguageCode = serde_json::from_str("\"fr\"").unwrap();
        assert_eq!(back, lang);
    }
}
