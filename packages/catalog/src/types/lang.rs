use serde::{Deserialize, Serialize};

/// One title or description variant in a specific language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub lang: String,
    pub text: String,
}

impl LocalizedText {
    pub fn new(lang: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            text: text.into(),
        }
    }
}

/// Normalize a scraped language list: trim, map common names and legacy
/// region tags to short codes, drop empties, dedupe preserving order.
pub fn normalize_languages(languages: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in languages {
        let lower = raw.trim().to_lowercase();
        if lower.is_empty() {
            continue;
        }
        let code = match lower.as_str() {
            "english" | "eng" => "en".to_string(),
            "chinese" | "zho" | "chi" => "zh".to_string(),
            "zh-cn" | "simplified chinese" => "zh-hans".to_string(),
            "zh-tw" | "zh-hk" | "traditional chinese" => "zh-hant".to_string(),
            "japanese" | "jpn" => "ja".to_string(),
            "korean" | "kor" => "ko".to_string(),
            "french" | "fra" | "fre" => "fr".to_string(),
            "german" | "deu" | "ger" => "de".to_string(),
            "spanish" | "spa" => "es".to_string(),
            "italian" | "ita" => "it".to_string(),
            "russian" | "rus" => "ru".to_string(),
            _ => lower,
        };
        if !out.contains(&code) {
            out.push(code);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn maps_names_and_dedupes_preserving_order() {
        let got = normalize_languages(&v(&["English", " en ", "zh-CN", "Chinese", ""]));
        assert_eq!(got, v(&["en", "zh-hans", "zh"]));
    }

    #[test]
    fn unknown_tags_pass_through_lowercased() {
        let got = normalize_languages(&v(&["PT-BR"]));
        assert_eq!(got, v(&["pt-br"]));
    }
}
