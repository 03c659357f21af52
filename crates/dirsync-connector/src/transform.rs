//! Value transforms shared by directory clients and the sync engine.
//!
//! Filter and DN escaping (RFC 4515 / RFC 4514), RDN sanitising and
//! transliteration of accented text to plain ASCII.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Escape special characters in LDAP filter values (RFC 4515).
///
/// Characters that must be escaped: * ( ) \ NUL
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Escape special characters in DN attribute values per RFC 4514.
///
/// - Leading or trailing SPACE (escaped as \20)
/// - Leading # (escaped as \23)
/// - Characters: , + " \ < > ; = (escaped with backslash prefix)
/// - NUL character (escaped as \00)
pub fn escape_dn_value(value: &str) -> String {
    let char_count = value.chars().count();
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == char_count;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Naming value for a new RDN: commas dropped, surrounding whitespace trimmed.
///
/// The result is the attribute value; pass it through [`escape_dn_value`]
/// when building the DN.
pub fn strip_commas(value: &str) -> String {
    let stripped: String = value.chars().filter(|c| *c != ',').collect();
    stripped.trim().to_string()
}

/// Transliterate text to ASCII.
///
/// Accented letters lose their marks (é -> e), a handful of letters without a
/// decomposition get fixed spellings (ß -> ss, æ -> ae) and anything else
/// outside ASCII is dropped.
pub fn transliterate(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.nfd() {
        if ch.is_ascii() {
            out.push(ch);
            continue;
        }
        if is_combining_mark(ch) {
            continue;
        }
        if let Some(spelling) = special_spelling(ch) {
            out.push_str(spelling);
        }
    }
    out
}

fn special_spelling(ch: char) -> Option<&'static str> {
    Some(match ch {
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        'ø' => "o",
        'Ø' => "O",
        'ł' => "l",
        'Ł' => "L",
        'đ' => "d",
        'Đ' => "D",
        'þ' => "th",
        'Þ' => "TH",
        'ı' => "i",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("simple"), "simple");
        assert_eq!(escape_filter_value("a*b"), "a\\2ab");
        assert_eq!(escape_filter_value("(x)"), "\\28x\\29");
        assert_eq!(escape_filter_value("back\\slash"), "back\\5cslash");
    }

    #[test]
    fn test_escape_dn_value_special_chars() {
        assert_eq!(escape_dn_value("Doe+John"), "Doe\\+John");
        assert_eq!(escape_dn_value(" lead"), "\\20lead");
        assert_eq!(escape_dn_value("trail "), "trail\\20");
        assert_eq!(escape_dn_value("#hash"), "\\23hash");
        assert_eq!(escape_dn_value("José "), "José\\20");
        assert_eq!(escape_dn_value(""), "");
    }

    #[test]
    fn test_strip_commas() {
        assert_eq!(strip_commas("Doe, John"), "Doe John");
        assert_eq!(strip_commas("a,b,c "), "abc");
        assert_eq!(escape_dn_value(&strip_commas("x=y,")), "x\\=y");
    }

    #[test]
    fn test_transliterate_accents() {
        assert_eq!(transliterate("José Müller"), "Jose Muller");
        assert_eq!(transliterate("françoise.lefèvre"), "francoise.lefevre");
        assert_eq!(transliterate("Ñandú"), "Nandu");
    }

    #[test]
    fn test_transliterate_special_letters() {
        assert_eq!(transliterate("Straße"), "Strasse");
        assert_eq!(transliterate("Søren Æbelø"), "Soren AEbelo");
        assert_eq!(transliterate("Łukasz"), "Lukasz");
    }

    #[test]
    fn test_transliterate_drops_unknown() {
        assert_eq!(transliterate("a☃b"), "ab");
        assert_eq!(transliterate("plain"), "plain");
    }
}
