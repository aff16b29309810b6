//! LDAP search filter escaping (RFC 4515).

/// Escape a value for use inside an LDAP filter assertion.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\5c"),
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\0' => out.push_str("\\00"),
            _ => out.push(ch),
        }
    }
    out
}

/// Build an equality filter `attr=value` with `value` escaped.
pub fn eq_filter(attribute: &str, value: &str) -> String {
    format!("{attribute}={}", escape_filter_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_value_is_unchanged() {
        assert_eq!(eq_filter("uid", "jdoe"), "uid=jdoe");
    }

    #[test]
    fn special_characters_are_hex_escaped() {
        assert_eq!(escape_filter_value("a*b(c)d\\e\0"), "a\\2ab\\28c\\29d\\5ce\\00");
    }

    #[test]
    fn wildcard_injection_is_neutralised() {
        assert_eq!(eq_filter("uid", "*)(uid=*"), "uid=\\2a\\29\\28uid=\\2a");
    }
}
