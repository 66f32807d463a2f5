// ABOUTME: String conversion helpers exposed to template expressions
// ABOUTME: Implements boolean parsing, case conversions, and quoting used by the renderer

/// Parse a human-friendly boolean string.
///
/// Accepts `true`/`1`/`yes`/`y`/`on`/`active` and their negative
/// counterparts, case-insensitively. Anything else is an error.
pub fn to_boolean(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" | "active" => Some(true),
        "false" | "0" | "no" | "n" | "off" | "inactive" => Some(false),
        _ => None,
    }
}

/// Split an identifier-ish string into lowercase words.
///
/// Boundaries are non-alphanumeric characters and lower-to-upper case
/// transitions, so `fooBar-baz_qux` becomes `["foo", "bar", "baz", "qux"]`.
fn split_words(value: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in value.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(current.to_lowercase());
                current = String::new();
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(current.to_lowercase());
            current = String::new();
        }
        prev_lower = ch.is_lowercase() || ch.is_numeric();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current.to_lowercase());
    }
    words
}

pub fn to_snake_case(value: &str) -> String {
    split_words(value).join("_")
}

pub fn to_kebab_case(value: &str) -> String {
    split_words(value).join("-")
}

pub fn to_camel_case(value: &str) -> String {
    let words = split_words(value);
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(word);
        } else {
            out.push_str(&capitalize(word));
        }
    }
    out
}

pub fn to_pascal_case(value: &str) -> String {
    split_words(value)
        .iter()
        .map(|word| capitalize(word))
        .collect()
}

pub fn to_human_case(value: &str) -> String {
    split_words(value).join(" ")
}

/// Wrap a string in double quotes, escaping backslashes and quotes.
pub fn double_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_boolean() {
        assert_eq!(to_boolean("true"), Some(true));
        assert_eq!(to_boolean("Yes"), Some(true));
        assert_eq!(to_boolean("1"), Some(true));
        assert_eq!(to_boolean("on"), Some(true));
        assert_eq!(to_boolean("false"), Some(false));
        assert_eq!(to_boolean("No"), Some(false));
        assert_eq!(to_boolean("0"), Some(false));
        assert_eq!(to_boolean("off"), Some(false));
        assert_eq!(to_boolean("maybe"), None);
    }

    #[test]
    fn test_case_conversions() {
        assert_eq!(to_snake_case("fooBar-baz"), "foo_bar_baz");
        assert_eq!(to_kebab_case("FooBar baz"), "foo-bar-baz");
        assert_eq!(to_camel_case("foo_bar_baz"), "fooBarBaz");
        assert_eq!(to_pascal_case("foo-bar"), "FooBar");
        assert_eq!(to_human_case("fooBar_baz"), "foo bar baz");
    }

    #[test]
    fn test_case_conversions_empty() {
        assert_eq!(to_snake_case(""), "");
        assert_eq!(to_pascal_case(""), "");
    }

    #[test]
    fn test_double_quote() {
        assert_eq!(double_quote("hello"), "\"hello\"");
        assert_eq!(double_quote("say \"hi\""), "\"say \\\"hi\\\"\"");
    }
}
