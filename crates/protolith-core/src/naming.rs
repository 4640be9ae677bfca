//! Identifier case conversions shared by passes and emitters.

/// Convert a PascalCase or camelCase identifier to snake_case.
///
/// Acronyms stay together: `HTTPServer` becomes `http_server`.
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !result.ends_with('_') {
                result.push('_');
            }
        }
        result.extend(c.to_lowercase());
    }

    result
}

/// Convert an identifier to UPPER_SNAKE_CASE.
///
/// Names without any lowercase character are assumed to already be in
/// that form and are returned unchanged.
pub fn to_upper_snake_case(s: &str) -> String {
    if !s.chars().any(char::is_lowercase) {
        return s.to_string();
    }
    to_snake_case(s).to_uppercase()
}

/// Convert a dotted, snake or lowercase segment to PascalCase
pub fn to_pascal_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = true;

    for c in s.chars() {
        if c == '_' || c == '.' || c == '-' {
            capitalize_next = true;
        } else if capitalize_next {
            result.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}

/// Uppercase the first character
pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase the first character
pub fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("DisplayName"), "display_name");
        assert_eq!(to_snake_case("displayName"), "display_name");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("Item2Count"), "item2_count");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("Id"), "id");
    }

    #[test]
    fn test_to_upper_snake_case() {
        assert_eq!(to_upper_snake_case("NotStarted"), "NOT_STARTED");
        assert_eq!(to_upper_snake_case("NOT_STARTED"), "NOT_STARTED");
        assert_eq!(to_upper_snake_case("OK"), "OK");
    }

    #[test]
    fn test_to_pascal_case() {
        assert_eq!(to_pascal_case("game"), "Game");
        assert_eq!(to_pascal_case("net_core"), "NetCore");
        assert_eq!(to_pascal_case("Shared"), "Shared");
    }

    #[test]
    fn test_first_char() {
        assert_eq!(upper_first("items"), "Items");
        assert_eq!(lower_first("ItemsLength"), "itemsLength");
        assert_eq!(lower_first(""), "");
    }
}
