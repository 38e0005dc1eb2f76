//! Deterministic names derived from a capability's qualified type path.

/// Separator used between path segments in generated accessor names
const SEGMENT_SEPARATOR: &str = "__";

/// Derive the implicit accessor name for a capability module
///
/// `foo::Methods` becomes `_foo__methods`. Path separators collapse to a
/// double underscore, CamelCase segments become snake_case and any other
/// punctuation (generic brackets, commas, spaces) becomes a single
/// underscore.
pub fn accessor_name(qualified_name: &str) -> String {
    let segments: Vec<String> = qualified_name
        .split("::")
        .filter(|segment| !segment.is_empty())
        .map(normalize_segment)
        .collect();

    format!("_{}", segments.join(SEGMENT_SEPARATOR))
}

/// Last path segment of a qualified name, ignoring generic arguments
pub fn short_name(qualified_name: &str) -> &str {
    let base = qualified_name
        .split_once('<')
        .map_or(qualified_name, |(base, _)| base);
    base.rsplit("::").next().unwrap_or(base)
}

fn normalize_segment(segment: &str) -> String {
    let snake = camel_to_snake(segment);
    let mut result = String::with_capacity(snake.len());
    let mut last_was_underscore = false;

    for ch in snake.chars() {
        if ch.is_ascii_alphanumeric() {
            result.push(ch);
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    result.trim_matches('_').to_string()
}

/// CamelCase to snake_case, keeping acronyms together (`VSCodeSettings` -> `vs_code_settings`)
pub fn camel_to_snake(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                result.push('_');
            }
        }
        result.extend(ch.to_lowercase());
    }

    result
}

/// Checks that `name` can be installed as a forwarder
///
/// Accepts an identifier optionally followed by one of `?`, `!` or `=`.
pub fn is_valid_method_name(name: &str) -> bool {
    let body = name
        .strip_suffix(&['?', '!', '='][..])
        .unwrap_or(name);

    let mut chars = body.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessor_name() {
        assert_eq!(accessor_name("Foo::Methods"), "_foo__methods");
        assert_eq!(accessor_name("foo::Methods"), "_foo__methods");
        assert_eq!(
            accessor_name("sandboxed_methods::capabilities::counter::Counter"),
            "_sandboxed_methods__capabilities__counter__counter"
        );
        assert_eq!(accessor_name("Bar"), "_bar");
    }

    #[test]
    fn test_accessor_name_with_generics() {
        assert_eq!(
            accessor_name("app::Cache<alloc::string::String>"),
            "_app__cache_alloc__string__string"
        );
    }

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("SimpleCase"), "simple_case");
        assert_eq!(camel_to_snake("CamelCaseExample"), "camel_case_example");
        assert_eq!(camel_to_snake("VSCodeSettings"), "vs_code_settings");
        assert_eq!(camel_to_snake("Methods"), "methods");
        assert_eq!(camel_to_snake("already_snake"), "already_snake");
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("foo::Methods"), "Methods");
        assert_eq!(short_name("Counter"), "Counter");
        assert_eq!(short_name("app::Cache<alloc::string::String>"), "Cache");
    }

    #[test]
    fn test_is_valid_method_name() {
        assert!(is_valid_method_name("foo"));
        assert!(is_valid_method_name("_private"));
        assert!(is_valid_method_name("name="));
        assert!(is_valid_method_name("empty?"));
        assert!(is_valid_method_name("reset!"));
        assert!(is_valid_method_name("v2"));

        assert!(!is_valid_method_name(""));
        assert!(!is_valid_method_name("="));
        assert!(!is_valid_method_name("2fast"));
        assert!(!is_valid_method_name("with space"));
        assert!(!is_valid_method_name("a=="));
        assert!(!is_valid_method_name("foo::bar"));
    }
}
