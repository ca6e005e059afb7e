//! Quoting helpers for the few places SQL text has to be assembled.

use std::path::Path;

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A filesystem path as a string literal, with forward slashes.
pub fn path_literal(path: &Path) -> String {
    quote_literal(&path.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert_eq!(quote_identifier("cases"), "\"cases\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn literals() {
        assert_eq!(quote_literal("4GB"), "'4GB'");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(
            path_literal(Path::new("data/raw/it's")),
            "'data/raw/it''s'"
        );
    }
}
