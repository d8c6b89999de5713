//! Safe SQL identifier handling.
//!
//! [`Ident`] represents a logical identifier (table, column, or
//! `table.column`). Every segment is validated against
//! `[A-Za-z_][A-Za-z0-9_]*` at parse time; an identifier that fails is a
//! hard validation error, never silently escaped. Quoting itself is the
//! dialect's job (see [`crate::dialect::Dialect`]).
//!
//! A trailing `*` segment is allowed so `users.*` works in select lists;
//! the star renders unquoted.

use crate::error::{OrmError, OrmResult};

/// A validated SQL identifier, possibly dotted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    parts: Vec<String>,
}

impl Ident {
    /// Parse an identifier string, supporting dotted form
    /// (`schema.table.column`) and a trailing `*` (`users.*`, bare `*`).
    pub fn parse(s: &str) -> OrmResult<Self> {
        if s.is_empty() {
            return Err(OrmError::validation("Identifier cannot be empty"));
        }

        let mut parts = Vec::new();
        let raw: Vec<&str> = s.split('.').collect();
        let last = raw.len() - 1;
        for (i, part) in raw.iter().enumerate() {
            if part.is_empty() {
                return Err(OrmError::validation(format!(
                    "Empty segment in identifier '{s}'"
                )));
            }
            if *part == "*" {
                if i != last {
                    return Err(OrmError::validation(format!(
                        "'*' must be the final segment in '{s}'"
                    )));
                }
                parts.push((*part).to_string());
                continue;
            }
            validate_segment(part)?;
            parts.push((*part).to_string());
        }

        Ok(Self { parts })
    }

    /// The validated segments, in source order.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// The final segment (the column for `table.column` forms).
    pub fn name(&self) -> &str {
        // parse() guarantees at least one segment
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Whether any segment is the `*` wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.parts.iter().any(|p| p == "*")
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.parts.join("."))
    }
}

fn validate_segment(segment: &str) -> OrmResult<()> {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        Some(c) => {
            return Err(OrmError::validation(format!(
                "Invalid identifier start character: '{c}'"
            )));
        }
        None => return Err(OrmError::validation("Empty identifier segment")),
    }
    for c in chars {
        if c != '_' && !c.is_ascii_alphanumeric() {
            return Err(OrmError::validation(format!(
                "Invalid character in identifier: '{c}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_simple() {
        let ident = Ident::parse("users").unwrap();
        assert_eq!(ident.to_string(), "users");
    }

    #[test]
    fn ident_dotted() {
        let ident = Ident::parse("users.id").unwrap();
        assert_eq!(ident.parts(), ["users", "id"]);
        assert_eq!(ident.name(), "id");
    }

    #[test]
    fn ident_star() {
        assert!(Ident::parse("*").unwrap().is_wildcard());
        assert!(Ident::parse("users.*").unwrap().is_wildcard());
    }

    #[test]
    fn ident_rejects_mid_star() {
        assert!(Ident::parse("*.id").is_err());
    }

    #[test]
    fn ident_rejects_empty() {
        assert!(Ident::parse("").is_err());
    }

    #[test]
    fn ident_rejects_start_digit() {
        assert!(Ident::parse("1table").is_err());
    }

    #[test]
    fn ident_rejects_space() {
        assert!(Ident::parse("my table").is_err());
    }

    #[test]
    fn ident_rejects_double_dot() {
        assert!(Ident::parse("schema..table").is_err());
    }

    #[test]
    fn ident_rejects_trailing_dot() {
        assert!(Ident::parse("schema.").is_err());
    }

    #[test]
    fn ident_rejects_injection() {
        assert!(Ident::parse("users; DROP TABLE users").is_err());
        assert!(Ident::parse("users\"").is_err());
    }
}
