//! Validated SQL identifiers for table and column metadata.
//!
//! Table names may be dotted (`schema.table`), column names are a single part.
//!
//! - Unquoted parts are validated against: `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted parts (`"CamelCase"`) allow any characters except NUL and escape `"` as `""`

use crate::error::{OrmError, OrmResult};
use std::fmt;

/// A part of a SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentPart {
    /// Unquoted identifier: must match `[A-Za-z_][A-Za-z0-9_$]*`.
    Unquoted(String),
    /// Quoted identifier: allows any characters except NUL.
    Quoted(String),
}

impl IdentPart {
    /// The name without quotes.
    pub fn name(&self) -> &str {
        match self {
            IdentPart::Unquoted(s) | IdentPart::Quoted(s) => s,
        }
    }

    fn write_sql(&self, out: &mut String, force_quotes: bool) {
        match self {
            IdentPart::Unquoted(s) if !force_quotes => out.push_str(s),
            IdentPart::Unquoted(s) | IdentPart::Quoted(s) => {
                out.push('"');
                for ch in s.chars() {
                    if ch == '"' {
                        out.push('"');
                    }
                    out.push(ch);
                }
                out.push('"');
            }
        }
    }
}

/// A SQL identifier (table or column name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    parts: Vec<IdentPart>,
}

impl Ident {
    /// Parse an identifier string, supporting dotted and quoted forms.
    ///
    /// - Dotted: `schema.table`
    /// - Quoted: `"CamelCase"."UserTable"`
    /// - Mixed: `public."UserTable"`
    pub fn parse(s: &str) -> OrmResult<Self> {
        if s.is_empty() {
            return Err(OrmError::validation("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(OrmError::validation(
                "Identifier cannot contain NUL character",
            ));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            if !parts.is_empty() {
                match chars.next() {
                    Some('.') => {
                        if chars.peek().is_none() {
                            return Err(OrmError::validation(format!(
                                "Trailing '.' in identifier '{s}'"
                            )));
                        }
                    }
                    Some(c) => {
                        return Err(OrmError::validation(format!(
                            "Expected '.' between identifier parts of '{s}', got '{c}'"
                        )));
                    }
                    None => break,
                }
            }

            if chars.peek() == Some(&'"') {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('"') => {
                            if chars.peek() == Some(&'"') {
                                chars.next();
                                name.push('"');
                            } else {
                                break;
                            }
                        }
                        Some(c) => name.push(c),
                        None => {
                            return Err(OrmError::validation(format!(
                                "Unclosed quoted identifier '{s}'"
                            )));
                        }
                    }
                }
                if name.is_empty() {
                    return Err(OrmError::validation("Empty quoted identifier"));
                }
                parts.push(IdentPart::Quoted(name));
                continue;
            }

            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                let ok = if name.is_empty() {
                    c == '_' || c.is_ascii_alphabetic()
                } else {
                    c == '_' || c == '$' || c.is_ascii_alphanumeric()
                };
                if !ok {
                    return Err(OrmError::validation(format!(
                        "Invalid character '{c}' in identifier '{s}'"
                    )));
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(OrmError::validation(format!(
                    "Empty segment in identifier '{s}'"
                )));
            }
            parts.push(IdentPart::Unquoted(name));
        }

        Ok(Self { parts })
    }

    /// Parse a single-part identifier, as used for column names.
    pub fn parse_name(s: &str) -> OrmResult<Self> {
        let ident = Self::parse(s)?;
        if ident.parts.len() != 1 {
            return Err(OrmError::validation(format!(
                "Column name '{s}' must not be qualified"
            )));
        }
        Ok(ident)
    }

    /// The last part without quotes (the table or column name itself).
    pub fn name(&self) -> &str {
        self.parts.last().map(IdentPart::name).unwrap_or_default()
    }

    pub fn parts(&self) -> &[IdentPart] {
        &self.parts
    }

    /// Write the identifier as SQL, quoting every part when `force_quotes` is set.
    pub(crate) fn write_sql(&self, out: &mut String, force_quotes: bool) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            part.write_sql(out, force_quotes);
        }
    }

    /// Render the identifier as SQL.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        self.write_sql(&mut out, false);
        out
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_simple() {
        let ident = Ident::parse("users").unwrap();
        assert_eq!(ident.to_sql(), "users");
        assert_eq!(ident.name(), "users");
    }

    #[test]
    fn ident_dotted_table() {
        let ident = Ident::parse("public.users").unwrap();
        assert_eq!(ident.to_sql(), "public.users");
        assert_eq!(ident.name(), "users");
    }

    #[test]
    fn ident_quoted_with_escape() {
        let ident = Ident::parse(r#""has""quote""#).unwrap();
        assert_eq!(ident.to_sql(), r#""has""quote""#);
        assert_eq!(ident.name(), r#"has"quote"#);
    }

    #[test]
    fn forced_quotes_wrap_every_part() {
        let ident = Ident::parse(r#"public."UserTable""#).unwrap();
        let mut out = String::new();
        ident.write_sql(&mut out, true);
        assert_eq!(out, r#""public"."UserTable""#);
    }

    #[test]
    fn column_names_must_be_single_part() {
        assert!(Ident::parse_name("id").is_ok());
        assert!(Ident::parse_name("person.id").is_err());
    }

    #[test]
    fn ident_rejects_unsafe() {
        assert!(Ident::parse("").is_err());
        assert!(Ident::parse("1table").is_err());
        assert!(Ident::parse("my table").is_err());
        assert!(Ident::parse("schema..table").is_err());
        assert!(Ident::parse("schema.").is_err());
        assert!(Ident::parse(r#""unclosed"#).is_err());
        assert!(Ident::parse("users; drop table users; --").is_err());
    }
}
