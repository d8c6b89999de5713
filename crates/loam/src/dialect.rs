//! Dialect-specific rendering rules.
//!
//! A [`Dialect`] knows how to quote validated identifiers, how to spell
//! lock clauses, and how to map logical column types to DDL tokens (the
//! last is consumed by external schema tooling, not by the compiler).

use crate::builder::Lock;
use crate::ident::Ident;

/// SQL rendering rules for one family of database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Backtick quoting (`` `users` ``), MySQL-style locks.
    MySql,
    /// ANSI double-quote quoting (`"users"`); PostgreSQL, SQLite.
    #[default]
    Ansi,
    /// Bracket quoting (`[users]`).
    SqlServer,
}

impl Dialect {
    /// Quote a single already-validated segment.
    fn quote_segment(self, segment: &str) -> String {
        if segment == "*" {
            return segment.to_string();
        }
        match self {
            Dialect::MySql => format!("`{segment}`"),
            Dialect::Ansi => format!("\"{segment}\""),
            Dialect::SqlServer => format!("[{segment}]"),
        }
    }

    /// Render a (possibly dotted) identifier, quoting each segment
    /// independently.
    pub fn quote(self, ident: &Ident) -> String {
        let mut out = String::new();
        for (i, part) in ident.parts().iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push_str(&self.quote_segment(part));
        }
        out
    }

    /// Render a lock clause, or nothing when the engine has no suffix
    /// spelling for it. Raw locks pass through verbatim on every engine.
    pub fn lock_sql(self, lock: &Lock) -> Option<String> {
        match (self, lock) {
            (_, Lock::Raw(sql)) => Some(sql.clone()),
            (Dialect::MySql, Lock::ForUpdate) => Some("FOR UPDATE".to_string()),
            (Dialect::MySql, Lock::Shared) => Some("LOCK IN SHARE MODE".to_string()),
            (Dialect::Ansi, Lock::ForUpdate) => Some("FOR UPDATE".to_string()),
            (Dialect::Ansi, Lock::Shared) => Some("FOR SHARE".to_string()),
            // Hint syntax lives mid-statement; only the raw escape hatch applies.
            (Dialect::SqlServer, _) => None,
        }
    }

    /// Map a logical column type to this engine's DDL token.
    pub fn column_type_sql(self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::Boolean => match self {
                Dialect::SqlServer => "BIT".to_string(),
                Dialect::MySql => "TINYINT(1)".to_string(),
                Dialect::Ansi => "BOOLEAN".to_string(),
            },
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Float => match self {
                Dialect::MySql | Dialect::Ansi => "DOUBLE PRECISION".to_string(),
                Dialect::SqlServer => "FLOAT".to_string(),
            },
            ColumnType::Text => match self {
                Dialect::SqlServer => "NVARCHAR(MAX)".to_string(),
                _ => "TEXT".to_string(),
            },
            ColumnType::VarChar(len) => match self {
                Dialect::SqlServer => format!("NVARCHAR({len})"),
                _ => format!("VARCHAR({len})"),
            },
            ColumnType::Timestamp => match self {
                Dialect::SqlServer => "DATETIME2".to_string(),
                _ => "TIMESTAMP".to_string(),
            },
            ColumnType::Binary => match self {
                Dialect::MySql => "BLOB".to_string(),
                Dialect::Ansi => "BYTEA".to_string(),
                Dialect::SqlServer => "VARBINARY(MAX)".to_string(),
            },
        }
    }
}

/// Logical column types, mapped to DDL tokens per dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Integer,
    BigInteger,
    Float,
    Text,
    VarChar(u32),
    Timestamp,
    Binary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_styles() {
        let ident = Ident::parse("users.id").unwrap();
        assert_eq!(Dialect::MySql.quote(&ident), "`users`.`id`");
        assert_eq!(Dialect::Ansi.quote(&ident), "\"users\".\"id\"");
        assert_eq!(Dialect::SqlServer.quote(&ident), "[users].[id]");
    }

    #[test]
    fn star_is_not_quoted() {
        let ident = Ident::parse("users.*").unwrap();
        assert_eq!(Dialect::MySql.quote(&ident), "`users`.*");
    }

    #[test]
    fn lock_spellings() {
        assert_eq!(
            Dialect::MySql.lock_sql(&Lock::Shared).as_deref(),
            Some("LOCK IN SHARE MODE")
        );
        assert_eq!(
            Dialect::Ansi.lock_sql(&Lock::Shared).as_deref(),
            Some("FOR SHARE")
        );
        assert_eq!(Dialect::SqlServer.lock_sql(&Lock::ForUpdate), None);
        assert_eq!(
            Dialect::SqlServer
                .lock_sql(&Lock::Raw("WITH (UPDLOCK)".into()))
                .as_deref(),
            Some("WITH (UPDLOCK)")
        );
    }

    #[test]
    fn column_type_tokens() {
        assert_eq!(
            Dialect::MySql.column_type_sql(&ColumnType::Boolean),
            "TINYINT(1)"
        );
        assert_eq!(
            Dialect::Ansi.column_type_sql(&ColumnType::VarChar(255)),
            "VARCHAR(255)"
        );
        assert_eq!(
            Dialect::SqlServer.column_type_sql(&ColumnType::Text),
            "NVARCHAR(MAX)"
        );
    }
}
