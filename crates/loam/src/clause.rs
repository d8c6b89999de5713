//! Predicate clause tree for WHERE conditions.
//!
//! [`Clause`] is the AST the compiler walks: composable boolean-joined
//! nodes with exact placeholder/binding alignment. [`ClauseGroup`] is the
//! incremental builder used for both a query's top-level WHERE list and
//! nested parenthesized groups.
//!
//! Identifiers and comparison operators are validated when a clause is
//! added; the first failure is recorded on the group and surfaced as a
//! validation error before any SQL is produced.

use crate::builder::QueryBuilder;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::value::Value;

/// Boolean connective joining a clause to its previous sibling.
///
/// The first sibling's connective is ignored during rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            BoolOp::And => "AND",
            BoolOp::Or => "OR",
        }
    }
}

/// Comparison operators accepted by [`ClauseGroup::cmp`] and friends.
const OPERATORS: &[&str] = &[
    "=", "<", ">", "<=", ">=", "<>", "!=", "like", "not like", "ilike", "not ilike",
];

pub(crate) fn validate_operator(op: &str) -> OrmResult<String> {
    let lowered = op.trim().to_ascii_lowercase();
    if OPERATORS.contains(&lowered.as_str()) {
        // Keyword operators render uppercase, symbols as written.
        if lowered.chars().any(|c| c.is_ascii_alphabetic()) {
            Ok(lowered.to_ascii_uppercase())
        } else {
            Ok(lowered)
        }
    } else {
        Err(OrmError::validation(format!("Invalid operator: '{op}'")))
    }
}

/// One node of the predicate tree.
#[derive(Debug, Clone)]
pub enum Clause {
    /// `column op ?`
    Basic {
        column: Ident,
        operator: String,
        value: Value,
        boolean: BoolOp,
    },
    /// `column [NOT] IN (?, ...)`; empty lists short-circuit to a constant.
    In {
        column: Ident,
        values: Vec<Value>,
        negated: bool,
        boolean: BoolOp,
    },
    /// `column IS [NOT] NULL`
    Null {
        column: Ident,
        negated: bool,
        boolean: BoolOp,
    },
    /// `column [NOT] BETWEEN ? AND ?`
    Between {
        column: Ident,
        low: Value,
        high: Value,
        negated: bool,
        boolean: BoolOp,
    },
    /// Verbatim fragment with positionally trusted bindings.
    Raw {
        sql: String,
        bindings: Vec<Value>,
        boolean: BoolOp,
    },
    /// Parenthesized sub-group, compiled recursively.
    Nested { group: ClauseGroup, boolean: BoolOp },
    /// `[NOT] EXISTS (subquery)`
    Exists {
        query: Box<QueryBuilder>,
        negated: bool,
        boolean: BoolOp,
    },
    /// `column [NOT] IN (subquery)`
    InSubquery {
        column: Ident,
        query: Box<QueryBuilder>,
        negated: bool,
        boolean: BoolOp,
    },
    /// `left op right`, both sides identifiers; no binding.
    ColumnCompare {
        left: Ident,
        operator: String,
        right: Ident,
        boolean: BoolOp,
    },
}

/// A builder for a boolean-joined clause list.
#[derive(Debug, Clone, Default)]
pub struct ClauseGroup {
    clauses: Vec<Clause>,
    error: Option<String>,
}

impl ClauseGroup {
    /// Create a new empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the group holds no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub(crate) fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub(crate) fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn fail(&mut self, err: OrmError) {
        if self.error.is_none() {
            self.error = Some(err.to_string());
        }
    }

    fn push(&mut self, clause: OrmResult<Clause>) {
        match clause {
            Ok(c) => self.clauses.push(c),
            Err(e) => self.fail(e),
        }
    }

    /// Add `column op value` joined by the given connective.
    pub fn cmp_with(
        &mut self,
        boolean: BoolOp,
        column: &str,
        operator: &str,
        value: impl Into<Value>,
    ) {
        self.push((|| {
            Ok(Clause::Basic {
                column: Ident::parse(column)?,
                operator: validate_operator(operator)?,
                value: value.into(),
                boolean,
            })
        })());
    }

    /// Add `column op value` (AND-joined).
    pub fn cmp(&mut self, column: &str, operator: &str, value: impl Into<Value>) {
        self.cmp_with(BoolOp::And, column, operator, value);
    }

    /// Add `column op value` (OR-joined).
    pub fn or_cmp(&mut self, column: &str, operator: &str, value: impl Into<Value>) {
        self.cmp_with(BoolOp::Or, column, operator, value);
    }

    /// Add `column = value`.
    pub fn eq(&mut self, column: &str, value: impl Into<Value>) {
        self.cmp(column, "=", value);
    }

    /// Add `column = value` (OR-joined).
    pub fn or_eq(&mut self, column: &str, value: impl Into<Value>) {
        self.or_cmp(column, "=", value);
    }

    /// Add `column != value`.
    pub fn ne(&mut self, column: &str, value: impl Into<Value>) {
        self.cmp(column, "!=", value);
    }

    /// Add `column > value`.
    pub fn gt(&mut self, column: &str, value: impl Into<Value>) {
        self.cmp(column, ">", value);
    }

    /// Add `column >= value`.
    pub fn gte(&mut self, column: &str, value: impl Into<Value>) {
        self.cmp(column, ">=", value);
    }

    /// Add `column < value`.
    pub fn lt(&mut self, column: &str, value: impl Into<Value>) {
        self.cmp(column, "<", value);
    }

    /// Add `column <= value`.
    pub fn lte(&mut self, column: &str, value: impl Into<Value>) {
        self.cmp(column, "<=", value);
    }

    /// Add `column LIKE pattern`.
    pub fn like(&mut self, column: &str, pattern: impl Into<Value>) {
        self.cmp(column, "like", pattern);
    }

    fn in_list_with(
        &mut self,
        boolean: BoolOp,
        column: &str,
        values: Vec<Value>,
        negated: bool,
    ) {
        self.push((|| {
            Ok(Clause::In {
                column: Ident::parse(column)?,
                values,
                negated,
                boolean,
            })
        })());
    }

    /// Add `column IN (values...)`. An empty list compiles to `1=0`.
    pub fn in_list<T: Into<Value>>(&mut self, column: &str, values: impl IntoIterator<Item = T>) {
        let values = values.into_iter().map(Into::into).collect();
        self.in_list_with(BoolOp::And, column, values, false);
    }

    /// Add `column IN (values...)` (OR-joined).
    pub fn or_in_list<T: Into<Value>>(&mut self, column: &str, values: impl IntoIterator<Item = T>) {
        let values = values.into_iter().map(Into::into).collect();
        self.in_list_with(BoolOp::Or, column, values, false);
    }

    /// Add `column NOT IN (values...)`. An empty list compiles to `1=1`.
    pub fn not_in<T: Into<Value>>(&mut self, column: &str, values: impl IntoIterator<Item = T>) {
        let values = values.into_iter().map(Into::into).collect();
        self.in_list_with(BoolOp::And, column, values, true);
    }

    fn null_with(&mut self, boolean: BoolOp, column: &str, negated: bool) {
        self.push((|| {
            Ok(Clause::Null {
                column: Ident::parse(column)?,
                negated,
                boolean,
            })
        })());
    }

    /// Add `column IS NULL`.
    pub fn is_null(&mut self, column: &str) {
        self.null_with(BoolOp::And, column, false);
    }

    /// Add `column IS NOT NULL`.
    pub fn is_not_null(&mut self, column: &str) {
        self.null_with(BoolOp::And, column, true);
    }

    /// Add `column IS NULL` (OR-joined).
    pub fn or_is_null(&mut self, column: &str) {
        self.null_with(BoolOp::Or, column, false);
    }

    fn between_with(
        &mut self,
        boolean: BoolOp,
        column: &str,
        low: Value,
        high: Value,
        negated: bool,
    ) {
        self.push((|| {
            Ok(Clause::Between {
                column: Ident::parse(column)?,
                low,
                high,
                negated,
                boolean,
            })
        })());
    }

    /// Add `column BETWEEN low AND high`.
    pub fn between(&mut self, column: &str, low: impl Into<Value>, high: impl Into<Value>) {
        self.between_with(BoolOp::And, column, low.into(), high.into(), false);
    }

    /// Add `column NOT BETWEEN low AND high`.
    pub fn not_between(&mut self, column: &str, low: impl Into<Value>, high: impl Into<Value>) {
        self.between_with(BoolOp::And, column, low.into(), high.into(), true);
    }

    /// Add a raw fragment with positional bindings.
    ///
    /// # Safety
    /// The fragment is inserted verbatim and its bindings are trusted
    /// positionally; be careful with SQL injection.
    pub fn raw(&mut self, sql: impl Into<String>, bindings: Vec<Value>) {
        self.clauses.push(Clause::Raw {
            sql: sql.into(),
            bindings,
            boolean: BoolOp::And,
        });
    }

    /// Add a raw fragment (OR-joined).
    pub fn or_raw(&mut self, sql: impl Into<String>, bindings: Vec<Value>) {
        self.clauses.push(Clause::Raw {
            sql: sql.into(),
            bindings,
            boolean: BoolOp::Or,
        });
    }

    fn group_with(&mut self, boolean: BoolOp, f: impl FnOnce(&mut ClauseGroup)) {
        let mut group = ClauseGroup::new();
        f(&mut group);
        if let Some(err) = group.error.take() {
            self.fail(OrmError::validation(err));
            return;
        }
        self.clauses.push(Clause::Nested { group, boolean });
    }

    /// Add a nested parenthesized group built by the callback.
    pub fn group(&mut self, f: impl FnOnce(&mut ClauseGroup)) {
        self.group_with(BoolOp::And, f);
    }

    /// Add a nested parenthesized group (OR-joined).
    pub fn or_group(&mut self, f: impl FnOnce(&mut ClauseGroup)) {
        self.group_with(BoolOp::Or, f);
    }

    fn exists_with(&mut self, boolean: BoolOp, query: QueryBuilder, negated: bool) {
        self.clauses.push(Clause::Exists {
            query: Box::new(query),
            negated,
            boolean,
        });
    }

    /// Add `EXISTS (subquery)`.
    pub fn exists(&mut self, query: QueryBuilder) {
        self.exists_with(BoolOp::And, query, false);
    }

    /// Add `NOT EXISTS (subquery)`.
    pub fn not_exists(&mut self, query: QueryBuilder) {
        self.exists_with(BoolOp::And, query, true);
    }

    /// Add `EXISTS (subquery)` (OR-joined).
    pub fn or_exists(&mut self, query: QueryBuilder) {
        self.exists_with(BoolOp::Or, query, false);
    }

    fn in_subquery_with(
        &mut self,
        boolean: BoolOp,
        column: &str,
        query: QueryBuilder,
        negated: bool,
    ) {
        self.push((|| {
            Ok(Clause::InSubquery {
                column: Ident::parse(column)?,
                query: Box::new(query),
                negated,
                boolean,
            })
        })());
    }

    /// Add `column IN (subquery)`.
    pub fn in_subquery(&mut self, column: &str, query: QueryBuilder) {
        self.in_subquery_with(BoolOp::And, column, query, false);
    }

    /// Add `column NOT IN (subquery)`.
    pub fn not_in_subquery(&mut self, column: &str, query: QueryBuilder) {
        self.in_subquery_with(BoolOp::And, column, query, true);
    }

    /// Add `left op right` comparing two columns; emits no binding.
    pub fn column_cmp(&mut self, left: &str, operator: &str, right: &str) {
        self.push((|| {
            Ok(Clause::ColumnCompare {
                left: Ident::parse(left)?,
                operator: validate_operator(operator)?,
                right: Ident::parse(right)?,
                boolean: BoolOp::And,
            })
        })());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_whitelist() {
        assert_eq!(validate_operator("=").unwrap(), "=");
        assert_eq!(validate_operator("LIKE").unwrap(), "LIKE");
        assert_eq!(validate_operator("not like").unwrap(), "NOT LIKE");
        assert!(validate_operator("; DROP").is_err());
        assert!(validate_operator("==").is_err());
    }

    #[test]
    fn bad_identifier_records_error() {
        let mut group = ClauseGroup::new();
        group.eq("not a column", 1);
        assert!(group.error().is_some());
        assert!(group.is_empty());
    }

    #[test]
    fn nested_group_error_propagates() {
        let mut group = ClauseGroup::new();
        group.group(|g| g.eq("1bad", 1));
        assert!(group.error().is_some());
    }

    #[test]
    fn first_error_wins() {
        let mut group = ClauseGroup::new();
        group.cmp("a", "bogus", 1);
        group.eq("also bad", 2);
        assert!(group.error().unwrap().contains("bogus"));
    }
}
