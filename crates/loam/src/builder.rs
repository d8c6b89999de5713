//! Fluent query descriptor.
//!
//! [`QueryBuilder`] aggregates the clause tree plus joins, grouping,
//! having, ordering, limit/offset, unions, and lock mode, and owns
//! compilation (delegated to [`crate::compiler`]). Builder methods consume
//! and return `self`; identifier and operator problems are detected as the
//! offending call happens and recorded, then surfaced by `compile()`
//! before any SQL is produced.

use crate::clause::{BoolOp, ClauseGroup};
use crate::compiler;
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::value::Value;

/// One projected select item.
#[derive(Debug, Clone)]
pub enum SelectItem {
    /// A validated, quoted column reference.
    Column(Ident),
    /// A raw expression, passed through unquoted.
    Raw(String),
}

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// One join clause, rendered in declaration order.
#[derive(Debug, Clone)]
pub enum Join {
    On {
        kind: JoinKind,
        table: Ident,
        left: Ident,
        operator: String,
        right: Ident,
    },
    Raw {
        sql: String,
        bindings: Vec<Value>,
    },
}

/// HAVING target: plain identifiers are quoted, aggregate expressions
/// (anything containing parentheses or whitespace) pass through unquoted.
#[derive(Debug, Clone)]
pub enum HavingTarget {
    Column(Ident),
    Expr(String),
}

/// One HAVING clause.
#[derive(Debug, Clone)]
pub enum HavingClause {
    Cmp {
        target: HavingTarget,
        operator: String,
        value: Value,
        boolean: BoolOp,
    },
    Raw {
        sql: String,
        bindings: Vec<Value>,
        boolean: BoolOp,
    },
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One ORDER BY entry.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub(crate) target: SelectItem,
    pub(crate) direction: Direction,
}

/// One UNION sub-descriptor.
#[derive(Debug, Clone)]
pub struct Union {
    pub(crate) query: QueryBuilder,
    pub(crate) all: bool,
}

/// Row locking mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lock {
    /// Exclusive lock (`FOR UPDATE`).
    ForUpdate,
    /// Shared lock; spelling is dialect specific.
    Shared,
    /// Verbatim lock fragment.
    Raw(String),
}

/// Soft-delete visibility for entities declaring a deletion marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashedVisibility {
    /// Only live rows (marker IS NULL). The default.
    #[default]
    Exclude,
    /// Live and trashed rows.
    Include,
    /// Only trashed rows (marker IS NOT NULL).
    Only,
}

/// Fluent, composable SELECT descriptor.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    pub(crate) table: Option<Ident>,
    pub(crate) columns: Vec<SelectItem>,
    pub(crate) distinct: bool,
    pub(crate) joins: Vec<Join>,
    pub(crate) wheres: ClauseGroup,
    pub(crate) groups: Vec<Ident>,
    pub(crate) havings: Vec<HavingClause>,
    pub(crate) orders: Vec<OrderBy>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) unions: Vec<Union>,
    pub(crate) lock: Option<Lock>,
    pub(crate) soft_delete_column: Option<Ident>,
    pub(crate) trashed: TrashedVisibility,
    build_error: Option<String>,
}

impl QueryBuilder {
    /// Create a builder for the given table.
    pub fn table(table: &str) -> Self {
        let mut qb = Self::default();
        match Ident::parse(table) {
            Ok(ident) => qb.table = Some(ident),
            Err(e) => qb.record(e),
        }
        qb
    }

    fn record(&mut self, err: OrmError) {
        if self.build_error.is_none() {
            self.build_error = Some(err.to_string());
        }
    }

    pub(crate) fn first_error(&self) -> Option<&str> {
        self.build_error.as_deref().or_else(|| self.wheres.error())
    }

    // ==================== SELECT columns ====================

    /// Set the select list to validated column references.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns.clear();
        for col in columns {
            match Ident::parse(col) {
                Ok(ident) => self.columns.push(SelectItem::Column(ident)),
                Err(e) => self.record(e),
            }
        }
        self
    }

    /// Append one raw select expression, passed through unquoted.
    pub fn select_raw(mut self, expr: impl Into<String>) -> Self {
        self.columns.push(SelectItem::Raw(expr.into()));
        self
    }

    /// Emit `SELECT DISTINCT`.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ==================== JOIN ====================

    fn push_join(mut self, kind: JoinKind, table: &str, left: &str, op: &str, right: &str) -> Self {
        let join = (|| {
            Ok(Join::On {
                kind,
                table: Ident::parse(table)?,
                left: Ident::parse(left)?,
                operator: crate::clause::validate_operator(op)?,
                right: Ident::parse(right)?,
            })
        })();
        match join {
            Ok(j) => self.joins.push(j),
            Err(e) => self.record(e),
        }
        self
    }

    /// Add an INNER JOIN.
    pub fn join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.push_join(JoinKind::Inner, table, left, op, right)
    }

    /// Add a LEFT JOIN.
    pub fn left_join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.push_join(JoinKind::Left, table, left, op, right)
    }

    /// Add a RIGHT JOIN.
    pub fn right_join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.push_join(JoinKind::Right, table, left, op, right)
    }

    /// Add a raw join fragment with positional bindings.
    pub fn join_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.joins.push(Join::Raw {
            sql: sql.into(),
            bindings,
        });
        self
    }

    // ==================== WHERE ====================

    /// Add `column op value`.
    pub fn cmp(mut self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.wheres.cmp(column, op, value);
        self
    }

    /// Add `column op value` (OR-joined).
    pub fn or_cmp(mut self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.wheres.or_cmp(column, op, value);
        self
    }

    /// Add `column = value`.
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.wheres.eq(column, value);
        self
    }

    /// Add `column = value` (OR-joined).
    pub fn or_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.wheres.or_eq(column, value);
        self
    }

    /// Add `column != value`.
    pub fn ne(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.wheres.ne(column, value);
        self
    }

    /// Add `column > value`.
    pub fn gt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.wheres.gt(column, value);
        self
    }

    /// Add `column >= value`.
    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.wheres.gte(column, value);
        self
    }

    /// Add `column < value`.
    pub fn lt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.wheres.lt(column, value);
        self
    }

    /// Add `column <= value`.
    pub fn lte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.wheres.lte(column, value);
        self
    }

    /// Add `column LIKE pattern`.
    pub fn like(mut self, column: &str, pattern: impl Into<Value>) -> Self {
        self.wheres.like(column, pattern);
        self
    }

    /// Add `column IN (values...)`; an empty list compiles to `1=0`.
    pub fn in_list<T: Into<Value>>(
        mut self,
        column: &str,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        self.wheres.in_list(column, values);
        self
    }

    /// Add `column NOT IN (values...)`; an empty list compiles to `1=1`.
    pub fn not_in<T: Into<Value>>(
        mut self,
        column: &str,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        self.wheres.not_in(column, values);
        self
    }

    /// Add `column IS NULL`.
    pub fn is_null(mut self, column: &str) -> Self {
        self.wheres.is_null(column);
        self
    }

    /// Add `column IS NOT NULL`.
    pub fn is_not_null(mut self, column: &str) -> Self {
        self.wheres.is_not_null(column);
        self
    }

    /// Add `column BETWEEN low AND high`.
    pub fn between(mut self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.wheres.between(column, low, high);
        self
    }

    /// Add `column NOT BETWEEN low AND high`.
    pub fn not_between(
        mut self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.wheres.not_between(column, low, high);
        self
    }

    /// Add a raw WHERE fragment with positional bindings.
    pub fn where_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.wheres.raw(sql, bindings);
        self
    }

    /// Add a nested parenthesized group built by the callback.
    pub fn group(mut self, f: impl FnOnce(&mut ClauseGroup)) -> Self {
        self.wheres.group(f);
        self
    }

    /// Add a nested parenthesized group (OR-joined).
    pub fn or_group(mut self, f: impl FnOnce(&mut ClauseGroup)) -> Self {
        self.wheres.or_group(f);
        self
    }

    /// Add `EXISTS (subquery)`.
    pub fn exists(mut self, query: QueryBuilder) -> Self {
        self.wheres.exists(query);
        self
    }

    /// Add `NOT EXISTS (subquery)`.
    pub fn not_exists(mut self, query: QueryBuilder) -> Self {
        self.wheres.not_exists(query);
        self
    }

    /// Add `column IN (subquery)`.
    pub fn in_subquery(mut self, column: &str, query: QueryBuilder) -> Self {
        self.wheres.in_subquery(column, query);
        self
    }

    /// Add `column NOT IN (subquery)`.
    pub fn not_in_subquery(mut self, column: &str, query: QueryBuilder) -> Self {
        self.wheres.not_in_subquery(column, query);
        self
    }

    /// Add `left op right` comparing two columns.
    pub fn where_column(mut self, left: &str, op: &str, right: &str) -> Self {
        self.wheres.column_cmp(left, op, right);
        self
    }

    // ==================== GROUP BY / HAVING ====================

    /// Add GROUP BY columns.
    pub fn group_by(mut self, columns: &[&str]) -> Self {
        for col in columns {
            match Ident::parse(col) {
                Ok(ident) => self.groups.push(ident),
                Err(e) => self.record(e),
            }
        }
        self
    }

    fn having_with(mut self, boolean: BoolOp, target: &str, op: &str, value: Value) -> Self {
        let clause = (|| {
            let target = if is_expression(target) {
                HavingTarget::Expr(target.to_string())
            } else {
                HavingTarget::Column(Ident::parse(target)?)
            };
            Ok(HavingClause::Cmp {
                target,
                operator: crate::clause::validate_operator(op)?,
                value,
                boolean,
            })
        })();
        match clause {
            Ok(c) => self.havings.push(c),
            Err(e) => self.record(e),
        }
        self
    }

    /// Add a HAVING clause. Plain identifiers are quoted; aggregate
    /// expressions such as `COUNT(*)` pass through unquoted.
    pub fn having(self, target: &str, op: &str, value: impl Into<Value>) -> Self {
        self.having_with(BoolOp::And, target, op, value.into())
    }

    /// Add a HAVING clause (OR-joined).
    pub fn or_having(self, target: &str, op: &str, value: impl Into<Value>) -> Self {
        self.having_with(BoolOp::Or, target, op, value.into())
    }

    /// Add a raw HAVING fragment with positional bindings.
    pub fn having_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.havings.push(HavingClause::Raw {
            sql: sql.into(),
            bindings,
            boolean: BoolOp::And,
        });
        self
    }

    // ==================== ORDER / LIMIT / OFFSET ====================

    /// Add an ORDER BY entry.
    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        match Ident::parse(column) {
            Ok(ident) => self.orders.push(OrderBy {
                target: SelectItem::Column(ident),
                direction,
            }),
            Err(e) => self.record(e),
        }
        self
    }

    /// Add `ORDER BY column ASC`.
    pub fn order_by_asc(self, column: &str) -> Self {
        self.order_by(column, Direction::Asc)
    }

    /// Add `ORDER BY column DESC`.
    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, Direction::Desc)
    }

    /// Add a raw ORDER BY expression.
    pub fn order_by_raw(mut self, expr: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(OrderBy {
            target: SelectItem::Raw(expr.into()),
            direction,
        });
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    // ==================== UNION / LOCK ====================

    /// Append `UNION (query)`.
    pub fn union(mut self, query: QueryBuilder) -> Self {
        self.unions.push(Union { query, all: false });
        self
    }

    /// Append `UNION ALL (query)`.
    pub fn union_all(mut self, query: QueryBuilder) -> Self {
        self.unions.push(Union { query, all: true });
        self
    }

    /// Take an exclusive row lock.
    pub fn lock_for_update(mut self) -> Self {
        self.lock = Some(Lock::ForUpdate);
        self
    }

    /// Take a shared row lock.
    pub fn lock_shared(mut self) -> Self {
        self.lock = Some(Lock::Shared);
        self
    }

    /// Append a verbatim lock fragment.
    pub fn lock_raw(mut self, sql: impl Into<String>) -> Self {
        self.lock = Some(Lock::Raw(sql.into()));
        self
    }

    // ==================== Soft deletes ====================

    /// Declare the soft-delete marker column. The compiler injects the
    /// visibility predicate exactly once at compile time; nothing is
    /// stored into the clause tree, so clones never duplicate it.
    pub fn soft_deletes(mut self, column: &str) -> Self {
        match Ident::parse(column) {
            Ok(ident) => self.soft_delete_column = Some(ident),
            Err(e) => self.record(e),
        }
        self
    }

    /// Include soft-deleted rows.
    pub fn with_trashed(mut self) -> Self {
        self.trashed = TrashedVisibility::Include;
        self
    }

    /// Select only soft-deleted rows.
    pub fn only_trashed(mut self) -> Self {
        self.trashed = TrashedVisibility::Only;
        self
    }

    // ==================== Compilation ====================

    /// Compile to `(sql, bindings)` for the given dialect.
    pub fn compile(&self, dialect: Dialect) -> OrmResult<(String, Vec<Value>)> {
        compiler::compile_select(self, dialect)
    }

    /// Debug rendering with literals substituted for placeholders.
    ///
    /// Never use the result to build an executed statement.
    pub fn to_raw_sql(&self, dialect: Dialect) -> OrmResult<String> {
        let (sql, bindings) = self.compile(dialect)?;
        Ok(compiler::substitute_literals(&sql, &bindings))
    }
}

/// Whether a HAVING/select target is an expression rather than a plain
/// identifier: anything containing parentheses or whitespace.
pub(crate) fn is_expression(target: &str) -> bool {
    target.contains('(') || target.contains(char::is_whitespace)
}
