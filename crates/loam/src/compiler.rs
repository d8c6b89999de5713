//! Clause-tree to SQL compilation.
//!
//! Every `?` placeholder is emitted together with its binding, so the
//! binding vector always lines up with the placeholders in textual order,
//! including across nested groups, subqueries, raw fragments and unions.

use crate::builder::{HavingClause, HavingTarget, Join, QueryBuilder, SelectItem, TrashedVisibility};
use crate::clause::{Clause, ClauseGroup};
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::value::Value;

/// Compile a SELECT descriptor to `(sql, bindings)`.
pub(crate) fn compile_select(qb: &QueryBuilder, dialect: Dialect) -> OrmResult<(String, Vec<Value>)> {
    if let Some(err) = qb.first_error() {
        return Err(OrmError::validation(err));
    }
    let table = qb
        .table
        .as_ref()
        .ok_or_else(|| OrmError::validation("query has no table"))?;

    let mut sql = String::from("SELECT ");
    let mut bindings = Vec::new();

    if qb.distinct {
        sql.push_str("DISTINCT ");
    }
    if qb.columns.is_empty() {
        sql.push('*');
    } else {
        for (i, item) in qb.columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            match item {
                SelectItem::Column(ident) => sql.push_str(&dialect.quote(ident)),
                SelectItem::Raw(expr) => sql.push_str(expr),
            }
        }
    }
    sql.push_str(" FROM ");
    sql.push_str(&dialect.quote(table));

    for join in &qb.joins {
        sql.push(' ');
        match join {
            Join::On {
                kind,
                table,
                left,
                operator,
                right,
            } => {
                sql.push_str(kind.sql());
                sql.push(' ');
                sql.push_str(&dialect.quote(table));
                sql.push_str(" ON ");
                sql.push_str(&dialect.quote(left));
                sql.push(' ');
                sql.push_str(operator);
                sql.push(' ');
                sql.push_str(&dialect.quote(right));
            }
            Join::Raw { sql: frag, bindings: b } => {
                sql.push_str(frag);
                bindings.extend(b.iter().cloned());
            }
        }
    }

    let mut where_sql = render_group(&qb.wheres, dialect, &mut bindings)?;
    // The soft-delete predicate is injected here at render time only, so
    // it appears exactly once no matter how often the builder is cloned
    // or recompiled.
    if let Some(marker) = &qb.soft_delete_column {
        let predicate = match qb.trashed {
            TrashedVisibility::Exclude => Some(format!("{} IS NULL", dialect.quote(marker))),
            TrashedVisibility::Only => Some(format!("{} IS NOT NULL", dialect.quote(marker))),
            TrashedVisibility::Include => None,
        };
        if let Some(p) = predicate {
            where_sql = Some(match where_sql {
                Some(existing) => format!("{existing} AND {p}"),
                None => p,
            });
        }
    }
    if let Some(w) = where_sql {
        sql.push_str(" WHERE ");
        sql.push_str(&w);
    }

    if !qb.groups.is_empty() {
        sql.push_str(" GROUP BY ");
        for (i, col) in qb.groups.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&dialect.quote(col));
        }
    }

    if !qb.havings.is_empty() {
        sql.push_str(" HAVING ");
        for (i, having) in qb.havings.iter().enumerate() {
            match having {
                HavingClause::Cmp {
                    target,
                    operator,
                    value,
                    boolean,
                } => {
                    if i > 0 {
                        sql.push(' ');
                        sql.push_str(boolean.sql());
                        sql.push(' ');
                    }
                    match target {
                        HavingTarget::Column(ident) => sql.push_str(&dialect.quote(ident)),
                        HavingTarget::Expr(expr) => sql.push_str(expr),
                    }
                    sql.push(' ');
                    sql.push_str(operator);
                    sql.push_str(" ?");
                    bindings.push(value.clone());
                }
                HavingClause::Raw {
                    sql: frag,
                    bindings: b,
                    boolean,
                } => {
                    if i > 0 {
                        sql.push(' ');
                        sql.push_str(boolean.sql());
                        sql.push(' ');
                    }
                    sql.push_str(frag);
                    bindings.extend(b.iter().cloned());
                }
            }
        }
    }

    if !qb.orders.is_empty() {
        sql.push_str(" ORDER BY ");
        for (i, order) in qb.orders.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            match &order.target {
                SelectItem::Column(ident) => sql.push_str(&dialect.quote(ident)),
                SelectItem::Raw(expr) => sql.push_str(expr),
            }
            sql.push(' ');
            sql.push_str(order.direction.sql());
        }
    }

    // Limit and offset are validated u64 values and render inline.
    if let Some(limit) = qb.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = qb.offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }

    for union in &qb.unions {
        let (sub_sql, sub_bindings) = compile_select(&union.query, dialect)?;
        sql.push_str(if union.all { " UNION ALL " } else { " UNION " });
        sql.push_str(&sub_sql);
        bindings.extend(sub_bindings);
    }

    if let Some(lock) = &qb.lock {
        if let Some(frag) = dialect.lock_sql(lock) {
            sql.push(' ');
            sql.push_str(&frag);
        }
    }

    Ok((sql, bindings))
}

/// Render a clause group to a WHERE fragment, pushing bindings in textual
/// order. Returns `None` when nothing renders (empty group, or only empty
/// nested groups).
fn render_group(
    group: &ClauseGroup,
    dialect: Dialect,
    bindings: &mut Vec<Value>,
) -> OrmResult<Option<String>> {
    if let Some(err) = group.error() {
        return Err(OrmError::validation(err));
    }
    let mut out = String::new();
    for clause in group.clauses() {
        let Some((fragment, boolean)) = render_clause(clause, dialect, bindings)? else {
            continue;
        };
        if !out.is_empty() {
            out.push(' ');
            out.push_str(boolean.sql());
            out.push(' ');
        }
        out.push_str(&fragment);
    }
    Ok(if out.is_empty() { None } else { Some(out) })
}

fn render_clause(
    clause: &Clause,
    dialect: Dialect,
    bindings: &mut Vec<Value>,
) -> OrmResult<Option<(String, crate::clause::BoolOp)>> {
    let rendered = match clause {
        Clause::Basic {
            column,
            operator,
            value,
            boolean,
        } => {
            bindings.push(value.clone());
            (format!("{} {} ?", dialect.quote(column), operator), *boolean)
        }
        Clause::In {
            column,
            values,
            negated,
            boolean,
        } => {
            if values.is_empty() {
                // Matching against an empty set is decidable without
                // touching the database.
                let constant = if *negated { "1=1" } else { "1=0" };
                (constant.to_string(), *boolean)
            } else {
                let placeholders = vec!["?"; values.len()].join(", ");
                bindings.extend(values.iter().cloned());
                let keyword = if *negated { "NOT IN" } else { "IN" };
                (
                    format!("{} {} ({})", dialect.quote(column), keyword, placeholders),
                    *boolean,
                )
            }
        }
        Clause::Null {
            column,
            negated,
            boolean,
        } => {
            let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
            (format!("{} {}", dialect.quote(column), keyword), *boolean)
        }
        Clause::Between {
            column,
            low,
            high,
            negated,
            boolean,
        } => {
            bindings.push(low.clone());
            bindings.push(high.clone());
            let keyword = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
            (
                format!("{} {} ? AND ?", dialect.quote(column), keyword),
                *boolean,
            )
        }
        Clause::Raw {
            sql,
            bindings: b,
            boolean,
        } => {
            bindings.extend(b.iter().cloned());
            (sql.clone(), *boolean)
        }
        Clause::Nested { group, boolean } => {
            match render_group(group, dialect, bindings)? {
                Some(inner) => (format!("({inner})"), *boolean),
                None => return Ok(None),
            }
        }
        Clause::Exists {
            query,
            negated,
            boolean,
        } => {
            let (sub_sql, sub_bindings) = compile_select(query, dialect)?;
            bindings.extend(sub_bindings);
            let keyword = if *negated { "NOT EXISTS" } else { "EXISTS" };
            (format!("{keyword} ({sub_sql})"), *boolean)
        }
        Clause::InSubquery {
            column,
            query,
            negated,
            boolean,
        } => {
            let (sub_sql, sub_bindings) = compile_select(query, dialect)?;
            bindings.extend(sub_bindings);
            let keyword = if *negated { "NOT IN" } else { "IN" };
            (
                format!("{} {} ({})", dialect.quote(column), keyword, sub_sql),
                *boolean,
            )
        }
        Clause::ColumnCompare {
            left,
            operator,
            right,
            boolean,
        } => (
            format!(
                "{} {} {}",
                dialect.quote(left),
                operator,
                dialect.quote(right)
            ),
            *boolean,
        ),
    };
    Ok(Some(rendered))
}

/// Compile a (possibly multi-row) INSERT statement.
pub(crate) fn compile_insert(
    dialect: Dialect,
    table: &Ident,
    columns: &[Ident],
    rows: &[Vec<Value>],
) -> OrmResult<(String, Vec<Value>)> {
    if columns.is_empty() || rows.is_empty() {
        return Err(OrmError::validation("insert requires columns and rows"));
    }
    let mut sql = format!("INSERT INTO {} (", dialect.quote(table));
    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&dialect.quote(col));
    }
    sql.push_str(") VALUES ");
    let mut bindings = Vec::with_capacity(columns.len() * rows.len());
    let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(OrmError::validation(format!(
                "insert row has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&tuple);
        bindings.extend(row.iter().cloned());
    }
    Ok((sql, bindings))
}

/// Compile an UPDATE statement from assignment pairs and a predicate group.
pub(crate) fn compile_update(
    dialect: Dialect,
    table: &Ident,
    sets: &[(Ident, Value)],
    wheres: &ClauseGroup,
) -> OrmResult<(String, Vec<Value>)> {
    if sets.is_empty() {
        return Err(OrmError::validation("update requires at least one assignment"));
    }
    let mut sql = format!("UPDATE {} SET ", dialect.quote(table));
    let mut bindings = Vec::with_capacity(sets.len());
    for (i, (col, value)) in sets.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&dialect.quote(col));
        sql.push_str(" = ?");
        bindings.push(value.clone());
    }
    if let Some(w) = render_group(wheres, dialect, &mut bindings)? {
        sql.push_str(" WHERE ");
        sql.push_str(&w);
    }
    Ok((sql, bindings))
}

/// Compile a DELETE statement.
pub(crate) fn compile_delete(
    dialect: Dialect,
    table: &Ident,
    wheres: &ClauseGroup,
) -> OrmResult<(String, Vec<Value>)> {
    let mut sql = format!("DELETE FROM {}", dialect.quote(table));
    let mut bindings = Vec::new();
    if let Some(w) = render_group(wheres, dialect, &mut bindings)? {
        sql.push_str(" WHERE ");
        sql.push_str(&w);
    }
    Ok((sql, bindings))
}

/// Replace `?` placeholders with inline literals for debug rendering.
///
/// The scan is quote-aware: question marks inside single-quoted string
/// literals are left alone. Doubled quotes toggle the state twice, which
/// nets out correctly for the `''` escape.
pub(crate) fn substitute_literals(sql: &str, bindings: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len() + bindings.len() * 8);
    let mut next = 0;
    let mut in_string = false;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_string = !in_string;
                out.push(c);
            }
            '?' if !in_string => {
                if let Some(value) = bindings.get(next) {
                    out.push_str(&value.literal());
                    next += 1;
                } else {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}
