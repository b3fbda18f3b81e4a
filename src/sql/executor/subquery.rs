//! Subqueries inside row expressions
//!
//! A subquery runs once per outer row. Column references that name nothing
//! in the subquery's own FROM clause, or in that of a subquery enclosing it,
//! are first replaced by the outer row's values. The result then replaces the
//! subquery as a constant and the expression is evaluated as usual.

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        parser::ast::{self, Consts, Expression, FromItem, Operation, Select},
        plan::Plan,
        types::{Label, Row, Value},
    },
};

use super::expr::resolve;

/// The row a subquery is evaluated for
struct Outer<'a> {
    labels: &'a [Label],
    row: &'a [Value],
}

/// Evaluates `expr` against one row, running any subqueries it holds
pub fn evaluate<T: Transaction + 'static>(
    txn: &mut T,
    expr: &Expression,
    labels: &[Label],
    row: &[Value],
) -> Result<Value> {
    if !expr.contains_subquery() {
        return expr.evaluate(labels, row);
    }
    let outer = Outer { labels, row };
    let bound = expr.clone().transform(&mut |e| match e {
        Expression::Subquery(select) => {
            let rows = run(txn, *select, &outer, Some(1))?;
            let value = rows.into_iter().next().and_then(|r| r.into_iter().next());
            Ok(Consts::from(value.unwrap_or(Value::Null)).into())
        }
        Expression::Exists(select) => {
            let rows = run(txn, *select, &outer, None)?;
            Ok(Consts::Boolean(!rows.is_empty()).into())
        }
        Expression::Operation(Operation::InSubquery(lhs, select, negated)) => {
            let list = run(txn, *select, &outer, Some(1))?
                .into_iter()
                .filter_map(|r| r.into_iter().next())
                .map(|v| Consts::from(v).into())
                .collect();
            Ok(Operation::In(lhs, list, negated).into())
        }
        e => Ok(e),
    })?;
    bound.evaluate(labels, row)
}

/// Runs a subquery for the outer row, checking its column count if given
fn run<T: Transaction + 'static>(
    txn: &mut T,
    select: Select,
    outer: &Outer,
    columns: Option<usize>,
) -> Result<Vec<Row>> {
    let select = correlate(txn, select, &mut Vec::new(), outer)?;
    let (labels, rows) = Plan::build(ast::Statement::Select(Box::new(select)))?
        .execute(txn)?
        .into_scan()?;
    match columns {
        Some(expected) if labels.len() != expected => Err(Error::Internal(format!(
            "sub-select returns {} columns - expected {}",
            labels.len(),
            expected
        ))),
        _ => Ok(rows),
    }
}

/// Substitutes outer row values into `select`. `scopes` holds the columns
/// of every subquery between the outer row and this one.
fn correlate<T: Transaction>(
    txn: &T,
    mut select: Select,
    scopes: &mut Vec<Vec<Label>>,
    outer: &Outer,
) -> Result<Select> {
    let mut scope = match &select.from {
        Some(item) => from_labels(txn, item)?,
        None => Vec::new(),
    };
    scope.extend(
        select
            .select
            .iter()
            .filter_map(|(_, alias)| alias.clone())
            .map(|alias| Label::new(None, alias)),
    );

    let compound = std::mem::take(&mut select.compound);
    scopes.push(scope);
    let select = select.transform_expressions(&mut |e| replace_outer(txn, e, scopes, outer));
    scopes.pop();

    let mut select = select?;
    for (operator, member) in compound {
        select.compound.push((operator, correlate(txn, member, scopes, outer)?));
    }
    Ok(select)
}

fn replace_outer<T: Transaction>(
    txn: &T,
    expr: Expression,
    scopes: &mut Vec<Vec<Label>>,
    outer: &Outer,
) -> Result<Expression> {
    expr.transform(&mut |e| match e {
        Expression::Field(table, name) => {
            let local = scopes.iter().flatten().any(|l| l.matches(table.as_deref(), &name));
            if local {
                return Ok(Expression::Field(table, name));
            }
            // Unknown everywhere: left for the subquery to report
            Ok(match resolve(outer.labels, table.as_deref(), &name) {
                Ok(i) => Consts::from(outer.row[i].clone()).into(),
                Err(_) => Expression::Field(table, name),
            })
        }
        Expression::Subquery(select) => {
            Ok(Expression::Subquery(Box::new(correlate(txn, *select, scopes, outer)?)))
        }
        Expression::Exists(select) => Ok(Expression::Exists(Box::new(correlate(txn, *select, scopes, outer)?))),
        Expression::Operation(Operation::InSubquery(lhs, select, negated)) => {
            let select = correlate(txn, *select, scopes, outer)?;
            Ok(Operation::InSubquery(lhs, Box::new(select), negated).into())
        }
        e => Ok(e),
    })
}

/// Columns a FROM clause brings into scope, qualified as Scan qualifies them
fn from_labels<T: Transaction>(txn: &T, item: &FromItem) -> Result<Vec<Label>> {
    Ok(match item {
        FromItem::Table { name, alias } => {
            let qualifier = alias.as_ref().unwrap_or(name);
            txn.must_get_table(name)?
                .columns
                .into_iter()
                .map(|c| Label::new(Some(qualifier.clone()), c.name))
                .collect()
        }
        FromItem::Join { left, right, .. } => {
            let mut labels = from_labels(txn, left)?;
            labels.extend(from_labels(txn, right)?);
            labels
        }
    })
}
