use std::cmp::Ordering;

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::ResultSet,
        parser::ast::{Consts, Expression, OrderDirection, SetOperator},
        types::{Label, Row, Value},
    },
};

use super::{subquery, Executor};

/// Source of a SELECT without FROM: one row with no columns
pub struct Nothing;

impl Nothing {
    pub fn new() -> Box<Self> {
        Box::new(Self)
    }
}

impl<T: Transaction> Executor<T> for Nothing {
    fn execute(self: Box<Self>, _txn: &mut T) -> Result<ResultSet> {
        Ok(ResultSet::Scan {
            columns: Vec::new(),
            rows: vec![Vec::new()],
        })
    }
}

/// Table scan executor
pub struct Scan {
    table_name: String,
    alias: Option<String>,
}

impl Scan {
    pub fn new(table_name: String, alias: Option<String>) -> Box<Self> {
        Box::new(Self { table_name, alias })
    }
}

impl<T: Transaction> Executor<T> for Scan {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(&self.table_name)?;
        let rows = txn.scan_table(&table.name)?;
        // Columns are qualified by the alias if there is one, else by the name as written
        let qualifier = self.alias.unwrap_or(self.table_name);
        Ok(ResultSet::Scan {
            columns: table
                .columns
                .into_iter()
                .map(|c| Label::new(Some(qualifier.clone()), c.name))
                .collect(),
            rows,
        })
    }
}

/// WHERE / HAVING executor - keeps rows for which the predicate is true
pub struct Filter<T: Transaction> {
    source: Box<dyn Executor<T>>,
    predicate: Expression,
}

impl<T: Transaction> Filter<T> {
    pub fn new(source: Box<dyn Executor<T>>, predicate: Expression) -> Box<Self> {
        Box::new(Self { source, predicate })
    }
}

impl<T: Transaction + 'static> Executor<T> for Filter<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_scan()?;
        self.predicate.check(&columns)?;

        let mut kept = Vec::new();
        for row in rows {
            if subquery::evaluate(txn, &self.predicate, &columns, &row)?.truthy() == Some(true) {
                kept.push(row);
            }
        }
        Ok(ResultSet::Scan { columns, rows: kept })
    }
}

/// Projection executor - computes the select list
pub struct Projection<T: Transaction> {
    source: Box<dyn Executor<T>>,
    exprs: Vec<(Expression, String)>,
}

impl<T: Transaction> Projection<T> {
    pub fn new(source: Box<dyn Executor<T>>, exprs: Vec<(Expression, String)>) -> Box<Self> {
        Box::new(Self { source, exprs })
    }
}

impl<T: Transaction + 'static> Executor<T> for Projection<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_scan()?;

        // `SELECT *`: every column except #agg slots and USING duplicates
        if self.exprs.is_empty() {
            let visible = visible_columns(&columns);
            return Ok(ResultSet::Scan {
                columns: visible.iter().map(|&i| columns[i].clone()).collect(),
                rows: rows
                    .into_iter()
                    .map(|row| visible.iter().map(|&i| row[i].clone()).collect())
                    .collect(),
            });
        }

        for (expr, _) in &self.exprs {
            expr.check(&columns)?;
        }
        let mut new_rows = Vec::with_capacity(rows.len());
        for row in rows {
            new_rows.push(
                self.exprs
                    .iter()
                    .map(|(expr, _)| subquery::evaluate(txn, expr, &columns, &row))
                    .collect::<Result<Vec<_>>>()?,
            );
        }
        Ok(ResultSet::Scan {
            columns: self
                .exprs
                .into_iter()
                .map(|(_, label)| Label::new(None, label))
                .collect(),
            rows: new_rows,
        })
    }
}

/// DISTINCT executor - drops repeated rows, keeping the first occurrence
pub struct Distinct<T: Transaction> {
    source: Box<dyn Executor<T>>,
}

impl<T: Transaction> Distinct<T> {
    pub fn new(source: Box<dyn Executor<T>>) -> Box<Self> {
        Box::new(Self { source })
    }
}

impl<T: Transaction> Executor<T> for Distinct<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_scan()?;
        let mut unique: Vec<Vec<Value>> = Vec::new();
        for row in rows {
            if !unique.contains(&row) {
                unique.push(row);
            }
        }
        Ok(ResultSet::Scan { columns, rows: unique })
    }
}

/// ORDER BY executor - sorts rows by the given expressions
pub struct Order<T: Transaction> {
    source: Box<dyn Executor<T>>,
    order_by: Vec<(Expression, OrderDirection)>,
}

impl<T: Transaction> Order<T> {
    pub fn new(source: Box<dyn Executor<T>>, order_by: Vec<(Expression, OrderDirection)>) -> Box<Self> {
        Box::new(Self { source, order_by })
    }
}

impl<T: Transaction + 'static> Executor<T> for Order<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_scan()?;

        // A bare integer is a 1-based position among the visible columns
        // (left over from SELECT * or a compound SELECT)
        let visible = visible_columns(&columns);
        let mut keys = Vec::with_capacity(self.order_by.len());
        for (expr, direction) in self.order_by {
            let key = match expr {
                Expression::Consts(Consts::Integer(n)) => {
                    let pos = usize::try_from(n)
                        .ok()
                        .filter(|&n| n >= 1 && n <= visible.len())
                        .ok_or_else(|| {
                            Error::Internal(format!(
                                "ORDER BY term out of range - should be between 1 and {}",
                                visible.len()
                            ))
                        })?;
                    SortKey::Column(visible[pos - 1])
                }
                expr => {
                    expr.check(&columns)?;
                    SortKey::Expr(expr)
                }
            };
            keys.push((key, direction));
        }

        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(keys.len());
            for (key, _) in &keys {
                values.push(match key {
                    SortKey::Column(i) => row[*i].clone(),
                    SortKey::Expr(expr) => subquery::evaluate(txn, expr, &columns, &row)?,
                });
            }
            keyed.push((values, row));
        }

        // Multi-column sort: compare rows column by column according to ORDER BY clause
        // - If comparison is Equal, continue to next column
        // - If Less/Greater, apply ASC/DESC direction and return
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, (_, direction)) in keys.iter().enumerate() {
                match a[i].partial_cmp(&b[i]) {
                    Some(Ordering::Equal) | None => {}
                    Some(o) => {
                        return match direction {
                            OrderDirection::Asc => o,
                            OrderDirection::Desc => o.reverse(),
                        };
                    }
                }
            }
            Ordering::Equal
        });

        Ok(ResultSet::Scan {
            columns,
            rows: keyed.into_iter().map(|(_, row)| row).collect(),
        })
    }
}

enum SortKey {
    Column(usize),
    Expr(Expression),
}

fn visible_columns(columns: &[Label]) -> Vec<usize> {
    (0..columns.len()).filter(|&i| columns[i].is_visible()).collect()
}

/// LIMIT executor - restricts the number of rows returned
pub struct Limit<T: Transaction> {
    source: Box<dyn Executor<T>>,
    limit: usize,
}

impl<T: Transaction> Limit<T> {
    pub fn new(source: Box<dyn Executor<T>>, limit: usize) -> Box<Self> {
        Box::new(Self { source, limit })
    }
}

impl<T: Transaction> Executor<T> for Limit<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_scan()?;
        Ok(ResultSet::Scan {
            columns,
            rows: rows.into_iter().take(self.limit).collect(),
        })
    }
}

/// OFFSET executor - skips the first N rows
pub struct Offset<T: Transaction> {
    source: Box<dyn Executor<T>>,
    offset: usize,
}

impl<T: Transaction> Offset<T> {
    pub fn new(source: Box<dyn Executor<T>>, offset: usize) -> Box<Self> {
        Box::new(Self { source, offset })
    }
}

impl<T: Transaction> Executor<T> for Offset<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_scan()?;
        Ok(ResultSet::Scan {
            columns,
            rows: rows.into_iter().skip(self.offset).collect(),
        })
    }
}

/// VALUES executor - one row per parenthesized list, columns named column1..N
pub struct Values {
    rows: Vec<Vec<Expression>>,
}

impl Values {
    pub fn new(rows: Vec<Vec<Expression>>) -> Box<Self> {
        Box::new(Self { rows })
    }
}

impl<T: Transaction + 'static> Executor<T> for Values {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let width = self.rows.first().map_or(0, Vec::len);
        let mut rows = Vec::with_capacity(self.rows.len());
        for exprs in self.rows {
            if exprs.len() != width {
                return Err(Error::Internal("all VALUES must have the same number of terms".into()));
            }
            rows.push(
                exprs
                    .iter()
                    .map(|expr| subquery::evaluate(txn, expr, &[], &[]))
                    .collect::<Result<Row>>()?,
            );
        }
        Ok(ResultSet::Scan {
            columns: (1..=width).map(|i| Label::new(None, format!("column{}", i))).collect(),
            rows,
        })
    }
}

/// UNION / INTERSECT / EXCEPT executor
///
/// Columns are named after the left side. Apart from UNION ALL, the result
/// holds no repeated rows and comes out sorted.
pub struct Compound<T: Transaction> {
    left: Box<dyn Executor<T>>,
    right: Box<dyn Executor<T>>,
    operator: SetOperator,
}

impl<T: Transaction> Compound<T> {
    pub fn new(left: Box<dyn Executor<T>>, right: Box<dyn Executor<T>>, operator: SetOperator) -> Box<Self> {
        Box::new(Self { left, right, operator })
    }
}

impl<T: Transaction> Executor<T> for Compound<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, lrows) = self.left.execute(txn)?.into_scan()?;
        let (rcols, rrows) = self.right.execute(txn)?.into_scan()?;
        if columns.len() != rcols.len() {
            return Err(Error::Internal(format!(
                "SELECTs to the left and right of {} do not have the same number of result columns",
                self.operator
            )));
        }

        let rows = match self.operator {
            SetOperator::UnionAll => lrows.into_iter().chain(rrows).collect(),
            SetOperator::Union => distinct_sorted(lrows.into_iter().chain(rrows)),
            SetOperator::Intersect => distinct_sorted(lrows.into_iter().filter(|row| rrows.contains(row))),
            SetOperator::Except => distinct_sorted(lrows.into_iter().filter(|row| !rrows.contains(row))),
        };
        Ok(ResultSet::Scan { columns, rows })
    }
}

fn distinct_sorted(rows: impl Iterator<Item = Row>) -> Vec<Row> {
    let mut unique: Vec<Row> = Vec::new();
    for row in rows {
        if !unique.contains(&row) {
            unique.push(row);
        }
    }
    unique.sort_by(|a, b| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.partial_cmp(y).unwrap_or(Ordering::Equal))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    unique
}
