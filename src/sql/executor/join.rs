use std::cmp::Ordering;

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        parser::ast::{Expression, JoinType},
        types::{Label, Row, Value},
    },
};

use super::{expr::resolve, subquery, Executor, ResultSet};

/// Nested Loop Join executor
///
/// Output rows are always the left columns followed by the right columns.
/// A RIGHT join drives the loop from the right side and pads unmatched right
/// rows with NULLs on the left.
pub struct NestedLoopJoin<T: Transaction> {
    left: Box<dyn Executor<T>>,
    right: Box<dyn Executor<T>>,
    predicate: Option<Expression>,
    using: Vec<String>,
    join_type: JoinType,
}

impl<T: Transaction> NestedLoopJoin<T> {
    pub fn new(
        left: Box<dyn Executor<T>>,
        right: Box<dyn Executor<T>>,
        predicate: Option<Expression>,
        using: Vec<String>,
        join_type: JoinType,
    ) -> Box<Self> {
        Box::new(Self {
            left,
            right,
            predicate,
            using,
            join_type,
        })
    }
}

impl<T: Transaction + 'static> Executor<T> for NestedLoopJoin<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let Self { left, right, predicate, using, join_type } = *self;
        let (lcols, lrows) = left.execute(txn)?.into_scan()?;
        let (rcols, rrows) = right.execute(txn)?.into_scan()?;

        // USING pairs each named left column with the right one of the same name
        let mut pairs = Vec::with_capacity(using.len());
        for name in &using {
            let not_shared = |_| {
                Error::Internal(format!(
                    "cannot join using column {} - column not present in both tables",
                    name
                ))
            };
            let l = resolve(&lcols, None, name).map_err(not_shared)?;
            let r = resolve(&rcols, None, name).map_err(not_shared)?;
            pairs.push((l, lcols.len() + r));
        }

        let mut columns = lcols.clone();
        columns.extend(rcols.iter().cloned());
        for &(_, r) in &pairs {
            columns[r].hidden = true;
        }
        if let Some(predicate) = &predicate {
            predicate.check(&columns)?;
        }

        let joined = |lrow: &Row, rrow: &Row| -> Row {
            let mut row = lrow.clone();
            row.extend(rrow.iter().cloned());
            row
        };

        let mut rows = Vec::new();
        if join_type == JoinType::Right {
            for rrow in &rrows {
                let mut matched = false;
                for lrow in &lrows {
                    let row = joined(lrow, rrow);
                    if matches(txn, predicate.as_ref(), &pairs, &columns, &row)? {
                        rows.push(row);
                        matched = true;
                    }
                }
                if !matched {
                    let mut row = joined(&vec![Value::Null; lcols.len()], rrow);
                    // The visible USING column takes the right side's value
                    for &(l, r) in &pairs {
                        row[l] = row[r].clone();
                    }
                    rows.push(row);
                }
            }
        } else {
            for lrow in &lrows {
                let mut matched = false;
                for rrow in &rrows {
                    let row = joined(lrow, rrow);
                    if matches(txn, predicate.as_ref(), &pairs, &columns, &row)? {
                        rows.push(row);
                        matched = true;
                    }
                }
                // For outer joins, fill with NULL if no match found
                if join_type == JoinType::Left && !matched {
                    rows.push(joined(lrow, &vec![Value::Null; rcols.len()]));
                }
            }
        }

        Ok(ResultSet::Scan { columns, rows })
    }
}

fn matches<T: Transaction + 'static>(
    txn: &mut T,
    predicate: Option<&Expression>,
    pairs: &[(usize, usize)],
    columns: &[Label],
    row: &Row,
) -> Result<bool> {
    if pairs.iter().any(|&(l, r)| row[l].compare(&row[r]) != Some(Ordering::Equal)) {
        return Ok(false);
    }
    Ok(match predicate {
        Some(predicate) => subquery::evaluate(txn, predicate, columns, row)?.truthy() == Some(true),
        // No predicate means CROSS JOIN
        None => true,
    })
}

#[cfg(test)]
mod tests {
    use crate::{
        error::Result,
        sql::{
            engine::{Engine, KVEngine, Session},
            types::Value,
        },
        storage::memory::MemoryEngine,
    };

    fn setup() -> Result<Session<KVEngine<MemoryEngine>>> {
        let mut s = KVEngine::new(MemoryEngine::new()).session()?;
        s.execute("create table customers (customer_id text, name text)")?;
        s.execute("create table orders (order_id text, customer_id text, amount text)")?;
        s.execute("insert into customers values ('1', 'Alice'), ('2', 'Bob'), ('3', 'Carol')")?;
        s.execute("insert into orders values ('10', '1', '100'), ('11', '1', '50'), ('12', '2', '75'), ('13', '9', '5')")?;
        Ok(s)
    }

    fn rows(s: &mut Session<KVEngine<MemoryEngine>>, sql: &str) -> Result<Vec<Vec<Value>>> {
        Ok(s.execute(sql)?.into_scan()?.1)
    }

    fn text(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn test_inner_join() -> Result<()> {
        let mut s = setup()?;
        let rows = rows(
            &mut s,
            "select c.name, o.amount from customers c join orders o on c.customer_id = o.customer_id",
        )?;
        assert_eq!(
            rows,
            vec![
                vec![text("Alice"), text("100")],
                vec![text("Alice"), text("50")],
                vec![text("Bob"), text("75")],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_outer_joins() -> Result<()> {
        let mut s = setup()?;
        let left = rows(
            &mut s,
            "select c.name, o.order_id from customers c left join orders o on c.customer_id = o.customer_id where o.order_id is null",
        )?;
        assert_eq!(left, vec![vec![text("Carol"), Value::Null]]);

        let right = rows(
            &mut s,
            "select c.name, o.order_id from customers c right outer join orders o on c.customer_id = o.customer_id",
        )?;
        assert_eq!(right.len(), 4);
        assert_eq!(right[3], vec![Value::Null, text("13")]);
        Ok(())
    }

    #[test]
    fn test_join_using() -> Result<()> {
        let mut s = setup()?;
        let (columns, rows) = s
            .execute("select * from customers join orders using (customer_id) where order_id <> '11'")?
            .into_scan()?;
        assert_eq!(
            columns.into_iter().map(|l| l.name).collect::<Vec<_>>(),
            vec!["customer_id", "name", "order_id", "amount"]
        );
        assert_eq!(
            rows,
            vec![
                vec![text("1"), text("Alice"), text("10"), text("100")],
                vec![text("2"), text("Bob"), text("12"), text("75")],
            ]
        );

        // The shared column is unambiguous and takes the right value on the right side
        let right = self::rows(
            &mut s,
            "select customer_id, orders.customer_id, order_id from customers right join orders using (customer_id)",
        )?;
        assert_eq!(right[3], vec![text("9"), text("9"), text("13")]);

        let err = s.execute("select * from customers join orders using (order_id)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot join using column order_id - column not present in both tables"
        );
        Ok(())
    }

    #[test]
    fn test_cross_join_and_ambiguity() -> Result<()> {
        let mut s = setup()?;
        assert_eq!(rows(&mut s, "select * from customers, orders")?.len(), 12);
        assert_eq!(rows(&mut s, "select * from customers cross join orders")?.len(), 12);

        let err = s
            .execute("select customer_id from customers join orders on customers.customer_id = orders.customer_id")
            .unwrap_err();
        assert_eq!(err.to_string(), "ambiguous column name: customer_id");
        Ok(())
    }
}
