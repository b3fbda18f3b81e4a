use std::cmp::Ordering;

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        parser::ast::Expression,
        types::{Label, Row, Value},
    },
};

use super::{subquery, Executor, ResultSet};

/// Aggregate executor - groups rows and computes aggregate functions
///
/// Output columns are the source columns, holding the first row of each
/// group, followed by one `#aggN` column per aggregate call. Bare columns in
/// an aggregate query therefore resolve against a representative row.
pub struct Aggregate<T: Transaction> {
    source: Box<dyn Executor<T>>,
    group_by: Vec<Expression>,
    aggregates: Vec<Expression>,
}

impl<T: Transaction> Aggregate<T> {
    pub fn new(
        source: Box<dyn Executor<T>>,
        group_by: Vec<Expression>,
        aggregates: Vec<Expression>,
    ) -> Box<Self> {
        Box::new(Self {
            source,
            group_by,
            aggregates,
        })
    }
}

/// One aggregate call bound to its argument
struct AggregateCall {
    /// None for `count(*)`
    arg: Option<Expression>,
    distinct: bool,
    seen: Vec<Value>,
    accumulator: Box<dyn Accumulator>,
}

impl AggregateCall {
    fn build(expr: &Expression, labels: &[Label]) -> Result<Self> {
        let Expression::Function { name, args, distinct } = expr else {
            return Err(Error::Internal(format!("{} is not an aggregate", expr)));
        };
        let (arg, separator) = match args.as_slice() {
            [Expression::Wildcard] if name.eq_ignore_ascii_case("count") => (None, None),
            [arg] => (Some(arg.clone()), None),
            [arg, sep] if name.eq_ignore_ascii_case("group_concat") => {
                (Some(arg.clone()), Some(sep.evaluate(&[], &[])?.to_text()))
            }
            _ => {
                return Err(Error::Internal(format!(
                    "wrong number of arguments to function {}()",
                    name
                )));
            }
        };
        if let Some(arg) = &arg {
            if arg.contains_aggregate() {
                return Err(Error::Internal(format!("misuse of aggregate function {}()", name)));
            }
            arg.check(labels)?;
        }
        Ok(Self {
            arg,
            distinct: *distinct,
            seen: Vec::new(),
            accumulator: <dyn Accumulator>::build(name, separator)?,
        })
    }

    fn add<T: Transaction + 'static>(&mut self, txn: &mut T, labels: &[Label], row: &Row) -> Result<()> {
        let value = match &self.arg {
            Some(arg) => subquery::evaluate(txn, arg, labels, row)?,
            None => Value::Integer(1),
        };
        if value.is_null() {
            return Ok(());
        }
        if self.distinct {
            if self.seen.contains(&value) {
                return Ok(());
            }
            self.seen.push(value.clone());
        }
        self.accumulator.accumulate(value);
        Ok(())
    }
}

struct Group {
    key: Vec<Value>,
    representative: Row,
    calls: Vec<AggregateCall>,
}

impl<T: Transaction + 'static> Executor<T> for Aggregate<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let Self { source, group_by, aggregates } = *self;
        let (columns, rows) = source.execute(txn)?.into_scan()?;
        for expr in &group_by {
            expr.check(&columns)?;
        }
        let new_calls = || -> Result<Vec<AggregateCall>> {
            aggregates
                .iter()
                .map(|a| AggregateCall::build(a, &columns))
                .collect()
        };

        let mut groups: Vec<Group> = Vec::new();
        for row in rows {
            let key = group_by
                .iter()
                .map(|e| subquery::evaluate(txn, e, &columns, &row))
                .collect::<Result<Vec<_>>>()?;
            let index = match groups.iter().position(|g| g.key == key) {
                Some(index) => index,
                None => {
                    groups.push(Group {
                        key,
                        representative: row.clone(),
                        calls: new_calls()?,
                    });
                    groups.len() - 1
                }
            };
            for call in groups[index].calls.iter_mut() {
                call.add(txn, &columns, &row)?;
            }
        }

        // Without GROUP BY there is exactly one group, even over no rows
        if group_by.is_empty() && groups.is_empty() {
            groups.push(Group {
                key: Vec::new(),
                representative: vec![Value::Null; columns.len()],
                calls: new_calls()?,
            });
        }
        groups.sort_by(|a, b| {
            a.key
                .iter()
                .zip(&b.key)
                .map(|(x, y)| x.partial_cmp(y).unwrap_or(Ordering::Equal))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });

        let mut new_cols = columns.clone();
        new_cols.extend((0..aggregates.len()).map(|i| Label::new(None, format!("#agg{}", i))));
        let new_rows = groups
            .into_iter()
            .map(|g| {
                let mut row = g.representative;
                row.extend(g.calls.iter().map(|c| c.accumulator.result()));
                row
            })
            .collect();

        Ok(ResultSet::Scan {
            columns: new_cols,
            rows: new_rows,
        })
    }
}

/// Running state of one aggregate function over the non-null values of a group
pub trait Accumulator {
    fn accumulate(&mut self, value: Value);
    fn result(&self) -> Value;
}

impl dyn Accumulator {
    /// Runtime dispatch to appropriate accumulator based on function name
    pub fn build(func_name: &str, separator: Option<String>) -> Result<Box<dyn Accumulator>> {
        let accumulator: Box<dyn Accumulator> = match func_name.to_uppercase().as_ref() {
            "COUNT" => Box::new(Count(0)),
            "SUM" => Box::new(Sum::default()),
            "TOTAL" => Box::new(Total(0.0)),
            "AVG" => Box::new(Avg::default()),
            "MIN" => Box::new(Extreme { keep: Ordering::Less, value: Value::Null }),
            "MAX" => Box::new(Extreme { keep: Ordering::Greater, value: Value::Null }),
            "GROUP_CONCAT" => Box::new(GroupConcat {
                separator: separator.unwrap_or_else(|| ",".to_string()),
                parts: Vec::new(),
            }),
            _ => return Err(Error::Internal(format!("unknown aggregate function {}", func_name))),
        };
        Ok(accumulator)
    }
}

/// COUNT - counts non-null values
struct Count(i64);

impl Accumulator for Count {
    fn accumulate(&mut self, _: Value) {
        self.0 += 1;
    }

    fn result(&self) -> Value {
        Value::Integer(self.0)
    }
}

/// SUM - integer while every input is an integer, NULL over no input
#[derive(Default)]
struct Sum {
    int: Option<i64>,
    float: Option<f64>,
}

impl Accumulator for Sum {
    fn accumulate(&mut self, value: Value) {
        match (value.to_number(), self.float) {
            (Value::Integer(v), None) => match self.int.unwrap_or(0).checked_add(v) {
                Some(sum) => self.int = Some(sum),
                None => self.float = Some(self.int.unwrap_or(0) as f64 + v as f64),
            },
            (Value::Integer(v), Some(f)) => self.float = Some(f + v as f64),
            (Value::Float(v), f) => {
                self.float = Some(f.unwrap_or(self.int.unwrap_or(0) as f64) + v);
            }
            _ => {}
        }
    }

    fn result(&self) -> Value {
        match (self.int, self.float) {
            (_, Some(f)) => Value::Float(f),
            (Some(i), None) => Value::Integer(i),
            (None, None) => Value::Null,
        }
    }
}

/// TOTAL - like SUM but always a float, 0.0 over no input
struct Total(f64);

impl Accumulator for Total {
    fn accumulate(&mut self, value: Value) {
        match value.to_number() {
            Value::Integer(v) => self.0 += v as f64,
            Value::Float(v) => self.0 += v,
            _ => {}
        }
    }

    fn result(&self) -> Value {
        Value::Float(self.0)
    }
}

/// AVG = SUM / COUNT
#[derive(Default)]
struct Avg {
    sum: f64,
    count: i64,
}

impl Accumulator for Avg {
    fn accumulate(&mut self, value: Value) {
        match value.to_number() {
            Value::Integer(v) => self.sum += v as f64,
            Value::Float(v) => self.sum += v,
            _ => return,
        }
        self.count += 1;
    }

    fn result(&self) -> Value {
        if self.count == 0 {
            Value::Null
        } else {
            Value::Float(self.sum / self.count as f64)
        }
    }
}

/// MIN and MAX - keep whichever value compares `keep` against the current one
struct Extreme {
    keep: Ordering,
    value: Value,
}

impl Accumulator for Extreme {
    fn accumulate(&mut self, value: Value) {
        if self.value.is_null() || value.partial_cmp(&self.value) == Some(self.keep) {
            self.value = value;
        }
    }

    fn result(&self) -> Value {
        self.value.clone()
    }
}

struct GroupConcat {
    separator: String,
    parts: Vec<String>,
}

impl Accumulator for GroupConcat {
    fn accumulate(&mut self, value: Value) {
        self.parts.push(value.to_text());
    }

    fn result(&self) -> Value {
        if self.parts.is_empty() {
            Value::Null
        } else {
            Value::String(self.parts.join(&self.separator))
        }
    }
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
        s.execute("create table sales (region text, product text, amount text)")?;
        s.execute(
            "insert into sales values ('east', 'a', '100'), ('west', 'b', '250'), ('east', 'b', '50'), ('west', 'b', ''), ('north', 'c', '1.5')",
        )?;
        Ok(s)
    }

    fn query(s: &mut Session<KVEngine<MemoryEngine>>, sql: &str) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
        let (columns, rows) = s.execute(sql)?.into_scan()?;
        Ok((columns.into_iter().map(|l| l.name).collect(), rows))
    }

    fn text(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn test_aggregate_without_group() -> Result<()> {
        let mut s = setup()?;
        let (columns, rows) = query(&mut s, "select count(*), sum(amount), max(product), min(region) from sales")?;
        assert_eq!(columns, vec!["count(*)", "sum(amount)", "max(product)", "min(region)"]);
        assert_eq!(
            rows,
            vec![vec![Value::Integer(5), Value::Float(401.5), text("c"), text("east")]]
        );

        // One row even when nothing matches
        let (_, rows) = query(&mut s, "select count(*), sum(amount) from sales where region = 'south'")?;
        assert_eq!(rows, vec![vec![Value::Integer(0), Value::Null]]);
        Ok(())
    }

    #[test]
    fn test_group_by_having_order() -> Result<()> {
        let mut s = setup()?;
        let (columns, rows) = query(
            &mut s,
            "select region, sum(amount) as total, count(distinct product) from sales group by region having count(*) > 1 order by total desc",
        )?;
        assert_eq!(columns, vec!["region", "total", "count(DISTINCT product)"]);
        assert_eq!(
            rows,
            vec![
                vec![text("west"), Value::Integer(250), Value::Integer(1)],
                vec![text("east"), Value::Integer(150), Value::Integer(2)],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_groups_come_out_sorted() -> Result<()> {
        let mut s = setup()?;
        let (_, rows) = query(&mut s, "select region, group_concat(product, '|') from sales group by region")?;
        assert_eq!(
            rows,
            vec![
                vec![text("east"), text("a|b")],
                vec![text("north"), text("c")],
                vec![text("west"), text("b|b")],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_group_by_position_and_alias() -> Result<()> {
        let mut s = KVEngine::new(MemoryEngine::new()).session()?;
        s.execute("create table sales (store_id text, amount text)")?;
        s.execute("insert into sales values ('10', '5000'), ('11', '3000'), ('10', '100')")?;

        let expected = vec![
            vec![text("10"), Value::Integer(5100)],
            vec![text("11"), Value::Integer(3000)],
        ];
        let (_, rows) = query(&mut s, "SELECT store_id, SUM(amount) FROM sales GROUP BY 1")?;
        assert_eq!(rows, expected);
        let (columns, rows) = query(&mut s, "SELECT store_id AS store, SUM(amount) FROM sales GROUP BY store")?;
        assert_eq!(columns, vec!["store", "SUM(amount)"]);
        assert_eq!(rows, expected);
        Ok(())
    }

    #[test]
    fn test_avg_and_total() -> Result<()> {
        let mut s = setup()?;
        let (_, rows) = query(&mut s, "select avg(amount), total(amount) from sales where region = 'east'")?;
        assert_eq!(rows, vec![vec![Value::Float(75.0), Value::Float(150.0)]]);
        Ok(())
    }
}
