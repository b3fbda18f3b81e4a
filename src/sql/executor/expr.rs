//! Row-level expression evaluation
//!
//! Expressions are evaluated against one row at a time, with column
//! references resolved through the labels of the executor that produced it.
//! Logic follows SQL three-valued semantics: NULL propagates through
//! comparisons and arithmetic, and `truthy()` maps it to unknown.

use std::cmp::Ordering;

use crate::{
    error::{Error, Result},
    sql::{
        parser::ast::{is_aggregate_function, Expression, Operation},
        types::{DataType, Label, Value},
    },
};

/// Finds the position of a column among `labels`
pub fn resolve(labels: &[Label], table: Option<&str>, name: &str) -> Result<usize> {
    let mut found = labels.iter().enumerate().filter(|(_, l)| l.matches(table, name));
    match (found.next(), found.next()) {
        (Some((i, _)), None) => Ok(i),
        (Some(_), Some(_)) => Err(Error::Internal(format!("ambiguous column name: {}", name))),
        (None, _) => Err(Error::Internal(match table {
            Some(table) => format!("no such column: {}.{}", table, name),
            None => format!("no such column: {}", name),
        })),
    }
}

fn is_scalar_function(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "upper"
            | "lower"
            | "length"
            | "trim"
            | "ltrim"
            | "rtrim"
            | "replace"
            | "substr"
            | "substring"
            | "coalesce"
            | "ifnull"
            | "nullif"
            | "abs"
            | "round"
    )
}

impl Expression {
    /// Verifies that every column and function the expression refers to
    /// exists, so errors surface even when there are no rows to evaluate
    pub fn check(&self, labels: &[Label]) -> Result<()> {
        let mut result = Ok(());
        self.walk(&mut |e| {
            let outcome = match e {
                Expression::Field(table, name) => resolve(labels, table.as_deref(), name).map(|_| ()),
                Expression::Function { name, .. }
                    if !is_aggregate_function(name) && !is_scalar_function(name) =>
                {
                    Err(Error::Internal(format!("no such function: {}", name)))
                }
                _ => Ok(()),
            };
            match outcome {
                Ok(()) => true,
                Err(err) => {
                    result = Err(err);
                    false
                }
            }
        });
        result
    }

    /// Evaluates the expression against a row described by `labels`
    pub fn evaluate(&self, labels: &[Label], row: &[Value]) -> Result<Value> {
        Ok(match self {
            Expression::Field(table, name) => row[resolve(labels, table.as_deref(), name)?].clone(),
            Expression::Consts(c) => c.clone().into(),
            Expression::Operation(op) => evaluate_operation(op, labels, row)?,
            Expression::Function { name, .. } if is_aggregate_function(name) => {
                return Err(Error::Internal(format!("misuse of aggregate function {}()", name)));
            }
            Expression::Function { name, args, .. } => {
                let args = args
                    .iter()
                    .map(|a| a.evaluate(labels, row))
                    .collect::<Result<Vec<_>>>()?;
                call_function(name, args)?
            }
            Expression::Wildcard => {
                return Err(Error::Internal("* is only valid inside count(*)".into()));
            }
            Expression::Case { operand, branches, else_result } => {
                let operand = operand.as_ref().map(|o| o.evaluate(labels, row)).transpose()?;
                for (when, then) in branches {
                    let when = when.evaluate(labels, row)?;
                    let hit = match &operand {
                        Some(operand) => operand.compare(&when) == Some(Ordering::Equal),
                        None => when.truthy() == Some(true),
                    };
                    if hit {
                        return then.evaluate(labels, row);
                    }
                }
                match else_result {
                    Some(e) => e.evaluate(labels, row)?,
                    None => Value::Null,
                }
            }
            Expression::Cast(expr, datatype) => cast(expr.evaluate(labels, row)?, *datatype),
            // Executors bind these through `subquery::evaluate` first
            Expression::Subquery(_) | Expression::Exists(_) => return Err(subquery_not_allowed()),
        })
    }
}

fn subquery_not_allowed() -> Error {
    Error::Internal("subqueries are not allowed here".into())
}

fn boolean(b: Option<bool>) -> Value {
    b.map_or(Value::Null, Value::Boolean)
}

fn evaluate_operation(op: &Operation, labels: &[Label], row: &[Value]) -> Result<Value> {
    use Operation::*;
    let eval = |e: &Expression| e.evaluate(labels, row);
    let compare = |l: &Expression, r: &Expression, pred: fn(Ordering) -> bool| -> Result<Value> {
        Ok(boolean(eval(l)?.compare(&eval(r)?).map(pred)))
    };

    Ok(match op {
        And(l, r) => match (eval(l)?.truthy(), eval(r)?.truthy()) {
            (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
            (Some(true), Some(true)) => Value::Boolean(true),
            _ => Value::Null,
        },
        Or(l, r) => match (eval(l)?.truthy(), eval(r)?.truthy()) {
            (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
            (Some(false), Some(false)) => Value::Boolean(false),
            _ => Value::Null,
        },
        Not(e) => boolean(eval(e)?.truthy().map(|b| !b)),

        Equal(l, r) => compare(l, r, Ordering::is_eq)?,
        NotEqual(l, r) => compare(l, r, Ordering::is_ne)?,
        GreaterThan(l, r) => compare(l, r, Ordering::is_gt)?,
        GreaterThanOrEqual(l, r) => compare(l, r, Ordering::is_ge)?,
        LessThan(l, r) => compare(l, r, Ordering::is_lt)?,
        LessThanOrEqual(l, r) => compare(l, r, Ordering::is_le)?,
        IsNull(e, negated) => Value::Boolean(eval(e)?.is_null() != *negated),
        Like(l, r, negated) => match (eval(l)?, eval(r)?) {
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            (value, pattern) => Value::Boolean(like(&value.to_text(), &pattern.to_text()) != *negated),
        },
        In(e, list, negated) => {
            let value = eval(e)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in list {
                match value.compare(&eval(item)?) {
                    Some(Ordering::Equal) => return Ok(Value::Boolean(!*negated)),
                    None => saw_null = true,
                    Some(_) => {}
                }
            }
            if saw_null { Value::Null } else { Value::Boolean(*negated) }
        }
        InSubquery(..) => return Err(subquery_not_allowed()),
        Between(e, low, high, negated) => {
            let value = eval(e)?;
            let above = value.compare(&eval(low)?).map(Ordering::is_ge);
            let below = value.compare(&eval(high)?).map(Ordering::is_le);
            match (above, below) {
                (Some(a), Some(b)) => Value::Boolean((a && b) != *negated),
                (Some(false), None) | (None, Some(false)) => Value::Boolean(*negated),
                _ => Value::Null,
            }
        }

        Add(l, r) => arithmetic(eval(l)?, eval(r)?, i64::checked_add, |a, b| a + b),
        Subtract(l, r) => arithmetic(eval(l)?, eval(r)?, i64::checked_sub, |a, b| a - b),
        Multiply(l, r) => arithmetic(eval(l)?, eval(r)?, i64::checked_mul, |a, b| a * b),
        Divide(l, r) => match (eval(l)?.to_number(), eval(r)?.to_number()) {
            (_, Value::Integer(0)) => Value::Null,
            (_, Value::Float(f)) if f == 0.0 => Value::Null,
            (l, r) => arithmetic(l, r, i64::checked_div, |a, b| a / b),
        },
        Modulo(l, r) => match (eval(l)?.to_number(), eval(r)?.to_number()) {
            (_, Value::Integer(0)) => Value::Null,
            (_, Value::Float(f)) if f == 0.0 => Value::Null,
            (l, r) => arithmetic(l, r, i64::checked_rem, |a, b| a % b),
        },
        Concat(l, r) => match (eval(l)?, eval(r)?) {
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            (l, r) => Value::String(l.to_text() + &r.to_text()),
        },
        Negate(e) => match eval(e)?.to_number() {
            Value::Integer(i) => i.checked_neg().map_or(Value::Float(-(i as f64)), Value::Integer),
            Value::Float(f) => Value::Float(-f),
            _ => Value::Null,
        },
    })
}

/// Integer arithmetic stays integral unless it overflows
fn arithmetic(
    l: Value,
    r: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    match (l.to_number(), r.to_number()) {
        (Value::Integer(a), Value::Integer(b)) => match int_op(a, b) {
            Some(v) => Value::Integer(v),
            None => Value::Float(float_op(a as f64, b as f64)),
        },
        (Value::Integer(a), Value::Float(b)) => Value::Float(float_op(a as f64, b)),
        (Value::Float(a), Value::Integer(b)) => Value::Float(float_op(a, b as f64)),
        (Value::Float(a), Value::Float(b)) => Value::Float(float_op(a, b)),
        _ => Value::Null,
    }
}

/// Case-insensitive LIKE with `%` and `_` wildcards
pub fn like(value: &str, pattern: &str) -> bool {
    let value: Vec<char> = value.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // matched[j]: pattern[..j] matches the value prefix consumed so far
    let mut matched = vec![false; pattern.len() + 1];
    matched[0] = true;
    for j in 1..=pattern.len() {
        matched[j] = matched[j - 1] && pattern[j - 1] == '%';
    }
    for c in value {
        let mut next = vec![false; pattern.len() + 1];
        for j in 1..=pattern.len() {
            next[j] = match pattern[j - 1] {
                '%' => next[j - 1] || matched[j],
                '_' => matched[j - 1],
                p => matched[j - 1] && p == c,
            };
        }
        matched = next;
    }
    matched[pattern.len()]
}

fn cast(value: Value, datatype: DataType) -> Value {
    match (value, datatype) {
        (Value::Null, _) => Value::Null,
        (v, DataType::String) => Value::String(v.to_text()),
        (v, DataType::Integer) => match v.to_number() {
            Value::Float(f) => Value::Integer(f as i64),
            n => n,
        },
        (v, DataType::Float) => match v.to_number() {
            Value::Integer(i) => Value::Float(i as f64),
            n => n,
        },
        (v, DataType::Boolean) => boolean(v.truthy()),
    }
}

fn call_function(name: &str, args: Vec<Value>) -> Result<Value> {
    let lname = name.to_lowercase();
    let arity = |ok: bool| -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(Error::Internal(format!("wrong number of arguments to function {}()", name)))
        }
    };
    let text = |v: &Value| (!v.is_null()).then(|| v.to_text());

    Ok(match lname.as_str() {
        "coalesce" | "ifnull" => {
            arity(if lname == "ifnull" { args.len() == 2 } else { args.len() >= 2 })?;
            args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null)
        }
        "nullif" => {
            arity(args.len() == 2)?;
            if args[0].compare(&args[1]) == Some(Ordering::Equal) {
                Value::Null
            } else {
                args[0].clone()
            }
        }
        "upper" | "lower" | "length" | "abs" => {
            arity(args.len() == 1)?;
            let arg = &args[0];
            match lname.as_str() {
                "upper" => text(arg).map_or(Value::Null, |s| Value::String(s.to_uppercase())),
                "lower" => text(arg).map_or(Value::Null, |s| Value::String(s.to_lowercase())),
                "length" => text(arg).map_or(Value::Null, |s| Value::Integer(s.chars().count() as i64)),
                _ => match arg.to_number() {
                    Value::Integer(i) => Value::Integer(
                        i.checked_abs().ok_or_else(|| Error::Internal("integer overflow".into()))?,
                    ),
                    Value::Float(f) => Value::Float(f.abs()),
                    _ => Value::Null,
                },
            }
        }
        "trim" | "ltrim" | "rtrim" => {
            arity(args.len() == 1)?;
            text(&args[0]).map_or(Value::Null, |s| {
                Value::String(match lname.as_str() {
                    "ltrim" => s.trim_start().to_string(),
                    "rtrim" => s.trim_end().to_string(),
                    _ => s.trim().to_string(),
                })
            })
        }
        "replace" => {
            arity(args.len() == 3)?;
            match (text(&args[0]), text(&args[1]), text(&args[2])) {
                (Some(s), Some(from), _) if from.is_empty() => Value::String(s),
                (Some(s), Some(from), Some(to)) => Value::String(s.replace(&from, &to)),
                _ => Value::Null,
            }
        }
        "substr" | "substring" => {
            arity(args.len() == 2 || args.len() == 3)?;
            let Some(s) = text(&args[0]) else {
                return Ok(Value::Null);
            };
            let chars: Vec<char> = s.chars().collect();
            let start = match args[1].to_number() {
                Value::Integer(i) => i,
                Value::Float(f) => f as i64,
                _ => return Ok(Value::Null),
            };
            let len = match args.get(2).map(Value::to_number) {
                None => None,
                Some(Value::Integer(n)) if n >= 0 => Some(n as usize),
                Some(Value::Float(f)) if f >= 0.0 => Some(f as usize),
                Some(_) => Some(0),
            };
            // 1-based, negative counts from the end. Position 0 sits just
            // before the first character and uses up one of the length.
            let (begin, len) = match start {
                s if s > 0 => ((s - 1) as usize, len),
                0 => (0, len.map(|n| n.saturating_sub(1))),
                s => (chars.len().saturating_sub(s.unsigned_abs() as usize), len),
            };
            let len = len.unwrap_or(chars.len());
            Value::String(chars.iter().skip(begin).take(len).collect())
        }
        "round" => {
            arity(args.len() == 1 || args.len() == 2)?;
            let digits = match args.get(1).map(Value::to_number) {
                Some(Value::Integer(d)) => d.clamp(0, 15) as i32,
                _ => 0,
            };
            match args[0].to_number() {
                Value::Integer(i) => Value::Float(i as f64),
                Value::Float(f) => {
                    let factor = 10f64.powi(digits);
                    Value::Float((f * factor).round() / factor)
                }
                _ => Value::Null,
            }
        }
        _ => return Err(Error::Internal(format!("no such function: {}", name))),
    })
}

#[cfg(test)]
mod tests {
    use super::like;
    use crate::{
        error::Result,
        sql::{
            parser::{ast::Statement, Parser},
            types::{Label, Value},
        },
    };

    /// Evaluates the single projected expression of `select <expr>`
    fn eval_with(expr: &str, labels: &[Label], row: &[Value]) -> Result<Value> {
        let Statement::Select(select) = Parser::new(&format!("select {}", expr)).parse()? else {
            panic!("expected select");
        };
        select.select[0].0.evaluate(labels, row)
    }

    fn eval(expr: &str) -> Result<Value> {
        eval_with(expr, &[], &[])
    }

    #[test]
    fn test_like() {
        assert!(like("Alice", "a%"));
        assert!(like("Alice", "%LIC%"));
        assert!(like("Bob", "_o_"));
        assert!(!like("Bob", "_o"));
        assert!(like("", "%"));
        assert!(!like("abc", ""));
    }

    #[test]
    fn test_arithmetic_coerces_text() -> Result<()> {
        assert_eq!(eval("'1500' + 500")?, Value::Integer(2000));
        assert_eq!(eval("'2.5' * 2")?, Value::Float(5.0));
        assert_eq!(eval("'abc' + 1")?, Value::Integer(1));
        assert_eq!(eval("7 / 2")?, Value::Integer(3));
        assert_eq!(eval("7 / 0")?, Value::Null);
        assert_eq!(eval("NULL + 1")?, Value::Null);
        assert_eq!(eval("abs(-5)")?, Value::Integer(5));
        assert_eq!(eval("-9223372036854775807 - 1")?, Value::Integer(i64::MIN));
        assert_eq!(
            eval("abs(-9223372036854775807 - 1)").unwrap_err().to_string(),
            "integer overflow"
        );
        Ok(())
    }

    #[test]
    fn test_three_valued_logic() -> Result<()> {
        assert_eq!(eval("NULL = 1")?, Value::Null);
        assert_eq!(eval("NULL AND 0")?, Value::Boolean(false));
        assert_eq!(eval("NULL OR 1")?, Value::Boolean(true));
        assert_eq!(eval("NULL IS NULL")?, Value::Boolean(true));
        assert_eq!(eval("2 IN (1, NULL)")?, Value::Null);
        assert_eq!(eval("2 NOT IN (1, 3)")?, Value::Boolean(true));
        assert_eq!(eval("5 BETWEEN 1 AND 10")?, Value::Boolean(true));
        Ok(())
    }

    #[test]
    fn test_fields_and_functions() -> Result<()> {
        let labels = vec![
            Label::new(Some("u".into()), "name"),
            Label::new(Some("u".into()), "age"),
        ];
        let row = vec![Value::String("alice".into()), Value::String("30".into())];
        assert_eq!(eval_with("upper(u.name)", &labels, &row)?, Value::String("ALICE".into()));
        assert_eq!(eval_with("AGE = 30", &labels, &row)?, Value::Boolean(true));
        assert_eq!(
            eval_with("CASE WHEN age > 18 THEN 'adult' ELSE 'minor' END", &labels, &row)?,
            Value::String("adult".into())
        );
        assert_eq!(eval_with("coalesce(NULL, name)", &labels, &row)?, Value::String("alice".into()));
        assert_eq!(eval_with("substr(name, 2, 3)", &labels, &row)?, Value::String("lic".into()));
        assert_eq!(eval_with("CAST(age AS INTEGER) + 1", &labels, &row)?, Value::Integer(31));
        assert_eq!(eval_with("name || '!'", &labels, &row)?, Value::String("alice!".into()));

        assert_eq!(eval("substr('abc', 0, 2)")?, Value::String("a".into()));
        assert_eq!(eval("substr('abc', 0)")?, Value::String("abc".into()));
        assert_eq!(eval("substr('abc', -2, 1)")?, Value::String("b".into()));

        let err = eval_with("missing", &labels, &row).unwrap_err();
        assert_eq!(err.to_string(), "no such column: missing");
        assert!(eval_with("nosuchfn(1)", &labels, &row).is_err());
        Ok(())
    }
}
