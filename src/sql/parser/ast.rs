use std::{collections::BTreeMap, fmt::Display};

use crate::{error::Result, sql::types::DataType};

/// Abstract Syntax Tree (AST) node definitions for SQL statements
#[derive(Debug, PartialEq)]
pub enum Statement {
    CreateTable {
        name: String,
        columns: Vec<Column>,
        if_not_exists: bool,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    Insert {
        table_name: String,
        columns: Option<Vec<String>>,
        source: InsertSource,
    },
    Select(Box<Select>),
    Update {
        table_name: String,
        columns: BTreeMap<String, Expression>,
        where_clause: Option<Expression>,
    },
    Delete {
        table_name: String,
        where_clause: Option<Expression>,
    },
}

/// Rows for an INSERT
#[derive(Debug, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expression>>),
    Select(Box<Select>),
}

/// SELECT statement. An empty `select` list means `SELECT *`.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    /// Column expressions with optional aliases (e.g., count(*) as cnt)
    pub select: Vec<(Expression, Option<String>)>,
    /// None for `SELECT 1`-style queries without a FROM clause
    pub from: Option<FromItem>,
    pub where_clause: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    /// SELECTs combined with this one by UNION and friends, left to right.
    /// They carry no ORDER BY, LIMIT or OFFSET of their own: those below
    /// apply to the whole compound.
    pub compound: Vec<(SetOperator, Select)>,
    pub order_by: Vec<(Expression, OrderDirection)>,
    pub limit: Option<Expression>,
    pub offset: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl Display for SetOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SetOperator::Union => "UNION",
            SetOperator::UnionAll => "UNION ALL",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        })
    }
}

/// FROM clause item
#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    Table {
        name: String,
        alias: Option<String>,
    },
    Join {
        left: Box<FromItem>,
        right: Box<FromItem>,
        join_type: JoinType,
        /// Join ON condition (None for CROSS JOIN and USING)
        predicate: Option<Expression>,
        /// Columns named by `USING (..)`, empty otherwise
        using: Vec<String>,
    },
}

impl FromItem {
    /// Number of tables the item reads
    pub fn table_count(&self) -> usize {
        match self {
            FromItem::Table { .. } => 1,
            FromItem::Join { left, right, .. } => left.table_count() + right.table_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinType {
    Cross,
    Inner,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// Column definition for CREATE TABLE statements
#[derive(Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    pub nullable: Option<bool>,
    pub default: Option<Expression>,
    pub primary_key: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    /// Column reference, optionally qualified by a table name or alias
    Field(Option<String>, String),
    Consts(Consts),
    Operation(Operation),
    /// Function call, scalar (upper, coalesce, ...) or aggregate (count, sum, ...)
    Function {
        name: String,
        args: Vec<Expression>,
        distinct: bool,
    },
    /// The `*` in `count(*)`
    Wildcard,
    Case {
        operand: Option<Box<Expression>>,
        branches: Vec<(Expression, Expression)>,
        else_result: Option<Box<Expression>>,
    },
    Cast(Box<Expression>, DataType),
    /// `(SELECT ..)` used as a value: the first column of the first row
    Subquery(Box<Select>),
    /// `EXISTS (SELECT ..)`
    Exists(Box<Select>),
}

impl From<Consts> for Expression {
    fn from(value: Consts) -> Self {
        Self::Consts(value)
    }
}

impl From<Operation> for Expression {
    fn from(value: Operation) -> Self {
        Self::Operation(value)
    }
}

impl Expression {
    /// Walks the expression tree, stopping early if `visitor` returns false.
    /// Subqueries are leaves: their inner expressions are not visited.
    pub fn walk(&self, visitor: &mut impl FnMut(&Expression) -> bool) -> bool {
        if !visitor(self) {
            return false;
        }
        match self {
            Expression::Field(..)
            | Expression::Consts(_)
            | Expression::Wildcard
            | Expression::Subquery(_)
            | Expression::Exists(_) => true,
            Expression::Operation(op) => op.operands().into_iter().all(|e| e.walk(visitor)),
            Expression::Function { args, .. } => args.iter().all(|e| e.walk(visitor)),
            Expression::Case { operand, branches, else_result } => {
                operand.iter().all(|e| e.walk(visitor))
                    && branches.iter().all(|(w, t)| w.walk(visitor) && t.walk(visitor))
                    && else_result.iter().all(|e| e.walk(visitor))
            }
            Expression::Cast(expr, _) => expr.walk(visitor),
        }
    }

    /// Replaces sub-expressions bottom-up with whatever `f` returns
    pub fn transform(self, f: &mut impl FnMut(Expression) -> Result<Expression>) -> Result<Expression> {
        let expr = match self {
            Expression::Operation(op) => Expression::Operation(op.map(&mut |e| e.transform(f))?),
            Expression::Function { name, args, distinct } => Expression::Function {
                name,
                args: args.into_iter().map(|e| e.transform(f)).collect::<Result<_>>()?,
                distinct,
            },
            Expression::Case { operand, branches, else_result } => Expression::Case {
                operand: operand.map(|e| e.transform(f).map(Box::new)).transpose()?,
                branches: branches
                    .into_iter()
                    .map(|(w, t)| Ok((w.transform(f)?, t.transform(f)?)))
                    .collect::<Result<_>>()?,
                else_result: else_result.map(|e| e.transform(f).map(Box::new)).transpose()?,
            },
            Expression::Cast(expr, datatype) => Expression::Cast(Box::new(expr.transform(f)?), datatype),
            expr => expr,
        };
        f(expr)
    }

    /// Whether this is a call to an aggregate function
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expression::Function { name, .. } if is_aggregate_function(name))
    }

    pub fn contains_aggregate(&self) -> bool {
        !self.walk(&mut |e| !e.is_aggregate())
    }

    pub fn contains_subquery(&self) -> bool {
        !self.walk(&mut |e| {
            !matches!(
                e,
                Expression::Subquery(_)
                    | Expression::Exists(_)
                    | Expression::Operation(Operation::InSubquery(..))
            )
        })
    }

    /// Height of the expression tree. A subquery counts as one level.
    pub fn depth(&self) -> usize {
        let children = match self {
            Expression::Operation(op) => op.operands().into_iter().map(Expression::depth).max(),
            Expression::Function { args, .. } => args.iter().map(Expression::depth).max(),
            Expression::Case { operand, branches, else_result } => operand
                .iter()
                .chain(else_result.iter())
                .map(|e| e.depth())
                .chain(branches.iter().map(|(w, t)| w.depth().max(t.depth())))
                .max(),
            Expression::Cast(expr, _) => Some(expr.depth()),
            _ => None,
        };
        1 + children.unwrap_or(0)
    }
}

impl Select {
    /// Applies `f` to every expression the SELECT holds directly. Nested
    /// subqueries and compound members are left to `f` and the caller.
    pub fn transform_expressions(
        self,
        f: &mut impl FnMut(Expression) -> Result<Expression>,
    ) -> Result<Select> {
        let Select {
            distinct,
            select,
            from,
            where_clause,
            group_by,
            having,
            compound,
            order_by,
            limit,
            offset,
        } = self;
        Ok(Select {
            distinct,
            select: select
                .into_iter()
                .map(|(e, alias)| Ok((f(e)?, alias)))
                .collect::<Result<_>>()?,
            from: from.map(|item| item.transform_predicates(f)).transpose()?,
            where_clause: where_clause.map(&mut *f).transpose()?,
            group_by: group_by.into_iter().map(&mut *f).collect::<Result<_>>()?,
            having: having.map(&mut *f).transpose()?,
            compound,
            order_by: order_by
                .into_iter()
                .map(|(e, direction)| Ok((f(e)?, direction)))
                .collect::<Result<_>>()?,
            limit: limit.map(&mut *f).transpose()?,
            offset: offset.map(&mut *f).transpose()?,
        })
    }
}

impl FromItem {
    fn transform_predicates(
        self,
        f: &mut impl FnMut(Expression) -> Result<Expression>,
    ) -> Result<FromItem> {
        Ok(match self {
            FromItem::Join { left, right, join_type, predicate, using } => FromItem::Join {
                left: Box::new(left.transform_predicates(f)?),
                right: Box::new(right.transform_predicates(f)?),
                join_type,
                predicate: predicate.map(&mut *f).transpose()?,
                using,
            },
            table => table,
        })
    }
}

pub fn is_aggregate_function(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "count" | "sum" | "min" | "max" | "avg" | "total" | "group_concat"
    )
}

/// Renders expressions back to SQL. Used to label unnamed result columns.
impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Field(Some(table), name) => write!(f, "{}.{}", table, name),
            Expression::Field(None, name) => write!(f, "{}", name),
            Expression::Consts(c) => write!(f, "{}", c),
            Expression::Operation(op) => write!(f, "{}", op),
            Expression::Function { name, args, distinct } => {
                let args = args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                let distinct = if *distinct { "DISTINCT " } else { "" };
                write!(f, "{}({}{})", name, distinct, args)
            }
            Expression::Wildcard => write!(f, "*"),
            Expression::Case { operand, branches, else_result } => {
                write!(f, "CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {}", operand)?;
                }
                for (when, then) in branches {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                if let Some(else_result) = else_result {
                    write!(f, " ELSE {}", else_result)?;
                }
                write!(f, " END")
            }
            Expression::Cast(expr, datatype) => write!(f, "CAST({} AS {})", expr, datatype),
            Expression::Subquery(select) => write!(f, "({})", select),
            Expression::Exists(select) => write!(f, "EXISTS ({})", select),
        }
    }
}

impl Display for Select {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        if self.select.is_empty() {
            write!(f, "*")?;
        }
        for (i, (expr, alias)) in self.select.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", expr)?;
            if let Some(alias) = alias {
                write!(f, " AS {}", alias)?;
            }
        }
        if let Some(from) = &self.from {
            write!(f, " FROM {}", from)?;
        }
        if let Some(predicate) = &self.where_clause {
            write!(f, " WHERE {}", predicate)?;
        }
        if !self.group_by.is_empty() {
            let terms = self.group_by.iter().map(|e| e.to_string()).collect::<Vec<_>>();
            write!(f, " GROUP BY {}", terms.join(", "))?;
        }
        if let Some(having) = &self.having {
            write!(f, " HAVING {}", having)?;
        }
        for (operator, select) in &self.compound {
            write!(f, " {} {}", operator, select)?;
        }
        if !self.order_by.is_empty() {
            let terms = self
                .order_by
                .iter()
                .map(|(e, direction)| match direction {
                    OrderDirection::Asc => e.to_string(),
                    OrderDirection::Desc => format!("{} DESC", e),
                })
                .collect::<Vec<_>>();
            write!(f, " ORDER BY {}", terms.join(", "))?;
        }
        if let Some(limit) = &self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = &self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        Ok(())
    }
}

impl Display for FromItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FromItem::Table { name, alias: Some(alias) } => write!(f, "{} {}", name, alias),
            FromItem::Table { name, alias: None } => write!(f, "{}", name),
            FromItem::Join { left, right, join_type, predicate, using } => {
                let join = match join_type {
                    JoinType::Cross => "CROSS JOIN",
                    JoinType::Inner => "JOIN",
                    JoinType::Left => "LEFT JOIN",
                    JoinType::Right => "RIGHT JOIN",
                };
                write!(f, "{} {} {}", left, join, right)?;
                if let Some(predicate) = predicate {
                    write!(f, " ON {}", predicate)?;
                }
                if !using.is_empty() {
                    write!(f, " USING ({})", using.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Consts {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Display for Consts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Consts::Null => write!(f, "NULL"),
            Consts::Boolean(true) => write!(f, "TRUE"),
            Consts::Boolean(false) => write!(f, "FALSE"),
            Consts::Integer(i) => write!(f, "{}", i),
            Consts::Float(v) => write!(f, "{}", v),
            Consts::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),

    Equal(Box<Expression>, Box<Expression>),
    NotEqual(Box<Expression>, Box<Expression>),
    GreaterThan(Box<Expression>, Box<Expression>),
    GreaterThanOrEqual(Box<Expression>, Box<Expression>),
    LessThan(Box<Expression>, Box<Expression>),
    LessThanOrEqual(Box<Expression>, Box<Expression>),
    /// `expr IS NULL`, or `IS NOT NULL` when negated
    IsNull(Box<Expression>, bool),
    Like(Box<Expression>, Box<Expression>, bool),
    In(Box<Expression>, Vec<Expression>, bool),
    /// `expr IN (SELECT ..)`, negated for `NOT IN`
    InSubquery(Box<Expression>, Box<Select>, bool),
    Between(Box<Expression>, Box<Expression>, Box<Expression>, bool),

    Add(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Modulo(Box<Expression>, Box<Expression>),
    Concat(Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),
}

impl Operation {
    fn operands(&self) -> Vec<&Expression> {
        use Operation::*;
        match self {
            Not(e) | IsNull(e, _) | Negate(e) | InSubquery(e, _, _) => vec![e.as_ref()],
            And(l, r) | Or(l, r) | Equal(l, r) | NotEqual(l, r) | GreaterThan(l, r)
            | GreaterThanOrEqual(l, r) | LessThan(l, r) | LessThanOrEqual(l, r)
            | Like(l, r, _) | Add(l, r) | Subtract(l, r) | Multiply(l, r) | Divide(l, r)
            | Modulo(l, r) | Concat(l, r) => vec![l.as_ref(), r.as_ref()],
            In(e, list, _) => std::iter::once(e.as_ref()).chain(list.iter()).collect(),
            Between(e, lo, hi, _) => vec![e.as_ref(), lo.as_ref(), hi.as_ref()],
        }
    }

    fn map(self, f: &mut impl FnMut(Expression) -> Result<Expression>) -> Result<Operation> {
        use Operation::*;
        let mut b = |e: Box<Expression>| f(*e).map(Box::new);
        Ok(match self {
            And(l, r) => And(b(l)?, b(r)?),
            Or(l, r) => Or(b(l)?, b(r)?),
            Not(e) => Not(b(e)?),
            Equal(l, r) => Equal(b(l)?, b(r)?),
            NotEqual(l, r) => NotEqual(b(l)?, b(r)?),
            GreaterThan(l, r) => GreaterThan(b(l)?, b(r)?),
            GreaterThanOrEqual(l, r) => GreaterThanOrEqual(b(l)?, b(r)?),
            LessThan(l, r) => LessThan(b(l)?, b(r)?),
            LessThanOrEqual(l, r) => LessThanOrEqual(b(l)?, b(r)?),
            IsNull(e, negated) => IsNull(b(e)?, negated),
            Like(l, r, negated) => Like(b(l)?, b(r)?, negated),
            In(e, list, negated) => {
                let e = b(e)?;
                let list = list
                    .into_iter()
                    .map(|x| b(Box::new(x)).map(|x| *x))
                    .collect::<Result<_>>()?;
                In(e, list, negated)
            }
            InSubquery(e, select, negated) => InSubquery(b(e)?, select, negated),
            Between(e, lo, hi, negated) => Between(b(e)?, b(lo)?, b(hi)?, negated),
            Add(l, r) => Add(b(l)?, b(r)?),
            Subtract(l, r) => Subtract(b(l)?, b(r)?),
            Multiply(l, r) => Multiply(b(l)?, b(r)?),
            Divide(l, r) => Divide(b(l)?, b(r)?),
            Modulo(l, r) => Modulo(b(l)?, b(r)?),
            Concat(l, r) => Concat(b(l)?, b(r)?),
            Negate(e) => Negate(b(e)?),
        })
    }
}

impl Operation {
    /// Binding strength, higher binds tighter. Matches the parser's levels.
    fn precedence(&self) -> u8 {
        use Operation::*;
        match self {
            Or(..) => 1,
            And(..) => 2,
            Not(_) => 3,
            Equal(..) | NotEqual(..) | GreaterThan(..) | GreaterThanOrEqual(..) | LessThan(..)
            | LessThanOrEqual(..) | IsNull(..) | Like(..) | In(..) | InSubquery(..)
            | Between(..) => 4,
            Add(..) | Subtract(..) => 5,
            Multiply(..) | Divide(..) | Modulo(..) => 6,
            Concat(..) => 7,
            Negate(_) => 8,
        }
    }
}

/// Wraps an operand in parentheses when it binds looser than `min`
struct Operand<'a>(&'a Expression, u8);

impl Display for Operand<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Expression::Operation(op) if op.precedence() < self.1 => write!(f, "({})", self.0),
            e => write!(f, "{}", e),
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Operation::*;
        let not = |negated: &bool| if *negated { "NOT " } else { "" };
        let p = self.precedence();
        // Left-associative: the left side may share our level, the right may not
        let binary = |l: &Expression, op: &str, r: &Expression| {
            format!("{} {} {}", Operand(l, p), op, Operand(r, p + 1))
        };
        // Comparisons do not chain
        let cmp = |l: &Expression, op: &str, r: &Expression| {
            format!("{} {} {}", Operand(l, p + 1), op, Operand(r, p + 1))
        };
        match self {
            And(l, r) => f.write_str(&binary(l, "AND", r)),
            Or(l, r) => f.write_str(&binary(l, "OR", r)),
            Not(e) => write!(f, "NOT {}", Operand(e, p)),
            Equal(l, r) => f.write_str(&cmp(l, "=", r)),
            NotEqual(l, r) => f.write_str(&cmp(l, "!=", r)),
            GreaterThan(l, r) => f.write_str(&cmp(l, ">", r)),
            GreaterThanOrEqual(l, r) => f.write_str(&cmp(l, ">=", r)),
            LessThan(l, r) => f.write_str(&cmp(l, "<", r)),
            LessThanOrEqual(l, r) => f.write_str(&cmp(l, "<=", r)),
            IsNull(e, negated) => write!(f, "{} IS {}NULL", Operand(e, p + 1), not(negated)),
            Like(l, r, negated) => {
                write!(f, "{} {}LIKE {}", Operand(l, p + 1), not(negated), Operand(r, p + 1))
            }
            In(e, list, negated) => {
                let list = list.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", ");
                write!(f, "{} {}IN ({})", Operand(e, p + 1), not(negated), list)
            }
            InSubquery(e, select, negated) => {
                write!(f, "{} {}IN ({})", Operand(e, p + 1), not(negated), select)
            }
            Between(e, lo, hi, negated) => write!(
                f,
                "{} {}BETWEEN {} AND {}",
                Operand(e, p + 1),
                not(negated),
                Operand(lo, p + 1),
                Operand(hi, p + 1)
            ),
            Add(l, r) => f.write_str(&binary(l, "+", r)),
            Subtract(l, r) => f.write_str(&binary(l, "-", r)),
            Multiply(l, r) => f.write_str(&binary(l, "*", r)),
            Divide(l, r) => f.write_str(&binary(l, "/", r)),
            Modulo(l, r) => f.write_str(&binary(l, "%", r)),
            Concat(l, r) => f.write_str(&binary(l, "||", r)),
            Negate(e) => match Operand(e, p).to_string() {
                // Keep `- -1` from reading as a comment
                inner if inner.starts_with('-') => write!(f, "-({})", inner),
                inner => write!(f, "-{}", inner),
            },
        }
    }
}
