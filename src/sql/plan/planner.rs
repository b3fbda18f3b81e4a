use crate::{
    error::{Error, Result},
    sql::{
        parser::ast::{self, Consts, Expression},
        plan::{Node, Plan},
        schema::{self, Table},
        types::Value,
    },
};

/// Query planner - converts AST into execution plan nodes
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self {}
    }

    /// Builds an execution plan from an AST statement
    pub fn build(&mut self, stmt: ast::Statement) -> Result<Plan> {
        Ok(Plan(self.build_statement(stmt)?))
    }

    fn build_statement(&self, stmt: ast::Statement) -> Result<Node> {
        Ok(match stmt {
            ast::Statement::CreateTable { name, columns, if_not_exists } => Node::CreateTable {
                schema: Table {
                    name,
                    columns: columns
                        .into_iter()
                        .map(|c| {
                            let nullable = c.nullable.unwrap_or(!c.primary_key);
                            let default = match c.default {
                                Some(expr) => Some(constant(&expr)?),
                                None if nullable => Some(Value::Null),
                                None => None,
                            };

                            Ok(schema::Column {
                                name: c.name,
                                datatype: c.datatype,
                                nullable,
                                default,
                                primary_key: c.primary_key,
                            })
                        })
                        .collect::<Result<_>>()?,
                },
                if_not_exists,
            },
            ast::Statement::DropTable { name, if_exists } => Node::DropTable {
                table_name: name,
                if_exists,
            },
            ast::Statement::Insert { table_name, columns, source } => Node::Insert {
                table_name,
                columns: columns.unwrap_or_default(),
                source: Box::new(match source {
                    ast::InsertSource::Values(rows) => Node::Values { rows },
                    ast::InsertSource::Select(select) => self.build_select(*select)?,
                }),
            },
            ast::Statement::Select(select) => self.build_select(*select)?,
            ast::Statement::Update { table_name, columns, where_clause } => Node::Update {
                table_name,
                filter: where_clause,
                columns: columns.into_iter().collect(),
            },
            ast::Statement::Delete { table_name, where_clause } => Node::Delete {
                table_name,
                filter: where_clause,
            },
        })
    }

    /// SELECT is planned bottom-up in SQL's logical order: FROM, WHERE,
    /// GROUP BY, HAVING, ORDER BY, projection, DISTINCT, OFFSET, LIMIT
    fn build_select(&self, select: ast::Select) -> Result<Node> {
        if !select.compound.is_empty() {
            return self.build_compound(select);
        }
        let ast::Select {
            distinct,
            select,
            from,
            where_clause,
            group_by,
            having,
            compound: _,
            order_by,
            limit,
            offset,
        } = select;

        let mut node = match from {
            Some(item) => self.build_from_item(item)?,
            None => Node::Nothing,
        };

        if let Some(predicate) = where_clause {
            if predicate.contains_aggregate() {
                return Err(Error::Internal("misuse of aggregate function in WHERE".into()));
            }
            node = Node::Filter {
                source: Box::new(node),
                predicate,
            };
        }

        // Output labels come from the expressions as written
        let labels: Vec<String> = select
            .iter()
            .map(|(expr, alias)| match (alias, expr) {
                (Some(alias), _) => alias.clone(),
                (None, Expression::Field(_, name)) => name.clone(),
                (None, expr) => expr.to_string(),
            })
            .collect();

        // GROUP BY and ORDER BY may name an output alias or position
        let group_by = group_by
            .into_iter()
            .map(|expr| resolve_output_term(expr, &select, "GROUP BY"))
            .collect::<Result<Vec<_>>>()?;
        let mut order_by = order_by
            .into_iter()
            .map(|(expr, direction)| Ok((resolve_output_term(expr, &select, "ORDER BY")?, direction)))
            .collect::<Result<Vec<_>>>()?;
        let mut exprs: Vec<Expression> = select.into_iter().map(|(expr, _)| expr).collect();

        let aggregating = !group_by.is_empty()
            || exprs.iter().any(Expression::contains_aggregate)
            || order_by.iter().any(|(e, _)| e.contains_aggregate())
            || having.as_ref().is_some_and(Expression::contains_aggregate);

        if aggregating {
            // Aggregate calls become references to the #aggN output slots
            let mut aggregates: Vec<Expression> = Vec::new();
            let mut rewrite = |expr: Expression| {
                expr.transform(&mut |e| {
                    if !e.is_aggregate() {
                        return Ok(e);
                    }
                    let index = match aggregates.iter().position(|a| *a == e) {
                        Some(index) => index,
                        None => {
                            aggregates.push(e);
                            aggregates.len() - 1
                        }
                    };
                    Ok(Expression::Field(None, format!("#agg{}", index)))
                })
            };
            exprs = exprs.into_iter().map(&mut rewrite).collect::<Result<_>>()?;
            let having = having.map(&mut rewrite).transpose()?;
            order_by = order_by
                .into_iter()
                .map(|(e, d)| Ok((rewrite(e)?, d)))
                .collect::<Result<_>>()?;

            if group_by.iter().any(Expression::contains_aggregate) {
                return Err(Error::Internal("aggregate functions are not allowed in GROUP BY".into()));
            }
            node = Node::Aggregate {
                source: Box::new(node),
                group_by,
                aggregates,
            };
            if let Some(predicate) = having {
                node = Node::Filter {
                    source: Box::new(node),
                    predicate,
                };
            }
        } else if having.is_some() {
            return Err(Error::Internal("a GROUP BY clause is required before HAVING".into()));
        }

        if !order_by.is_empty() {
            node = Node::Order {
                source: Box::new(node),
                order_by,
            };
        }

        // An empty select list is `*`, which still drops the #agg slots and
        // the hidden side of a USING join
        node = Node::Projection {
            source: Box::new(node),
            exprs: exprs.into_iter().zip(labels).collect(),
        };

        if distinct {
            node = Node::Distinct { source: Box::new(node) };
        }

        limit_and_offset(node, limit, offset)
    }

    /// Chains the members of a compound SELECT left to right. ORDER BY works
    /// on the combined output, whose columns are named after the first member.
    fn build_compound(&self, mut select: ast::Select) -> Result<Node> {
        let compound = std::mem::take(&mut select.compound);
        let order_by = std::mem::take(&mut select.order_by);
        let limit = select.limit.take();
        let offset = select.offset.take();

        let mut node = self.build_select(select)?;
        for (operator, member) in compound {
            node = Node::Compound {
                left: Box::new(node),
                right: Box::new(self.build_select(member)?),
                operator,
            };
        }
        if !order_by.is_empty() {
            node = Node::Order {
                source: Box::new(node),
                order_by,
            };
        }
        limit_and_offset(node, limit, offset)
    }

    fn build_from_item(&self, item: ast::FromItem) -> Result<Node> {
        Ok(match item {
            ast::FromItem::Table { name, alias } => Node::Scan {
                table_name: name,
                alias,
            },
            ast::FromItem::Join {
                left,
                right,
                join_type,
                predicate,
                using,
            } => Node::NestedLoopJoin {
                // Recursively build join nodes (base case: single table)
                left: Box::new(self.build_from_item(*left)?),
                right: Box::new(self.build_from_item(*right)?),
                predicate,
                using,
                join_type,
            },
        })
    }
}

/// Adds OFFSET, then LIMIT, over a finished query
fn limit_and_offset(mut node: Node, limit: Option<Expression>, offset: Option<Expression>) -> Result<Node> {
    if let Some(expr) = offset {
        node = Node::Offset {
            source: Box::new(node),
            offset: row_count(&expr, "OFFSET")?.unwrap_or(0),
        };
    }
    if let Some(expr) = limit {
        if let Some(limit) = row_count(&expr, "LIMIT")? {
            node = Node::Limit {
                source: Box::new(node),
                limit,
            };
        }
    }
    Ok(node)
}

/// Evaluates an expression that may not refer to any column
fn constant(expr: &Expression) -> Result<Value> {
    expr.evaluate(&[], &[])
}

/// Evaluates a LIMIT or OFFSET term. Negative counts mean "no limit".
fn row_count(expr: &Expression, clause: &str) -> Result<Option<usize>> {
    match constant(expr)? {
        Value::Integer(i) => Ok(usize::try_from(i).ok()),
        value => Err(Error::Internal(format!("datatype mismatch: {} {}", clause, value))),
    }
}

/// Replaces a GROUP BY or ORDER BY alias or 1-based position with the select
/// expression it names. With `SELECT *` positions stay as they are and ORDER
/// BY resolves them against the source columns at execution time.
fn resolve_output_term(
    expr: Expression,
    select: &[(Expression, Option<String>)],
    clause: &str,
) -> Result<Expression> {
    match expr {
        Expression::Consts(Consts::Integer(n)) if !select.is_empty() => usize::try_from(n)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| select.get(i))
            .map(|(e, _)| e.clone())
            .ok_or_else(|| {
                Error::Internal(format!(
                    "{} term out of range - should be between 1 and {}",
                    clause,
                    select.len()
                ))
            }),
        Expression::Field(None, name) => Ok(
            match select
                .iter()
                .find(|(_, alias)| alias.as_ref().is_some_and(|a| a.eq_ignore_ascii_case(&name)))
            {
                Some((e, _)) => e.clone(),
                None => Expression::Field(None, name),
            },
        ),
        expr => Ok(expr),
    }
}
