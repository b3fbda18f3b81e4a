use crate::{
    error::Result,
    sql::{
        engine::Transaction,
        executor::{Executor, ResultSet},
        parser::ast::{self, Expression, JoinType, OrderDirection, SetOperator},
        schema::Table,
    },
};

mod planner;

use planner::Planner;

/// Execution plan node
#[derive(Debug, PartialEq)]
pub enum Node {
    CreateTable {
        schema: Table,
        if_not_exists: bool,
    },
    DropTable {
        table_name: String,
        if_exists: bool,
    },
    /// Inserts every row the source produces
    Insert {
        table_name: String,
        /// Empty when the statement lists no columns
        columns: Vec<String>,
        source: Box<Node>,
    },
    Update {
        table_name: String,
        filter: Option<Expression>,
        columns: Vec<(String, Expression)>,
    },
    Delete {
        table_name: String,
        filter: Option<Expression>,
    },
    /// A single empty row, the source of a SELECT without FROM
    Nothing,
    /// Literal rows of an INSERT .. VALUES
    Values {
        rows: Vec<Vec<Expression>>,
    },
    Scan {
        table_name: String,
        alias: Option<String>,
    },
    NestedLoopJoin {
        left: Box<Node>,
        right: Box<Node>,
        predicate: Option<Expression>,
        /// Columns that must be equal on both sides. The right copies are
        /// hidden from unqualified names and `*`.
        using: Vec<String>,
        join_type: JoinType,
    },
    Filter {
        source: Box<Node>,
        predicate: Expression,
    },
    /// Groups the source rows and appends one `#aggN` column per aggregate
    /// call after the source columns
    Aggregate {
        source: Box<Node>,
        group_by: Vec<Expression>,
        aggregates: Vec<Expression>,
    },
    /// Computes the output columns. An empty list keeps every visible source column.
    Projection {
        source: Box<Node>,
        exprs: Vec<(Expression, String)>,
    },
    Distinct {
        source: Box<Node>,
    },
    Order {
        source: Box<Node>,
        order_by: Vec<(Expression, OrderDirection)>,
    },
    Limit {
        source: Box<Node>,
        limit: usize,
    },
    Offset {
        source: Box<Node>,
        offset: usize,
    },
    /// UNION, INTERSECT or EXCEPT of two queries with the same column count
    Compound {
        left: Box<Node>,
        right: Box<Node>,
        operator: SetOperator,
    },
}

/// Execution plan
#[derive(Debug, PartialEq)]
pub struct Plan(pub Node);

impl Plan {
    pub fn build(stmt: ast::Statement) -> Result<Self> {
        Planner::new().build(stmt)
    }

    pub fn execute<T: Transaction + 'static>(self, txn: &mut T) -> Result<ResultSet> {
        <dyn Executor<T>>::build(self.0).execute(txn)
    }
}

#[cfg(test)]
mod tests {
    use super::{Node, Plan};
    use crate::{
        error::Result,
        sql::parser::{
            ast::{Expression, SetOperator},
            Parser,
        },
    };

    fn plan(sql: &str) -> Result<Node> {
        Ok(Plan::build(Parser::new(sql).parse()?)?.0)
    }

    #[test]
    fn test_plan_select_layers() -> Result<()> {
        let node = plan("select distinct a from t where a > 1 order by a limit 2 offset 1")?;
        let Node::Limit { source, limit: 2 } = node else {
            panic!("expected limit, got {:?}", node);
        };
        let Node::Offset { source, offset: 1 } = *source else {
            panic!("expected offset");
        };
        let Node::Distinct { source } = *source else {
            panic!("expected distinct");
        };
        let Node::Projection { source, exprs } = *source else {
            panic!("expected projection");
        };
        assert_eq!(exprs, vec![(Expression::Field(None, "a".into()), "a".to_string())]);
        let Node::Order { source, .. } = *source else {
            panic!("expected order");
        };
        assert!(matches!(*source, Node::Filter { .. }));
        Ok(())
    }

    #[test]
    fn test_plan_aggregate_rewrite() -> Result<()> {
        let node = plan("select dept, count(*) as n from emp group by dept having count(*) > 1 order by n")?;
        let Node::Projection { source, exprs } = node else {
            panic!("expected projection");
        };
        assert_eq!(exprs[1], (Expression::Field(None, "#agg0".into()), "n".to_string()));
        let Node::Order { source, order_by } = *source else {
            panic!("expected order");
        };
        assert_eq!(order_by[0].0, Expression::Field(None, "#agg0".into()));
        let Node::Filter { source, .. } = *source else {
            panic!("expected having filter");
        };
        let Node::Aggregate { aggregates, group_by, .. } = *source else {
            panic!("expected aggregate");
        };
        assert_eq!(aggregates.len(), 1);
        assert_eq!(group_by.len(), 1);
        Ok(())
    }

    #[test]
    fn test_plan_group_by_output_terms() -> Result<()> {
        let node = plan("select store_id as store, sum(amount) from sales group by 1")?;
        let Node::Projection { source, .. } = node else {
            panic!("expected projection");
        };
        let Node::Aggregate { group_by, .. } = *source else {
            panic!("expected aggregate");
        };
        assert_eq!(group_by, vec![Expression::Field(None, "store_id".into())]);

        let node = plan("select upper(region) as r, count(*) from sales group by r")?;
        let Node::Projection { source, .. } = node else {
            panic!("expected projection");
        };
        let Node::Aggregate { group_by, .. } = *source else {
            panic!("expected aggregate");
        };
        assert_eq!(group_by[0].to_string(), "upper(region)");
        Ok(())
    }

    #[test]
    fn test_plan_compound() -> Result<()> {
        let node = plan("select a from t union select b from u union all select 3 order by 1 limit 5")?;
        let Node::Limit { source, limit: 5 } = node else {
            panic!("expected limit, got {:?}", node);
        };
        let Node::Order { source, order_by } = *source else {
            panic!("expected order");
        };
        // Positions are left for the executor to resolve against the output
        assert_eq!(order_by[0].0.to_string(), "1");
        let Node::Compound { left, operator: SetOperator::UnionAll, .. } = *source else {
            panic!("expected union all");
        };
        assert!(matches!(*left, Node::Compound { operator: SetOperator::Union, .. }));
        Ok(())
    }

    #[test]
    fn test_plan_insert_sources() -> Result<()> {
        let Node::Insert { source, .. } = plan("insert into t values (1), (2)")? else {
            panic!("expected insert");
        };
        assert!(matches!(*source, Node::Values { ref rows } if rows.len() == 2));

        let Node::Insert { columns, source, .. } = plan("insert into t (a) select b from u")? else {
            panic!("expected insert");
        };
        assert_eq!(columns, vec!["a".to_string()]);
        assert!(matches!(*source, Node::Projection { .. }));
        Ok(())
    }

    #[test]
    fn test_plan_errors() {
        assert!(plan("select a from t where count(*) > 1").is_err());
        assert!(plan("select a from t having a > 1").is_err());
        assert!(plan("select a from t order by 2").is_err());
        assert!(plan("select a from t group by 2").is_err());
        assert!(plan("select count(*) as n from t group by n").is_err());
        assert!(plan("select a from t limit 'x'").is_err());
    }
}
