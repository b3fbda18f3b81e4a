use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::{
            agg::Aggregate,
            join::NestedLoopJoin,
            mutation::{Delete, Insert, Update},
            query::{Compound, Distinct, Filter, Limit, Nothing, Offset, Order, Projection, Scan, Values},
            schema::{CreateTable, DropTable},
        },
        plan::Node,
        types::{Label, Row},
    },
};

mod agg;
mod expr;
mod join;
mod mutation;
mod query;
mod schema;
mod subquery;

/// SQL executor trait
pub trait Executor<T: Transaction> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet>;
}

/// Builds an executor from a plan node
///
/// The `'static` bound is required for trait object usage in recursive executor building.
impl<T: Transaction + 'static> dyn Executor<T> {
    pub fn build(node: Node) -> Box<dyn Executor<T>> {
        match node {
            Node::CreateTable { schema, if_not_exists } => CreateTable::new(schema, if_not_exists),
            Node::DropTable { table_name, if_exists } => DropTable::new(table_name, if_exists),
            Node::Insert { table_name, columns, source } => Insert::new(table_name, columns, Self::build(*source)),
            Node::Update { table_name, filter, columns } => Update::new(table_name, filter, columns),
            Node::Delete { table_name, filter } => Delete::new(table_name, filter),
            Node::Nothing => Nothing::new(),
            Node::Scan { table_name, alias } => Scan::new(table_name, alias),
            Node::Values { rows } => Values::new(rows),
            Node::NestedLoopJoin { left, right, predicate, using, join_type } => NestedLoopJoin::new(
                Self::build(*left),
                Self::build(*right),
                predicate,
                using,
                join_type,
            ),
            Node::Filter { source, predicate } => Filter::new(Self::build(*source), predicate),
            Node::Aggregate { source, group_by, aggregates } => {
                Aggregate::new(Self::build(*source), group_by, aggregates)
            }
            Node::Projection { source, exprs } => Projection::new(Self::build(*source), exprs),
            Node::Distinct { source } => Distinct::new(Self::build(*source)),
            Node::Order { source, order_by } => Order::new(Self::build(*source), order_by),
            Node::Limit { source, limit } => Limit::new(Self::build(*source), limit),
            Node::Offset { source, offset } => Offset::new(Self::build(*source), offset),
            Node::Compound { left, right, operator } => {
                Compound::new(Self::build(*left), Self::build(*right), operator)
            }
        }
    }
}

/// Execution result set
#[derive(Debug, PartialEq)]
pub enum ResultSet {
    CreateTable { table_name: String },
    DropTable { table_name: String },
    Insert { count: usize },
    Scan { columns: Vec<Label>, rows: Vec<Row> },
    Update { count: usize },
    Delete { count: usize },
}

impl ResultSet {
    /// Unwraps the rows of a query result
    pub fn into_scan(self) -> Result<(Vec<Label>, Vec<Row>)> {
        match self {
            ResultSet::Scan { columns, rows } => Ok((columns, rows)),
            _ => Err(Error::Internal("Unexpected result set".into())),
        }
    }
}
