use std::collections::BTreeMap;
use std::iter::Peekable;

use crate::error::{Error, Result};
use crate::sql::parser::ast::{
    Column, Consts, Expression, FromItem, InsertSource, JoinType, Operation, OrderDirection, SetOperator,
};
use crate::sql::parser::lexer::{Keyword, Lexer, Token};
use crate::sql::types::DataType;

pub mod ast;
mod lexer;

/// Deepest expression nesting the parser accepts, and the tallest tree
const MAX_EXPR_DEPTH: usize = 100;
/// Most SELECTs one compound statement may combine
const MAX_COMPOUND_SELECT: usize = 100;
const MAX_JOIN_TABLES: usize = 64;

/// SQL Parser - Converts tokens into Abstract Syntax Tree (AST)
pub struct Parser<'a> {
    lexer: Peekable<Lexer<'a>>,
    /// Current expression nesting, bounded by MAX_EXPR_DEPTH
    depth: usize,
}

fn unexpected(token: Token) -> Error {
    Error::Parse(format!("near \"{}\": syntax error", token))
}

fn too_large() -> Error {
    Error::Parse(format!("expression tree is too large (maximum depth {})", MAX_EXPR_DEPTH))
}

/// Rejects trees taller than MAX_EXPR_DEPTH. Every subtree was checked when
/// it was built, so measuring stays shallow.
fn bounded(expr: Expression) -> Result<Expression> {
    if expr.depth() > MAX_EXPR_DEPTH {
        return Err(too_large());
    }
    Ok(expr)
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Parser { lexer: Lexer::new(input).peekable(), depth: 0 }
    }

    /// Parses exactly one statement, optionally terminated by a semicolon
    pub fn parse(&mut self) -> Result<ast::Statement> {
        let stmt = self.parse_statement()?;
        let terminated = self.next_if_token(Token::Semicolon).is_some();
        match self.peek()? {
            None => Ok(stmt),
            Some(_) if terminated => Err(Error::Parse(
                "you can only execute one statement at a time".into(),
            )),
            Some(token) => Err(unexpected(token)),
        }
    }

    fn parse_statement(&mut self) -> Result<ast::Statement> {
        match self.peek()? {
            Some(Token::Keyword(Keyword::Create)) => self.parse_create_table(),
            Some(Token::Keyword(Keyword::Drop)) => self.parse_drop_table(),
            Some(Token::Keyword(Keyword::Select)) => Ok(ast::Statement::Select(Box::new(self.parse_select()?))),
            Some(Token::Keyword(Keyword::Insert)) => self.parse_insert(),
            Some(Token::Keyword(Keyword::Update)) => self.parse_update(),
            Some(Token::Keyword(Keyword::Delete)) => self.parse_delete(),
            Some(t) => Err(unexpected(t)),
            None => Err(Error::Parse("incomplete input".into())),
        }
    }

    fn parse_create_table(&mut self) -> Result<ast::Statement> {
        self.next_expect(Token::Keyword(Keyword::Create))?;
        self.next_expect(Token::Keyword(Keyword::Table))?;
        let if_not_exists = if self.next_if_token(Token::Keyword(Keyword::If)).is_some() {
            self.next_expect(Token::Keyword(Keyword::Not))?;
            self.next_expect(Token::Keyword(Keyword::Exists))?;
            true
        } else {
            false
        };
        let name = self.next_ident()?;
        self.next_expect(Token::OpenParen)?;

        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column()?);
            if self.next_if_token(Token::Comma).is_none() {
                break;
            }
        }
        self.next_expect(Token::CloseParen)?;
        Ok(ast::Statement::CreateTable { name, columns, if_not_exists })
    }

    fn parse_column(&mut self) -> Result<Column> {
        let mut column = Column {
            name: self.next_ident()?,
            datatype: match self.next()? {
                Token::Keyword(Keyword::Int) | Token::Keyword(Keyword::Integer) => DataType::Integer,
                Token::Keyword(Keyword::Bool) | Token::Keyword(Keyword::Boolean) => DataType::Boolean,
                Token::Keyword(Keyword::Float)
                | Token::Keyword(Keyword::Double)
                | Token::Keyword(Keyword::Real) => DataType::Float,
                Token::Keyword(Keyword::String)
                | Token::Keyword(Keyword::Text)
                | Token::Keyword(Keyword::Varchar) => DataType::String,
                token => return Err(unexpected(token)),
            },
            nullable: None,
            default: None,
            primary_key: false,
        };

        // VARCHAR(100) and friends: the length is accepted and ignored
        if self.next_if_token(Token::OpenParen).is_some() {
            match self.next()? {
                Token::Number(_) => self.next_expect(Token::CloseParen)?,
                token => return Err(unexpected(token)),
            }
        }

        while let Some(Token::Keyword(keyword)) = self.next_if_keyword() {
            match keyword {
                Keyword::Null => column.nullable = Some(true),
                Keyword::Not => {
                    self.next_expect(Token::Keyword(Keyword::Null))?;
                    column.nullable = Some(false);
                }
                Keyword::Default => column.default = Some(self.parse_unary()?),
                Keyword::Primary => {
                    self.next_expect(Token::Keyword(Keyword::Key))?;
                    column.primary_key = true;
                }
                k => return Err(unexpected(Token::Keyword(k))),
            }
        }
        Ok(column)
    }

    fn parse_drop_table(&mut self) -> Result<ast::Statement> {
        self.next_expect(Token::Keyword(Keyword::Drop))?;
        self.next_expect(Token::Keyword(Keyword::Table))?;
        let if_exists = if self.next_if_token(Token::Keyword(Keyword::If)).is_some() {
            self.next_expect(Token::Keyword(Keyword::Exists))?;
            true
        } else {
            false
        };
        Ok(ast::Statement::DropTable { name: self.next_ident()?, if_exists })
    }

    /// Parses a SELECT, including any UNION/INTERSECT/EXCEPT members and
    /// the ORDER BY, LIMIT and OFFSET that apply to all of them
    fn parse_select(&mut self) -> Result<ast::Select> {
        let mut select = self.parse_select_core()?;
        loop {
            let operator = match self.next_if(|t| {
                matches!(t, Token::Keyword(Keyword::Union | Keyword::Intersect | Keyword::Except))
            }) {
                Some(Token::Keyword(Keyword::Union)) if self.next_if_token(Token::Keyword(Keyword::All)).is_some() => {
                    SetOperator::UnionAll
                }
                Some(Token::Keyword(Keyword::Union)) => SetOperator::Union,
                Some(Token::Keyword(Keyword::Intersect)) => SetOperator::Intersect,
                Some(_) => SetOperator::Except,
                None => break,
            };
            if select.compound.len() + 1 >= MAX_COMPOUND_SELECT {
                return Err(Error::Parse("too many terms in compound SELECT".into()));
            }
            select.compound.push((operator, self.parse_select_core()?));
        }

        if self.next_if_token(Token::Keyword(Keyword::Order)).is_some() {
            self.next_expect(Token::Keyword(Keyword::By))?;
            loop {
                let expr = self.parse_expression()?;
                let direction = match self.next_if(|t| {
                    matches!(t, Token::Keyword(Keyword::Asc) | Token::Keyword(Keyword::Desc))
                }) {
                    Some(Token::Keyword(Keyword::Desc)) => OrderDirection::Desc,
                    _ => OrderDirection::Asc,
                };
                select.order_by.push((expr, direction));
                if self.next_if_token(Token::Comma).is_none() {
                    break;
                }
            }
        }

        select.limit = match self.next_if_token(Token::Keyword(Keyword::Limit)) {
            Some(_) => Some(self.parse_expression()?),
            None => None,
        };
        select.offset = match self.next_if_token(Token::Keyword(Keyword::Offset)) {
            Some(_) => Some(self.parse_expression()?),
            None => None,
        };
        Ok(select)
    }

    /// `SELECT .. [FROM ..] [WHERE ..] [GROUP BY ..] [HAVING ..]`
    fn parse_select_core(&mut self) -> Result<ast::Select> {
        self.next_expect(Token::Keyword(Keyword::Select))?;
        let distinct = self.next_if_token(Token::Keyword(Keyword::Distinct)).is_some();

        let mut select = Vec::new();
        if self.next_if_token(Token::Asterisk).is_none() {
            loop {
                let expr = self.parse_expression()?;
                let alias = self.parse_alias()?;
                select.push((expr, alias));
                if self.next_if_token(Token::Comma).is_none() {
                    break;
                }
            }
        }

        let from = match self.next_if_token(Token::Keyword(Keyword::From)) {
            Some(_) => Some(self.parse_from_clause()?),
            None => None,
        };
        let where_clause = self.parse_where_clause()?;

        let mut group_by = Vec::new();
        if self.next_if_token(Token::Keyword(Keyword::Group)).is_some() {
            self.next_expect(Token::Keyword(Keyword::By))?;
            loop {
                group_by.push(self.parse_expression()?);
                if self.next_if_token(Token::Comma).is_none() {
                    break;
                }
            }
        }
        let having = match self.next_if_token(Token::Keyword(Keyword::Having)) {
            Some(_) => Some(self.parse_expression()?),
            None => None,
        };

        Ok(ast::Select {
            distinct,
            select,
            from,
            where_clause,
            group_by,
            having,
            compound: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        })
    }

    /// `AS alias`, or a bare identifier directly after the expression
    fn parse_alias(&mut self) -> Result<Option<String>> {
        if self.next_if_token(Token::Keyword(Keyword::As)).is_some() {
            return Ok(Some(self.next_ident()?));
        }
        match self.peek()? {
            Some(Token::Ident(_) | Token::QuotedIdent(_)) => Ok(Some(self.next_ident()?)),
            _ => Ok(None),
        }
    }

    fn parse_from_clause(&mut self) -> Result<FromItem> {
        let mut item = self.parse_from_table()?;
        loop {
            if item.table_count() > MAX_JOIN_TABLES {
                return Err(Error::Parse(format!("at most {} tables in a join", MAX_JOIN_TABLES)));
            }
            if self.next_if_token(Token::Comma).is_some() {
                item = FromItem::Join {
                    left: Box::new(item),
                    right: Box::new(self.parse_from_table()?),
                    join_type: JoinType::Cross,
                    predicate: None,
                    using: Vec::new(),
                };
                continue;
            }
            let Some(join_type) = self.parse_join_type()? else {
                break;
            };
            let right = self.parse_from_table()?;
            let (predicate, using) = match join_type {
                JoinType::Cross => (None, Vec::new()),
                _ if self.next_if_token(Token::Keyword(Keyword::Using)).is_some() => {
                    (None, self.parse_column_list()?)
                }
                _ => {
                    self.next_expect(Token::Keyword(Keyword::On))?;
                    (Some(self.parse_expression()?), Vec::new())
                }
            };
            item = FromItem::Join {
                left: Box::new(item),
                right: Box::new(right),
                join_type,
                predicate,
                using,
            };
        }
        if item.table_count() > MAX_JOIN_TABLES {
            return Err(Error::Parse(format!("at most {} tables in a join", MAX_JOIN_TABLES)));
        }
        Ok(item)
    }

    fn parse_from_table(&mut self) -> Result<FromItem> {
        let name = self.next_ident()?;
        let alias = self.parse_alias()?;
        Ok(FromItem::Table { name, alias })
    }

    fn parse_join_type(&mut self) -> Result<Option<JoinType>> {
        let join_type = match self.peek()? {
            Some(Token::Keyword(Keyword::Join)) => JoinType::Inner,
            Some(Token::Keyword(Keyword::Inner)) => {
                self.next()?;
                JoinType::Inner
            }
            Some(Token::Keyword(Keyword::Cross)) => {
                self.next()?;
                JoinType::Cross
            }
            Some(Token::Keyword(keyword @ (Keyword::Left | Keyword::Right))) => {
                self.next()?;
                self.next_if_token(Token::Keyword(Keyword::Outer));
                if keyword == Keyword::Left { JoinType::Left } else { JoinType::Right }
            }
            _ => return Ok(None),
        };
        self.next_expect(Token::Keyword(Keyword::Join))?;
        Ok(Some(join_type))
    }

    fn parse_insert(&mut self) -> Result<ast::Statement> {
        self.next_expect(Token::Keyword(Keyword::Insert))?;
        self.next_expect(Token::Keyword(Keyword::Into))?;
        let table_name = self.next_ident()?;

        let columns = match self.peek()? {
            Some(Token::OpenParen) => Some(self.parse_column_list()?),
            _ => None,
        };

        if let Some(Token::Keyword(Keyword::Select)) = self.peek()? {
            let select = self.parse_select()?;
            return Ok(ast::Statement::Insert {
                table_name,
                columns,
                source: InsertSource::Select(Box::new(select)),
            });
        }

        self.next_expect(Token::Keyword(Keyword::Values))?;
        let mut values = Vec::new();
        loop {
            self.next_expect(Token::OpenParen)?;
            let mut row = Vec::new();
            loop {
                row.push(self.parse_expression()?);
                match self.next()? {
                    Token::CloseParen => break,
                    Token::Comma => {}
                    token => return Err(unexpected(token)),
                }
            }
            values.push(row);
            if self.next_if_token(Token::Comma).is_none() {
                break;
            }
        }
        Ok(ast::Statement::Insert {
            table_name,
            columns,
            source: InsertSource::Values(values),
        })
    }

    /// `(a, b, ..)` naming columns
    fn parse_column_list(&mut self) -> Result<Vec<String>> {
        self.next_expect(Token::OpenParen)?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.next_ident()?);
            match self.next()? {
                Token::CloseParen => break,
                Token::Comma => {}
                token => return Err(unexpected(token)),
            }
        }
        Ok(columns)
    }

    fn parse_update(&mut self) -> Result<ast::Statement> {
        self.next_expect(Token::Keyword(Keyword::Update))?;
        let table_name = self.next_ident()?;
        self.next_expect(Token::Keyword(Keyword::Set))?;

        let mut columns = BTreeMap::new();
        loop {
            let col = self.next_ident()?;
            self.next_expect(Token::Equal)?;
            let value = self.parse_expression()?;
            if columns.contains_key(&col) {
                return Err(Error::Parse(format!("duplicate column {} in update", col)));
            }
            columns.insert(col, value);
            if self.next_if_token(Token::Comma).is_none() {
                break;
            }
        }
        Ok(ast::Statement::Update {
            table_name,
            columns,
            where_clause: self.parse_where_clause()?,
        })
    }

    fn parse_delete(&mut self) -> Result<ast::Statement> {
        self.next_expect(Token::Keyword(Keyword::Delete))?;
        self.next_expect(Token::Keyword(Keyword::From))?;
        let table_name = self.next_ident()?;
        Ok(ast::Statement::Delete {
            table_name,
            where_clause: self.parse_where_clause()?,
        })
    }

    fn parse_where_clause(&mut self) -> Result<Option<Expression>> {
        if self.next_if_token(Token::Keyword(Keyword::Where)).is_none() {
            return Ok(None);
        }
        Ok(Some(self.parse_expression()?))
    }

    /// Parses an expression. Precedence, loosest first: OR, AND, NOT,
    /// comparisons (including IS/LIKE/IN/BETWEEN), + -, * / %, ||, unary minus.
    fn parse_expression(&mut self) -> Result<Expression> {
        self.nested(|p| p.parse_or().and_then(bounded))
    }

    /// Runs `f` one nesting level deeper, failing past MAX_EXPR_DEPTH
    fn nested<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if self.depth >= MAX_EXPR_DEPTH {
            return Err(too_large());
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_and()?;
        while self.next_if_token(Token::Keyword(Keyword::Or)).is_some() {
            lhs = bounded(Operation::Or(Box::new(lhs), Box::new(self.parse_and()?)).into())?;
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_not()?;
        while self.next_if_token(Token::Keyword(Keyword::And)).is_some() {
            lhs = bounded(Operation::And(Box::new(lhs), Box::new(self.parse_not()?)).into())?;
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expression> {
        if self.next_if_token(Token::Keyword(Keyword::Not)).is_some() {
            return bounded(Operation::Not(Box::new(self.nested(Self::parse_not)?)).into());
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        let lhs = self.parse_additive()?;
        let boxed = Box::new;
        Ok(match self.peek()? {
            Some(Token::Equal) => {
                self.next()?;
                Operation::Equal(boxed(lhs), boxed(self.parse_additive()?)).into()
            }
            Some(Token::NotEqual) => {
                self.next()?;
                Operation::NotEqual(boxed(lhs), boxed(self.parse_additive()?)).into()
            }
            Some(Token::LessThan) => {
                self.next()?;
                Operation::LessThan(boxed(lhs), boxed(self.parse_additive()?)).into()
            }
            Some(Token::LessThanOrEqual) => {
                self.next()?;
                Operation::LessThanOrEqual(boxed(lhs), boxed(self.parse_additive()?)).into()
            }
            Some(Token::GreaterThan) => {
                self.next()?;
                Operation::GreaterThan(boxed(lhs), boxed(self.parse_additive()?)).into()
            }
            Some(Token::GreaterThanOrEqual) => {
                self.next()?;
                Operation::GreaterThanOrEqual(boxed(lhs), boxed(self.parse_additive()?)).into()
            }
            Some(Token::Keyword(Keyword::Is)) => {
                self.next()?;
                let negated = self.next_if_token(Token::Keyword(Keyword::Not)).is_some();
                self.next_expect(Token::Keyword(Keyword::Null))?;
                Operation::IsNull(boxed(lhs), negated).into()
            }
            Some(Token::Keyword(Keyword::Not | Keyword::Like | Keyword::In | Keyword::Between)) => {
                let negated = self.next_if_token(Token::Keyword(Keyword::Not)).is_some();
                match self.next()? {
                    Token::Keyword(Keyword::Like) => {
                        Operation::Like(boxed(lhs), boxed(self.parse_additive()?), negated).into()
                    }
                    Token::Keyword(Keyword::In) => {
                        self.next_expect(Token::OpenParen)?;
                        if let Some(Token::Keyword(Keyword::Select)) = self.peek()? {
                            let select = self.parse_select()?;
                            self.next_expect(Token::CloseParen)?;
                            return Ok(Operation::InSubquery(boxed(lhs), Box::new(select), negated).into());
                        }
                        let mut list = Vec::new();
                        loop {
                            list.push(self.parse_expression()?);
                            if self.next_if_token(Token::Comma).is_none() {
                                break;
                            }
                        }
                        self.next_expect(Token::CloseParen)?;
                        Operation::In(boxed(lhs), list, negated).into()
                    }
                    Token::Keyword(Keyword::Between) => {
                        let low = self.parse_additive()?;
                        self.next_expect(Token::Keyword(Keyword::And))?;
                        let high = self.parse_additive()?;
                        Operation::Between(boxed(lhs), boxed(low), boxed(high), negated).into()
                    }
                    token => return Err(unexpected(token)),
                }
            }
            _ => lhs,
        })
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            lhs = bounded(
                match self.next_if(|t| matches!(t, Token::Plus | Token::Minus)) {
                    Some(Token::Plus) => Operation::Add(Box::new(lhs), Box::new(self.parse_multiplicative()?)),
                    Some(_) => Operation::Subtract(Box::new(lhs), Box::new(self.parse_multiplicative()?)),
                    None => return Ok(lhs),
                }
                .into(),
            )?;
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_concat()?;
        loop {
            lhs = bounded(
                match self.next_if(|t| matches!(t, Token::Asterisk | Token::Slash | Token::Percent)) {
                    Some(Token::Asterisk) => Operation::Multiply(Box::new(lhs), Box::new(self.parse_concat()?)),
                    Some(Token::Slash) => Operation::Divide(Box::new(lhs), Box::new(self.parse_concat()?)),
                    Some(_) => Operation::Modulo(Box::new(lhs), Box::new(self.parse_concat()?)),
                    None => return Ok(lhs),
                }
                .into(),
            )?;
        }
    }

    fn parse_concat(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_unary()?;
        while self.next_if_token(Token::Concat).is_some() {
            lhs = bounded(Operation::Concat(Box::new(lhs), Box::new(self.parse_unary()?)).into())?;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        match self.next_if(|t| matches!(t, Token::Minus | Token::Plus)) {
            Some(Token::Minus) => match self.nested(Self::parse_unary)? {
                Expression::Consts(Consts::Integer(i)) if i != i64::MIN => Ok(Consts::Integer(-i).into()),
                Expression::Consts(Consts::Float(f)) => Ok(Consts::Float(-f).into()),
                expr => bounded(Operation::Negate(Box::new(expr)).into()),
            },
            Some(_) => self.nested(Self::parse_unary),
            None => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        Ok(match self.next()? {
            Token::Number(n) => {
                // The lexer scans both 123 and 123.45 as Token::Number
                if n.chars().all(|c| c.is_ascii_digit()) {
                    Consts::Integer(n.parse()?).into()
                } else {
                    Consts::Float(n.parse()?).into()
                }
            }
            Token::String(s) => Consts::String(s).into(),
            Token::Keyword(Keyword::True) => Consts::Boolean(true).into(),
            Token::Keyword(Keyword::False) => Consts::Boolean(false).into(),
            Token::Keyword(Keyword::Null) => Consts::Null.into(),
            Token::OpenParen => {
                let expr = match self.peek()? {
                    Some(Token::Keyword(Keyword::Select)) => Expression::Subquery(Box::new(self.parse_select()?)),
                    _ => self.parse_expression()?,
                };
                self.next_expect(Token::CloseParen)?;
                expr
            }
            Token::Keyword(Keyword::Exists) => {
                self.next_expect(Token::OpenParen)?;
                let select = self.parse_select()?;
                self.next_expect(Token::CloseParen)?;
                Expression::Exists(Box::new(select))
            }
            Token::Keyword(Keyword::Case) => self.parse_case()?,
            Token::Keyword(Keyword::Cast) => {
                self.next_expect(Token::OpenParen)?;
                let expr = self.parse_expression()?;
                self.next_expect(Token::Keyword(Keyword::As))?;
                let datatype = match self.next()? {
                    Token::Keyword(Keyword::Int | Keyword::Integer) => DataType::Integer,
                    Token::Keyword(Keyword::Float | Keyword::Double | Keyword::Real) => DataType::Float,
                    Token::Keyword(Keyword::Bool | Keyword::Boolean) => DataType::Boolean,
                    Token::Keyword(Keyword::Text | Keyword::String | Keyword::Varchar) => DataType::String,
                    token => return Err(unexpected(token)),
                };
                self.next_expect(Token::CloseParen)?;
                Expression::Cast(Box::new(expr), datatype)
            }
            Token::Ident(name) if self.next_if_token(Token::OpenParen).is_some() => {
                self.parse_function_args(name)?
            }
            Token::Ident(name) | Token::QuotedIdent(name) => {
                if self.next_if_token(Token::Period).is_some() {
                    Expression::Field(Some(name), self.next_ident()?)
                } else {
                    Expression::Field(None, name)
                }
            }
            t => return Err(unexpected(t)),
        })
    }

    /// Parses the argument list after `name(`
    fn parse_function_args(&mut self, name: String) -> Result<Expression> {
        let mut args = Vec::new();
        let mut distinct = false;
        if self.next_if_token(Token::CloseParen).is_some() {
            return Ok(Expression::Function { name, args, distinct });
        }
        if self.next_if_token(Token::Asterisk).is_some() {
            args.push(Expression::Wildcard);
        } else {
            distinct = self.next_if_token(Token::Keyword(Keyword::Distinct)).is_some();
            loop {
                args.push(self.parse_expression()?);
                if self.next_if_token(Token::Comma).is_none() {
                    break;
                }
            }
        }
        self.next_expect(Token::CloseParen)?;
        Ok(Expression::Function { name, args, distinct })
    }

    /// Parses the rest of `CASE [operand] WHEN .. THEN .. [ELSE ..] END`
    fn parse_case(&mut self) -> Result<Expression> {
        let operand = match self.peek()? {
            Some(Token::Keyword(Keyword::When)) => None,
            _ => Some(Box::new(self.parse_expression()?)),
        };
        let mut branches = Vec::new();
        while self.next_if_token(Token::Keyword(Keyword::When)).is_some() {
            let when = self.parse_expression()?;
            self.next_expect(Token::Keyword(Keyword::Then))?;
            branches.push((when, self.parse_expression()?));
        }
        if branches.is_empty() {
            return Err(Error::Parse("CASE requires at least one WHEN".into()));
        }
        let else_result = match self.next_if_token(Token::Keyword(Keyword::Else)) {
            Some(_) => Some(Box::new(self.parse_expression()?)),
            None => None,
        };
        self.next_expect(Token::Keyword(Keyword::End))?;
        Ok(Expression::Case { operand, branches, else_result })
    }

    fn peek(&mut self) -> Result<Option<Token>> {
        self.lexer.peek().cloned().transpose()
    }

    fn next(&mut self) -> Result<Token> {
        self.lexer
            .next()
            .unwrap_or_else(|| Err(Error::Parse("incomplete input".into())))
    }

    /// Expects an identifier, bare or double-quoted
    fn next_ident(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(ident) | Token::QuotedIdent(ident) => Ok(ident),
            token => Err(unexpected(token)),
        }
    }

    fn next_expect(&mut self, expect: Token) -> Result<()> {
        let token = self.next()?;
        if token != expect {
            return Err(unexpected(token));
        }
        Ok(())
    }

    fn next_if<F: Fn(&Token) -> bool>(&mut self, predicate: F) -> Option<Token> {
        self.peek().unwrap_or(None).filter(|t| predicate(t))?;
        self.next().ok()
    }

    fn next_if_keyword(&mut self) -> Option<Token> {
        self.next_if(|t| matches!(t, Token::Keyword(_)))
    }

    fn next_if_token(&mut self, token: Token) -> Option<Token> {
        self.next_if(|t| t == &token)
    }
}
