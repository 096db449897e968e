//! SQL parser - converts tokens into the typed query AST

use super::ast::*;
use super::token::{Token, TokenType};
use crate::error::{EngineError, Result};
use crate::types::{IntegerWidth, Value};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    /// Values substituted for `?` placeholders, in order.
    params: &'a [Value],
    param_index: usize,
    /// The DEFAULT marker is only legal inside INSERT value lists.
    in_values: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, params: &'a [Value]) -> Self {
        Self {
            tokens,
            position: 0,
            params,
            param_index: 0,
            in_values: false,
        }
    }

    /// Parse a single SQL statement.
    pub fn parse(&mut self) -> Result<Query> {
        let query = match &self.current().token_type {
            TokenType::Select => Query::Select(self.parse_select()?),
            TokenType::Insert => Query::Insert(self.parse_insert()?),
            TokenType::Create => Query::CreateTable(self.parse_create_table()?),
            TokenType::Drop => Query::DropTable(self.parse_drop_table()?),
            TokenType::Start => {
                self.advance();
                self.expect(TokenType::Transaction)?;
                Query::Transaction(TransactionQuery::StartTransaction)
            }
            TokenType::Begin => {
                self.advance();
                Query::Transaction(TransactionQuery::StartTransaction)
            }
            TokenType::Commit => {
                self.advance();
                Query::Transaction(TransactionQuery::Commit)
            }
            TokenType::Rollback => {
                self.advance();
                Query::Transaction(TransactionQuery::Rollback)
            }
            _ => {
                return Err(
                    self.error("Expected SELECT, INSERT, CREATE, DROP, or a transaction statement")
                )
            }
        };

        if matches!(self.current().token_type, TokenType::Semicolon) {
            self.advance();
        }
        if !matches!(self.current().token_type, TokenType::Eof) {
            return Err(self.error("Unexpected trailing input"));
        }

        Ok(query)
    }

    fn parse_select(&mut self) -> Result<SelectQuery> {
        self.expect(TokenType::Select)?;

        let distinct = self.match_token(TokenType::Distinct);
        let columns = self.parse_select_columns()?;

        let from = if self.match_token(TokenType::From) {
            self.parse_from()?
        } else {
            Vec::new()
        };

        let where_clause = if self.match_token(TokenType::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        let group_by = if self.match_token(TokenType::Group) {
            self.expect(TokenType::By)?;
            self.parse_column_ref_list()?
        } else {
            Vec::new()
        };

        let having = if self.match_token(TokenType::Having) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        let order_by = if self.match_token(TokenType::Order) {
            self.expect(TokenType::By)?;
            self.parse_order_by()?
        } else {
            Vec::new()
        };

        // `LIMIT n`, `LIMIT offset, n`, and `LIMIT n OFFSET offset` all
        // collapse to the same (limit, offset) pair; 0 means unbounded.
        let mut limit = 0;
        let mut offset = 0;
        if self.match_token(TokenType::Limit) {
            let first = self.parse_count()?;
            if self.match_token(TokenType::Comma) {
                offset = first;
                limit = self.parse_count()?;
            } else {
                limit = first;
                if self.match_token(TokenType::Offset) {
                    offset = self.parse_count()?;
                }
            }
        }

        Ok(SelectQuery {
            from,
            columns,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
            distinct,
        })
    }

    fn parse_select_columns(&mut self) -> Result<Vec<SelectColumn>> {
        let mut columns = Vec::new();

        loop {
            let expr = if matches!(self.current().token_type, TokenType::Star) {
                self.advance();
                Expr::Star { table: None }
            } else {
                self.parse_expr(0)?
            };
            let alias = self.parse_optional_alias()?;
            columns.push(SelectColumn { expr, alias });

            if !self.match_token(TokenType::Comma) {
                break;
            }
        }

        Ok(columns)
    }

    fn parse_from(&mut self) -> Result<Vec<TableRef>> {
        let mut sources = vec![self.parse_table_source(None)?];

        loop {
            if self.match_token(TokenType::Comma) {
                sources.push(self.parse_table_source(None)?);
            } else if let Some(kind) = self.try_parse_join_kind()? {
                let mut source = self.parse_table_source(Some(kind))?;
                if self.match_token(TokenType::On) {
                    let condition = self.parse_expr(0)?;
                    match &mut source {
                        TableRef::Table { on, .. } | TableRef::Derived { on, .. } => {
                            *on = Some(condition)
                        }
                    }
                }
                sources.push(source);
            } else {
                break;
            }
        }

        Ok(sources)
    }

    fn try_parse_join_kind(&mut self) -> Result<Option<JoinKind>> {
        let kind = match self.current().token_type {
            TokenType::Join => {
                self.advance();
                JoinKind::Inner
            }
            TokenType::Inner => {
                self.advance();
                self.expect(TokenType::Join)?;
                JoinKind::Inner
            }
            TokenType::Cross => {
                self.advance();
                self.expect(TokenType::Join)?;
                JoinKind::Cross
            }
            TokenType::Left => {
                self.advance();
                self.match_token(TokenType::Outer);
                self.expect(TokenType::Join)?;
                JoinKind::Left
            }
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }

    /// A base table `[db.]name [AS] alias` or a parenthesized derived table.
    /// A derived table's alias stays optional here; the pipeline enforces it
    /// so the error carries MySQL's wording.
    fn parse_table_source(&mut self, join: Option<JoinKind>) -> Result<TableRef> {
        if self.match_token(TokenType::LParen) {
            if !matches!(self.current().token_type, TokenType::Select) {
                return Err(self.error("Expected SELECT in derived table"));
            }
            let query = self.parse_select()?;
            self.expect(TokenType::RParen)?;
            let alias = self.parse_optional_alias()?;
            Ok(TableRef::Derived {
                query: Box::new(query),
                alias,
                join,
                on: None,
            })
        } else {
            let (database, table) = self.parse_qualified_name()?;
            let alias = self.parse_optional_alias()?;
            Ok(TableRef::Table {
                database,
                table,
                alias,
                join,
                on: None,
            })
        }
    }

    fn parse_order_by(&mut self) -> Result<Vec<OrderBy>> {
        let mut terms = Vec::new();

        loop {
            let column = self.parse_column_ref()?;
            let order = if self.match_token(TokenType::Desc) {
                SortOrder::Desc
            } else {
                self.match_token(TokenType::Asc);
                SortOrder::Asc
            };
            terms.push(OrderBy { column, order });

            if !self.match_token(TokenType::Comma) {
                break;
            }
        }

        Ok(terms)
    }

    fn parse_column_ref_list(&mut self) -> Result<Vec<ColumnRef>> {
        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column_ref()?);
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }
        Ok(columns)
    }

    fn parse_column_ref(&mut self) -> Result<ColumnRef> {
        let (table, column) = self.parse_qualified_name()?;
        Ok(ColumnRef { table, column })
    }

    fn parse_insert(&mut self) -> Result<InsertQuery> {
        self.expect(TokenType::Insert)?;
        self.expect(TokenType::Into)?;

        let (database, table) = self.parse_qualified_name()?;

        let columns = if self.match_token(TokenType::LParen) {
            let mut names = Vec::new();
            loop {
                names.push(self.parse_identifier()?);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
            self.expect(TokenType::RParen)?;
            Some(names)
        } else {
            None
        };

        self.expect(TokenType::Values)?;

        self.in_values = true;
        let mut values = Vec::new();
        loop {
            self.expect(TokenType::LParen)?;
            let mut row = Vec::new();
            loop {
                row.push(self.parse_expr(0)?);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
            self.expect(TokenType::RParen)?;
            values.push(row);

            if !self.match_token(TokenType::Comma) {
                break;
            }
        }
        self.in_values = false;

        Ok(InsertQuery {
            database,
            table,
            columns,
            values,
        })
    }

    fn parse_create_table(&mut self) -> Result<CreateTableQuery> {
        self.expect(TokenType::Create)?;
        self.expect(TokenType::Table)?;
        let (database, table) = self.parse_qualified_name()?;

        self.expect(TokenType::LParen)?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column_def()?);
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RParen)?;

        Ok(CreateTableQuery {
            database,
            table,
            columns,
        })
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.parse_identifier()?;
        let data_type = self.parse_data_type()?;

        let mut nullable = true;
        let mut auto_increment = false;
        let mut default = None;
        loop {
            if self.match_token(TokenType::Not) {
                self.expect(TokenType::Null)?;
                nullable = false;
            } else if self.match_token(TokenType::Null) {
                nullable = true;
            } else if self.match_token(TokenType::AutoIncrement) {
                auto_increment = true;
            } else if self.match_token(TokenType::Default) {
                default = Some(self.parse_expr(0)?);
            } else {
                break;
            }
        }

        Ok(ColumnDef {
            name,
            data_type,
            nullable,
            auto_increment,
            default,
        })
    }

    fn parse_data_type(&mut self) -> Result<DataType> {
        let width = match self.current().token_type {
            TokenType::TinyInt => Some(IntegerWidth::TinyInt),
            TokenType::SmallInt => Some(IntegerWidth::SmallInt),
            TokenType::Int => Some(IntegerWidth::Int),
            TokenType::BigInt => Some(IntegerWidth::BigInt),
            _ => None,
        };
        if let Some(width) = width {
            self.advance();
            // Display width, e.g. INT(11), is parsed and ignored.
            if self.match_token(TokenType::LParen) {
                self.parse_count()?;
                self.expect(TokenType::RParen)?;
            }
            let unsigned = self.match_token(TokenType::Unsigned);
            return Ok(DataType::Integer { width, unsigned });
        }

        match self.current().token_type {
            TokenType::Varchar => {
                self.advance();
                self.expect(TokenType::LParen)?;
                let length = self.parse_count()?;
                self.expect(TokenType::RParen)?;
                Ok(DataType::Varchar(length))
            }
            TokenType::Datetime => {
                self.advance();
                Ok(DataType::Datetime)
            }
            _ => Err(self.error("Expected data type")),
        }
    }

    fn parse_drop_table(&mut self) -> Result<DropTableQuery> {
        self.expect(TokenType::Drop)?;
        self.expect(TokenType::Table)?;
        let (database, table) = self.parse_qualified_name()?;
        Ok(DropTableQuery { database, table })
    }

    /// Pratt expression parser.
    fn parse_expr(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_prefix_expr()?;

        while let Some(op) = self.peek_binary_op() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance();

            let op = if op == BinaryOp::Is && self.match_token(TokenType::Not) {
                BinaryOp::IsNot
            } else {
                op
            };

            let right = match op {
                // IN takes a parenthesized value list, not a sub-expression.
                BinaryOp::In => {
                    self.expect(TokenType::LParen)?;
                    let mut items = Vec::new();
                    loop {
                        items.push(self.parse_expr(0)?);
                        if !self.match_token(TokenType::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenType::RParen)?;
                    Expr::Array(items)
                }
                _ => self.parse_expr(precedence + 1)?,
            };

            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        match self.current().token_type {
            TokenType::Eq => Some(BinaryOp::Eq),
            TokenType::Ne => Some(BinaryOp::Ne),
            TokenType::Lt => Some(BinaryOp::Lt),
            TokenType::Le => Some(BinaryOp::Le),
            TokenType::Gt => Some(BinaryOp::Gt),
            TokenType::Ge => Some(BinaryOp::Ge),
            TokenType::Plus => Some(BinaryOp::Add),
            TokenType::Minus => Some(BinaryOp::Sub),
            TokenType::Star => Some(BinaryOp::Mul),
            TokenType::Slash => Some(BinaryOp::Div),
            TokenType::And => Some(BinaryOp::And),
            TokenType::Or => Some(BinaryOp::Or),
            TokenType::In => Some(BinaryOp::In),
            TokenType::Like => Some(BinaryOp::Like),
            TokenType::Is => Some(BinaryOp::Is),
            _ => None,
        }
    }

    fn parse_prefix_expr(&mut self) -> Result<Expr> {
        match &self.current().token_type {
            TokenType::Minus => {
                self.advance();
                let operand = self.parse_expr(6)?;
                Ok(match operand {
                    Expr::Literal(Value::Integer(i)) => Expr::Literal(Value::Integer(-i)),
                    Expr::Literal(Value::Float(f)) => Expr::Literal(Value::Float(-f)),
                    other => Expr::Binary {
                        op: BinaryOp::Sub,
                        left: Box::new(Expr::Literal(Value::Integer(0))),
                        right: Box::new(other),
                    },
                })
            }
            TokenType::Plus => {
                self.advance();
                self.parse_expr(6)
            }

            // Parenthesized expression or scalar sub-query
            TokenType::LParen => {
                self.advance();
                if matches!(self.current().token_type, TokenType::Select) {
                    let subquery = self.parse_select()?;
                    self.expect(TokenType::RParen)?;
                    return Ok(Expr::Subquery(Box::new(subquery)));
                }
                let expr = self.parse_expr(0)?;
                self.expect(TokenType::RParen)?;
                Ok(expr)
            }

            TokenType::Number(n) => {
                let n = *n;
                self.advance();
                if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
                    Ok(Expr::Literal(Value::Integer(n as i64)))
                } else {
                    Ok(Expr::Literal(Value::Float(n)))
                }
            }
            TokenType::String(s) => {
                let s = s.clone();
                self.advance();
                Ok(Expr::Literal(Value::Text(s)))
            }
            TokenType::True => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            TokenType::False => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            TokenType::Null => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            TokenType::Default => {
                if !self.in_values {
                    return Err(self.error("DEFAULT is only allowed in INSERT values"));
                }
                self.advance();
                Ok(Expr::Literal(Value::Default))
            }

            TokenType::Placeholder => {
                self.advance();
                let value = self
                    .params
                    .get(self.param_index)
                    .cloned()
                    .ok_or_else(|| {
                        EngineError::Parse("Not enough parameters for placeholders".to_string())
                    })?;
                self.param_index += 1;
                Ok(Expr::Literal(value))
            }

            TokenType::Case => self.parse_case(),

            TokenType::Identifier(name) => {
                let name = name.clone();
                self.advance();

                if self.match_token(TokenType::LParen) {
                    let distinct = self.match_token(TokenType::Distinct);
                    let mut args = Vec::new();
                    if matches!(self.current().token_type, TokenType::Star) {
                        self.advance();
                        args.push(Expr::Star { table: None });
                    } else if !matches!(self.current().token_type, TokenType::RParen) {
                        loop {
                            args.push(self.parse_expr(0)?);
                            if !self.match_token(TokenType::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenType::RParen)?;
                    return Ok(Expr::Function {
                        name,
                        args,
                        distinct,
                    });
                }

                if self.match_token(TokenType::Dot) {
                    if matches!(self.current().token_type, TokenType::Star) {
                        self.advance();
                        return Ok(Expr::Star { table: Some(name) });
                    }
                    let column = self.parse_identifier()?;
                    return Ok(Expr::Column(ColumnRef {
                        table: Some(name),
                        column,
                    }));
                }

                Ok(Expr::Column(ColumnRef {
                    table: None,
                    column: name,
                }))
            }

            _ => Err(self.error("Unexpected token in expression")),
        }
    }

    fn parse_case(&mut self) -> Result<Expr> {
        self.expect(TokenType::Case)?;

        let mut branches = Vec::new();
        while self.match_token(TokenType::When) {
            let condition = self.parse_expr(0)?;
            self.expect(TokenType::Then)?;
            let value = self.parse_expr(0)?;
            branches.push((condition, value));
        }
        if branches.is_empty() {
            return Err(self.error("Expected WHEN after CASE"));
        }

        let else_branch = if self.match_token(TokenType::Else) {
            Some(Box::new(self.parse_expr(0)?))
        } else {
            None
        };
        self.expect(TokenType::End)?;

        Ok(Expr::Case {
            branches,
            else_branch,
        })
    }

    fn parse_qualified_name(&mut self) -> Result<(Option<String>, String)> {
        let first = self.parse_identifier()?;
        if self.match_token(TokenType::Dot) {
            let second = self.parse_identifier()?;
            Ok((Some(first), second))
        } else {
            Ok((None, first))
        }
    }

    fn parse_optional_alias(&mut self) -> Result<Option<String>> {
        if self.match_token(TokenType::As) {
            return Ok(Some(self.parse_identifier()?));
        }
        if let TokenType::Identifier(name) = &self.current().token_type {
            let name = name.clone();
            self.advance();
            return Ok(Some(name));
        }
        Ok(None)
    }

    fn parse_identifier(&mut self) -> Result<String> {
        if let TokenType::Identifier(name) = &self.current().token_type {
            let name = name.clone();
            self.advance();
            return Ok(name);
        }
        Err(self.error("Expected identifier"))
    }

    fn parse_count(&mut self) -> Result<usize> {
        if let TokenType::Number(n) = self.current().token_type {
            if n.fract() == 0.0 && n >= 0.0 {
                self.advance();
                return Ok(n as usize);
            }
        }
        Err(self.error("Expected a non-negative integer"))
    }

    fn current(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if self.current().token_type == token_type {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token_type: TokenType) -> Result<()> {
        if self.current().token_type == token_type {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("Expected {token_type:?}")))
        }
    }

    fn error(&self, message: &str) -> EngineError {
        let token = self.current();
        EngineError::Parse(format!(
            "{} at {}:{}",
            message, token.line, token.column
        ))
    }
}
