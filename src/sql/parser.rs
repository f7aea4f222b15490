//! Recursive-descent SQL parser.
//!
//! Statements are parsed by recursive descent; expressions use one function
//! per precedence level, lowest first:
//!
//! 1. `OR`
//! 2. `AND`
//! 3. `NOT` (prefix)
//! 4. comparisons, `IS [NOT] NULL`, `[NOT] IN (...)`
//! 5. `+`, `-`
//! 6. `*`, `/`, `%`
//! 7. unary `-`, `+`

use super::ast::*;
use super::error::SyntaxError;
use super::lexer::Lexer;
use super::token::{Keyword, Token, TokenKind};
use crate::types::{DataType, ScalarValue, MAX_DECIMAL_PRECISION};

/// Parses a single statement.
pub fn parse(sql: &str) -> Result<Statement, SyntaxError> {
    Parser::new(sql)?.parse()
}

pub struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Result<Self, SyntaxError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self {
            input,
            tokens,
            pos: 0,
        })
    }

    /// Parses one statement, an optional trailing `;`, and end of input.
    pub fn parse(&mut self) -> Result<Statement, SyntaxError> {
        let stmt = self.parse_statement()?;
        self.consume(&TokenKind::Semicolon);
        if !self.at(&TokenKind::Eof) {
            return Err(self.expected("end of input"));
        }
        Ok(stmt)
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        if self.consume_keyword(Keyword::Explain) {
            let inner = self.parse_statement()?;
            return Ok(Statement::Explain(Box::new(inner)));
        }
        match self.peek_kind() {
            TokenKind::Keyword(Keyword::Select) => {
                Ok(Statement::Select(Box::new(self.parse_select()?)))
            }
            TokenKind::Keyword(Keyword::Insert) => Ok(Statement::Insert(self.parse_insert()?)),
            TokenKind::Keyword(Keyword::Create) => {
                Ok(Statement::CreateTable(self.parse_create_table()?))
            }
            _ => Err(self.expected("SELECT, INSERT, CREATE or EXPLAIN")),
        }
    }

    // -------------------------
    // Token helpers
    // -------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_nth_kind(&self, n: usize) -> &TokenKind {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.at(&TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> bool {
        self.consume(&TokenKind::Keyword(keyword))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), SyntaxError> {
        if self.consume(&kind) {
            Ok(())
        } else {
            Err(self.expected(&kind.to_string()))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), SyntaxError> {
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            Err(self.expected(&format!("keyword {keyword}")))
        }
    }

    /// Builds an error describing the current token.
    fn expected(&self, what: &str) -> SyntaxError {
        let token = self.peek();
        SyntaxError::new(self.input, token.position, what, token.kind.to_string())
    }

    fn parse_identifier(&mut self) -> Result<String, SyntaxError> {
        match self.peek_kind() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.expected("identifier")),
        }
    }

    fn parse_object_name(&mut self) -> Result<ObjectName, SyntaxError> {
        let mut parts = vec![self.parse_identifier()?];
        while self.at(&TokenKind::Dot) && matches!(self.peek_nth_kind(1), TokenKind::Ident(_)) {
            self.advance();
            parts.push(self.parse_identifier()?);
        }
        Ok(ObjectName(parts))
    }

    fn parse_unsigned_integer(&mut self, what: &str) -> Result<u64, SyntaxError> {
        if let TokenKind::Integer(text) = self.peek_kind() {
            if let Ok(value) = text.parse::<u64>() {
                self.advance();
                return Ok(value);
            }
        }
        Err(self.expected(what))
    }

    fn parse_comma_separated<T>(
        &mut self,
        mut f: impl FnMut(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<Vec<T>, SyntaxError> {
        let mut items = vec![f(self)?];
        while self.consume(&TokenKind::Comma) {
            items.push(f(self)?);
        }
        Ok(items)
    }

    // -------------------------
    // SELECT
    // -------------------------

    fn parse_select(&mut self) -> Result<Select, SyntaxError> {
        self.expect_keyword(Keyword::Select)?;
        let projection = self.parse_comma_separated(Self::parse_select_item)?;
        self.expect_keyword(Keyword::From)?;
        let from = self.parse_comma_separated(Self::parse_table_with_joins)?;

        let selection = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let group_by = if self.consume_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            self.parse_comma_separated(Self::parse_expr)?
        } else {
            Vec::new()
        };

        let having = if self.consume_keyword(Keyword::Having) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let order_by = if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            self.parse_comma_separated(Self::parse_order_by_item)?
        } else {
            Vec::new()
        };

        let limit = if self.consume_keyword(Keyword::Limit) {
            Some(self.parse_unsigned_integer("row count after LIMIT")?)
        } else {
            None
        };
        let offset = if self.consume_keyword(Keyword::Offset) {
            Some(self.parse_unsigned_integer("row count after OFFSET")?)
        } else {
            None
        };

        Ok(Select {
            projection,
            from,
            selection,
            group_by,
            having,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, SyntaxError> {
        if self.consume(&TokenKind::Star) {
            return Ok(SelectItem::Wildcard);
        }
        if let Some(len) = self.qualified_wildcard_len() {
            let mut parts = Vec::new();
            for _ in 0..len {
                parts.push(self.parse_identifier()?);
                self.expect(TokenKind::Dot)?;
            }
            self.expect(TokenKind::Star)?;
            return Ok(SelectItem::QualifiedWildcard(ObjectName(parts)));
        }
        let expr = self.parse_expr()?;
        let alias = self.parse_optional_alias()?;
        Ok(SelectItem::Expr { expr, alias })
    }

    /// Looks ahead for `ident (. ident)* . *` and returns the number of identifiers.
    fn qualified_wildcard_len(&self) -> Option<usize> {
        let mut n = 0;
        loop {
            if !matches!(self.peek_nth_kind(2 * n), TokenKind::Ident(_)) {
                return None;
            }
            if self.peek_nth_kind(2 * n + 1) != &TokenKind::Dot {
                return None;
            }
            n += 1;
            if self.peek_nth_kind(2 * n) == &TokenKind::Star {
                return Some(n);
            }
        }
    }

    fn parse_optional_alias(&mut self) -> Result<Option<String>, SyntaxError> {
        if self.consume_keyword(Keyword::As) {
            return Ok(Some(self.parse_identifier()?));
        }
        if let TokenKind::Ident(name) = self.peek_kind() {
            let name = name.clone();
            self.advance();
            return Ok(Some(name));
        }
        Ok(None)
    }

    fn parse_table_ref(&mut self) -> Result<TableRef, SyntaxError> {
        let name = self.parse_object_name()?;
        let alias = self.parse_optional_alias()?;
        Ok(TableRef { name, alias })
    }

    fn parse_table_with_joins(&mut self) -> Result<TableWithJoins, SyntaxError> {
        let relation = self.parse_table_ref()?;
        let mut joins = Vec::new();
        loop {
            if self.consume_keyword(Keyword::Inner) {
                self.expect_keyword(Keyword::Join)?;
            } else if !self.consume_keyword(Keyword::Join) {
                break;
            }
            let relation = self.parse_table_ref()?;
            self.expect_keyword(Keyword::On)?;
            let on = self.parse_expr()?;
            joins.push(Join { relation, on });
        }
        Ok(TableWithJoins { relation, joins })
    }

    fn parse_order_by_item(&mut self) -> Result<OrderByItem, SyntaxError> {
        let expr = self.parse_expr()?;
        let ascending = if self.consume_keyword(Keyword::Desc) {
            false
        } else {
            self.consume_keyword(Keyword::Asc);
            true
        };
        Ok(OrderByItem { expr, ascending })
    }

    // -------------------------
    // INSERT / CREATE TABLE
    // -------------------------

    fn parse_insert(&mut self) -> Result<Insert, SyntaxError> {
        self.expect_keyword(Keyword::Insert)?;
        self.expect_keyword(Keyword::Into)?;
        let table = self.parse_object_name()?;
        let columns = if self.consume(&TokenKind::LParen) {
            let columns = self.parse_comma_separated(Self::parse_identifier)?;
            self.expect(TokenKind::RParen)?;
            columns
        } else {
            Vec::new()
        };
        self.expect_keyword(Keyword::Values)?;
        let rows = self.parse_comma_separated(|p| {
            p.expect(TokenKind::LParen)?;
            let row = p.parse_comma_separated(Self::parse_expr)?;
            p.expect(TokenKind::RParen)?;
            Ok(row)
        })?;
        Ok(Insert {
            table,
            columns,
            rows,
        })
    }

    fn parse_create_table(&mut self) -> Result<CreateTable, SyntaxError> {
        self.expect_keyword(Keyword::Create)?;
        self.expect_keyword(Keyword::Table)?;
        let if_not_exists = if self.consume_keyword(Keyword::If) {
            self.expect_keyword(Keyword::Not)?;
            self.expect_keyword(Keyword::Exists)?;
            true
        } else {
            false
        };
        let name = self.parse_object_name()?;
        self.expect(TokenKind::LParen)?;
        let columns = self.parse_comma_separated(Self::parse_column_def)?;
        self.expect(TokenKind::RParen)?;
        Ok(CreateTable {
            name,
            if_not_exists,
            columns,
        })
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef, SyntaxError> {
        let name = self.parse_identifier()?;
        let data_type = self.parse_data_type()?;
        let nullable = if self.consume_keyword(Keyword::Not) {
            self.expect_keyword(Keyword::Null)?;
            false
        } else {
            self.consume_keyword(Keyword::Null);
            true
        };
        Ok(ColumnDef {
            name,
            data_type,
            nullable,
        })
    }

    fn parse_data_type(&mut self) -> Result<DataType, SyntaxError> {
        let TokenKind::Ident(name) = self.peek_kind() else {
            return Err(self.expected("data type"));
        };
        let data_type = match name.to_ascii_uppercase().as_str() {
            "INT" | "INTEGER" | "BIGINT" => DataType::Int64,
            "FLOAT" | "DOUBLE" | "REAL" => DataType::Float64,
            "BOOL" | "BOOLEAN" => DataType::Boolean,
            "TEXT" | "STRING" | "VARCHAR" | "CHAR" => DataType::Text,
            "DECIMAL" | "NUMERIC" => {
                self.advance();
                return self.parse_decimal_arguments();
            }
            _ => return Err(self.expected("data type")),
        };
        self.advance();
        if data_type == DataType::Float64
            && matches!(self.peek_kind(), TokenKind::Ident(w) if w.eq_ignore_ascii_case("PRECISION"))
        {
            self.advance();
        }
        if data_type == DataType::Text && self.consume(&TokenKind::LParen) {
            // Length limits are accepted and ignored.
            self.parse_unsigned_integer("length")?;
            self.expect(TokenKind::RParen)?;
        }
        Ok(data_type)
    }

    fn parse_decimal_arguments(&mut self) -> Result<DataType, SyntaxError> {
        let mut precision = MAX_DECIMAL_PRECISION as u64;
        let mut scale = 0;
        if self.consume(&TokenKind::LParen) {
            let at = self.peek().position;
            precision = self.parse_unsigned_integer("decimal precision")?;
            if self.consume(&TokenKind::Comma) {
                scale = self.parse_unsigned_integer("decimal scale")?;
            }
            self.expect(TokenKind::RParen)?;
            if precision == 0 || precision > MAX_DECIMAL_PRECISION as u64 || scale > precision {
                return Err(SyntaxError::new(
                    self.input,
                    at,
                    format!("decimal precision between 1 and {MAX_DECIMAL_PRECISION} with scale <= precision"),
                    format!("({precision}, {scale})"),
                ));
            }
        }
        Ok(DataType::Decimal {
            precision: precision as u8,
            scale: scale as u8,
        })
    }

    // -------------------------
    // Expressions
    // -------------------------

    pub fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.consume_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = binary(left, BinaryOperator::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_not()?;
        while self.consume_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = binary(left, BinaryOperator::And, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, SyntaxError> {
        if self.consume_keyword(Keyword::Not) {
            let expr = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn comparison_operator(&self) -> Option<BinaryOperator> {
        let op = match self.peek_kind() {
            TokenKind::Eq | TokenKind::Keyword(Keyword::Eq) => BinaryOperator::Eq,
            TokenKind::NotEq | TokenKind::Keyword(Keyword::Ne) => BinaryOperator::NotEq,
            TokenKind::Lt | TokenKind::Keyword(Keyword::Lt) => BinaryOperator::Lt,
            TokenKind::LtEq | TokenKind::Keyword(Keyword::Le) => BinaryOperator::LtEq,
            TokenKind::Gt | TokenKind::Keyword(Keyword::Gt) => BinaryOperator::Gt,
            TokenKind::GtEq | TokenKind::Keyword(Keyword::Ge) => BinaryOperator::GtEq,
            _ => return None,
        };
        Some(op)
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_additive()?;
        loop {
            if self.consume_keyword(Keyword::Is) {
                let negated = self.consume_keyword(Keyword::Not);
                self.expect_keyword(Keyword::Null)?;
                left = Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                };
            } else if self.at_keyword(Keyword::In)
                || (self.at_keyword(Keyword::Not)
                    && self.peek_nth_kind(1) == &TokenKind::Keyword(Keyword::In))
            {
                let negated = self.consume_keyword(Keyword::Not);
                self.expect_keyword(Keyword::In)?;
                left = self.parse_in_rhs(left, negated)?;
            } else if let Some(op) = self.comparison_operator() {
                self.advance();
                let right = self.parse_additive()?;
                left = binary(left, op, right);
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_in_rhs(&mut self, expr: Expr, negated: bool) -> Result<Expr, SyntaxError> {
        self.expect(TokenKind::LParen)?;
        if self.at_keyword(Keyword::Select) {
            let subquery = self.parse_select()?;
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::InSubquery {
                expr: Box::new(expr),
                subquery: Box::new(subquery),
                negated,
            });
        }
        let list = self.parse_comma_separated(Self::parse_expr)?;
        self.expect(TokenKind::RParen)?;
        Ok(Expr::InList {
            expr: Box::new(expr),
            list,
            negated,
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOperator::Plus,
                TokenKind::Minus => BinaryOperator::Minus,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOperator::Multiply,
                TokenKind::Slash => BinaryOperator::Divide,
                TokenKind::Percent => BinaryOperator::Modulo,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.consume(&TokenKind::Minus) {
            // Negative numeric literals are folded here so i64::MIN is representable.
            if let TokenKind::Integer(_) | TokenKind::Decimal(_) | TokenKind::Float(_) =
                self.peek_kind()
            {
                return self.parse_number(true);
            }
            let expr = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(expr),
            });
        }
        if self.consume(&TokenKind::Plus) {
            let expr = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Plus,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_number(&mut self, negative: bool) -> Result<Expr, SyntaxError> {
        let token = self.advance();
        let sign = if negative { "-" } else { "" };
        let value = match &token.kind {
            TokenKind::Integer(text) => match format!("{sign}{text}").parse::<i64>() {
                Ok(v) => Some(ScalarValue::Int64(v)),
                Err(_) => ScalarValue::parse_decimal(text).map(|v| negate(v, negative)),
            },
            TokenKind::Decimal(text) => match ScalarValue::parse_decimal(text) {
                Some(v) => Some(negate(v, negative)),
                None => format!("{sign}{text}").parse::<f64>().ok().map(ScalarValue::Float64),
            },
            TokenKind::Float(text) => format!("{sign}{text}")
                .parse::<f64>()
                .ok()
                .map(ScalarValue::Float64),
            _ => None,
        };
        value.map(Expr::Literal).ok_or_else(|| {
            SyntaxError::new(
                self.input,
                token.position,
                "numeric literal within range",
                token.kind.to_string(),
            )
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek_kind().clone() {
            TokenKind::Integer(_) | TokenKind::Decimal(_) | TokenKind::Float(_) => {
                self.parse_number(false)
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Literal(ScalarValue::Text(s)))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Literal(ScalarValue::Boolean(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Literal(ScalarValue::Boolean(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::Literal(ScalarValue::Null))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Nested(Box::new(expr)))
            }
            TokenKind::Ident(_) => {
                if self.peek_nth_kind(1) == &TokenKind::LParen {
                    return self.parse_function();
                }
                let mut parts = self.parse_object_name()?.0;
                let name = parts.pop().unwrap_or_default();
                let table = if parts.is_empty() {
                    None
                } else {
                    Some(ObjectName(parts))
                };
                Ok(Expr::Column { table, name })
            }
            _ => Err(self.expected("expression")),
        }
    }

    fn parse_function(&mut self) -> Result<Expr, SyntaxError> {
        let name = self.parse_identifier()?;
        self.expect(TokenKind::LParen)?;
        if self.consume(&TokenKind::Star) {
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::Function {
                name,
                args: Vec::new(),
                star: true,
            });
        }
        let args = if self.at(&TokenKind::RParen) {
            Vec::new()
        } else {
            self.parse_comma_separated(Self::parse_expr)?
        };
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Function {
            name,
            args,
            star: false,
        })
    }
}

fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn negate(value: ScalarValue, negative: bool) -> ScalarValue {
    match value {
        ScalarValue::Decimal {
            value,
            precision,
            scale,
        } if negative => ScalarValue::Decimal {
            value: -value,
            precision,
            scale,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_select(sql: &str) -> Select {
        match parse(sql).unwrap() {
            Statement::Select(select) => *select,
            other => panic!("expected SELECT, got {other:?}"),
        }
    }

    fn parse_expr(sql: &str) -> Expr {
        let mut parser = Parser::new(sql).unwrap();
        parser.parse_expr().unwrap()
    }

    fn col(name: &str) -> Expr {
        Expr::Column {
            table: None,
            name: name.to_string(),
        }
    }

    fn int(v: i64) -> Expr {
        Expr::Literal(ScalarValue::Int64(v))
    }

    #[test]
    fn test_simple_select() {
        let select = parse_select("SELECT * FROM foo");
        assert_eq!(select.projection, vec![SelectItem::Wildcard]);
        assert_eq!(select.from.len(), 1);
        assert_eq!(select.from[0].relation.name, ObjectName(vec!["foo".into()]));
        assert!(select.selection.is_none());
    }

    #[test]
    fn test_dotted_names_and_multiple_tables() {
        let select = parse_select("Select A, B, C from Sys.dual, Table2");
        assert_eq!(select.projection.len(), 3);
        assert_eq!(
            select.from[0].relation.name,
            ObjectName(vec!["Sys".into(), "dual".into()])
        );
        assert_eq!(select.from[1].relation.name, ObjectName(vec!["Table2".into()]));
    }

    #[test]
    fn test_full_select_clauses() {
        let select = parse_select(
            "SELECT a, COUNT(*) AS n FROM t WHERE b > 1 GROUP BY a HAVING COUNT(*) > 1 \
             ORDER BY n DESC, a LIMIT 10 OFFSET 5;",
        );
        assert_eq!(select.group_by, vec![col("a")]);
        assert!(select.having.is_some());
        assert_eq!(select.order_by.len(), 2);
        assert!(!select.order_by[0].ascending);
        assert!(select.order_by[1].ascending);
        assert_eq!(select.limit, Some(10));
        assert_eq!(select.offset, Some(5));
        assert_eq!(
            select.projection[1],
            SelectItem::Expr {
                expr: Expr::Function {
                    name: "COUNT".into(),
                    args: vec![],
                    star: true
                },
                alias: Some("n".into())
            }
        );
    }

    #[test]
    fn test_joins_and_qualified_wildcard() {
        let select = parse_select("SELECT t.*, u.x FROM t JOIN u ON t.id = u.id INNER JOIN v ON v.k = u.k");
        assert_eq!(
            select.projection[0],
            SelectItem::QualifiedWildcard(ObjectName(vec!["t".into()]))
        );
        assert_eq!(select.from[0].joins.len(), 2);
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        assert_eq!(
            parse_expr("1 + 2 * 3"),
            binary(int(1), BinaryOperator::Plus, binary(int(2), BinaryOperator::Multiply, int(3)))
        );
        // a OR b AND c parses as a OR (b AND c)
        assert_eq!(
            parse_expr("a OR b AND c"),
            binary(col("a"), BinaryOperator::Or, binary(col("b"), BinaryOperator::And, col("c")))
        );
        // subtraction is left-associative
        assert_eq!(
            parse_expr("a - b - c"),
            binary(binary(col("a"), BinaryOperator::Minus, col("b")), BinaryOperator::Minus, col("c"))
        );
        // NOT binds looser than comparison
        assert_eq!(
            parse_expr("NOT a = 1"),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(binary(col("a"), BinaryOperator::Eq, int(1)))
            }
        );
    }

    #[test]
    fn test_word_comparison_operators() {
        assert_eq!(
            parse_expr("table1.id eq table2.id"),
            binary(
                Expr::Column {
                    table: Some(ObjectName(vec!["table1".into()])),
                    name: "id".into()
                },
                BinaryOperator::Eq,
                Expr::Column {
                    table: Some(ObjectName(vec!["table2".into()])),
                    name: "id".into()
                }
            )
        );
        assert_eq!(parse_expr("a ge 3"), binary(col("a"), BinaryOperator::GtEq, int(3)));
    }

    #[test]
    fn test_in_and_is_null() {
        let expr = parse_expr("a in ('RED','GREEN') and b not in (10,20) and c is not null");
        let Expr::BinaryOp { left, op, right } = expr else {
            panic!("expected AND")
        };
        assert_eq!(op, BinaryOperator::And);
        assert_eq!(
            *right,
            Expr::IsNull {
                expr: Box::new(col("c")),
                negated: true
            }
        );
        let Expr::BinaryOp { left, right, .. } = *left else {
            panic!("expected AND")
        };
        assert!(matches!(*left, Expr::InList { negated: false, .. }));
        assert!(matches!(*right, Expr::InList { negated: true, .. }));

        let expr = parse_expr("a IN (SELECT b FROM u)");
        assert!(matches!(expr, Expr::InSubquery { negated: false, .. }));
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_expr("-9223372036854775808"), int(i64::MIN));
        assert_eq!(
            parse_expr("12.50"),
            Expr::Literal(ScalarValue::Decimal {
                value: 1250,
                precision: 4,
                scale: 2
            })
        );
        assert_eq!(parse_expr("1e3"), Expr::Literal(ScalarValue::Float64(1000.0)));
        assert_eq!(
            parse_expr("'it''s'"),
            Expr::Literal(ScalarValue::Text("it's".into()))
        );
        assert_eq!(parse_expr("NULL"), Expr::Literal(ScalarValue::Null));
        assert_eq!(
            parse_expr("- a"),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(col("a"))
            }
        );
    }

    #[test]
    fn test_insert() {
        let stmt = parse("INSERT INTO t (a, b) VALUES (1, 'x'), (2, NULL)").unwrap();
        let Statement::Insert(insert) = stmt else {
            panic!("expected INSERT")
        };
        assert_eq!(insert.columns, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(insert.rows.len(), 2);
        assert_eq!(insert.rows[1][1], Expr::Literal(ScalarValue::Null));
    }

    #[test]
    fn test_create_table() {
        let stmt = parse(
            "CREATE TABLE IF NOT EXISTS t (a INT NOT NULL, b VARCHAR(20), c DECIMAL(10, 2), d DOUBLE PRECISION, e BOOLEAN NULL)",
        )
        .unwrap();
        let Statement::CreateTable(create) = stmt else {
            panic!("expected CREATE TABLE")
        };
        assert!(create.if_not_exists);
        let types: Vec<DataType> = create.columns.iter().map(|c| c.data_type).collect();
        assert_eq!(
            types,
            vec![
                DataType::Int64,
                DataType::Text,
                DataType::Decimal {
                    precision: 10,
                    scale: 2
                },
                DataType::Float64,
                DataType::Boolean,
            ]
        );
        assert!(!create.columns[0].nullable);
        assert!(create.columns[4].nullable);
    }

    #[test]
    fn test_explain() {
        let stmt = parse("EXPLAIN SELECT a FROM t").unwrap();
        assert!(matches!(stmt, Statement::Explain(inner) if matches!(*inner, Statement::Select(_))));
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse("Xelect A, B, C from Sys.dual").unwrap_err();
        assert_eq!(err.position, 0);

        // `frox` is read as an alias for C, so the parser then misses FROM.
        let err = parse("Select A, B, C frox Sys.dual").unwrap_err();
        assert_eq!(err.expected, "keyword FROM");
        assert_eq!(err.found, "identifier Sys");

        let err = parse("Select").unwrap_err();
        assert_eq!(err.expected, "expression");
        assert_eq!(err.found, "end of input");
        assert_eq!(err.position, 6);

        let err = parse("Select * from").unwrap_err();
        assert_eq!(err.expected, "identifier");

        assert!(parse("SELECT a FROM t WHERE").is_err());
        assert!(parse("CREATE TABLE t (a DECIMAL(40, 2))").is_err());
        assert!(parse("SELECT (SELECT 1 FROM t) FROM t").is_err());
    }

    #[test]
    fn test_whitespace_and_comments_are_insignificant() {
        let a = parse("SELECT a FROM t WHERE a > 1").unwrap();
        let b = parse("select  a\n  from t -- trailing\n where /* c */ a > 1").unwrap();
        assert_eq!(a, b);
    }
}
