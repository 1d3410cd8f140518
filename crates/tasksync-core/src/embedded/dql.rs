//! Statement language for the embedded store
//!
//! Supported statements:
//!
//! ```text
//! SELECT * FROM <collection> [WHERE <expr>] [ORDER BY <field> [ASC|DESC], ...] [LIMIT <n>]
//! INSERT INTO <collection> DOCUMENTS (<operand>) [, (<operand>) ...]
//! UPDATE <collection> SET <field> = <operand> [, ...] [WHERE <expr>]
//! ```
//!
//! Expressions combine comparisons (`=`, `==`, `!=`, `<>`, `<`, `<=`, `>`,
//! `>=`), `LIKE` patterns (`%` and `_`), `NOT`, `AND`, `OR` and parentheses.
//! A bare operand is true only if it is the boolean `true`. Operands are
//! field names, `:params`, quoted strings, numbers, `true`, `false` and
//! `null`. Keywords are case-insensitive.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use crate::error::StoreError;
use crate::query::Params;

type Document = Map<String, Value>;

/// A parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
}

/// `SELECT * FROM ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub collection: String,
    filter: Option<Expr>,
    order_by: Vec<OrderTerm>,
    limit: Option<Operand>,
}

/// `INSERT INTO ... DOCUMENTS ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub collection: String,
    documents: Vec<Operand>,
}

/// `UPDATE ... SET ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub collection: String,
    assignments: Vec<(String, Operand)>,
    filter: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
struct OrderTerm {
    field: String,
    descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Field(String),
    Param(String),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare(Operand, CmpOp, Operand),
    Like(Operand, Operand),
    Truthy(Operand),
}

/// Parse a statement
pub fn parse(input: &str) -> Result<Statement, StoreError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.statement()
}

/// Parse a statement that must be a select
pub fn parse_select(input: &str) -> Result<Select, StoreError> {
    match parse(input)? {
        Statement::Select(select) => Ok(select),
        _ => Err(query_error("only SELECT statements can be observed or subscribed")),
    }
}

fn query_error(message: impl Into<String>) -> StoreError {
    StoreError::Query(message.into())
}

// ==================== Evaluation ====================

impl Select {
    /// Filter, sort and limit a collection's documents
    pub fn apply(&self, documents: Vec<Document>, params: &Params) -> Result<Vec<Document>, StoreError> {
        let mut rows = Vec::with_capacity(documents.len());
        for document in documents {
            if matches_filter(self.filter.as_ref(), &document, params)? {
                rows.push(document);
            }
        }

        if !self.order_by.is_empty() {
            rows.sort_by(|a, b| {
                for term in &self.order_by {
                    let left = a.get(&term.field).unwrap_or(&Value::Null);
                    let right = b.get(&term.field).unwrap_or(&Value::Null);
                    let ordering = total_order(left, right);
                    let ordering = if term.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(ref limit) = self.limit {
            let limit = match limit.resolve(None, params)? {
                Value::Number(n) => n.as_u64(),
                _ => None,
            }
            .ok_or_else(|| query_error("LIMIT must be a non-negative integer"))?;
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        Ok(rows)
    }
}

impl Insert {
    /// Resolve the documents to insert
    pub fn documents(&self, params: &Params) -> Result<Vec<Document>, StoreError> {
        self.documents
            .iter()
            .map(|operand| match operand.resolve(None, params)? {
                Value::Object(map) => Ok(map),
                other => Err(StoreError::InvalidDocument(format!(
                    "INSERT expects an object, got {}",
                    other
                ))),
            })
            .collect()
    }
}

impl Update {
    /// Whether the update applies to a document
    pub fn matches(&self, document: &Document, params: &Params) -> Result<bool, StoreError> {
        matches_filter(self.filter.as_ref(), document, params)
    }

    /// Field values to write to a matched document
    pub fn assignments_for(&self, document: &Document, params: &Params) -> Result<Document, StoreError> {
        let mut fields = Document::new();
        for (field, operand) in &self.assignments {
            fields.insert(field.clone(), operand.resolve(Some(document), params)?);
        }
        Ok(fields)
    }
}

fn matches_filter(filter: Option<&Expr>, document: &Document, params: &Params) -> Result<bool, StoreError> {
    match filter {
        Some(expr) => expr.matches(document, params),
        None => Ok(true),
    }
}

impl Operand {
    fn resolve(&self, document: Option<&Document>, params: &Params) -> Result<Value, StoreError> {
        match self {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Param(name) => params
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::MissingParameter(name.clone())),
            Operand::Field(name) => match document {
                Some(document) => Ok(document.get(name).cloned().unwrap_or(Value::Null)),
                None => Err(query_error(format!(
                    "field reference '{}' is not allowed here",
                    name
                ))),
            },
        }
    }
}

impl Expr {
    fn matches(&self, document: &Document, params: &Params) -> Result<bool, StoreError> {
        match self {
            Expr::Or(left, right) => {
                Ok(left.matches(document, params)? || right.matches(document, params)?)
            }
            Expr::And(left, right) => {
                Ok(left.matches(document, params)? && right.matches(document, params)?)
            }
            Expr::Not(inner) => Ok(!inner.matches(document, params)?),
            Expr::Compare(left, op, right) => {
                let left = left.resolve(Some(document), params)?;
                let right = right.resolve(Some(document), params)?;
                Ok(compare(*op, &left, &right))
            }
            Expr::Like(value, pattern) => {
                let value = value.resolve(Some(document), params)?;
                let pattern = pattern.resolve(Some(document), params)?;
                Ok(match (value, pattern) {
                    (Value::String(text), Value::String(pattern)) => like(&text, &pattern),
                    _ => false,
                })
            }
            Expr::Truthy(operand) => Ok(operand.resolve(Some(document), params)? == Value::Bool(true)),
        }
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::Ne => !values_equal(left, right),
        _ => match partial_order(left, right) {
            Some(ordering) => match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Le => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                CmpOp::Ge => ordering != Ordering::Less,
                CmpOp::Eq | CmpOp::Ne => false,
            },
            None => false,
        },
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn partial_order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Ordering used by ORDER BY: values of different types sort by type
fn total_order(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    rank(left)
        .cmp(&rank(right))
        .then_with(|| partial_order(left, right).unwrap_or(Ordering::Equal))
}

/// `%` matches any run of characters, `_` exactly one
///
/// Iterative, backtracking only to the most recent `%`, so the cost stays
/// proportional to text length times pattern length.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    // Pattern position after the last `%`, and where in the text it resumes
    let mut resume: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p).copied() {
            Some('%') => {
                p += 1;
                resume = Some((p, t));
            }
            Some('_') => {
                t += 1;
                p += 1;
            }
            Some(c) if c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match resume {
                Some((after, start)) => {
                    p = after;
                    t = start + 1;
                    resume = Some((after, start + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}

// ==================== Tokenizer ====================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Param(String),
    Str(String),
    Number(Number),
    Op(CmpOp),
    Star,
    Comma,
    LParen,
    RParen,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn tokenize(input: &str) -> Result<Vec<Token>, StoreError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            c if c.is_whitespace() => i += 1,
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '<' => match next {
                Some('=') => {
                    tokens.push(Token::Op(CmpOp::Le));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op(CmpOp::Ne));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(CmpOp::Lt));
                    i += 1;
                }
            },
            '>' => {
                if next == Some('=') {
                    tokens.push(Token::Op(CmpOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                    i += 1;
                }
            }
            ':' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                if end == start {
                    return Err(query_error("expected a parameter name after ':'"));
                }
                tokens.push(Token::Param(chars[start..end].iter().collect()));
                i = end;
            }
            '\'' => {
                let mut value = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(query_error("unterminated string literal")),
                        Some('\'') if chars.get(j + 1) == Some(&'\'') => {
                            value.push('\'');
                            j += 2;
                        }
                        Some('\'') => break,
                        Some(&ch) => {
                            value.push(ch);
                            j += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
                i = j + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                let mut end = i + 1;
                while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                    end += 1;
                }
                let text: String = chars[start..end].iter().collect();
                let number = if text.contains('.') {
                    text.parse::<f64>().ok().and_then(Number::from_f64)
                } else {
                    text.parse::<i64>().ok().map(Number::from)
                }
                .ok_or_else(|| query_error(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(number));
                i = end;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                let mut end = i;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                tokens.push(Token::Ident(chars[start..end].iter().collect()));
                i = end;
            }
            other => return Err(query_error(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

// ==================== Parser ====================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), StoreError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, expected: &str) -> Result<(), StoreError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> StoreError {
        match self.peek() {
            Some(token) => query_error(format!("expected {}, found {:?}", expected, token)),
            None => query_error(format!("expected {}, found end of statement", expected)),
        }
    }

    fn identifier(&mut self, expected: &str) -> Result<String, StoreError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn statement(&mut self) -> Result<Statement, StoreError> {
        let statement = if self.eat_keyword("SELECT") {
            Statement::Select(self.select()?)
        } else if self.eat_keyword("INSERT") {
            Statement::Insert(self.insert()?)
        } else if self.eat_keyword("UPDATE") {
            Statement::Update(self.update()?)
        } else {
            return Err(self.unexpected("SELECT, INSERT or UPDATE"));
        };

        if let Some(token) = self.peek() {
            return Err(query_error(format!("unexpected trailing input {:?}", token)));
        }
        Ok(statement)
    }

    fn select(&mut self) -> Result<Select, StoreError> {
        self.expect(&Token::Star, "'*'")?;
        self.expect_keyword("FROM")?;
        let collection = self.identifier("collection name")?;

        let filter = if self.eat_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let field = self.identifier("field name")?;
                let descending = if self.eat_keyword("DESC") {
                    true
                } else {
                    self.eat_keyword("ASC");
                    false
                };
                order_by.push(OrderTerm { field, descending });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        let limit = if self.eat_keyword("LIMIT") {
            Some(self.operand()?)
        } else {
            None
        };

        Ok(Select {
            collection,
            filter,
            order_by,
            limit,
        })
    }

    fn insert(&mut self) -> Result<Insert, StoreError> {
        self.expect_keyword("INTO")?;
        let collection = self.identifier("collection name")?;
        self.expect_keyword("DOCUMENTS")?;

        let mut documents = Vec::new();
        loop {
            self.expect(&Token::LParen, "'('")?;
            documents.push(self.operand()?);
            self.expect(&Token::RParen, "')'")?;
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        Ok(Insert {
            collection,
            documents,
        })
    }

    fn update(&mut self) -> Result<Update, StoreError> {
        let collection = self.identifier("collection name")?;
        self.expect_keyword("SET")?;

        let mut assignments = Vec::new();
        loop {
            let field = self.identifier("field name")?;
            if field == "_id" {
                return Err(query_error("the _id field cannot be updated"));
            }
            self.expect(&Token::Op(CmpOp::Eq), "'='")?;
            assignments.push((field, self.operand()?));
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        let filter = if self.eat_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(Update {
            collection,
            assignments,
            filter,
        })
    }

    fn expr(&mut self) -> Result<Expr, StoreError> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("OR") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, StoreError> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("AND") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, StoreError> {
        if self.eat_keyword("NOT") {
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, StoreError> {
        if self.eat(&Token::LParen) {
            let expr = self.expr()?;
            self.expect(&Token::RParen, "')'")?;
            return Ok(expr);
        }

        let left = self.operand()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.operand()?;
            return Ok(Expr::Compare(left, op, right));
        }
        if self.eat_keyword("LIKE") {
            let pattern = self.operand()?;
            return Ok(Expr::Like(left, pattern));
        }
        Ok(Expr::Truthy(left))
    }

    fn operand(&mut self) -> Result<Operand, StoreError> {
        match self.advance() {
            Some(Token::Param(name)) => Ok(Operand::Param(name)),
            Some(Token::Str(value)) => Ok(Operand::Literal(Value::String(value))),
            Some(Token::Number(value)) => Ok(Operand::Literal(Value::Number(value))),
            Some(Token::Ident(word)) => Ok(if word.eq_ignore_ascii_case("true") {
                Operand::Literal(Value::Bool(true))
            } else if word.eq_ignore_ascii_case("false") {
                Operand::Literal(Value::Bool(false))
            } else if word.eq_ignore_ascii_case("null") {
                Operand::Literal(Value::Null)
            } else {
                Operand::Field(word)
            }),
            Some(token) => Err(query_error(format!("expected a value, found {:?}", token))),
            None => Err(query_error("expected a value, found end of statement")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn tasks() -> Vec<Document> {
        vec![
            doc(json!({"_id": "c", "title": "Walk dog", "done": false, "deleted": false})),
            doc(json!({"_id": "a", "title": "Buy milk", "done": true, "deleted": false})),
            doc(json!({"_id": "b", "title": "Buy eggs", "done": false, "deleted": true})),
        ]
    }

    fn ids(rows: &[Document]) -> Vec<&str> {
        rows.iter().map(|r| r["_id"].as_str().unwrap()).collect()
    }

    fn params(value: Value) -> Params {
        doc(value)
    }

    #[test]
    fn test_select_all() {
        let select = parse_select("SELECT * FROM tasks").unwrap();
        assert_eq!(select.collection, "tasks");
        assert_eq!(select.apply(tasks(), &Params::new()).unwrap().len(), 3);
    }

    #[test]
    fn test_select_filter_and_order() {
        let select =
            parse_select("SELECT * FROM tasks WHERE deleted = false ORDER BY _id").unwrap();
        let rows = select.apply(tasks(), &Params::new()).unwrap();
        assert_eq!(ids(&rows), vec!["a", "c"]);
    }

    #[test]
    fn test_not_truthy_field() {
        let select = parse_select("select * from tasks where not deleted order by _id desc").unwrap();
        let rows = select.apply(tasks(), &Params::new()).unwrap();
        assert_eq!(ids(&rows), vec!["c", "a"]);
    }

    #[test]
    fn test_missing_field_is_null() {
        let select = parse_select("SELECT * FROM tasks WHERE NOT deleted").unwrap();
        let rows = select
            .apply(vec![doc(json!({"_id": "x"}))], &Params::new())
            .unwrap();
        assert_eq!(rows.len(), 1);

        let select = parse_select("SELECT * FROM tasks WHERE deleted = false").unwrap();
        let rows = select
            .apply(vec![doc(json!({"_id": "x"}))], &Params::new())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_param_binding() {
        let select = parse_select("SELECT * FROM sync WHERE _id = :id").unwrap();
        let rows = select
            .apply(tasks(), &params(json!({"id": "b"})))
            .unwrap();
        assert_eq!(ids(&rows), vec!["b"]);
    }

    #[test]
    fn test_missing_param() {
        let select = parse_select("SELECT * FROM tasks WHERE _id = :id").unwrap();
        let err = select.apply(tasks(), &Params::new()).unwrap_err();
        assert!(matches!(err, StoreError::MissingParameter(name) if name == "id"));
    }

    #[test]
    fn test_like_prefix() {
        let select = parse_select(
            "SELECT * FROM tasks WHERE title LIKE :pattern AND deleted = false ORDER BY _id",
        )
        .unwrap();
        let rows = select
            .apply(tasks(), &params(json!({"pattern": "Buy%"})))
            .unwrap();
        assert_eq!(ids(&rows), vec!["a"]);
    }

    #[test]
    fn test_like_patterns() {
        assert!(like("Buy milk", "Buy%"));
        assert!(like("Buy milk", "%milk"));
        assert!(like("Buy milk", "B_y%"));
        assert!(like("", "%"));
        assert!(!like("Buy milk", "buy%"));
        assert!(!like("Buy", "Buy_"));
        assert!(like("abcbcd", "a%bcd"));
        assert!(like("Buy milk", "%%m_l%"));
        assert!(!like("Buy milk", "%x%"));
    }

    #[test]
    fn test_like_long_wildcard_patterns() {
        let text = "a".repeat(20_000);
        let pattern = format!("{}b", "%a".repeat(200));
        assert!(!like(&text, &pattern));

        let pattern = format!("{}%", "%a".repeat(200));
        assert!(like(&text, &pattern));
        assert!(like(&text, &"_".repeat(20_000)));
    }

    #[test]
    fn test_or_and_precedence() {
        let select = parse_select(
            "SELECT * FROM tasks WHERE _id = 'a' OR _id = 'b' AND deleted = false ORDER BY _id",
        )
        .unwrap();
        let rows = select.apply(tasks(), &Params::new()).unwrap();
        assert_eq!(ids(&rows), vec!["a"]);

        let select = parse_select(
            "SELECT * FROM tasks WHERE (_id = 'a' OR _id = 'b') AND done != true",
        )
        .unwrap();
        let rows = select.apply(tasks(), &Params::new()).unwrap();
        assert_eq!(ids(&rows), vec!["b"]);
    }

    #[test]
    fn test_numeric_comparisons_and_limit() {
        let rows: Vec<Document> = (1..=5)
            .map(|n| doc(json!({"_id": format!("n{}", n), "n": n})))
            .collect();

        let select = parse_select("SELECT * FROM nums WHERE n >= 2 ORDER BY n DESC LIMIT 2").unwrap();
        let result = select.apply(rows.clone(), &Params::new()).unwrap();
        assert_eq!(ids(&result), vec!["n5", "n4"]);

        let select = parse_select("SELECT * FROM nums WHERE n < 2.5 LIMIT :max").unwrap();
        let result = select
            .apply(rows, &params(json!({"max": 10})))
            .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_order_mixed_types() {
        let rows = vec![
            doc(json!({"_id": "s", "v": "x"})),
            doc(json!({"_id": "n", "v": 1})),
            doc(json!({"_id": "missing"})),
            doc(json!({"_id": "b", "v": true})),
        ];
        let select = parse_select("SELECT * FROM t ORDER BY v").unwrap();
        let result = select.apply(rows, &Params::new()).unwrap();
        assert_eq!(ids(&result), vec!["missing", "b", "n", "s"]);
    }

    #[test]
    fn test_insert_documents() {
        let statement = parse("INSERT INTO tasks DOCUMENTS (:task), (:other)").unwrap();
        let Statement::Insert(insert) = statement else {
            panic!("expected insert");
        };
        assert_eq!(insert.collection, "tasks");

        let docs = insert
            .documents(&params(json!({"task": {"_id": "a"}, "other": {"_id": "b"}})))
            .unwrap();
        assert_eq!(docs.len(), 2);

        let err = insert
            .documents(&params(json!({"task": 1, "other": {}})))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument(_)));
    }

    #[test]
    fn test_update_assignments() {
        let statement =
            parse("UPDATE tasks SET title = :title, done = true WHERE _id = :id").unwrap();
        let Statement::Update(update) = statement else {
            panic!("expected update");
        };

        let p = params(json!({"title": "Renamed", "id": "a"}));
        let rows = tasks();
        let matched: Vec<_> = rows
            .iter()
            .filter(|r| update.matches(r, &p).unwrap())
            .collect();
        assert_eq!(matched.len(), 1);

        let fields = update.assignments_for(matched[0], &p).unwrap();
        assert_eq!(fields["title"], json!("Renamed"));
        assert_eq!(fields["done"], json!(true));
    }

    #[test]
    fn test_string_escapes() {
        let select = parse_select("SELECT * FROM t WHERE title = 'it''s'").unwrap();
        let rows = select
            .apply(vec![doc(json!({"_id": "q", "title": "it's"}))], &Params::new())
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_syntax_errors() {
        for bad in [
            "",
            "DELETE FROM tasks",
            "SELECT title FROM tasks",
            "SELECT * FROM",
            "SELECT * FROM tasks WHERE",
            "SELECT * FROM tasks WHERE title = 'open",
            "SELECT * FROM tasks ORDER _id",
            "SELECT * FROM tasks extra",
            "UPDATE tasks SET _id = 'x'",
            "INSERT INTO tasks DOCUMENTS :task",
            "SELECT * FROM tasks WHERE a = :",
            "SELECT * FROM tasks WHERE a # b",
        ] {
            assert!(
                matches!(parse(bad), Err(StoreError::Query(_))),
                "expected syntax error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_parse_select_rejects_mutations() {
        assert!(parse_select("UPDATE tasks SET done = true").is_err());
    }
}
