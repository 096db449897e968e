//! Token types for the SQL lexer

use phf::phf_map;

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "select" => TokenType::Select,
    "from" => TokenType::From,
    "where" => TokenType::Where,
    "insert" => TokenType::Insert,
    "into" => TokenType::Into,
    "values" => TokenType::Values,
    "create" => TokenType::Create,
    "table" => TokenType::Table,
    "drop" => TokenType::Drop,
    "and" => TokenType::And,
    "or" => TokenType::Or,
    "not" => TokenType::Not,
    "like" => TokenType::Like,
    "in" => TokenType::In,
    "is" => TokenType::Is,
    "null" => TokenType::Null,
    "as" => TokenType::As,
    "order" => TokenType::Order,
    "by" => TokenType::By,
    "asc" => TokenType::Asc,
    "desc" => TokenType::Desc,
    "limit" => TokenType::Limit,
    "offset" => TokenType::Offset,
    "distinct" => TokenType::Distinct,
    "group" => TokenType::Group,
    "having" => TokenType::Having,
    "join" => TokenType::Join,
    "left" => TokenType::Left,
    "inner" => TokenType::Inner,
    "cross" => TokenType::Cross,
    "outer" => TokenType::Outer,
    "on" => TokenType::On,
    "case" => TokenType::Case,
    "when" => TokenType::When,
    "then" => TokenType::Then,
    "else" => TokenType::Else,
    "end" => TokenType::End,
    "default" => TokenType::Default,
    "start" => TokenType::Start,
    "transaction" => TokenType::Transaction,
    "begin" => TokenType::Begin,
    "commit" => TokenType::Commit,
    "rollback" => TokenType::Rollback,
    "tinyint" => TokenType::TinyInt,
    "smallint" => TokenType::SmallInt,
    "int" => TokenType::Int,
    "integer" => TokenType::Int,
    "bigint" => TokenType::BigInt,
    "varchar" => TokenType::Varchar,
    "datetime" => TokenType::Datetime,
    "unsigned" => TokenType::Unsigned,
    "auto_increment" => TokenType::AutoIncrement,
    "true" => TokenType::True,
    "false" => TokenType::False,
};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Keywords
    Select,
    From,
    Where,
    Insert,
    Into,
    Values,
    Create,
    Table,
    Drop,
    And,
    Or,
    Not,
    Like,
    In,
    Is,
    Null,
    As,
    Order,
    By,
    Asc,
    Desc,
    Limit,
    Offset,
    Distinct,
    Group,
    Having,
    Join,
    Left,
    Inner,
    Cross,
    Outer,
    On,
    Case,
    When,
    Then,
    Else,
    End,
    Default,
    Start,
    Transaction,
    Begin,
    Commit,
    Rollback,

    // Data types and column attributes
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Varchar,
    Datetime,
    Unsigned,
    AutoIncrement,

    // Operators
    Eq,    // =
    Ne,    // != or <>
    Lt,    // <
    Gt,    // >
    Le,    // <=
    Ge,    // >=
    Plus,  // +
    Minus, // -
    Star,  // *
    Slash, // /

    // Delimiters
    LParen,      // (
    RParen,      // )
    Comma,       // ,
    Semicolon,   // ;
    Dot,         // .
    Placeholder, // ?

    // Literals
    Number(f64),
    String(String),
    Identifier(String),
    True,
    False,

    // Special
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(token_type: TokenType, line: usize, column: usize) -> Self {
        Self {
            token_type,
            line,
            column,
        }
    }
}

impl TokenType {
    /// Case-insensitive keyword lookup.
    pub fn from_keyword(s: &str) -> Option<Self> {
        let lowercase = s.to_lowercase();
        KEYWORDS.get(lowercase.as_str()).cloned()
    }
}
