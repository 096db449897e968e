//! SQL lexer - converts SQL text into tokens

use super::token::{Token, TokenType};
use crate::error::{EngineError, Result};

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.token_type, TokenType::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        let line = self.line;
        let column = self.column;

        if self.is_eof() {
            return Ok(Token::new(TokenType::Eof, line, column));
        }

        let ch = self.current_char();

        if ch == '-' && self.peek_char() == Some('-') {
            self.skip_line_comment();
            return self.next_token();
        }

        if ch == '/' && self.peek_char() == Some('*') {
            self.skip_block_comment()?;
            return self.next_token();
        }

        let token_type = match ch {
            '\'' | '"' => self.read_string(ch)?,
            '`' => self.read_quoted_identifier()?,
            '0'..='9' => self.read_number()?,
            'a'..='z' | 'A'..='Z' | '_' => self.read_identifier(),
            '=' => {
                self.advance();
                TokenType::Eq
            }
            '!' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Ne
                } else {
                    return Err(EngineError::Parse(format!(
                        "Unexpected character '!' at {line}:{column}"
                    )));
                }
            }
            '<' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Le
                } else if self.current_char() == '>' {
                    self.advance();
                    TokenType::Ne
                } else {
                    TokenType::Lt
                }
            }
            '>' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Ge
                } else {
                    TokenType::Gt
                }
            }
            '+' => {
                self.advance();
                TokenType::Plus
            }
            '-' => {
                self.advance();
                TokenType::Minus
            }
            '*' => {
                self.advance();
                TokenType::Star
            }
            '/' => {
                self.advance();
                TokenType::Slash
            }
            '(' => {
                self.advance();
                TokenType::LParen
            }
            ')' => {
                self.advance();
                TokenType::RParen
            }
            ',' => {
                self.advance();
                TokenType::Comma
            }
            ';' => {
                self.advance();
                TokenType::Semicolon
            }
            '.' => {
                self.advance();
                TokenType::Dot
            }
            '?' => {
                self.advance();
                TokenType::Placeholder
            }
            _ => {
                return Err(EngineError::Parse(format!(
                    "Unexpected character '{ch}' at {line}:{column}"
                )));
            }
        };

        Ok(Token::new(token_type, line, column))
    }

    fn current_char(&self) -> char {
        if self.is_eof() {
            '\0'
        } else {
            self.input[self.position]
        }
    }

    fn peek_char(&self) -> Option<char> {
        if self.position + 1 < self.input.len() {
            Some(self.input[self.position + 1])
        } else {
            None
        }
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            if self.input[self.position] == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.position += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    fn skip_line_comment(&mut self) {
        while !self.is_eof() && self.current_char() != '\n' {
            self.advance();
        }
        if !self.is_eof() {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        self.advance();
        self.advance();

        while !self.is_eof() {
            if self.current_char() == '*' && self.peek_char() == Some('/') {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }

        Err(EngineError::Parse("Unterminated block comment".to_string()))
    }

    fn read_string(&mut self, quote: char) -> Result<TokenType> {
        self.advance();
        let mut value = String::new();

        while !self.is_eof() && self.current_char() != quote {
            if self.current_char() == '\\' {
                self.advance();
                if self.is_eof() {
                    return Err(EngineError::Parse("Unterminated string".to_string()));
                }
                let escaped = match self.current_char() {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    c => c,
                };
                value.push(escaped);
            } else {
                value.push(self.current_char());
            }
            self.advance();
        }

        if self.is_eof() {
            return Err(EngineError::Parse("Unterminated string".to_string()));
        }

        self.advance();
        Ok(TokenType::String(value))
    }

    fn read_quoted_identifier(&mut self) -> Result<TokenType> {
        self.advance();
        let mut value = String::new();

        while !self.is_eof() && self.current_char() != '`' {
            value.push(self.current_char());
            self.advance();
        }

        if self.is_eof() {
            return Err(EngineError::Parse("Unterminated identifier".to_string()));
        }

        self.advance();
        Ok(TokenType::Identifier(value))
    }

    fn read_number(&mut self) -> Result<TokenType> {
        let mut value = String::new();

        while !self.is_eof() && (self.current_char().is_numeric() || self.current_char() == '.') {
            // A dot not followed by a digit ends the number; it is a
            // qualifier separator, as in `1.` never appearing but `t.c` does.
            if self.current_char() == '.' && !self.peek_char().map_or(false, |c| c.is_numeric()) {
                break;
            }
            value.push(self.current_char());
            self.advance();
        }

        if !self.is_eof() && (self.current_char() == 'e' || self.current_char() == 'E') {
            value.push(self.current_char());
            self.advance();
            if !self.is_eof() && (self.current_char() == '+' || self.current_char() == '-') {
                value.push(self.current_char());
                self.advance();
            }
            while !self.is_eof() && self.current_char().is_numeric() {
                value.push(self.current_char());
                self.advance();
            }
        }

        value
            .parse::<f64>()
            .map(TokenType::Number)
            .map_err(|_| EngineError::Parse(format!("Invalid number: {value}")))
    }

    fn read_identifier(&mut self) -> TokenType {
        let mut value = String::new();

        while !self.is_eof() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        TokenType::from_keyword(&value).unwrap_or(TokenType::Identifier(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_simple_select() {
        let mut lexer = Lexer::new("SELECT * FROM users");
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(tokens.len(), 5); // SELECT, *, FROM, users, EOF
        assert!(matches!(tokens[0].token_type, TokenType::Select));
        assert!(matches!(tokens[1].token_type, TokenType::Star));
        assert!(matches!(tokens[2].token_type, TokenType::From));
        assert!(matches!(tokens[3].token_type, TokenType::Identifier(_)));
        assert!(matches!(tokens[4].token_type, TokenType::Eof));
    }

    #[test]
    fn test_lexer_qualified_column() {
        let mut lexer = Lexer::new("u.id");
        let tokens = lexer.tokenize().unwrap();

        assert!(matches!(tokens[0].token_type, TokenType::Identifier(ref s) if s == "u"));
        assert!(matches!(tokens[1].token_type, TokenType::Dot));
        assert!(matches!(tokens[2].token_type, TokenType::Identifier(ref s) if s == "id"));
    }

    #[test]
    fn test_lexer_string_and_number() {
        let mut lexer = Lexer::new("WHERE name = 'John' AND age >= 18.5");
        let tokens = lexer.tokenize().unwrap();

        assert!(matches!(tokens[3].token_type, TokenType::String(ref s) if s == "John"));
        assert!(matches!(tokens[6].token_type, TokenType::Ge));
        assert!(matches!(tokens[7].token_type, TokenType::Number(n) if n == 18.5));
    }

    #[test]
    fn test_lexer_placeholder_and_backticks() {
        let mut lexer = Lexer::new("SELECT `order` FROM t WHERE id = ?");
        let tokens = lexer.tokenize().unwrap();

        assert!(matches!(tokens[1].token_type, TokenType::Identifier(ref s) if s == "order"));
        assert!(matches!(tokens[7].token_type, TokenType::Placeholder));
    }

    #[test]
    fn test_lexer_comment() {
        let mut lexer = Lexer::new("SELECT * -- trailing comment\nFROM users");
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(tokens.len(), 5);
        assert!(matches!(tokens[2].token_type, TokenType::From));
    }

    #[test]
    fn test_lexer_keywords_case_insensitive() {
        let mut lexer = Lexer::new("select AUTO_INCREMENT Varchar");
        let tokens = lexer.tokenize().unwrap();

        assert!(matches!(tokens[0].token_type, TokenType::Select));
        assert!(matches!(tokens[1].token_type, TokenType::AutoIncrement));
        assert!(matches!(tokens[2].token_type, TokenType::Varchar));
    }
}
