use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::token::Token;

lazy_static! {
    static ref KEYWORDS: HashMap<&'static str, Token> = HashMap::from([
        ("true", Token::True),
        ("false", Token::False),
        ("null", Token::Null),
        ("break", Token::Break),
        ("continue", Token::Continue),
        ("while", Token::While),
        ("for", Token::For),
        ("in", Token::In),
        ("of", Token::Of),
    ]);
}

pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let char = chars.first().copied();
        Self {
            chars,
            position: 0,
            char,
        }
    }

    pub fn next_token(&mut self) -> Option<Token> {
        self.skip_trivia();

        let token = match self.char {
            Some(char) => match char {
                '=' if self.is_next_char('=') => {
                    self.read_char();
                    Some(Token::Eq)
                }
                '=' if self.is_next_char('>') => {
                    self.read_char();
                    Some(Token::FatArrow)
                }
                '=' => Some(Token::Assign),
                ':' if self.is_next_char(':') => {
                    self.read_char();
                    Some(Token::DoubleColon)
                }
                ':' => Some(Token::Colon),
                '+' if self.is_next_char('+') => {
                    self.read_char();
                    Some(Token::Increment)
                }
                '+' => Some(Token::Plus),
                '-' if self.is_next_char('>') => {
                    self.read_char();
                    Some(Token::Arrow)
                }
                '-' if self.is_next_char('-') => {
                    self.read_char();
                    Some(Token::Decrement)
                }
                '-' => Some(Token::Minus),
                '<' if self.is_next_char('<') => {
                    self.read_char();
                    Some(Token::PopAngle)
                }
                '<' if self.is_next_char('=') => {
                    self.read_char();
                    Some(Token::LtEq)
                }
                '<' => Some(Token::Lt),
                '>' if self.is_next_char('>') => {
                    self.read_char();
                    Some(Token::PushAngle)
                }
                '>' if self.is_next_char('=') => {
                    self.read_char();
                    Some(Token::GtEq)
                }
                '>' => Some(Token::Gt),
                '&' if self.is_next_char('&') => {
                    self.read_char();
                    Some(Token::And)
                }
                '&' => Some(Token::Ampersand),
                '|' if self.is_next_char('|') => {
                    self.read_char();
                    Some(Token::Or)
                }
                '.' if self.is_next_char('.') => {
                    self.read_char();
                    Some(Token::DoubleDot)
                }
                '.' => Some(Token::Dot),
                '!' => Some(Token::Bang),
                '*' => Some(Token::Asterisk),
                '/' => Some(Token::Slash),
                '%' => Some(Token::Percent),
                '$' => Some(Token::Dollar),
                '#' => Some(Token::Octothorp),
                '?' => Some(Token::Question),
                ';' => Some(Token::Semicolon),
                ',' => Some(Token::Comma),
                '(' => Some(Token::Lparen),
                ')' => Some(Token::Rparen),
                '{' => Some(Token::Lbrace),
                '}' => Some(Token::Rbrace),
                '[' => Some(Token::Lbracket),
                ']' => Some(Token::Rbracket),
                '"' => match self.read_quoted('"') {
                    Some(literal) => Some(Token::String(literal)),
                    None => Some(Token::Illegal("unterminated string".to_string())),
                },
                '\'' => match self.read_quoted('\'') {
                    Some(literal) => {
                        let mut chars = literal.chars();
                        match (chars.next(), chars.next()) {
                            (Some(char), None) => Some(Token::Char(char)),
                            _ => Some(Token::Illegal(format!("'{}'", literal))),
                        }
                    }
                    None => Some(Token::Illegal("unterminated character".to_string())),
                },
                'ω' => Some(Token::Ident("omega".to_string())),
                _ if char.is_ascii_digit() => {
                    let mut literal = self.read_while(|char| char.is_ascii_digit());
                    if self.is_next_char('.')
                        && self
                            .chars
                            .get(self.position + 2)
                            .is_some_and(|char| char.is_ascii_digit())
                    {
                        self.read_char();
                        self.read_char();
                        literal.push('.');
                        literal.push_str(&self.read_while(|char| char.is_ascii_digit()));
                    }
                    Some(Token::Number(literal))
                }
                _ if char.is_ascii_alphabetic() || char == '_' => {
                    let literal = self.read_while(|char| char.is_ascii_alphanumeric() || char == '_');
                    match KEYWORDS.get(literal.as_str()) {
                        Some(keyword) => Some(keyword.clone()),
                        None => Some(Token::Ident(literal)),
                    }
                }
                _ => Some(Token::Illegal(char.to_string())),
            },
            None => None,
        };

        self.read_char();

        token
    }

    fn read_char(&mut self) {
        self.position += 1;
        self.char = self.chars.get(self.position).copied();
    }

    fn is_next_char(&self, ch: char) -> bool {
        self.chars.get(self.position + 1).eq(&Some(&ch))
    }

    fn skip_trivia(&mut self) {
        loop {
            while self.char.is_some_and(|char| char.is_whitespace()) {
                self.read_char();
            }
            if self.char == Some('/') && self.is_next_char('/') {
                while self.char.is_some_and(|char| char != '\n') {
                    self.read_char();
                }
                continue;
            }
            break;
        }
    }

    /// Reads the current char and every following char matching `condition`,
    /// leaving the cursor on the last char of the literal.
    fn read_while(&mut self, condition: impl Fn(char) -> bool) -> String {
        let mut literal = String::new();
        if let Some(char) = self.char {
            literal.push(char);
        }
        while self
            .chars
            .get(self.position + 1)
            .is_some_and(|char| condition(*char))
        {
            self.read_char();
            if let Some(char) = self.char {
                literal.push(char);
            }
        }
        literal
    }

    /// Reads a quoted literal starting on the opening quote. The cursor is left
    /// on the closing quote, or `None` is returned when the input ends first.
    fn read_quoted(&mut self, quote: char) -> Option<String> {
        let mut literal = String::new();
        self.read_char();
        while let Some(char) = self.char {
            if char == quote {
                return Some(literal);
            }
            if char == '\\' {
                self.read_char();
                let escaped = match self.char? {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                };
                literal.push(escaped);
            } else {
                literal.push(char);
            }
            self.read_char();
        }
        None
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}
