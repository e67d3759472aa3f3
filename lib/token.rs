use std::fmt;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Ident(String),
    Number(String),
    String(String),
    Char(char),
    Illegal(String),

    Assign,
    DoubleColon,
    Plus,
    Minus,
    Bang,
    Asterisk,
    Slash,
    Percent,
    Increment,
    Decrement,

    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    And,
    Or,

    Ampersand,
    Dollar,
    Octothorp,
    Question,
    Arrow,
    FatArrow,
    Dot,
    DoubleDot,
    PopAngle,
    PushAngle,

    Comma,
    Semicolon,
    Colon,

    Lparen,
    Rparen,
    Lbrace,
    Rbrace,
    Lbracket,
    Rbracket,

    True,
    False,
    Null,
    Break,
    Continue,
    While,
    For,
    In,
    Of,
}

impl Token {
    pub fn variant_eq(&self, other: Token) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(&other)
    }

    /// Tokens that may stand between two operands as a binary operator.
    pub fn is_binary_operator(&self) -> bool {
        matches!(
            self,
            Token::Plus
                | Token::Minus
                | Token::Asterisk
                | Token::Slash
                | Token::Percent
                | Token::Eq
                | Token::Lt
                | Token::Gt
                | Token::LtEq
                | Token::GtEq
                | Token::And
                | Token::Or
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Ident(ident) => write!(f, "{}", ident),
            Token::Number(value) => write!(f, "{}", value),
            Token::String(value) => write!(f, "\"{}\"", value),
            Token::Char(value) => write!(f, "'{}'", value),
            Token::Illegal(value) => write!(f, "{}", value),

            Token::Assign => write!(f, "="),
            Token::DoubleColon => write!(f, "::"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Bang => write!(f, "!"),
            Token::Asterisk => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Increment => write!(f, "++"),
            Token::Decrement => write!(f, "--"),

            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::LtEq => write!(f, "<="),
            Token::GtEq => write!(f, ">="),
            Token::Eq => write!(f, "=="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),

            Token::Ampersand => write!(f, "&"),
            Token::Dollar => write!(f, "$"),
            Token::Octothorp => write!(f, "#"),
            Token::Question => write!(f, "?"),
            Token::Arrow => write!(f, "->"),
            Token::FatArrow => write!(f, "=>"),
            Token::Dot => write!(f, "."),
            Token::DoubleDot => write!(f, ".."),
            Token::PopAngle => write!(f, "<<"),
            Token::PushAngle => write!(f, ">>"),

            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),

            Token::Lparen => write!(f, "("),
            Token::Rparen => write!(f, ")"),
            Token::Lbrace => write!(f, "{{"),
            Token::Rbrace => write!(f, "}}"),
            Token::Lbracket => write!(f, "["),
            Token::Rbracket => write!(f, "]"),

            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::While => write!(f, "while"),
            Token::For => write!(f, "for"),
            Token::In => write!(f, "in"),
            Token::Of => write!(f, "of"),
        }
    }
}
