/// All lexemes of the kernel language.
#[derive(Clone, Debug, PartialEq)]
pub enum Lexeme {
    // Keywords
    Let,
    Const,
    Var,
    Function,
    If,
    Else,
    For,
    Of,
    While,
    Break,
    Continue,
    Return,
    True,
    False,
    This,

    // Symbols
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Comma,     // ,
    Colon,     // :
    Semicolon, // ;
    Dot,       // .
    Question,  // ?
    FatArrow,  // =>
    Eq,        // =
    PlusEq,    // +=
    MinusEq,   // -=
    StarEq,    // *=
    SlashEq,   // /=
    AmpEq,     // &=
    PipeEq,    // |=
    CaretEq,   // ^=
    EqEq,      // == or ===
    NotEq,     // != or !==
    Lt,        // <
    Le,        // <=
    Gt,        // >
    Ge,        // >=
    Shl,       // <<
    Shr,       // >>
    Plus,      // +
    Minus,     // -
    Star,      // *
    StarStar,  // **
    Slash,     // /
    Percent,   // %
    Amp,       // &
    AmpAmp,    // &&
    Pipe,      // |
    PipePipe,  // ||
    Caret,     // ^
    Bang,      // !
    Tilde,     // ~

    // Literals
    Integer(i64),
    Float(f64),
    Ident(String),

    // End of input
    Eof,
}

impl Lexeme {
    /// Try to match an identifier string to a keyword.
    pub fn from_keyword(s: &str) -> Option<Lexeme> {
        match s {
            "let" => Some(Lexeme::Let),
            "const" => Some(Lexeme::Const),
            "var" => Some(Lexeme::Var),
            "function" => Some(Lexeme::Function),
            "if" => Some(Lexeme::If),
            "else" => Some(Lexeme::Else),
            "for" => Some(Lexeme::For),
            "of" => Some(Lexeme::Of),
            "while" => Some(Lexeme::While),
            "break" => Some(Lexeme::Break),
            "continue" => Some(Lexeme::Continue),
            "return" => Some(Lexeme::Return),
            "true" => Some(Lexeme::True),
            "false" => Some(Lexeme::False),
            "this" => Some(Lexeme::This),
            _ => None,
        }
    }

    /// True for `=` and the compound assignment operators.
    pub fn is_assign(&self) -> bool {
        matches!(
            self,
            Lexeme::Eq
                | Lexeme::PlusEq
                | Lexeme::MinusEq
                | Lexeme::StarEq
                | Lexeme::SlashEq
                | Lexeme::AmpEq
                | Lexeme::PipeEq
                | Lexeme::CaretEq
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Lexeme::Let => "'let'",
            Lexeme::Const => "'const'",
            Lexeme::Var => "'var'",
            Lexeme::Function => "'function'",
            Lexeme::If => "'if'",
            Lexeme::Else => "'else'",
            Lexeme::For => "'for'",
            Lexeme::Of => "'of'",
            Lexeme::While => "'while'",
            Lexeme::Break => "'break'",
            Lexeme::Continue => "'continue'",
            Lexeme::Return => "'return'",
            Lexeme::True => "'true'",
            Lexeme::False => "'false'",
            Lexeme::This => "'this'",
            Lexeme::LParen => "'('",
            Lexeme::RParen => "')'",
            Lexeme::LBrace => "'{'",
            Lexeme::RBrace => "'}'",
            Lexeme::LBracket => "'['",
            Lexeme::RBracket => "']'",
            Lexeme::Comma => "','",
            Lexeme::Colon => "':'",
            Lexeme::Semicolon => "';'",
            Lexeme::Dot => "'.'",
            Lexeme::Question => "'?'",
            Lexeme::FatArrow => "'=>'",
            Lexeme::Eq => "'='",
            Lexeme::PlusEq => "'+='",
            Lexeme::MinusEq => "'-='",
            Lexeme::StarEq => "'*='",
            Lexeme::SlashEq => "'/='",
            Lexeme::AmpEq => "'&='",
            Lexeme::PipeEq => "'|='",
            Lexeme::CaretEq => "'^='",
            Lexeme::EqEq => "'=='",
            Lexeme::NotEq => "'!='",
            Lexeme::Lt => "'<'",
            Lexeme::Le => "'<='",
            Lexeme::Gt => "'>'",
            Lexeme::Ge => "'>='",
            Lexeme::Shl => "'<<'",
            Lexeme::Shr => "'>>'",
            Lexeme::Plus => "'+'",
            Lexeme::Minus => "'-'",
            Lexeme::Star => "'*'",
            Lexeme::StarStar => "'**'",
            Lexeme::Slash => "'/'",
            Lexeme::Percent => "'%'",
            Lexeme::Amp => "'&'",
            Lexeme::AmpAmp => "'&&'",
            Lexeme::Pipe => "'|'",
            Lexeme::PipePipe => "'||'",
            Lexeme::Caret => "'^'",
            Lexeme::Bang => "'!'",
            Lexeme::Tilde => "'~'",
            Lexeme::Integer(_) => "integer literal",
            Lexeme::Float(_) => "float literal",
            Lexeme::Ident(_) => "identifier",
            Lexeme::Eof => "end of input",
        }
    }
}
