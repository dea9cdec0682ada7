use crate::diagnostic::Diagnostic;
use crate::syntax::lexeme::Lexeme;
use crate::syntax::span::{Span, Spanned};

pub(crate) struct Lexer<'src> {
    source: &'src [u8],
    file_id: u16,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub(crate) fn new(source: &'src str, file_id: u16) -> Self {
        Self {
            source: source.as_bytes(),
            file_id,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn tokenize(mut self) -> (Vec<Spanned<Lexeme>>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.node == Lexeme::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        (tokens, self.diagnostics)
    }

    fn next_token(&mut self) -> Spanned<Lexeme> {
        loop {
            self.skip_whitespace_and_comments();

            if self.pos >= self.source.len() {
                return self.make_token(Lexeme::Eof, self.pos, self.pos);
            }

            let start = self.pos;
            let ch = self.source[self.pos];

            if is_ident_start(ch) {
                return self.scan_ident_or_keyword();
            }

            if ch.is_ascii_digit()
                || (ch == b'.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()))
            {
                return self.scan_number();
            }

            if let Some(tok) = self.scan_symbol(start) {
                return tok;
            }
            // scan_symbol returned None → error was recorded, try again
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }

            if self.peek() == Some(b'/') && self.peek_at(1) == Some(b'/') {
                while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }

            if self.peek() == Some(b'/') && self.peek_at(1) == Some(b'*') {
                let start = self.pos;
                self.pos += 2;
                loop {
                    if self.pos + 1 >= self.source.len() {
                        self.pos = self.source.len();
                        self.diagnostics.push(
                            Diagnostic::error(
                                "unterminated block comment".to_string(),
                                Span::new(self.file_id, start as u32, self.pos as u32),
                            )
                            .with_help("close the comment with `*/`".to_string()),
                        );
                        break;
                    }
                    if self.source[self.pos] == b'*' && self.source[self.pos + 1] == b'/' {
                        self.pos += 2;
                        break;
                    }
                    self.pos += 1;
                }
                continue;
            }

            break;
        }
    }

    fn scan_ident_or_keyword(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        while self.pos < self.source.len() && is_ident_continue(self.source[self.pos]) {
            self.pos += 1;
        }
        let text = self.text(start, self.pos);
        let token = Lexeme::from_keyword(&text).unwrap_or(Lexeme::Ident(text));
        self.make_token(token, start, self.pos)
    }

    fn scan_number(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_hexdigit() {
                self.pos += 1;
            }
            let digits = self.text(digits_start, self.pos);
            return match i64::from_str_radix(&digits, 16) {
                Ok(n) => self.make_token(Lexeme::Integer(n), start, self.pos),
                Err(_) => self.number_error(start, "hexadecimal literal is malformed"),
            };
        }

        let mut is_float = false;
        self.eat_digits();
        if self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            self.eat_digits();
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let sign = matches!(self.peek_at(1), Some(b'+') | Some(b'-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += digit_at;
                self.eat_digits();
            }
        }

        let text = self.text(start, self.pos).replace('_', "");
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => self.make_token(Lexeme::Float(v), start, self.pos),
                Err(_) => self.number_error(start, "float literal is malformed"),
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => self.make_token(Lexeme::Integer(n), start, self.pos),
                Err(_) => self.number_error(start, "integer literal is too large"),
            }
        }
    }

    fn number_error(&mut self, start: usize, message: &str) -> Spanned<Lexeme> {
        self.diagnostics.push(Diagnostic::error(
            message.to_string(),
            Span::new(self.file_id, start as u32, self.pos as u32),
        ));
        self.make_token(Lexeme::Integer(0), start, self.pos)
    }

    fn eat_digits(&mut self) {
        while self.pos < self.source.len()
            && (self.source[self.pos].is_ascii_digit() || self.source[self.pos] == b'_')
        {
            self.pos += 1;
        }
    }

    fn scan_symbol(&mut self, start: usize) -> Option<Spanned<Lexeme>> {
        let ch = self.source[self.pos];
        self.pos += 1;

        let token = match ch {
            b'(' => Lexeme::LParen,
            b')' => Lexeme::RParen,
            b'{' => Lexeme::LBrace,
            b'}' => Lexeme::RBrace,
            b'[' => Lexeme::LBracket,
            b']' => Lexeme::RBracket,
            b',' => Lexeme::Comma,
            b':' => Lexeme::Colon,
            b';' => Lexeme::Semicolon,
            b'.' => Lexeme::Dot,
            b'?' => Lexeme::Question,
            b'~' => Lexeme::Tilde,
            b'%' => Lexeme::Percent,
            b'+' => self.pick(b'=', Lexeme::PlusEq, Lexeme::Plus),
            b'-' => self.pick(b'=', Lexeme::MinusEq, Lexeme::Minus),
            b'/' => self.pick(b'=', Lexeme::SlashEq, Lexeme::Slash),
            b'^' => self.pick(b'=', Lexeme::CaretEq, Lexeme::Caret),
            b'*' => {
                if self.peek() == Some(b'*') {
                    self.pos += 1;
                    Lexeme::StarStar
                } else {
                    self.pick(b'=', Lexeme::StarEq, Lexeme::Star)
                }
            }
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.pos += 1;
                    Lexeme::AmpAmp
                } else {
                    self.pick(b'=', Lexeme::AmpEq, Lexeme::Amp)
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.pos += 1;
                    Lexeme::PipePipe
                } else {
                    self.pick(b'=', Lexeme::PipeEq, Lexeme::Pipe)
                }
            }
            b'<' => {
                if self.peek() == Some(b'<') {
                    self.pos += 1;
                    Lexeme::Shl
                } else {
                    self.pick(b'=', Lexeme::Le, Lexeme::Lt)
                }
            }
            b'>' => {
                if self.peek() == Some(b'>') {
                    self.pos += 1;
                    Lexeme::Shr
                } else {
                    self.pick(b'=', Lexeme::Ge, Lexeme::Gt)
                }
            }
            b'=' => {
                if self.peek() == Some(b'>') {
                    self.pos += 1;
                    Lexeme::FatArrow
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                    }
                    Lexeme::EqEq
                } else {
                    Lexeme::Eq
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                    }
                    Lexeme::NotEq
                } else {
                    Lexeme::Bang
                }
            }
            b'"' | b'\'' | b'`' => {
                self.diagnostics.push(
                    Diagnostic::error(
                        "string literals are not supported in kernels".to_string(),
                        Span::new(self.file_id, start as u32, self.pos as u32),
                    )
                    .with_help("kernels operate on numbers, vectors, matrices and fields".to_string()),
                );
                self.skip_string(ch);
                return None;
            }
            _ => {
                self.diagnostics.push(
                    Diagnostic::error(
                        format!("unexpected character '{}' (U+{:04X})", ch as char, ch),
                        Span::new(self.file_id, start as u32, self.pos as u32),
                    )
                    .with_help(
                        "this character is not part of the kernel language".to_string(),
                    ),
                );
                return None;
            }
        };

        Some(self.make_token(token, start, self.pos))
    }

    /// Consume `next` if present and return `matched`, else `single`.
    fn pick(&mut self, next: u8, matched: Lexeme, single: Lexeme) -> Lexeme {
        if self.peek() == Some(next) {
            self.pos += 1;
            matched
        } else {
            single
        }
    }

    fn skip_string(&mut self, quote: u8) {
        while self.pos < self.source.len() && self.source[self.pos] != quote {
            self.pos += 1;
        }
        if self.pos < self.source.len() {
            self.pos += 1;
        }
    }

    fn text(&self, start: usize, end: usize) -> String {
        String::from_utf8_lossy(&self.source[start..end]).into_owned()
    }

    fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn make_token(&self, token: Lexeme, start: usize, end: usize) -> Spanned<Lexeme> {
        Spanned::new(token, Span::new(self.file_id, start as u32, end as u32))
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_' || ch == b'$'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'$'
}

#[cfg(test)]
mod tests;
