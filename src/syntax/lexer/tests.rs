use super::*;

fn lex(source: &str) -> Vec<Lexeme> {
    let (tokens, diagnostics) = Lexer::new(source, 0).tokenize();
    assert!(diagnostics.is_empty(), "unexpected diagnostics: {:?}", diagnostics);
    tokens.into_iter().map(|t| t.node).collect()
}

#[test]
fn test_keywords_and_identifiers() {
    let tokens = lex("let x = this.y; for (const i of range) {}");
    assert_eq!(
        tokens,
        vec![
            Lexeme::Let,
            Lexeme::Ident("x".into()),
            Lexeme::Eq,
            Lexeme::This,
            Lexeme::Dot,
            Lexeme::Ident("y".into()),
            Lexeme::Semicolon,
            Lexeme::For,
            Lexeme::LParen,
            Lexeme::Const,
            Lexeme::Ident("i".into()),
            Lexeme::Of,
            Lexeme::Ident("range".into()),
            Lexeme::RParen,
            Lexeme::LBrace,
            Lexeme::RBrace,
            Lexeme::Eof,
        ]
    );
}

#[test]
fn test_numbers() {
    let tokens = lex("42 1.5 .25 1e3 1.e-20 0x1F 1_000 7.");
    assert_eq!(
        tokens,
        vec![
            Lexeme::Integer(42),
            Lexeme::Float(1.5),
            Lexeme::Float(0.25),
            Lexeme::Float(1000.0),
            Lexeme::Float(1e-20),
            Lexeme::Integer(31),
            Lexeme::Integer(1000),
            Lexeme::Float(7.0),
            Lexeme::Eof,
        ]
    );
}

#[test]
fn test_compound_operators() {
    let tokens = lex("+= -= *= /= &= |= ^= ** => === !== == != <= >= << >> && ||");
    assert_eq!(
        tokens,
        vec![
            Lexeme::PlusEq,
            Lexeme::MinusEq,
            Lexeme::StarEq,
            Lexeme::SlashEq,
            Lexeme::AmpEq,
            Lexeme::PipeEq,
            Lexeme::CaretEq,
            Lexeme::StarStar,
            Lexeme::FatArrow,
            Lexeme::EqEq,
            Lexeme::NotEq,
            Lexeme::EqEq,
            Lexeme::NotEq,
            Lexeme::Le,
            Lexeme::Ge,
            Lexeme::Shl,
            Lexeme::Shr,
            Lexeme::AmpAmp,
            Lexeme::PipePipe,
            Lexeme::Eof,
        ]
    );
}

#[test]
fn test_comments_are_skipped() {
    let tokens = lex("a // line\n/* block\n comment */ b");
    assert_eq!(
        tokens,
        vec![
            Lexeme::Ident("a".into()),
            Lexeme::Ident("b".into()),
            Lexeme::Eof
        ]
    );
}

#[test]
fn test_spans_track_byte_offsets() {
    let (tokens, _) = Lexer::new("let  foo", 3).tokenize();
    assert_eq!(tokens[1].span, Span::new(3, 5, 8));
    assert_eq!(tokens[2].span.start, 8);
}

#[test]
fn test_string_literal_is_rejected() {
    let (tokens, diagnostics) = Lexer::new("let s = \"abc\"", 0).tokenize();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("string literals"));
    assert_eq!(tokens.last().map(|t| &t.node), Some(&Lexeme::Eof));
}

#[test]
fn test_unterminated_block_comment() {
    let (_, diagnostics) = Lexer::new("a /* never closed", 0).tokenize();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("unterminated"));
}

#[test]
fn test_unexpected_character() {
    let (tokens, diagnostics) = Lexer::new("a # b", 0).tokenize();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(tokens.len(), 3);
}
