//! Kernel-language front end: lexer, parser and AST.

pub mod ast;
pub mod lexeme;
pub mod lexer;
pub mod parser;
pub mod span;

use std::sync::Arc;

use crate::diagnostic::Diagnostic;

/// Parse kernel or helper-function source into a function declaration.
///
/// `file_id` tags every span so diagnostics from inlined library code can be
/// told apart from user source.
pub fn parse_function(source: &str, file_id: u16) -> Result<Arc<ast::FnDecl>, Vec<Diagnostic>> {
    let (tokens, lex_errors) = lexer::Lexer::new(source, file_id).tokenize();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }
    parser::Parser::new(tokens).parse_function_source()
}
