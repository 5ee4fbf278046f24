//! Picks the statement under the editor cursor from a multi-statement body.
//!
//! Uses the sqlparser tokenizer so semicolons inside strings, quoted
//! identifiers and comments do not split statements.

use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

/// One statement of a body, with its 0-based line span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Splits `body` into statements. Returns `None` if the body cannot be tokenized.
pub fn split_statements(body: &str) -> Option<Vec<Statement>> {
    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, body)
        .tokenize_with_location()
        .ok()?;
    let line_starts = line_starts(body);

    let mut statements = Vec::new();
    let mut segment_start = 0;
    let mut has_code = false;

    for token in &tokens {
        match &token.token {
            Token::SemiColon => {
                let offset = byte_offset(
                    body,
                    &line_starts,
                    token.location.line,
                    token.location.column,
                )?;
                if has_code {
                    statements.extend(make_statement(body, segment_start, offset));
                }
                segment_start = offset + 1;
                has_code = false;
            }
            Token::Whitespace(_) | Token::EOF => {}
            _ => has_code = true,
        }
    }

    if has_code {
        statements.extend(make_statement(body, segment_start, body.len()));
    }

    Some(statements)
}

/// Returns the statement to run for a 0-based cursor line.
///
/// The statement spanning the cursor wins; on a blank line between statements
/// the one just above the cursor is used. Falls back to the whole body when
/// the body cannot be split.
pub fn statement_at_line(body: &str, cursor_line: usize) -> String {
    let Some(statements) = split_statements(body) else {
        return body.trim().to_string();
    };

    let chosen = statements
        .iter()
        .find(|s| s.start_line <= cursor_line && cursor_line <= s.end_line)
        .or_else(|| statements.iter().rev().find(|s| s.end_line < cursor_line))
        .or_else(|| statements.first());

    match chosen {
        Some(statement) => statement.text.clone(),
        None => body.trim().to_string(),
    }
}

fn make_statement(body: &str, start: usize, end: usize) -> Option<Statement> {
    let segment = body.get(start..end)?;
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return None;
    }
    let leading = segment.len() - segment.trim_start().len();
    let text_start = start + leading;
    let text_end = text_start + trimmed.len();

    Some(Statement {
        text: trimmed.to_string(),
        start_line: body[..text_start].matches('\n').count(),
        end_line: body[..text_end].matches('\n').count(),
    })
}

fn line_starts(body: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(body.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// Converts a 1-based line/column (in chars) to a byte offset.
fn byte_offset(body: &str, line_starts: &[usize], line: u64, column: u64) -> Option<usize> {
    let line_start = *line_starts.get((line as usize).checked_sub(1)?)?;
    let column = (column as usize).checked_sub(1)?;
    body[line_start..]
        .char_indices()
        .nth(column)
        .map(|(i, _)| line_start + i)
}
