//! Structured PostgreSQL errors raised while running migration SQL.

use crate::constants::{SQLSTATE_DUPLICATE_OBJECT, SQLSTATE_DUPLICATE_TABLE};
use sqlx::postgres::{PgDatabaseError, PgErrorPosition};
use std::fmt;

/// A database error with the server's diagnostic fields and, when the
/// server reported a position, the line of the offending statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlErrorContext {
    pub message: String,
    /// SQLSTATE, e.g. "42P07" for duplicate_table
    pub code: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// Line number within the executed SQL (1-indexed)
    pub line_number: Option<usize>,
    /// Rendered source lines around `line_number`
    pub excerpt: Option<String>,
}

impl SqlErrorContext {
    pub fn from_sqlx_error(error: &sqlx::Error, sql: &str) -> Self {
        if let Some(db_error) = error.as_database_error()
            && let Some(pg_error) = db_error.try_downcast_ref::<PgDatabaseError>()
        {
            let line_number = pg_error
                .position()
                .map(|pos| match pos {
                    PgErrorPosition::Original(p) => p,
                    PgErrorPosition::Internal { position, .. } => position,
                })
                .map(|p| position_to_line(sql, p));

            return Self {
                message: pg_error.message().to_string(),
                code: Some(pg_error.code().to_string()),
                detail: pg_error.detail().map(|s| s.to_string()),
                hint: pg_error.hint().map(|s| s.to_string()),
                line_number,
                excerpt: line_number.map(|line| format_line_context(sql, line)),
            };
        }

        Self {
            message: error.to_string(),
            ..Default::default()
        }
    }

    /// The object being created already exists.
    pub fn is_duplicate_object(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some(SQLSTATE_DUPLICATE_TABLE) | Some(SQLSTATE_DUPLICATE_OBJECT)
        )
    }
}

impl fmt::Display for SqlErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(line) = self.line_number {
            write!(f, " at line {}", line)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\n  Detail: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  Hint: {}", hint)?;
        }
        if let Some(excerpt) = &self.excerpt {
            write!(f, "\n\n{}", excerpt)?;
        }
        Ok(())
    }
}

impl std::error::Error for SqlErrorContext {}

/// Whether any error in the chain is a duplicate-object database error.
pub fn is_duplicate_object(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<SqlErrorContext>())
        .any(SqlErrorContext::is_duplicate_object)
}

/// Convert a 1-indexed character position to a line number
fn position_to_line(content: &str, position: usize) -> usize {
    content
        .chars()
        .take(position.saturating_sub(1))
        .filter(|c| *c == '\n')
        .count()
        + 1
}

fn format_line_context(content: &str, error_line: usize) -> String {
    const CONTEXT_LINES: usize = 2;

    let lines: Vec<&str> = content.lines().collect();
    let error_idx = error_line.saturating_sub(1);
    let start_idx = error_idx.saturating_sub(CONTEXT_LINES).min(lines.len());
    let end_idx = (error_idx + CONTEXT_LINES + 1).min(lines.len());

    lines[start_idx..end_idx]
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            let line_num = start_idx + idx + 1;
            let marker = if line_num == error_line { ">" } else { " " };
            format!("  {} {:4} | {}", marker, line_num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
