//! Span helpers for the optional `tracing` feature
//!
//! The library only emits spans; installing a subscriber is left to the
//! embedding application.

use tracing::{info_span, Span};

const MAX_QUERY_PREVIEW: usize = 120;

fn preview(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() > MAX_QUERY_PREVIEW {
        let mut end = MAX_QUERY_PREVIEW;
        while !flat.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &flat[..end])
    } else {
        flat
    }
}

/// Span covering connection establishment.
pub fn connect_span() -> Span {
    info_span!("floodgate.connect")
}

/// Span covering a single statement or script execution.
pub fn query_span(query: &str) -> Span {
    info_span!("floodgate.query", query = %preview(query))
}

/// Span covering the application of one migration.
pub fn migration_span(version: &str, description: &str) -> Span {
    info_span!("floodgate.migration", %version, %description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_flattens_and_truncates() {
        let long = "SELECT *\n  FROM a_very_long_table_name\n".repeat(10);
        let p = preview(&long);
        assert!(!p.contains('\n'));
        assert!(p.len() <= MAX_QUERY_PREVIEW + '…'.len_utf8());
    }
}
