pub const SQLITE_SCHEMA_SQL: &str = include_str!("../../sql/sqlite_schema.sql");
pub const SCHEMA_VERSION: &str = "1";

/// Splits a script on `;` outside quoted literals and drops `--` comment
/// lines. Empty statements are skipped.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for line in sql.lines() {
        if quote.is_none() && line.trim_start().starts_with("--") {
            continue;
        }

        for ch in line.chars() {
            match (quote, ch) {
                (None, '\'' | '"') => quote = Some(ch),
                (Some(open), _) if open == ch => quote = None,
                (None, ';') => {
                    push_statement(&mut statements, &current);
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        current.push('\n');
    }

    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}
