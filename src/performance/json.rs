//! Response decoding with diagnostics that point at the offending field.

use anyhow::Result;

/// Deserialize `body`, reporting the serde path, the line/column and a short excerpt of
/// the surrounding text on failure.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let deserializer = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let inner = err.inner();
        let (line, column) = (inner.line(), inner.column());
        let path = err.path().to_string();

        let message = inner.to_string();
        let location = format!(" at line {line} column {column}");
        let message = message.strip_suffix(&location).unwrap_or(&message);

        let mut rendered = String::new();
        if !path.is_empty() && path != "." {
            rendered.push_str(&format!("at path '{path}': "));
        }
        rendered.push_str(&format!(
            "{message} (line {line} col {column})\n{}",
            excerpt(body, line, column, 24)
        ));
        anyhow::anyhow!(rendered)
    })
}

/// Up to `width` characters around the (1-based) `line`/`column`, with a caret underneath.
fn excerpt(body: &str, line: usize, column: usize, width: usize) -> String {
    let text: Vec<char> = body
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or("")
        .chars()
        .collect();
    if text.is_empty() {
        return "(empty line)".to_string();
    }

    let at = column.saturating_sub(1).min(text.len().saturating_sub(1));
    let from = at.saturating_sub(width / 2);
    let to = (at + width / 2).min(text.len());
    let slice: String = text[from..to].iter().collect();

    format!("...{slice}...\n   {}^", " ".repeat(at - from))
}
