//! Jupyter notebook parser: cell `source` plus `stream` output `text`.

use serde_json::Value;

/// Extract concatenated text from a `.ipynb` JSON document.
///
/// For `markdown` and `code` cells, the cell's `source` is included
/// (joined, if it is a JSON array of lines). `code` cells additionally
/// contribute the `text` of any `stream`-type output. Cells are separated by
/// a blank line.
pub fn extract_notebook(raw: &str) -> String {
    let doc: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return String::new(),
    };

    let Some(cells) = doc.get("cells").and_then(Value::as_array) else {
        return String::new();
    };

    let mut parts = Vec::new();
    for cell in cells {
        let cell_type = cell.get("cell_type").and_then(Value::as_str).unwrap_or("");
        if cell_type != "markdown" && cell_type != "code" {
            continue;
        }

        if let Some(source) = cell.get("source") {
            let text = join_source(source);
            if !text.trim().is_empty() {
                parts.push(text);
            }
        }

        if cell_type == "code" {
            if let Some(outputs) = cell.get("outputs").and_then(Value::as_array) {
                for output in outputs {
                    if output.get("output_type").and_then(Value::as_str) == Some("stream") {
                        if let Some(text) = output.get("text") {
                            let text = join_source(text);
                            if !text.trim().is_empty() {
                                parts.push(text);
                            }
                        }
                    }
                }
            }
        }
    }

    parts.join("\n\n")
}

fn join_source(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}
