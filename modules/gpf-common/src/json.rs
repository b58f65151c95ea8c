//! JSON helpers: contextual parsing, JSONC comment stripping and schema
//! validation. Workflow documents may carry `//` and `/* */` comments; no
//! JSONC parser is pulled in, a string-literal-aware scanner removes them
//! before handing the text to `serde_json`.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{GpfError, Result};

/// Remove `//` line comments and `/* */` block comments outside string
/// literals. Escapes inside strings are honoured, so `"http://…"` and
/// `"\""` survive untouched.
pub fn strip_jsonc_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' => match chars.peek() {
                Some('/') => {
                    for next in chars.by_ref() {
                        if next == '\n' {
                            out.push('\n');
                            break;
                        }
                    }
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for next in chars.by_ref() {
                        if prev == '*' && next == '/' {
                            break;
                        }
                        prev = next;
                    }
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }
    out
}

/// Parse JSON text, naming the document in the error message.
pub fn loads(text: &str, title: &str) -> Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| GpfError::Sdk(format!("Impossible de parser le JSON «{title}» : {e}")))
}

/// Read and parse a JSON file that may contain comments.
pub fn load_jsonc(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)
        .map_err(|_| GpfError::Sdk(format!("Fichier JSON {} non trouvé", path.display())))?;
    loads(&strip_jsonc_comments(&text), &path.display().to_string())
}

/// Validate `instance` against `schema`. A broken schema is an SDK error
/// (programming mistake); a non-conforming instance is a workflow error.
pub fn validate(instance: &Value, schema: &Value, document_name: &str) -> Result<()> {
    let validator = jsonschema::validator_for(schema).map_err(|e| {
        GpfError::Sdk(format!(
            "Le schéma JSON de «{document_name}» n'est pas valide : {e}. Contactez le support."
        ))
    })?;
    validator.validate(instance).map_err(|e| {
        GpfError::Workflow(format!("Le document «{document_name}» n'est pas valide : {e}"))
    })
}
