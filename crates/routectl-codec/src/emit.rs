//! Emitter: the inverse of `parse`, producing text the parser accepts
//! unchanged in semantic content (spec §4.1's round-trip contract).

use routectl_types::{ConfigDocument, Section};

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "\\'"))
}

fn push_section(out: &mut String, section: &Section) {
    match &section.name {
        Some(name) if !name.is_empty() => {
            out.push_str(&format!("config {} {}\n", section.section_type, quote(name)));
        }
        _ => out.push_str(&format!("config {}\n", section.section_type)),
    }

    for (key, value) in &section.options {
        out.push_str(&format!("\toption {} {}\n", key, quote(value)));
    }
    for (key, values) in &section.lists {
        for value in values {
            out.push_str(&format!("\tlist {} {}\n", key, quote(value)));
        }
    }
}

/// Emit a config document to its textual form.
pub fn emit(doc: &ConfigDocument) -> String {
    let mut out = String::new();
    for (idx, section) in doc.sections.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        push_section(&mut out, section);
    }
    out
}
