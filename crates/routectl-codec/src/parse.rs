//! Line-oriented grammar parser (spec §4.1).

use routectl_types::{ConfigDocument, RouterConfError, Section};

use crate::tokenize::tokenize;

/// Parse a complete config document from its textual form.
pub fn parse(input: &str) -> Result<ConfigDocument, RouterConfError> {
    let mut doc = ConfigDocument::new();
    let mut current: Option<Section> = None;

    for (idx, raw_line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw_line.trim_start();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let tokens = tokenize(raw_line)
            .map_err(|detail| RouterConfError::ParseError { line: line_no, detail })?;
        let Some((keyword, rest)) = tokens.split_first() else { continue };

        match keyword.as_str() {
            "config" => {
                if let Some(section) = current.take() {
                    doc.push(section);
                }
                match rest {
                    [section_type] => current = Some(Section::new(section_type.clone(), None)),
                    [section_type, name] => {
                        current = Some(Section::new(section_type.clone(), Some(name.clone())))
                    }
                    _ => {
                        return Err(RouterConfError::ParseError {
                            line: line_no,
                            detail: "config requires a type and optional name".to_string(),
                        });
                    }
                }
            }
            "option" => {
                let [key, value] = rest else {
                    return Err(RouterConfError::ParseError {
                        line: line_no,
                        detail: "option requires exactly a key and a value".to_string(),
                    });
                };
                let Some(section) = current.as_mut() else {
                    return Err(RouterConfError::ParseError {
                        line: line_no,
                        detail: "option before any config".to_string(),
                    });
                };
                section.set_option(key.clone(), value.clone());
            }
            "list" => {
                let [key, value] = rest else {
                    return Err(RouterConfError::ParseError {
                        line: line_no,
                        detail: "list requires exactly a key and a value".to_string(),
                    });
                };
                let Some(section) = current.as_mut() else {
                    return Err(RouterConfError::ParseError {
                        line: line_no,
                        detail: "list before any config".to_string(),
                    });
                };
                section.push_list(key.clone(), value.clone());
            }
            other => {
                return Err(RouterConfError::ParseError {
                    line: line_no,
                    detail: format!("unrecognized directive: {other}"),
                });
            }
        }
    }

    if let Some(section) = current.take() {
        doc.push(section);
    }

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_section_with_options_and_lists() {
        let input = "config interface 'wan'\n\toption proto 'static'\n\toption ipaddr '192.168.1.1'\n\tlist dns '8.8.8.8'\n\tlist dns '8.8.4.4'\n";
        let doc = parse(input).expect("parse");
        assert_eq!(doc.sections.len(), 1);
        let s = &doc.sections[0];
        assert_eq!(s.section_type, "interface");
        assert_eq!(s.name.as_deref(), Some("wan"));
        assert_eq!(s.option("proto"), Some("static"));
        assert_eq!(s.lists.get("dns").unwrap(), &vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()]);
    }

    #[test]
    fn ignores_blank_lines_and_comments() {
        let input = "# a comment\n\nconfig defaults\n\toption input 'accept'\n";
        let doc = parse(input).expect("parse");
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].name, None);
    }

    #[test]
    fn rejects_option_before_any_config() {
        let err = parse("option foo bar\n").unwrap_err();
        assert!(matches!(err, RouterConfError::ParseError { line: 1, .. }));
    }

    #[test]
    fn rejects_unrecognized_directive() {
        let err = parse("frobnicate x y\n").unwrap_err();
        assert!(matches!(err, RouterConfError::ParseError { .. }));
    }

    #[test]
    fn rejects_malformed_config_line() {
        let err = parse("config a b c\n").unwrap_err();
        assert!(matches!(err, RouterConfError::ParseError { .. }));
    }

    #[test]
    fn bare_and_quoted_names_both_accepted() {
        let doc = parse("config interface wan\n").expect("parse");
        assert_eq!(doc.sections[0].name.as_deref(), Some("wan"));
    }

    #[test]
    fn missing_file_content_is_empty_document() {
        let doc = parse("").expect("parse");
        assert!(doc.sections.is_empty());
    }
}
