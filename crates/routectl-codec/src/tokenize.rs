//! Whitespace/quote-aware tokenizer shared by the line parser.

/// Split a single grammar line into whitespace-separated tokens, honoring
/// `'` and `\"` quoted tokens (which may contain spaces) with backslash
/// escaping of the enclosing quote character.
pub(crate) fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else { break };

        if first == '\'' || first == '"' {
            let quote = first;
            chars.next();
            let mut token = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                if c == '\\' && chars.peek() == Some(&quote) {
                    token.push(quote);
                    chars.next();
                } else if c == quote {
                    closed = true;
                    break;
                } else {
                    token.push(c);
                }
            }
            if !closed {
                return Err(format!("unterminated quoted token: {line}"));
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while matches!(chars.peek(), Some(c) if !c.is_whitespace()) {
                token.push(chars.next().unwrap());
            }
            tokens.push(token);
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_bare_tokens() {
        assert_eq!(tokenize("config interface wan").unwrap(), vec!["config", "interface", "wan"]);
    }

    #[test]
    fn handles_single_quoted_token_with_spaces() {
        assert_eq!(tokenize("option desc 'hello world'").unwrap(), vec!["option", "desc", "hello world"]);
    }

    #[test]
    fn handles_escaped_quote_inside_single_quotes() {
        assert_eq!(tokenize(r"option desc 'it\'s fine'").unwrap(), vec!["option", "desc", "it's fine"]);
    }

    #[test]
    fn handles_double_quoted_token() {
        assert_eq!(tokenize("option desc \"hi there\"").unwrap(), vec!["option", "desc", "hi there"]);
    }

    #[test]
    fn rejects_unterminated_quote() {
        assert!(tokenize("option desc 'unterminated").is_err());
    }
}
