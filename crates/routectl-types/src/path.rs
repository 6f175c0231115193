//! `DottedPath` — `config.section.option` addressing.

use crate::error::RouterConfError;

/// A parsed `config.section[.option]` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedPath {
    pub config: String,
    pub section: String,
    pub option: Option<String>,
}

impl DottedPath {
    /// Parse `config.section` (whole-section address) or `config.section.option`
    /// (single-option address). Any other shape is malformed.
    pub fn parse(path: &str) -> Result<Self, RouterConfError> {
        let parts: Vec<&str> = path.split('.').collect();
        match parts.as_slice() {
            [config, section] if !config.is_empty() && !section.is_empty() => Ok(Self {
                config: config.to_string(),
                section: section.to_string(),
                option: None,
            }),
            [config, section, option] if !config.is_empty() && !section.is_empty() && !option.is_empty() => {
                Ok(Self {
                    config: config.to_string(),
                    section: section.to_string(),
                    option: Some(option.to_string()),
                })
            }
            _ => Err(RouterConfError::NotFound(format!("malformed path: {path}"))),
        }
    }

    pub fn is_section_path(&self) -> bool {
        self.option.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_section_path() {
        let p = DottedPath::parse("network.wan").expect("parse");
        assert_eq!(p.config, "network");
        assert_eq!(p.section, "wan");
        assert_eq!(p.option, None);
    }

    #[test]
    fn parses_option_path() {
        let p = DottedPath::parse("network.wan.ipaddr").expect("parse");
        assert_eq!(p.option.as_deref(), Some("ipaddr"));
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(DottedPath::parse("network").is_err());
        assert!(DottedPath::parse("network.wan.ipaddr.extra").is_err());
        assert!(DottedPath::parse("..").is_err());
        assert!(DottedPath::parse("").is_err());
    }
}
