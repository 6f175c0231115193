//! `ConfigDocument` / `Section` — the in-memory shape of a parsed config file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single value assigned to an `option` key within a section.
pub type OptionMap = BTreeMap<String, String>;

/// An ordered, multi-valued assignment made via `list` lines within a section.
pub type ListMap = BTreeMap<String, Vec<String>>;

/// One `config <type> [<name>]` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Section {
    /// Short identifier, e.g. `interface`, `rule`, `zone`, `dhcp`, `host`, `defaults`.
    pub section_type: String,
    /// Absent for an anonymous section, addressed positionally by type.
    pub name: Option<String>,
    pub options: OptionMap,
    pub lists: ListMap,
}

impl Section {
    pub fn new(section_type: impl Into<String>, name: Option<String>) -> Self {
        Self {
            section_type: section_type.into(),
            name,
            options: OptionMap::new(),
            lists: ListMap::new(),
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(&self.name, Some(n) if !n.is_empty())
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    pub fn push_list(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.lists.entry(key.into()).or_default().push(value.into());
    }

    fn semantic_key(&self) -> (String, String, OptionMap, ListMap) {
        (
            self.section_type.clone(),
            self.name.clone().unwrap_or_default(),
            self.options.clone(),
            self.lists.clone(),
        )
    }
}

/// An ordered sequence of sections, as read from or about to be written to
/// a single named config file (`network`, `firewall`, `dhcp`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub sections: Vec<Section>,
}

/// The full set of config documents committed in a transaction, keyed by
/// config name — handed to every applier so one applier (DHCP) can read
/// another's document (network) without the engine wiring a bespoke
/// side-channel per applier pair.
pub type ConfigBundle = BTreeMap<String, ConfigDocument>;

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// All sections of a given type, in declaration order.
    pub fn sections_of_type<'a>(&'a self, section_type: &str) -> impl Iterator<Item = &'a Section> {
        self.sections.iter().filter(move |s| s.section_type == section_type)
    }

    /// The first section of a given type — the "anonymous" read target.
    pub fn first_of_type(&self, section_type: &str) -> Option<&Section> {
        self.sections_of_type(section_type).next()
    }

    /// A named section by (type is implied by callers already knowing it; name is unique
    /// across the whole document per the format's invariant).
    pub fn named(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name.as_deref() == Some(name))
    }

    pub fn named_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name.as_deref() == Some(name))
    }

    pub fn push(&mut self, section: Section) {
        self.sections.push(section);
    }

    /// Semantic equality per the format's contract: same multiset of sections
    /// matching on (type, name, options, lists). Section *order* is preserved
    /// structurally by `sections: Vec<Section>` but is not part of equality —
    /// only the round-trip parse/emit content is compared this way.
    pub fn semantically_eq(&self, other: &ConfigDocument) -> bool {
        let mut mine: Vec<_> = self.sections.iter().map(Section::semantic_key).collect();
        let mut theirs: Vec<_> = other.sections.iter().map(Section::semantic_key).collect();
        mine.sort();
        theirs.sort();
        mine == theirs
    }
}
