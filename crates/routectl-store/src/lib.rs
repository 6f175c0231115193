//! Config Store (spec §4.2): loads named config documents from an active
//! directory, holds a staging overlay of in-memory modified documents, and
//! commits the overlay to the active directory atomically.

mod atomic;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use routectl_types::{ConfigDocument, DottedPath, RouterConfError, Section};

use crate::atomic::atomic_write;

/// A Config Store instance serializes its own mutators under a single lock;
/// readers observe a consistent snapshot of the overlay (spec §4.2, §5).
pub struct ConfigStore {
    active_dir: PathBuf,
    overlay: Mutex<HashMap<String, ConfigDocument>>,
}

impl ConfigStore {
    pub fn new(active_dir: impl Into<PathBuf>) -> Self {
        Self { active_dir: active_dir.into(), overlay: Mutex::new(HashMap::new()) }
    }

    pub fn active_dir(&self) -> &Path {
        &self.active_dir
    }

    /// Returns the staged overlay if present; else reads and parses
    /// `<active_dir>/<name>`; a missing file yields an empty document.
    pub fn load(&self, name: &str) -> Result<ConfigDocument, RouterConfError> {
        if let Some(doc) = self.overlay.lock().unwrap().get(name) {
            return Ok(clone_document(doc));
        }
        self.load_from_disk(name)
    }

    fn load_from_disk(&self, name: &str) -> Result<ConfigDocument, RouterConfError> {
        let path = self.active_dir.join(name);
        if !path.exists() {
            return Ok(ConfigDocument::new());
        }
        let text = fs::read_to_string(&path).map_err(|e| RouterConfError::io(path.display().to_string(), e))?;
        routectl_codec::parse(&text)
    }

    /// Render the effective document for `name` (staged-or-disk) as text.
    pub fn show(&self, name: &str) -> Result<String, RouterConfError> {
        Ok(routectl_codec::emit(&self.load(name)?))
    }

    /// Replace any prior staged overlay for `name`.
    pub fn stage(&self, name: &str, doc: ConfigDocument) {
        self.overlay.lock().unwrap().insert(name.to_string(), doc);
    }

    pub fn get(&self, path: &str) -> Result<String, RouterConfError> {
        let dotted = DottedPath::parse(path)?;
        let Some(option) = &dotted.option else {
            return Err(RouterConfError::NotFound(format!("{path} does not address an option")));
        };
        let doc = self.load(&dotted.config)?;
        let section = resolve_section(&doc, &dotted.section)
            .ok_or_else(|| RouterConfError::NotFound(format!("section {} not found", dotted.section)))?;
        section
            .option(option)
            .map(str::to_string)
            .ok_or_else(|| RouterConfError::NotFound(format!("option {path} not found")))
    }

    /// Loads the relevant document, creates the section if missing (as a
    /// named section whose name equals the path segment), sets the option,
    /// and re-stages the document.
    pub fn set(&self, path: &str, value: &str) -> Result<(), RouterConfError> {
        let dotted = DottedPath::parse(path)?;
        let Some(option) = &dotted.option else {
            return Err(RouterConfError::NotFound(format!("{path} does not address an option")));
        };
        let mut doc = self.load(&dotted.config)?;

        if resolve_section(&doc, &dotted.section).is_none() {
            doc.push(Section::new(dotted.section.clone(), Some(dotted.section.clone())));
        }
        let section = resolve_section_mut(&mut doc, &dotted.section).expect("just inserted");
        section.set_option(option.clone(), value.to_string());

        self.stage(&dotted.config, doc);
        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        !self.overlay.lock().unwrap().is_empty()
    }

    pub fn staged_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.overlay.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn revert(&self) {
        self.overlay.lock().unwrap().clear();
    }

    /// Write every staged document to `<active_dir>/<name>` atomically. If
    /// any write fails, abort with the overlay intact and any already
    /// written files left as-is — the Transaction Engine restores via a
    /// snapshot in that case.
    pub fn commit(&self) -> Result<Vec<String>, RouterConfError> {
        let staged = self.overlay.lock().unwrap().clone();
        if staged.is_empty() {
            return Err(RouterConfError::NoChanges);
        }

        fs::create_dir_all(&self.active_dir)
            .map_err(|e| RouterConfError::io(self.active_dir.display().to_string(), e))?;

        let mut written = Vec::new();
        for (name, doc) in &staged {
            let path = self.active_dir.join(name);
            let text = routectl_codec::emit(doc);
            atomic_write(&path, text.as_bytes())
                .map_err(|e| RouterConfError::io(path.display().to_string(), e))?;
            written.push(name.clone());
        }

        self.overlay.lock().unwrap().clear();
        written.sort();
        Ok(written)
    }
}

fn clone_document(doc: &ConfigDocument) -> ConfigDocument {
    ConfigDocument { sections: doc.sections.clone() }
}

/// For named sections, `section` is the name. For an anonymous section,
/// `section` equals the type and refers to the first section of that type.
fn resolve_section<'a>(doc: &'a ConfigDocument, section: &str) -> Option<&'a Section> {
    doc.named(section).or_else(|| doc.first_of_type(section))
}

fn resolve_section_mut<'a>(doc: &'a mut ConfigDocument, section: &str) -> Option<&'a mut Section> {
    if doc.named(section).is_some() {
        return doc.named_mut(section);
    }
    doc.sections.iter_mut().find(|s| s.section_type == section)
}
