//! Catalog of known formats, unified by internal id.

use crate::format::Format;
use indexmap::IndexMap;

/// Every format declared by any registered handler.
///
/// Entries keep the first declaration seen for an id; direction flags are
/// the union over all declaring handlers.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    formats: IndexMap<String, Format>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn absorb(&mut self, format: &Format) {
        match self.formats.get_mut(&format.internal_id) {
            Some(existing) => {
                existing.can_be_source |= format.can_be_source;
                existing.can_be_target |= format.can_be_target;
            }
            None => {
                self.formats
                    .insert(format.internal_id.clone(), format.clone());
            }
        }
    }

    /// Look up a format by internal id.
    pub fn get(&self, internal_id: &str) -> Option<&Format> {
        self.formats.get(internal_id)
    }

    pub fn contains(&self, internal_id: &str) -> bool {
        self.formats.contains_key(internal_id)
    }

    /// First format (in catalog order) using the given extension.
    ///
    /// Matching ignores case and a leading dot.
    pub fn by_extension(&self, ext: &str) -> Option<&Format> {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        self.formats
            .values()
            .find(|f| f.extension.eq_ignore_ascii_case(ext))
    }

    /// Formats in first-declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Format> {
        self.formats.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}
