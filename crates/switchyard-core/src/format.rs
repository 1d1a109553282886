//! Format descriptors.
//!
//! A [`Format`] is an immutable value. Handlers share canonical definitions
//! (see [`common`]) and derive their own copies with handler-specific
//! extension, direction and lossless flags via [`Format::derive`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad grouping of formats, used for listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    Archive,
    Text,
    Data,
    #[default]
    Other,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Image => "image",
            Category::Archive => "archive",
            Category::Text => "text",
            Category::Data => "data",
            Category::Other => "other",
        };
        f.write_str(name)
    }
}

/// A named point in the conversion universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    /// Human-readable label.
    pub display_name: String,
    /// Stable key; formats with the same id are the same graph node.
    pub internal_id: String,
    /// File extension without the leading dot.
    pub extension: String,
    pub mime_type: String,
    #[serde(default)]
    pub category: Category,
    /// Whether a round trip through this format preserves all bits.
    #[serde(default)]
    pub lossless: bool,
    /// Whether the declaring handler reads this format.
    #[serde(default)]
    pub can_be_source: bool,
    /// Whether the declaring handler writes this format.
    #[serde(default)]
    pub can_be_target: bool,
}

/// Fields replaced by [`Format::derive`]. `None` keeps the base value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatOverrides {
    pub extension: Option<String>,
    pub mime_type: Option<String>,
    pub lossless: Option<bool>,
    pub can_be_source: Option<bool>,
    pub can_be_target: Option<bool>,
}

impl FormatOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = Some(ext.into());
        self
    }

    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn lossless(mut self, lossless: bool) -> Self {
        self.lossless = Some(lossless);
        self
    }

    pub fn source(mut self, allowed: bool) -> Self {
        self.can_be_source = Some(allowed);
        self
    }

    pub fn target(mut self, allowed: bool) -> Self {
        self.can_be_target = Some(allowed);
        self
    }
}

impl Format {
    /// Create a canonical definition.
    ///
    /// The result declares no direction and is lossy until a handler derives
    /// a copy with its own flags.
    pub fn define(
        display_name: impl Into<String>,
        internal_id: impl Into<String>,
        extension: impl Into<String>,
        mime_type: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            internal_id: internal_id.into(),
            extension: extension.into(),
            mime_type: mime_type.into(),
            category,
            lossless: false,
            can_be_source: false,
            can_be_target: false,
        }
    }

    /// Copy this format, replacing only the fields named in `overrides`.
    pub fn derive(&self, overrides: FormatOverrides) -> Self {
        Self {
            display_name: self.display_name.clone(),
            internal_id: self.internal_id.clone(),
            extension: overrides
                .extension
                .unwrap_or_else(|| self.extension.clone()),
            mime_type: overrides
                .mime_type
                .unwrap_or_else(|| self.mime_type.clone()),
            category: self.category,
            lossless: overrides.lossless.unwrap_or(self.lossless),
            can_be_source: overrides.can_be_source.unwrap_or(self.can_be_source),
            can_be_target: overrides.can_be_target.unwrap_or(self.can_be_target),
        }
    }

    /// Derive a copy with a different extension.
    pub fn with_extension(&self, ext: impl Into<String>) -> Self {
        self.derive(FormatOverrides::new().extension(ext))
    }

    /// Derive a copy that can be read.
    pub fn allow_from(&self) -> Self {
        self.derive(FormatOverrides::new().source(true))
    }

    /// Derive a copy that can be written.
    pub fn allow_to(&self) -> Self {
        self.derive(FormatOverrides::new().target(true))
    }

    /// Derive a copy that can be both read and written.
    pub fn allow_both(&self) -> Self {
        self.derive(FormatOverrides::new().source(true).target(true))
    }

    pub fn mark_lossless(&self) -> Self {
        self.derive(FormatOverrides::new().lossless(true))
    }

    pub fn mark_lossy(&self) -> Self {
        self.derive(FormatOverrides::new().lossless(false))
    }

    /// Check that this descriptor can be registered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let malformed = |reason: &str| ConfigError::MalformedFormat {
            format: self.internal_id.clone(),
            reason: reason.to_string(),
        };

        if self.internal_id.is_empty() {
            return Err(malformed("internal id is empty"));
        }
        if self.internal_id.chars().any(char::is_whitespace) {
            return Err(malformed("internal id contains whitespace"));
        }
        if self.extension.is_empty() {
            return Err(malformed("extension is empty"));
        }
        if self.extension.starts_with('.') {
            return Err(malformed("extension must not start with a dot"));
        }
        if !self.can_be_source && !self.can_be_target {
            return Err(malformed("declares neither source nor target direction"));
        }
        Ok(())
    }

    /// Compare by graph identity.
    pub fn same_node(&self, other: &Format) -> bool {
        self.internal_id == other.internal_id
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (.{})", self.internal_id, self.extension)
    }
}

/// Canonical definitions shared across handlers.
pub mod common {
    use super::{Category, Format};

    pub fn png() -> Format {
        Format::define(
            "Portable Network Graphics",
            "png",
            "png",
            "image/png",
            Category::Image,
        )
    }

    pub fn jpeg() -> Format {
        Format::define(
            "Joint Photographic Experts Group JFIF",
            "jpeg",
            "jpg",
            "image/jpeg",
            Category::Image,
        )
    }

    pub fn webp() -> Format {
        Format::define("WebP", "webp", "webp", "image/webp", Category::Image)
    }

    pub fn gif() -> Format {
        Format::define(
            "CompuServe Graphics Interchange Format (GIF)",
            "gif",
            "gif",
            "image/gif",
            Category::Image,
        )
    }

    pub fn bmp() -> Format {
        Format::define("Windows Bitmap", "bmp", "bmp", "image/bmp", Category::Image)
    }

    pub fn json() -> Format {
        Format::define(
            "JavaScript Object Notation",
            "json",
            "json",
            "application/json",
            Category::Data,
        )
    }

    pub fn text() -> Format {
        Format::define("Plain Text", "text", "txt", "text/plain", Category::Text)
    }

    pub fn zip() -> Format {
        Format::define(
            "ZIP Archive",
            "zip",
            "zip",
            "application/zip",
            Category::Archive,
        )
    }
}
