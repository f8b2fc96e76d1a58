use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metadata standard a field belongs to.
///
/// A field with no category (`Option<Category>::None`) lets ExifTool pick the
/// group itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Exif,
    Iptc,
    Xmp,
}

impl Category {
    /// Group name as ExifTool spells it in tag arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Exif => "EXIF",
            Category::Iptc => "IPTC",
            Category::Xmp => "XMP",
        }
    }

    /// Parse an optional user-supplied category. Blank input means "unspecified".
    pub fn parse_optional(s: &str) -> Result<Option<Self>, UnknownCategory> {
        let s = s.trim();
        if s.is_empty() {
            Ok(None)
        } else {
            s.parse().map(Some)
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown metadata category '{}' (expected EXIF, IPTC or XMP)", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EXIF" => Ok(Category::Exif),
            "IPTC" => Ok(Category::Iptc),
            "XMP" => Ok(Category::Xmp),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

/// A resolved field: tag name plus the group it will be written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataField {
    pub name: String,
    pub category: Option<Category>,
}

impl MetadataField {
    /// Tag as used on the command line, without the leading dash or value:
    /// `IPTC:Keywords`, or just `GPSPosition` when no category is set.
    pub fn tag(&self) -> String {
        match self.category {
            Some(category) => format!("{category}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Default group for well-known field names. Unknown fields get no group.
///
/// Existing backups were written against this table, so entries must not be
/// renamed.
pub const DEFAULT_CATEGORIES: &[(&str, Option<Category>)] = &[
    ("Make", Some(Category::Exif)),
    ("Model", Some(Category::Exif)),
    ("ISO", Some(Category::Exif)),
    ("FNumber", Some(Category::Exif)),
    ("ExposureTime", Some(Category::Exif)),
    ("GPSCoordinates", None),
    ("GPSPosition", None),
    ("Headline", Some(Category::Iptc)),
    ("Caption-Abstract", Some(Category::Iptc)),
    ("Keywords", Some(Category::Iptc)),
    ("Credit", Some(Category::Iptc)),
    ("Source", Some(Category::Iptc)),
    ("Copyright", Some(Category::Exif)),
    ("CopyrightNotice", Some(Category::Iptc)),
    ("Title", Some(Category::Xmp)),
    ("Description", Some(Category::Xmp)),
    ("Creator", Some(Category::Xmp)),
    ("Rights", Some(Category::Xmp)),
    ("Subject", Some(Category::Xmp)),
    ("Rating", Some(Category::Xmp)),
    ("Artist", Some(Category::Exif)),
];

/// What an alias rule does to the category after renaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryRewrite {
    Keep,
    Clear,
}

/// Declarative rename applied after the default-category lookup.
///
/// A rule fires when the field name matches `field` and, if `only_in` is set,
/// the resolved category equals it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRule {
    pub field: &'static str,
    pub only_in: Option<Category>,
    pub rename_to: &'static str,
    pub category: CategoryRewrite,
}

impl AliasRule {
    fn matches(&self, field: &MetadataField) -> bool {
        field.name == self.field
            && self.only_in.map_or(true, |c| field.category == Some(c))
    }

    fn apply(&self, field: &mut MetadataField) {
        field.name = self.rename_to.to_string();
        if self.category == CategoryRewrite::Clear {
            field.category = None;
        }
    }
}

/// Built-in alias rules, evaluated in order.
pub fn default_rules() -> Vec<AliasRule> {
    vec![
        // ExifTool only writes the composite position tag.
        AliasRule {
            field: "GPSCoordinates",
            only_in: None,
            rename_to: "GPSPosition",
            category: CategoryRewrite::Clear,
        },
        // IPTC has no plain Copyright tag.
        AliasRule {
            field: "Copyright",
            only_in: Some(Category::Iptc),
            rename_to: "CopyrightNotice",
            category: CategoryRewrite::Keep,
        },
    ]
}

/// Maps user-supplied field names onto ExifTool tags.
#[derive(Debug, Clone)]
pub struct FieldResolver {
    defaults: Vec<(String, Option<Category>)>,
    rules: Vec<AliasRule>,
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self {
            defaults: DEFAULT_CATEGORIES
                .iter()
                .map(|(name, cat)| (name.to_string(), *cat))
                .collect(),
            rules: default_rules(),
        }
    }
}

impl FieldResolver {
    /// Append a rule after the built-in ones.
    pub fn with_rule(mut self, rule: AliasRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[AliasRule] {
        &self.rules
    }

    /// Default group for a field name, if the table knows it.
    pub fn default_category(&self, name: &str) -> Option<Category> {
        self.defaults
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, cat)| *cat)
    }

    /// Resolve a field name and optional explicit category. Never fails.
    pub fn resolve(&self, field_name: &str, explicit: Option<Category>) -> MetadataField {
        let name: String = field_name.trim().chars().filter(|c| *c != ' ').collect();
        let category = explicit.or_else(|| self.default_category(&name));

        let mut field = MetadataField { name, category };
        for rule in &self.rules {
            if rule.matches(&field) {
                rule.apply(&mut field);
            }
        }
        field
    }
}
