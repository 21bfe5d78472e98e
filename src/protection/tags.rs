// Tag Profile - Which tags are enabled for a bar
// Protection layers activate against these tags

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::song::{BarContext, SectionType};

/// Enabled on the first bar of a section
pub const TAG_SECTION_START: &str = "section_start";

/// Enabled on the last bar of a section
pub const TAG_SECTION_END: &str = "section_end";

/// Enabled on the last bar of a phrase
pub const TAG_PHRASE_END: &str = "phrase_end";

/// Enabled on bars that belong to no section
pub const TAG_UNSECTIONED: &str = "unsectioned";

/// Segment profile deciding which tags each bar enables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagProfile {
    /// Tags enabled in every bar
    #[serde(default)]
    pub global_tags: BTreeSet<String>,

    /// Extra tags per section type
    #[serde(default)]
    pub section_tags: BTreeMap<SectionType, BTreeSet<String>>,
}

impl TagProfile {
    /// Create an empty profile
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable a tag everywhere
    pub fn with_global_tag(mut self, tag: impl Into<String>) -> Self {
        self.global_tags.insert(tag.into());
        self
    }

    /// Enable a tag for one section type
    pub fn with_section_tag(mut self, section_type: SectionType, tag: impl Into<String>) -> Self {
        self.section_tags
            .entry(section_type)
            .or_default()
            .insert(tag.into());
        self
    }

    /// All tags enabled for a bar
    ///
    /// Section bars enable their section type name (e.g. `"chorus"`), the
    /// section's own tags, the profile's tags for that type and boundary tags.
    pub fn enabled_tags(&self, context: &BarContext) -> BTreeSet<String> {
        let mut tags = self.global_tags.clone();

        let Some(section) = &context.section else {
            tags.insert(TAG_UNSECTIONED.to_string());
            return tags;
        };

        tags.insert(section.section_type.to_str().to_string());
        tags.extend(section.tags.iter().cloned());
        if let Some(extra) = self.section_tags.get(&section.section_type) {
            tags.extend(extra.iter().cloned());
        }

        if context.is_section_start() {
            tags.insert(TAG_SECTION_START.to_string());
        }
        if context.is_section_end() {
            tags.insert(TAG_SECTION_END.to_string());
        }
        if context.is_phrase_end() {
            tags.insert(TAG_PHRASE_END.to_string());
        }

        tags
    }
}
