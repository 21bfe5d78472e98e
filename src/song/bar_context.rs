// Bar Contexts - Maps every bar to its section and phrase position
// Built once per generation run and read-only afterwards

use serde::{Deserialize, Serialize};

use super::section::{Section, SectionType, SongStructure};

/// Default phrase length in bars
pub const DEFAULT_PHRASE_LENGTH: u32 = 4;

/// Where a bar sits in the song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarContext {
    /// Bar number (1-indexed)
    pub bar: u32,

    /// Enclosing section, if any
    pub section: Option<Section>,

    /// Index of the enclosing section in the song structure
    pub section_index: Option<usize>,

    /// Bar index within the section (0-indexed)
    pub bar_index_within_section: u32,

    /// Bars left in the section after this one (0 on the section's last bar)
    pub bars_until_section_end: u32,

    /// Bar index within the current phrase (0-indexed)
    pub phrase_position: u32,

    /// Phrase length used to compute `phrase_position`
    pub phrase_length: u32,

    /// Type of the section that follows this bar's section
    pub next_section_type: Option<SectionType>,
}

impl BarContext {
    /// Context for a bar that belongs to no section
    pub fn unsectioned(bar: u32, phrase_length: u32) -> Self {
        BarContext {
            bar,
            section: None,
            section_index: None,
            bar_index_within_section: 0,
            bars_until_section_end: 0,
            phrase_position: 0,
            phrase_length,
            next_section_type: None,
        }
    }

    /// Section type of the enclosing section
    pub fn section_type(&self) -> Option<SectionType> {
        self.section.as_ref().map(|s| s.section_type)
    }

    /// True when the bar has a section
    pub fn has_section(&self) -> bool {
        self.section.is_some()
    }

    /// First bar of its section
    pub fn is_section_start(&self) -> bool {
        self.has_section() && self.bar_index_within_section == 0
    }

    /// Last bar of its section
    pub fn is_section_end(&self) -> bool {
        self.has_section() && self.bars_until_section_end == 0
    }

    /// Last bar of a phrase (or of the section, whichever comes first)
    pub fn is_phrase_end(&self) -> bool {
        self.has_section()
            && (self.is_section_end() || self.phrase_position + 1 == self.phrase_length)
    }

    /// True when the bar is within the last `window` bars of its section
    pub fn in_section_end_window(&self, window: u32) -> bool {
        self.has_section() && self.bars_until_section_end < window
    }

    /// Section energy, or a neutral value outside any section
    pub fn energy(&self) -> f64 {
        self.section_type().map(|t| t.energy()).unwrap_or(0.5)
    }
}

/// Build the context for every bar of the song, in bar order
pub fn build_bar_contexts(song: &SongStructure, phrase_length: u32) -> Vec<BarContext> {
    let phrase_length = phrase_length.max(1);

    (1..=song.total_bars)
        .map(|bar| match song.active_section(bar) {
            Some((index, section)) => {
                let bar_index = bar - section.start_bar;
                let next_section_type = song
                    .active_section(section.end_bar())
                    .map(|(_, next)| next.section_type);

                BarContext {
                    bar,
                    section: Some(section.clone()),
                    section_index: Some(index),
                    bar_index_within_section: bar_index,
                    bars_until_section_end: section.bar_count - 1 - bar_index,
                    phrase_position: bar_index % phrase_length,
                    phrase_length,
                    next_section_type,
                }
            }
            None => BarContext::unsectioned(bar, phrase_length),
        })
        .collect()
}

/// Look up a bar's context from a list built by `build_bar_contexts`
pub fn context_for_bar(contexts: &[BarContext], bar: u32) -> Option<&BarContext> {
    contexts
        .get(bar.saturating_sub(1) as usize)
        .filter(|context| context.bar == bar)
        .or_else(|| contexts.iter().find(|context| context.bar == bar))
}
