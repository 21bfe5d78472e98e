// Song Sections - Where each section starts and how long it runs
// Provides the section-track lookups the bar context builder needs

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors in a song structure definition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SongStructureError {
    #[error("Song structure has no bars")]
    NoBars,

    #[error("Song structure has no sections")]
    NoSections,

    #[error("Section {index} starts at bar 0 (bars are 1-indexed)")]
    ZeroStartBar { index: usize },

    #[error("Section {index} has zero length")]
    EmptySection { index: usize },

    #[error("Sections {first} and {second} overlap at bar {bar}")]
    Overlap { first: usize, second: usize, bar: u32 },

    #[error("Section {index} ends at bar {end_bar}, past the last bar {total_bars}")]
    PastEnd { index: usize, end_bar: u32, total_bars: u32 },
}

/// Type of song section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    /// Introduction section
    Intro,

    /// Main verse section
    Verse,

    /// Build into the chorus
    PreChorus,

    /// Chorus / hook section
    Chorus,

    /// Contrasting bridge
    Bridge,

    /// Stripped-back breakdown
    Breakdown,

    /// Instrumental solo
    Solo,

    /// Outro/ending section
    Outro,
}

impl SectionType {
    /// Convert from string representation
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "intro" => Some(SectionType::Intro),
            "verse" => Some(SectionType::Verse),
            "pre_chorus" | "prechorus" => Some(SectionType::PreChorus),
            "chorus" => Some(SectionType::Chorus),
            "bridge" => Some(SectionType::Bridge),
            "breakdown" => Some(SectionType::Breakdown),
            "solo" => Some(SectionType::Solo),
            "outro" => Some(SectionType::Outro),
            _ => None,
        }
    }

    /// Convert to string representation (also used as the section's tag)
    pub fn to_str(&self) -> &'static str {
        match self {
            SectionType::Intro => "intro",
            SectionType::Verse => "verse",
            SectionType::PreChorus => "pre_chorus",
            SectionType::Chorus => "chorus",
            SectionType::Bridge => "bridge",
            SectionType::Breakdown => "breakdown",
            SectionType::Solo => "solo",
            SectionType::Outro => "outro",
        }
    }

    /// Relative energy used to scale operator density [0.0, 1.0]
    pub fn energy(&self) -> f64 {
        match self {
            SectionType::Intro => 0.4,
            SectionType::Verse => 0.6,
            SectionType::PreChorus => 0.75,
            SectionType::Chorus => 1.0,
            SectionType::Bridge => 0.7,
            SectionType::Breakdown => 0.3,
            SectionType::Solo => 0.9,
            SectionType::Outro => 0.5,
        }
    }
}

/// A song section occupying a run of bars
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// First bar of the section (1-indexed)
    pub start_bar: u32,

    /// Length in bars
    pub bar_count: u32,

    /// Section type
    pub section_type: SectionType,

    /// Extra tags enabled for every bar of this section
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Section {
    /// Create a new section
    pub fn new(start_bar: u32, bar_count: u32, section_type: SectionType) -> Self {
        Section {
            start_bar,
            bar_count,
            section_type,
            tags: Vec::new(),
        }
    }

    /// Add a tag enabled throughout the section
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// First bar after the section
    pub fn end_bar(&self) -> u32 {
        self.start_bar + self.bar_count
    }

    /// Last bar inside the section
    pub fn last_bar(&self) -> u32 {
        self.end_bar().saturating_sub(1)
    }

    /// Check if a bar number falls within this section
    pub fn contains_bar(&self, bar: u32) -> bool {
        bar >= self.start_bar && bar < self.end_bar()
    }
}

/// Complete section layout of a song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongStructure {
    /// All sections in song order
    pub sections: Vec<Section>,

    /// Total number of bars in the song
    pub total_bars: u32,
}

impl SongStructure {
    /// Create a new empty structure
    pub fn new(total_bars: u32) -> Self {
        SongStructure {
            sections: Vec::new(),
            total_bars,
        }
    }

    /// Add a section to the structure
    pub fn add_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    /// Builder-style section append
    pub fn with_section(mut self, section: Section) -> Self {
        self.add_section(section);
        self
    }

    /// Lay out sections back to back starting at bar 1
    pub fn sequential(layout: &[(SectionType, u32)]) -> Self {
        let mut structure = SongStructure::new(layout.iter().map(|(_, bars)| bars).sum());
        let mut start_bar = 1;
        for (section_type, bar_count) in layout {
            structure.add_section(Section::new(start_bar, *bar_count, *section_type));
            start_bar += bar_count;
        }
        structure
    }

    /// Get the active section (and its index) for a bar
    pub fn active_section(&self, bar: u32) -> Option<(usize, &Section)> {
        self.sections
            .iter()
            .enumerate()
            .find(|(_, section)| section.contains_bar(bar))
    }

    /// Create a simple verse/chorus structure based on bar count
    pub fn default_structure(total_bars: u32) -> Self {
        match total_bars {
            0 => SongStructure::new(0),
            1..=8 => SongStructure::sequential(&[(SectionType::Verse, total_bars)]),
            9..=16 => SongStructure::sequential(&[
                (SectionType::Verse, 8),
                (SectionType::Chorus, total_bars - 8),
            ]),
            _ => {
                let outro = 4.min(total_bars - 16);
                let mut layout = vec![
                    (SectionType::Intro, 4),
                    (SectionType::Verse, 8),
                    (SectionType::Chorus, 4),
                ];
                let middle = total_bars - 16 - outro;
                if middle > 0 {
                    layout.push((SectionType::Chorus, middle));
                }
                if outro > 0 {
                    layout.push((SectionType::Outro, outro));
                }
                SongStructure::sequential(&layout)
            }
        }
    }

    /// Validate that the structure is usable for generation
    /// - At least one bar and one section
    /// - Bars are 1-indexed and sections are non-empty
    /// - No overlapping sections, none past the last bar
    ///
    /// Gaps between sections are allowed; those bars simply have no section.
    pub fn validate(&self) -> Result<(), SongStructureError> {
        if self.total_bars == 0 {
            return Err(SongStructureError::NoBars);
        }
        if self.sections.is_empty() {
            return Err(SongStructureError::NoSections);
        }

        for (index, section) in self.sections.iter().enumerate() {
            if section.start_bar == 0 {
                return Err(SongStructureError::ZeroStartBar { index });
            }
            if section.bar_count == 0 {
                return Err(SongStructureError::EmptySection { index });
            }
            if section.last_bar() > self.total_bars {
                return Err(SongStructureError::PastEnd {
                    index,
                    end_bar: section.last_bar(),
                    total_bars: self.total_bars,
                });
            }
        }

        let mut ordered: Vec<(usize, &Section)> = self.sections.iter().enumerate().collect();
        ordered.sort_by_key(|(_, section)| section.start_bar);

        for pair in ordered.windows(2) {
            let (first, current) = pair[0];
            let (second, next) = pair[1];
            if next.start_bar < current.end_bar() {
                return Err(SongStructureError::Overlap {
                    first,
                    second,
                    bar: next.start_bar,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_creation() {
        let section = Section::new(5, 4, SectionType::Chorus);
        assert_eq!(section.end_bar(), 9);
        assert_eq!(section.last_bar(), 8);
        assert!(!section.contains_bar(4));
        assert!(section.contains_bar(5));
        assert!(section.contains_bar(8));
        assert!(!section.contains_bar(9));
    }

    #[test]
    fn test_section_type_conversion() {
        assert_eq!(SectionType::from_string("Pre-Chorus"), Some(SectionType::PreChorus));
        assert_eq!(SectionType::from_string("chorus"), Some(SectionType::Chorus));
        assert_eq!(SectionType::from_string("kazoo"), None);
        assert_eq!(SectionType::Verse.to_str(), "verse");
    }

    #[test]
    fn test_sequential_layout() {
        let song = SongStructure::sequential(&[(SectionType::Verse, 8), (SectionType::Chorus, 8)]);
        assert_eq!(song.total_bars, 16);
        assert_eq!(song.sections[1].start_bar, 9);

        let (index, section) = song.active_section(12).unwrap();
        assert_eq!(index, 1);
        assert_eq!(section.section_type, SectionType::Chorus);
        assert!(song.active_section(17).is_none());
    }

    #[test]
    fn test_default_structures_are_valid() {
        for bar_count in [4, 8, 12, 16, 17, 20, 24, 32] {
            let structure = SongStructure::default_structure(bar_count);
            assert!(
                structure.validate().is_ok(),
                "Default structure for {} bars should be valid",
                bar_count
            );
            let covered: u32 = structure.sections.iter().map(|s| s.bar_count).sum();
            assert_eq!(covered, bar_count);
        }
    }

    #[test]
    fn test_validate_errors() {
        assert_eq!(SongStructure::new(0).validate(), Err(SongStructureError::NoBars));
        assert_eq!(SongStructure::new(8).validate(), Err(SongStructureError::NoSections));

        let zero_start = SongStructure::new(8).with_section(Section::new(0, 4, SectionType::Verse));
        assert_eq!(zero_start.validate(), Err(SongStructureError::ZeroStartBar { index: 0 }));

        let empty = SongStructure::new(8).with_section(Section::new(1, 0, SectionType::Verse));
        assert_eq!(empty.validate(), Err(SongStructureError::EmptySection { index: 0 }));

        let overlap = SongStructure::new(8)
            .with_section(Section::new(1, 4, SectionType::Verse))
            .with_section(Section::new(4, 4, SectionType::Chorus));
        assert!(matches!(overlap.validate(), Err(SongStructureError::Overlap { bar: 4, .. })));

        let past_end = SongStructure::new(8).with_section(Section::new(5, 8, SectionType::Verse));
        assert!(matches!(past_end.validate(), Err(SongStructureError::PastEnd { .. })));
    }

    #[test]
    fn test_gaps_are_allowed() {
        let song = SongStructure::new(12)
            .with_section(Section::new(1, 4, SectionType::Verse))
            .with_section(Section::new(9, 4, SectionType::Chorus));
        assert!(song.validate().is_ok());
        assert!(song.active_section(6).is_none());
    }
}
