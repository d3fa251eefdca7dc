//! Waste categorization of vision API labels.
//!
//! Labels are matched against fixed keyword lists. In [`ClassifyMode::Trash`]
//! the categories are tried in priority order (Landfill, Recycle, Paper,
//! Compost) and the first one with any matching label wins, regardless of
//! label confidence. [`ClassifyMode::Bin`] only checks whether a trash can
//! is in the picture.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::ClassifierConfig;

/// A label returned by the vision service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Label {
    pub description: String,
    /// Confidence in 0..=1
    pub score: f64,
}

impl Label {
    pub fn new(description: &str, score: f64) -> Self {
        Self {
            description: description.to_string(),
            score,
        }
    }
}

/// What the photo is being checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum ClassifyMode {
    /// Which bin does this item go in?
    Trash,
    /// Is there a bin in this picture?
    Bin,
}

/// Result categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum WasteCategory {
    Landfill,
    Recycle,
    Paper,
    Compost,
    TrashCan,
}

impl WasteCategory {
    /// Display name shown to the user.
    pub fn name(&self) -> &'static str {
        match self {
            WasteCategory::Landfill => "Landfill",
            WasteCategory::Recycle => "Recycle",
            WasteCategory::Paper => "Paper",
            WasteCategory::Compost => "Compost",
            WasteCategory::TrashCan => "Trash Can",
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            WasteCategory::Landfill => LANDFILL_KEYWORDS,
            WasteCategory::Recycle => RECYCLE_KEYWORDS,
            WasteCategory::Paper => PAPER_KEYWORDS,
            WasteCategory::Compost => COMPOST_KEYWORDS,
            WasteCategory::TrashCan => TRASH_CAN_KEYWORDS,
        }
    }
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Priority order for trash mode.
pub const TRASH_PRIORITY: [WasteCategory; 4] = [
    WasteCategory::Landfill,
    WasteCategory::Recycle,
    WasteCategory::Paper,
    WasteCategory::Compost,
];

const LANDFILL_KEYWORDS: &[&str] = &[
    "plastic bag",
    "plastic wrap",
    "chip bag",
    "wrapper",
    "candy wrapper",
    "styrofoam",
    "polystyrene",
    "foam",
    "straw",
    "diaper",
    "cigarette",
    "ceramic",
    "rubber",
    "balloon",
    "chewing gum",
    "toothbrush",
];

const RECYCLE_KEYWORDS: &[&str] = &[
    "aluminum",
    "aluminium",
    "can",
    "tin",
    "tin can",
    "beverage can",
    "bottle",
    "plastic bottle",
    "water bottle",
    "glass",
    "glass bottle",
    "jar",
    "metal",
    "steel",
    "plastic container",
    "jug",
];

const PAPER_KEYWORDS: &[&str] = &[
    "paper",
    "cardboard",
    "newspaper",
    "magazine",
    "envelope",
    "carton",
    "paper bag",
    "box",
    "notebook",
    "receipt",
    "book",
    "mail",
];

const COMPOST_KEYWORDS: &[&str] = &[
    "banana",
    "apple",
    "fruit",
    "vegetable",
    "food",
    "peel",
    "eggshell",
    "coffee grounds",
    "tea bag",
    "bread",
    "leaf",
    "plant",
    "produce",
    "natural foods",
    "citrus",
    "core",
];

const TRASH_CAN_KEYWORDS: &[&str] = &[
    "waste container",
    "trash can",
    "garbage can",
    "waste bin",
    "recycling bin",
    "wastebasket",
    "litter bin",
    "dumpster",
    "bin",
    "trash",
    "garbage",
    "waste",
    "waste containment",
];

/// Lowercase a label and split it into alphanumeric words.
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whole-word phrase match: every word of `keyword`, contiguous, in `label`.
pub fn label_matches(label: &str, keyword: &str) -> bool {
    let label_words = words(label);
    let keyword_words = words(keyword);
    if keyword_words.is_empty() || keyword_words.len() > label_words.len() {
        return false;
    }
    label_words
        .windows(keyword_words.len())
        .any(|window| window == keyword_words.as_slice())
}

/// Whether any of the labels matches the category's keyword list.
pub fn matches_category(labels: &[&str], category: WasteCategory) -> bool {
    labels.iter().any(|label| {
        category
            .keywords()
            .iter()
            .any(|keyword| label_matches(label, keyword))
    })
}

/// Categorize plain label texts.
///
/// First match in priority order, not highest confidence.
pub fn classify_labels(labels: &[&str], mode: ClassifyMode) -> Option<WasteCategory> {
    let result = match mode {
        ClassifyMode::Trash => TRASH_PRIORITY
            .iter()
            .copied()
            .find(|category| matches_category(labels, *category)),
        ClassifyMode::Bin => matches_category(labels, WasteCategory::TrashCan)
            .then_some(WasteCategory::TrashCan),
    };
    debug!("[Classifier] {:?} {:?} -> {:?}", mode, labels, result);
    result
}

/// Categorize scored labels, ignoring those under the configured confidence.
pub fn classify_scored(
    labels: &[Label],
    mode: ClassifyMode,
    config: &ClassifierConfig,
) -> Option<WasteCategory> {
    let kept: Vec<&str> = labels
        .iter()
        .filter(|l| l.score >= config.min_confidence)
        .map(|l| l.description.as_str())
        .collect();
    classify_labels(&kept, mode)
}
