use serde::{Deserialize, Serialize};

/// Qualitative performance bucket derived from a percentage score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceTier {
    Excellent,
    Great,
    Good,
    Average,
    NeedsImprovement,
}

/// Lower bounds, evaluated high to low; first match wins.
const TIER_THRESHOLDS: [(u32, PerformanceTier); 4] = [
    (90, PerformanceTier::Excellent),
    (75, PerformanceTier::Great),
    (60, PerformanceTier::Good),
    (50, PerformanceTier::Average),
];

impl PerformanceTier {
    pub fn from_percentage(percentage: u32) -> Self {
        TIER_THRESHOLDS
            .iter()
            .find(|(min, _)| percentage >= *min)
            .map(|(_, tier)| *tier)
            .unwrap_or(PerformanceTier::NeedsImprovement)
    }

    pub fn message(&self) -> &'static str {
        match self {
            PerformanceTier::Excellent => "Outstanding!",
            PerformanceTier::Great => "Great job!",
            PerformanceTier::Good => "Good work!",
            PerformanceTier::Average => "Not bad, keep practicing.",
            PerformanceTier::NeedsImprovement => "Keep at it, you'll get there.",
        }
    }

    /// Parses the identifier produced by `Display`.
    pub fn from_id(id: &str) -> Option<Self> {
        [
            PerformanceTier::Excellent,
            PerformanceTier::Great,
            PerformanceTier::Good,
            PerformanceTier::Average,
            PerformanceTier::NeedsImprovement,
        ]
        .into_iter()
        .find(|t| t.to_string() == id)
    }
}
