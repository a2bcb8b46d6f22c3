//! Analysis-wide tuning knobs, threaded explicitly rather than read from
//! process globals.

/// Thresholds bounding how eagerly the domains enumerate concrete
/// possibilities before collapsing to an abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisConfig {
    /// Above this many concrete values, a disjunction of explicit values
    /// collapses to the covering interval/BDD instead of being enumerated.
    pub explicit_threshold: usize,
    /// Above this many distinct heap regions live at once, new allocation
    /// sites are folded into an existing `Heap` id instead of minted fresh.
    pub heap_threshold: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            explicit_threshold: 5,
            heap_threshold: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.explicit_threshold, 5);
        assert_eq!(cfg.heap_threshold, 5);
    }
}
