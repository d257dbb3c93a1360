//! Token usage accumulation across a stream

use crate::types::Usage;

/// Folds the partial usage values seen during one session
///
/// Providers that report once pass through unchanged. Providers that
/// split the report (prompt at start, completion at end) are merged, with
/// the total recomputed from the parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageAggregator {
    current: Option<Usage>,
}

impl UsageAggregator {
    pub const fn new() -> Self {
        Self { current: None }
    }

    pub fn observe(&mut self, usage: &Usage) {
        let merged = match self.current {
            None => *usage,
            Some(previous) => Usage {
                prompt_tokens: latest(previous.prompt_tokens, usage.prompt_tokens),
                completion_tokens: latest(previous.completion_tokens, usage.completion_tokens),
                total_tokens: 0,
                completion_tokens_details: usage
                    .completion_tokens_details
                    .or(previous.completion_tokens_details),
            },
        };

        self.current = Some(Usage {
            total_tokens: merged.prompt_tokens.saturating_add(merged.completion_tokens),
            ..merged
        });
    }

    /// Final usage, if any was reported
    pub const fn finish(&self) -> Option<Usage> {
        self.current
    }
}

/// A zero reading never erases an earlier non-zero one
const fn latest(previous: u32, next: u32) -> u32 {
    if next == 0 { previous } else { next }
}

/// Aggregate an ordered sequence of partial usage values
pub fn aggregate<'a>(partials: impl IntoIterator<Item = &'a Usage>) -> Option<Usage> {
    let mut aggregator = UsageAggregator::new();
    for usage in partials {
        aggregator.observe(usage);
    }
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_report_is_unchanged() {
        let usage = Usage::new(12, 30).with_reasoning_tokens(4);
        assert_eq!(aggregate([&usage]), Some(usage));
    }

    #[test]
    fn split_report_is_merged() {
        let start = Usage::new(10, 0);
        let end = Usage {
            prompt_tokens: 0,
            completion_tokens: 3,
            total_tokens: 3,
            completion_tokens_details: None,
        };

        assert_eq!(aggregate([&start, &end]), Some(Usage::new(10, 3)));
    }

    #[test]
    fn later_reports_supersede_earlier_ones() {
        let partials = [Usage::new(10, 1), Usage::new(10, 2), Usage::new(10, 7)];
        assert_eq!(aggregate(&partials), Some(Usage::new(10, 7)));
    }

    #[test]
    fn inconsistent_totals_are_recomputed() {
        let odd = Usage {
            prompt_tokens: 2,
            completion_tokens: 2,
            total_tokens: 99,
            completion_tokens_details: None,
        };
        assert_eq!(aggregate([&odd]).map(|usage| usage.total_tokens), Some(4));
    }

    #[test]
    fn no_reports_no_usage() {
        assert_eq!(aggregate(std::iter::empty()), None);
    }
}
