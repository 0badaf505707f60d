use serde_json::Value;
use thiserror::Error;

use crate::types::{WagerChoice, WagerStateView, WagerView};

/// Tolerance for the final cumulative threshold reaching 1.0.
const THRESHOLD_EPSILON: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum RewardTableError {
    #[error("reward table must declare at least one tier")]
    Empty,
    #[error("tier {index} threshold {threshold} is outside (0, 1]")]
    ThresholdOutOfRange { index: usize, threshold: f64 },
    #[error("tier {index} threshold {threshold} is below the previous tier")]
    NonMonotonic { index: usize, threshold: f64 },
    #[error("final cumulative threshold is {threshold}, expected 1.0")]
    FinalThresholdNotOne { threshold: f64 },
}

/// One reward bucket: matched when the draw falls below its cumulative
/// threshold and at or above every earlier threshold. The payout spec is
/// opaque here; granting it is the persistence collaborator's job.
#[derive(Clone, Debug)]
pub struct RewardTier {
    pub threshold: f64,
    pub tier: String,
    pub payout_spec: Value,
}

/// Ordered cumulative-probability tier table, validated once at construction.
/// A malformed table is a programmer error and fails loudly here rather than
/// being clamped at resolve time.
#[derive(Clone, Debug)]
pub struct RewardTable {
    tiers: Vec<RewardTier>,
}

impl RewardTable {
    pub fn new(tiers: Vec<RewardTier>) -> Result<Self, RewardTableError> {
        if tiers.is_empty() {
            return Err(RewardTableError::Empty);
        }
        let mut previous = 0.0f64;
        for (index, tier) in tiers.iter().enumerate() {
            if !tier.threshold.is_finite()
                || tier.threshold <= 0.0
                || tier.threshold > 1.0 + THRESHOLD_EPSILON
            {
                return Err(RewardTableError::ThresholdOutOfRange {
                    index,
                    threshold: tier.threshold,
                });
            }
            if tier.threshold < previous {
                return Err(RewardTableError::NonMonotonic {
                    index,
                    threshold: tier.threshold,
                });
            }
            previous = tier.threshold;
        }
        let last = tiers.last().map(|tier| tier.threshold).unwrap_or(0.0);
        if (last - 1.0).abs() > THRESHOLD_EPSILON {
            return Err(RewardTableError::FinalThresholdNotOne { threshold: last });
        }
        Ok(Self { tiers })
    }

    /// Fixed 70/25/5 bands used by the tiered slot mechanic.
    pub fn standard_slot() -> Self {
        Self::new(vec![
            RewardTier {
                threshold: 0.70,
                tier: "common".to_string(),
                payout_spec: serde_json::json!({ "coins": 5 }),
            },
            RewardTier {
                threshold: 0.95,
                tier: "rare".to_string(),
                payout_spec: serde_json::json!({ "coins": 30 }),
            },
            RewardTier {
                threshold: 1.0,
                tier: "legendary".to_string(),
                payout_spec: serde_json::json!({ "coins": 200 }),
            },
        ])
        .expect("built-in table is well-formed")
    }

    /// Maps a draw in `[0, 1)` to the first tier whose cumulative threshold
    /// strictly exceeds it. A draw of exactly a threshold value therefore
    /// lands in the *next* tier.
    pub fn resolve(&self, draw: f64) -> &RewardTier {
        debug_assert!((0.0..1.0).contains(&draw), "draw out of range: {draw}");
        self.tiers
            .iter()
            .find(|tier| tier.threshold > draw)
            .unwrap_or_else(|| {
                // only reachable when draw sits inside the final epsilon band
                self.tiers.last().expect("validated table is non-empty")
            })
    }

    pub fn tiers(&self) -> &[RewardTier] {
        &self.tiers
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WagerState {
    AwaitingGuess,
    Won,
    Lost,
    Claimed,
}

/// Session-scoped escalating wager: guess, then either bank the payout or
/// double the multiplier and redraw. The resolver stays stateless; this
/// machine only tracks the legal action set. Draws are injected so a
/// server-authoritative source can replace client-side chance.
#[derive(Clone, Debug)]
pub struct WagerRound {
    state: WagerState,
    base_payout: i64,
    multiplier: i64,
    streak: u32,
}

impl WagerRound {
    pub fn new(base_payout: i64) -> Self {
        Self {
            state: WagerState::AwaitingGuess,
            base_payout,
            multiplier: 1,
            streak: 0,
        }
    }

    pub fn state(&self) -> WagerState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, WagerState::Lost | WagerState::Claimed)
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn potential_payout(&self) -> i64 {
        self.base_payout.saturating_mul(self.multiplier)
    }

    /// Resolves one guess against the injected draw. Legal only while
    /// awaiting a guess; otherwise a no-op returning `false`.
    pub fn guess(&mut self, choice: WagerChoice, draw: f64) -> bool {
        if self.state != WagerState::AwaitingGuess {
            return false;
        }
        let rolled = if draw < 0.5 {
            WagerChoice::Even
        } else {
            WagerChoice::Odd
        };
        if rolled == choice {
            self.state = WagerState::Won;
            self.streak += 1;
        } else {
            self.state = WagerState::Lost;
        }
        true
    }

    /// Doubles the payout and returns to the guessing state. Legal only
    /// after a win.
    pub fn step_up(&mut self) -> bool {
        if self.state != WagerState::Won {
            return false;
        }
        self.multiplier = self.multiplier.saturating_mul(2);
        self.state = WagerState::AwaitingGuess;
        true
    }

    /// Banks the current payout and terminates the round. Legal only after
    /// a win.
    pub fn claim(&mut self) -> Option<i64> {
        if self.state != WagerState::Won {
            return None;
        }
        self.state = WagerState::Claimed;
        Some(self.potential_payout())
    }

    pub fn view(&self) -> WagerView {
        WagerView {
            state: match self.state {
                WagerState::AwaitingGuess => WagerStateView::AwaitingGuess,
                WagerState::Won => WagerStateView::Won,
                WagerState::Lost => WagerStateView::Lost,
                WagerState::Claimed => WagerStateView::Claimed,
            },
            streak: self.streak,
            multiplier: self.multiplier,
            potential_payout: self.potential_payout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn three_band_table() -> RewardTable {
        RewardTable::new(vec![
            RewardTier {
                threshold: 0.7,
                tier: "common".to_string(),
                payout_spec: json!({ "coins": 1 }),
            },
            RewardTier {
                threshold: 0.95,
                tier: "rare".to_string(),
                payout_spec: json!({ "coins": 10 }),
            },
            RewardTier {
                threshold: 1.0,
                tier: "legendary".to_string(),
                payout_spec: json!({ "coins": 100 }),
            },
        ])
        .expect("table should validate")
    }

    #[test]
    fn resolve_boundaries_are_consistent() {
        let table = three_band_table();
        assert_eq!(table.resolve(0.0).tier, "common");
        assert_eq!(table.resolve(0.69).tier, "common");
        assert_eq!(table.resolve(0.70).tier, "rare");
        assert_eq!(table.resolve(0.94).tier, "rare");
        assert_eq!(table.resolve(0.95).tier, "legendary");
        assert_eq!(table.resolve(0.999_999).tier, "legendary");
    }

    #[test]
    fn rejects_empty_table() {
        assert!(matches!(
            RewardTable::new(Vec::new()),
            Err(RewardTableError::Empty)
        ));
    }

    #[test]
    fn rejects_non_monotonic_thresholds() {
        let result = RewardTable::new(vec![
            RewardTier {
                threshold: 0.9,
                tier: "a".to_string(),
                payout_spec: json!(null),
            },
            RewardTier {
                threshold: 0.5,
                tier: "b".to_string(),
                payout_spec: json!(null),
            },
        ]);
        assert!(matches!(
            result,
            Err(RewardTableError::NonMonotonic { index: 1, .. })
        ));
    }

    #[test]
    fn rejects_table_not_terminating_at_one() {
        let result = RewardTable::new(vec![RewardTier {
            threshold: 0.99,
            tier: "a".to_string(),
            payout_spec: json!(null),
        }]);
        assert!(matches!(
            result,
            Err(RewardTableError::FinalThresholdNotOne { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        for bad in [-0.25, 0.0, 1.5, f64::NAN] {
            let result = RewardTable::new(vec![RewardTier {
                threshold: bad,
                tier: "a".to_string(),
                payout_spec: json!(null),
            }]);
            assert!(
                matches!(result, Err(RewardTableError::ThresholdOutOfRange { .. })),
                "threshold {bad} should be rejected"
            );
        }
    }

    #[test]
    fn final_threshold_tolerates_float_epsilon() {
        let table = RewardTable::new(vec![RewardTier {
            threshold: 1.0 - 1e-12,
            tier: "only".to_string(),
            payout_spec: json!(null),
        }])
        .expect("epsilon-close table should validate");
        assert_eq!(table.resolve(0.999_999_999_999_9).tier, "only");
    }

    #[test]
    fn wager_win_then_claim_pays_base() {
        let mut round = WagerRound::new(10);
        assert!(round.guess(WagerChoice::Even, 0.2));
        assert_eq!(round.state(), WagerState::Won);
        assert_eq!(round.claim(), Some(10));
        assert_eq!(round.state(), WagerState::Claimed);
    }

    #[test]
    fn wager_step_up_doubles_payout() {
        let mut round = WagerRound::new(10);
        assert!(round.guess(WagerChoice::Even, 0.1));
        assert!(round.step_up());
        assert_eq!(round.state(), WagerState::AwaitingGuess);
        assert!(round.guess(WagerChoice::Odd, 0.9));
        assert!(round.step_up());
        assert!(round.guess(WagerChoice::Even, 0.3));
        assert_eq!(round.streak(), 3);
        assert_eq!(round.claim(), Some(40));
    }

    #[test]
    fn wager_loss_forfeits_everything() {
        let mut round = WagerRound::new(10);
        assert!(round.guess(WagerChoice::Even, 0.1));
        assert!(round.step_up());
        assert!(round.guess(WagerChoice::Even, 0.9));
        assert_eq!(round.state(), WagerState::Lost);
        assert!(round.is_terminal());
        assert_eq!(round.claim(), None);
    }

    #[test]
    fn illegal_wager_actions_are_no_ops() {
        let mut round = WagerRound::new(10);
        // cannot step up or claim before any win
        assert!(!round.step_up());
        assert_eq!(round.claim(), None);

        assert!(round.guess(WagerChoice::Odd, 0.7));
        // cannot guess again while a win is pending
        assert!(!round.guess(WagerChoice::Odd, 0.7));

        assert_eq!(round.claim(), Some(10));
        // terminal round ignores everything
        assert!(!round.guess(WagerChoice::Odd, 0.7));
        assert!(!round.step_up());
        assert_eq!(round.claim(), None);
    }
}
