//! Answer-position balancing.
//!
//! The key position is dictated to the creator per question. Picking the
//! least-used position keeps the distribution across A-D flat over a run,
//! so answer keys carry no positional bias.

use crate::models::AnswerPosition;
use std::collections::HashMap;

/// Tracks key-position usage and hands out the least-used position next.
#[derive(Debug, Clone)]
pub struct PositionBalancer {
    counts: HashMap<AnswerPosition, u64>,
}

impl Default for PositionBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionBalancer {
    pub fn new() -> Self {
        Self {
            counts: AnswerPosition::ALL.iter().map(|&p| (p, 0)).collect(),
        }
    }

    /// Restore a balancer from persisted counts; missing positions start
    /// at zero.
    pub fn from_counts(counts: HashMap<AnswerPosition, u64>) -> Self {
        let mut balancer = Self::new();
        for (position, count) in counts {
            balancer.counts.insert(position, count);
        }
        balancer
    }

    /// Pick the least-used position and record the pick. Ties resolve in
    /// option order (A before D), so the strict comparison keeps the first
    /// minimum.
    pub fn next(&mut self) -> AnswerPosition {
        let mut position = AnswerPosition::A;
        for candidate in AnswerPosition::ALL {
            if self.counts[&candidate] < self.counts[&position] {
                position = candidate;
            }
        }
        *self.counts.get_mut(&position).expect("all positions present") += 1;
        position
    }

    /// Current usage counts.
    pub fn counts(&self) -> &HashMap<AnswerPosition, u64> {
        &self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_balancer_cycles_through_positions_in_order() {
        let mut balancer = PositionBalancer::new();
        let picks: Vec<_> = (0..4).map(|_| balancer.next()).collect();
        assert_eq!(
            picks,
            vec![
                AnswerPosition::A,
                AnswerPosition::B,
                AnswerPosition::C,
                AnswerPosition::D
            ]
        );
    }

    #[test]
    fn counts_stay_within_one_of_each_other() {
        let mut balancer = PositionBalancer::new();
        for _ in 0..103 {
            balancer.next();
        }
        let counts = balancer.counts();
        let min = counts.values().min().unwrap();
        let max = counts.values().max().unwrap();
        assert!(max - min <= 1, "counts drifted apart: {counts:?}");
    }

    #[test]
    fn restored_balancer_fills_the_deficit_first() {
        let counts: HashMap<AnswerPosition, u64> = [
            (AnswerPosition::A, 5),
            (AnswerPosition::B, 5),
            (AnswerPosition::C, 2),
            (AnswerPosition::D, 5),
        ]
        .into_iter()
        .collect();

        let mut balancer = PositionBalancer::from_counts(counts);
        assert_eq!(balancer.next(), AnswerPosition::C);
        assert_eq!(balancer.next(), AnswerPosition::C);
        assert_eq!(balancer.next(), AnswerPosition::C);
        // caught up; ties resolve in option order again
        assert_eq!(balancer.next(), AnswerPosition::A);
    }

    #[test]
    fn missing_positions_default_to_zero() {
        let counts: HashMap<AnswerPosition, u64> =
            [(AnswerPosition::A, 3)].into_iter().collect();
        let mut balancer = PositionBalancer::from_counts(counts);
        assert_eq!(balancer.next(), AnswerPosition::B);
    }
}
