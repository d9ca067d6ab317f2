//! Multi-armed bandit over ranking strategies.
//!
//! Pure selection algorithms live here; the arms that actually rank articles
//! and the persistence of decisions and rewards are in the submodules.

pub mod arms;
pub mod service;

use rand::Rng;
use rand_distr::{Beta, Distribution};

use crate::models::SelectionReason;

/// Accumulated statistics for one arm within a context.
#[derive(Debug, Clone)]
pub struct ArmStats {
    pub arm_id: i64,
    pub pulls: i64,
    pub total_reward: f64,
}

impl ArmStats {
    pub fn mean(&self) -> f64 {
        if self.pulls == 0 {
            0.0
        } else {
            self.total_reward / self.pulls as f64
        }
    }
}

/// Outcome of an arm selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Index into the input slice
    pub index: usize,
    /// Score the algorithm assigned to the winner
    pub decision_value: f64,
    pub reason: SelectionReason,
}

/// ε-greedy: explore uniformly with probability ε, otherwise exploit the
/// best empirical mean. Exact ties break uniformly at random.
pub fn select_epsilon_greedy<R: Rng + ?Sized>(
    arms: &[ArmStats],
    epsilon: f64,
    rng: &mut R,
) -> Option<Selection> {
    if arms.is_empty() {
        return None;
    }

    if rng.gen_bool(epsilon.clamp(0.0, 1.0)) {
        let index = rng.gen_range(0..arms.len());
        return Some(Selection {
            index,
            decision_value: arms[index].mean(),
            reason: SelectionReason::Exploration,
        });
    }

    let best_mean = arms
        .iter()
        .map(ArmStats::mean)
        .fold(f64::NEG_INFINITY, f64::max);
    let tied: Vec<usize> = arms
        .iter()
        .enumerate()
        .filter(|(_, arm)| arm.mean() == best_mean)
        .map(|(index, _)| index)
        .collect();

    if tied.len() == 1 {
        Some(Selection {
            index: tied[0],
            decision_value: best_mean,
            reason: SelectionReason::Exploitation,
        })
    } else {
        let index = tied[rng.gen_range(0..tied.len())];
        Some(Selection {
            index,
            decision_value: best_mean,
            reason: SelectionReason::Random,
        })
    }
}

/// UCB1: argmax of mean + √(2 ln N / n). Unpulled arms are tried first.
pub fn select_ucb1(arms: &[ArmStats]) -> Option<Selection> {
    if arms.is_empty() {
        return None;
    }

    if let Some((index, arm)) = arms.iter().enumerate().find(|(_, arm)| arm.pulls == 0) {
        return Some(Selection {
            index,
            decision_value: arm.mean(),
            reason: SelectionReason::Exploration,
        });
    }

    let total_pulls: i64 = arms.iter().map(|arm| arm.pulls).sum();
    let ln_total = (total_pulls.max(1) as f64).ln();

    let mut best_index = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (index, arm) in arms.iter().enumerate() {
        let bonus = (2.0 * ln_total / arm.pulls as f64).sqrt();
        let value = arm.mean() + bonus;
        if value > best_value {
            best_value = value;
            best_index = index;
        }
    }

    Some(Selection {
        index: best_index,
        decision_value: best_value,
        reason: SelectionReason::Exploitation,
    })
}

/// Thompson sampling: draw θ ~ Beta(α + successes, β + failures) per arm and
/// pick the argmax. The reason records whether the draw agreed with the
/// empirical best arm.
pub fn select_thompson<R: Rng + ?Sized>(
    arms: &[ArmStats],
    alpha: f64,
    beta: f64,
    rng: &mut R,
) -> Option<Selection> {
    if arms.is_empty() {
        return None;
    }

    let mut best_index = 0;
    let mut best_theta = f64::NEG_INFINITY;

    for (index, arm) in arms.iter().enumerate() {
        let successes = arm.total_reward.max(0.0);
        let failures = (arm.pulls as f64 - arm.total_reward).max(0.0);
        let distribution = Beta::new(alpha + successes, beta + failures)
            .unwrap_or_else(|_| Beta::new(1.0, 1.0).expect("uniform beta"));
        let theta = distribution.sample(rng);
        if theta > best_theta {
            best_theta = theta;
            best_index = index;
        }
    }

    let empirical_best = arms
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            a.mean()
                .partial_cmp(&b.mean())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(index, _)| index)
        .unwrap_or(best_index);

    Some(Selection {
        index: best_index,
        decision_value: best_theta,
        reason: if best_index == empirical_best {
            SelectionReason::Exploitation
        } else {
            SelectionReason::Exploration
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fresh_arms(n: usize) -> Vec<ArmStats> {
        (0..n)
            .map(|i| ArmStats {
                arm_id: i as i64,
                pulls: 0,
                total_reward: 0.0,
            })
            .collect()
    }

    #[test]
    fn epsilon_zero_always_exploits_the_best_arm() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut arms = fresh_arms(4);
        arms[2].pulls = 10;
        arms[2].total_reward = 8.0;
        for arm in arms.iter_mut().filter(|a| a.pulls == 0) {
            arm.pulls = 10;
            arm.total_reward = 2.0;
        }

        for _ in 0..100 {
            let selection = select_epsilon_greedy(&arms, 0.0, &mut rng).unwrap();
            assert_eq!(selection.index, 2);
            assert_eq!(selection.reason, SelectionReason::Exploitation);
        }
    }

    #[test]
    fn epsilon_one_always_explores() {
        let mut rng = StdRng::seed_from_u64(2);
        let arms = fresh_arms(4);
        for _ in 0..50 {
            let selection = select_epsilon_greedy(&arms, 1.0, &mut rng).unwrap();
            assert_eq!(selection.reason, SelectionReason::Exploration);
        }
    }

    #[test]
    fn exact_ties_break_randomly() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut arms = fresh_arms(2);
        for arm in &mut arms {
            arm.pulls = 10;
            arm.total_reward = 5.0;
        }

        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let selection = select_epsilon_greedy(&arms, 0.0, &mut rng).unwrap();
            assert_eq!(selection.reason, SelectionReason::Random);
            seen.insert(selection.index);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn ucb1_tries_every_arm_once_first() {
        let mut arms = fresh_arms(4);
        for expected in 0..4 {
            let selection = select_ucb1(&arms).unwrap();
            assert_eq!(selection.index, expected);
            assert_eq!(selection.reason, SelectionReason::Exploration);
            arms[selection.index].pulls = 1;
        }
    }

    #[test]
    fn ucb1_prefers_high_mean_with_equal_pulls() {
        let mut arms = fresh_arms(3);
        for (i, arm) in arms.iter_mut().enumerate() {
            arm.pulls = 50;
            arm.total_reward = 10.0 * (i + 1) as f64;
        }

        let selection = select_ucb1(&arms).unwrap();
        assert_eq!(selection.index, 2);
        assert_eq!(selection.reason, SelectionReason::Exploitation);
    }

    #[test]
    fn ucb1_revisits_underexplored_arms() {
        let mut arms = fresh_arms(2);
        arms[0].pulls = 1000;
        arms[0].total_reward = 600.0;
        arms[1].pulls = 2;
        arms[1].total_reward = 1.0;

        // The exploration bonus for the barely-pulled arm dominates
        let selection = select_ucb1(&arms).unwrap();
        assert_eq!(selection.index, 1);
    }

    #[test]
    fn thompson_converges_toward_the_better_arm() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut arms = fresh_arms(2);
        arms[0].pulls = 100;
        arms[0].total_reward = 80.0;
        arms[1].pulls = 100;
        arms[1].total_reward = 20.0;

        let mut first = 0;
        for _ in 0..200 {
            let selection = select_thompson(&arms, 1.0, 1.0, &mut rng).unwrap();
            if selection.index == 0 {
                first += 1;
            }
        }
        assert!(first > 180, "best arm picked only {} of 200 times", first);
    }

    #[test]
    fn epsilon_greedy_converges_over_ten_thousand_decisions() {
        // One clearly best arm rewarded at 0.8 against 0.2 for the rest.
        let mut rng = StdRng::seed_from_u64(42);
        let true_rates = [0.8, 0.2, 0.2, 0.2];
        let mut arms = fresh_arms(4);
        let mut last_thousand_best = 0usize;

        for round in 0..10_000 {
            let selection = select_epsilon_greedy(&arms, 0.1, &mut rng).unwrap();
            let reward = if rng.gen_bool(true_rates[selection.index]) {
                1.0
            } else {
                0.0
            };
            arms[selection.index].pulls += 1;
            arms[selection.index].total_reward += reward;

            if round >= 9_000 && selection.index == 0 {
                last_thousand_best += 1;
            }
        }

        assert!(
            last_thousand_best >= 850,
            "best arm selected {} times in the last 1000",
            last_thousand_best
        );
    }
}
