//! Market regime DNA - classifies the aggregate market state
//!
//! Keeps a 20-sample rolling window of the composite price (mean of all
//! symbols' current prices) and the batch-wide long/short ratio, and maps them
//! to a regime with evolvable thresholds. Each regime carries its own
//! strategy-category boosts.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use super::{inherit, mutate_f64, Seed, SeedCore};
use crate::types::{Direction, MarketSignals, PoolSignal};

const PRICE_WINDOW: usize = 20;
const MIN_SAMPLES: usize = 5;
const BOOST_RANGE: (f64, f64) = (0.5, 1.5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    Crash,
}

impl Default for MarketRegime {
    fn default() -> Self {
        MarketRegime::Ranging
    }
}

impl MarketRegime {
    pub fn index(&self) -> usize {
        match self {
            MarketRegime::TrendingUp => 0,
            MarketRegime::TrendingDown => 1,
            MarketRegime::Ranging => 2,
            MarketRegime::Volatile => 3,
            MarketRegime::Crash => 4,
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketRegime::TrendingUp => write!(f, "TRENDING_UP"),
            MarketRegime::TrendingDown => write!(f, "TRENDING_DOWN"),
            MarketRegime::Ranging => write!(f, "RANGING"),
            MarketRegime::Volatile => write!(f, "VOLATILE"),
            MarketRegime::Crash => write!(f, "CRASH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRegimeGenome {
    /// Deviation from the rolling mean that counts as a trend (%)
    pub trend_threshold: f64,
    /// Coefficient of variation that counts as volatile (%)
    pub volatility_threshold: f64,
    /// Drop below the rolling mean that counts as a crash (%)
    pub crash_threshold: f64,
    /// Share of directional signals the trend side needs
    pub ratio_threshold: f64,
    /// Category boosts indexed by regime, then category
    pub category_boosts: [[f64; 3]; 5],
}

impl Default for MarketRegimeGenome {
    fn default() -> Self {
        Self {
            trend_threshold: 0.5,
            volatility_threshold: 1.5,
            crash_threshold: 5.0,
            ratio_threshold: 0.6,
            category_boosts: [
                [1.3, 1.1, 0.8], // trending up
                [1.3, 1.1, 0.8], // trending down
                [0.8, 1.0, 1.2], // ranging
                [0.8, 1.1, 1.3], // volatile
                [1.0, 1.2, 1.2], // crash
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketRegimeDna {
    genome: MarketRegimeGenome,
    core: SeedCore,
    #[serde(default)]
    price_window: VecDeque<f64>,
    #[serde(default)]
    current: MarketRegime,
    #[serde(default)]
    regime_changes: u32,
}

impl MarketRegimeDna {
    /// Classify the latest batch and remember the result
    pub fn classify(&mut self, batch: &[MarketSignals]) -> MarketRegime {
        if batch.is_empty() {
            return self.current;
        }

        let composite =
            batch.iter().map(|m| m.current_price).sum::<f64>() / batch.len() as f64;
        self.price_window.push_back(composite);
        while self.price_window.len() > PRICE_WINDOW {
            self.price_window.pop_front();
        }

        let (longs, shorts) = batch.iter().fold((0usize, 0usize), |(l, s), m| {
            (l + m.summary.long_count, s + m.summary.short_count)
        });
        let directional = longs + shorts;
        let long_ratio = if directional > 0 {
            longs as f64 / directional as f64
        } else {
            0.5
        };

        let regime = self.evaluate(composite, long_ratio);
        if regime != self.current {
            self.regime_changes += 1;
        }
        self.current = regime;
        regime
    }

    fn evaluate(&self, composite: f64, long_ratio: f64) -> MarketRegime {
        if self.price_window.len() < MIN_SAMPLES {
            return MarketRegime::Ranging;
        }
        let n = self.price_window.len() as f64;
        let mean = self.price_window.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return MarketRegime::Ranging;
        }
        let variance = self
            .price_window
            .iter()
            .map(|p| (p - mean).powi(2))
            .sum::<f64>()
            / n;
        let change_pct = (composite - mean) / mean * 100.0;
        let volatility_pct = variance.sqrt() / mean * 100.0;
        let g = &self.genome;

        if change_pct <= -g.crash_threshold {
            MarketRegime::Crash
        } else if volatility_pct >= g.volatility_threshold {
            MarketRegime::Volatile
        } else if change_pct >= g.trend_threshold && long_ratio >= g.ratio_threshold {
            MarketRegime::TrendingUp
        } else if change_pct <= -g.trend_threshold && (1.0 - long_ratio) >= g.ratio_threshold {
            MarketRegime::TrendingDown
        } else {
            MarketRegime::Ranging
        }
    }

    pub fn current(&self) -> MarketRegime {
        self.current
    }

    pub fn is_high_volatility(&self) -> bool {
        matches!(self.current, MarketRegime::Volatile | MarketRegime::Crash)
    }

    /// Category boosts for the current regime
    pub fn boosts(&self) -> [f64; 3] {
        self.genome.category_boosts[self.current.index()]
    }

    /// Scale directional signals by the current regime's category boosts
    pub fn apply_boosts(&self, signals: &mut [PoolSignal]) {
        let boosts = self.boosts();
        for s in signals.iter_mut() {
            if s.direction != Direction::Neutral {
                s.strength = (s.strength * boosts[s.category.index()]).min(100.0);
            }
        }
    }
}

impl Seed for MarketRegimeDna {
    type Genome = MarketRegimeGenome;

    const NAME: &'static str = "market_regime";

    fn genome(&self) -> &MarketRegimeGenome {
        &self.genome
    }

    fn restore(&mut self, mut genome: MarketRegimeGenome) {
        genome.trend_threshold = genome.trend_threshold.clamp(0.1, 3.0);
        genome.volatility_threshold = genome.volatility_threshold.clamp(0.5, 5.0);
        genome.crash_threshold = genome.crash_threshold.clamp(2.0, 15.0);
        genome.ratio_threshold = genome.ratio_threshold.clamp(0.5, 0.85);
        for row in genome.category_boosts.iter_mut() {
            for b in row.iter_mut() {
                *b = b.clamp(BOOST_RANGE.0, BOOST_RANGE.1);
            }
        }
        self.genome = genome;
    }

    fn core(&self) -> &SeedCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SeedCore {
        &mut self.core
    }

    fn blend<R: Rng + ?Sized>(&mut self, partner: &MarketRegimeGenome, rng: &mut R) {
        let g = &mut self.genome;
        inherit(rng, &mut g.trend_threshold, &partner.trend_threshold);
        inherit(rng, &mut g.volatility_threshold, &partner.volatility_threshold);
        inherit(rng, &mut g.crash_threshold, &partner.crash_threshold);
        inherit(rng, &mut g.ratio_threshold, &partner.ratio_threshold);
        for r in 0..5 {
            inherit(rng, &mut g.category_boosts[r], &partner.category_boosts[r]);
        }
    }

    fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R) {
        let g = &mut self.genome;
        mutate_f64(rng, rate, &mut g.trend_threshold, 0.3, (0.1, 3.0));
        mutate_f64(rng, rate, &mut g.volatility_threshold, 0.5, (0.5, 5.0));
        mutate_f64(rng, rate, &mut g.crash_threshold, 2.0, (2.0, 15.0));
        mutate_f64(rng, rate, &mut g.ratio_threshold, 0.05, (0.5, 0.85));
        for row in g.category_boosts.iter_mut() {
            for b in row.iter_mut() {
                mutate_f64(rng, rate, b, 0.2, BOOST_RANGE);
            }
        }
    }

    fn decay_counters(&mut self) {
        self.regime_changes = (self.regime_changes as f64 * super::COUNTER_DECAY) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HigherTimeframe, SignalSummary};
    use chrono::Utc;

    fn batch(price: f64, longs: usize, shorts: usize) -> Vec<MarketSignals> {
        vec![MarketSignals {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            signals: Vec::new(),
            summary: SignalSummary {
                long_count: longs,
                short_count: shorts,
                ..Default::default()
            },
            atr14: None,
            atr14_5m: None,
            current_price: price,
            higher_tf: HigherTimeframe::default(),
        }]
    }

    #[test]
    fn test_ranging_until_enough_samples() {
        let mut dna = MarketRegimeDna::default();
        for _ in 0..4 {
            assert_eq!(dna.classify(&batch(100.0, 20, 2)), MarketRegime::Ranging);
        }
    }

    #[test]
    fn test_trending_up_with_long_majority() {
        let mut dna = MarketRegimeDna::default();
        for _ in 0..10 {
            dna.classify(&batch(100.0, 10, 10));
        }
        // +1% above mean, well under the 1.5% volatility threshold
        let regime = dna.classify(&batch(101.5, 20, 5));
        assert_eq!(regime, MarketRegime::TrendingUp);
    }

    #[test]
    fn test_crash_detection() {
        let mut dna = MarketRegimeDna::default();
        for _ in 0..19 {
            dna.classify(&batch(100.0, 10, 10));
        }
        let regime = dna.classify(&batch(90.0, 2, 20));
        assert_eq!(regime, MarketRegime::Crash);
        assert!(dna.is_high_volatility());
    }

    #[test]
    fn test_boosts_follow_regime() {
        let dna = MarketRegimeDna::default();
        assert_eq!(dna.boosts(), [0.8, 1.0, 1.2]);
    }
}
