//! Sentiment DNA - synthetic crowd mood from price momentum and volume spikes
//!
//! No external feed: the score (-100..100) is derived from the aggregate price
//! momentum over an evolvable lookback and the latest volume versus its
//! rolling average. At extreme bands a contrarian genome can veto trades that
//! would follow the crowd.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use super::{inherit, mutate_f64, mutate_u32, Seed, SeedCore};
use crate::types::Direction;

const HISTORY_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentimentBand {
    ExtremeFear,
    Fear,
    Neutral,
    Greed,
    ExtremeGreed,
}

impl SentimentBand {
    pub fn is_extreme(&self) -> bool {
        matches!(self, SentimentBand::ExtremeFear | SentimentBand::ExtremeGreed)
    }
}

impl fmt::Display for SentimentBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentBand::ExtremeFear => write!(f, "EXTREME_FEAR"),
            SentimentBand::Fear => write!(f, "FEAR"),
            SentimentBand::Neutral => write!(f, "NEUTRAL"),
            SentimentBand::Greed => write!(f, "GREED"),
            SentimentBand::ExtremeGreed => write!(f, "EXTREME_GREED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentGenome {
    pub momentum_weight: f64,
    pub volume_weight: f64,
    /// Samples back used for the momentum reading
    pub momentum_lookback: u32,
    /// |score| at which Fear/Greed begins
    pub band_threshold: f64,
    /// |score| at which the extreme bands begin
    pub extreme_threshold: f64,
    /// 0 follows the crowd, 1 fades it
    pub contrarian_factor: f64,
    /// How strongly sentiment moves the modifier
    pub sentiment_weight: f64,
}

impl Default for SentimentGenome {
    fn default() -> Self {
        Self {
            momentum_weight: 0.6,
            volume_weight: 0.4,
            momentum_lookback: 5,
            band_threshold: 25.0,
            extreme_threshold: 65.0,
            contrarian_factor: 0.3,
            sentiment_weight: 0.5,
        }
    }
}

/// Sentiment verdict for one prospective trade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentRead {
    pub modifier: f64,
    pub should_trade: bool,
    pub band: SentimentBand,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentimentDna {
    genome: SentimentGenome,
    core: SeedCore,
    #[serde(default)]
    prices: VecDeque<f64>,
    #[serde(default)]
    volumes: VecDeque<f64>,
    #[serde(default)]
    score: f64,
}

impl SentimentDna {
    /// Fold one aggregate sample in and return the new score
    pub fn update(&mut self, avg_price: f64, avg_volume: f64) -> f64 {
        self.prices.push_back(avg_price);
        self.volumes.push_back(avg_volume);
        while self.prices.len() > HISTORY_LEN {
            self.prices.pop_front();
        }
        while self.volumes.len() > HISTORY_LEN {
            self.volumes.pop_front();
        }

        let g = &self.genome;
        let lookback = g.momentum_lookback as usize;
        let momentum_pct = if self.prices.len() > lookback && lookback > 0 {
            let then = self.prices[self.prices.len() - 1 - lookback];
            if then > 0.0 {
                (avg_price - then) / then * 100.0
            } else {
                0.0
            }
        } else {
            0.0
        };
        let momentum_score = (momentum_pct * 25.0).clamp(-100.0, 100.0);

        let prior = self.volumes.len().saturating_sub(1);
        let volume_score = if prior > 0 {
            let avg = self.volumes.iter().take(prior).sum::<f64>() / prior as f64;
            let ratio = if avg > 0.0 { avg_volume / avg } else { 1.0 };
            let direction = if momentum_pct > 0.0 {
                1.0
            } else if momentum_pct < 0.0 {
                -1.0
            } else {
                0.0
            };
            ((ratio - 1.0) * 100.0).clamp(-100.0, 100.0) * direction
        } else {
            0.0
        };

        let total_weight = g.momentum_weight + g.volume_weight;
        self.score = if total_weight > 0.0 {
            ((g.momentum_weight * momentum_score + g.volume_weight * volume_score) / total_weight)
                .clamp(-100.0, 100.0)
        } else {
            0.0
        };
        self.score
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn band(&self) -> SentimentBand {
        let g = &self.genome;
        if self.score <= -g.extreme_threshold {
            SentimentBand::ExtremeFear
        } else if self.score <= -g.band_threshold {
            SentimentBand::Fear
        } else if self.score >= g.extreme_threshold {
            SentimentBand::ExtremeGreed
        } else if self.score >= g.band_threshold {
            SentimentBand::Greed
        } else {
            SentimentBand::Neutral
        }
    }

    /// Modifier in [0.5, 1.5] and a veto flag for a trade in `direction`
    pub fn read(&self, direction: Direction) -> SentimentRead {
        let g = &self.genome;
        let band = self.band();
        // > 0 when the trade follows the crowd
        let aligned = self.score / 100.0 * direction.sign();
        let follow = aligned * (1.0 - g.contrarian_factor);
        let fade = -aligned * g.contrarian_factor;
        let modifier = (1.0 + g.sentiment_weight * (follow + fade)).clamp(0.5, 1.5);
        let should_trade = !(band.is_extreme() && aligned > 0.0 && g.contrarian_factor >= 0.5);
        SentimentRead {
            modifier,
            should_trade,
            band,
        }
    }
}

impl Seed for SentimentDna {
    type Genome = SentimentGenome;

    const NAME: &'static str = "sentiment";

    fn genome(&self) -> &SentimentGenome {
        &self.genome
    }

    fn restore(&mut self, mut genome: SentimentGenome) {
        genome.momentum_weight = genome.momentum_weight.clamp(0.1, 1.0);
        genome.volume_weight = genome.volume_weight.clamp(0.1, 1.0);
        genome.momentum_lookback = genome.momentum_lookback.clamp(2, 15);
        genome.band_threshold = genome.band_threshold.clamp(10.0, 50.0);
        genome.extreme_threshold = genome.extreme_threshold.clamp(50.0, 95.0);
        genome.contrarian_factor = genome.contrarian_factor.clamp(0.0, 1.0);
        genome.sentiment_weight = genome.sentiment_weight.clamp(0.0, 1.0);
        self.genome = genome;
    }

    fn core(&self) -> &SeedCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SeedCore {
        &mut self.core
    }

    fn blend<R: Rng + ?Sized>(&mut self, partner: &SentimentGenome, rng: &mut R) {
        let g = &mut self.genome;
        inherit(rng, &mut g.momentum_weight, &partner.momentum_weight);
        inherit(rng, &mut g.volume_weight, &partner.volume_weight);
        inherit(rng, &mut g.momentum_lookback, &partner.momentum_lookback);
        inherit(rng, &mut g.band_threshold, &partner.band_threshold);
        inherit(rng, &mut g.extreme_threshold, &partner.extreme_threshold);
        inherit(rng, &mut g.contrarian_factor, &partner.contrarian_factor);
        inherit(rng, &mut g.sentiment_weight, &partner.sentiment_weight);
    }

    fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R) {
        let g = &mut self.genome;
        mutate_f64(rng, rate, &mut g.momentum_weight, 0.2, (0.1, 1.0));
        mutate_f64(rng, rate, &mut g.volume_weight, 0.2, (0.1, 1.0));
        mutate_u32(rng, rate, &mut g.momentum_lookback, 4.0, (2.0, 15.0));
        mutate_f64(rng, rate, &mut g.band_threshold, 8.0, (10.0, 50.0));
        mutate_f64(rng, rate, &mut g.extreme_threshold, 10.0, (50.0, 95.0));
        mutate_f64(rng, rate, &mut g.contrarian_factor, 0.2, (0.0, 1.0));
        mutate_f64(rng, rate, &mut g.sentiment_weight, 0.2, (0.0, 1.0));
    }
}
