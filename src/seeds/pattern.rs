//! Pattern DNA - candlestick patterns and support/resistance proximity
//!
//! Seven patterns are scored with evolvable confidence weights against the
//! last candles; a rolling per-symbol set of recent highs/lows acts as
//! resistance/support. The result is a direction bias and a modifier clamped
//! to [0.6, 1.5].

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

use super::{inherit, mutate_f64, mutate_u32, Seed, SeedCore};
use crate::types::{Candle, Direction, GroupId};

/// Score lead needed before the bias leaves neutral
const BIAS_MARGIN: f64 = 0.2;
pub const MODIFIER_RANGE: (f64, f64) = (0.6, 1.5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    Doji,
    Hammer,
    BullishEngulfing,
    BearishEngulfing,
    BullishPinBar,
    BearishPinBar,
    InsideBar,
}

impl PatternKind {
    pub fn direction(&self) -> Direction {
        match self {
            PatternKind::Hammer | PatternKind::BullishEngulfing | PatternKind::BullishPinBar => {
                Direction::Long
            }
            PatternKind::BearishEngulfing | PatternKind::BearishPinBar => Direction::Short,
            PatternKind::Doji | PatternKind::InsideBar => Direction::Neutral,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatternKind::Doji => "DOJI",
            PatternKind::Hammer => "HAMMER",
            PatternKind::BullishEngulfing => "ENGULFING_BULL",
            PatternKind::BearishEngulfing => "ENGULFING_BEAR",
            PatternKind::BullishPinBar => "PIN_BAR_BULL",
            PatternKind::BearishPinBar => "PIN_BAR_BEAR",
            PatternKind::InsideBar => "INSIDE_BAR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternGenome {
    pub doji_weight: f64,
    pub hammer_weight: f64,
    pub engulfing_weight: f64,
    pub pin_bar_weight: f64,
    pub inside_bar_weight: f64,
    pub sr_weight: f64,
    /// Highs/lows kept per symbol
    pub sr_lookback: u32,
    /// Proximity to a level that counts as "near" (% of price)
    pub sr_tolerance: f64,
    pub pattern_influence: f64,
}

impl Default for PatternGenome {
    fn default() -> Self {
        Self {
            doji_weight: 0.5,
            hammer_weight: 0.7,
            engulfing_weight: 0.8,
            pin_bar_weight: 0.6,
            inside_bar_weight: 0.4,
            sr_weight: 1.0,
            sr_lookback: 20,
            sr_tolerance: 0.3,
            pattern_influence: 0.5,
        }
    }
}

/// Pattern verdict for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRead {
    pub bias: Direction,
    pub modifier: f64,
    pub patterns: Vec<PatternKind>,
    pub near_support: bool,
    pub near_resistance: bool,
}

impl Default for PatternRead {
    fn default() -> Self {
        Self {
            bias: Direction::Neutral,
            modifier: 1.0,
            patterns: Vec::new(),
            near_support: false,
            near_resistance: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LevelSet {
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternDna {
    genome: PatternGenome,
    core: SeedCore,
    #[serde(default)]
    levels: HashMap<String, LevelSet>,
}

impl PatternDna {
    pub fn for_group(group: GroupId) -> Self {
        let mut genome = PatternGenome::default();
        match group {
            GroupId::Alpha => {
                genome.engulfing_weight = 1.0;
                genome.pattern_influence = 0.6;
            }
            GroupId::Beta => {
                genome.sr_weight = 1.5;
                genome.pattern_influence = 0.7;
            }
            GroupId::Delta => genome.pin_bar_weight = 0.9,
            GroupId::Gamma | GroupId::Omega => {}
        }
        Self {
            genome,
            ..Default::default()
        }
    }

    /// Patterns present on the last candle (against the one before it)
    pub fn detect(candles: &[Candle]) -> Vec<PatternKind> {
        let mut found = Vec::new();
        if candles.len() < 3 {
            return found;
        }
        let last = candles[candles.len() - 1];
        let prev = candles[candles.len() - 2];
        let body = last.body();
        let range = last.range();
        if range <= 0.0 {
            return found;
        }
        let upper = last.upper_wick();
        let lower = last.lower_wick();

        if body / range < 0.1 {
            found.push(PatternKind::Doji);
        }
        if lower > body * 2.0 && upper < body * 0.5 {
            found.push(PatternKind::Hammer);
        }
        if last.is_bullish()
            && prev.is_bearish()
            && last.open <= prev.close
            && last.close >= prev.open
        {
            found.push(PatternKind::BullishEngulfing);
        }
        if last.is_bearish()
            && prev.is_bullish()
            && last.open >= prev.close
            && last.close <= prev.open
        {
            found.push(PatternKind::BearishEngulfing);
        }
        if upper > body * 2.5 && lower < body * 0.5 {
            found.push(PatternKind::BearishPinBar);
        }
        if lower > body * 2.5 && upper < body * 0.5 {
            found.push(PatternKind::BullishPinBar);
        }
        if last.high < prev.high && last.low > prev.low {
            found.push(PatternKind::InsideBar);
        }
        found
    }

    fn confidence(&self, kind: PatternKind) -> f64 {
        let g = &self.genome;
        match kind {
            PatternKind::Doji => g.doji_weight,
            PatternKind::Hammer => g.hammer_weight,
            PatternKind::BullishEngulfing | PatternKind::BearishEngulfing => g.engulfing_weight,
            PatternKind::BullishPinBar | PatternKind::BearishPinBar => g.pin_bar_weight,
            PatternKind::InsideBar => g.inside_bar_weight,
        }
    }

    /// Score the candles for `symbol` and fold them into its S/R set
    pub fn analyze(&mut self, symbol: &str, candles: &[Candle], price: f64) -> PatternRead {
        let mut read = PatternRead::default();
        if candles.len() < 3 {
            return read;
        }
        let last = candles[candles.len() - 1];
        if last.range() <= 0.0 {
            return read;
        }

        read.patterns = Self::detect(candles);

        let lookback = self.genome.sr_lookback.max(1) as usize;
        let levels = self.levels.entry(symbol.to_string()).or_default();
        for c in candles {
            levels.highs.push_back(c.high);
            levels.lows.push_back(c.low);
        }
        while levels.highs.len() > lookback {
            levels.highs.pop_front();
        }
        while levels.lows.len() > lookback {
            levels.lows.pop_front();
        }

        let tolerance = price * self.genome.sr_tolerance / 100.0;
        read.near_support = levels.lows.iter().any(|l| (price - l).abs() < tolerance);
        read.near_resistance = levels.highs.iter().any(|h| (price - h).abs() < tolerance);

        let mut long_score = 0.0;
        let mut short_score = 0.0;
        for kind in &read.patterns {
            match kind.direction() {
                Direction::Long => long_score += self.confidence(*kind),
                Direction::Short => short_score += self.confidence(*kind),
                Direction::Neutral => {}
            }
        }
        if read.near_support {
            long_score += self.genome.sr_weight * 0.5;
        }
        if read.near_resistance {
            short_score += self.genome.sr_weight * 0.5;
        }

        read.bias = if long_score > short_score + BIAS_MARGIN {
            Direction::Long
        } else if short_score > long_score + BIAS_MARGIN {
            Direction::Short
        } else {
            Direction::Neutral
        };

        let max_score = long_score.max(short_score);
        read.modifier = (1.0 + (max_score - 0.5) * self.genome.pattern_influence)
            .clamp(MODIFIER_RANGE.0, MODIFIER_RANGE.1);
        read
    }
}

/// Three synthetic candles around `price` when no candle history exists.
/// `bias` tilts them toward the expected direction.
pub fn synthetic_candles(price: f64, atr: f64, bias: Direction) -> Vec<Candle> {
    let atr = if atr > 0.0 { atr } else { price * 0.001 };
    let b = if bias == Direction::Short { -1.0 } else { 1.0 };
    let o1 = price - atr * 0.5 * b;
    let c1 = price - atr * 0.2 * b;
    let c2 = price + atr * 0.1 * b;
    vec![
        Candle::new(o1, o1.max(c1) + atr * 0.3, o1.min(c1) - atr * 0.3, c1),
        Candle::new(c1, c1.max(c2) + atr * 0.4, c1.min(c2) - atr * 0.4, c2),
        Candle::new(c2, c2.max(price) + atr * 0.5, c2.min(price) - atr * 0.2, price),
    ]
}

impl Seed for PatternDna {
    type Genome = PatternGenome;

    const NAME: &'static str = "pattern";

    fn genome(&self) -> &PatternGenome {
        &self.genome
    }

    fn restore(&mut self, mut genome: PatternGenome) {
        for w in [
            &mut genome.doji_weight,
            &mut genome.hammer_weight,
            &mut genome.engulfing_weight,
            &mut genome.pin_bar_weight,
            &mut genome.inside_bar_weight,
            &mut genome.pattern_influence,
        ] {
            *w = w.clamp(0.0, 1.0);
        }
        genome.sr_weight = genome.sr_weight.clamp(0.0, 2.0);
        genome.sr_lookback = genome.sr_lookback.clamp(10, 50);
        genome.sr_tolerance = genome.sr_tolerance.clamp(0.1, 1.0);
        self.genome = genome;
    }

    fn core(&self) -> &SeedCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SeedCore {
        &mut self.core
    }

    fn blend<R: Rng + ?Sized>(&mut self, partner: &PatternGenome, rng: &mut R) {
        let g = &mut self.genome;
        inherit(rng, &mut g.doji_weight, &partner.doji_weight);
        inherit(rng, &mut g.hammer_weight, &partner.hammer_weight);
        inherit(rng, &mut g.engulfing_weight, &partner.engulfing_weight);
        inherit(rng, &mut g.pin_bar_weight, &partner.pin_bar_weight);
        inherit(rng, &mut g.inside_bar_weight, &partner.inside_bar_weight);
        inherit(rng, &mut g.sr_weight, &partner.sr_weight);
        inherit(rng, &mut g.sr_lookback, &partner.sr_lookback);
        inherit(rng, &mut g.sr_tolerance, &partner.sr_tolerance);
        inherit(rng, &mut g.pattern_influence, &partner.pattern_influence);
    }

    fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R) {
        let g = &mut self.genome;
        mutate_f64(rng, rate, &mut g.doji_weight, 0.3, (0.0, 1.0));
        mutate_f64(rng, rate, &mut g.hammer_weight, 0.3, (0.0, 1.0));
        mutate_f64(rng, rate, &mut g.engulfing_weight, 0.3, (0.0, 1.0));
        mutate_f64(rng, rate, &mut g.pin_bar_weight, 0.3, (0.0, 1.0));
        mutate_f64(rng, rate, &mut g.inside_bar_weight, 0.3, (0.0, 1.0));
        mutate_f64(rng, rate, &mut g.sr_weight, 0.4, (0.0, 2.0));
        mutate_u32(rng, rate, &mut g.sr_lookback, 15.0, (10.0, 50.0));
        mutate_f64(rng, rate, &mut g.sr_tolerance, 0.3, (0.1, 1.0));
        mutate_f64(rng, rate, &mut g.pattern_influence, 0.2, (0.0, 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_few_candles_is_neutral() {
        let mut dna = PatternDna::default();
        let read = dna.analyze("BTCUSDT", &[Candle::new(1.0, 2.0, 0.5, 1.5)], 1.5);
        assert_eq!(read, PatternRead::default());
    }

    #[test]
    fn test_bullish_engulfing_detected() {
        let candles = vec![
            Candle::new(100.0, 101.0, 99.0, 100.5),
            Candle::new(101.0, 101.5, 99.5, 100.0),
            Candle::new(99.8, 102.0, 99.6, 101.5),
        ];
        let found = PatternDna::detect(&candles);
        assert!(found.contains(&PatternKind::BullishEngulfing));
    }

    #[test]
    fn test_hammer_gives_long_bias() {
        let mut dna = PatternDna::default();
        // long lower wick, tiny upper wick, body 1
        let candles = vec![
            Candle::new(100.0, 101.0, 99.0, 100.5),
            Candle::new(100.5, 101.0, 99.0, 100.2),
            Candle::new(100.0, 101.1, 96.0, 101.0),
        ];
        let read = dna.analyze("ETHUSDT", &candles, 150.0);
        assert!(read.patterns.contains(&PatternKind::Hammer));
        assert_eq!(read.bias, Direction::Long);
        assert!(read.modifier >= MODIFIER_RANGE.0 && read.modifier <= MODIFIER_RANGE.1);
    }

    #[test]
    fn test_support_proximity() {
        let mut dna = PatternDna::default();
        let candles = vec![
            Candle::new(100.0, 102.0, 98.0, 101.0),
            Candle::new(101.0, 103.0, 99.0, 102.0),
            Candle::new(102.0, 104.0, 100.0, 103.0),
        ];
        let read = dna.analyze("SOLUSDT", &candles, 98.1);
        assert!(read.near_support);
        assert!(!read.near_resistance);
    }

    #[test]
    fn test_synthetic_candles_are_well_formed() {
        for bias in [Direction::Long, Direction::Short, Direction::Neutral] {
            let candles = synthetic_candles(200.0, 2.0, bias);
            assert_eq!(candles.len(), 3);
            assert!(candles.iter().all(|c| c.high >= c.open.max(c.close)));
            assert!(candles.iter().all(|c| c.low <= c.open.min(c.close)));
            assert_eq!(candles[2].close, 200.0);
        }
    }
}
