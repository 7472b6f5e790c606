//! Temporal DNA - when to trade
//!
//! A 24-hour UTC trading mask, weekday weights and session weights. Hour-mask
//! mutation leans on each hour's realized win rate, and at least 12 hours always
//! stay enabled.

use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{chance, inherit, mutate_f64, Seed, SeedCore, COUNTER_DECAY};

pub const MIN_ACTIVE_HOURS: usize = 12;
const WEIGHT_RANGE: (f64, f64) = (0.3, 1.5);
/// Trades an hour needs before its win rate steers mutation
const HOUR_EVIDENCE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradingSession {
    Asia,
    Europe,
    UnitedStates,
}

impl TradingSession {
    pub const ALL: [TradingSession; 3] = [
        TradingSession::Asia,
        TradingSession::Europe,
        TradingSession::UnitedStates,
    ];

    /// UTC hours [start, end)
    pub fn hours(&self) -> (u32, u32) {
        match self {
            TradingSession::Asia => (0, 8),
            TradingSession::Europe => (7, 16),
            TradingSession::UnitedStates => (13, 22),
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        let (start, end) = self.hours();
        hour >= start && hour < end
    }

    fn index(&self) -> usize {
        match self {
            TradingSession::Asia => 0,
            TradingSession::Europe => 1,
            TradingSession::UnitedStates => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalGenome {
    pub hour_mask: [bool; 24],
    /// Monday first
    pub day_weights: [f64; 7],
    pub session_weights: [f64; 3],
}

impl Default for TemporalGenome {
    fn default() -> Self {
        Self {
            hour_mask: [true; 24],
            day_weights: [1.0; 7],
            session_weights: [1.0; 3],
        }
    }
}

impl TemporalGenome {
    pub fn active_hours(&self) -> usize {
        self.hour_mask.iter().filter(|on| **on).count()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalDna {
    genome: TemporalGenome,
    core: SeedCore,
    #[serde(default)]
    hour_trades: [f64; 24],
    #[serde(default)]
    hour_wins: [f64; 24],
    /// Hour of the latest activity check, used to attribute outcomes
    #[serde(default)]
    last_hour: Option<u32>,
}

impl TemporalDna {
    /// 0 when the hour is masked out, else day weight x strongest active session
    pub fn activity_weight(&mut self, now: DateTime<Utc>) -> f64 {
        let hour = now.hour();
        self.last_hour = Some(hour);
        if !self.genome.hour_mask[hour as usize] {
            return 0.0;
        }
        let day = self.genome.day_weights[now.weekday().num_days_from_monday() as usize];
        let session = TradingSession::ALL
            .iter()
            .filter(|s| s.contains(hour))
            .map(|s| self.genome.session_weights[s.index()])
            .fold(None, |acc: Option<f64>, w| Some(acc.map_or(w, |a| a.max(w))))
            .unwrap_or(1.0);
        day * session
    }

    /// Realized win rate of an hour, if it has enough trades
    pub fn hour_win_rate(&self, hour: usize) -> Option<f64> {
        let trades = self.hour_trades[hour];
        (trades >= HOUR_EVIDENCE).then(|| self.hour_wins[hour] / trades)
    }

    fn enforce_min_hours(&mut self) {
        while self.genome.active_hours() < MIN_ACTIVE_HOURS {
            let best = (0..24)
                .filter(|h| !self.genome.hour_mask[*h])
                .map(|h| (h, self.hour_win_rate(h).unwrap_or(0.5)))
                .fold(None::<(usize, f64)>, |best, (h, wr)| match best {
                    Some((_, bwr)) if bwr >= wr => best,
                    _ => Some((h, wr)),
                });
            match best {
                Some((h, _)) => self.genome.hour_mask[h] = true,
                None => break,
            }
        }
    }
}

impl Seed for TemporalDna {
    type Genome = TemporalGenome;

    const NAME: &'static str = "temporal";

    fn genome(&self) -> &TemporalGenome {
        &self.genome
    }

    fn restore(&mut self, mut genome: TemporalGenome) {
        for w in genome.day_weights.iter_mut().chain(genome.session_weights.iter_mut()) {
            *w = w.clamp(WEIGHT_RANGE.0, WEIGHT_RANGE.1);
        }
        self.genome = genome;
        self.enforce_min_hours();
    }

    fn core(&self) -> &SeedCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SeedCore {
        &mut self.core
    }

    fn record_outcome(&mut self, profitable: bool, pnl_percent: f64) {
        self.core.record(profitable, pnl_percent);
        if let Some(hour) = self.last_hour {
            let h = hour as usize;
            self.hour_trades[h] += 1.0;
            if profitable {
                self.hour_wins[h] += 1.0;
            }
        }
    }

    fn blend<R: Rng + ?Sized>(&mut self, partner: &TemporalGenome, rng: &mut R) {
        let g = &mut self.genome;
        for h in 0..24 {
            inherit(rng, &mut g.hour_mask[h], &partner.hour_mask[h]);
        }
        for d in 0..7 {
            inherit(rng, &mut g.day_weights[d], &partner.day_weights[d]);
        }
        for s in 0..3 {
            inherit(rng, &mut g.session_weights[s], &partner.session_weights[s]);
        }
    }

    fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R) {
        for h in 0..24 {
            if !chance(rng, rate) {
                continue;
            }
            let next = match self.hour_win_rate(h) {
                Some(wr) if wr < 0.4 => false,
                Some(wr) if wr > 0.6 => true,
                _ => !self.genome.hour_mask[h],
            };
            self.genome.hour_mask[h] = next;
        }
        let g = &mut self.genome;
        for w in g.day_weights.iter_mut() {
            mutate_f64(rng, rate, w, 0.2, WEIGHT_RANGE);
        }
        for w in g.session_weights.iter_mut() {
            mutate_f64(rng, rate, w, 0.2, WEIGHT_RANGE);
        }
        self.enforce_min_hours();
    }

    fn decay_counters(&mut self) {
        for v in self.hour_trades.iter_mut().chain(self.hour_wins.iter_mut()) {
            *v = (*v * COUNTER_DECAY).floor();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_masked_hour_returns_zero() {
        let mut dna = TemporalDna::default();
        let mut genome = dna.genome().clone();
        genome.hour_mask[3] = false;
        dna.restore(genome);
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 3, 15, 0).unwrap();
        assert_eq!(dna.activity_weight(at), 0.0);
    }

    #[test]
    fn test_session_overlap_takes_max() {
        let mut dna = TemporalDna::default();
        let mut genome = dna.genome().clone();
        genome.session_weights = [0.5, 1.4, 0.9];
        genome.day_weights[0] = 0.5; // Monday
        dna.restore(genome);
        // 14:00 UTC Monday: Europe and US overlap
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 14, 0, 0).unwrap();
        assert!((dna.activity_weight(at) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_min_active_hours_after_evolve() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut dna = TemporalDna::default();
        let mut genome = dna.genome().clone();
        genome.hour_mask = [false; 24];
        dna.restore(genome);
        assert!(dna.genome().active_hours() >= MIN_ACTIVE_HOURS);

        for _ in 0..200 {
            dna.evolve(None, &mut rng);
            assert!(dna.genome().active_hours() >= MIN_ACTIVE_HOURS);
        }
    }

    #[test]
    fn test_losing_hour_gets_disabled() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut dna = TemporalDna::default();
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        dna.activity_weight(at);
        for _ in 0..10 {
            dna.record_outcome(false, -2.0);
        }
        // rate 1.0 forces every hour through the biased rule
        dna.mutate(1.0, &mut rng);
        assert!(!dna.genome().hour_mask[9]);
    }
}
