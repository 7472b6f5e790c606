//! Oracle client: rate limiting, prompt building, reply parsing and the
//! decision log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{Advisor, ConsultReason, DecisionParams, OracleContext, OracleDecision, Recommendation};
use crate::error::AdvisorError;

/// Entries kept in the decision log
pub const ORACLE_LOG_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleLogEntry {
    pub timestamp: DateTime<Utc>,
    pub cycle: u64,
    pub reason: ConsultReason,
    pub decision: OracleDecision,
    #[serde(default)]
    pub applied: bool,
}

/// Append-only decision history, oldest dropped past the limit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleLog {
    entries: VecDeque<OracleLogEntry>,
}

impl OracleLog {
    pub fn push(&mut self, entry: OracleLogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > ORACLE_LOG_LIMIT {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> &VecDeque<OracleLogEntry> {
        &self.entries
    }

    pub fn last(&self) -> Option<&OracleLogEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct OracleClient {
    advisor: Arc<dyn Advisor>,
    min_interval: Duration,
    confidence_threshold: f64,
    last_consult: Option<Instant>,
    log: OracleLog,
}

impl OracleClient {
    pub fn new(advisor: Arc<dyn Advisor>, min_interval: Duration, confidence_threshold: f64) -> Self {
        Self {
            advisor,
            min_interval,
            confidence_threshold,
            last_consult: None,
            log: OracleLog::default(),
        }
    }

    pub fn log(&self) -> &OracleLog {
        &self.log
    }

    pub fn restore_log(&mut self, log: OracleLog) {
        self.log = log;
    }

    pub fn last_decision(&self) -> Option<&OracleDecision> {
        self.log.last().map(|e| &e.decision)
    }

    pub fn reset(&mut self) {
        self.log = OracleLog::default();
        self.last_consult = None;
    }

    /// Confident enough and not `NO_ACTION`
    pub fn is_actionable(&self, decision: &OracleDecision) -> bool {
        decision.recommendation != Recommendation::NoAction
            && decision.confidence > self.confidence_threshold
    }

    /// Ask the advisor. Rate-limited calls return `NO_ACTION` without
    /// touching the advisor or the log; failures are logged and degrade to
    /// `NO_ACTION` with confidence 0.
    pub async fn consult(&mut self, ctx: &OracleContext) -> OracleDecision {
        if let Some(last) = self.last_consult {
            if last.elapsed() < self.min_interval {
                debug!(cycle = ctx.cycle, "🔮 Oracle rate-limited");
                return OracleDecision::no_action("rate limited");
            }
        }
        self.last_consult = Some(Instant::now());

        let decision = match build_prompt(ctx) {
            Ok(prompt) => match self.advisor.consult(&prompt).await {
                Ok(reply) => parse_decision(&reply).unwrap_or_else(|e| {
                    warn!(error = %e, "🔮 Oracle reply unusable");
                    OracleDecision::no_action(e.to_string())
                }),
                Err(e) => {
                    warn!(error = %e, "🔮 Oracle consultation failed");
                    OracleDecision::no_action(e.to_string())
                }
            },
            Err(e) => OracleDecision::no_action(e.to_string()),
        };

        info!(
            cycle = ctx.cycle,
            reason = %ctx.reason,
            recommendation = %decision.recommendation,
            confidence = decision.confidence,
            "🔮 Oracle consulted"
        );
        self.log.push(OracleLogEntry {
            timestamp: Utc::now(),
            cycle: ctx.cycle,
            reason: ctx.reason,
            decision: decision.clone(),
            applied: false,
        });
        decision
    }

    /// Flag the latest decision as acted upon
    pub fn mark_applied(&mut self) {
        if let Some(last) = self.log.entries.back_mut() {
            last.applied = true;
        }
    }
}

fn build_prompt(ctx: &OracleContext) -> Result<String, AdvisorError> {
    let context = serde_json::to_string_pretty(ctx)
        .map_err(|e| AdvisorError::Malformed(format!("context serialization: {}", e)))?;
    Ok(format!(
        "You advise an evolutionary community of 25 paper-trading bots in 5 groups.\n\
         Reason for this consultation: {}.\n\
         Reply with a single JSON object:\n\
         {{\"recommendation\": \"ADJUST_PARAMS|MIGRATE_DNA|PAUSE_GROUP|BOOST_MUTATION|NO_ACTION\", \
         \"params\": {{\"mutation_boost\": number, \"evolution_interval\": number}}, \
         \"reasoning\": string, \"confidence\": number between 0 and 1}}\n\n\
         Community state:\n{}\n",
        ctx.reason, context
    ))
}

#[derive(Deserialize)]
struct RawDecision {
    recommendation: String,
    #[serde(default)]
    params: Option<DecisionParams>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Extract the first JSON object in `reply` and read a decision from it.
/// Confidence is clamped to 0..=1.
pub fn parse_decision(reply: &str) -> Result<OracleDecision, AdvisorError> {
    let start = reply
        .find('{')
        .ok_or_else(|| AdvisorError::Malformed("no JSON object in reply".to_string()))?;
    let end = reply
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| AdvisorError::Malformed("unterminated JSON object".to_string()))?;

    let raw: RawDecision = serde_json::from_str(&reply[start..=end])
        .map_err(|e| AdvisorError::Malformed(e.to_string()))?;
    let recommendation: Recommendation =
        serde_json::from_value(serde_json::Value::String(raw.recommendation.trim().to_uppercase()))
            .map_err(|_| {
                AdvisorError::Malformed(format!("unknown recommendation {}", raw.recommendation))
            })?;

    Ok(OracleDecision {
        recommendation,
        params: raw.params.unwrap_or_default(),
        reasoning: raw.reasoning.unwrap_or_default(),
        confidence: raw.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{MockAdvisor, ScriptedAdvisor};

    fn context() -> OracleContext {
        OracleContext {
            reason: ConsultReason::PeriodicReview,
            cycle: 500,
            community_bankroll: 2400.0,
            community_initial: 2500.0,
            groups: Vec::new(),
            top_dna: Vec::new(),
            recent_milestones: Vec::new(),
            drawdown_percent: 4.0,
        }
    }

    #[test]
    fn test_parses_json_wrapped_in_prose() {
        let reply = "Sure, here you go:\n```json\n{\"recommendation\": \"boost_mutation\", \
                     \"reasoning\": \"stagnating\", \"confidence\": 1.7}\n```";
        let d = parse_decision(reply).unwrap();
        assert_eq!(d.recommendation, Recommendation::BoostMutation);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.reasoning, "stagnating");

        let d = parse_decision(
            r#"{"recommendation":"ADJUST_PARAMS","params":{"mutationBoost":1.2},"confidence":0.8}"#,
        )
        .unwrap();
        assert_eq!(d.params.mutation_boost, Some(1.2));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_decision("no idea").is_err());
        assert!(parse_decision(r#"{"recommendation":"SELL_EVERYTHING"}"#).is_err());
        assert!(parse_decision("} {").is_err());
    }

    #[tokio::test]
    async fn test_failures_degrade_to_no_action() {
        let mut mock = MockAdvisor::new();
        mock.expect_consult()
            .times(1)
            .returning(|_| Err(AdvisorError::Timeout(Duration::from_secs(60))));
        let mut client = OracleClient::new(Arc::new(mock), Duration::ZERO, 0.5);

        let d = client.consult(&context()).await;
        assert_eq!(d.recommendation, Recommendation::NoAction);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(client.log().len(), 1);
        assert!(!client.is_actionable(&d));
    }

    #[tokio::test]
    async fn test_rate_limit_skips_advisor() {
        let mut mock = MockAdvisor::new();
        mock.expect_consult().times(1).returning(|prompt| {
            assert!(prompt.contains("periodic_review"));
            Ok(r#"{"recommendation":"PAUSE_GROUP","confidence":0.9}"#.to_string())
        });
        let mut client = OracleClient::new(Arc::new(mock), Duration::from_secs(300), 0.5);

        let first = client.consult(&context()).await;
        assert_eq!(first.recommendation, Recommendation::PauseGroup);
        assert!(client.is_actionable(&first));
        client.mark_applied();

        let second = client.consult(&context()).await;
        assert_eq!(second.recommendation, Recommendation::NoAction);
        assert_eq!(client.log().len(), 1);
        assert!(client.log().last().unwrap().applied);
    }

    #[tokio::test]
    async fn test_log_is_bounded() {
        let replies = vec![r#"{"recommendation":"NO_ACTION","confidence":0.1}"#; ORACLE_LOG_LIMIT + 5];
        let mut client = OracleClient::new(
            Arc::new(ScriptedAdvisor::new(replies)),
            Duration::ZERO,
            0.5,
        );
        for _ in 0..ORACLE_LOG_LIMIT + 5 {
            client.consult(&context()).await;
        }
        assert_eq!(client.log().len(), ORACLE_LOG_LIMIT);
    }
}
