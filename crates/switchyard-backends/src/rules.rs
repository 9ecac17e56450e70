//! Rule-based intent classifier.
//!
//! The cheapest backend: a fixed, ordered table of case-insensitive regex
//! rules evaluated locally. Confidence grows with the number of keyword hits
//! and drops when two intents score almost equally.

use async_trait::async_trait;
use regex::Regex;
use switchyard_abstraction::{BackendKind, ClassificationResult, Classifier, Complexity, BackendError};
use tracing::debug;

/// Confidence reported when no rule matches.
const FALLBACK_CONFIDENCE: f64 = 0.3;
/// Extra confidence per additional hit of the same rule.
const HIT_BONUS: f64 = 0.05;
/// Upper bound for rule confidence.
const MAX_CONFIDENCE: f64 = 0.99;
/// Runner-up scores within this margin make the winner ambiguous.
const AMBIGUITY_MARGIN: f64 = 0.1;
/// Penalty applied to ambiguous winners.
const AMBIGUITY_PENALTY: f64 = 0.15;

/// One pattern rule mapping text to an intent.
#[derive(Debug, Clone)]
pub struct IntentRule {
    /// Intent label produced when the rule wins.
    pub intent: String,
    /// Case-insensitive pattern.
    pub pattern: Regex,
    /// Minimum complexity implied by the intent.
    pub complexity: Complexity,
    /// Confidence for a single hit.
    pub base_confidence: f64,
}

impl IntentRule {
    /// Compiles a new rule. The pattern is matched case-insensitively.
    ///
    /// # Errors
    /// Returns an error if the pattern is not a valid regex.
    pub fn new(
        intent: impl Into<String>,
        pattern: &str,
        complexity: Complexity,
        base_confidence: f64,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            intent: intent.into(),
            pattern: Regex::new(&format!("(?i){}", pattern))?,
            complexity,
            base_confidence: base_confidence.clamp(0.0, MAX_CONFIDENCE),
        })
    }

    fn score(&self, text: &str) -> Option<f64> {
        let hits = self.pattern.find_iter(text).count();
        if hits == 0 {
            return None;
        }
        let bonus = HIT_BONUS * (hits - 1) as f64;
        Some((self.base_confidence + bonus).min(MAX_CONFIDENCE))
    }
}

/// Local rule engine backend.
#[derive(Debug, Clone)]
pub struct RulesBackend {
    rules: Vec<IntentRule>,
}

impl RulesBackend {
    /// Creates a rules backend with the built-in rule table.
    ///
    /// # Errors
    /// Returns an error if a built-in pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self::with_rules(Self::default_rules()?))
    }

    /// Creates a rules backend with a custom rule table (evaluated in order).
    #[must_use]
    pub fn with_rules(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    /// Returns the configured rules.
    #[must_use]
    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    fn default_rules() -> Result<Vec<IntentRule>, regex::Error> {
        Ok(vec![
            IntentRule::new("translation", r"\btranslate\b|\bin (french|spanish|german|japanese|chinese)\b", Complexity::Simple, 0.92)?,
            IntentRule::new("summarization", r"\b(summari[sz]e|summary|tl;?dr|condense|key points)\b", Complexity::Simple, 0.90)?,
            IntentRule::new(
                "code_generation",
                r"\b(write|implement|refactor|debug|fix)\b.*\b(code|function|class|script|bug|program)\b",
                Complexity::Moderate,
                0.86,
            )?,
            IntentRule::new("data_extraction", r"\b(extract|parse|list all|pull out)\b", Complexity::Moderate, 0.82)?,
            IntentRule::new("creative_writing", r"\b(story|poem|essay|lyrics|slogan)\b", Complexity::Moderate, 0.80)?,
            IntentRule::new(
                "analysis",
                r"\b(analy[sz]e|compare|evaluate|trade-?offs?|pros and cons)\b",
                Complexity::Complex,
                0.75,
            )?,
            IntentRule::new(
                "question_answering",
                r"^\s*(what|who|when|where|which|how many)\b|\?\s*$",
                Complexity::Simple,
                0.80,
            )?,
        ])
    }

    fn complexity_for(text: &str, floor: Complexity) -> Complexity {
        let words = text.split_whitespace().count();
        let by_length = if words > 60 {
            Complexity::Complex
        } else if words > 20 {
            Complexity::Moderate
        } else {
            Complexity::Simple
        };
        match (floor, by_length) {
            (Complexity::Complex, _) | (_, Complexity::Complex) => Complexity::Complex,
            (Complexity::Moderate, _) | (_, Complexity::Moderate) => Complexity::Moderate,
            _ => Complexity::Simple,
        }
    }

    fn techniques_for(complexity: Complexity) -> &'static [&'static str] {
        match complexity {
            Complexity::Simple => &["direct_answer"],
            Complexity::Moderate => &["step_by_step", "few_shot"],
            Complexity::Complex => &["chain_of_thought", "decomposition", "self_consistency"],
        }
    }

    /// Evaluates the rule table synchronously.
    #[must_use]
    pub fn evaluate(&self, text: &str) -> ClassificationResult {
        let mut scored: Vec<(&IntentRule, f64)> = self
            .rules
            .iter()
            .filter_map(|rule| rule.score(text).map(|score| (rule, score)))
            .collect();
        // Stable sort keeps table order for equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let word_count = text.split_whitespace().count();
        let matched: Vec<serde_json::Value> =
            scored.iter().map(|(rule, _)| serde_json::Value::from(rule.intent.clone())).collect();

        let Some(&(winner, mut confidence)) = scored.first() else {
            let complexity = Self::complexity_for(text, Complexity::Simple);
            return ClassificationResult::new("general", FALLBACK_CONFIDENCE, complexity)
                .with_techniques(Self::techniques_for(complexity).iter().copied())
                .with_metadata("matched_rules", serde_json::Value::Array(Vec::new()))
                .with_metadata("word_count", word_count.into());
        };

        if let Some(&(_, runner_up)) = scored.get(1) {
            if confidence - runner_up < AMBIGUITY_MARGIN {
                confidence = (confidence - AMBIGUITY_PENALTY).max(0.0);
            }
        }

        let complexity = Self::complexity_for(text, winner.complexity);
        ClassificationResult::new(winner.intent.clone(), confidence, complexity)
            .with_techniques(Self::techniques_for(complexity).iter().copied())
            .with_metadata("matched_rules", serde_json::Value::Array(matched))
            .with_metadata("word_count", word_count.into())
    }
}

#[async_trait]
impl Classifier for RulesBackend {
    async fn classify(&self, text: &str) -> Result<ClassificationResult, BackendError> {
        let result = self.evaluate(text);
        debug!(
            intent = %result.intent,
            confidence = result.confidence,
            complexity = %result.complexity,
            "RulesBackend classified text"
        );
        Ok(result)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Rules
    }
}
