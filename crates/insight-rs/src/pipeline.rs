//! End-to-end insight generation: aggregate → compose → send → restore.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::InsightKind;
use crate::aggregate::{Aggregation, DataSource, TimeWindowAggregator, validate_aggregation};
use crate::api::{BudgetedInsightClient, InsightRequest, InsightResponse};
use crate::prompt::{
    Prompt, PromptConfig, build_evening_prompt, build_fallback_prompt, build_morning_prompt,
    optimize_for_token_budget, validate_prompt_size,
};
use crate::redact::{RedactionMap, unscrub};

/// Runs one insight request through every stage.
///
/// Degrades instead of failing: an invalid aggregation switches to the
/// generic fallback prompt, an oversized prompt is trimmed to budget, and
/// API failures come back as [`InsightResponse::Fallback`].
#[derive(Debug)]
pub struct InsightPipeline {
    aggregator: TimeWindowAggregator,
    prompt_config: PromptConfig,
    client: BudgetedInsightClient,
}

impl InsightPipeline {
    /// Build a pipeline whose aggregator uses the prompt language.
    pub fn new(prompt_config: PromptConfig, client: BudgetedInsightClient) -> Self {
        Self {
            aggregator: TimeWindowAggregator::new(prompt_config.language),
            prompt_config,
            client,
        }
    }

    /// Replace the aggregator, e.g. with a seeded one.
    pub fn with_aggregator(mut self, aggregator: TimeWindowAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn client(&self) -> &BudgetedInsightClient {
        &self.client
    }

    pub fn prompt_config(&self) -> &PromptConfig {
        &self.prompt_config
    }

    pub async fn generate_insight(
        &self,
        kind: InsightKind,
        user_id: &str,
        source: &dyn DataSource,
    ) -> InsightResponse {
        self.generate_insight_at(kind, user_id, source, Utc::now())
            .await
    }

    /// Generate an insight for the window ending at `now`.
    pub async fn generate_insight_at(
        &self,
        kind: InsightKind,
        user_id: &str,
        source: &dyn DataSource,
        now: DateTime<Utc>,
    ) -> InsightResponse {
        let prompt = self.build_prompt_at(kind, user_id, source, now).await;
        let redactions = prompt.redactions.clone();
        let response = self
            .client
            .send_request(&InsightRequest::new(prompt, user_id))
            .await;
        restore_placeholders(response, &redactions)
    }

    pub async fn aggregate_at(
        &self,
        kind: InsightKind,
        user_id: &str,
        source: &dyn DataSource,
        now: DateTime<Utc>,
    ) -> Aggregation {
        match kind {
            InsightKind::Evening => self
                .aggregator
                .aggregate_evening_at(user_id, source, now)
                .await
                .into(),
            InsightKind::Morning => self
                .aggregator
                .aggregate_morning_at(user_id, source, now)
                .await
                .into(),
        }
    }

    /// Aggregate and compose the prompt that would be sent, within budget.
    pub async fn build_prompt_at(
        &self,
        kind: InsightKind,
        user_id: &str,
        source: &dyn DataSource,
        now: DateTime<Utc>,
    ) -> Prompt {
        let aggregation = self.aggregate_at(kind, user_id, source, now).await;
        let prompt = self.compose(kind, &aggregation);

        if validate_prompt_size(&prompt) {
            prompt
        } else {
            debug!(
                "Prompt for {user_id} estimated at {} tokens; trimming",
                prompt.estimated_token_count
            );
            optimize_for_token_budget(&prompt, None)
        }
    }

    fn compose(&self, kind: InsightKind, aggregation: &Aggregation) -> Prompt {
        if !validate_aggregation(aggregation) {
            let range = aggregation.data_range();
            warn!(
                "Invalid aggregation range {} .. {}; using fallback prompt",
                range.start_iso(),
                range.end_iso()
            );
            return build_fallback_prompt(kind, self.prompt_config.language);
        }
        match aggregation {
            Aggregation::Evening(a) => build_evening_prompt(a, &self.prompt_config),
            Aggregation::Morning(a) => build_morning_prompt(a, &self.prompt_config),
        }
    }
}

/// Put original values back into a completion scrubbed on the way out.
fn restore_placeholders(response: InsightResponse, redactions: &RedactionMap) -> InsightResponse {
    match response {
        InsightResponse::Completion(mut completion) if !redactions.is_empty() => {
            completion.content = unscrub(&completion.content, redactions);
            InsightResponse::Completion(completion)
        }
        other => other,
    }
}
