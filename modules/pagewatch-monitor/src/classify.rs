use ai_client::Claude;
use async_trait::async_trait;

use pagewatch_common::Goal;

use crate::traits::{ClassifierVerdict, RelevanceClassifier};

const SYSTEM_PROMPT: &str = "\
You watch web pages on behalf of someone waiting for something specific, \
such as a reservation slot, a ticket release or a restock. You are shown the \
previous and current text of a page and the person's goal.

Decide whether the change moves them closer to their goal. Cosmetic edits, \
rotating banners, counters, timestamps and changes that only confirm \
unavailability are NOT relevant. New availability that plausibly matches the \
goal (date, party size, item) IS relevant.

Respond with:
- relevant: true or false
- reason: one sentence explaining the verdict
- summary: one or two sentences describing what changed on the page";

/// Semantic relevance check backed by Claude structured output.
pub struct ClaudeClassifier {
    claude: Claude,
}

impl ClaudeClassifier {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            claude: Claude::new(api_key, model),
        }
    }

    pub fn model(&self) -> &str {
        self.claude.model()
    }
}

pub(crate) fn build_user_prompt(old_text: &str, new_text: &str, goal: &Goal) -> String {
    let mut goal_lines = Vec::new();
    if !goal.description.is_empty() {
        goal_lines.push(format!("Goal: {}", goal.description));
    }
    if let Some(date) = goal.target_date {
        goal_lines.push(format!("Target date: {date}"));
    }
    if let Some(size) = goal.party_size {
        goal_lines.push(format!("Party size: {size}"));
    }
    if !goal.keywords.is_empty() {
        goal_lines.push(format!("Looking for: {}", goal.keywords.join(", ")));
    }
    if !goal.negative_hints.is_empty() {
        goal_lines.push(format!("Signs of no availability: {}", goal.negative_hints.join(", ")));
    }
    if goal_lines.is_empty() {
        goal_lines.push("Goal: any meaningful new availability".to_string());
    }

    format!(
        "{}\n\n--- PREVIOUS PAGE TEXT ---\n{old_text}\n\n--- CURRENT PAGE TEXT ---\n{new_text}",
        goal_lines.join("\n")
    )
}

#[async_trait]
impl RelevanceClassifier for ClaudeClassifier {
    async fn classify(
        &self,
        old_text: &str,
        new_text: &str,
        goal: &Goal,
    ) -> anyhow::Result<ClassifierVerdict> {
        let user = build_user_prompt(old_text, new_text, goal);
        let verdict = self
            .claude
            .extract::<ClassifierVerdict>(SYSTEM_PROMPT, user)
            .await?;
        Ok(verdict)
    }
}
