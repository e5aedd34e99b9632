use std::sync::Arc;
use std::time::Duration;

use ai_client::truncate_chars;
use tracing::{debug, info, warn};

use pagewatch_common::{HeuristicResult, RelevanceDecision, RelevanceMode, SiteConfig};

use crate::heuristic;
use crate::traits::{ClassifierVerdict, RelevanceClassifier};

pub const DEFAULT_CHAR_BUDGET: usize = 6000;
pub const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of evaluating one change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: RelevanceDecision,
    pub heuristic: HeuristicResult,
    pub classifier_invoked: bool,
}

/// Turns a detected change into a notify decision.
///
/// Strict sites pass through the heuristic gate and only reach the classifier
/// on a hit. Loose sites always notify and use the classifier for a summary.
/// Any classifier failure on the strict path fails open.
#[derive(Clone)]
pub struct RelevanceCoordinator {
    classifier: Option<Arc<dyn RelevanceClassifier>>,
    char_budget: usize,
    timeout: Duration,
}

impl RelevanceCoordinator {
    pub fn new(classifier: Option<Arc<dyn RelevanceClassifier>>) -> Self {
        Self {
            classifier,
            char_budget: DEFAULT_CHAR_BUDGET,
            timeout: DEFAULT_CLASSIFIER_TIMEOUT,
        }
    }

    pub fn with_char_budget(mut self, char_budget: usize) -> Self {
        self.char_budget = char_budget;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn evaluate(&self, site: &SiteConfig, old_text: &str, new_text: &str) -> Evaluation {
        let heuristic = heuristic::evaluate(new_text, &site.goal);

        match site.relevance_mode {
            RelevanceMode::Strict => self.strict(site, old_text, new_text, heuristic).await,
            RelevanceMode::Loose => self.loose(site, old_text, new_text, heuristic).await,
        }
    }

    async fn strict(
        &self,
        site: &SiteConfig,
        old_text: &str,
        new_text: &str,
        heuristic: HeuristicResult,
    ) -> Evaluation {
        if !heuristic.hit {
            debug!(site = %site.id, detail = %heuristic.detail, "Heuristic miss, not escalating");
            return Evaluation {
                decision: RelevanceDecision {
                    notify: false,
                    reason: format!("heuristic miss ({})", heuristic.detail),
                    summary: String::new(),
                },
                heuristic,
                classifier_invoked: false,
            };
        }

        let Some(ref classifier) = self.classifier else {
            warn!(site = %site.id, "Strict site has no classifier, failing open");
            return Evaluation {
                decision: RelevanceDecision {
                    notify: true,
                    reason: format!("no classifier configured; heuristic: {}", heuristic.detail),
                    summary: String::new(),
                },
                heuristic,
                classifier_invoked: false,
            };
        };

        let decision = match self.classify(classifier.as_ref(), site, old_text, new_text).await {
            Ok(verdict) => {
                info!(site = %site.id, relevant = verdict.relevant, "Classifier verdict");
                RelevanceDecision {
                    notify: verdict.relevant,
                    reason: verdict.reason,
                    summary: verdict.summary,
                }
            }
            Err(failure) => {
                warn!(site = %site.id, error = %failure, "Classifier failed, treating change as relevant");
                RelevanceDecision {
                    notify: true,
                    reason: failure,
                    summary: String::new(),
                }
            }
        };

        Evaluation {
            decision,
            heuristic,
            classifier_invoked: true,
        }
    }

    async fn loose(
        &self,
        site: &SiteConfig,
        old_text: &str,
        new_text: &str,
        heuristic: HeuristicResult,
    ) -> Evaluation {
        let reason = format!("loose mode; heuristic: {}", heuristic.detail);

        let (summary, classifier_invoked) = match self.classifier {
            Some(ref classifier) => {
                match self.classify(classifier.as_ref(), site, old_text, new_text).await {
                    Ok(verdict) => (verdict.summary, true),
                    Err(failure) => {
                        warn!(site = %site.id, error = %failure, "Summary unavailable");
                        (String::new(), true)
                    }
                }
            }
            None => (String::new(), false),
        };

        Evaluation {
            decision: RelevanceDecision {
                notify: true,
                reason,
                summary,
            },
            heuristic,
            classifier_invoked,
        }
    }

    /// Run the classifier on budget-truncated texts. Errors come back as display text.
    async fn classify(
        &self,
        classifier: &dyn RelevanceClassifier,
        site: &SiteConfig,
        old_text: &str,
        new_text: &str,
    ) -> Result<ClassifierVerdict, String> {
        let old = truncate_chars(old_text, self.char_budget);
        let new = truncate_chars(new_text, self.char_budget);

        match tokio::time::timeout(self.timeout, classifier.classify(old, new, &site.goal)).await {
            Ok(Ok(verdict)) => Ok(verdict),
            Ok(Err(e)) => Err(format!("classifier error: {e:#}")),
            Err(_) => Err(format!(
                "classifier timed out after {}s",
                self.timeout.as_secs_f64()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClassifier;

    fn site(mode: RelevanceMode) -> SiteConfig {
        let mut site = SiteConfig::new("bistro", "https://example.com");
        site.relevance_mode = mode;
        site.goal.keywords = vec!["available".to_string()];
        site
    }

    #[tokio::test]
    async fn strict_miss_never_calls_classifier() {
        let classifier = Arc::new(MockClassifier::relevant("yes"));
        let coordinator = RelevanceCoordinator::new(Some(classifier.clone()));

        let eval = coordinator
            .evaluate(&site(RelevanceMode::Strict), "old", "available but sold out")
            .await;

        assert!(!eval.decision.notify);
        assert!(!eval.classifier_invoked);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn strict_hit_uses_verdict() {
        let classifier = Arc::new(MockClassifier::irrelevant("only lunch slots"));
        let coordinator = RelevanceCoordinator::new(Some(classifier.clone()));

        let eval = coordinator
            .evaluate(&site(RelevanceMode::Strict), "old", "lunch available")
            .await;

        assert!(!eval.decision.notify);
        assert!(eval.classifier_invoked);
        assert_eq!(eval.decision.reason, "only lunch slots");
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn classifier_error_fails_open() {
        let classifier = Arc::new(MockClassifier::failing("invalid tool payload"));
        let coordinator = RelevanceCoordinator::new(Some(classifier));

        let eval = coordinator
            .evaluate(&site(RelevanceMode::Strict), "old", "dinner available")
            .await;

        assert!(eval.decision.notify);
        assert!(eval.decision.reason.contains("invalid tool payload"));
    }

    #[tokio::test]
    async fn classifier_timeout_fails_open() {
        let classifier =
            Arc::new(MockClassifier::relevant("late").with_delay(Duration::from_millis(200)));
        let coordinator =
            RelevanceCoordinator::new(Some(classifier)).with_timeout(Duration::from_millis(20));

        let eval = coordinator
            .evaluate(&site(RelevanceMode::Strict), "old", "dinner available")
            .await;

        assert!(eval.decision.notify);
        assert!(eval.decision.reason.contains("timed out"));
    }

    #[tokio::test]
    async fn texts_are_truncated_to_budget() {
        let classifier = Arc::new(MockClassifier::relevant("ok"));
        let coordinator = RelevanceCoordinator::new(Some(classifier.clone())).with_char_budget(10);

        let new_text = format!("available {}", "é".repeat(50));
        coordinator
            .evaluate(&site(RelevanceMode::Strict), &"x".repeat(50), &new_text)
            .await;

        let (old, new) = classifier.last_inputs().unwrap();
        assert_eq!(old.chars().count(), 10);
        assert_eq!(new.chars().count(), 10);
        assert_eq!(new, "available ");
    }

    #[tokio::test]
    async fn loose_ignores_verdict_and_keeps_summary() {
        let classifier =
            Arc::new(MockClassifier::irrelevant("no").with_summary("Menu text changed"));
        let coordinator = RelevanceCoordinator::new(Some(classifier));

        let eval = coordinator
            .evaluate(&site(RelevanceMode::Loose), "old", "new menu")
            .await;

        assert!(eval.decision.notify);
        assert_eq!(eval.decision.summary, "Menu text changed");
        assert!(eval.decision.reason.contains("heuristic"));
    }

    #[tokio::test]
    async fn loose_without_classifier_still_notifies() {
        let coordinator = RelevanceCoordinator::new(None);

        let eval = coordinator
            .evaluate(&site(RelevanceMode::Loose), "old", "new")
            .await;

        assert!(eval.decision.notify);
        assert!(!eval.classifier_invoked);
        assert!(eval.decision.summary.is_empty());
    }
}
