//! Mock scorer for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use gradewise_core::traits::{parse_criterion_score, CriterionScore, CriterionScorer, ScoreRequest};
use gradewise_core::ScorerError;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Score { score: f64, rationale: String },
    /// Raw model text, parsed like a real provider response.
    Raw(String),
    Fail(ScorerError),
}

impl MockResponse {
    pub fn score(score: f64, rationale: &str) -> Self {
        MockResponse::Score {
            score,
            rationale: rationale.to_string(),
        }
    }
}

/// A mock scorer for exercising grading without real API calls.
///
/// Replies are scripted per criterion id. A criterion with several scripted
/// replies gets them in order, repeating the last one.
pub struct MockScorer {
    scripts: HashMap<String, Vec<MockResponse>>,
    default_response: MockResponse,
    delay: Option<Duration>,
    call_count: AtomicU32,
    calls_by_criterion: Mutex<HashMap<String, usize>>,
    last_request: Mutex<Option<ScoreRequest>>,
}

impl MockScorer {
    /// A mock that answers every criterion with the same score.
    pub fn with_fixed_score(score: f64, rationale: &str) -> Self {
        Self {
            scripts: HashMap::new(),
            default_response: MockResponse::score(score, rationale),
            delay: None,
            call_count: AtomicU32::new(0),
            calls_by_criterion: Mutex::new(HashMap::new()),
            last_request: Mutex::new(None),
        }
    }

    /// Script a single reply for `criterion_id`.
    pub fn respond(self, criterion_id: &str, response: MockResponse) -> Self {
        self.respond_sequence(criterion_id, vec![response])
    }

    /// Script successive replies for `criterion_id`.
    pub fn respond_sequence(mut self, criterion_id: &str, responses: Vec<MockResponse>) -> Self {
        self.scripts.insert(criterion_id.to_string(), responses);
        self
    }

    /// Wait before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Total number of calls made.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Calls made for one criterion.
    pub fn calls_for(&self, criterion_id: &str) -> usize {
        self.calls_by_criterion
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(criterion_id)
            .copied()
            .unwrap_or(0)
    }

    /// The last request received.
    pub fn last_request(&self) -> Option<ScoreRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_response(&self, criterion_id: &str) -> MockResponse {
        let call = {
            let mut calls = self
                .calls_by_criterion
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let count = calls.entry(criterion_id.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };
        match self.scripts.get(criterion_id) {
            Some(script) if !script.is_empty() => script[call.min(script.len() - 1)].clone(),
            _ => self.default_response.clone(),
        }
    }
}

#[async_trait]
impl CriterionScorer for MockScorer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn score(&self, request: &ScoreRequest) -> Result<CriterionScore, ScorerError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        let response = self.next_response(&request.criterion.id);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match response {
            MockResponse::Score { score, rationale } => Ok(CriterionScore::new(score, rationale)),
            MockResponse::Raw(text) => parse_criterion_score(&text),
            MockResponse::Fail(e) => Err(e),
        }
    }
}
