use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use restock_agent::engine::{ChatRequest, ConversationEngine, TurnOutcome};
use restock_agent::llm::{LlmClient, LlmError};
use restock_core::domain::alternative::Alternative;
use restock_core::domain::conversation::ConversationId;
use restock_core::intent::IntentClassifier;
use restock_core::ranking::DEFAULT_BATCH_SIZE;
use restock_core::relevance::TokenHeuristicFilter;
use restock_db::repositories::{
    ConversationLogRepository, InMemoryConversationLogRepository,
    InMemoryRecommendationStateRepository, RecommendationStateRepository,
};

/// Deterministic generation stub. Scripted results are served in order;
/// once the script runs dry every call succeeds with a canned reply.
struct ScriptedLlm {
    script: Mutex<Vec<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn unscripted() -> Arc<Self> {
        Self::with_script(Vec::new())
    }

    fn with_script(script: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script), prompts: Mutex::new(Vec::new()) })
    }

    async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().await.push(prompt.to_owned());
        let mut script = self.script.lock().await;
        if script.is_empty() {
            Ok("Here you go!".to_owned())
        } else {
            script.remove(0)
        }
    }
}

struct Harness {
    engine: ConversationEngine,
    states: Arc<InMemoryRecommendationStateRepository>,
    log: Arc<InMemoryConversationLogRepository>,
    llm: Arc<ScriptedLlm>,
}

fn harness_with(llm: Arc<ScriptedLlm>) -> Harness {
    let states = Arc::new(InMemoryRecommendationStateRepository::default());
    let log = Arc::new(InMemoryConversationLogRepository::default());
    let engine = ConversationEngine::new(
        states.clone(),
        log.clone(),
        Arc::new(TokenHeuristicFilter),
        llm.clone(),
        IntentClassifier::default(),
        DEFAULT_BATCH_SIZE,
    );
    Harness { engine, states, log, llm }
}

fn candidate(name: &str, score: f64, quantity: Option<u32>) -> Alternative {
    Alternative { rank_score: score, available_quantity: quantity, ..Alternative::named(name) }
}

fn banana_request(conversation: &str) -> ChatRequest {
    ChatRequest {
        conversation_id: conversation.to_owned(),
        message: Some("my bananas are missing".to_owned()),
        original_product: Some("Banana A".to_owned()),
        missing_quantity: Some(30),
        candidates: vec![
            candidate("Banana B", 0.9, Some(100)),
            candidate("Banana C", 0.8, Some(80)),
            candidate("Apple A", 0.95, Some(200)),
        ],
    }
}

fn follow_up(conversation: &str, message: &str) -> ChatRequest {
    ChatRequest {
        conversation_id: conversation.to_owned(),
        message: Some(message.to_owned()),
        original_product: None,
        missing_quantity: None,
        candidates: Vec::new(),
    }
}

fn option_names(outcome: &TurnOutcome) -> Vec<String> {
    outcome.response().options.iter().map(|o| o.product_name.clone()).collect()
}

#[tokio::test]
async fn banana_first_call_then_more_is_exhausted() {
    let h = harness_with(ScriptedLlm::unscripted());

    let outcome = h.engine.handle(banana_request("conv-1")).await.expect("first call");
    assert!(matches!(outcome, TurnOutcome::Answered(_)));
    assert_eq!(option_names(&outcome), vec!["Banana B", "Banana C"]);

    let state = h
        .states
        .load(&ConversationId("conv-1".to_owned()))
        .await
        .expect("load")
        .expect("state present");
    assert_eq!(state.recommended_count(), 2);

    let more = h.engine.handle(follow_up("conv-1", "anything else?")).await.expect("more");
    assert!(matches!(more, TurnOutcome::Exhausted(_)));
    assert!(more.response().options.is_empty());
}

#[tokio::test]
async fn quantity_prefilter_drops_short_stock_regardless_of_score() {
    let h = harness_with(ScriptedLlm::unscripted());
    let mut request = banana_request("conv-q");
    request.candidates.push(candidate("Banana D", 0.99, Some(20)));

    let outcome = h.engine.handle(request).await.expect("first call");

    assert_eq!(option_names(&outcome), vec!["Banana B", "Banana C"]);
}

#[tokio::test]
async fn batches_paginate_without_skips_or_repeats() {
    let h = harness_with(ScriptedLlm::unscripted());
    let candidates: Vec<_> = (0..7)
        .map(|i| candidate(&format!("Banana {i}"), 1.0 - i as f64 / 10.0, None))
        .collect();
    let request = ChatRequest {
        conversation_id: "conv-p".to_owned(),
        message: None,
        original_product: Some("Banana A".to_owned()),
        missing_quantity: None,
        candidates,
    };

    let mut seen = Vec::new();
    let first = h.engine.handle(request).await.expect("first call");
    assert!(matches!(first, TurnOutcome::Answered(_)));
    seen.extend(option_names(&first));

    loop {
        let outcome = h.engine.handle(follow_up("conv-p", "more please")).await.expect("more");
        match outcome {
            TurnOutcome::Answered(_) => seen.extend(option_names(&outcome)),
            TurnOutcome::Exhausted(_) => break,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    let expected: Vec<String> = (0..7).map(|i| format!("Banana {i}")).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn generation_failure_does_not_advance_the_cursor() {
    let llm = ScriptedLlm::with_script(vec![
        Ok("first batch prose".to_owned()),
        Err(LlmError::Timeout(30)),
    ]);
    let h = harness_with(llm);
    let id = ConversationId("conv-f".to_owned());

    let request = ChatRequest {
        conversation_id: "conv-f".to_owned(),
        message: None,
        original_product: Some("Banana A".to_owned()),
        missing_quantity: None,
        candidates: (0..6)
            .map(|i| candidate(&format!("Banana {i}"), 1.0 - i as f64 / 10.0, None))
            .collect(),
    };
    h.engine.handle(request).await.expect("first call");
    assert_eq!(h.states.load(&id).await.expect("load").expect("state").recommended_count(), 3);

    // Second batch fails to render: apology, no options, cursor unmoved.
    let failed = h.engine.handle(follow_up("conv-f", "more")).await.expect("failed more");
    assert!(matches!(failed, TurnOutcome::GenerationFailed(_)));
    assert!(failed.response().options.is_empty());
    assert_eq!(h.states.load(&id).await.expect("load").expect("state").recommended_count(), 3);

    // Retry succeeds and serves exactly the batch the customer never saw.
    let retried = h.engine.handle(follow_up("conv-f", "more")).await.expect("retried more");
    assert_eq!(option_names(&retried), vec!["Banana 3", "Banana 4", "Banana 5"]);
    assert_eq!(h.states.load(&id).await.expect("load").expect("state").recommended_count(), 6);
}

#[tokio::test]
async fn first_call_generation_failure_keeps_first_batch_unshown() {
    let llm = ScriptedLlm::with_script(vec![Err(LlmError::Transport("boom".to_owned()))]);
    let h = harness_with(llm);
    let id = ConversationId("conv-fb".to_owned());

    let outcome = h.engine.handle(banana_request("conv-fb")).await.expect("first call");
    assert!(matches!(outcome, TurnOutcome::GenerationFailed(_)));
    assert!(outcome.response().options.is_empty());

    // State exists with an unmoved cursor; "more" serves the first batch.
    assert_eq!(h.states.load(&id).await.expect("load").expect("state").recommended_count(), 0);
    let more = h.engine.handle(follow_up("conv-fb", "more")).await.expect("more");
    assert_eq!(option_names(&more), vec!["Banana B", "Banana C"]);
}

#[tokio::test]
async fn no_relevant_candidates_persists_nothing() {
    let h = harness_with(ScriptedLlm::unscripted());
    let request = ChatRequest {
        conversation_id: "conv-n".to_owned(),
        message: None,
        original_product: Some("Banana A".to_owned()),
        missing_quantity: None,
        candidates: vec![candidate("Apple A", 0.95, Some(200))],
    };

    let outcome = h.engine.handle(request).await.expect("first call");
    assert!(matches!(outcome, TurnOutcome::NoCandidates(_)));
    assert!(outcome.response().options.is_empty());

    let state = h.states.load(&ConversationId("conv-n".to_owned())).await.expect("load");
    assert!(state.is_none());

    let more = h.engine.handle(follow_up("conv-n", "anything else?")).await.expect("more");
    assert!(matches!(more, TurnOutcome::NoActiveOrder(_)));
}

#[tokio::test]
async fn blank_candidate_name_is_rejected_as_contract_violation() {
    let h = harness_with(ScriptedLlm::unscripted());
    let mut request = banana_request("conv-bad");
    request.candidates.push(candidate("  ", 0.5, Some(50)));

    assert!(h.engine.handle(request).await.is_err());
}

#[tokio::test]
async fn candidates_without_an_original_product_are_rejected() {
    let h = harness_with(ScriptedLlm::unscripted());
    let mut request = banana_request("conv-noorig");
    request.original_product = None;

    assert!(h.engine.handle(request).await.is_err());
}

#[tokio::test]
async fn closing_message_resets_state_and_log() {
    let h = harness_with(ScriptedLlm::unscripted());
    let id = ConversationId("conv-e".to_owned());

    h.engine.handle(banana_request("conv-e")).await.expect("first call");
    assert!(h.states.load(&id).await.expect("load").is_some());
    assert!(!h.log.history(&id).await.expect("history").is_empty());

    let closing = h.engine.handle(follow_up("conv-e", "Thanks, bye!")).await.expect("closing");
    assert!(matches!(closing, TurnOutcome::Answered(_)));
    assert!(closing.response().options.is_empty());

    assert!(h.states.load(&id).await.expect("load").is_none());
    assert!(h.log.history(&id).await.expect("history").is_empty());

    // A fresh first call behaves like a brand-new conversation.
    let again = h.engine.handle(banana_request("conv-e")).await.expect("fresh first call");
    assert_eq!(option_names(&again), vec!["Banana B", "Banana C"]);
}

#[tokio::test]
async fn generic_follow_up_keeps_state_and_appends_log() {
    let h = harness_with(ScriptedLlm::unscripted());
    let id = ConversationId("conv-g".to_owned());

    h.engine.handle(banana_request("conv-g")).await.expect("first call");
    let count_before =
        h.states.load(&id).await.expect("load").expect("state").recommended_count();

    let outcome = h
        .engine
        .handle(follow_up("conv-g", "what's your return policy?"))
        .await
        .expect("generic");
    assert!(matches!(outcome, TurnOutcome::Answered(_)));
    assert!(outcome.response().options.is_empty());

    let count_after =
        h.states.load(&id).await.expect("load").expect("state").recommended_count();
    assert_eq!(count_before, count_after);

    let history = h.log.history(&id).await.expect("history");
    assert!(history.iter().any(|turn| turn.text == "what's your return policy?"));
}

#[tokio::test]
async fn prompts_name_only_batched_products() {
    let h = harness_with(ScriptedLlm::unscripted());

    h.engine.handle(banana_request("conv-pr")).await.expect("first call");

    let prompts = h.llm.prompts().await;
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Banana B"));
    assert!(prompts[0].contains("Banana C"));
    assert!(!prompts[0].contains("Apple A"));
}

#[tokio::test]
async fn deliberation_markers_are_stripped_from_replies() {
    let llm = ScriptedLlm::with_script(vec![Ok(
        "<think>rank order looks fine</think>Here are two great picks!".to_owned(),
    )]);
    let h = harness_with(llm);

    let outcome = h.engine.handle(banana_request("conv-s")).await.expect("first call");
    assert_eq!(outcome.response().answers, "Here are two great picks!");
}

#[tokio::test]
async fn conversations_are_isolated() {
    let h = harness_with(ScriptedLlm::unscripted());

    h.engine.handle(banana_request("conv-a")).await.expect("first call a");
    h.engine.handle(banana_request("conv-b")).await.expect("first call b");

    h.engine.handle(follow_up("conv-a", "thanks, bye")).await.expect("close a");

    let a = h.states.load(&ConversationId("conv-a".to_owned())).await.expect("load");
    let b = h.states.load(&ConversationId("conv-b".to_owned())).await.expect("load");
    assert!(a.is_none());
    assert_eq!(b.expect("state b").recommended_count(), 2);
}
