//! End-to-end turns through `ChatOrchestrator` with fake collaborators

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{austin_listings, orchestrator, FailingSearch, ScriptedCompletion, SlowSearch, StaticSearch};
use estatewise::{ChatError, Config, ConversationContext, ExpertRole, RatingEvent, RatingValue, TurnRequest};

const ANSWER: &str = "L1 in Austin at $410,000 with 3 beds is the best fit.";

#[tokio::test]
async fn test_budget_elapses_with_one_slice() {
    let mut config = Config::default();
    config.router.max_concurrency = 2;
    config.router.coverage = 1.0;
    config.invoker.expert_timeout_ms = 5_000;
    config.invoker.turn_budget_ms = 200;

    let completion = Arc::new(
        ScriptedCompletion::answering(ANSWER)
            .slow_except(Duration::from_secs(2), &[ExpertRole::Data]),
    );
    let chat = orchestrator(config, StaticSearch::new(austin_listings()), completion);

    let started = Instant::now();
    let request = TurnRequest::new(
        ConversationContext::new("budget"),
        "market stats for 3 bed homes under $500k",
    );
    let reply = chat.handle_turn(&request).await;

    assert!(started.elapsed() < Duration::from_millis(1_500));
    assert_eq!(reply.primary_role, Some(ExpertRole::Data));
    assert!(reply.auxiliary.is_empty());
    assert_eq!(reply.unavailable_experts.len(), 1);
    assert!(!reply.degraded);

    let stats = chat.telemetry().get_stats();
    assert_eq!(stats.experts_invoked, 2);
    assert_eq!(stats.experts_succeeded, 1);
    assert_eq!(stats.experts_abandoned, 1);
}

#[tokio::test]
async fn test_total_failure_returns_fallback() {
    let chat = orchestrator(
        Config::default(),
        Arc::new(FailingSearch),
        Arc::new(ScriptedCompletion::failing()),
    );

    let request = TurnRequest::new(ConversationContext::new("down"), "homes under $300k in 78704");
    let reply = chat.handle_turn(&request).await;

    assert!(reply.degraded);
    assert!(reply.primary_role.is_none());
    assert_eq!(reply.text, Config::default().merger.fallback_text);
    assert!(!reply.unavailable_experts.is_empty());

    let stats = chat.telemetry().get_stats();
    assert_eq!(stats.retrieval_failures, 1);
    assert_eq!(stats.degraded_turns, 1);

    // Fallback replies have no owner to credit
    let err = chat
        .handle_rating(&RatingEvent::new(reply.message_id, "down", RatingValue::Up))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::UnknownMessage { .. }));
}

#[tokio::test]
async fn test_experts_down_but_evidence_present() {
    let chat = orchestrator(
        Config::default(),
        StaticSearch::new(austin_listings()),
        Arc::new(ScriptedCompletion::failing()),
    );

    let request = TurnRequest::new(ConversationContext::new("partial"), "3 bed homes under $500k");
    let reply = chat.handle_turn(&request).await;

    assert!(reply.degraded);
    assert!(reply.retrieved);
    assert!(reply.text.contains("L1"));
}

#[tokio::test]
async fn test_slow_search_is_soft() {
    let mut config = Config::default();
    config.search.timeout_ms = 50;

    let chat = orchestrator(
        config,
        Arc::new(SlowSearch(Duration::from_secs(1))),
        Arc::new(ScriptedCompletion::answering("Prices in that range vary a lot.")),
    );

    let started = Instant::now();
    let request = TurnRequest::new(ConversationContext::new("slow"), "2 bed condos under $350k");
    let reply = chat.handle_turn(&request).await;

    assert!(started.elapsed() < Duration::from_millis(900));
    assert!(!reply.degraded);
    assert!(reply.similar_homes.is_empty());
    assert_eq!(chat.telemetry().get_stats().retrieval_failures, 1);
}

#[tokio::test]
async fn test_repeat_question_hits_cache() {
    let search = StaticSearch::new(austin_listings());
    let completion = Arc::new(ScriptedCompletion::answering(ANSWER));
    let chat = orchestrator(Config::default(), search.clone(), completion.clone());

    let context = ConversationContext::new("cache");
    let first = chat
        .handle_turn(&TurnRequest::new(context.clone(), "3 bed homes under $500k"))
        .await;
    let calls_after_first = completion.call_count();
    assert!(calls_after_first > 0);

    let second = chat
        .handle_turn(&TurnRequest::new(context, "3 BED homes   under $500k"))
        .await;

    assert!(second.from_cache);
    assert_eq!(second.text, first.text);
    assert_ne!(second.message_id, first.message_id);
    assert_eq!(completion.call_count(), calls_after_first);
    assert_eq!(search.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(chat.telemetry().get_stats().cache_hits, 1);

    // The re-issued message is attributable too
    assert!(chat
        .handle_rating(&RatingEvent::new(second.message_id, "cache", RatingValue::Up))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_cache_disabled() {
    let mut config = Config::default();
    config.cache.enabled = false;
    let completion = Arc::new(ScriptedCompletion::answering(ANSWER));
    let chat = orchestrator(config, StaticSearch::new(austin_listings()), completion.clone());

    let request = TurnRequest::new(ConversationContext::new("nocache"), "3 bed homes under $500k");
    chat.handle_turn(&request).await;
    let second = chat.handle_turn(&request).await;

    assert!(!second.from_cache);
    assert_eq!(chat.telemetry().get_stats().cache_hits, 0);
}

#[tokio::test]
async fn test_reply_policy_applied() {
    let mut config = Config::default();
    config.merger.max_reply_chars = 80;

    let long_answer = format!(
        "Reach the listing agent at agent@austinhomes.com. {}",
        "The backyard is large and the kitchen was redone last year. ".repeat(5)
    );
    let chat = orchestrator(
        config,
        StaticSearch::new(austin_listings()),
        Arc::new(ScriptedCompletion::answering(&long_answer)),
    );

    let reply = chat
        .handle_turn(&TurnRequest::new(ConversationContext::new("policy"), "3 bed homes under $500k"))
        .await;

    assert!(reply.truncated);
    assert!(reply.redacted);
    assert!(reply.text.chars().count() <= 80);
    assert!(!reply.text.contains("austinhomes.com"));
}
