// tests/summarization_test.rs
// Threshold-triggered background consolidation behavior.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use engram::llm::client::SummarizationClient;
use engram::memory::service::MemoryService;
use engram::memory::store::{DocumentStore, StoreResult};
use engram::memory::types::{Event, MemoryDocument, Session, UserStats};

const APP: &str = "app";
const USER: &str = "user";

// ============================================================================
// TEST SETUP UTILITIES
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Default)]
struct FakeStore {
    document: Mutex<Option<MemoryDocument>>,
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn load(&self) -> StoreResult<Option<MemoryDocument>> {
        Ok(self.document.lock().unwrap().clone())
    }

    async fn save(&self, document: &MemoryDocument) -> StoreResult<()> {
        *self.document.lock().unwrap() = Some(document.clone());
        Ok(())
    }
}

/// Scripted summarization client: replies in order, can fail, and can be
/// gated so a generation call blocks until the test releases it.
struct FakeSummarizer {
    calls: AtomicUsize,
    replies: Vec<String>,
    fail: bool,
    gate: Option<Arc<Semaphore>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeSummarizer {
    fn replying(replies: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            replies: replies.iter().map(|reply| reply.to_string()).collect(),
            fail: false,
            gate: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        let mut client = Self::replying(&[]);
        client.fail = true;
        client
    }

    fn gated(reply: &str, gate: Arc<Semaphore>) -> Self {
        let mut client = Self::replying(&[reply]);
        client.gate = Some(gate);
        client
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl SummarizationClient for FakeSummarizer {
    async fn generate(&self, _model_id: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.fail {
            anyhow::bail!("generation unavailable");
        }

        let reply = self
            .replies
            .get(call)
            .or_else(|| self.replies.last())
            .expect("scripted reply");
        Ok(reply.clone())
    }
}

fn session_with_turns(id: &str, count: usize, topic: &str) -> Session {
    Session {
        id: id.to_string(),
        app_name: APP.to_string(),
        user_id: USER.to_string(),
        events: (0..count)
            .map(|i| Event::text("user", format!("{topic} note {i}")))
            .collect(),
    }
}

async fn wait_for_stats<F>(service: &MemoryService, what: &str, cond: F) -> UserStats
where
    F: Fn(&UserStats) -> bool,
{
    for _ in 0..500 {
        if let Some(stats) = service.user_stats(APP, USER).await.expect("user_stats") {
            if cond(&stats) {
                return stats;
            }
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn wait_for_calls(client: &FakeSummarizer, expected: usize) {
    for _ in 0..500 {
        if client.call_count() >= expected {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {expected} summarization call(s)");
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_below_threshold_never_invokes_client() {
    init_tracing();
    let store = Arc::new(FakeStore::default());
    let client = Arc::new(FakeSummarizer::replying(&["unused"]));
    let service =
        MemoryService::with_summarization(store, client.clone(), "gemini-test", 25);

    service
        .add_session(&session_with_turns("s1", 12, "groceries"))
        .await
        .expect("add s1");
    service
        .add_session(&session_with_turns("s2", 12, "travel"))
        .await
        .expect("add s2");

    sleep(Duration::from_millis(100)).await;
    assert_eq!(client.call_count(), 0, "24 turns must not trigger summarization");

    let stats = service
        .user_stats(APP, USER)
        .await
        .expect("user_stats")
        .expect("record exists");
    assert_eq!(stats.total_turns, 24);
    assert_eq!(stats.last_summarized_turn_count, 0);
    assert_eq!(stats.summary_count, 0);
}

#[tokio::test]
async fn test_threshold_triggers_exactly_one_summary() {
    init_tracing();
    let store = Arc::new(FakeStore::default());
    let client = Arc::new(FakeSummarizer::replying(&[
        "User likes apples and owns a canary.",
    ]));
    let service =
        MemoryService::with_summarization(store, client.clone(), "gemini-test", 25);

    service
        .add_session(&session_with_turns("s1", 13, "groceries"))
        .await
        .expect("add s1");
    service
        .add_session(&session_with_turns("s2", 12, "travel"))
        .await
        .expect("add s2");

    let stats = wait_for_stats(&service, "summary commit", |stats| {
        stats.summary_count == 1
    })
    .await;
    assert_eq!(client.call_count(), 1);
    assert_eq!(stats.last_summarized_turn_count, 25);
    assert_eq!(stats.total_turns, 25);

    // The summary is searchable and carries the prefix.
    let hits = service
        .search_memory(APP, USER, "canary")
        .await
        .expect("search summary");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].author, "memory_summarizer");
    assert_eq!(
        hits[0].text(),
        "Memory Summary: User likes apples and owns a canary."
    );

    // Original sessions remain individually searchable.
    let groceries = service
        .search_memory(APP, USER, "groceries")
        .await
        .expect("search s1");
    assert_eq!(groceries.len(), 13);
    let travel = service
        .search_memory(APP, USER, "travel")
        .await
        .expect("search s2");
    assert_eq!(travel.len(), 12);

    // No second run sneaks in afterwards.
    sleep(Duration::from_millis(100)).await;
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn test_failed_summarization_leaves_state_unchanged() {
    init_tracing();
    let store = Arc::new(FakeStore::default());
    let client = Arc::new(FakeSummarizer::failing());
    let service =
        MemoryService::with_summarization(store, client.clone(), "gemini-test", 25);

    service
        .add_session(&session_with_turns("s1", 25, "projects"))
        .await
        .expect("add s1");

    wait_for_calls(&client, 1).await;
    sleep(Duration::from_millis(100)).await;

    let stats = service
        .user_stats(APP, USER)
        .await
        .expect("user_stats")
        .expect("record exists");
    assert_eq!(stats.summary_count, 0, "failed run must not write a summary");
    assert_eq!(stats.last_summarized_turn_count, 0, "failed run must not advance the counter");

    let hits = service
        .search_memory(APP, USER, "projects")
        .await
        .expect("search");
    assert_eq!(hits.len(), 25, "history stays intact after a failure");

    // The backlog is still over the threshold, so the next ingestion
    // retries naturally.
    service
        .add_session(&session_with_turns("s2", 1, "retry"))
        .await
        .expect("add s2");
    wait_for_calls(&client, 2).await;
}

#[tokio::test]
async fn test_new_summary_replaces_previous_and_sees_its_text() {
    init_tracing();
    let store = Arc::new(FakeStore::default());
    let client = Arc::new(FakeSummarizer::replying(&[
        "Planning a trip to Rome.",
        "Trip booked, hotel near the Colosseum.",
    ]));
    let service = MemoryService::with_summarization(store, client.clone(), "gemini-test", 3);

    service
        .add_session(&session_with_turns("s1", 3, "flights"))
        .await
        .expect("add s1");
    wait_for_stats(&service, "first summary", |stats| {
        stats.last_summarized_turn_count == 3
    })
    .await;

    service
        .add_session(&session_with_turns("s2", 3, "hotels"))
        .await
        .expect("add s2");
    let stats = wait_for_stats(&service, "second summary", |stats| {
        stats.last_summarized_turn_count == 6
    })
    .await;

    assert_eq!(client.call_count(), 2);
    assert_eq!(stats.summary_count, 1, "new summary replaces the old one");

    // The second transcript starts from the first summary and still ends
    // with the fixed instruction.
    let second_prompt = client.prompt(1);
    assert!(
        second_prompt.contains("Previous Summary: Memory Summary: Planning a trip to Rome.")
    );
    assert!(second_prompt.contains("hotels note 0"));
    assert!(second_prompt.contains("Be concise."));

    let hits = service
        .search_memory(APP, USER, "colosseum")
        .await
        .expect("search");
    assert_eq!(hits.len(), 1);

    let stale = service
        .search_memory(APP, USER, "rome")
        .await
        .expect("search stale");
    assert!(stale.is_empty(), "replaced summary text is gone");
}

#[tokio::test]
async fn test_turns_ingested_during_summarization_stay_in_backlog() {
    init_tracing();
    let store = Arc::new(FakeStore::default());
    let gate = Arc::new(Semaphore::new(0));
    let client = Arc::new(FakeSummarizer::gated("Consolidated.", gate.clone()));
    let service = MemoryService::with_summarization(store, client.clone(), "gemini-test", 3);

    service
        .add_session(&session_with_turns("s1", 3, "alpha"))
        .await
        .expect("add s1");
    // The generate call has started (and is blocked), so the transcript
    // snapshot was taken at 3 turns.
    wait_for_calls(&client, 1).await;

    service
        .add_session(&session_with_turns("s2", 2, "beta"))
        .await
        .expect("add s2");

    gate.add_permits(1);
    let stats = wait_for_stats(&service, "summary commit", |stats| {
        stats.summary_count == 1
    })
    .await;

    assert_eq!(
        stats.last_summarized_turn_count, 3,
        "turns ingested mid-flight are not credited"
    );
    assert_eq!(stats.total_turns, 5);

    // The queued second run sees a 2-turn backlog and aborts without a
    // generate call.
    sleep(Duration::from_millis(100)).await;
    assert_eq!(client.call_count(), 1);

    // One more turn completes the next backlog and re-triggers.
    gate.add_permits(1);
    service
        .add_session(&session_with_turns("s3", 1, "gamma"))
        .await
        .expect("add s3");
    wait_for_calls(&client, 2).await;
}

#[tokio::test]
async fn test_disabled_summarization_never_condenses() {
    init_tracing();
    let store = Arc::new(FakeStore::default());
    let service = MemoryService::new(store);

    service
        .add_session(&session_with_turns("s1", 30, "chatter"))
        .await
        .expect("add_session");

    sleep(Duration::from_millis(100)).await;
    let stats = service
        .user_stats(APP, USER)
        .await
        .expect("user_stats")
        .expect("record exists");
    assert_eq!(stats.summary_count, 0);
    assert_eq!(stats.last_summarized_turn_count, 0);
    assert_eq!(stats.total_turns, 30);
}
