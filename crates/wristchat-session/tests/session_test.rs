use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use wristchat_llm::{ApiError, ChatRequest, ChatTransport, EventStream, StreamEvent};
use wristchat_session::{ChatSession, RefreshSink};
use wristchat_store::{today_key, ChatHistoryStore, SettingsStore};
use wristchat_types::Role;

enum Script {
    Events(Vec<StreamEvent>),
    EventsThenHang(Vec<StreamEvent>),
    EventsThenFail(Vec<StreamEvent>, String),
    Http { status: u16, body: String },
}

struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<ChatRequest>>,
}

impl ScriptedTransport {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open_stream(
        &self,
        _base_url: &str,
        _api_key: &str,
        request: &ChatRequest,
    ) -> Result<EventStream, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted response left");
        match script {
            Script::Events(events) => Ok(Box::pin(futures::stream::iter(
                events.into_iter().map(Ok),
            ))),
            Script::EventsThenHang(events) => {
                use futures::StreamExt;
                Ok(Box::pin(
                    futures::stream::iter(events.into_iter().map(Ok))
                        .chain(futures::stream::pending()),
                ))
            }
            Script::EventsThenFail(events, message) => {
                let items: Vec<Result<StreamEvent, ApiError>> = events
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(ApiError::Transport(message))))
                    .collect();
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Script::Http { status, body } => Err(ApiError::Http { status, body }),
        }
    }
}

#[derive(Default)]
struct CountingRefresh {
    count: AtomicUsize,
}

impl RefreshSink for CountingRefresh {
    fn request_refresh(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    _dir: TempDir,
    session: Arc<ChatSession>,
    transport: Arc<ScriptedTransport>,
    refresh: Arc<CountingRefresh>,
}

async fn harness(scripts: Vec<Script>) -> Harness {
    harness_with_key("sk-test", scripts).await
}

async fn harness_with_key(api_key: &str, scripts: Vec<Script>) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let history = ChatHistoryStore::open(dir.path().join("chat_history.json"));
    let settings = SettingsStore::open(dir.path().join("settings.json"));
    settings
        .save_settings(api_key, "gpt-4o", "https://api.openai.com/")
        .await
        .unwrap();

    let transport = ScriptedTransport::new(scripts);
    let refresh = Arc::new(CountingRefresh::default());
    let session = ChatSession::new(
        history,
        settings,
        transport.clone(),
        refresh.clone(),
    );
    session.bootstrap().await.unwrap();

    Harness {
        _dir: dir,
        session,
        transport,
        refresh,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

fn message(text: &str) -> StreamEvent {
    StreamEvent::Message {
        content: text.to_string(),
    }
}

#[tokio::test]
async fn streamed_deltas_accumulate_and_persist() {
    let h = harness(vec![Script::Events(vec![
        message("Hi"),
        message(" there"),
        StreamEvent::Usage { total_tokens: 12 },
        StreamEvent::Done {
            finish_reason: None,
        },
    ])])
    .await;

    h.session.send_message("Hello");

    let history = h.session.history().clone();
    wait_until(|| {
        history
            .current_chat()
            .is_some_and(|chat| chat.messages.len() == 2 && chat.messages[1].content == "Hi there")
    })
    .await;
    let streaming = h.session.is_streaming();
    wait_until(|| !*streaming.borrow()).await;

    let chat = history.current_chat().unwrap();
    assert_eq!(chat.title, "Hello");
    assert_eq!(chat.messages[0].role, Role::User);
    assert_eq!(chat.messages[0].content, "Hello");
    assert_eq!(chat.messages[1].role, Role::Assistant);
    assert_eq!(chat.messages[1].content, "Hi there");
    assert_eq!(history.snapshot().chats.len(), 1);

    assert_eq!(
        history.snapshot().daily_usage.get(&today_key()),
        Some(&12u64)
    );
    assert_eq!(h.refresh.count.load(Ordering::SeqCst), 1);
    assert!(h.session.last_error().borrow().is_none());

    let request = h.transport.last_request().unwrap();
    assert_eq!(request.model, "gpt-4o");
    assert!(request.stream);
    assert_eq!(request.messages.len(), 1);
}

#[tokio::test]
async fn missing_api_key_fails_fast_after_user_message_is_kept() {
    let h = harness_with_key("", vec![]).await;

    h.session.send_message("Hello");

    let errors = h.session.last_error();
    wait_until(|| errors.borrow().is_some()).await;

    assert_eq!(errors.borrow().as_deref(), Some("API Key is missing."));
    // No network call was made.
    assert_eq!(h.transport.calls(), 0);

    // The optimistic user-message append and title already happened; that
    // ordering is deliberate and is not rolled back.
    let chat = h.session.history().current_chat().unwrap();
    assert_eq!(chat.messages.len(), 1);
    assert_eq!(chat.messages[0].content, "Hello");
    assert_eq!(chat.title, "Hello");

    let streaming = h.session.is_streaming();
    wait_until(|| !*streaming.borrow()).await;
}

#[tokio::test]
async fn cancel_mid_stream_keeps_partial_output_without_error() {
    let h = harness(vec![Script::EventsThenHang(vec![message("Partial")])]).await;

    h.session.send_message("Hello");

    let current = h.session.current_chat();
    wait_until(|| {
        current
            .borrow()
            .as_ref()
            .is_some_and(|chat| chat.messages.len() == 2 && chat.messages[1].content == "Partial")
    })
    .await;

    h.session.stop_streaming().await;

    let chat = h.session.history().current_chat().unwrap();
    assert_eq!(chat.messages.len(), 2);
    assert_eq!(chat.messages[1].content, "Partial");
    assert!(h.session.last_error().borrow().is_none());
    assert!(!*h.session.is_streaming().borrow());
}

#[tokio::test]
async fn http_error_surfaces_without_seeding_an_assistant_message() {
    let h = harness(vec![Script::Http {
        status: 401,
        body: "unauthorized".to_string(),
    }])
    .await;

    h.session.send_message("Hello");

    let errors = h.session.last_error();
    wait_until(|| errors.borrow().is_some()).await;
    assert_eq!(errors.borrow().as_deref(), Some("Error 401: unauthorized"));

    // Only the user message was appended; no empty assistant slot remains.
    let chat = h.session.history().current_chat().unwrap();
    assert_eq!(chat.messages.len(), 1);

    let streaming = h.session.is_streaming();
    wait_until(|| !*streaming.borrow()).await;
}

#[tokio::test]
async fn transport_failure_persists_partial_and_reports_connection_error() {
    let h = harness(vec![Script::EventsThenFail(
        vec![message("Hi")],
        "boom".to_string(),
    )])
    .await;

    h.session.send_message("Hello");

    let errors = h.session.last_error();
    wait_until(|| errors.borrow().is_some()).await;
    assert_eq!(errors.borrow().as_deref(), Some("Connection failed: boom"));

    // The best-effort persist of the partial chat follows the error publish.
    let history = h.session.history().clone();
    wait_until(|| history.current_chat().is_some_and(|chat| chat.messages.len() == 2)).await;
    let chat = history.current_chat().unwrap();
    assert_eq!(chat.messages[1].content, "Hi");
}

#[tokio::test]
async fn reasoning_and_content_accumulate_separately() {
    let h = harness(vec![Script::Events(vec![
        StreamEvent::Reasoning {
            content: "let me ".to_string(),
        },
        StreamEvent::Reasoning {
            content: "think".to_string(),
        },
        message("Hi"),
        StreamEvent::Done {
            finish_reason: None,
        },
    ])])
    .await;

    h.session.send_message("Hello");

    let history = h.session.history().clone();
    let streaming = h.session.is_streaming();
    wait_until(|| {
        !*streaming.borrow()
            && history
                .current_chat()
                .is_some_and(|chat| chat.messages.len() == 2)
    })
    .await;

    let chat = history.current_chat().unwrap();
    assert_eq!(chat.messages[1].content, "Hi");
    assert_eq!(
        chat.messages[1].reasoning_content.as_deref(),
        Some("let me think")
    );
}

#[tokio::test]
async fn second_send_is_rejected_while_streaming() {
    let h = harness(vec![Script::EventsThenHang(vec![message("One")])]).await;

    h.session.send_message("first");

    let current = h.session.current_chat();
    wait_until(|| {
        current
            .borrow()
            .as_ref()
            .is_some_and(|chat| chat.messages.len() == 2)
    })
    .await;

    h.session.send_message("second");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.transport.calls(), 1);
    // The rejected send appended nothing.
    assert_eq!(current.borrow().as_ref().unwrap().messages.len(), 2);

    h.session.stop_streaming().await;
}

#[tokio::test]
async fn blank_text_is_rejected_before_any_work() {
    let h = harness(vec![]).await;
    let before = h.session.current_chat().borrow().clone().unwrap();

    h.session.send_message("   ");
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.transport.calls(), 0);
    let after = h.session.current_chat().borrow().clone().unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn second_turn_sends_the_full_message_list() {
    let h = harness(vec![
        Script::Events(vec![
            message("Hi"),
            StreamEvent::Done {
                finish_reason: None,
            },
        ]),
        Script::Events(vec![
            message("Fine"),
            StreamEvent::Done {
                finish_reason: None,
            },
        ]),
    ])
    .await;

    h.session.send_message("Hello");
    let history = h.session.history().clone();
    wait_until(|| history.current_chat().is_some_and(|c| c.messages.len() == 2)).await;
    let streaming = h.session.is_streaming();
    wait_until(|| !*streaming.borrow()).await;

    h.session.send_message("How are you?");
    wait_until(|| history.current_chat().is_some_and(|c| c.messages.len() == 4)).await;

    let request = h.transport.last_request().unwrap();
    let roles: Vec<&str> = request
        .messages
        .iter()
        .map(|m| m.role.as_str())
        .collect();
    assert_eq!(roles, vec!["user", "assistant", "user"]);
    assert_eq!(request.messages[2].content, "How are you?");
}

#[tokio::test]
async fn new_chat_is_published_but_not_persisted_until_sent() {
    let h = harness(vec![]).await;
    let persisted_before = h.session.history().snapshot().chats.len();

    let fresh = h.session.new_chat();

    assert_eq!(
        h.session.current_chat().borrow().as_ref().unwrap().id,
        fresh.id
    );
    assert_eq!(h.session.history().snapshot().chats.len(), persisted_before);
}

#[tokio::test]
async fn clear_all_history_keeps_ledger_and_rebootstraps() {
    let h = harness(vec![Script::Events(vec![
        message("Hi"),
        StreamEvent::Usage { total_tokens: 7 },
        StreamEvent::Done {
            finish_reason: None,
        },
    ])])
    .await;

    h.session.send_message("Hello");
    let history = h.session.history().clone();
    wait_until(|| !history.snapshot().daily_usage.is_empty()).await;
    let streaming = h.session.is_streaming();
    wait_until(|| !*streaming.borrow()).await;

    let refreshes_before = h.refresh.count.load(Ordering::SeqCst);
    let fresh = h.session.clear_all_history().await.unwrap();

    let snapshot = history.snapshot();
    assert_eq!(snapshot.chats.len(), 1);
    assert_eq!(snapshot.current_chat_id, fresh.id);
    assert_eq!(snapshot.daily_usage.get(&today_key()), Some(&7u64));
    assert_eq!(h.refresh.count.load(Ordering::SeqCst), refreshes_before + 1);
    assert!(fresh.messages.is_empty());
}
