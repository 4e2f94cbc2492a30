use gptchat::{
    ChatOptions, ClientConfig, GptChat, Message, StreamAccumulator, StreamError, StreamState,
};
use mockito::Matcher;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn chat_for(server: &mockito::Server) -> GptChat {
    let config = ClientConfig {
        base_url: server.url(),
        ..ClientConfig::with_api_key("sk-test")
    };
    GptChat::new(config).unwrap()
}

const SSE_BODY: &str = concat!(
    "data: {\"id\":\"chatcmpl-1\",\"object\":\"chat.completion.chunk\",\"created\":1677652288,\"model\":\"gpt-3.5-turbo\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n",
    "\n",
    "data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\r\n",
    "\n",
    "data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n",
    "\n",
    "data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
    "\n",
    "data: [DONE]\n",
);

#[tokio::test]
async fn test_stream_end_to_end() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_header("accept", "text/event-stream")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "gpt-3.5-turbo",
            "stream": true,
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(SSE_BODY)
        .create_async()
        .await;

    let chat = chat_for(&server);
    let accumulator = Arc::new(Mutex::new(StreamAccumulator::new()));
    let deltas = Arc::new(Mutex::new(Vec::new()));
    let finish = Arc::new(Mutex::new(None));

    let handle = chat.chat_stream(vec![Message::user("Hi")], &ChatOptions::new());
    {
        let accumulator = accumulator.clone();
        let deltas = deltas.clone();
        handle.on_message(move |delta, record| {
            deltas.lock().push(delta.to_string());
            accumulator.lock().push(record);
        });
    }
    {
        let finish = finish.clone();
        handle.on_done(move |reason| *finish.lock() = Some(reason.to_string()));
    }
    handle.on_error(|err| panic!("unexpected stream error: {}", err));

    assert_eq!(handle.finished().await, StreamState::Done);
    mock.assert_async().await;

    // The finish_reason record carries no content, so it produces no message
    assert_eq!(*deltas.lock(), vec!["", "Hel", "lo"]);
    assert_eq!(finish.lock().as_deref(), Some("stop"));

    let accumulator = std::mem::take(&mut *accumulator.lock());
    assert_eq!(accumulator.id.as_deref(), Some("chatcmpl-1"));
    let message = accumulator.into_message();
    assert_eq!(message.content, "Hello");
}

#[tokio::test]
async fn test_stream_rate_limited() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#)
        .create_async()
        .await;

    let chat = chat_for(&server);
    let (tx, rx) = tokio::sync::oneshot::channel();
    let messages = Arc::new(Mutex::new(0usize));

    let dispatcher = {
        let messages = messages.clone();
        chat.stream_dispatcher()
            .on_message(move |_, _| *messages.lock() += 1)
            .on_done(|reason| panic!("unexpected done: {}", reason))
            .on_error(move |err| {
                let _ = tx.send(err);
            })
    };
    let handle = chat.chat_stream_with(dispatcher, vec![Message::user("Hi")], &ChatOptions::new());

    match rx.await.unwrap() {
        StreamError::Upstream { status, error } => {
            assert_eq!(status, Some(429));
            assert_eq!(error.message.as_deref(), Some("Rate limit reached"));
            assert_eq!(error.kind.as_deref(), Some("requests"));
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
    assert_eq!(*messages.lock(), 0);
    assert_eq!(handle.finished().await, StreamState::Failed);
}

#[tokio::test]
async fn test_stream_framing_error_after_messages() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "event: ping\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
        ))
        .create_async()
        .await;

    let chat = chat_for(&server);
    let deltas = Arc::new(Mutex::new(Vec::new()));
    let error = Arc::new(Mutex::new(None));

    let dispatcher = {
        let deltas = deltas.clone();
        let error = error.clone();
        chat.stream_dispatcher()
            .on_message(move |delta, _| deltas.lock().push(delta.to_string()))
            .on_error(move |err| *error.lock() = Some(err.kind()))
    };
    let handle = chat.chat_stream_with(dispatcher, vec![Message::user("Hi")], &ChatOptions::new());

    assert_eq!(handle.finished().await, StreamState::Failed);
    assert_eq!(*deltas.lock(), vec!["a"]);
    assert_eq!(*error.lock(), Some("framing"));
}

#[tokio::test]
async fn test_stream_body_ends_without_finish_reason() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body("data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n")
        .create_async()
        .await;

    let chat = chat_for(&server);
    let terminal = Arc::new(Mutex::new(0usize));

    let dispatcher = {
        let on_done = terminal.clone();
        let on_error = terminal.clone();
        chat.stream_dispatcher()
            .on_done(move |_| *on_done.lock() += 1)
            .on_error(move |_| *on_error.lock() += 1)
    };
    let handle = chat.chat_stream_with(dispatcher, vec![Message::user("Hi")], &ChatOptions::new());

    assert_eq!(handle.finished().await, StreamState::Done);
    assert_eq!(*terminal.lock(), 0);
}
