#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use mockito::{Matcher, Server};
use serde_json::json;
use toolwarden_runtime::{
    CompletionClient, CompletionConfig, CompletionResponse, Message, OpenAIClient, RuntimeError,
};

fn tool_schema() -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": "file_system",
            "description": "Files",
            "parameters": {"type": "object", "properties": {}}
        }
    })
}

#[tokio::test]
async fn test_tool_calls_are_returned_in_order() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "test-model",
            "tool_choice": "auto",
            "messages": [{"role": "user", "content": "save it"}]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [
                            {"id": "call_a", "type": "function",
                             "function": {"name": "file_system", "arguments": "{\"operation\":\"write\"}"}},
                            {"id": "call_b", "type": "function",
                             "function": {"name": "web_search", "arguments": "{}"}}
                        ]
                    }
                }]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let client = OpenAIClient::new(server.url(), "test-model", 0).with_api_key("test-key");
    let reply = client
        .complete(&[Message::user("save it")], &[tool_schema()])
        .await
        .unwrap();

    match reply {
        CompletionResponse::ToolCalls { calls, .. } => {
            let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, vec!["file_system", "web_search"]);
            assert_eq!(calls[0].id, "call_a");
            assert_eq!(calls[0].arguments, "{\"operation\":\"write\"}");
        }
        other => panic!("Expected tool calls, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_text_reply() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"All done."}}]}"#)
        .create_async()
        .await;

    let client = OpenAIClient::new(format!("{}/", server.url()), "m", 0);
    let reply = client.complete(&[Message::user("hi")], &[]).await.unwrap();
    assert_eq!(
        reply,
        CompletionResponse::Final {
            content: "All done.".to_string()
        }
    );
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .with_body("overloaded")
        .expect(2)
        .create_async()
        .await;

    let client = OpenAIClient::new(server.url(), "m", 1);
    let err = client.complete(&[Message::user("hi")], &[]).await.unwrap_err();
    match err {
        RuntimeError::Completion(msg) => {
            assert!(msg.contains("after 2 attempts"), "{}", msg);
            assert!(msg.contains("Server error"), "{}", msg);
        }
        other => panic!("Expected completion error, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_auth_failure_message() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body("bad key")
        .create_async()
        .await;

    let client = OpenAIClient::new(server.url(), "m", 0);
    let err = client.complete(&[Message::user("hi")], &[]).await.unwrap_err();
    assert!(err.to_string().contains("Authentication failed"));
}

#[tokio::test]
async fn test_circuit_breaker_opens_after_repeated_failures() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .expect(5)
        .create_async()
        .await;

    let client = OpenAIClient::new(server.url(), "m", 0);
    for _ in 0..5 {
        assert!(client.complete(&[Message::user("hi")], &[]).await.is_err());
    }
    let err = client.complete(&[Message::user("hi")], &[]).await.unwrap_err();
    assert!(err.to_string().contains("Circuit breaker open"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_from_config_uses_env_key() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer from-env")
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"content":"ok"}}]}"#)
        .create_async()
        .await;

    std::env::set_var("TOOLWARDEN_TEST_COMPLETION_KEY", "from-env");
    let config = CompletionConfig {
        base_url: server.url(),
        model: "m".to_string(),
        api_key_env: "TOOLWARDEN_TEST_COMPLETION_KEY".to_string(),
        max_retries: 0,
        request_timeout_secs: 5,
    };
    let client = OpenAIClient::from_config(&config);
    assert_eq!(client.model(), "m");
    client.complete(&[Message::user("hi")], &[]).await.unwrap();
    mock.assert_async().await;
}
