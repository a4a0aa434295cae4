//! Provider integration tests against the live API.
//!
//! These tests are skipped when `OPENAI_API_KEY` is not set.
//! Run with: `cargo test -p popup-genius-providers --test integration`

use futures::StreamExt;
use popup_genius_providers::{
    ChatTurn, CompletionRequest, Credentials, LlmProvider, OpenAiProvider, ToolDefinition,
};

fn openai_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

#[tokio::test]
async fn test_openai_simple_completion() {
    let Some(api_key) = openai_key() else {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    };
    let provider = OpenAiProvider::openai(None);
    let credentials = Credentials::ApiKey { api_key };

    let request = CompletionRequest {
        model: "gpt-4.1-mini".into(),
        messages: provider.format_messages(&[ChatTurn::User {
            text: "Reply with exactly the word 'hello'.".into(),
        }]),
        max_tokens: 20,
        temperature: Some(0.0),
        tools: None,
        system: Some("You are a helpful assistant. Follow instructions exactly.".into()),
    };

    let mut stream = provider
        .stream(&request, &credentials)
        .await
        .expect("Stream creation failed");

    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.expect("Stream chunk error");
        if let Some(delta) = chunk.delta {
            text.push_str(&delta);
        }
    }
    assert!(
        text.to_lowercase().contains("hello"),
        "Expected 'hello' in response, got: {text}"
    );
}

#[tokio::test]
async fn test_openai_tool_call() {
    let Some(api_key) = openai_key() else {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    };
    let provider = OpenAiProvider::openai(None);
    let credentials = Credentials::ApiKey { api_key };

    let tools = provider.format_tools(&[ToolDefinition {
        name: "analyze_competitors".into(),
        description: "Analyze competitor popup strategies for a business".into(),
        parameters_schema: serde_json::json!({
            "type": "object",
            "properties": { "business_description": { "type": "string" } },
            "required": ["business_description"],
        }),
    }]);

    let request = CompletionRequest {
        model: "gpt-4.1-mini".into(),
        messages: provider.format_messages(&[ChatTurn::User {
            text: "Call analyze_competitors for a baseball bat store.".into(),
        }]),
        max_tokens: 200,
        temperature: Some(0.0),
        tools: Some(tools),
        system: None,
    };

    let mut stream = provider
        .stream(&request, &credentials)
        .await
        .expect("Stream creation failed");

    let mut tool_names = Vec::new();
    while let Some(chunk) = stream.next().await {
        if let Some(tool) = chunk.expect("Stream chunk error").tool_use {
            tool_names.push(tool.name);
        }
    }
    assert!(
        tool_names.iter().any(|n| n == "analyze_competitors"),
        "Expected a tool call, got: {tool_names:?}"
    );
}

#[tokio::test]
async fn test_openai_bad_key_fails_on_open() {
    if openai_key().is_none() {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    }
    let provider = OpenAiProvider::openai(None);
    let credentials = Credentials::ApiKey {
        api_key: "sk-invalid".into(),
    };
    let request = CompletionRequest {
        model: "gpt-4.1-mini".into(),
        messages: provider.format_messages(&[ChatTurn::User { text: "hi".into() }]),
        max_tokens: 5,
        temperature: None,
        tools: None,
        system: None,
    };
    let result = provider.stream(&request, &credentials).await;
    assert!(result.is_err(), "Invalid key should fail before streaming");
}
