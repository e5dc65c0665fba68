//! `ppilot check`: confirm the model backend answers.

use console::style;
use futures_util::StreamExt;

use pagepilot_core::credentials::CredentialProvider;
use pagepilot_infra::credentials::EnvCredentialProvider;
use pagepilot_infra::llm::create_provider;
use pagepilot_types::llm::{CompletionRequest, Message, StreamEvent, Usage};

use crate::state::AppState;

pub async fn check(state: &AppState, json_output: bool) -> anyhow::Result<()> {
    let settings = &state.config.provider;
    let credentials = EnvCredentialProvider::new(settings.clone()).credentials();
    if !credentials.configured {
        anyhow::bail!(
            "model backend '{}' is not configured; export {} or adjust [provider] in {}",
            settings.kind,
            settings.api_key_env,
            state.data_dir.join("config.toml").display()
        );
    }

    let provider = create_provider(&credentials)?;
    let request = CompletionRequest {
        model: String::new(),
        messages: vec![Message::user("Reply with the single word: ready")],
        system: None,
        max_tokens: 16,
        temperature: Some(0.0),
        stream: true,
        tools: vec![],
    };

    if !json_output {
        println!();
        println!(
            "  {} {} ({})",
            style("Checking").bold(),
            style(provider.name()).cyan(),
            settings.model
        );
        print!("  ");
    }

    let mut text = String::new();
    let mut usage = Usage::default();
    let mut events = provider.stream(request);
    while let Some(event) = events.next().await {
        match event? {
            StreamEvent::TextDelta { text: delta } => {
                if !json_output {
                    print!("{delta}");
                }
                text.push_str(&delta);
            }
            StreamEvent::Usage(u) => usage.add(&u),
            _ => {}
        }
    }

    if json_output {
        let report = serde_json::json!({
            "provider": provider.name(),
            "model": settings.model,
            "reply": text,
            "usage": usage,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!();
        println!(
            "  {} backend responded ({} in / {} out tokens)",
            style("✓").green().bold(),
            usage.input_tokens,
            usage.output_tokens
        );
        println!();
    }
    Ok(())
}
