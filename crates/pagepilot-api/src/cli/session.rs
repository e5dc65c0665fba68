//! `ppilot history` and `ppilot clear`.

use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::json;

use pagepilot_types::chat::{ChatTurn, TurnRole, TurnStatus};
use pagepilot_types::envelope::kinds;

use super::into_data;
use crate::state::AppState;

const PREVIEW_CHARS: usize = 80;

pub async fn history(state: &AppState, tab: &str, json_output: bool) -> anyhow::Result<()> {
    let data = into_data(state.bridge.request(kinds::GET_HISTORY, json!(tab)).await?)?;
    let turns: Vec<ChatTurn> = serde_json::from_value(data)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&turns)?);
        return Ok(());
    }

    if turns.is_empty() {
        println!();
        println!("  No conversation recorded for tab {}.", style(tab).cyan());
        println!();
        return Ok(());
    }

    println!();
    println!("{}", render_table(&turns));
    println!();
    Ok(())
}

fn render_table(turns: &[ChatTurn]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Time").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Text").fg(Color::White),
    ]);

    for turn in turns {
        let role = match turn.role {
            TurnRole::User => Cell::new("user").fg(Color::Cyan),
            TurnRole::Assistant => Cell::new("assistant").fg(Color::Green),
            TurnRole::System => Cell::new("system").fg(Color::DarkGrey),
        };
        let status = match turn.status {
            TurnStatus::Sent => Cell::new("sent").fg(Color::Green),
            TurnStatus::Sending => Cell::new("sending").fg(Color::Yellow),
            TurnStatus::Error => Cell::new("error").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(turn.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            role,
            status,
            Cell::new(preview(&turn.text)),
        ]);
    }
    table
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS - 3).collect();
    format!("{cut}...")
}

/// Goes through the content context so the page identity is attached.
pub async fn clear(state: &AppState, tab: &str, json_output: bool) -> anyhow::Result<()> {
    into_data(state.bridge.request(kinds::CLEAR_SESSION, json!(tab)).await?)?;

    if json_output {
        println!("{}", json!({"tab": tab, "cleared": true}));
    } else {
        println!();
        println!(
            "  {} Cleared conversation for tab {}",
            style("✓").green().bold(),
            style(tab).cyan()
        );
        println!();
    }
    Ok(())
}
