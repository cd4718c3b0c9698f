use anyhow::Result;

use nutriflow_core::models::Mood;
use nutriflow_core::store::StateStore;

use super::helpers::{print_json, resolve_date};

fn parse_mood(s: &str) -> Result<Option<Mood>> {
    match s.to_lowercase().as_str() {
        "none" | "clear" => Ok(None),
        other => other.parse().map(Some),
    }
}

pub(crate) fn cmd_mood(
    store: &mut StateStore,
    mood: &str,
    date: Option<&str>,
    json: bool,
) -> Result<()> {
    let mood = parse_mood(mood)?;
    let date = resolve_date(date, store.selected_date())?;
    let log = store.set_mood(&date, mood)?;

    if json {
        print_json(&log)
    } else {
        match log.mood {
            Some(m) => println!("Mood for {date}: {m}"),
            None => println!("Cleared mood for {date}"),
        }
        Ok(())
    }
}

pub(crate) fn cmd_select(store: &mut StateStore, date: &str, json: bool) -> Result<()> {
    let date = resolve_date(Some(date), store.selected_date())?;
    store.select_date(&date)?;

    if json {
        print_json(&serde_json::json!({ "selectedDate": date }))
    } else {
        println!("Selected {date}");
        Ok(())
    }
}
