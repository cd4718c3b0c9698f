use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nutriflow_core::models::{DayFeedback, DaySummary};
use nutriflow_core::store::StateStore;

use super::helpers::{no_neg_zero, print_item_table, print_json, resolve_date};

fn progress_bar(pct: f64) -> String {
    const WIDTH: usize = 20;
    #[allow(clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = ((pct / 100.0) * WIDTH as f64).round().clamp(0.0, WIDTH as f64) as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(WIDTH - filled))
}

pub(crate) fn cmd_summary(store: &StateStore, date: Option<&str>, json: bool) -> Result<()> {
    let date = resolve_date(date, store.selected_date())?;
    let summary = store.day_summary(&date);

    if json {
        return print_json(&summary);
    }

    println!("=== {date} ===\n");
    if summary.items.is_empty() {
        println!("  Nothing logged yet\n");
    } else {
        print_item_table(&summary.items);
        println!();
    }

    let total = no_neg_zero(summary.total_calories);
    let target = summary.target.calories;
    let remaining = summary.remaining_calories;
    let pct = summary.progress_pct;
    let bar = progress_bar(pct);
    println!("  CALORIES:  {total:.0} / {target:.0} kcal {bar} {pct:.0}%");
    println!("  REMAINING: {remaining:.0} kcal");

    let t = summary.target;
    let p = summary.total_protein;
    let c = summary.total_carbs;
    let f = summary.total_fat;
    println!(
        "  MACROS:    P:{p:.0}/{:.0}g C:{c:.0}/{:.0}g F:{f:.0}/{:.0}g",
        t.protein, t.carbs, t.fat
    );
    if let Some(mood) = summary.mood {
        println!("  MOOD:      {mood}");
    }
    let feedback = summary.feedback;
    println!("\n  {feedback}");

    Ok(())
}

pub(crate) fn cmd_history(store: &StateStore, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Target")]
        target: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Mood")]
        mood: String,
        #[tabled(rename = "Status")]
        status: String,
    }

    let summaries: Vec<DaySummary> = store.history(days)?;

    if json {
        return print_json(&summaries);
    }

    if summaries
        .iter()
        .all(|s| s.feedback == DayFeedback::NoRecord && s.mood.is_none())
    {
        eprintln!("No entries in the last {days} days");
        process::exit(2);
    }

    let rows: Vec<HistoryRow> = summaries
        .iter()
        .map(|s| {
            let cal = no_neg_zero(s.total_calories);
            let p = no_neg_zero(s.total_protein);
            let c = no_neg_zero(s.total_carbs);
            let f = no_neg_zero(s.total_fat);
            HistoryRow {
                date: s.date.clone(),
                calories: format!("{cal:.0}"),
                target: format!("{:.0}", s.target.calories),
                protein: format!("{p:.0}g"),
                carbs: format!("{c:.0}g"),
                fat: format!("{f:.0}g"),
                mood: s.mood.map(|m| m.to_string()).unwrap_or_default(),
                status: s.feedback.to_string(),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
