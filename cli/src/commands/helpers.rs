use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nutriflow_core::models::{DATE_FORMAT, FoodItem, parse_date_key};

/// Resolve a date argument to a `YYYY-MM-DD` key. `None` means `default`.
pub(crate) fn resolve_date(date_str: Option<&str>, default: &str) -> Result<String> {
    let today = Local::now().date_naive();
    let date: NaiveDate = match date_str {
        None => return Ok(default.to_string()),
        Some("today") => today,
        Some("yesterday") => today - chrono::Duration::days(1),
        Some("tomorrow") => today + chrono::Duration::days(1),
        Some(s) => parse_date_key(s)
            .with_context(|| format!("Use YYYY-MM-DD or today/yesterday/tomorrow, got '{s}'"))?,
    };
    Ok(date.format(DATE_FORMAT).to_string())
}

/// Convert a 1-based item number from the command line to an index.
pub(crate) fn item_index(number: usize) -> Result<usize> {
    number
        .checked_sub(1)
        .context("Item numbers start at 1")
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// "2碗", "1.5份"
pub(crate) fn format_amount(item: &FoodItem) -> String {
    let qty = item.quantity;
    let unit = &item.unit;
    if qty.fract() == 0.0 {
        format!("{qty:.0}{unit}")
    } else {
        format!("{qty}{unit}")
    }
}

fn grams(v: Option<f64>) -> String {
    v.map_or("-".into(), |g| format!("{:.1}", no_neg_zero(g)))
}

pub(crate) fn print_item_table(items: &[FoodItem]) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "kcal")]
        calories: String,
        #[tabled(rename = "P (g)")]
        protein: String,
        #[tabled(rename = "C (g)")]
        carbs: String,
        #[tabled(rename = "F (g)")]
        fat: String,
    }

    let rows: Vec<ItemRow> = items
        .iter()
        .enumerate()
        .map(|(i, item)| ItemRow {
            idx: i + 1,
            name: truncate(&item.name, 30),
            amount: format_amount(item),
            calories: format!("{:.0}", no_neg_zero(item.calories)),
            protein: grams(item.protein),
            carbs: grams(item.carbs),
            fat: grams(item.fat),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_date_default() {
        assert_eq!(resolve_date(None, "2024-01-15").unwrap(), "2024-01-15");
    }

    #[test]
    fn test_resolve_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(
            resolve_date(Some("today"), "x").unwrap(),
            today.format(DATE_FORMAT).to_string()
        );
        assert_eq!(
            resolve_date(Some("yesterday"), "x").unwrap(),
            (today - chrono::Duration::days(1))
                .format(DATE_FORMAT)
                .to_string()
        );
    }

    #[test]
    fn test_resolve_date_iso_and_invalid() {
        assert_eq!(resolve_date(Some("2024-01-15"), "x").unwrap(), "2024-01-15");
        assert!(resolve_date(Some("15/01/2024"), "x").is_err());
    }

    #[test]
    fn test_item_index() {
        assert_eq!(item_index(1).unwrap(), 0);
        assert!(item_index(0).is_err());
    }

    #[test]
    fn test_format_amount() {
        let mut item = FoodItem::candidate("米饭", "碗", 2.0);
        assert_eq!(format_amount(&item), "2碗");
        item.quantity = 1.5;
        assert_eq!(format_amount(&item), "1.5碗");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("日清カップヌードル", 8), "日清カップ...");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("nope"), r#"{"error":"nope"}"#);
    }
}
