use std::path::Path;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tracing::warn;

use nutriflow_core::error::AnalysisError;
use nutriflow_core::models::{DailyLog, FoodItem};
use nutriflow_core::service::{Analysis, FoodAnalyzer, FoodRecognizer};
use nutriflow_core::store::StateStore;

use super::helpers::{format_amount, print_item_table, print_json};

#[derive(Serialize)]
struct LoggedMeal<'a> {
    date: &'a str,
    dish_name: &'a str,
    logged: &'a FoodItem,
    items: &'a [FoodItem],
    total_calories_in: f64,
}

fn report(analysis: &Analysis, logged: &FoodItem, log: &DailyLog, json: bool) -> Result<()> {
    if json {
        return print_json(&LoggedMeal {
            date: &log.date,
            dish_name: &analysis.dish_name,
            logged,
            items: &analysis.items,
            total_calories_in: log.total_calories_in,
        });
    }

    if analysis.items.len() > 1 {
        print_item_table(&analysis.items);
    }
    let name = &logged.name;
    let amount = format_amount(logged);
    let cal = logged.calories;
    let date = &log.date;
    let total = log.total_calories_in;
    println!("Logged: {name} {amount} — {cal:.0} kcal");
    println!("{date} total: {total:.0} kcal");
    Ok(())
}

fn analysis_failed(e: &AnalysisError, photo: bool) -> anyhow::Error {
    warn!(error = %e, photo, "food analysis failed");
    anyhow::anyhow!(e.user_message(photo))
}

pub(crate) async fn cmd_log_text(
    store: &mut StateStore,
    analyzer: &FoodAnalyzer<'_>,
    description: &str,
    json: bool,
) -> Result<()> {
    let analysis = analyzer
        .analyze_text(description)
        .await
        .map_err(|e| analysis_failed(&e, false))?;

    let meal = analysis.clone().into_meal(None);
    let log = store.add_items(vec![meal])?;
    let logged = log.items.last().context("Logged item missing")?;
    report(&analysis, logged, &log, json)
}

/// Corrections applied to recognised items before they are logged.
#[derive(Debug, Default)]
pub(crate) struct PhotoReview {
    /// 1-based item numbers to drop.
    pub skip: Vec<usize>,
    /// `(item number, new quantity)` pairs.
    pub quantities: Vec<(usize, f64)>,
    /// Show the analysis without logging it.
    pub dry_run: bool,
}

impl PhotoReview {
    fn apply(&self, mut analysis: Analysis) -> Result<Analysis> {
        for &(number, quantity) in &self.quantities {
            analysis = analysis.with_item_quantity(number, quantity)?;
        }
        analysis.without_items(&self.skip)
    }
}

/// Parse `N=Q`, e.g. `2=1.5`.
pub(crate) fn parse_item_quantity(s: &str) -> Result<(usize, f64), String> {
    let (number, quantity) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ITEM=QUANTITY, got '{s}'"))?;
    let number = number
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid item number '{number}'"))?;
    let quantity = quantity
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid quantity '{quantity}'"))?;
    Ok((number, quantity))
}

pub(crate) async fn cmd_log_photo(
    store: &mut StateStore,
    analyzer: &FoodAnalyzer<'_>,
    recognizer: &dyn FoodRecognizer,
    photo: &Path,
    review: &PhotoReview,
    json: bool,
) -> Result<()> {
    let bytes = std::fs::read(photo)
        .with_context(|| format!("Failed to read photo: {}", photo.display()))?;
    let image = STANDARD.encode(bytes);

    let analysis = analyzer
        .analyze_image(recognizer, &image)
        .await
        .map_err(|e| analysis_failed(&e, true))?;
    let analysis = review.apply(analysis)?;

    if review.dry_run {
        if json {
            return print_json(&analysis);
        }
        let dish = &analysis.dish_name;
        let total = analysis.total_calories();
        print_item_table(&analysis.items);
        println!("{dish}: {total:.0} kcal (not logged)");
        return Ok(());
    }

    let meal = analysis
        .clone()
        .into_meal(Some(photo.display().to_string()));
    let log = store.add_items(vec![meal])?;
    let logged = log.items.last().context("Logged item missing")?;
    report(&analysis, logged, &log, json)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_log_manual(
    store: &mut StateStore,
    name: &str,
    calories: f64,
    quantity: f64,
    unit: &str,
    protein: Option<f64>,
    carbs: Option<f64>,
    fat: Option<f64>,
    json: bool,
) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Food name cannot be empty");
    }
    if !calories.is_finite() || calories < 0.0 {
        bail!("Calories cannot be negative");
    }
    if !quantity.is_finite() || quantity <= 0.0 {
        bail!("Quantity must be greater than 0");
    }
    for (label, value) in [("Protein", protein), ("Carbs", carbs), ("Fat", fat)] {
        if value.is_some_and(|v| v < 0.0) {
            bail!("{label} cannot be negative");
        }
    }

    let item = FoodItem {
        calories,
        calories_per_unit: Some(calories / quantity),
        protein,
        carbs,
        fat,
        ..FoodItem::candidate(name, unit, quantity)
    };
    let log = store.add_items(vec![item])?;
    let logged = log.items.last().context("Logged item missing")?;

    let analysis = Analysis {
        dish_name: logged.name.clone(),
        items: vec![logged.clone()],
    };
    report(&analysis, logged, &log, json)
}
