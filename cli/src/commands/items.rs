use anyhow::Result;
use std::process;

use nutriflow_core::store::StateStore;

use super::helpers::{format_amount, item_index, json_error, print_json};

fn not_found(number: usize, date: &str, json: bool) -> ! {
    let message = format!("Item {number} not found on {date}");
    if json {
        println!("{}", json_error(&message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn cmd_delete(store: &mut StateStore, number: usize, json: bool) -> Result<()> {
    let index = item_index(number)?;
    let date = store.selected_date().to_string();
    if index >= store.selected_log().items.len() {
        not_found(number, &date, json);
    }

    let removed = store.delete_item(index)?;
    if json {
        print_json(&serde_json::json!({
            "deleted": removed,
            "totalCaloriesIn": store.selected_log().total_calories_in,
        }))
    } else {
        let name = &removed.name;
        let total = store.selected_log().total_calories_in;
        println!("Deleted {name} from {date} ({total:.0} kcal left in the day)");
        Ok(())
    }
}

pub(crate) fn cmd_edit(
    store: &mut StateStore,
    number: usize,
    quantity: f64,
    json: bool,
) -> Result<()> {
    let index = item_index(number)?;
    let date = store.selected_date().to_string();
    if index >= store.selected_log().items.len() {
        not_found(number, &date, json);
    }

    let item = store.update_item_quantity(index, quantity)?;
    if json {
        print_json(&item)
    } else {
        let name = &item.name;
        let amount = format_amount(&item);
        let cal = item.calories;
        println!("Updated {name}: {amount} — {cal:.0} kcal");
        Ok(())
    }
}
