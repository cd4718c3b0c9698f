use std::sync::LazyLock;

use regex::Regex;

use crate::models::{DEFAULT_UNIT, FoodItem};

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?|\.\d+").expect("valid regex"));

/// Leading quantifier on a free-text description, e.g. "一碗", "2杯", "半个".
static LEADING_MEASURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+(?:\.\d+)?|[一二两三四五六七八九十半几]+)\s*(碗|盘|杯|瓶|个|只|片|块|份|根|串|勺|包|盒|袋|条)")
        .expect("valid regex")
});

/// Number words, multi-character entries first so "一些" is not read as "一".
const NUMBER_WORDS: &[(&str, f64)] = &[
    ("一些", 2.0),
    ("少许", 0.5),
    ("少量", 0.3),
    ("一", 1.0),
    ("两", 2.0),
    ("二", 2.0),
    ("三", 3.0),
    ("四", 4.0),
    ("五", 5.0),
    ("六", 6.0),
    ("七", 7.0),
    ("八", 8.0),
    ("九", 9.0),
    ("十", 10.0),
    ("半", 0.5),
    ("几", 3.0),
];

/// Read a free-text quantity such as "一碗", "1.5份" or "少许".
///
/// The first decimal found wins; otherwise the number-word table is
/// consulted; anything else counts as one.
#[must_use]
pub fn parse_quantity(raw: &str) -> f64 {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(value) = NUMBER
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return value;
    }

    if let Some(value) = compound_numeral(&cleaned) {
        return value;
    }

    NUMBER_WORDS
        .iter()
        .find(|(word, _)| cleaned.contains(word))
        .map_or(1.0, |(_, value)| *value)
}

fn numeral_digit(c: char) -> Option<f64> {
    let digit = match c {
        '一' => 1.0,
        '二' | '两' => 2.0,
        '三' => 3.0,
        '四' => 4.0,
        '五' => 5.0,
        '六' => 6.0,
        '七' => 7.0,
        '八' => 8.0,
        '九' => 9.0,
        _ => return None,
    };
    Some(digit)
}

/// Read the first numeral run built around 十: "十二" → 12, "三十" → 30,
/// "三十五" → 35. Runs without 十 are left to the word table.
fn compound_numeral(text: &str) -> Option<f64> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .split(|&c| c != '十' && numeral_digit(c).is_none())
        .find(|run| run.contains(&'十'))
        .and_then(|run| {
            let split = run.iter().position(|&c| c == '十')?;
            let tens = match &run[..split] {
                [] => 1.0,
                [c] => numeral_digit(*c)?,
                _ => return None,
            };
            let ones = match &run[split + 1..] {
                [] => 0.0,
                [c] => numeral_digit(*c)?,
                _ => return None,
            };
            Some(tens * 10.0 + ones)
        })
}

/// Truncate a description to a display name of at most 20 characters.
#[must_use]
pub fn display_name(text: &str) -> String {
    const MAX: usize = 20;
    if text.chars().count() > MAX {
        let head: String = text.chars().take(MAX).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Package a text description as a single candidate item.
///
/// A leading quantifier ("一碗", "2杯") sets quantity and unit; otherwise the
/// item is one serving.
#[must_use]
pub fn text_to_item(text: &str) -> FoodItem {
    let text = text.trim();
    let name = display_name(text);
    match LEADING_MEASURE.captures(text) {
        Some(caps) => {
            let quantity = parse_quantity(&caps[1]);
            FoodItem::candidate(&name, &caps[2], quantity)
        }
        None => FoodItem::candidate(&name, DEFAULT_UNIT, 1.0),
    }
}
