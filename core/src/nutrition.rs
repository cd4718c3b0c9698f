//! Nutrition estimation: turning an LLM reply (or its absence) into a
//! calorie/macro estimate.
//!
//! Estimation runs an ordered chain of [`EstimateStrategy`] values. Each one
//! either produces an estimate or declines; the first estimate wins. The
//! standard chain is:
//!
//! 1. [`DirectJson`]: the reply parses as a JSON object.
//! 2. [`FencedJson`]: the reply parses once markdown fences are stripped.
//! 3. [`TextPatterns`]: numbers pulled out of prose, defaults for the rest.
//! 4. [`LookupTable`]: curated per-serving values, only when there is no reply.
//! 5. [`UnitEstimate`]: rough energy by unit, scaled by quantity.
//!
//! Strategies 1-3 need a reply and [`TextPatterns`] always answers when there
//! is one, so the last two only run when the request itself failed.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NutritionEstimate {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub confidence: f64,
}

impl NutritionEstimate {
    const fn new(calories: f64, protein: f64, carbs: f64, fat: f64, confidence: f64) -> Self {
        Self {
            calories,
            protein,
            carbs,
            fat,
            confidence,
        }
    }

    /// Energy implied by the macros (4/4/9 kcal per gram).
    #[must_use]
    pub fn macro_calories(&self) -> f64 {
        self.protein * 4.0 + self.carbs * 4.0 + self.fat * 9.0
    }
}

/// Nutrient values as reported by a source, any of which may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawNutrition {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub confidence: Option<f64>,
}

impl RawNutrition {
    /// Read a JSON object; numbers may arrive as numeric strings.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let field = |key: &str| -> Option<f64> {
            match obj.get(key)? {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
        };
        let raw = Self {
            calories: field("calories"),
            protein: field("protein"),
            carbs: field("carbs"),
            fat: field("fat"),
            confidence: field("confidence"),
        };
        let has_nutrient = raw.calories.is_some()
            || raw.protein.is_some()
            || raw.carbs.is_some()
            || raw.fat.is_some();
        has_nutrient.then_some(raw)
    }
}

/// Plausibility bounds and the energy-consistency rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NutritionPolicy {
    pub max_calories: f64,
    pub max_protein: f64,
    pub max_carbs: f64,
    pub max_fat: f64,
    /// Allowed gap between reported and macro-derived energy, as a fraction
    /// of the reported calories.
    pub energy_tolerance: f64,
    /// Confidence multiplier applied when macros had to be rescaled.
    pub rescale_penalty: f64,
    /// Values substituted for anything the source did not report.
    pub defaults: NutritionEstimate,
}

impl Default for NutritionPolicy {
    fn default() -> Self {
        Self {
            max_calories: 2000.0,
            max_protein: 100.0,
            max_carbs: 300.0,
            max_fat: 100.0,
            energy_tolerance: 0.3,
            rescale_penalty: 0.8,
            defaults: NutritionEstimate::new(200.0, 10.0, 30.0, 5.0, 0.7),
        }
    }
}

fn clamp_value(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}

impl NutritionPolicy {
    #[must_use]
    pub fn clamp(&self, e: NutritionEstimate) -> NutritionEstimate {
        NutritionEstimate {
            calories: clamp_value(e.calories, self.max_calories),
            protein: clamp_value(e.protein, self.max_protein),
            carbs: clamp_value(e.carbs, self.max_carbs),
            fat: clamp_value(e.fat, self.max_fat),
            confidence: clamp_value(e.confidence, 1.0),
        }
    }

    /// Fill gaps with defaults, clamp, then reconcile energy with macros.
    #[must_use]
    pub fn validate(&self, raw: RawNutrition) -> NutritionEstimate {
        let pick = |v: Option<f64>, default: f64| v.filter(|x| x.is_finite()).unwrap_or(default);
        let filled = NutritionEstimate {
            calories: pick(raw.calories, self.defaults.calories),
            protein: pick(raw.protein, self.defaults.protein),
            carbs: pick(raw.carbs, self.defaults.carbs),
            fat: pick(raw.fat, self.defaults.fat),
            confidence: pick(raw.confidence, self.defaults.confidence),
        };
        self.reconcile_energy(self.clamp(filled))
    }

    /// Rescale macros to the reported calories when the two disagree by
    /// more than the tolerance, and lower the confidence.
    #[must_use]
    pub fn reconcile_energy(&self, e: NutritionEstimate) -> NutritionEstimate {
        let computed = e.macro_calories();
        let discrepancy = (computed - e.calories).abs();
        if discrepancy <= e.calories * self.energy_tolerance {
            return e;
        }
        let scale = e.calories / if computed == 0.0 { 1.0 } else { computed };
        NutritionEstimate {
            protein: e.protein * scale,
            carbs: e.carbs * scale,
            fat: e.fat * scale,
            confidence: e.confidence * self.rescale_penalty,
            ..e
        }
    }
}

pub const SYSTEM_PROMPT: &str = "You are a professional nutritionist. Estimate nutrient content \
from standard nutrition data. Food names may be in Chinese. Reply with a JSON object only, no other text.";

/// A single food to estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct NutritionQuery {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

impl NutritionQuery {
    #[must_use]
    pub fn new(name: &str, quantity: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            quantity,
            unit: unit.to_string(),
        }
    }

    #[must_use]
    pub fn prompt(&self) -> String {
        let Self {
            name,
            quantity,
            unit,
        } = self;
        format!(
            "Estimate the nutrients of the following food.\n\
             Food: {name}\n\
             Quantity: {quantity} {unit}\n\n\
             For {quantity} {unit} of {name}, estimate:\n\
             1. calories (kcal)\n\
             2. protein (g)\n\
             3. carbohydrates (g)\n\
             4. fat (g)\n\n\
             Return JSON in exactly this shape:\n\
             {{\"calories\": number, \"protein\": number, \"carbs\": number, \"fat\": number, \
             \"confidence\": number between 0 and 1}}\n\n\
             Keep the values realistic and based on scientific nutrition data."
        )
    }
}

/// What a strategy gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct EstimateRequest<'a> {
    pub name: &'a str,
    pub quantity: f64,
    pub unit: &'a str,
    /// The model reply, or `None` when the request failed outright.
    pub reply: Option<&'a str>,
}

pub trait EstimateStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate(
        &self,
        request: &EstimateRequest<'_>,
        policy: &NutritionPolicy,
    ) -> Option<NutritionEstimate>;
}

pub struct DirectJson;

impl EstimateStrategy for DirectJson {
    fn name(&self) -> &'static str {
        "json"
    }

    fn estimate(
        &self,
        request: &EstimateRequest<'_>,
        policy: &NutritionPolicy,
    ) -> Option<NutritionEstimate> {
        let value: Value = serde_json::from_str(request.reply?).ok()?;
        RawNutrition::from_json(&value).map(|raw| policy.validate(raw))
    }
}

pub struct FencedJson;

fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

impl EstimateStrategy for FencedJson {
    fn name(&self) -> &'static str {
        "fenced_json"
    }

    fn estimate(
        &self,
        request: &EstimateRequest<'_>,
        policy: &NutritionPolicy,
    ) -> Option<NutritionEstimate> {
        let cleaned = strip_fences(request.reply?);
        let value = serde_json::from_str::<Value>(&cleaned).ok().or_else(|| {
            // JSON object wrapped in prose
            let start = cleaned.find('{')?;
            let end = cleaned.rfind('}')?;
            serde_json::from_str(cleaned.get(start..=end)?).ok()
        })?;
        RawNutrition::from_json(&value).map(|raw| policy.validate(raw))
    }
}

const NUM: &str = r"(\d+(?:\.\d+)?)";

fn patterns(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|p| Regex::new(&p.replace("{NUM}", NUM)).expect("valid regex"))
        .collect()
}

static CALORIE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    patterns(&[
        r"卡路里[：:]?\s*{NUM}",
        r"{NUM}\s*千?卡(?:路里)?",
        r"(?i){NUM}\s*kcal",
        r#"(?i)calories?["']?\s*[：:]?\s*{NUM}"#,
    ])
});

static PROTEIN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    patterns(&[
        r"蛋白质[：:]?\s*{NUM}",
        r"{NUM}\s*克?\s*蛋白",
        r#"(?i)protein["']?\s*[：:]?\s*{NUM}"#,
    ])
});

static CARB_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    patterns(&[
        r"碳水(?:化合物)?[：:]?\s*{NUM}",
        r#"(?i)carb(?:ohydrate)?s?["']?\s*[：:]?\s*{NUM}"#,
    ])
});

static FAT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    patterns(&[r"脂肪[：:]?\s*{NUM}", r#"(?i)fat["']?\s*[：:]?\s*{NUM}"#])
});

fn extract(text: &str, patterns: &[Regex]) -> Option<f64> {
    patterns.iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

/// Confidence assigned to values scraped from prose.
pub const TEXT_PATTERN_CONFIDENCE: f64 = 0.5;

pub struct TextPatterns;

impl EstimateStrategy for TextPatterns {
    fn name(&self) -> &'static str {
        "text_patterns"
    }

    fn estimate(
        &self,
        request: &EstimateRequest<'_>,
        policy: &NutritionPolicy,
    ) -> Option<NutritionEstimate> {
        let text = strip_fences(request.reply?);
        let d = policy.defaults;
        let raw = RawNutrition {
            calories: Some(extract(&text, &CALORIE_PATTERNS).unwrap_or(d.calories)),
            protein: Some(extract(&text, &PROTEIN_PATTERNS).unwrap_or(d.protein)),
            carbs: Some(extract(&text, &CARB_PATTERNS).unwrap_or(d.carbs)),
            fat: Some(extract(&text, &FAT_PATTERNS).unwrap_or(d.fat)),
            confidence: Some(TEXT_PATTERN_CONFIDENCE),
        };
        Some(policy.validate(raw))
    }
}

/// Per-serving values for common foods, matched by substring.
const FOOD_TABLE: &[(&[&str], NutritionEstimate)] = &[
    // staples
    (&["米饭", "rice"], NutritionEstimate::new(200.0, 4.0, 45.0, 0.5, 0.3)),
    (&["面条", "noodle"], NutritionEstimate::new(300.0, 8.0, 60.0, 2.0, 0.3)),
    (&["面包", "bread"], NutritionEstimate::new(250.0, 9.0, 49.0, 3.0, 0.3)),
    (&["粥", "porridge", "congee"], NutritionEstimate::new(100.0, 2.0, 22.0, 0.5, 0.3)),
    // protein
    (&["鸡蛋", "egg"], NutritionEstimate::new(70.0, 6.0, 1.0, 5.0, 0.5)),
    (&["鸡肉", "chicken"], NutritionEstimate::new(165.0, 31.0, 0.0, 3.6, 0.4)),
    (&["虾", "shrimp", "prawn"], NutritionEstimate::new(85.0, 20.0, 0.0, 0.5, 0.4)),
    (&["鱼", "fish"], NutritionEstimate::new(120.0, 20.0, 0.0, 5.0, 0.4)),
    // vegetables
    (&["青菜", "greens"], NutritionEstimate::new(25.0, 2.0, 5.0, 0.2, 0.3)),
    (&["西兰花", "broccoli"], NutritionEstimate::new(34.0, 2.8, 7.0, 0.4, 0.4)),
    (&["胡萝卜", "carrot"], NutritionEstimate::new(41.0, 0.9, 10.0, 0.2, 0.4)),
    (&["土豆", "potato"], NutritionEstimate::new(77.0, 2.0, 17.0, 0.1, 0.4)),
    // fruit
    (&["苹果", "apple"], NutritionEstimate::new(52.0, 0.3, 14.0, 0.2, 0.5)),
    (&["香蕉", "banana"], NutritionEstimate::new(89.0, 1.1, 23.0, 0.3, 0.5)),
    (&["橙子", "orange"], NutritionEstimate::new(47.0, 0.9, 12.0, 0.1, 0.5)),
    // soy and dairy; soy milk before milk
    (&["豆浆", "soy milk", "soymilk"], NutritionEstimate::new(33.0, 3.0, 3.0, 2.0, 0.4)),
    (&["豆腐", "tofu"], NutritionEstimate::new(76.0, 8.0, 4.0, 4.0, 0.4)),
    (&["酸奶", "yogurt", "yoghurt"], NutritionEstimate::new(59.0, 3.5, 4.7, 3.3, 0.5)),
    (&["牛奶", "milk"], NutritionEstimate::new(54.0, 3.3, 5.0, 3.2, 0.5)),
    // drinks
    (&["咖啡", "coffee"], NutritionEstimate::new(2.0, 0.2, 0.0, 0.1, 0.5)),
    (&["茶", "tea"], NutritionEstimate::new(1.0, 0.0, 0.0, 0.0, 0.5)),
];

pub struct LookupTable;

impl EstimateStrategy for LookupTable {
    fn name(&self) -> &'static str {
        "lookup_table"
    }

    fn estimate(
        &self,
        request: &EstimateRequest<'_>,
        policy: &NutritionPolicy,
    ) -> Option<NutritionEstimate> {
        if request.reply.is_some() {
            return None;
        }
        let name = request.name.to_lowercase();
        let words: Vec<&str> = name
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        FOOD_TABLE
            .iter()
            .find(|(keys, _)| keys.iter().any(|k| matches_key(&name, &words, k)))
            .map(|(_, e)| policy.clamp(*e))
    }
}

/// CJK keys match anywhere in the name; ASCII keys only as whole words, so
/// "tea" does not hit "steak".
fn matches_key(name: &str, words: &[&str], key: &str) -> bool {
    if !key.is_ascii() {
        return name.contains(key);
    }
    let key_words: Vec<&str> = key.split(' ').collect();
    words
        .windows(key_words.len())
        .any(|window| window.iter().zip(&key_words).all(|(w, k)| same_word(w, k)))
}

/// Exact match or a plain English plural ("eggs", "potatoes").
fn same_word(word: &str, key: &str) -> bool {
    word == key
        || word
            .strip_suffix('s')
            .is_some_and(|stem| stem == key || stem.strip_suffix('e') == Some(key))
}

/// Confidence of an estimate derived from the unit alone.
pub const UNIT_ESTIMATE_CONFIDENCE: f64 = 0.2;

/// Rough energy of one unit of an unknown food.
#[must_use]
pub fn unit_calories(unit: &str) -> f64 {
    match unit.trim().to_lowercase().as_str() {
        "碗" | "盘" | "bowl" | "bowls" | "plate" | "plates" => 300.0,
        "杯" | "瓶" | "cup" | "cups" | "bottle" | "bottles" | "glass" | "glasses" => 150.0,
        "个" | "只" | "each" | "item" | "items" | "whole" => 100.0,
        "片" | "块" | "slice" | "slices" | "piece" | "pieces" => 50.0,
        _ => 200.0,
    }
}

pub struct UnitEstimate;

impl UnitEstimate {
    /// Energy split 10/60/30 across protein, carbs and fat.
    #[must_use]
    pub fn compute(unit: &str, quantity: f64) -> NutritionEstimate {
        let quantity = if quantity.is_finite() && quantity > 0.0 {
            quantity
        } else {
            1.0
        };
        let calories = unit_calories(unit) * quantity;
        NutritionEstimate {
            calories,
            protein: calories * 0.1 / 4.0,
            carbs: calories * 0.6 / 4.0,
            fat: calories * 0.3 / 9.0,
            confidence: UNIT_ESTIMATE_CONFIDENCE,
        }
    }
}

impl EstimateStrategy for UnitEstimate {
    fn name(&self) -> &'static str {
        "unit_estimate"
    }

    fn estimate(
        &self,
        request: &EstimateRequest<'_>,
        policy: &NutritionPolicy,
    ) -> Option<NutritionEstimate> {
        Some(policy.clamp(Self::compute(request.unit, request.quantity)))
    }
}

/// The estimate together with the strategy that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Resolution {
    #[serde(flatten)]
    pub estimate: NutritionEstimate,
    pub source: &'static str,
}

pub struct NutritionEstimator {
    strategies: Vec<Box<dyn EstimateStrategy>>,
    policy: NutritionPolicy,
}

impl Default for NutritionEstimator {
    fn default() -> Self {
        Self::with_policy(NutritionPolicy::default())
    }
}

impl NutritionEstimator {
    #[must_use]
    pub fn with_policy(policy: NutritionPolicy) -> Self {
        Self {
            strategies: vec![
                Box::new(DirectJson),
                Box::new(FencedJson),
                Box::new(TextPatterns),
                Box::new(LookupTable),
                Box::new(UnitEstimate),
            ],
            policy,
        }
    }

    #[must_use]
    pub fn new(strategies: Vec<Box<dyn EstimateStrategy>>, policy: NutritionPolicy) -> Self {
        Self {
            strategies,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &NutritionPolicy {
        &self.policy
    }

    #[must_use]
    pub fn resolve(&self, request: &EstimateRequest<'_>) -> Resolution {
        self.strategies
            .iter()
            .find_map(|s| {
                s.estimate(request, &self.policy).map(|estimate| Resolution {
                    estimate,
                    source: s.name(),
                })
            })
            .unwrap_or_else(|| Resolution {
                estimate: self
                    .policy
                    .clamp(UnitEstimate::compute(request.unit, request.quantity)),
                source: UnitEstimate.name(),
            })
    }
}
