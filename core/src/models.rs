use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::de::IntoDeserializer;
use serde::de::value::StringDeserializer;
use serde::{Deserialize, Deserializer, Serialize};

/// Unit used when a source gives none ("serving").
pub const DEFAULT_UNIT: &str = "份";

/// Longest history window, roughly ten years.
pub const MAX_HISTORY_DAYS: u32 = 3660;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Floor applied to the daily calorie target.
    #[must_use]
    pub const fn min_calories(self) -> f64 {
        match self {
            Gender::Male => 1500.0,
            Gender::Female => 1200.0,
        }
    }

    const fn bmr_offset(self) -> f64 {
        match self {
            Gender::Male => 5.0,
            Gender::Female => -161.0,
        }
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            _ => bail!("Invalid gender '{s}'. Must be one of: male, female"),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => f.write_str("male"),
            Gender::Female => f.write_str("female"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityLevel {
    Sedentary,
    LightlyActive,
    ModeratelyActive,
    VeryActive,
    ExtraActive,
}

impl ActivityLevel {
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::LightlyActive => 1.375,
            ActivityLevel::ModeratelyActive => 1.55,
            ActivityLevel::VeryActive => 1.725,
            ActivityLevel::ExtraActive => 1.9,
        }
    }
}

impl FromStr for ActivityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "sedentary" => Ok(ActivityLevel::Sedentary),
            "light" | "lightly_active" => Ok(ActivityLevel::LightlyActive),
            "moderate" | "moderately_active" => Ok(ActivityLevel::ModeratelyActive),
            "very" | "very_active" => Ok(ActivityLevel::VeryActive),
            "extra" | "extra_active" => Ok(ActivityLevel::ExtraActive),
            _ => bail!(
                "Invalid activity level '{s}'. Must be one of: sedentary, light, moderate, very, extra"
            ),
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivityLevel::Sedentary => "sedentary",
            ActivityLevel::LightlyActive => "lightly active",
            ActivityLevel::ModeratelyActive => "moderately active",
            ActivityLevel::VeryActive => "very active",
            ActivityLevel::ExtraActive => "extra active",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    Happy,
    Sad,
    Angry,
    Bored,
}

impl FromStr for Mood {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "happy" => Ok(Mood::Happy),
            "sad" => Ok(Mood::Sad),
            "angry" => Ok(Mood::Angry),
            "bored" => Ok(Mood::Bored),
            _ => bail!("Invalid mood '{s}'. Must be one of: happy, sad, angry, bored"),
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Angry => "angry",
            Mood::Bored => "bored",
        };
        f.write_str(label)
    }
}

/// Older blobs store unset enum fields as `""`.
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => {
            let de: StringDeserializer<D::Error> = value.to_owned().into_deserializer();
            T::deserialize(de).map(Some)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyTargets {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

/// Inputs collected at onboarding (and on a profile recalculation).
#[derive(Debug, Clone)]
pub struct ProfileInput {
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub height: f64,
    pub weight: f64,
    pub target_weight: f64,
    pub activity_level: ActivityLevel,
}

impl ProfileInput {
    pub fn validate(&self) -> Result<()> {
        if !(1..=120).contains(&self.age) {
            bail!("Age must be between 1 and 120");
        }
        if self.height <= 0.0 {
            bail!("Height must be greater than 0");
        }
        if self.weight <= 0.0 {
            bail!("Weight must be greater than 0");
        }
        if self.target_weight <= 0.0 {
            bail!("Target weight must be greater than 0");
        }
        Ok(())
    }
}

/// Mifflin-St Jeor BMR scaled by activity, shifted toward the target weight,
/// floored at the gender minimum. Macro split is 30/40/30 by energy.
#[must_use]
pub fn compute_targets(input: &ProfileInput) -> DailyTargets {
    let bmr = 10.0 * input.weight + 6.25 * input.height - 5.0 * f64::from(input.age)
        + input.gender.bmr_offset();
    let tdee = (bmr * input.activity_level.multiplier()).round();

    let adjusted = if input.target_weight < input.weight {
        tdee - 500.0
    } else if input.target_weight > input.weight {
        tdee + 300.0
    } else {
        tdee
    };
    let calories = adjusted.round().max(input.gender.min_calories());

    DailyTargets {
        calories,
        protein: (calories * 0.3 / 4.0).round(),
        carbs: (calories * 0.4 / 4.0).round(),
        fat: (calories * 0.3 / 9.0).round(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub age: u32,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub target_weight: f64,
    #[serde(default)]
    pub start_date: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub activity_level: Option<ActivityLevel>,
    pub target_calories: f64,
    pub target_protein: f64,
    pub target_carbs: f64,
    pub target_fat: f64,
    #[serde(default)]
    pub is_onboarded: bool,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            avatar: None,
            age: 0,
            gender: None,
            height: 0.0,
            weight: 0.0,
            target_weight: 0.0,
            start_date: Utc::now().to_rfc3339(),
            activity_level: None,
            target_calories: 2000.0,
            target_protein: 150.0,
            target_carbs: 200.0,
            target_fat: 65.0,
            is_onboarded: false,
        }
    }
}

impl UserProfile {
    pub fn from_onboarding(input: &ProfileInput, start: DateTime<Utc>) -> Result<Self> {
        input.validate()?;
        let mut profile = Self {
            start_date: start.to_rfc3339(),
            ..Self::default()
        };
        profile.apply_input(input);
        profile.is_onboarded = true;
        Ok(profile)
    }

    /// Copy the body inputs over and re-derive the targets from them.
    pub fn apply_input(&mut self, input: &ProfileInput) {
        self.apply_body(input);
        self.set_targets(compute_targets(input));
    }

    /// Copy the body inputs over, leaving the targets as they are.
    pub fn apply_body(&mut self, input: &ProfileInput) {
        self.name.clone_from(&input.name);
        self.age = input.age;
        self.gender = Some(input.gender);
        self.height = input.height;
        self.weight = input.weight;
        self.target_weight = input.target_weight;
        self.activity_level = Some(input.activity_level);
    }

    pub fn set_targets(&mut self, targets: DailyTargets) {
        self.target_calories = targets.calories;
        self.target_protein = targets.protein;
        self.target_carbs = targets.carbs;
        self.target_fat = targets.fat;
    }

    #[must_use]
    pub fn targets(&self) -> DailyTargets {
        DailyTargets {
            calories: self.target_calories,
            protein: self.target_protein,
            carbs: self.target_carbs,
            fat: self.target_fat,
        }
    }

    /// The onboarding inputs, if every one of them is known.
    #[must_use]
    pub fn input(&self) -> Option<ProfileInput> {
        Some(ProfileInput {
            name: self.name.clone(),
            age: self.age,
            gender: self.gender?,
            height: self.height,
            weight: self.weight,
            target_weight: self.target_weight,
            activity_level: self.activity_level?,
        })
    }

    #[must_use]
    pub fn bmi(&self) -> Option<f64> {
        if self.height <= 0.0 || self.weight <= 0.0 {
            return None;
        }
        let meters = self.height / 100.0;
        Some(self.weight / (meters * meters))
    }

    /// Whole days since the plan started, rounded up.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn days_on_plan(&self, now: DateTime<Utc>) -> Option<i64> {
        let start = DateTime::parse_from_rfc3339(&self.start_date).ok()?;
        let millis = (now - start.with_timezone(&Utc)).num_milliseconds().abs();
        Some((millis as f64 / 86_400_000.0).ceil() as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    #[must_use]
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            BmiCategory::Underweight
        } else if bmi < 25.0 {
            BmiCategory::Normal
        } else if bmi < 30.0 {
            BmiCategory::Overweight
        } else {
            BmiCategory::Obese
        }
    }
}

impl fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BmiCategory::Underweight => "underweight",
            BmiCategory::Normal => "normal",
            BmiCategory::Overweight => "overweight",
            BmiCategory::Obese => "obese",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub unit: String,
    pub quantity: f64,
    pub calories: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories_per_unit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl FoodItem {
    /// A candidate item with nutrients zeroed, awaiting estimation.
    #[must_use]
    pub fn candidate(name: &str, unit: &str, quantity: f64) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            unit: unit.to_string(),
            quantity,
            calories: 0.0,
            calories_per_unit: None,
            protein: Some(0.0),
            carbs: Some(0.0),
            fat: Some(0.0),
            image: None,
        }
    }

    /// Rescale to a new quantity, keeping the per-unit energy.
    pub fn with_quantity(&self, quantity: f64) -> Result<Self> {
        if !quantity.is_finite() || quantity <= 0.0 {
            bail!("Quantity must be greater than 0");
        }
        let old_quantity = if self.quantity > 0.0 {
            self.quantity
        } else {
            1.0
        };
        let per_unit = self
            .calories_per_unit
            .unwrap_or(self.calories / old_quantity);
        let ratio = quantity / old_quantity;
        let scale = |v: Option<f64>| v.map(|g| (g * ratio * 10.0).round() / 10.0);

        Ok(Self {
            quantity,
            calories: (quantity * per_unit).round(),
            protein: scale(self.protein),
            carbs: scale(self.carbs),
            fat: scale(self.fat),
            ..self.clone()
        })
    }
}

fn sum_calories(items: &[FoodItem]) -> f64 {
    items.iter().map(|i| i.calories).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    pub date: String,
    #[serde(default)]
    pub items: Vec<FoodItem>,
    #[serde(default)]
    pub total_calories_in: f64,
    #[serde(default)]
    pub mood: Option<Mood>,
}

impl DailyLog {
    #[must_use]
    pub fn empty(date: &str) -> Self {
        Self {
            date: date.to_string(),
            items: Vec::new(),
            total_calories_in: 0.0,
            mood: None,
        }
    }

    /// Same log with `items` replaced and the total recomputed.
    #[must_use]
    pub fn with_items(&self, items: Vec<FoodItem>) -> Self {
        Self {
            date: self.date.clone(),
            total_calories_in: sum_calories(&items),
            items,
            mood: self.mood,
        }
    }

    #[must_use]
    pub fn appending(&self, new_items: &[FoodItem]) -> Self {
        let mut items = self.items.clone();
        items.extend_from_slice(new_items);
        self.with_items(items)
    }

    pub fn removing(&self, index: usize) -> Result<Self> {
        if index >= self.items.len() {
            bail!(
                "Item {} not found on {} ({} items)",
                index + 1,
                self.date,
                self.items.len()
            );
        }
        let items = self
            .items
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, item)| item.clone())
            .collect();
        Ok(self.with_items(items))
    }

    pub fn replacing_quantity(&self, index: usize, quantity: f64) -> Result<Self> {
        let Some(item) = self.items.get(index) else {
            bail!("Item {} not found on {}", index + 1, self.date);
        };
        let updated = item.with_quantity(quantity)?;
        let mut items = self.items.clone();
        items[index] = updated;
        Ok(self.with_items(items))
    }

    #[must_use]
    pub fn with_mood(&self, mood: Option<Mood>) -> Self {
        Self {
            mood,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn total_protein(&self) -> f64 {
        self.items.iter().filter_map(|i| i.protein).sum()
    }

    #[must_use]
    pub fn total_carbs(&self) -> f64 {
        self.items.iter().filter_map(|i| i.carbs).sum()
    }

    #[must_use]
    pub fn total_fat(&self) -> f64 {
        self.items.iter().filter_map(|i| i.fat).sum()
    }
}

#[must_use]
pub fn today_string() -> String {
    Local::now().date_naive().format(DATE_FORMAT).to_string()
}

pub fn parse_date_key(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .with_context(|| format!("Invalid date '{date}'. Use YYYY-MM-DD"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub user: UserProfile,
    #[serde(default)]
    pub logs: BTreeMap<String, DailyLog>,
    #[serde(default = "today_string")]
    pub selected_date: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            user: UserProfile::default(),
            logs: BTreeMap::new(),
            selected_date: today_string(),
        }
    }
}

impl AppState {
    /// The log for `date`; a date never written has an implicit empty log.
    #[must_use]
    pub fn log_for(&self, date: &str) -> DailyLog {
        self.logs
            .get(date)
            .cloned()
            .unwrap_or_else(|| DailyLog::empty(date))
    }

    #[must_use]
    pub fn selected_log(&self) -> DailyLog {
        self.log_for(&self.selected_date)
    }

    #[must_use]
    pub fn with_log(&self, log: DailyLog) -> Self {
        let mut logs = self.logs.clone();
        logs.insert(log.date.clone(), log);
        Self {
            logs,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn day_summary(&self, date: &str) -> DaySummary {
        DaySummary::build(&self.log_for(date), &self.user)
    }

    /// Summaries for `days` consecutive dates ending at `end`, newest first.
    /// At most [`MAX_HISTORY_DAYS`] are returned, stopping early at the
    /// earliest representable date.
    #[must_use]
    pub fn history(&self, end: NaiveDate, days: u32) -> Vec<DaySummary> {
        (0..days.min(MAX_HISTORY_DAYS))
            .map_while(|i| end.checked_sub_signed(chrono::Duration::days(i64::from(i))))
            .map(|date| self.day_summary(&date.format(DATE_FORMAT).to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayFeedback {
    NoRecord,
    OnTarget,
    Under,
    Over,
    Steady,
}

impl DayFeedback {
    #[must_use]
    pub fn classify(total_calories: f64, target_calories: f64) -> Self {
        if total_calories == 0.0 {
            return DayFeedback::NoRecord;
        }
        if target_calories <= 0.0 {
            return DayFeedback::Steady;
        }
        let diff_pct = (total_calories - target_calories) / target_calories * 100.0;
        if (-5.0..=5.0).contains(&diff_pct) {
            DayFeedback::OnTarget
        } else if diff_pct < -10.0 {
            DayFeedback::Under
        } else if diff_pct > 10.0 {
            DayFeedback::Over
        } else {
            DayFeedback::Steady
        }
    }
}

impl fmt::Display for DayFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DayFeedback::NoRecord => "nothing logged yet",
            DayFeedback::OnTarget => "right on target",
            DayFeedback::Under => "eating too little",
            DayFeedback::Over => "over target",
            DayFeedback::Steady => "keeping steady",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: String,
    pub items: Vec<FoodItem>,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub target: DailyTargets,
    pub remaining_calories: f64,
    pub progress_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    pub feedback: DayFeedback,
}

impl DaySummary {
    #[must_use]
    pub fn build(log: &DailyLog, user: &UserProfile) -> Self {
        let target = user.targets();
        let total = log.total_calories_in;
        let progress_pct = if target.calories > 0.0 {
            (total / target.calories * 100.0).min(100.0)
        } else {
            0.0
        };
        Self {
            date: log.date.clone(),
            items: log.items.clone(),
            total_calories: total,
            total_protein: log.total_protein(),
            total_carbs: log.total_carbs(),
            total_fat: log.total_fat(),
            target,
            remaining_calories: (target.calories - total).max(0.0),
            progress_pct,
            mood: log.mood,
            feedback: DayFeedback::classify(total, target.calories),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, calories: f64) -> FoodItem {
        FoodItem {
            calories,
            ..FoodItem::candidate(name, DEFAULT_UNIT, 1.0)
        }
    }

    fn female_input() -> ProfileInput {
        ProfileInput {
            name: "Mei".to_string(),
            age: 25,
            gender: Gender::Female,
            height: 165.0,
            weight: 60.0,
            target_weight: 55.0,
            activity_level: ActivityLevel::Sedentary,
        }
    }

    #[test]
    fn test_compute_targets_floors_at_female_minimum() {
        // BMR 1345.25 -> TDEE 1614 -> 1114 after deficit -> floored to 1200
        let t = compute_targets(&female_input());
        assert_eq!(t.calories, 1200.0);
        assert_eq!(t.protein, 90.0);
        assert_eq!(t.carbs, 120.0);
        assert_eq!(t.fat, 40.0);
    }

    #[test]
    fn test_compute_targets_maintenance() {
        let input = ProfileInput {
            name: "Lei".to_string(),
            age: 30,
            gender: Gender::Male,
            height: 180.0,
            weight: 80.0,
            target_weight: 80.0,
            activity_level: ActivityLevel::ModeratelyActive,
        };
        // BMR 1780 * 1.55 = 2759
        let t = compute_targets(&input);
        assert_eq!(t.calories, 2759.0);
        assert_eq!(t.protein, 207.0);
        assert_eq!(t.carbs, 276.0);
        assert_eq!(t.fat, 92.0);
    }

    #[test]
    fn test_compute_targets_surplus_for_weight_gain() {
        let input = ProfileInput {
            name: "Bo".to_string(),
            age: 20,
            gender: Gender::Male,
            height: 175.0,
            weight: 70.0,
            target_weight: 75.0,
            activity_level: ActivityLevel::Sedentary,
        };
        // BMR 1698.75 * 1.2 = 2038.5 -> 2039, +300
        assert_eq!(compute_targets(&input).calories, 2339.0);
    }

    #[test]
    fn test_from_onboarding_sets_flag_and_targets() {
        let start = Utc::now();
        let profile = UserProfile::from_onboarding(&female_input(), start).unwrap();
        assert!(profile.is_onboarded);
        assert_eq!(profile.gender, Some(Gender::Female));
        assert_eq!(profile.target_calories, 1200.0);
        assert_eq!(profile.start_date, start.to_rfc3339());
    }

    #[test]
    fn test_from_onboarding_rejects_bad_input() {
        let mut input = female_input();
        input.height = 0.0;
        assert!(UserProfile::from_onboarding(&input, Utc::now()).is_err());
        let mut input = female_input();
        input.age = 0;
        assert!(UserProfile::from_onboarding(&input, Utc::now()).is_err());
    }

    #[test]
    fn test_bmi_and_category() {
        let profile = UserProfile::from_onboarding(&female_input(), Utc::now()).unwrap();
        let bmi = profile.bmi().unwrap();
        assert!((bmi - 22.04).abs() < 0.01);
        assert_eq!(BmiCategory::from_bmi(bmi), BmiCategory::Normal);
        assert_eq!(BmiCategory::from_bmi(17.0), BmiCategory::Underweight);
        assert_eq!(BmiCategory::from_bmi(27.0), BmiCategory::Overweight);
        assert_eq!(BmiCategory::from_bmi(31.0), BmiCategory::Obese);
        assert!(UserProfile::default().bmi().is_none());
    }

    #[test]
    fn test_days_on_plan_rounds_up() {
        let now = Utc::now();
        let profile = UserProfile {
            start_date: (now - chrono::Duration::hours(30)).to_rfc3339(),
            ..UserProfile::default()
        };
        assert_eq!(profile.days_on_plan(now), Some(2));
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("M".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!(
            "moderate".parse::<ActivityLevel>().unwrap(),
            ActivityLevel::ModeratelyActive
        );
        assert_eq!(
            "very-active".parse::<ActivityLevel>().unwrap(),
            ActivityLevel::VeryActive
        );
        assert_eq!("Happy".parse::<Mood>().unwrap(), Mood::Happy);
        assert!("grumpy".parse::<Mood>().is_err());
    }

    #[test]
    fn test_log_totals_follow_items() {
        let log = DailyLog::empty("2024-06-15")
            .appending(&[item("rice", 200.0), item("egg", 70.0)]);
        assert_eq!(log.total_calories_in, 270.0);

        let log = log.removing(0).unwrap();
        assert_eq!(log.items.len(), 1);
        assert_eq!(log.total_calories_in, 70.0);

        let log = log.appending(&[item("milk", 54.0)]);
        assert_eq!(
            log.total_calories_in,
            log.items.iter().map(|i| i.calories).sum::<f64>()
        );
    }

    #[test]
    fn test_removing_out_of_range() {
        let log = DailyLog::empty("2024-06-15").appending(&[item("rice", 200.0)]);
        assert!(log.removing(1).is_err());
    }

    #[test]
    fn test_with_quantity_rescales() {
        let bowl = FoodItem {
            quantity: 2.0,
            calories: 600.0,
            protein: Some(20.0),
            ..FoodItem::candidate("noodles", "碗", 2.0)
        };
        let one = bowl.with_quantity(1.0).unwrap();
        assert_eq!(one.calories, 300.0);
        assert_eq!(one.protein, Some(10.0));

        let per_unit = FoodItem {
            calories_per_unit: Some(70.0),
            calories: 70.0,
            ..FoodItem::candidate("egg", "个", 1.0)
        };
        assert_eq!(per_unit.with_quantity(3.0).unwrap().calories, 210.0);
        assert!(per_unit.with_quantity(0.0).is_err());
    }

    #[test]
    fn test_replacing_quantity_updates_total() {
        let log = DailyLog::empty("2024-06-15")
            .appending(&[item("rice", 200.0), item("egg", 70.0)]);
        let log = log.replacing_quantity(1, 2.0).unwrap();
        assert_eq!(log.items[1].calories, 140.0);
        assert_eq!(log.total_calories_in, 340.0);
    }

    #[test]
    fn test_day_feedback() {
        assert_eq!(DayFeedback::classify(0.0, 2000.0), DayFeedback::NoRecord);
        assert_eq!(DayFeedback::classify(2050.0, 2000.0), DayFeedback::OnTarget);
        assert_eq!(DayFeedback::classify(1500.0, 2000.0), DayFeedback::Under);
        assert_eq!(DayFeedback::classify(2500.0, 2000.0), DayFeedback::Over);
        assert_eq!(DayFeedback::classify(2150.0, 2000.0), DayFeedback::Steady);
    }

    #[test]
    fn test_day_summary_remaining_and_progress() {
        let mut state = AppState::default();
        let log = DailyLog::empty("2024-06-15").appending(&[item("rice", 2500.0)]);
        state = state.with_log(log);
        let summary = state.day_summary("2024-06-15");
        assert_eq!(summary.remaining_calories, 0.0);
        assert_eq!(summary.progress_pct, 100.0);

        let empty = state.day_summary("2024-06-16");
        assert_eq!(empty.total_calories, 0.0);
        assert_eq!(empty.remaining_calories, 2000.0);
        assert_eq!(empty.feedback, DayFeedback::NoRecord);
    }

    #[test]
    fn test_history_newest_first() {
        let state = AppState::default();
        let end = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let days = state.history(end, 3);
        let dates: Vec<&str> = days.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, ["2024-06-15", "2024-06-14", "2024-06-13"]);
    }

    #[test]
    fn test_history_is_capped_and_stops_at_earliest_date() {
        let state = AppState::default();
        let end = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(state.history(end, u32::MAX).len(), MAX_HISTORY_DAYS as usize);

        let earliest = NaiveDate::MIN.succ_opt().unwrap();
        assert_eq!(state.history(earliest, 10).len(), 2);
    }

    #[test]
    fn test_loads_browser_blob() {
        let blob = r#"{
            "user": {"name":"","age":0,"gender":"","height":0,"weight":0,"targetWeight":0,
                     "startDate":"2024-06-01T08:00:00.000Z","activityLevel":"",
                     "targetCalories":2000,"targetProtein":150,"targetCarbs":200,"targetFat":65,
                     "isOnboarded":false},
            "logs": {"2024-06-15": {"date":"2024-06-15","items":[
                {"name":"米饭","unit":"碗","quantity":1,"calories":200,"protein":4}
            ],"totalCaloriesIn":200,"mood":"HAPPY"}}
        }"#;
        let state: AppState = serde_json::from_str(blob).unwrap();
        assert!(state.user.gender.is_none());
        assert!(state.user.activity_level.is_none());
        assert_eq!(state.selected_date, today_string());
        let log = state.log_for("2024-06-15");
        assert_eq!(log.mood, Some(Mood::Happy));
        assert_eq!(log.items[0].protein, Some(4.0));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(AppState::default()).unwrap();
        assert!(json.get("selectedDate").is_some());
        assert!(json["user"].get("targetCalories").is_some());
        assert!(json["user"].get("isOnboarded").is_some());
    }

    #[test]
    fn test_parse_date_key() {
        assert!(parse_date_key("2024-06-15").is_ok());
        assert!(parse_date_key("15/06/2024").is_err());
    }
}
