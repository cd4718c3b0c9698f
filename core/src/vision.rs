//! Response types for the food-recognition service and conversion of its
//! answers into candidate [`FoodItem`]s. The HTTP side lives in the binary.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;

use crate::error::AnalysisError;
use crate::models::{DEFAULT_UNIT, FoodItem};
use crate::quantity::parse_quantity;

/// Instruction sent alongside the photo.
pub const RECOGNITION_INSTRUCTION: &str = "Identify every food in this image. For each one give \
its name, unit and quantity, and return a list where each entry has the fields name, unit and \
quantity. Use Chinese food names and units where appropriate.";

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenResponse {
    pub fn into_token(self) -> Result<String, AnalysisError> {
        if let Some(error) = self.error {
            let detail = self.error_description.unwrap_or_default();
            return Err(AnalysisError::Authentication(
                format!("{error} {detail}").trim().to_string(),
            ));
        }
        self.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AnalysisError::Authentication("no access token in response".into()))
    }
}

/// Error codes the service uses for an invalid or expired access token.
const TOKEN_REJECTED_CODES: [i64; 2] = [110, 111];

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub task_id: Option<Value>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

impl SubmitResponse {
    #[must_use]
    pub fn token_rejected(&self) -> bool {
        self.error_code
            .is_some_and(|code| TOKEN_REJECTED_CODES.contains(&code))
    }

    /// Task ids arrive as strings or bare numbers.
    pub fn into_task_id(self) -> Result<String, AnalysisError> {
        if let Some(code) = self.error_code {
            let msg = self.error_msg.unwrap_or_default();
            return Err(AnalysisError::Submission(
                format!("error {code} {msg}").trim().to_string(),
            ));
        }
        match self.task_id {
            Some(Value::String(s)) if !s.is_empty() => Ok(s),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(AnalysisError::Submission("response carried no task id".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    Processing,
    Failed,
    Unknown(String),
}

impl TaskStatus {
    #[must_use]
    pub fn classify(status: &str) -> Self {
        match status {
            "SUCCESS" => Self::Success,
            "PROCESSING" => Self::Processing,
            "FAILED" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResultResponse {
    #[serde(default)]
    pub task_status: String,
    #[serde(default)]
    pub data: Option<ResultData>,
}

impl ResultResponse {
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        TaskStatus::classify(&self.task_status)
    }

    #[must_use]
    pub fn into_answers(self) -> Vec<VisionFoodItem> {
        self.data.map(|d| d.answer).unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultData {
    #[serde(default)]
    pub answer: Vec<VisionFoodItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionFoodItem {
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub quantity: Value,
}

impl VisionFoodItem {
    fn quantity(&self) -> f64 {
        match &self.quantity {
            Value::Number(n) => n.as_f64().filter(|q| *q > 0.0).unwrap_or(1.0),
            Value::String(s) => parse_quantity(s),
            _ => 1.0,
        }
    }

    fn into_item(self) -> FoodItem {
        let unit = self
            .unit
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_UNIT)
            .to_string();
        let quantity = self.quantity();
        FoodItem::candidate(self.name.trim(), &unit, quantity)
    }
}

/// Dish name and candidate items recognised in a photo.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub dish_name: String,
    pub items: Vec<FoodItem>,
}

/// "A" for one item, "A+B等N种食物" for several.
#[must_use]
pub fn dish_name(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => (*only).to_string(),
        _ => {
            let head = names.iter().take(2).copied().collect::<Vec<_>>().join("+");
            format!("{head}等{}种食物", names.len())
        }
    }
}

pub fn recognition_from_answers(answers: Vec<VisionFoodItem>) -> Result<Recognition, AnalysisError> {
    let answers: Vec<_> = answers
        .into_iter()
        .filter(|a| !a.name.trim().is_empty())
        .collect();
    if answers.is_empty() {
        return Err(AnalysisError::NoData);
    }
    let items: Vec<FoodItem> = answers.into_iter().map(VisionFoodItem::into_item).collect();
    let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
    Ok(Recognition {
        dish_name: dish_name(&names),
        items,
    })
}

/// How long and how often to poll for a task result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1500),
            max_attempts: 20,
        }
    }
}

pub const TOKEN_TTL: Duration = Duration::from_secs(29 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    fetched: Instant,
}

/// Access token kept across requests until it ages out.
#[derive(Debug)]
pub struct TokenCache {
    ttl: Duration,
    slot: Mutex<Option<CachedToken>>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(TOKEN_TTL)
    }
}

impl TokenCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.get_at(Instant::now())
    }

    #[must_use]
    pub fn get_at(&self, now: Instant) -> Option<String> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .filter(|c| now.saturating_duration_since(c.fetched) < self.ttl)
            .map(|c| c.token.clone())
    }

    pub fn store(&self, token: &str) {
        self.store_at(token, Instant::now());
    }

    pub fn store_at(&self, token: &str, now: Instant) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(CachedToken {
            token: token.to_string(),
            fetched: now,
        });
    }

    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
