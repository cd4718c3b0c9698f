use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    AppState, DATE_FORMAT, DailyLog, DaySummary, FoodItem, Mood, ProfileInput, UserProfile,
    parse_date_key, today_string,
};

/// Fixed key the state blob is stored under.
pub const STORAGE_KEY: &str = "nutriflow_state_v6";

/// Where the serialized state blob lives.
pub trait StateStorage: Send {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, blob: &str) -> Result<()>;
}

pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<dir>/nutriflow_state_v6.json`
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(format!("{STORAGE_KEY}.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStorage for FileStorage {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let blob = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;
        Ok(Some(blob))
    }

    fn save(&self, blob: &str) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, blob)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace state file: {}", self.path.display()))?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    blob: Mutex<Option<String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn with_blob(blob: &str) -> Self {
        Self {
            blob: Mutex::new(Some(blob.to_string())),
        }
    }

    #[must_use]
    pub fn blob(&self) -> Option<String> {
        self.blob
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.blob())
    }

    fn save(&self, blob: &str) -> Result<()> {
        *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(blob.to_string());
        Ok(())
    }
}

/// Owns the application state. Every mutation builds the next state,
/// persists it, and only then replaces the in-memory copy.
pub struct StateStore {
    state: AppState,
    storage: Box<dyn StateStorage>,
}

impl StateStore {
    pub fn open(storage: Box<dyn StateStorage>) -> Result<Self> {
        let state = match storage.load()? {
            Some(blob) => {
                let state: AppState =
                    serde_json::from_str(&blob).context("State file is not valid JSON")?;
                normalize(state)
            }
            None => {
                debug!("no saved state, starting fresh");
                AppState::default()
            }
        };
        Ok(Self { state, storage })
    }

    pub fn open_file(dir: &Path) -> Result<Self> {
        Self::open(Box::new(FileStorage::in_dir(dir)))
    }

    #[must_use]
    pub fn open_in_memory() -> Self {
        Self {
            state: AppState::default(),
            storage: Box::new(MemoryStorage::default()),
        }
    }

    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    #[must_use]
    pub fn user(&self) -> &UserProfile {
        &self.state.user
    }

    #[must_use]
    pub fn selected_date(&self) -> &str {
        &self.state.selected_date
    }

    #[must_use]
    pub fn log_for(&self, date: &str) -> DailyLog {
        self.state.log_for(date)
    }

    #[must_use]
    pub fn selected_log(&self) -> DailyLog {
        self.state.selected_log()
    }

    #[must_use]
    pub fn day_summary(&self, date: &str) -> DaySummary {
        self.state.day_summary(date)
    }

    /// Summaries for the `days` dates ending at the selected date.
    pub fn history(&self, days: u32) -> Result<Vec<DaySummary>> {
        let end = parse_date_key(&self.state.selected_date)?;
        Ok(self.state.history(end, days))
    }

    /// Append items to the selected date's log. Items without an id get one.
    pub fn add_items(&mut self, items: Vec<FoodItem>) -> Result<DailyLog> {
        let items: Vec<FoodItem> = items
            .into_iter()
            .map(|mut item| {
                if item.id.is_none() {
                    item.id = Some(Uuid::new_v4().to_string());
                }
                item
            })
            .collect();
        let log = self.selected_log().appending(&items);
        self.commit(self.state.with_log(log.clone()))?;
        info!(date = %log.date, added = items.len(), total = log.total_calories_in, "items added");
        Ok(log)
    }

    /// Remove the item at `index` from the selected date and return it.
    pub fn delete_item(&mut self, index: usize) -> Result<FoodItem> {
        let current = self.selected_log();
        let log = current.removing(index)?;
        let removed = current.items[index].clone();
        self.commit(self.state.with_log(log))?;
        info!(date = %current.date, index, "item deleted");
        Ok(removed)
    }

    pub fn update_item_quantity(&mut self, index: usize, quantity: f64) -> Result<FoodItem> {
        let log = self.selected_log().replacing_quantity(index, quantity)?;
        let updated = log.items[index].clone();
        self.commit(self.state.with_log(log))?;
        info!(index, quantity, calories = updated.calories, "item quantity updated");
        Ok(updated)
    }

    pub fn set_mood(&mut self, date: &str, mood: Option<Mood>) -> Result<DailyLog> {
        parse_date_key(date)?;
        let log = self.state.log_for(date).with_mood(mood);
        self.commit(self.state.with_log(log.clone()))?;
        Ok(log)
    }

    pub fn update_profile(&mut self, profile: UserProfile) -> Result<()> {
        let next = AppState {
            user: profile,
            ..self.state.clone()
        };
        self.commit(next)?;
        info!("profile updated");
        Ok(())
    }

    /// Derive targets from `input` and mark the profile as onboarded.
    pub fn complete_onboarding(&mut self, input: &ProfileInput) -> Result<&UserProfile> {
        let mut profile = UserProfile::from_onboarding(input, Utc::now())?;
        profile.avatar.clone_from(&self.state.user.avatar);
        self.update_profile(profile)?;
        Ok(&self.state.user)
    }

    pub fn select_date(&mut self, date: &str) -> Result<()> {
        let parsed = parse_date_key(date)?;
        let next = AppState {
            selected_date: parsed.format(DATE_FORMAT).to_string(),
            ..self.state.clone()
        };
        self.commit(next)
    }

    fn commit(&mut self, next: AppState) -> Result<()> {
        let blob = serde_json::to_string(&next).context("Failed to serialize state")?;
        self.storage.save(&blob)?;
        self.state = next;
        Ok(())
    }
}

/// Backfill the selected date and re-derive cached totals.
fn normalize(mut state: AppState) -> AppState {
    if state.selected_date.trim().is_empty() {
        state.selected_date = today_string();
    }
    for (date, log) in &mut state.logs {
        if log.date.is_empty() {
            log.date.clone_from(date);
        }
        let items = std::mem::take(&mut log.items);
        *log = log.with_items(items);
    }
    state
}
