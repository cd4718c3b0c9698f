use anyhow::{Result, bail};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::models::{DEFAULT_UNIT, FoodItem};
use crate::nutrition::{EstimateRequest, NutritionEstimator, NutritionQuery, Resolution};
use crate::quantity::text_to_item;
use crate::vision::{Recognition, dish_name};

/// Name given to a merged meal when recognition produced no dish name.
pub const UNNAMED_MEAL: &str = "未命名餐点";

/// Photo recognition backend.
///
/// The CLI implements this with reqwest against the vision service.
#[async_trait]
pub trait FoodRecognizer: Send + Sync {
    async fn recognize(&self, image_base64: &str) -> Result<Recognition, AnalysisError>;
}

/// Source of raw nutrition replies for a single food, usually an LLM.
#[async_trait]
pub trait NutritionSource: Send + Sync {
    async fn ask(&self, query: &NutritionQuery) -> Result<String, AnalysisError>;
}

/// Result of analysing one photo or description.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub dish_name: String,
    pub items: Vec<FoodItem>,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

impl Analysis {
    #[must_use]
    pub fn total_calories(&self) -> f64 {
        self.items.iter().map(|i| i.calories).sum()
    }

    fn check_number(&self, number: usize) -> Result<usize> {
        if number == 0 || number > self.items.len() {
            bail!(
                "Item {number} not found; the analysis has {} item(s)",
                self.items.len()
            );
        }
        Ok(number - 1)
    }

    /// Change the quantity of item `number` (1-based), rescaling its nutrients.
    pub fn with_item_quantity(mut self, number: usize, quantity: f64) -> Result<Self> {
        let index = self.check_number(number)?;
        self.items[index] = self.items[index].with_quantity(quantity)?;
        Ok(self)
    }

    /// Drop items by 1-based number and rename the dish after what is left.
    pub fn without_items(self, numbers: &[usize]) -> Result<Self> {
        for &number in numbers {
            self.check_number(number)?;
        }
        if numbers.is_empty() {
            return Ok(self);
        }
        let items: Vec<FoodItem> = self
            .items
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !numbers.contains(&(i + 1)))
            .map(|(_, item)| item)
            .collect();
        if items.is_empty() {
            bail!("Every item was skipped, nothing left to log");
        }
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        Ok(Self {
            dish_name: dish_name(&names),
            items,
        })
    }

    /// Collapse the analysis into the single item that gets logged.
    ///
    /// One item is kept as is; several become one serving named after the
    /// dish, with nutrients summed.
    #[must_use]
    pub fn into_meal(self, image: Option<String>) -> FoodItem {
        if let [only] = self.items.as_slice() {
            return FoodItem {
                image,
                ..only.clone()
            };
        }
        let sum = |f: fn(&FoodItem) -> Option<f64>| round1(self.items.iter().filter_map(f).sum());
        let calories = self.total_calories();
        let name = if self.dish_name.trim().is_empty() {
            UNNAMED_MEAL.to_string()
        } else {
            self.dish_name.clone()
        };
        FoodItem {
            id: None,
            name,
            unit: DEFAULT_UNIT.to_string(),
            quantity: 1.0,
            calories,
            calories_per_unit: Some(calories),
            protein: Some(sum(|i| i.protein)),
            carbs: Some(sum(|i| i.carbs)),
            fat: Some(sum(|i| i.fat)),
            image,
        }
    }
}

fn apply_estimate(item: FoodItem, resolution: &Resolution) -> FoodItem {
    let e = resolution.estimate;
    let calories = e.calories.round();
    let per_unit = if item.quantity > 0.0 {
        calories / item.quantity
    } else {
        calories
    };
    FoodItem {
        calories,
        calories_per_unit: Some(per_unit),
        protein: Some(round1(e.protein)),
        carbs: Some(round1(e.carbs)),
        fat: Some(round1(e.fat)),
        ..item
    }
}

/// Runs recognition and nutrition estimation for photos and descriptions.
pub struct FoodAnalyzer<'a> {
    source: &'a dyn NutritionSource,
    estimator: NutritionEstimator,
}

impl<'a> FoodAnalyzer<'a> {
    #[must_use]
    pub fn new(source: &'a dyn NutritionSource) -> Self {
        Self::with_estimator(source, NutritionEstimator::default())
    }

    #[must_use]
    pub fn with_estimator(source: &'a dyn NutritionSource, estimator: NutritionEstimator) -> Self {
        Self { source, estimator }
    }

    /// Estimate one food. Never fails: request errors fall through to the
    /// offline strategies.
    pub async fn estimate(&self, query: &NutritionQuery) -> Resolution {
        let reply = match self.source.ask(query).await {
            Ok(reply) if !reply.trim().is_empty() => Some(reply),
            Ok(_) => {
                warn!(food = %query.name, "empty nutrition reply, using fallback");
                None
            }
            Err(e) => {
                warn!(food = %query.name, error = %e, "nutrition request failed, using fallback");
                None
            }
        };
        let resolution = self.estimator.resolve(&EstimateRequest {
            name: &query.name,
            quantity: query.quantity,
            unit: &query.unit,
            reply: reply.as_deref(),
        });
        debug!(
            food = %query.name,
            source = resolution.source,
            calories = resolution.estimate.calories,
            "nutrition estimated"
        );
        resolution
    }

    /// Estimate every item concurrently and write the results back.
    pub async fn estimate_items(&self, items: Vec<FoodItem>) -> Vec<FoodItem> {
        let queries: Vec<NutritionQuery> = items
            .iter()
            .map(|i| NutritionQuery::new(&i.name, i.quantity, &i.unit))
            .collect();
        let resolutions = join_all(queries.iter().map(|q| self.estimate(q))).await;
        items
            .into_iter()
            .zip(resolutions.iter())
            .map(|(item, r)| apply_estimate(item, r))
            .collect()
    }

    pub async fn analyze_text(&self, text: &str) -> Result<Analysis, AnalysisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }
        let item = text_to_item(text);
        let dish_name = item.name.clone();
        let items = self.estimate_items(vec![item]).await;
        Ok(Analysis { dish_name, items })
    }

    pub async fn analyze_image(
        &self,
        recognizer: &dyn FoodRecognizer,
        image_base64: &str,
    ) -> Result<Analysis, AnalysisError> {
        if image_base64.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }
        let recognition = recognizer.recognize(image_base64).await?;
        if recognition.items.is_empty() {
            return Err(AnalysisError::NoData);
        }
        debug!(dish = %recognition.dish_name, items = recognition.items.len(), "photo recognised");
        let items = self.estimate_items(recognition.items).await;
        Ok(Analysis {
            dish_name: recognition.dish_name,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::store::StateStore;

    /// Replies per food name; unknown foods fail as if offline.
    struct ScriptedSource(HashMap<&'static str, &'static str>);

    impl ScriptedSource {
        fn offline() -> Self {
            Self(HashMap::new())
        }
    }

    #[async_trait]
    impl NutritionSource for ScriptedSource {
        async fn ask(&self, query: &NutritionQuery) -> Result<String, AnalysisError> {
            self.0
                .get(query.name.as_str())
                .map(|r| (*r).to_string())
                .ok_or_else(|| AnalysisError::Request("offline".into()))
        }
    }

    struct StubRecognizer(Vec<FoodItem>);

    #[async_trait]
    impl FoodRecognizer for StubRecognizer {
        async fn recognize(&self, _image: &str) -> Result<Recognition, AnalysisError> {
            let names: Vec<&str> = self.0.iter().map(|i| i.name.as_str()).collect();
            Ok(Recognition {
                dish_name: dish_name(&names),
                items: self.0.clone(),
            })
        }
    }

    struct FailingRecognizer;

    #[async_trait]
    impl FoodRecognizer for FailingRecognizer {
        async fn recognize(&self, _image: &str) -> Result<Recognition, AnalysisError> {
            Err(AnalysisError::TaskFailed)
        }
    }

    #[tokio::test]
    async fn test_text_with_offline_source_uses_unit_estimate() {
        let source = ScriptedSource::offline();
        let analyzer = FoodAnalyzer::new(&source);
        let analysis = analyzer.analyze_text("一碗牛肉面").await.unwrap();
        assert_eq!(analysis.dish_name, "一碗牛肉面");
        assert_eq!(analysis.items.len(), 1);
        assert_eq!(analysis.items[0].calories, 300.0);
        assert_eq!(analysis.items[0].unit, "碗");
    }

    #[tokio::test]
    async fn test_text_logged_end_to_end() {
        let source = ScriptedSource::offline();
        let analyzer = FoodAnalyzer::new(&source);
        let mut store = StateStore::open_in_memory();
        let before = store.selected_log().total_calories_in;

        let analysis = analyzer.analyze_text("一碗牛肉面").await.unwrap();
        let log = store.add_items(vec![analysis.into_meal(None)]).unwrap();

        assert_eq!(log.total_calories_in, before + 300.0);
        assert_eq!(log.items.last().unwrap().name, "一碗牛肉面");
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        let source = ScriptedSource::offline();
        let analyzer = FoodAnalyzer::new(&source);
        let err = analyzer.analyze_text("   ").await.unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyInput));
    }

    #[tokio::test]
    async fn test_batch_mixes_replies_and_fallbacks() {
        let source = ScriptedSource(HashMap::from([(
            "米饭",
            r#"{"calories": 232.4, "protein": 4.33, "carbs": 51.27, "fat": 0.44, "confidence": 0.9}"#,
        )]));
        let analyzer = FoodAnalyzer::new(&source);
        let items = vec![
            FoodItem::candidate("米饭", "碗", 1.0),
            FoodItem::candidate("鸡蛋", "个", 2.0),
        ];
        let out = analyzer.estimate_items(items).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].calories, 232.0);
        assert_eq!(out[0].protein, Some(4.3));
        assert_eq!(out[0].carbs, Some(51.3));
        // offline: table value for egg
        assert_eq!(out[1].calories, 70.0);
        assert_eq!(out[1].calories_per_unit, Some(35.0));
    }

    #[tokio::test]
    async fn test_image_analysis_merges_into_meal() {
        let source = ScriptedSource::offline();
        let analyzer = FoodAnalyzer::new(&source);
        let recognizer = StubRecognizer(vec![
            FoodItem::candidate("米饭", "碗", 1.0),
            FoodItem::candidate("鸡蛋", "个", 1.0),
            FoodItem::candidate("青菜", "份", 1.0),
        ]);
        let analysis = analyzer
            .analyze_image(&recognizer, "aGVsbG8=")
            .await
            .unwrap();
        assert_eq!(analysis.dish_name, "米饭+鸡蛋等3种食物");
        assert_eq!(analysis.total_calories(), 295.0);

        let meal = analysis.into_meal(Some("lunch.jpg".into()));
        assert_eq!(meal.name, "米饭+鸡蛋等3种食物");
        assert_eq!(meal.unit, DEFAULT_UNIT);
        assert_eq!(meal.quantity, 1.0);
        assert_eq!(meal.calories, 295.0);
        assert_eq!(meal.protein, Some(12.0));
        assert_eq!(meal.image.as_deref(), Some("lunch.jpg"));
    }

    #[tokio::test]
    async fn test_recognition_failure_propagates() {
        let source = ScriptedSource::offline();
        let analyzer = FoodAnalyzer::new(&source);
        let err = analyzer
            .analyze_image(&FailingRecognizer, "aGVsbG8=")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::TaskFailed));
        assert_eq!(
            err.user_message(true),
            "Could not recognise the photo, please try again"
        );
    }

    #[test]
    fn test_unnamed_meal() {
        let analysis = Analysis {
            dish_name: String::new(),
            items: vec![
                FoodItem::candidate("a", "份", 1.0),
                FoodItem::candidate("b", "份", 1.0),
            ],
        };
        assert_eq!(analysis.into_meal(None).name, UNNAMED_MEAL);
    }

    fn three_items() -> Analysis {
        let priced = |name: &str, calories: f64| FoodItem {
            calories,
            calories_per_unit: Some(calories),
            protein: Some(10.0),
            ..FoodItem::candidate(name, "份", 1.0)
        };
        Analysis {
            dish_name: "米饭+鸡蛋等3种食物".to_string(),
            items: vec![priced("米饭", 200.0), priced("鸡蛋", 70.0), priced("盘子", 100.0)],
        }
    }

    #[test]
    fn test_without_items_drops_and_renames() {
        let analysis = three_items().without_items(&[3]).unwrap();
        assert_eq!(analysis.items.len(), 2);
        assert_eq!(analysis.dish_name, "米饭+鸡蛋等2种食物");
        assert_eq!(analysis.total_calories(), 270.0);

        let meal = three_items().without_items(&[1, 3]).unwrap().into_meal(None);
        assert_eq!(meal.name, "鸡蛋");
        assert_eq!(meal.calories, 70.0);
    }

    #[test]
    fn test_without_items_rejects_bad_numbers() {
        assert!(three_items().without_items(&[0]).is_err());
        assert!(three_items().without_items(&[4]).is_err());
        assert!(three_items().without_items(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_with_item_quantity_rescales() {
        let analysis = three_items().with_item_quantity(2, 2.0).unwrap();
        assert_eq!(analysis.items[1].quantity, 2.0);
        assert_eq!(analysis.items[1].calories, 140.0);
        assert_eq!(analysis.items[1].protein, Some(20.0));
        assert!(three_items().with_item_quantity(2, 0.0).is_err());
        assert!(three_items().with_item_quantity(9, 1.0).is_err());
    }
}
