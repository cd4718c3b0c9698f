use anyhow::{Result, bail};
use serde::Serialize;

use nutriflow_core::nutrition::{NutritionQuery, Resolution};
use nutriflow_core::service::FoodAnalyzer;

use super::helpers::print_json;

#[derive(Serialize)]
struct EstimateView<'a> {
    name: &'a str,
    quantity: f64,
    unit: &'a str,
    #[serde(flatten)]
    resolution: Resolution,
}

/// Estimate nutrition for one food without logging it.
pub(crate) async fn cmd_estimate(
    analyzer: &FoodAnalyzer<'_>,
    name: &str,
    quantity: f64,
    unit: &str,
    json: bool,
) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Food name cannot be empty");
    }
    if !quantity.is_finite() || quantity <= 0.0 {
        bail!("Quantity must be greater than 0");
    }

    let query = NutritionQuery::new(name, quantity, unit);
    let resolution = analyzer.estimate(&query).await;

    if json {
        return print_json(&EstimateView {
            name,
            quantity,
            unit,
            resolution,
        });
    }

    let e = resolution.estimate;
    let source = resolution.source;
    let confidence = e.confidence * 100.0;
    println!("{name} ({quantity} {unit})");
    println!(
        "  {:.0} kcal | P:{:.1}g C:{:.1}g F:{:.1}g",
        e.calories, e.protein, e.carbs, e.fat
    );
    println!("  confidence {confidence:.0}% via {source}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nutriflow_core::error::AnalysisError;
    use nutriflow_core::service::NutritionSource;

    struct Fixed(&'static str);

    #[async_trait]
    impl NutritionSource for Fixed {
        async fn ask(&self, _query: &NutritionQuery) -> Result<String, AnalysisError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_estimate_validates_input() {
        let source = Fixed("{}");
        let analyzer = FoodAnalyzer::new(&source);
        assert!(cmd_estimate(&analyzer, " ", 1.0, "份", true).await.is_err());
        assert!(cmd_estimate(&analyzer, "rice", -1.0, "份", true).await.is_err());
        assert!(cmd_estimate(&analyzer, "rice", 1.0, "碗", true).await.is_ok());
    }
}
