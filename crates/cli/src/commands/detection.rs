//! Detection-related CLI commands

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::path::Path;
use tabled::Tabled;

use crate::client::{
    ApiClient, BatchReport, BatchRequest, DetectRequest, DetectResponse, ExplainResponse,
    FeatureList, ModelList, Prediction,
};
use crate::output::{
    color_confidence, color_label, format_actual, format_correct, format_percent, print_info,
    print_json, print_table, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "Loaded")]
    loaded: String,
}

#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Prediction")]
    label: String,
    #[tabled(rename = "Probability")]
    probability: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
}

impl PredictionRow {
    fn new(p: &Prediction) -> Self {
        let label = if p.prediction == 1 { "Botnet" } else { "Normal" };
        Self {
            model: p.model.clone(),
            label: color_label(label),
            probability: format_percent(p.probability),
            confidence: color_confidence(p.confidence),
        }
    }
}

#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Prediction")]
    label: String,
    #[tabled(rename = "Probability")]
    probability: String,
    #[tabled(rename = "Actual")]
    actual: String,
    #[tabled(rename = "Correct")]
    correct: String,
}

/// Parse a `NAME=VALUE` pair; numeric values are sent as numbers
pub fn parse_feature(raw: &str) -> Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Feature name missing in '{}'", raw);
    }
    let value = value.trim();
    let value = match value.parse::<f64>() {
        Ok(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string())),
        Err(_) => Value::String(value.to_string()),
    };
    Ok((name.to_string(), value))
}

/// Features from an optional JSON file, overridden by `--feature` pairs
pub fn collect_features(file: Option<&Path>, pairs: &[String]) -> Result<Map<String, Value>> {
    let mut features = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str::<Value>(&content).context("Failed to parse feature file")? {
                // Accept both a bare map and a detect request body
                Value::Object(mut map) => match map.remove("features") {
                    Some(Value::Object(inner)) => inner,
                    Some(_) => bail!("'features' must be a JSON object"),
                    None => map,
                },
                _ => bail!("Feature file must contain a JSON object"),
            }
        }
        None => Map::new(),
    };

    for raw in pairs {
        let (name, value) = parse_feature(raw)?;
        features.insert(name, value);
    }
    Ok(features)
}

/// List the canonical model features
pub async fn list_features(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: FeatureList = client.get("v1/features").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            for (i, name) in result.features.iter().enumerate() {
                println!("{:>3}  {}", i + 1, name);
            }
            println!("\nTotal: {} features", result.count);
        }
    }

    Ok(())
}

/// Show which models are resident
pub async fn list_models(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: ModelList = client.get("v1/models").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => print_table(
            result
                .models
                .iter()
                .map(|m| ModelRow {
                    name: m.name.clone(),
                    loaded: if m.loaded { "✓".to_string() } else { "lazy".to_string() },
                })
                .collect(),
        ),
    }

    Ok(())
}

/// Score one flow
pub async fn detect(
    client: &ApiClient,
    model: &str,
    features: Map<String, Value>,
    explain: bool,
    format: OutputFormat,
) -> Result<()> {
    if features.is_empty() {
        print_warning("No features given; missing features default to 0");
    }
    let request = DetectRequest { features };

    if explain {
        let path = format!("v1/detect/{}?explain=true", model);
        let response: ExplainResponse = client.post(&path, &request).await?;
        match format {
            OutputFormat::Json => print_json(&response)?,
            OutputFormat::Table => {
                print_table(
                    [&response.sequence, &response.graph, &response.ensemble]
                        .into_iter()
                        .map(PredictionRow::new)
                        .collect(),
                );
                let agreement = response.meta_features.get(4).copied().unwrap_or(0.0) == 1.0;
                print_info(&format!(
                    "Base models {}",
                    if agreement { "agree" } else { "disagree" }
                ));
            }
        }
        return Ok(());
    }

    let path = format!("v1/detect/{}", model);
    let response: DetectResponse = client.post(&path, &request).await?;
    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_table(vec![PredictionRow::new(&response.result)]);
            if let Some(label) = response.actual_label {
                println!(
                    "\nActual: {}  Correct: {}",
                    format_actual(Some(label)),
                    format_correct(Some(label == response.result.prediction))
                );
            }
        }
    }

    Ok(())
}

/// Score a batch of reference flows
pub async fn batch(
    client: &ApiClient,
    request: BatchRequest,
    format: OutputFormat,
) -> Result<()> {
    let report: BatchReport = client.post("v1/detect/batch", &request).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_table(
                report
                    .predictions
                    .iter()
                    .map(|item| BatchRow {
                        index: item.index,
                        label: match (&item.prediction_label, &item.error) {
                            (Some(label), _) => color_label(label),
                            (None, Some(err)) => format!("error: {}", err),
                            (None, None) => "-".to_string(),
                        },
                        probability: item
                            .probability
                            .map(format_percent)
                            .unwrap_or_else(|| "-".to_string()),
                        actual: format_actual(item.actual_label),
                        correct: format_correct(item.correct),
                    })
                    .collect(),
            );

            let s = &report.summary;
            println!("\nModel: {}", s.model);
            println!(
                "Samples: {}  Botnet: {}  Normal: {}  Failed: {}",
                s.total_samples, s.botnet_detected, s.normal_detected, s.failed
            );
            if let Some(accuracy) = s.accuracy {
                println!("Accuracy: {:.2}%", accuracy);
            }
            println!("Detection rate: {:.2}%", s.detection_rate);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature() {
        let (name, value) = parse_feature("SYN Flag Cnt=3").unwrap();
        assert_eq!(name, "SYN Flag Cnt");
        assert_eq!(value, serde_json::json!(3.0));

        let (_, value) = parse_feature("Flow Duration = n/a").unwrap();
        assert_eq!(value, Value::String("n/a".to_string()));

        assert!(parse_feature("no separator").is_err());
        assert!(parse_feature("=5").is_err());
    }

    #[test]
    fn test_collect_features_from_file_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::write(
            &path,
            r#"{"features": {"Flow Duration": 120, "SYN Flag Cnt": 0}}"#,
        )
        .unwrap();

        let features =
            collect_features(Some(&path), &["SYN Flag Cnt=2".to_string()]).unwrap();
        assert_eq!(features["Flow Duration"], serde_json::json!(120));
        assert_eq!(features["SYN Flag Cnt"], serde_json::json!(2.0));
    }

    #[test]
    fn test_collect_features_bare_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::write(&path, r#"{"Tot Fwd Pkts": 4}"#).unwrap();
        let features = collect_features(Some(&path), &[]).unwrap();
        assert_eq!(features.len(), 1);

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(collect_features(Some(&path), &[]).is_err());
    }
}
