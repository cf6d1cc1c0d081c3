//! Reference dataset commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, DatasetInfo, Sample};
use crate::output::{format_actual, print_json, print_table, OutputFormat};

/// Columns shown per sample in table mode; the full row is in JSON output
const PREVIEW_COLUMNS: usize = 4;

#[derive(Tabled)]
struct InfoRow {
    #[tabled(rename = "Property")]
    property: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Features")]
    preview: String,
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Show reference dataset statistics
pub async fn info(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let info: DatasetInfo = client.get("v1/samples/info").await?;

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            print_table(vec![
                InfoRow {
                    property: "Total samples",
                    value: info.total_samples.to_string(),
                },
                InfoRow {
                    property: "Feature columns",
                    value: info.num_features.to_string(),
                },
                InfoRow {
                    property: "Labelled",
                    value: info.has_labels.to_string(),
                },
                InfoRow {
                    property: "Normal",
                    value: optional(info.normal_samples),
                },
                InfoRow {
                    property: "Botnet",
                    value: optional(info.botnet_samples),
                },
                InfoRow {
                    property: "Botnet %",
                    value: info
                        .botnet_percentage
                        .map(|p| format!("{:.2}%", p))
                        .unwrap_or_else(|| "-".to_string()),
                },
            ]);
            println!("\nFirst features: {}", info.feature_names.join(", "));
        }
    }

    Ok(())
}

/// Draw random rows from the reference dataset
pub async fn random(
    client: &ApiClient,
    n: usize,
    balanced: bool,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("v1/samples/random?n={}&balanced={}", n, balanced);
    let samples: Vec<Sample> = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&samples)?,
        OutputFormat::Table => print_table(
            samples
                .iter()
                .enumerate()
                .map(|(index, s)| SampleRow {
                    index,
                    label: format_actual(s.label),
                    preview: s
                        .features
                        .iter()
                        .take(PREVIEW_COLUMNS)
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect(),
        ),
    }

    Ok(())
}
