//! Live monitoring commands

use anyhow::Result;
use std::time::Duration;
use tabled::Tabled;

use crate::client::{ApiClient, MonitorReport, MonitorRequest, StreamReading};
use crate::output::{
    color_confidence, color_label, format_actual, format_percent, print_alert, print_info,
    print_json, print_success, print_table, OutputFormat,
};

/// Slack on top of the monitoring duration before the request gives up
const RESPONSE_GRACE: Duration = Duration::from_secs(30);

#[derive(Tabled)]
struct DetectionRow {
    #[tabled(rename = "#")]
    sample_id: usize,
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Prediction")]
    label: String,
    #[tabled(rename = "Probability")]
    probability: String,
    #[tabled(rename = "Actual")]
    actual: String,
    #[tabled(rename = "Alert")]
    alert: String,
}

/// Run a monitoring session and print its report
pub async fn start(client: &ApiClient, request: MonitorRequest, format: OutputFormat) -> Result<()> {
    if let OutputFormat::Table = format {
        print_info(&format!(
            "Monitoring for {}s every {}s (alert threshold {})",
            request.duration_secs, request.interval_secs, request.alert_threshold
        ));
    }

    let timeout = Duration::from_secs(request.duration_secs) + RESPONSE_GRACE;
    let report: MonitorReport = client
        .post_with_timeout("v1/monitor/start", &request, timeout)
        .await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_table(
                report
                    .detections
                    .iter()
                    .map(|d| DetectionRow {
                        sample_id: d.sample_id,
                        timestamp: d.timestamp.clone(),
                        label: match (&d.prediction_label, &d.error) {
                            (Some(label), _) => color_label(label),
                            (None, Some(err)) => format!("error: {}", err),
                            (None, None) => "-".to_string(),
                        },
                        probability: d
                            .probability
                            .map(format_percent)
                            .unwrap_or_else(|| "-".to_string()),
                        actual: format_actual(d.actual_label),
                        alert: if d.alert_sent { "🚨".to_string() } else { String::new() },
                    })
                    .collect(),
            );

            let s = &report.summary;
            print_success(&format!(
                "{} flows in {:.1}s: {} botnet, {} normal, {} failed, {} alerts ({:.2}% detection rate)",
                s.total_samples,
                s.duration_seconds,
                s.botnet_detected,
                s.normal_traffic,
                s.failed,
                s.alerts_sent,
                s.detection_rate
            ));
        }
    }

    Ok(())
}

/// Poll single readings and print them as they arrive
pub async fn stream(
    client: &ApiClient,
    count: usize,
    interval: Duration,
    format: OutputFormat,
) -> Result<()> {
    for i in 0..count {
        let reading: StreamReading = client.get("v1/monitor/stream").await?;
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&reading)?),
            OutputFormat::Table => {
                let line = format!(
                    "{}  {}  p={}  confidence={}  actual={}",
                    reading.timestamp,
                    color_label(&reading.prediction_label),
                    format_percent(reading.probability),
                    color_confidence(reading.confidence),
                    format_actual(reading.actual_label)
                );
                if reading.prediction == 1 {
                    print_alert(&line);
                } else {
                    println!("{}", line);
                }
            }
        }
        if i + 1 < count {
            tokio::time::sleep(interval).await;
        }
    }

    Ok(())
}
