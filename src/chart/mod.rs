//! Chart rendering for the report's companion image.
//!
//! Draws the rating histogram and the sentiment distribution side by
//! side into `<app_id>_sentiment.png`.

use crate::models::AnalysisReport;
use anyhow::Result;
use plotters::prelude::*;
use std::path::Path;
use tracing::info;

const CHART_WIDTH: u32 = 1200;
const CHART_HEIGHT: u32 = 500;

/// Plotters error types are backend-specific; flatten them for anyhow.
fn chart_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow::anyhow!("chart rendering failed: {}", e)
}

/// Render the rating + sentiment chart for a report.
pub fn render_sentiment_chart(report: &AnalysisReport, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;
    let (left, right) = root.split_horizontally(CHART_WIDTH / 2);

    draw_rating_histogram(&left, report).map_err(chart_err)?;
    draw_sentiment_bars(&right, report).map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    info!("Chart saved to {}", path.display());
    Ok(())
}

fn draw_rating_histogram(
    area: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    report: &AnalysisReport,
) -> Result<(), Box<dyn std::error::Error>> {
    let y_max = report
        .analysis
        .rating_distribution
        .values()
        .copied()
        .max()
        .unwrap_or(1)
        + 1;

    let mut chart = ChartBuilder::on(area)
        .caption(
            format!("Rating Distribution - {}", report.app_info.title),
            ("sans-serif", 18),
        )
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(45)
        .build_cartesian_2d((1u32..5u32).into_segmented(), 0u64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Rating")
        .y_desc("Reviews")
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(BLUE.mix(0.6).filled())
            .data(
                report
                    .analysis
                    .rating_distribution
                    .iter()
                    .map(|(&score, &count)| (u32::from(score), count)),
            ),
    )?;

    Ok(())
}

fn draw_sentiment_bars(
    area: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    report: &AnalysisReport,
) -> Result<(), Box<dyn std::error::Error>> {
    let counts = &report.analysis.sentiment_distribution;
    let bars: [(&str, u64, RGBColor); 3] = [
        ("positive", counts.positive, RGBColor(46, 204, 113)),
        ("neutral", counts.neutral, RGBColor(127, 140, 141)),
        ("negative", counts.negative, RGBColor(231, 76, 60)),
    ];
    let y_max = bars.iter().map(|(_, count, _)| *count).max().unwrap_or(1) + 1;

    let mut chart = ChartBuilder::on(area)
        .caption("Sentiment Distribution", ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(45)
        .build_cartesian_2d((0u32..2u32).into_segmented(), 0u64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Sentiment")
        .y_desc("Reviews")
        .x_label_formatter(&|value| match value {
            SegmentValue::CenterOf(i) => bars
                .get(*i as usize)
                .map(|(label, _, _)| label.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .draw()?;

    for (i, (_, count, color)) in bars.iter().enumerate() {
        chart.draw_series(std::iter::once(Rectangle::new(
            [
                (SegmentValue::Exact(i as u32), 0u64),
                (SegmentValue::Exact(i as u32 + 1), *count),
            ],
            color.mix(0.8).filled(),
        )))?;
    }

    Ok(())
}
