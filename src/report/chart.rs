//! SVG charts: per-cluster topic term bars and the cluster scatter plot.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::{debug, instrument};

use super::error::ReportError;
use crate::topics::TopicReport;

/// Topics drawn per bar chart.
pub const CHART_TOPICS: usize = 3;
/// Terms drawn per topic.
const CHART_TERMS: usize = 5;

const PALETTE: [&str; 10] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#bab0ac",
];

const PANEL_WIDTH: f64 = 260.0;
const BAR_HEIGHT: f64 = 18.0;
const LABEL_WIDTH: f64 = 120.0;
const SCATTER_SIZE: f64 = 480.0;
const SCATTER_MARGIN: f64 = 30.0;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn write_svg(path: &Path, svg: &str) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))?;
    }
    fs::write(path, svg).map_err(|e| ReportError::io(path, e))?;
    debug!(path = %path.display(), "chart written");
    Ok(())
}

/// Horizontal bar chart of the top terms of the largest topics, one panel
/// per topic.
///
/// # Errors
///
/// [`ReportError::EmptyChart`] when the report has no topics, or
/// [`ReportError::Io`] when the file cannot be written.
#[instrument(skip(report), fields(path = %path.display()))]
pub fn write_topic_barchart(path: &Path, title: &str, report: &TopicReport) -> Result<(), ReportError> {
    let topics = report.largest_topics(CHART_TOPICS);
    if topics.is_empty() {
        return Err(ReportError::EmptyChart {
            path: path.to_path_buf(),
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let width = PANEL_WIDTH * topics.len() as f64 + 20.0;
    #[allow(clippy::cast_precision_loss)]
    let height = 70.0 + BAR_HEIGHT * 1.5 * CHART_TERMS as f64;
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" font-family="sans-serif" font-size="11">"#
    );
    let _ = writeln!(
        svg,
        r#"<text x="10" y="20" font-size="14">{}</text>"#,
        escape(title)
    );

    for (panel, (topic, _)) in topics.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let x0 = 10.0 + PANEL_WIDTH * panel as f64;
        let color = PALETTE[panel % PALETTE.len()];
        let terms = report.model.get(topic).map_or(&[][..], Vec::as_slice);
        let terms = &terms[..terms.len().min(CHART_TERMS)];
        let max_weight = terms.iter().map(|t| t.weight).fold(0.0, f64::max);

        let _ = writeln!(
            svg,
            r#"<text x="{x0}" y="45" font-size="12">Topic {topic}</text>"#
        );
        for (row, term) in terms.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let y = 55.0 + BAR_HEIGHT * 1.5 * row as f64;
            let bar = if max_weight > 0.0 {
                (PANEL_WIDTH - LABEL_WIDTH - 20.0) * term.weight / max_weight
            } else {
                0.0
            };
            let _ = writeln!(
                svg,
                r#"<text x="{x0}" y="{}">{}</text><rect x="{}" y="{y}" width="{bar:.1}" height="{BAR_HEIGHT}" fill="{color}"/>"#,
                y + BAR_HEIGHT * 0.75,
                escape(&term.term),
                x0 + LABEL_WIDTH,
            );
        }
    }
    svg.push_str("</svg>\n");
    write_svg(path, &svg)
}

/// Scatter plot of the 2-D document projection, coloured by cluster.
///
/// # Errors
///
/// [`ReportError::EmptyChart`] when there are no points, or
/// [`ReportError::Io`] when the file cannot be written.
#[instrument(skip(points, labels), fields(path = %path.display(), points = points.len()))]
pub fn write_cluster_scatter(path: &Path, points: &[[f64; 2]], labels: &[usize]) -> Result<(), ReportError> {
    if points.is_empty() {
        return Err(ReportError::EmptyChart {
            path: path.to_path_buf(),
        });
    }

    let (min_x, max_x) = bounds(points.iter().map(|p| p[0]));
    let (min_y, max_y) = bounds(points.iter().map(|p| p[1]));
    let scale = |value: f64, min: f64, max: f64| {
        if max > min {
            SCATTER_MARGIN + (value - min) / (max - min) * (SCATTER_SIZE - 2.0 * SCATTER_MARGIN)
        } else {
            SCATTER_SIZE / 2.0
        }
    };

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{SCATTER_SIZE}" height="{SCATTER_SIZE}" font-family="sans-serif" font-size="12">"#
    );
    let _ = writeln!(
        svg,
        r#"<text x="{SCATTER_MARGIN}" y="20">Article clusters (PCA)</text>"#
    );
    for (point, &label) in points.iter().zip(labels) {
        let cx = scale(point[0], min_x, max_x);
        // SVG y grows downwards.
        let cy = SCATTER_SIZE - scale(point[1], min_y, max_y);
        let _ = writeln!(
            svg,
            r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="4" fill="{}"><title>cluster {label}</title></circle>"#,
            PALETTE[label % PALETTE.len()]
        );
    }
    svg.push_str("</svg>\n");
    write_svg(path, &svg)
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}
