//! Inline SVG charts for the dashboard pages.

use chrono::NaiveDate;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 240.0;
const PADDING: f64 = 44.0;
const PALETTE: [&str; 6] = ["#2563eb", "#dc2626", "#16a34a", "#9333ea", "#ea580c", "#0891b2"];

pub const EMPTY_CHART: &str = "<p class=\"chart-empty\">No data to chart.</p>";

/// How y-axis values are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisFormat {
    Currency,
    Percent,
    Ratio,
    Count,
}

impl AxisFormat {
    fn format(&self, value: f64) -> String {
        match self {
            AxisFormat::Currency => format!("{value:.0}"),
            AxisFormat::Percent => format!("{:.1}%", value * 100.0),
            AxisFormat::Ratio => format!("{value:.2}"),
            AxisFormat::Count => format!("{value:.0}"),
        }
    }
}

pub struct LineSeries<'a> {
    pub label: &'a str,
    pub values: &'a [f64],
}

pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn bounds<'a>(values: impl Iterator<Item = &'a f64>) -> Option<(f64, f64)> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    (min <= max).then_some((min, max))
}

/// Multi-series line chart over a shared date axis. Series shorter than
/// `dates` are drawn over their leading dates only.
pub fn line_chart(dates: &[NaiveDate], series: &[LineSeries<'_>], format: AxisFormat) -> String {
    let Some((min, max)) = bounds(series.iter().flat_map(|s| s.values.iter())) else {
        return EMPTY_CHART.to_string();
    };
    if dates.is_empty() {
        return EMPTY_CHART.to_string();
    }

    let plot_width = WIDTH - 2.0 * PADDING;
    let plot_height = HEIGHT - 2.0 * PADDING;
    let range = max - min;
    let scale_y = if range > 0.0 { plot_height / range } else { 1.0 };
    let scale_x = if dates.len() > 1 {
        plot_width / (dates.len() - 1) as f64
    } else {
        0.0
    };
    let y_of = |v: f64| {
        if range > 0.0 {
            HEIGHT - PADDING - (v - min) * scale_y
        } else {
            HEIGHT / 2.0
        }
    };

    let mut svg = format!(
        "<svg class=\"chart\" viewBox=\"0 0 {WIDTH:.0} {HEIGHT:.0}\" xmlns=\"http://www.w3.org/2000/svg\" role=\"img\">"
    );
    svg.push_str(&format!(
        "<line x1=\"{PADDING:.0}\" y1=\"{top:.0}\" x2=\"{PADDING:.0}\" y2=\"{bottom:.0}\" stroke=\"#94a3b8\"/>\
         <line x1=\"{PADDING:.0}\" y1=\"{bottom:.0}\" x2=\"{right:.0}\" y2=\"{bottom:.0}\" stroke=\"#94a3b8\"/>",
        top = PADDING,
        bottom = HEIGHT - PADDING,
        right = WIDTH - PADDING,
    ));
    svg.push_str(&format!(
        "<text x=\"4\" y=\"{:.0}\" font-size=\"10\">{}</text>\
         <text x=\"4\" y=\"{:.0}\" font-size=\"10\">{}</text>",
        PADDING + 4.0,
        format.format(max),
        HEIGHT - PADDING,
        format.format(min),
    ));
    svg.push_str(&format!(
        "<text x=\"{PADDING:.0}\" y=\"{:.0}\" font-size=\"10\">{}</text>\
         <text x=\"{:.0}\" y=\"{:.0}\" font-size=\"10\" text-anchor=\"end\">{}</text>",
        HEIGHT - PADDING + 16.0,
        dates[0],
        WIDTH - PADDING,
        HEIGHT - PADDING + 16.0,
        dates[dates.len() - 1],
    ));
    if min < 0.0 && max > 0.0 {
        let zero = y_of(0.0);
        svg.push_str(&format!(
            "<line x1=\"{PADDING:.0}\" y1=\"{zero:.1}\" x2=\"{:.0}\" y2=\"{zero:.1}\" stroke=\"#cbd5e1\" stroke-dasharray=\"4 3\"/>",
            WIDTH - PADDING
        ));
    }

    for (i, s) in series.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let points: Vec<String> = s
            .values
            .iter()
            .take(dates.len())
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(j, &v)| format!("{:.1},{:.1}", PADDING + j as f64 * scale_x, y_of(v)))
            .collect();
        if points.is_empty() {
            continue;
        }
        svg.push_str(&format!(
            "<polyline fill=\"none\" stroke=\"{color}\" stroke-width=\"1.5\" points=\"{}\"/>",
            points.join(" ")
        ));
        svg.push_str(&format!(
            "<text x=\"{:.0}\" y=\"{:.0}\" font-size=\"11\" fill=\"{color}\">{}</text>",
            PADDING + 8.0 + i as f64 * 110.0,
            PADDING - 12.0,
            escape_xml(s.label)
        ));
    }
    svg.push_str("</svg>");
    svg
}

/// Horizontal bar chart, one bar per (label, value), drawn in input order.
pub fn bar_chart(bars: &[(String, f64)], format: AxisFormat) -> String {
    let Some((_, max)) = bounds(bars.iter().map(|(_, v)| v)) else {
        return EMPTY_CHART.to_string();
    };
    let row_height = 22.0;
    let label_width = 140.0;
    let height = bars.len() as f64 * row_height + 10.0;
    let bar_space = WIDTH - label_width - 70.0;
    let scale = if max > 0.0 { bar_space / max } else { 0.0 };

    let mut svg = format!(
        "<svg class=\"chart\" viewBox=\"0 0 {WIDTH:.0} {height:.0}\" xmlns=\"http://www.w3.org/2000/svg\" role=\"img\">"
    );
    for (i, (label, value)) in bars.iter().enumerate() {
        let y = 5.0 + i as f64 * row_height;
        let w = (value.max(0.0) * scale).max(1.0);
        svg.push_str(&format!(
            "<text x=\"{:.0}\" y=\"{:.0}\" font-size=\"11\" text-anchor=\"end\">{}</text>\
             <rect x=\"{label_width:.0}\" y=\"{y:.0}\" width=\"{w:.1}\" height=\"{:.0}\" fill=\"{}\"/>\
             <text x=\"{:.1}\" y=\"{:.0}\" font-size=\"11\">{}</text>",
            label_width - 6.0,
            y + 14.0,
            escape_xml(label),
            row_height - 6.0,
            PALETTE[0],
            label_width + w + 4.0,
            y + 14.0,
            format.format(*value),
        ));
    }
    svg.push_str("</svg>");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    #[test]
    fn empty_inputs_render_placeholder() {
        assert_eq!(line_chart(&[], &[], AxisFormat::Currency), EMPTY_CHART);
        assert_eq!(bar_chart(&[], AxisFormat::Ratio), EMPTY_CHART);
    }

    #[test]
    fn line_chart_has_one_polyline_per_series() {
        let a = [100.0, 101.0, 103.0];
        let b = [100.0, 99.0, 98.0];
        let svg = line_chart(
            &dates(3),
            &[
                LineSeries { label: "Strategy", values: &a },
                LineSeries { label: "Buy & Hold", values: &b },
            ],
            AxisFormat::Currency,
        );
        assert!(svg.starts_with("<svg"));
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains("Buy &amp; Hold"));
        assert!(svg.contains("2024-01-03"));
    }

    #[test]
    fn flat_series_does_not_divide_by_zero() {
        let flat = [5.0, 5.0];
        let svg = line_chart(&dates(2), &[LineSeries { label: "x", values: &flat }], AxisFormat::Ratio);
        assert!(!svg.contains("NaN"));
    }

    #[test]
    fn drawdown_gets_zero_line_when_crossing() {
        let dd = [0.1, -0.2, 0.0];
        let svg = line_chart(&dates(3), &[LineSeries { label: "dd", values: &dd }], AxisFormat::Percent);
        assert!(svg.contains("stroke-dasharray"));
        assert!(svg.contains("-20.0%"));
    }

    #[test]
    fn bar_chart_labels_escaped() {
        let svg = bar_chart(&[("m&a".into(), 3.0), ("growth".into(), 1.0)], AxisFormat::Count);
        assert_eq!(svg.matches("<rect").count(), 2);
        assert!(svg.contains("m&amp;a"));
    }
}
