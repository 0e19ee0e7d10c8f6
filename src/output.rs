//! Rendering contracts and the terminal adapter that consumes them.
//!
//! The controller only ever produces the plain values defined here. Drawing
//! them is the job of a [`Renderer`].
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

use crate::util::{format_decimal, MISSING};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Donut,
}

/// Named colours of the dashboard theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorToken {
    Primary,
    Secondary,
    Success,
    /// One colour per slice, for donuts.
    Palette,
}

impl ColorToken {
    pub fn hex(self) -> &'static [&'static str] {
        match self {
            ColorToken::Primary => &["#4f46e5"],
            ColorToken::Secondary => &["#7c3aed"],
            ColorToken::Success => &["#10b981"],
            ColorToken::Palette => &["#4f46e5", "#7c3aed", "#ec4899", "#f59e0b", "#10b981"],
        }
    }
}

/// A chart to draw: labels and values are parallel and ordered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub labels: Vec<String>,
    /// `None` is a gap in the series, not a zero.
    pub values: Vec<Option<f64>>,
    pub color: Option<ColorToken>,
}

impl ChartSpec {
    pub fn new(kind: ChartKind, color: Option<ColorToken>) -> Self {
        Self {
            kind,
            labels: Vec::new(),
            values: Vec::new(),
            color,
        }
    }

    pub fn point(mut self, label: impl Into<String>, value: Option<f64>) -> Self {
        self.labels.push(label.into());
        self.values.push(value.filter(|v| v.is_finite()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// One table row of display-ready cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowSpec {
    pub cells: Vec<String>,
}

impl RowSpec {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetBody {
    Chart(ChartSpec),
    Table { header: RowSpec, rows: Vec<RowSpec> },
    Narrative { headline: String, sentence: String },
    Text { text: String },
    /// The widget's data could not be obtained or interpreted.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Widget {
    pub id: &'static str,
    pub title: String,
    pub body: WidgetBody,
}

impl Widget {
    pub fn new(id: &'static str, title: impl Into<String>, body: WidgetBody) -> Self {
        Self {
            id,
            title: title.into(),
            body,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.body, WidgetBody::Unavailable { .. })
    }
}

/// Everything one view shows, in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewFrame {
    pub view: &'static str,
    pub title: &'static str,
    pub subtitle: &'static str,
    pub widgets: Vec<Widget>,
}

impl ViewFrame {
    pub fn widget(&self, id: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.id == id)
    }
}

/// Presentation boundary. Implementations draw but never compute.
pub trait Renderer {
    fn render(&mut self, frame: &ViewFrame);

    /// Show a one-off message such as "No data to export".
    fn notify(&mut self, message: &str);
}

/// Prints frames to stdout: tables in Markdown, charts as text bars.
#[derive(Debug)]
pub struct TerminalRenderer {
    /// Width of the longest bar.
    pub bar_width: usize,
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self { bar_width: 40 }
    }
}

impl Renderer for TerminalRenderer {
    fn render(&mut self, frame: &ViewFrame) {
        println!("\n{}", frame.title);
        println!("{}\n", frame.subtitle);
        for widget in &frame.widgets {
            println!("{}", widget.title);
            println!("{}\n", render_body(&widget.body, self.bar_width));
        }
    }

    fn notify(&mut self, message: &str) {
        println!("{}\n", message);
    }
}

pub fn render_body(body: &WidgetBody, bar_width: usize) -> String {
    match body {
        WidgetBody::Chart(chart) => render_chart(chart, bar_width),
        WidgetBody::Table { header, rows } => render_table(header, rows),
        WidgetBody::Narrative { headline, sentence } => format!("{headline}\n{sentence}"),
        WidgetBody::Text { text } => text.clone(),
        WidgetBody::Unavailable { reason } => format!("(unavailable: {reason})"),
    }
}

pub fn render_table(header: &RowSpec, rows: &[RowSpec]) -> String {
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    let mut builder = Builder::default();
    builder.push_record(header.cells.clone());
    for row in rows {
        builder.push_record(row.cells.clone());
    }
    builder.build().with(Style::markdown()).to_string()
}

/// Horizontal text bars scaled to the largest value.
pub fn render_chart(chart: &ChartSpec, bar_width: usize) -> String {
    if chart.is_empty() {
        return "(no data)".to_string();
    }
    let max = chart
        .values
        .iter()
        .flatten()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let label_width = chart.labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);

    let mut lines = Vec::with_capacity(chart.labels.len());
    for (label, value) in chart.labels.iter().zip(&chart.values) {
        let line = match value {
            Some(v) => {
                let len = if max > 0.0 {
                    ((v.abs() / max) * bar_width as f64).round() as usize
                } else {
                    0
                };
                format!(
                    "{label:<label_width$} | {} {}",
                    "#".repeat(len),
                    format_decimal(Some(*v), 2)
                )
            }
            None => format!("{label:<label_width$} | {MISSING}"),
        };
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_points_drop_non_finite_values() {
        let chart = ChartSpec::new(ChartKind::Bar, None)
            .point("a", Some(1.0))
            .point("b", Some(f64::INFINITY))
            .point("c", None);

        assert_eq!(chart.values, vec![Some(1.0), None, None]);
    }

    #[test]
    fn chart_renders_scaled_bars_and_gaps() {
        let chart = ChartSpec::new(ChartKind::Bar, Some(ColorToken::Primary))
            .point("7:00", Some(10.0))
            .point("8:00", Some(5.0))
            .point("9:00", None);

        let text = render_chart(&chart, 4);

        assert_eq!(
            text,
            "7:00 | #### 10.00\n8:00 | ## 5.00\n9:00 | --"
        );
    }

    #[test]
    fn empty_table_says_so() {
        let header = RowSpec::new(["ID", "Fare"]);

        assert_eq!(render_table(&header, &[]), "(no rows)");
    }

    #[test]
    fn table_contains_every_cell() {
        let header = RowSpec::new(["Route", "Trips"]);
        let rows = vec![RowSpec::new(["A -> B", "1,200"])];

        let text = render_table(&header, &rows);

        assert!(text.contains("Route"));
        assert!(text.contains("A -> B"));
        assert!(text.contains("1,200"));
    }

    #[test]
    fn donut_palette_has_a_colour_per_slice() {
        assert_eq!(ColorToken::Primary.hex(), ["#4f46e5"]);
        assert_eq!(ColorToken::Palette.hex().len(), 5);
    }

    #[test]
    fn widget_bodies_serialize_with_a_type_tag() {
        let widget = Widget::new(
            "borough-chart",
            "Revenue by Borough",
            WidgetBody::Unavailable {
                reason: "timed out".to_string(),
            },
        );

        let value = serde_json::to_value(&widget).unwrap();

        assert_eq!(value["body"]["type"], "unavailable");
        assert_eq!(value["body"]["reason"], "timed out");
        assert!(!widget.is_available());
    }
}
