pub mod charts;
pub mod palette;

pub use charts::{ChartArea, ChartRenderer, NoopCharts, PieSlice, VectorCharts, renderer_for};

use chrono::{SecondsFormat, Utc};
use futures::try_join;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use pulse_core::error::ReportError;
use pulse_core::types::LogFilter;
use pulse_query::{QueryService, TimeSeriesInfo};
use std::collections::BTreeMap;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const PAGE_WIDTH: f64 = 210.0;
const PAGE_HEIGHT: f64 = 297.0;
const MARGIN: f64 = 18.0;
const TABLE_COL_WIDTH: f64 = 55.0;
const TABLE_ROW_HEIGHT: f64 = 10.0;

/// Builds multi-section PDF reports out of the query surface and serves
/// their on-disk paths back to callers.
pub struct ReportService {
    query: QueryService,
    charts: Arc<dyn ChartRenderer>,
    reports_dir: PathBuf,
}

impl ReportService {
    pub fn new(
        query: QueryService,
        charts: Arc<dyn ChartRenderer>,
        reports_dir: impl Into<PathBuf>,
    ) -> Result<Self, ReportError> {
        let reports_dir = reports_dir.into();
        fs::create_dir_all(&reports_dir).map_err(|err| ReportError::Write {
            message: err.to_string(),
        })?;
        Ok(Self {
            query,
            charts,
            reports_dir,
        })
    }

    /// Fetches the chart data fanned out, composes the document on the
    /// blocking pool and resolves with the filename only once the file is
    /// fully written.
    pub async fn generate(&self, filter: &LogFilter) -> Result<String, ReportError> {
        let started = Utc::now();
        let (series, distribution) = try_join!(
            self.query.time_series(filter),
            self.query.type_distribution(filter),
        )?;

        let stamp = started
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace(':', "-");
        let filename = format!("report_{stamp}.pdf");
        let path = self.reports_dir.join(&filename);

        let charts = self.charts.clone();
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || {
            compose(&path, &filter, &series, &distribution, charts.as_ref(), started)
        })
        .await
        .map_err(|err| ReportError::Write {
            message: err.to_string(),
        })??;

        info!("pdf report generated: {filename}");
        Ok(filename)
    }

    /// Resolves a previously returned filename to its on-disk path, or
    /// `None` when no such report exists. Path separators are rejected so a
    /// filename cannot escape the reports directory.
    pub fn report_path(&self, filename: &str) -> Option<PathBuf> {
        if filename.contains(['/', '\\']) {
            return None;
        }
        let path = self.reports_dir.join(filename);
        path.is_file().then_some(path)
    }
}

fn compose(
    path: &Path,
    filter: &LogFilter,
    series: &[TimeSeriesInfo],
    distribution: &BTreeMap<String, u64>,
    charts: &dyn ChartRenderer,
    started: chrono::DateTime<Utc>,
) -> Result<(), ReportError> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        "Event Analytics Report",
        Mm(PAGE_WIDTH as f32),
        Mm(PAGE_HEIGHT as f32),
        "Layer 1",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(render_err)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(render_err)?;

    // Page 1: header, filter echo, type distribution.
    let layer = doc.get_page(first_page).get_layer(first_layer);
    text_centered(&layer, &bold, "Event Analytics Report", 24.0, PAGE_HEIGHT - 30.0);

    let mut cursor = PAGE_HEIGHT - 45.0;
    layer.use_text("Filter criteria:", 12.0, Mm(MARGIN as f32), Mm(cursor as f32), &bold);
    cursor -= 6.0;
    for line in filter_lines(filter) {
        layer.use_text(line, 10.0, Mm(MARGIN as f32), Mm(cursor as f32), &font);
        cursor -= 5.0;
    }
    cursor -= 8.0;

    text_centered(&layer, &bold, "Event Type Distribution", 16.0, cursor);
    let slices: Vec<PieSlice> = distribution
        .iter()
        .enumerate()
        .map(|(index, (label, count))| PieSlice {
            label: label.clone(),
            value: *count as f64,
            color: palette::color_for(index),
        })
        .collect();
    charts.pie_chart(
        &layer,
        &font,
        ChartArea {
            x: MARGIN,
            y: cursor - 110.0,
            width: PAGE_WIDTH - 2.0 * MARGIN,
            height: 100.0,
        },
        &slices,
    );

    // One page per series.
    for info in series {
        let (page, layer_index) =
            doc.add_page(Mm(PAGE_WIDTH as f32), Mm(PAGE_HEIGHT as f32), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer_index);
        text_centered(&layer, &bold, "Event Execution Times", 16.0, PAGE_HEIGHT - 30.0);
        charts.line_chart(
            &layer,
            &font,
            ChartArea {
                x: MARGIN,
                y: PAGE_HEIGHT - 160.0,
                width: PAGE_WIDTH - 2.0 * MARGIN,
                height: 110.0,
            },
            info,
        );
        text_centered(
            &layer,
            &font,
            &format!("{} - {}", info.event_type, info.service),
            10.0,
            PAGE_HEIGHT - 170.0,
        );
    }

    // Final page: summary table with a totals row.
    let (page, layer_index) =
        doc.add_page(Mm(PAGE_WIDTH as f32), Mm(PAGE_HEIGHT as f32), "Layer 1");
    let layer = doc.get_page(page).get_layer(layer_index);
    text_centered(&layer, &bold, "Summary Statistics", 16.0, PAGE_HEIGHT - 30.0);
    layer.use_text(
        "Total Events by Type:",
        12.0,
        Mm(MARGIN as f32),
        Mm((PAGE_HEIGHT - 42.0) as f32),
        &bold,
    );

    let total: u64 = distribution.values().sum();
    let mut row_y = PAGE_HEIGHT - 55.0;
    table_row(&layer, &bold, row_y, "Event Type", "Count", "Percentage");
    row_y -= TABLE_ROW_HEIGHT;
    for (event_type, count) in distribution {
        table_row(
            &layer,
            &font,
            row_y,
            event_type,
            &count.to_string(),
            &percentage(*count, total),
        );
        row_y -= TABLE_ROW_HEIGHT;
    }
    table_row(
        &layer,
        &bold,
        row_y,
        "Total",
        &total.to_string(),
        if total == 0 { "0.00%" } else { "100%" },
    );

    let elapsed_ms = (Utc::now() - started).num_milliseconds();
    text_centered(
        &layer,
        &font,
        &format!(
            "Report generated on {} in {elapsed_ms}ms",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        ),
        8.0,
        15.0,
    );

    let file = fs::File::create(path).map_err(|err| ReportError::Write {
        message: err.to_string(),
    })?;
    doc.save(&mut BufWriter::new(file))
        .map_err(|err| ReportError::Write {
            message: err.to_string(),
        })?;
    Ok(())
}

fn filter_lines(filter: &LogFilter) -> Vec<String> {
    let date = |value: Option<chrono::DateTime<Utc>>| {
        value.map_or_else(
            || "Not specified".to_string(),
            |date| date.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    };
    vec![
        format!("Start date: {}", date(filter.start_date)),
        format!("End date: {}", date(filter.end_date)),
        format!(
            "Event type: {}",
            filter
                .event_type
                .map_or_else(|| "All types".to_string(), |t| t.to_string())
        ),
        format!(
            "Service: {}",
            filter
                .service
                .clone()
                .unwrap_or_else(|| "All services".to_string())
        ),
    ]
}

fn percentage(count: u64, total: u64) -> String {
    if total == 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", (count as f64 / total as f64) * 100.0)
}

fn table_row(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    y: f64,
    first: &str,
    second: &str,
    third: &str,
) {
    layer.use_text(first, 10.0, Mm(MARGIN as f32), Mm(y as f32), font);
    layer.use_text(
        second,
        10.0,
        Mm((MARGIN + TABLE_COL_WIDTH) as f32),
        Mm(y as f32),
        font,
    );
    layer.use_text(
        third,
        10.0,
        Mm((MARGIN + 2.0 * TABLE_COL_WIDTH) as f32),
        Mm(y as f32),
        font,
    );
}

/// Helvetica has no width tables here; half the point size is close enough
/// to center headings.
fn text_centered(layer: &PdfLayerReference, font: &IndirectFontRef, text: &str, size: f64, y: f64) {
    let width_mm = text.len() as f64 * size * 0.5 * 0.3528;
    let x = (PAGE_WIDTH - width_mm) / 2.0;
    layer.use_text(text, size as f32, Mm(x.max(MARGIN) as f32), Mm(y as f32), font);
}

fn render_err(err: printpdf::Error) -> ReportError {
    ReportError::Render {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_db::{DbHandle, DocumentStore, SeriesStore};

    fn service(dir: &Path, charts: Arc<dyn ChartRenderer>) -> ReportService {
        let handle = DbHandle::in_memory().unwrap();
        let store = DocumentStore::new(handle.clone());
        let query = QueryService::new(&store, SeriesStore::new(handle));
        ReportService::new(query, charts, dir).unwrap()
    }

    #[tokio::test]
    async fn test_generate_names_and_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let reports = service(dir.path(), Arc::new(NoopCharts));

        let filename = reports.generate(&LogFilter::default()).await.unwrap();
        assert!(filename.starts_with("report_"));
        assert!(filename.ends_with(".pdf"));
        assert!(!filename.contains(':'));

        let path = reports.report_path(&filename).expect("report should exist");
        assert!(fs::metadata(path).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_report_path_rejects_missing_and_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let reports = service(dir.path(), Arc::new(NoopCharts));

        assert!(reports.report_path("report_nope.pdf").is_none());
        assert!(reports.report_path("../etc/passwd").is_none());
    }

    #[test]
    fn test_percentage_formatting() {
        assert_eq!(percentage(1, 3), "33.33%");
        assert_eq!(percentage(0, 0), "0.00%");
    }

    #[test]
    fn test_filter_lines_echo_unset_fields() {
        let lines = filter_lines(&LogFilter::default());
        assert_eq!(lines[0], "Start date: Not specified");
        assert_eq!(lines[2], "Event type: All types");
        assert_eq!(lines[3], "Service: All services");
    }
}
