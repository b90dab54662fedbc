use chrono::DateTime;
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{Color, IndirectFontRef, Line, Mm, PdfLayerReference, Point, Polygon, Rgb};
use pulse_core::config::ChartMode;
use pulse_query::TimeSeriesInfo;
use std::sync::Arc;

const BLACK: (f64, f64, f64) = (0.0, 0.0, 0.0);
const SERIES_STROKE: (f64, f64, f64) = (0.294, 0.753, 0.753);

/// Placement of one chart on a page, in millimeters from the bottom-left
/// corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartArea {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
    pub color: (f64, f64, f64),
}

/// Chart capability the report composer draws through. Selected once at
/// startup from configuration; when rendering is off the no-op renderer
/// keeps reports flowing without charts.
pub trait ChartRenderer: Send + Sync {
    fn pie_chart(
        &self,
        layer: &PdfLayerReference,
        font: &IndirectFontRef,
        area: ChartArea,
        slices: &[PieSlice],
    );

    fn line_chart(
        &self,
        layer: &PdfLayerReference,
        font: &IndirectFontRef,
        area: ChartArea,
        series: &TimeSeriesInfo,
    );
}

pub fn renderer_for(mode: ChartMode) -> Arc<dyn ChartRenderer> {
    match mode {
        ChartMode::Vector => Arc::new(VectorCharts),
        ChartMode::Off => Arc::new(NoopCharts),
    }
}

/// Draws charts from printpdf primitives; no raster backend, no font assets.
pub struct VectorCharts;

/// Leaves a placeholder note where each chart would be.
pub struct NoopCharts;

impl ChartRenderer for NoopCharts {
    fn pie_chart(
        &self,
        layer: &PdfLayerReference,
        font: &IndirectFontRef,
        area: ChartArea,
        _slices: &[PieSlice],
    ) {
        placeholder(layer, font, area);
    }

    fn line_chart(
        &self,
        layer: &PdfLayerReference,
        font: &IndirectFontRef,
        area: ChartArea,
        _series: &TimeSeriesInfo,
    ) {
        placeholder(layer, font, area);
    }
}

fn placeholder(layer: &PdfLayerReference, font: &IndirectFontRef, area: ChartArea) {
    set_fill(layer, BLACK);
    layer.use_text(
        "[chart rendering disabled]",
        10.0,
        Mm((area.x + area.width / 2.0 - 22.0) as f32),
        Mm((area.y + area.height / 2.0) as f32),
        font,
    );
}

impl ChartRenderer for VectorCharts {
    fn pie_chart(
        &self,
        layer: &PdfLayerReference,
        font: &IndirectFontRef,
        area: ChartArea,
        slices: &[PieSlice],
    ) {
        let total: f64 = slices.iter().map(|slice| slice.value).sum();
        if total <= 0.0 {
            set_fill(layer, BLACK);
            layer.use_text(
                "no events in range",
                10.0,
                Mm((area.x + area.width / 2.0 - 18.0) as f32),
                Mm((area.y + area.height / 2.0) as f32),
                font,
            );
            return;
        }

        let radius = (area.height / 2.0).min(area.width / 3.0) - 2.0;
        let center_x = area.x + area.width / 3.0;
        let center_y = area.y + area.height / 2.0;

        // Slices start at twelve o'clock and run clockwise.
        let mut start = 0.0f64;
        for slice in slices {
            let fraction = slice.value / total;
            let steps = ((fraction * 64.0).ceil() as usize).max(2);
            let mut ring = vec![(Point::new(Mm(center_x as f32), Mm(center_y as f32)), false)];
            for step in 0..=steps {
                let turn = start + fraction * (step as f64 / steps as f64);
                let angle = std::f64::consts::TAU * turn;
                ring.push((
                    Point::new(
                        Mm((center_x + radius * angle.sin()) as f32),
                        Mm((center_y + radius * angle.cos()) as f32),
                    ),
                    false,
                ));
            }
            set_fill(layer, slice.color);
            layer.add_polygon(Polygon {
                rings: vec![ring],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            });
            start += fraction;
        }

        let legend_x = area.x + area.width * 0.68;
        let mut legend_y = area.y + area.height - 8.0;
        for slice in slices {
            set_fill(layer, slice.color);
            layer.add_polygon(Polygon {
                rings: vec![square(legend_x, legend_y, 3.5)],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            });
            set_fill(layer, BLACK);
            layer.use_text(
                slice.label.as_str(),
                9.0,
                Mm((legend_x + 5.5) as f32),
                Mm((legend_y + 0.5) as f32),
                font,
            );
            legend_y -= 6.0;
        }
    }

    fn line_chart(
        &self,
        layer: &PdfLayerReference,
        font: &IndirectFontRef,
        area: ChartArea,
        series: &TimeSeriesInfo,
    ) {
        let origin_x = area.x + 14.0;
        let origin_y = area.y + 10.0;
        let plot_width = area.width - 18.0;
        let plot_height = area.height - 14.0;

        set_outline(layer, BLACK, 0.8);
        stroke_line(
            layer,
            vec![
                (origin_x, origin_y + plot_height),
                (origin_x, origin_y),
                (origin_x + plot_width, origin_y),
            ],
        );

        let data = &series.data;
        if data.is_empty() {
            set_fill(layer, BLACK);
            layer.use_text(
                "no samples in range",
                10.0,
                Mm((origin_x + plot_width / 2.0 - 16.0) as f32),
                Mm((origin_y + plot_height / 2.0) as f32),
                font,
            );
            return;
        }

        let t_min = data.first().map_or(0, |point| point.timestamp);
        let t_max = data.last().map_or(0, |point| point.timestamp);
        let span = (t_max - t_min).max(1) as f64;
        // The value axis is floored at zero regardless of the data.
        let v_max = data
            .iter()
            .fold(0.0f64, |acc, point| acc.max(point.value))
            .max(1.0);

        let position = |timestamp: i64, value: f64| {
            let x = origin_x + (timestamp - t_min) as f64 / span * plot_width;
            let y = origin_y + (value.max(0.0) / v_max) * plot_height;
            (x, y)
        };

        set_outline(layer, SERIES_STROKE, 1.2);
        if data.len() == 1 {
            let (x, y) = position(data[0].timestamp, data[0].value);
            set_fill(layer, SERIES_STROKE);
            layer.add_polygon(Polygon {
                rings: vec![square(x - 0.8, y - 0.8, 1.6)],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            });
        } else {
            stroke_line(
                layer,
                data.iter()
                    .map(|point| position(point.timestamp, point.value))
                    .collect(),
            );
        }

        set_fill(layer, BLACK);
        for (value, offset) in [(0.0, 0.0), (v_max / 2.0, 0.5), (v_max, 1.0)] {
            layer.use_text(
                format!("{value:.0}"),
                7.0,
                Mm((origin_x - 11.0) as f32),
                Mm((origin_y + plot_height * offset - 1.0) as f32),
                font,
            );
        }
        let ticks = [(t_min, 0.0), ((t_min + t_max) / 2, 0.5), (t_max, 1.0)];
        for (timestamp, offset) in ticks {
            layer.use_text(
                timestamp_label(timestamp),
                7.0,
                Mm((origin_x + plot_width * offset - 10.0) as f32),
                Mm((origin_y - 5.0) as f32),
                font,
            );
        }
    }
}

fn timestamp_label(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|instant| instant.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn square(x: f64, y: f64, side: f64) -> Vec<(Point, bool)> {
    vec![
        (Point::new(Mm(x as f32), Mm(y as f32)), false),
        (Point::new(Mm((x + side) as f32), Mm(y as f32)), false),
        (Point::new(Mm((x + side) as f32), Mm((y + side) as f32)), false),
        (Point::new(Mm(x as f32), Mm((y + side) as f32)), false),
    ]
}

fn stroke_line(layer: &PdfLayerReference, points: Vec<(f64, f64)>) {
    layer.add_line(Line {
        points: points
            .into_iter()
            .map(|(x, y)| (Point::new(Mm(x as f32), Mm(y as f32)), false))
            .collect(),
        is_closed: false,
    });
}

fn set_fill(layer: &PdfLayerReference, (r, g, b): (f64, f64, f64)) {
    layer.set_fill_color(Color::Rgb(Rgb::new(r as f32, g as f32, b as f32, None)));
}

fn set_outline(layer: &PdfLayerReference, (r, g, b): (f64, f64, f64), thickness: f64) {
    layer.set_outline_color(Color::Rgb(Rgb::new(r as f32, g as f32, b as f32, None)));
    layer.set_outline_thickness(thickness as f32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_label_is_human_readable() {
        assert_eq!(timestamp_label(0), "1970-01-01 00:00");
    }

    #[test]
    fn test_renderer_selection_follows_config() {
        // A smoke check that both capabilities construct.
        let _vector = renderer_for(ChartMode::Vector);
        let _noop = renderer_for(ChartMode::Off);
    }
}
