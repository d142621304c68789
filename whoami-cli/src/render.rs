//! Chart renderers
//!
//! A renderer receives a [`Comparison`] and writes it to any `io::Write`.
//! Categories are always the sorted set of distinct feature names.

use crate::profile::Comparison;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Density glyphs for 1, 2, 3-4 and 5+ points in one column
const DENSITY: [char; 4] = ['░', '▒', '▓', '█'];
const PERSONAL_MEAN: char = '◆';
const REGIONAL_MEAN: char = '▲';
const BELOW_RANGE: char = '<';
const ABOVE_RANGE: char = '>';

/// Writes a [`Comparison`] in some output format
pub trait ChartRenderer {
    fn render(&self, comparison: &Comparison, out: &mut dyn Write) -> io::Result<()>;
}

/// Terminal strip plot: one horizontal lane per feature over [0, 1]
///
/// Individual rows are drawn as density glyphs, the personal mean as a
/// diamond and the regional mean as a triangle. Values outside [0, 1] are
/// pinned to the lane edge and drawn as `<` or `>`.
#[derive(Debug, Clone)]
pub struct StripChart {
    width: usize,
}

impl StripChart {
    /// Lanes narrower than 10 columns are widened to 10
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(10),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn column(&self, value: f64) -> usize {
        let last = self.width - 1;
        (value.clamp(0.0, 1.0) * last as f64).round() as usize
    }

    fn lane(&self, values: &[f64], personal: Option<f64>, regional: Option<f64>) -> String {
        let mut counts = vec![0usize; self.width];
        let mut below = false;
        let mut above = false;

        for &value in values.iter().filter(|v| v.is_finite()) {
            below |= value < 0.0;
            above |= value > 1.0;
            counts[self.column(value)] += 1;
        }

        let mut lane: Vec<char> = counts
            .iter()
            .map(|&count| match count {
                0 => ' ',
                1 => DENSITY[0],
                2 => DENSITY[1],
                3 | 4 => DENSITY[2],
                _ => DENSITY[3],
            })
            .collect();

        if below {
            lane[0] = BELOW_RANGE;
        }
        if above {
            lane[self.width - 1] = ABOVE_RANGE;
        }

        if let Some(mean) = regional.filter(|m| m.is_finite()) {
            lane[self.column(mean)] = REGIONAL_MEAN;
        }
        // Personal mean wins a shared column
        if let Some(mean) = personal.filter(|m| m.is_finite()) {
            lane[self.column(mean)] = PERSONAL_MEAN;
        }

        lane.into_iter().collect()
    }
}

impl Default for StripChart {
    fn default() -> Self {
        Self::new(50)
    }
}

impl ChartRenderer for StripChart {
    fn render(&self, comparison: &Comparison, out: &mut dyn Write) -> io::Result<()> {
        let categories = comparison.categories();

        let mut values: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for row in &comparison.rows {
            values.entry(row.feature.as_str()).or_default().push(row.value);
        }

        let label_width = categories.iter().map(|c| c.len()).max().unwrap_or(7).max(7);
        let axis_pad = self.width.saturating_sub(2);

        writeln!(out, "Audio feature profile ({} rows)", comparison.rows.len())?;
        writeln!(
            out,
            "{:>lw$}  0{:pad$}1",
            "",
            "",
            lw = label_width,
            pad = axis_pad
        )?;

        for feature in &categories {
            let feature_values = values.get(feature.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let personal = comparison.personal_average.get(feature);
            let regional = comparison
                .regional_average
                .as_ref()
                .and_then(|r| r.get(feature));

            let lane = self.lane(feature_values, personal, regional);

            write!(out, "{:>lw$} |{}|", feature, lane, lw = label_width)?;
            match personal {
                Some(mean) => write!(out, " {}{:.3}", PERSONAL_MEAN, mean)?,
                None => write!(out, " {}  -  ", PERSONAL_MEAN)?,
            }
            if let Some(mean) = regional {
                write!(out, "  {}{:.3}", REGIONAL_MEAN, mean)?;
            }
            writeln!(out)?;
        }

        write!(
            out,
            "{:>lw$}  tracks per column: {}=1 {}=2 {}=3-4 {}=5+  {} your mean",
            "",
            DENSITY[0],
            DENSITY[1],
            DENSITY[2],
            DENSITY[3],
            PERSONAL_MEAN,
            lw = label_width
        )?;
        if comparison.regional_average.is_some() {
            write!(out, "  {} regional mean", REGIONAL_MEAN)?;
        }
        writeln!(out)?;

        Ok(())
    }
}

/// JSON document for external plotting tools
///
/// Shape: `{"rows": [{"feature", "value"}...], "personal_average": {...},
/// "regional_average": {...} | null}`.
#[derive(Debug, Clone, Default)]
pub struct JsonExport {
    pretty: bool,
}

impl JsonExport {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl ChartRenderer for JsonExport {
    fn render(&self, comparison: &Comparison, out: &mut dyn Write) -> io::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *out, comparison)?;
        } else {
            serde_json::to_writer(&mut *out, comparison)?;
        }
        writeln!(out)
    }
}
