//! Output formatting for fetched records and field statistics.

use std::fmt::Write;

use crate::error::{Result, VitalisError};
use crate::model::Record;
use crate::stats::FieldStats;

/// Records plus the column order to present them in.
pub struct RecordSet {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl RecordSet {
    /// A leading `tag` column is only worth printing when tags differ.
    fn mixed_tags(&self) -> bool {
        match self.records.first() {
            Some(first) => self.records.iter().any(|r| r.tag != first.tag),
            None => false,
        }
    }

    fn header(&self) -> Vec<&str> {
        let mut header = Vec::with_capacity(self.columns.len() + 1);
        if self.mixed_tags() {
            header.push("tag");
        }
        header.extend(self.columns.iter().map(String::as_str));
        header
    }

    fn cells<'a>(&'a self, record: &'a Record) -> Vec<&'a str> {
        let mut cells = Vec::with_capacity(self.columns.len() + 1);
        if self.mixed_tags() {
            cells.push(record.tag.as_str());
        }
        cells.extend(self.columns.iter().map(|c| record.get(c).unwrap_or("")));
        cells
    }
}

/// Trait for rendering a record set.
pub trait RecordFormatter {
    fn format(&self, set: &RecordSet) -> Result<String>;
}

/// Aligned plain-text table.
pub struct TableFormatter;

impl RecordFormatter for TableFormatter {
    fn format(&self, set: &RecordSet) -> Result<String> {
        if set.records.is_empty() {
            return Ok("No matching records.\n".to_string());
        }

        let header = set.header();
        let rows: Vec<Vec<&str>> = set.records.iter().map(|r| set.cells(r)).collect();
        let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        write_row(&mut out, &header, &widths);
        let total: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        out.push_str(&"-".repeat(total));
        out.push('\n');
        for row in &rows {
            write_row(&mut out, row, &widths);
        }
        let count = set.records.len();
        let noun = if count == 1 { "record" } else { "records" };
        let _ = writeln!(out, "({count} {noun})");
        Ok(out)
    }
}

fn write_row(out: &mut String, cells: &[&str], widths: &[usize]) {
    let mut line = String::new();
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        let _ = write!(line, "{cell:<width$}");
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

/// RFC 4180 CSV with a header row.
pub struct CsvFormatter;

impl RecordFormatter for CsvFormatter {
    fn format(&self, set: &RecordSet) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(set.header())?;
        for record in &set.records {
            writer.write_record(set.cells(record))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| VitalisError::Io(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| VitalisError::Parse(e.to_string()))
    }
}

/// Pretty-printed JSON array of `{tag, fields}` objects.
pub struct JsonFormatter;

impl RecordFormatter for JsonFormatter {
    fn format(&self, set: &RecordSet) -> Result<String> {
        let mut out = serde_json::to_string_pretty(&set.records)?;
        out.push('\n');
        Ok(out)
    }
}

/// Width of the longest histogram bar.
const BAR_WIDTH: u64 = 40;

/// Text summary of a field with a histogram drawn in `#`.
pub fn format_stats(stats: &FieldStats) -> String {
    let mut out = String::new();
    let field = &stats.field;
    let _ = writeln!(out, "Field:      {field}");
    let _ = writeln!(
        out,
        "Values:     {}/{} numeric ({:.1}%)",
        stats.numeric,
        stats.records,
        stats.numeric_rate() * 100.0
    );

    let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean()) else {
        out.push_str("No numeric values to summarize.\n");
        return out;
    };
    let _ = writeln!(out, "Min:        {min}");
    let _ = writeln!(out, "Max:        {max}");
    let _ = writeln!(out, "Mean:       {mean:.3}");
    let _ = writeln!(out, "Sum:        {}", stats.sum);

    let peak = stats.histogram.iter().map(|b| b.count).max().unwrap_or(0);
    if peak == 0 {
        return out;
    }
    out.push('\n');
    let last = stats.histogram.len() - 1;
    for (i, bin) in stats.histogram.iter().enumerate() {
        let close = if i == last { ']' } else { ')' };
        let range = format!("[{:.2}, {:.2}{close}", bin.lower, bin.upper);
        let bar = "#".repeat((bin.count * BAR_WIDTH).div_ceil(peak) as usize);
        let _ = writeln!(out, "{range:<28} {:>8}  {bar}", bin.count);
    }
    out
}
