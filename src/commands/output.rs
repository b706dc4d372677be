use crate::cli::OutputFormat;
use crate::error::PtxError;
use crate::event::{Event, Row, Value};
use crate::exec::QueryOutput;
use chrono::DateTime;
use colored::Colorize;
use std::collections::BTreeSet;
use std::io::Write;

/// Renders executor output (events or group rows) in any of the CLI
/// output formats. Writes to the handle it is given so tests can
/// capture bytes; `colored` honours NO_COLOR on real terminals.
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn print(&self, output: &QueryOutput, writer: &mut impl Write) -> Result<(), PtxError> {
        match output {
            QueryOutput::Events(events) => self.print_events(events, writer),
            QueryOutput::Rows(rows) => self.print_rows(rows, writer),
        }
    }

    pub fn print_events(&self, events: &[Event], writer: &mut impl Write) -> Result<(), PtxError> {
        match self.format {
            OutputFormat::Table | OutputFormat::Chart => self.events_table(events, writer),
            OutputFormat::Json => self.json_lines(&events_json(events), writer),
            OutputFormat::Csv => self.events_csv(events, writer),
            OutputFormat::Yaml => self.yaml(&events_json(events), writer),
            OutputFormat::Pretty => self.events_pretty(events, writer),
        }
    }

    pub fn print_rows(&self, rows: &[Row], writer: &mut impl Write) -> Result<(), PtxError> {
        match self.format {
            OutputFormat::Table => self.rows_table(rows, writer),
            OutputFormat::Json => self.json_lines(&rows_json(rows), writer),
            OutputFormat::Csv => self.rows_csv(rows, writer),
            OutputFormat::Yaml => self.yaml(&rows_json(rows), writer),
            OutputFormat::Pretty => self.rows_pretty(rows, writer),
            OutputFormat::Chart => self.rows_chart(rows, writer),
        }
    }

    fn events_table(&self, events: &[Event], writer: &mut impl Write) -> Result<(), PtxError> {
        for event in events {
            let fields: Vec<String> = event
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k.dimmed(), v.render()))
                .collect();
            writeln!(
                writer,
                "{} {} {}",
                format_epoch(event.timestamp).cyan(),
                event.source.magenta(),
                fields.join(" ")
            )
            .map_err(stream_error)?;
        }
        Ok(())
    }

    fn events_pretty(&self, events: &[Event], writer: &mut impl Write) -> Result<(), PtxError> {
        for event in events {
            writeln!(
                writer,
                "{} {}",
                format_epoch(event.timestamp).cyan().bold(),
                event.source.magenta()
            )
            .map_err(stream_error)?;
            for (name, value) in &event.fields {
                writeln!(writer, "  {}: {}", name.dimmed(), value.render()).map_err(stream_error)?;
            }
            if let Some(raw) = &event.raw {
                writeln!(writer, "  {}: {}", "raw".dimmed(), raw.dimmed()).map_err(stream_error)?;
            }
        }
        Ok(())
    }

    fn events_csv(&self, events: &[Event], writer: &mut impl Write) -> Result<(), PtxError> {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        for event in events {
            names.extend(event.fields.keys().map(String::as_str));
        }
        let mut csv_writer = csv::Writer::from_writer(vec![]);
        let mut header = vec!["timestamp".to_string(), "source".to_string()];
        header.extend(names.iter().map(|s| s.to_string()));
        csv_writer.write_record(&header).map_err(csv_error)?;
        for event in events {
            let mut record = vec![event.timestamp.to_string(), event.source.clone()];
            for name in &names {
                record.push(event.field(name).map(Value::render).unwrap_or_default());
            }
            csv_writer.write_record(&record).map_err(csv_error)?;
        }
        let bytes = csv_writer.into_inner().map_err(|e| stream_error_msg(&e.to_string()))?;
        writer.write_all(&bytes).map_err(stream_error)
    }

    fn rows_table(&self, rows: &[Row], writer: &mut impl Write) -> Result<(), PtxError> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let columns: Vec<&String> = first.keys().collect();
        let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
        for row in rows {
            for (i, column) in columns.iter().enumerate() {
                let len = row.get(*column).map(Value::render).unwrap_or_default().len();
                widths[i] = widths[i].max(len);
            }
        }

        let header: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = w))
            .collect();
        writeln!(writer, "{}", header.join("  ").bold()).map_err(stream_error)?;
        let rule: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        writeln!(writer, "{}", "─".repeat(rule).dimmed()).map_err(stream_error)?;

        for row in rows {
            let cells: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| {
                    format!(
                        "{:<width$}",
                        row.get(*c).map(Value::render).unwrap_or_default(),
                        width = w
                    )
                })
                .collect();
            writeln!(writer, "{}", cells.join("  ")).map_err(stream_error)?;
        }
        Ok(())
    }

    fn rows_pretty(&self, rows: &[Row], writer: &mut impl Write) -> Result<(), PtxError> {
        for (i, row) in rows.iter().enumerate() {
            writeln!(writer, "{}", format!("─ row {} ─", i + 1).dimmed()).map_err(stream_error)?;
            for (name, value) in row {
                writeln!(writer, "  {}: {}", name.dimmed(), value.render()).map_err(stream_error)?;
            }
        }
        Ok(())
    }

    fn rows_csv(&self, rows: &[Row], writer: &mut impl Write) -> Result<(), PtxError> {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        for row in rows {
            names.extend(row.keys().map(String::as_str));
        }
        let mut csv_writer = csv::Writer::from_writer(vec![]);
        csv_writer
            .write_record(names.iter().copied())
            .map_err(csv_error)?;
        for row in rows {
            let record: Vec<String> = names
                .iter()
                .map(|n| row.get(*n).map(Value::render).unwrap_or_default())
                .collect();
            csv_writer.write_record(&record).map_err(csv_error)?;
        }
        let bytes = csv_writer.into_inner().map_err(|e| stream_error_msg(&e.to_string()))?;
        writer.write_all(&bytes).map_err(stream_error)
    }

    /// Bar chart over grouped rows: label columns are the non-numeric
    /// keys, the bar tracks the first numeric column (count, when
    /// present) scaled to the widest bar.
    fn rows_chart(&self, rows: &[Row], writer: &mut impl Write) -> Result<(), PtxError> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let numeric_key = first
            .keys()
            .find(|k| *k == "count")
            .or_else(|| {
                first
                    .iter()
                    .find(|(_, v)| v.as_numeric().is_some())
                    .map(|(k, _)| k)
            })
            .cloned();
        let Some(numeric_key) = numeric_key else {
            return self.rows_table(rows, writer);
        };

        let labels: Vec<String> = rows
            .iter()
            .map(|row| {
                let parts: Vec<String> = row
                    .iter()
                    .filter(|(k, _)| **k != numeric_key)
                    .map(|(_, v)| v.render())
                    .collect();
                if parts.is_empty() {
                    "*".to_string()
                } else {
                    parts.join(" ")
                }
            })
            .collect();
        let values: Vec<f64> = rows
            .iter()
            .map(|row| {
                row.get(&numeric_key)
                    .and_then(Value::as_numeric)
                    .unwrap_or(0.0)
            })
            .collect();
        let max = values.iter().cloned().fold(f64::MIN, f64::max).max(1.0);
        let label_width = labels.iter().map(String::len).max().unwrap_or(1);

        for (label, value) in labels.iter().zip(&values) {
            let bar_len = ((value / max) * 40.0).round() as usize;
            writeln!(
                writer,
                "{:<width$} {:>10} {}",
                label,
                crate::exec::number_value(*value).render(),
                "█".repeat(bar_len).green(),
                width = label_width
            )
            .map_err(stream_error)?;
        }
        Ok(())
    }

    fn json_lines(
        &self,
        objects: &[serde_json::Value],
        writer: &mut impl Write,
    ) -> Result<(), PtxError> {
        for object in objects {
            let line = serde_json::to_string(object).map_err(|e| stream_error_msg(&e.to_string()))?;
            writeln!(writer, "{}", line).map_err(stream_error)?;
        }
        Ok(())
    }

    fn yaml(
        &self,
        objects: &[serde_json::Value],
        writer: &mut impl Write,
    ) -> Result<(), PtxError> {
        let text = serde_yaml::to_string(objects).map_err(|e| stream_error_msg(&e.to_string()))?;
        writer.write_all(text.as_bytes()).map_err(stream_error)
    }
}

fn format_epoch(epoch: i64) -> String {
    DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

fn events_json(events: &[Event]) -> Vec<serde_json::Value> {
    events
        .iter()
        .map(|event| {
            let mut object = serde_json::Map::new();
            object.insert("timestamp".to_string(), event.timestamp.into());
            object.insert("source".to_string(), event.source.clone().into());
            let fields: serde_json::Map<String, serde_json::Value> = event
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            object.insert("fields".to_string(), serde_json::Value::Object(fields));
            if let Some(raw) = &event.raw {
                object.insert("raw".to_string(), raw.clone().into());
            }
            serde_json::Value::Object(object)
        })
        .collect()
}

fn rows_json(rows: &[Row]) -> Vec<serde_json::Value> {
    rows.iter()
        .map(|row| {
            serde_json::Value::Object(
                row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            )
        })
        .collect()
}

fn stream_error(e: std::io::Error) -> PtxError {
    stream_error_msg(&e.to_string())
}

fn stream_error_msg(message: &str) -> PtxError {
    PtxError::InternalInvariant {
        message: format!("output stream failed: {}", message),
    }
}

fn csv_error(e: csv::Error) -> PtxError {
    stream_error_msg(&e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(fields: &[(&str, Value)]) -> Event {
        let mut e = Event::new("test.log").with_timestamp(1764842400);
        for (name, value) in fields {
            e.fields.insert(name.to_string(), value.clone());
        }
        e
    }

    fn row(entries: &[(&str, Value)]) -> Row {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn render(format: OutputFormat, output: &QueryOutput) -> String {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        OutputFormatter::new(format).print(output, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_json_event_lines() {
        let out = QueryOutput::Events(vec![
            event(&[("status", Value::Int(200))]).with_raw("raw line")
        ]);
        let text = render(OutputFormat::Json, &out);
        let parsed: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(parsed["timestamp"], 1764842400);
        assert_eq!(parsed["source"], "test.log");
        assert_eq!(parsed["fields"]["status"], 200);
        assert_eq!(parsed["raw"], "raw line");
    }

    #[test]
    fn test_json_rows() {
        let out = QueryOutput::Rows(vec![row(&[
            ("ip", Value::Str("1.1.1.1".into())),
            ("count", Value::Int(3)),
        ])]);
        let text = render(OutputFormat::Json, &out);
        let parsed: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(parsed["ip"], "1.1.1.1");
        assert_eq!(parsed["count"], 3);
    }

    #[test]
    fn test_csv_rows_header_union() {
        let out = QueryOutput::Rows(vec![
            row(&[("ip", Value::Str("a".into())), ("count", Value::Int(1))]),
            row(&[("ip", Value::Str("b".into())), ("max_b", Value::Int(9))]),
        ]);
        let text = render(OutputFormat::Csv, &out);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("count,ip,max_b"));
        assert_eq!(lines.next(), Some("1,a,"));
        assert_eq!(lines.next(), Some(",b,9"));
    }

    #[test]
    fn test_table_rows_aligned() {
        let out = QueryOutput::Rows(vec![
            row(&[("ip", Value::Str("1.1.1.1".into())), ("count", Value::Int(3))]),
            row(&[("ip", Value::Str("2.2.2.2".into())), ("count", Value::Int(12))]),
        ]);
        let text = render(OutputFormat::Table, &out);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("count"));
        assert!(lines[2].contains("1.1.1.1"));
        assert!(lines[3].contains("12"));
    }

    #[test]
    fn test_chart_scales_bars() {
        let out = QueryOutput::Rows(vec![
            row(&[("ip", Value::Str("a".into())), ("count", Value::Int(4))]),
            row(&[("ip", Value::Str("b".into())), ("count", Value::Int(2))]),
        ]);
        let text = render(OutputFormat::Chart, &out);
        let lines: Vec<&str> = text.lines().collect();
        let bars: Vec<usize> = lines
            .iter()
            .map(|l| l.matches('█').count())
            .collect();
        assert_eq!(bars, vec![40, 20]);
    }

    #[test]
    fn test_csv_events_has_timestamp_and_source() {
        let out = QueryOutput::Events(vec![event(&[
            ("status", Value::Int(200)),
            ("ip", Value::Str("1.1.1.1".into())),
        ])]);
        let text = render(OutputFormat::Csv, &out);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("timestamp,source,ip,status"));
        assert_eq!(lines.next(), Some("1764842400,test.log,1.1.1.1,200"));
    }

    #[test]
    fn test_pretty_events_include_raw() {
        let out = QueryOutput::Events(vec![
            event(&[("status", Value::Int(200))]).with_raw("the raw line")
        ]);
        let text = render(OutputFormat::Pretty, &out);
        assert!(text.contains("status: 200"));
        assert!(text.contains("raw: the raw line"));
        assert!(text.contains("test.log"));
    }

    #[test]
    fn test_yaml_rows() {
        let out = QueryOutput::Rows(vec![row(&[("count", Value::Int(5))])]);
        let text = render(OutputFormat::Yaml, &out);
        assert!(text.contains("count: 5"));
    }

    #[test]
    fn test_empty_output_renders_nothing() {
        for format in [
            OutputFormat::Table,
            OutputFormat::Json,
            OutputFormat::Yaml,
            OutputFormat::Pretty,
            OutputFormat::Chart,
        ] {
            let text = render(format, &QueryOutput::Rows(vec![]));
            assert!(
                text.trim().is_empty() || text.trim() == "[]",
                "format {:?} rendered {:?}",
                format,
                text
            );
        }
    }
}
