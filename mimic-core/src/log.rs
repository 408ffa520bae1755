//! Append-only execution log and its JSON/CSV emitters.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Record;

/// Snapshot of one completed round (sync) or step (async). Never mutated
/// after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    #[serde(rename = "round")]
    pub round_number: u64,
    pub inputs: Record,
    pub outputs: Record,
    pub state: Record,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_order: Option<Vec<String>>,
}

/// The on-disk JSON shape: `{"total_rounds": N, "rounds": [...]}`.
#[derive(Serialize)]
struct LogDocumentRef<'a> {
    total_rounds: usize,
    rounds: &'a [RoundRecord],
}

#[derive(Deserialize)]
struct LogDocument {
    #[allow(dead_code)]
    total_rounds: usize,
    rounds: Vec<RoundRecord>,
}

/// Ordered, append-only sequence of round records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionLog {
    rounds: Vec<RoundRecord>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_round(&mut self, record: RoundRecord) {
        self.rounds.push(record);
    }

    pub fn get_round(&self, round_number: u64) -> Option<&RoundRecord> {
        self.rounds.iter().find(|r| r.round_number == round_number)
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    // ─── JSON ─────────────────────────────────────────────────

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&LogDocumentRef {
            total_rounds: self.rounds.len(),
            rounds: &self.rounds,
        })?)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(
            &mut writer,
            &LogDocumentRef {
                total_rounds: self.rounds.len(),
                rounds: &self.rounds,
            },
        )?;
        writer.flush()?;
        Ok(())
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let doc: LogDocument = serde_json::from_str(text)?;
        Ok(Self { rounds: doc.rounds })
    }

    // ─── CSV ──────────────────────────────────────────────────

    /// Columns come from the first record's keys; records missing a key
    /// render an empty cell. An empty log writes nothing.
    pub fn to_csv_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let Some(first) = self.rounds.first() else {
            return Ok(());
        };

        let input_keys: Vec<&String> = first.inputs.keys().collect();
        let output_keys: Vec<&String> = first.outputs.keys().collect();
        let state_keys: Vec<&String> = first.state.keys().collect();

        let mut writer = csv::Writer::from_path(path)?;

        let mut header = vec!["round".to_string()];
        header.extend(input_keys.iter().map(|k| format!("input_{k}")));
        header.extend(output_keys.iter().map(|k| format!("output_{k}")));
        header.extend(state_keys.iter().map(|k| format!("state_{k}")));
        writer.write_record(&header)?;

        for record in &self.rounds {
            let mut row = vec![record.round_number.to_string()];
            row.extend(
                input_keys
                    .iter()
                    .map(|k| record.inputs.get(*k).map(|v| v.to_string()).unwrap_or_default()),
            );
            row.extend(
                output_keys
                    .iter()
                    .map(|k| record.outputs.get(*k).map(|v| v.to_string()).unwrap_or_default()),
            );
            row.extend(
                state_keys
                    .iter()
                    .map(|k| record.state.get(*k).map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn record(round_number: u64) -> RoundRecord {
        RoundRecord {
            round_number,
            inputs: [("inc".to_string(), Value::Int(round_number as i64))]
                .into_iter()
                .collect(),
            outputs: [("count".to_string(), Value::Int(10 * round_number as i64))]
                .into_iter()
                .collect(),
            state: [("count".to_string(), Value::Int(10 * round_number as i64))]
                .into_iter()
                .collect(),
            task_order: None,
        }
    }

    #[test]
    fn json_round_trip_preserves_structure_and_order() {
        let mut log = ExecutionLog::new();
        log.add_round(record(1));
        log.add_round(record(2));
        let mut with_order = record(3);
        with_order.task_order = Some(vec!["a".into(), "b".into()]);
        log.add_round(with_order);

        let json = log.to_json_string().unwrap();
        let back = ExecutionLog::from_json_str(&json).unwrap();
        assert_eq!(log, back);
    }

    #[test]
    fn json_uses_round_key_and_total_rounds() {
        let mut log = ExecutionLog::new();
        log.add_round(record(1));
        let json = log.to_json_string().unwrap();
        let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(doc["total_rounds"], 1);
        assert_eq!(doc["rounds"][0]["round"], 1);
        assert!(doc["rounds"][0].get("task_order").is_none());
    }

    #[test]
    fn get_round_finds_by_number() {
        let mut log = ExecutionLog::new();
        log.add_round(record(1));
        log.add_round(record(2));
        assert_eq!(log.get_round(2).unwrap().round_number, 2);
        assert!(log.get_round(9).is_none());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn csv_has_sorted_prefixed_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut log = ExecutionLog::new();
        log.add_round(record(1));
        log.add_round(record(2));
        log.to_csv_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "round,input_inc,output_count,state_count");
        assert_eq!(lines.next().unwrap(), "1,1,10,10");
        assert_eq!(lines.next().unwrap(), "2,2,20,20");
    }

    #[test]
    fn empty_log_writes_no_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        ExecutionLog::new().to_csv_file(&path).unwrap();
        assert!(!path.exists());
    }
}
