//! Adherence reporting and CSV export.
//!
//! One row per medicine across all of a user's prescriptions. Each row
//! carries a chart colour derived from the medicine name, so the same
//! medicine keeps its colour between runs.

use crate::adherence::adherence_ratio;
use crate::{Result, StoredPrescription};
use std::fs::OpenOptions;
use std::path::Path;
use uuid::Uuid;

/// Adherence of a single medicine
#[derive(Clone, Debug, PartialEq)]
pub struct AdherenceRow {
    pub prescription_id: Uuid,
    pub medicine_name: String,
    pub taken: u32,
    pub total: u32,
    /// Percentage, `None` when the medicine has no expected doses
    pub ratio: Option<f64>,
    pub color: String,
}

/// CSV row format
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    prescription_id: String,
    medicine: &'a str,
    taken: u32,
    total: u32,
    adherence_pct: Option<String>,
    color: &'a str,
}

impl<'a> From<&'a AdherenceRow> for CsvRow<'a> {
    fn from(row: &'a AdherenceRow) -> Self {
        CsvRow {
            prescription_id: row.prescription_id.to_string(),
            medicine: &row.medicine_name,
            taken: row.taken,
            total: row.total,
            adherence_pct: row.ratio.map(|r| format!("{:.1}", r)),
            color: &row.color,
        }
    }
}

/// Adherence across a set of prescriptions
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdherenceReport {
    pub rows: Vec<AdherenceRow>,
}

impl AdherenceReport {
    pub fn build(prescriptions: &[StoredPrescription]) -> Self {
        let rows = prescriptions
            .iter()
            .flat_map(|stored| {
                stored
                    .prescription
                    .medicines
                    .iter()
                    .enumerate()
                    .map(move |(index, med)| {
                        let name = if med.medicine_name.trim().is_empty() {
                            format!("Medicine {}", index + 1)
                        } else {
                            med.medicine_name.clone()
                        };
                        AdherenceRow {
                            prescription_id: stored.id,
                            color: chart_color(&name),
                            medicine_name: name,
                            taken: med.taken_count,
                            total: med.total,
                            ratio: adherence_ratio(med),
                        }
                    })
            })
            .collect();

        Self { rows }
    }

    /// Mean ratio over the medicines that have a defined ratio
    pub fn overall(&self) -> Option<f64> {
        let ratios: Vec<f64> = self.rows.iter().filter_map(|r| r.ratio).collect();
        if ratios.is_empty() {
            None
        } else {
            Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
        }
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            writer.serialize(CsvRow::from(row))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the report to `path`, replacing any existing file
    pub fn export_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        self.write_csv(&file)?;
        file.sync_all()?;
        tracing::info!("Exported {} adherence rows to {:?}", self.rows.len(), path);
        Ok(())
    }
}

/// Stable chart colour for a medicine: FNV-1a of the name mapped to a hue
pub fn chart_color(name: &str) -> String {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let hash = name
        .bytes()
        .fold(FNV_OFFSET, |h, b| (h ^ b as u32).wrapping_mul(FNV_PRIME));
    format!("hsl({}, 70%, 50%)", hash % 360)
}
