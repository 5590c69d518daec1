//! Prescription entry: staging and validating medicines before submission.
//!
//! Medicines are staged on a [`PrescriptionDraft`] and only become a
//! [`Prescription`] once the whole draft validates. A failed validation
//! leaves nothing behind.

use crate::adherence::total_doses;
use crate::types::parse_weekday;
use crate::{Error, Identity, Medicine, Prescription, Result, Schedule, TimeSlot};
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use std::str::FromStr;

/// Raw medicine fields as entered by the user
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MedicineEntry {
    pub name: String,
    pub dosage: String,
    pub frequency: u32,
    pub duration: u32,
    pub slots: Vec<TimeSlot>,
    pub days: Vec<Weekday>,
    pub instructions: String,
}

impl MedicineEntry {
    /// Validate the entry and produce a medicine with an empty schedule
    pub fn finalize(self) -> Result<Medicine> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("medicine name is required".into()));
        }
        if self.dosage.trim().is_empty() {
            return Err(Error::Validation(format!("{}: dosage is required", name)));
        }
        if self.frequency == 0 {
            return Err(Error::Validation(format!(
                "{}: frequency must be at least once a day",
                name
            )));
        }
        if self.duration == 0 {
            return Err(Error::Validation(format!(
                "{}: duration must be at least one day",
                name
            )));
        }
        if self.slots.is_empty() {
            return Err(Error::Validation(format!(
                "{}: pick at least one time of day",
                name
            )));
        }
        if self.days.is_empty() {
            return Err(Error::Validation(format!("{}: pick at least one day", name)));
        }

        Ok(Medicine {
            medicine_name: name.to_string(),
            dosage: self.dosage.trim().to_string(),
            frequency: self.frequency,
            time_of_day: dedup(self.slots),
            duration: self.duration,
            days: dedup(self.days),
            instructions: self.instructions.trim().to_string(),
            taken_count: 0,
            total: total_doses(self.frequency, self.duration),
            medicine_schedule: Schedule::new(),
        })
    }
}

fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn parse_count(field: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Validation(format!("{} must be a whole number, got '{}'", field, value)))
}

impl FromStr for MedicineEntry {
    type Err = Error;

    /// Compact form used on the command line:
    /// `name:dosage:frequency:duration:slots:days[:instructions]`
    /// where slots and days are comma separated, e.g.
    /// `Paracetamol:500mg:2:5:morning,evening:Mon,Wed,Fri:after food`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.splitn(7, ':').collect();
        if parts.len() < 6 {
            return Err(Error::Validation(format!(
                "expected name:dosage:frequency:duration:slots:days[:instructions], got '{}'",
                s
            )));
        }

        let slots = parts[4]
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(TimeSlot::from_str)
            .collect::<Result<Vec<_>>>()?;
        let days = parts[5]
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(parse_weekday)
            .collect::<Result<Vec<_>>>()?;

        Ok(MedicineEntry {
            name: parts[0].to_string(),
            dosage: parts[1].to_string(),
            frequency: parse_count("frequency", parts[2])?,
            duration: parse_count("duration", parts[3])?,
            slots,
            days,
            instructions: parts.get(6).map(|s| s.to_string()).unwrap_or_default(),
        })
    }
}

/// A prescription being assembled
#[derive(Clone, Debug, Default)]
pub struct PrescriptionDraft {
    pub doctor_name: String,
    pub doctor_contact: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    medicines: Vec<Medicine>,
}

impl PrescriptionDraft {
    pub fn new(doctor_name: impl Into<String>, doctor_contact: impl Into<String>) -> Self {
        Self {
            doctor_name: doctor_name.into(),
            doctor_contact: doctor_contact.into(),
            ..Default::default()
        }
    }

    pub fn with_dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    /// Validate and stage a medicine. Invalid entries are not staged.
    pub fn add_medicine(&mut self, entry: MedicineEntry) -> Result<&Medicine> {
        let medicine = entry.finalize()?;
        if self
            .medicines
            .iter()
            .any(|m| m.medicine_name.eq_ignore_ascii_case(&medicine.medicine_name))
        {
            return Err(Error::Validation(format!(
                "{} is already on this prescription",
                medicine.medicine_name
            )));
        }
        self.medicines.push(medicine);
        Ok(&self.medicines[self.medicines.len() - 1])
    }

    pub fn remove_medicine(&mut self, index: usize) -> Option<Medicine> {
        if index < self.medicines.len() {
            Some(self.medicines.remove(index))
        } else {
            None
        }
    }

    pub fn medicines(&self) -> &[Medicine] {
        &self.medicines
    }

    /// Turn the draft into a prescription owned by `identity`
    pub fn submit(self, identity: &Identity, now: DateTime<Utc>) -> Result<Prescription> {
        if self.medicines.is_empty() {
            return Err(Error::Validation("add at least one medicine".into()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(Error::Validation(format!(
                    "end date {} is before start date {}",
                    end, start
                )));
            }
        }

        Ok(Prescription {
            owner_id: identity.owner_id().to_string(),
            owner_name: identity.display_name().map(str::to_string),
            doctor_name: self.doctor_name.trim().to_string(),
            doctor_contact: self.doctor_contact.trim().to_string(),
            start_date: self.start_date,
            end_date: self.end_date,
            created_at: Some(now),
            medicines: self.medicines,
        })
    }
}
