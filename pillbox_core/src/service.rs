//! Identity-scoped pillbox operations over a record store.
//!
//! Every call takes the caller's [`Identity`] explicitly. Documents owned
//! by someone else behave as if they did not exist.

use crate::adherence::{self, date_key, merge_medicine, toggle_taken};
use crate::config::ScheduleConfig;
use crate::entry::PrescriptionDraft;
use crate::report::AdherenceReport;
use crate::schedule::{current_slot, due_list, is_due, week_grid, RangeCheck, WeekGrid};
use crate::store::RecordStore;
use crate::{Error, Identity, Medicine, Prescription, Result, StoredPrescription, TimeSlot};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// A medicine due in a given day/slot, with its taken state for that day
#[derive(Clone, Debug, PartialEq)]
pub struct DueDose {
    pub prescription_id: Uuid,
    pub medicine_index: usize,
    pub medicine: Medicine,
    pub taken: bool,
}

/// How a medicine within a prescription is addressed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MedicineRef {
    /// Zero-based position in the medicine list
    Index(usize),
    /// Case-insensitive name match
    Name(String),
}

impl MedicineRef {
    fn resolve(&self, prescription: &Prescription) -> Result<usize> {
        let found = match self {
            MedicineRef::Index(i) => (*i < prescription.medicines.len()).then_some(*i),
            MedicineRef::Name(name) => prescription
                .medicines
                .iter()
                .position(|m| m.medicine_name.eq_ignore_ascii_case(name.trim())),
        };
        found.ok_or_else(|| Error::NotFound(format!("medicine {}", self)))
    }
}

impl fmt::Display for MedicineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MedicineRef::Index(i) => write!(f, "#{}", i + 1),
            MedicineRef::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Weekly grid for one prescription
#[derive(Clone, Debug)]
pub struct WeekView {
    pub prescription: StoredPrescription,
    pub grid: WeekGrid,
}

pub struct Pillbox<S: RecordStore> {
    store: S,
    rules: ScheduleConfig,
}

impl<S: RecordStore> Pillbox<S> {
    pub fn new(store: S, rules: ScheduleConfig) -> Self {
        Self { store, rules }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn range_for(&self, prescription: &Prescription, date: NaiveDate) -> RangeCheck {
        if self.rules.enforce_date_range {
            RangeCheck::for_prescription(prescription, date)
        } else {
            RangeCheck::Ignore
        }
    }

    /// Submit a draft as a new prescription owned by `identity`
    pub fn record(
        &mut self,
        identity: &Identity,
        draft: PrescriptionDraft,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let prescription = draft.submit(identity, now)?;
        let count = prescription.medicines.len();
        let id = self.store.insert(prescription)?;
        tracing::info!(
            "Recorded prescription {} with {} medicines for {}",
            id,
            count,
            identity.owner_id()
        );
        Ok(id)
    }

    /// The caller's prescriptions, oldest first
    pub fn prescriptions(&self, identity: &Identity) -> Result<Vec<StoredPrescription>> {
        self.store.query_by_owner(identity.owner_id())
    }

    /// Delete one of the caller's prescriptions. Only the owner field of
    /// the stored document has to be readable.
    pub fn delete(&mut self, identity: &Identity, id: Uuid) -> Result<()> {
        let owner = self.store.owner_of(id)?;
        if owner.as_deref() != Some(identity.owner_id()) {
            return Err(Error::NotFound(format!("prescription {}", id)));
        }
        if !self.store.delete(id)? {
            return Err(Error::NotFound(format!("prescription {}", id)));
        }
        Ok(())
    }

    /// Medicines due on `date` in `slot`, across all of the caller's
    /// prescriptions
    pub fn due(&self, identity: &Identity, date: NaiveDate, slot: TimeSlot) -> Result<Vec<DueDose>> {
        let key = date_key(date);
        let mut doses = Vec::new();

        for stored in self.prescriptions(identity)? {
            let range = self.range_for(&stored.prescription, date);
            let due = due_list(&stored.prescription.medicines, date.weekday(), slot, range);
            doses.extend(due.indexed().map(|(index, medicine)| DueDose {
                prescription_id: stored.id,
                medicine_index: index,
                taken: adherence::is_taken(medicine, &key, slot),
                medicine: medicine.clone(),
            }));
        }

        tracing::debug!("{} doses due on {} {}", doses.len(), key, slot);
        Ok(doses)
    }

    /// Pillbox grid for the week starting at `week_start`
    pub fn week(&self, identity: &Identity, week_start: NaiveDate) -> Result<Vec<WeekView>> {
        Ok(self
            .prescriptions(identity)?
            .into_iter()
            .map(|stored| {
                let enforce = self
                    .rules
                    .enforce_date_range
                    .then_some(&stored.prescription);
                let grid = week_grid(&stored.prescription.medicines, week_start, enforce);
                WeekView {
                    prescription: stored,
                    grid,
                }
            })
            .collect())
    }

    /// Flip the taken state of one dose and persist it.
    ///
    /// The document is re-read, checked, updated and written in a single
    /// store transaction; the returned medicine is what was written.
    pub fn toggle(
        &mut self,
        identity: &Identity,
        prescription_id: Uuid,
        medicine: &MedicineRef,
        date: NaiveDate,
        slot: TimeSlot,
        now: NaiveDateTime,
    ) -> Result<Medicine> {
        if self.rules.current_slot_only {
            let current = current_slot(&now);
            if date != now.date() || slot != current {
                return Err(Error::Validation(format!(
                    "only today's {} doses can be marked right now",
                    current.name()
                )));
            }
        }

        let key = date_key(date);
        let enforce_range = self.rules.enforce_date_range;
        let mut written = None;

        self.store.transact(prescription_id, &mut |p| {
            if !identity.owns(p) {
                return Err(Error::NotFound(format!("prescription {}", prescription_id)));
            }
            let index = medicine.resolve(p)?;
            let range = if enforce_range {
                RangeCheck::for_prescription(p, date)
            } else {
                RangeCheck::Ignore
            };
            let current = &p.medicines[index];
            if !is_due(current, date.weekday(), slot, range) {
                return Err(Error::Validation(format!(
                    "{} is not scheduled for {} {}",
                    current.medicine_name,
                    date.weekday(),
                    slot.name()
                )));
            }

            let updated = toggle_taken(current, &key, slot);
            merge_medicine(p, index, updated.clone())?;
            written = Some(updated);
            Ok(())
        })?;

        let updated = written
            .ok_or_else(|| Error::Store("transaction finished without an update".into()))?;
        tracing::info!(
            "{} {} for {} {}",
            updated.medicine_name,
            if adherence::is_taken(&updated, &key, slot) {
                "taken"
            } else {
                "untaken"
            },
            key,
            slot.name()
        );
        Ok(updated)
    }

    pub fn adherence(&self, identity: &Identity) -> Result<AdherenceReport> {
        Ok(AdherenceReport::build(&self.prescriptions(identity)?))
    }

    /// Recompute stored taken counts from the dose schedules. Returns the
    /// number of medicines that were corrected.
    pub fn reconcile(&mut self, identity: &Identity) -> Result<usize> {
        let mut fixed = 0;

        for stored in self.prescriptions(identity)? {
            let needs_fix = stored
                .prescription
                .medicines
                .iter()
                .any(|m| adherence::reconcile(m).is_some());
            if !needs_fix {
                continue;
            }

            self.store.transact(stored.id, &mut |p| {
                for med in p.medicines.iter_mut() {
                    if let Some(repaired) = adherence::reconcile(med) {
                        *med = repaired;
                        fixed += 1;
                    }
                }
                Ok(())
            })?;
        }

        if fixed > 0 {
            tracing::info!("Reconciled {} medicines for {}", fixed, identity.owner_id());
        }
        Ok(fixed)
    }
}
