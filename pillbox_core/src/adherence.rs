//! Adherence tracking: per-dose taken flags and running counts.
//!
//! A dose is identified by (medicine, date key, slot). Its state lives in
//! `Medicine::medicine_schedule`, and `Medicine::taken_count` mirrors the
//! number of taken entries. Every mutation here updates both together.

use crate::{DoseState, Error, Medicine, Prescription, Result, TimeSlot};
use chrono::{Local, NaiveDate};

/// Canonical `YYYY-MM-DD` key for a calendar day
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Date key for today's local calendar date
pub fn today_key() -> String {
    date_key(Local::now().date_naive())
}

/// Expected doses over the whole course
pub fn total_doses(frequency: u32, duration: u32) -> u32 {
    duration.saturating_mul(frequency)
}

/// Whether the dose was marked taken. Absent entries are not taken.
pub fn is_taken(medicine: &Medicine, date_key: &str, slot: TimeSlot) -> bool {
    medicine
        .medicine_schedule
        .get(date_key)
        .and_then(|day| day.get(&slot))
        .map_or(false, |state| state.is_taken)
}

/// Flip the taken flag of one dose and adjust the running count.
///
/// Returns a new value; only the `[date_key][slot]` entry and `taken_count`
/// differ from the input. Applying it twice restores the original flag and
/// count.
pub fn toggle_taken(medicine: &Medicine, date_key: &str, slot: TimeSlot) -> Medicine {
    let was_taken = is_taken(medicine, date_key, slot);
    let mut updated = medicine.clone();

    updated
        .medicine_schedule
        .entry(date_key.to_string())
        .or_default()
        .insert(
            slot,
            DoseState {
                is_taken: !was_taken,
            },
        );

    updated.taken_count = if was_taken {
        updated.taken_count.saturating_sub(1)
    } else {
        updated.taken_count.saturating_add(1)
    };

    tracing::debug!(
        "Toggled {} at {} {}: taken={} count={}",
        medicine.medicine_name,
        date_key,
        slot,
        !was_taken,
        updated.taken_count
    );

    updated
}

/// Taken doses as a percentage of total doses.
///
/// Returns `None` when the medicine has no expected doses.
pub fn adherence_ratio(medicine: &Medicine) -> Option<f64> {
    if medicine.total == 0 {
        return None;
    }
    Some(medicine.taken_count as f64 / medicine.total as f64 * 100.0)
}

/// Number of taken entries in the schedule
pub fn recount(medicine: &Medicine) -> u32 {
    medicine
        .medicine_schedule
        .values()
        .flat_map(|day| day.values())
        .filter(|state| state.is_taken)
        .count() as u32
}

/// Copy of the medicine with `taken_count` recomputed from the schedule.
/// Returns `None` if the stored count was already consistent.
pub fn reconcile(medicine: &Medicine) -> Option<Medicine> {
    let actual = recount(medicine);
    if actual == medicine.taken_count {
        return None;
    }
    tracing::warn!(
        "{}: stored takenCount {} disagrees with schedule ({})",
        medicine.medicine_name,
        medicine.taken_count,
        actual
    );
    let mut fixed = medicine.clone();
    fixed.taken_count = actual;
    Some(fixed)
}

/// Write an updated medicine back into its prescription.
///
/// The entry at `index` must carry the same name, so a list that changed
/// underneath the caller is rejected rather than overwritten.
pub fn merge_medicine(
    prescription: &mut Prescription,
    index: usize,
    updated: Medicine,
) -> Result<()> {
    let slot = prescription.medicines.get_mut(index).ok_or_else(|| {
        Error::Store(format!(
            "medicine #{} no longer exists in prescription",
            index
        ))
    })?;

    if slot.medicine_name != updated.medicine_name {
        return Err(Error::Store(format!(
            "medicine #{} is '{}', expected '{}'",
            index, slot.medicine_name, updated.medicine_name
        )));
    }

    *slot = updated;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn test_medicine() -> Medicine {
        Medicine {
            medicine_name: "Amoxicillin".into(),
            dosage: "250mg".into(),
            frequency: 2,
            time_of_day: vec![TimeSlot::Morning, TimeSlot::Evening],
            duration: 5,
            days: vec![Weekday::Mon, Weekday::Tue],
            instructions: "after food".into(),
            taken_count: 0,
            total: total_doses(2, 5),
            medicine_schedule: Default::default(),
        }
    }

    #[test]
    fn test_date_key_is_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(date_key(date), "2025-03-07");
        assert_eq!(today_key().len(), 10);
    }

    #[test]
    fn test_toggle_is_self_inverse() {
        let med = test_medicine();
        let once = toggle_taken(&med, "2025-03-03", TimeSlot::Morning);
        assert!(is_taken(&once, "2025-03-03", TimeSlot::Morning));
        assert_eq!(once.taken_count, 1);

        let twice = toggle_taken(&once, "2025-03-03", TimeSlot::Morning);
        assert!(!is_taken(&twice, "2025-03-03", TimeSlot::Morning));
        assert_eq!(twice.taken_count, med.taken_count);
    }

    #[test]
    fn test_toggle_leaves_other_entries_alone() {
        let med = toggle_taken(&test_medicine(), "2025-03-03", TimeSlot::Evening);
        let updated = toggle_taken(&med, "2025-03-04", TimeSlot::Morning);

        assert!(is_taken(&updated, "2025-03-03", TimeSlot::Evening));
        assert!(is_taken(&updated, "2025-03-04", TimeSlot::Morning));
        assert!(!is_taken(&updated, "2025-03-03", TimeSlot::Morning));
        assert_eq!(updated.medicine_name, med.medicine_name);
        assert_eq!(updated.total, med.total);
    }

    #[test]
    fn test_count_tracks_distinct_toggles() {
        let mut med = test_medicine();
        let doses = [
            ("2025-03-03", TimeSlot::Morning),
            ("2025-03-03", TimeSlot::Evening),
            ("2025-03-04", TimeSlot::Morning),
        ];
        for (key, slot) in doses {
            med = toggle_taken(&med, key, slot);
        }
        // Untake one of them
        med = toggle_taken(&med, "2025-03-03", TimeSlot::Evening);

        assert_eq!(med.taken_count, 2);
        assert_eq!(recount(&med), 2);
    }

    #[test]
    fn test_count_floors_at_zero() {
        let mut med = toggle_taken(&test_medicine(), "2025-03-03", TimeSlot::Morning);
        // Simulate drift from an older writer
        med.taken_count = 0;
        let untaken = toggle_taken(&med, "2025-03-03", TimeSlot::Morning);
        assert_eq!(untaken.taken_count, 0);
    }

    #[test]
    fn test_adherence_ratio() {
        let mut med = test_medicine();
        med.total = 10;
        med.taken_count = 4;
        assert_eq!(adherence_ratio(&med), Some(40.0));

        med.total = 0;
        assert_eq!(adherence_ratio(&med), None);
    }

    #[test]
    fn test_scenario_take_and_untake() {
        let med = test_medicine();
        assert_eq!(med.total, 10);

        let taken = toggle_taken(&med, "2025-03-03", TimeSlot::Morning);
        assert_eq!(taken.taken_count, 1);
        assert_eq!(adherence_ratio(&taken), Some(10.0));

        let untaken = toggle_taken(&taken, "2025-03-03", TimeSlot::Morning);
        assert_eq!(untaken.taken_count, 0);
        assert_eq!(adherence_ratio(&untaken), Some(0.0));
    }

    #[test]
    fn test_reconcile_repairs_drift() {
        let mut med = toggle_taken(&test_medicine(), "2025-03-03", TimeSlot::Morning);
        assert!(reconcile(&med).is_none());

        med.taken_count = 5;
        let fixed = reconcile(&med).unwrap();
        assert_eq!(fixed.taken_count, 1);
    }

    #[test]
    fn test_merge_medicine_checks_name() {
        let med = test_medicine();
        let mut prescription = Prescription {
            owner_id: "user_1".into(),
            owner_name: None,
            doctor_name: "Dr. Rao".into(),
            doctor_contact: String::new(),
            start_date: None,
            end_date: None,
            created_at: None,
            medicines: vec![med.clone()],
        };

        let updated = toggle_taken(&med, "2025-03-03", TimeSlot::Morning);
        merge_medicine(&mut prescription, 0, updated.clone()).unwrap();
        assert_eq!(prescription.medicines[0], updated);

        let mut other = updated.clone();
        other.medicine_name = "Something else".into();
        assert!(merge_medicine(&mut prescription, 0, other).is_err());
        assert!(merge_medicine(&mut prescription, 3, updated).is_err());
    }
}
