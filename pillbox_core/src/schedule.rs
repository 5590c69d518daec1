//! Schedule resolution: which medicines are due on a given day and slot.
//!
//! The day is split into four fixed bands:
//! - Morning: 05:00–11:59
//! - Afternoon: 12:00–15:59
//! - Evening: 16:00–19:59
//! - Night: everything else

use crate::{Medicine, Prescription, TimeSlot};
use chrono::{Datelike, NaiveDate, Timelike, Weekday};

/// Map a clock hour to its slot. Hours past 23 wrap around.
pub fn slot_for_time(hour: u32) -> TimeSlot {
    match hour % 24 {
        5..=11 => TimeSlot::Morning,
        12..=15 => TimeSlot::Afternoon,
        16..=19 => TimeSlot::Evening,
        _ => TimeSlot::Night,
    }
}

/// Slot containing the given time of day
pub fn current_slot<T: Timelike>(time: &T) -> TimeSlot {
    slot_for_time(time.hour())
}

/// Whether a prescription's start/end window is consulted when filtering
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeCheck {
    /// Match on weekday and slot only
    Ignore,
    /// Also require `start <= date <= end`; a missing bound is open
    Within {
        date: NaiveDate,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

impl RangeCheck {
    /// Range check for `date` against a prescription's stored window
    pub fn for_prescription(prescription: &Prescription, date: NaiveDate) -> Self {
        RangeCheck::Within {
            date,
            start: prescription.start_date,
            end: prescription.end_date,
        }
    }

    pub fn admits(&self) -> bool {
        match *self {
            RangeCheck::Ignore => true,
            RangeCheck::Within { date, start, end } => {
                start.map_or(true, |s| s <= date) && end.map_or(true, |e| date <= e)
            }
        }
    }
}

/// True iff the medicine is taken in `slot`, is active on `day`, and the
/// range check passes
pub fn is_due(medicine: &Medicine, day: Weekday, slot: TimeSlot, range: RangeCheck) -> bool {
    medicine.takes_in(slot) && medicine.active_on(day) && range.admits()
}

/// Medicines due in one day/slot cell, in input order.
///
/// Iteration is lazy and can be restarted any number of times.
#[derive(Clone, Copy, Debug)]
pub struct DueList<'a> {
    medicines: &'a [Medicine],
    day: Weekday,
    slot: TimeSlot,
    range: RangeCheck,
}

impl<'a> DueList<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a Medicine> + Clone + 'a {
        self.indexed().map(|(_, m)| m)
    }

    /// Due medicines paired with their position in the input list
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &'a Medicine)> + Clone + 'a {
        let DueList {
            medicines,
            day,
            slot,
            range,
        } = *self;
        medicines
            .iter()
            .enumerate()
            .filter(move |(_, m)| is_due(m, day, slot, range))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<'a> IntoIterator for &DueList<'a> {
    type Item = &'a Medicine;
    type IntoIter = Box<dyn Iterator<Item = &'a Medicine> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

pub fn due_list(
    medicines: &[Medicine],
    day: Weekday,
    slot: TimeSlot,
    range: RangeCheck,
) -> DueList<'_> {
    DueList {
        medicines,
        day,
        slot,
        range,
    }
}

/// Weekly pillbox: for each weekday (Mon first) and slot, the indices of
/// due medicines
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WeekGrid {
    cells: [[Vec<usize>; 4]; 7],
}

impl WeekGrid {
    pub fn cell(&self, day: Weekday, slot: TimeSlot) -> &[usize] {
        &self.cells[day.num_days_from_monday() as usize][slot.index()]
    }

    pub fn total_doses(&self) -> usize {
        self.cells.iter().flatten().map(Vec::len).sum()
    }
}

/// Build the weekly grid. A date-range check is evaluated against each
/// day of the week starting at `week_start`.
pub fn week_grid(
    medicines: &[Medicine],
    week_start: NaiveDate,
    enforce: Option<&Prescription>,
) -> WeekGrid {
    let mut grid = WeekGrid::default();

    for offset in 0..7 {
        let date = week_start + chrono::Duration::days(offset);
        let day = date.weekday();
        let range = match enforce {
            Some(p) => RangeCheck::for_prescription(p, date),
            None => RangeCheck::Ignore,
        };
        let row = &mut grid.cells[day.num_days_from_monday() as usize];
        for slot in TimeSlot::ALL {
            row[slot.index()] = due_list(medicines, day, slot, range)
                .indexed()
                .map(|(i, _)| i)
                .collect();
        }
    }

    grid
}
