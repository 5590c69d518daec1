//! Core domain types for the pillbox.
//!
//! This module defines the stored document shapes and the small value types
//! used throughout the system:
//! - Time slots and weekday abbreviations
//! - Medicines with their per-day dose schedule
//! - Prescriptions and the identity that owns them
//!
//! Field names follow the camelCase document format so existing stored
//! records round-trip without migration.

use crate::Error;
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Time Slots
// ============================================================================

/// One of the four fixed daily bands doses are bucketed into
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeSlot {
    /// All slots in day order
    pub const ALL: [TimeSlot; 4] = [
        TimeSlot::Morning,
        TimeSlot::Afternoon,
        TimeSlot::Evening,
        TimeSlot::Night,
    ];

    /// Position of the slot within the day (0 = morning)
    pub fn index(self) -> usize {
        match self {
            TimeSlot::Morning => 0,
            TimeSlot::Afternoon => 1,
            TimeSlot::Evening => 2,
            TimeSlot::Night => 3,
        }
    }

    /// Label written to stored documents
    pub fn label(self) -> &'static str {
        match self {
            TimeSlot::Morning => "🌅 Morning",
            TimeSlot::Afternoon => "☀️ Afternoon",
            TimeSlot::Evening => "🌆 Evening",
            TimeSlot::Night => "🌙 Night",
        }
    }

    /// Short lowercase name used on the command line
    pub fn name(self) -> &'static str {
        match self {
            TimeSlot::Morning => "morning",
            TimeSlot::Afternoon => "afternoon",
            TimeSlot::Evening => "evening",
            TimeSlot::Night => "night",
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeSlot::Morning => "Morning",
            TimeSlot::Afternoon => "Afternoon",
            TimeSlot::Evening => "Evening",
            TimeSlot::Night => "Night",
        };
        f.write_str(name)
    }
}

impl FromStr for TimeSlot {
    type Err = Error;

    /// Accepts stored labels ("🌅 Morning") as well as plain names, any case.
    /// "noon" is the entry form's name for the afternoon slot.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s
            .trim()
            .trim_start_matches(|c: char| !c.is_ascii_alphabetic())
            .to_ascii_lowercase();

        match bare.as_str() {
            "morning" => Ok(TimeSlot::Morning),
            "noon" | "afternoon" => Ok(TimeSlot::Afternoon),
            "evening" => Ok(TimeSlot::Evening),
            "night" => Ok(TimeSlot::Night),
            _ => Err(Error::Validation(format!("unknown time slot '{}'", s))),
        }
    }
}

impl From<TimeSlot> for String {
    fn from(slot: TimeSlot) -> Self {
        slot.label().to_string()
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Parse a weekday from its abbreviation or full name
pub fn parse_weekday(s: &str) -> crate::Result<Weekday> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| Error::Validation(format!("unknown day '{}'", s)))
}

// ============================================================================
// Medicine and Schedule
// ============================================================================

/// Taken state of a single dose
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseState {
    #[serde(rename = "isTaken", default)]
    pub is_taken: bool,
}

/// Slot → dose state for one calendar day
pub type DaySchedule = BTreeMap<TimeSlot, DoseState>;

/// Date key (`YYYY-MM-DD`) → day schedule
pub type Schedule = BTreeMap<String, DaySchedule>;

/// A medicine embedded in a prescription
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub medicine_name: String,
    #[serde(default)]
    pub dosage: String,
    /// Doses per day
    #[serde(default, deserialize_with = "lenient_count")]
    pub frequency: u32,
    #[serde(default, deserialize_with = "lenient_slots")]
    pub time_of_day: Vec<TimeSlot>,
    /// Course length in days
    #[serde(default, deserialize_with = "lenient_count")]
    pub duration: u32,
    #[serde(default, deserialize_with = "lenient_days")]
    pub days: Vec<Weekday>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub taken_count: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total: u32,
    #[serde(default, deserialize_with = "lenient_schedule")]
    pub medicine_schedule: Schedule,
}

impl Medicine {
    pub fn takes_in(&self, slot: TimeSlot) -> bool {
        self.time_of_day.contains(&slot)
    }

    pub fn active_on(&self, day: Weekday) -> bool {
        self.days.contains(&day)
    }
}

/// Stored counts were written as numbers or as free text like "2 times/day".
/// Anything without a leading number reads as zero.
fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawCount {
        Number(f64),
        Text(String),
    }

    let count = match Option::<RawCount>::deserialize(deserializer)? {
        Some(RawCount::Number(n)) if n.is_finite() && n > 0.0 => {
            n.round().min(u32::MAX as f64) as u32
        }
        Some(RawCount::Text(text)) => {
            let digits: String = text
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    };
    Ok(count)
}

/// A single value or a list of values, as older documents stored either
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<serde_json::Value>),
    Other(serde_json::Value),
}

fn lenient_list<'de, D, T>(
    deserializer: D,
    what: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: PartialEq,
{
    let raw: Vec<String> = match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(text)) => vec![text],
        Some(OneOrMany::Many(values)) => values
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(text) => Some(text),
                other => {
                    tracing::warn!("Ignoring non-text {} {}", what, other);
                    None
                }
            })
            .collect(),
        Some(OneOrMany::Other(other)) => {
            tracing::warn!("Ignoring {} value {}", what, other);
            Vec::new()
        }
        None => Vec::new(),
    };

    let mut out = Vec::with_capacity(raw.len());
    for text in raw.iter().filter(|t| !t.trim().is_empty()) {
        match parse(text) {
            Some(item) if !out.contains(&item) => out.push(item),
            Some(_) => {}
            None => tracing::warn!("Ignoring unknown {} {:?}", what, text),
        }
    }
    Ok(out)
}

/// `timeOfDay` was written as one slot name by the first entry form and as a
/// list of labels later
fn lenient_slots<'de, D>(deserializer: D) -> Result<Vec<TimeSlot>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_list(deserializer, "time slot", |s| s.parse().ok())
}

fn lenient_days<'de, D>(deserializer: D) -> Result<Vec<Weekday>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_list(deserializer, "day", |s| parse_weekday(s).ok())
}

/// One stored day. Differently spelled keys for the same slot ("morning"
/// and "🌅 Morning") are merged, and a dose counts as taken if any of them
/// says so.
struct MergedDay(DaySchedule);

impl<'de> Deserialize<'de> for MergedDay {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DayVisitor;

        impl<'de> Visitor<'de> for DayVisitor {
            type Value = MergedDay;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of time slots to dose states")
            }

            fn visit_map<A>(self, mut map: A) -> Result<MergedDay, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut day = DaySchedule::new();
                while let Some((key, state)) = map.next_entry::<String, DoseState>()? {
                    let slot = match key.parse::<TimeSlot>() {
                        Ok(slot) => slot,
                        Err(_) => {
                            tracing::warn!("Ignoring dose for unknown time slot {:?}", key);
                            continue;
                        }
                    };
                    match day.entry(slot) {
                        Entry::Vacant(entry) => {
                            entry.insert(state);
                        }
                        Entry::Occupied(mut entry) => {
                            tracing::warn!("Merging duplicate {} entries for one day", slot.name());
                            entry.get_mut().is_taken |= state.is_taken;
                        }
                    }
                }
                Ok(MergedDay(day))
            }
        }

        deserializer.deserialize_map(DayVisitor)
    }
}

fn lenient_schedule<'de, D>(deserializer: D) -> Result<Schedule, D::Error>
where
    D: Deserializer<'de>,
{
    let days = Option::<BTreeMap<String, MergedDay>>::deserialize(deserializer)?;
    Ok(days
        .unwrap_or_default()
        .into_iter()
        .map(|(key, MergedDay(day))| (key, day))
        .collect())
}

// ============================================================================
// Prescriptions
// ============================================================================

/// A prescription document as stored in the record store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    #[serde(alias = "userId")]
    pub owner_id: String,
    #[serde(default, alias = "userName")]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub doctor_name: String,
    #[serde(default)]
    pub doctor_contact: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub medicines: Vec<Medicine>,
}

/// A prescription together with its document id
#[derive(Clone, Debug, PartialEq)]
pub struct StoredPrescription {
    pub id: Uuid,
    pub prescription: Prescription,
}

// ============================================================================
// Identity
// ============================================================================

/// The signed-in caller, supplied by the identity provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    owner_id: String,
    display_name: Option<String>,
}

impl Identity {
    pub fn new(owner_id: impl Into<String>, display_name: Option<String>) -> crate::Result<Self> {
        let owner_id = owner_id.into().trim().to_string();
        if owner_id.is_empty() {
            return Err(Error::Identity("please sign in".into()));
        }
        let display_name = display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(Self {
            owner_id,
            display_name,
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn owns(&self, prescription: &Prescription) -> bool {
        prescription.owner_id == self.owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_parses_labels_and_names() {
        assert_eq!("🌅 Morning".parse::<TimeSlot>().unwrap(), TimeSlot::Morning);
        assert_eq!("☀️ Afternoon".parse::<TimeSlot>().unwrap(), TimeSlot::Afternoon);
        assert_eq!("noon".parse::<TimeSlot>().unwrap(), TimeSlot::Afternoon);
        assert_eq!("NIGHT".parse::<TimeSlot>().unwrap(), TimeSlot::Night);
        assert!("brunch".parse::<TimeSlot>().is_err());
    }

    #[test]
    fn test_legacy_document_fields_default() {
        // Shape written by the first add-prescription form
        let json = r#"{
            "userId": "user_1",
            "userName": "Asha",
            "medicines": [
                { "medicineName": "Paracetamol", "dosage": "500mg",
                  "frequency": "2 times/day", "timeOfDay": "morning" },
                { "medicineName": "Cetirizine", "dosage": "10mg",
                  "frequency": "1", "timeOfDay": "noon" }
            ]
        }"#;

        let p: Prescription = serde_json::from_str(json).unwrap();
        assert_eq!(p.owner_id, "user_1");
        assert_eq!(p.owner_name.as_deref(), Some("Asha"));
        assert_eq!(p.start_date, None);

        let med = &p.medicines[0];
        assert_eq!(med.frequency, 2);
        assert_eq!(med.time_of_day, vec![TimeSlot::Morning]);
        assert_eq!(med.taken_count, 0);
        assert!(med.medicine_schedule.is_empty());
        assert!(med.days.is_empty());
        assert_eq!(p.medicines[1].time_of_day, vec![TimeSlot::Afternoon]);
    }

    #[test]
    fn test_unknown_slots_and_days_are_dropped() {
        let json = r#"{
            "medicineName": "Iron",
            "timeOfDay": ["🌅 Morning", "brunch", 3, "morning", "🌙 Night"],
            "days": ["Mon", "Funday", "Tuesday"]
        }"#;

        let med: Medicine = serde_json::from_str(json).unwrap();
        assert_eq!(med.time_of_day, vec![TimeSlot::Morning, TimeSlot::Night]);
        assert_eq!(med.days, vec![Weekday::Mon, Weekday::Tue]);

        let med: Medicine =
            serde_json::from_str(r#"{ "medicineName": "Iron", "timeOfDay": null, "days": 5 }"#)
                .unwrap();
        assert!(med.time_of_day.is_empty());
        assert!(med.days.is_empty());
    }

    #[test]
    fn test_duplicate_slot_keys_merge_taken() {
        // Same slot under a plain name and a label; taken wins either way round
        let json = r#"{
            "medicineName": "Iron",
            "medicineSchedule": {
                "2025-03-03": {
                    "morning": { "isTaken": true },
                    "🌅 Morning": { "isTaken": false },
                    "teatime": { "isTaken": true }
                },
                "2025-03-04": {
                    "🌙 Night": { "isTaken": false },
                    "night": { "isTaken": true }
                }
            }
        }"#;

        let med: Medicine = serde_json::from_str(json).unwrap();
        let monday = &med.medicine_schedule["2025-03-03"];
        assert_eq!(monday.len(), 1);
        assert!(monday[&TimeSlot::Morning].is_taken);
        assert!(med.medicine_schedule["2025-03-04"][&TimeSlot::Night].is_taken);
    }

    #[test]
    fn test_medicine_wire_format() {
        let mut schedule = Schedule::new();
        schedule
            .entry("2025-03-03".into())
            .or_default()
            .insert(TimeSlot::Morning, DoseState { is_taken: true });

        let med = Medicine {
            medicine_name: "Ibuprofen".into(),
            dosage: "200mg".into(),
            frequency: 1,
            time_of_day: vec![TimeSlot::Morning],
            duration: 3,
            days: vec![Weekday::Mon, Weekday::Wed],
            instructions: String::new(),
            taken_count: 1,
            total: 3,
            medicine_schedule: schedule,
        };

        let value = serde_json::to_value(&med).unwrap();
        assert_eq!(value["medicineName"], "Ibuprofen");
        assert_eq!(value["timeOfDay"][0], "🌅 Morning");
        assert_eq!(value["days"][1], "Wed");
        assert_eq!(value["takenCount"], 1);
        assert_eq!(
            value["medicineSchedule"]["2025-03-03"]["🌅 Morning"]["isTaken"],
            true
        );

        let back: Medicine = serde_json::from_value(value).unwrap();
        assert_eq!(back, med);
    }

    #[test]
    fn test_identity_requires_owner() {
        assert!(matches!(Identity::new("  ", None), Err(Error::Identity(_))));
        let id = Identity::new("user_1", Some("".into())).unwrap();
        assert_eq!(id.owner_id(), "user_1");
        assert_eq!(id.display_name(), None);
    }
}
