#![forbid(unsafe_code)]

//! Core domain model and business logic for the pillbox.
//!
//! This crate provides:
//! - Domain types (prescriptions, medicines, time slots, dose schedules)
//! - Schedule resolution (which medicines are due when)
//! - Adherence tracking (taken/untaken toggling, ratios)
//! - Prescription entry validation
//! - Persistence (locked JSON document store)
//! - Adherence reports and CSV export

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod schedule;
pub mod adherence;
pub mod entry;
pub mod store;
pub mod report;
pub mod service;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use schedule::{due_list, is_due, slot_for_time, RangeCheck};
pub use adherence::{adherence_ratio, date_key, toggle_taken};
pub use entry::{MedicineEntry, PrescriptionDraft};
pub use store::{JsonFileStore, MemoryStore, RecordStore};
pub use report::AdherenceReport;
pub use service::{DueDose, MedicineRef, Pillbox};
