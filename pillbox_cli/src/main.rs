use chrono::{Datelike, Local, NaiveDate, Utc, Weekday};
use clap::{Parser, Subcommand};
use pillbox_core::schedule::current_slot;
use pillbox_core::service::WeekView;
use pillbox_core::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pillbox")]
#[command(about = "Medication prescription tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Signed-in user id (overrides the config file)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Display name stored with new prescriptions
    #[arg(long, global = true)]
    name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what to take now, or on a given date and slot (default)
    Due {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Time slot (morning, afternoon, evening, night), defaults to now
        #[arg(long)]
        slot: Option<TimeSlot>,
    },

    /// Show the weekly pillbox
    Week {
        /// First day of the week (YYYY-MM-DD), defaults to this Monday
        #[arg(long)]
        from: Option<NaiveDate>,
    },

    /// Record a new prescription
    Add {
        /// Prescribing doctor
        #[arg(long)]
        doctor: String,

        /// Doctor's contact details
        #[arg(long, default_value = "")]
        contact: String,

        /// First day of the course (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day of the course (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// name:dosage:frequency:duration:slots:days[:instructions], repeatable.
        /// Example: Paracetamol:500mg:2:5:morning,evening:Mon,Wed,Fri
        #[arg(long = "medicine", short = 'm', required = true)]
        medicines: Vec<MedicineEntry>,
    },

    /// List saved prescriptions
    List,

    /// Delete a saved prescription
    Delete {
        id: Uuid,

        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Mark a dose taken, or untaken if it already was
    Take {
        /// Prescription id
        prescription: Uuid,

        /// Medicine name or 1-based position in the prescription
        medicine: String,

        /// Date of the dose, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Slot of the dose, defaults to the current slot
        #[arg(long)]
        slot: Option<TimeSlot>,
    },

    /// Show adherence per medicine
    Adherence {
        /// Also write the report to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Repair taken counts that disagree with the dose history
    Reconcile,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Could not read configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    pillbox_core::logging::init_with_level(&config.log.level);

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_user_error() => {
            eprintln!("{}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Something went wrong, please try again.");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn run(cli: Cli, config: Config) -> Result<()> {
    let identity = match cli.user {
        Some(user) => Identity::new(user, cli.name.or(config.identity.display_name.clone()))?,
        None => {
            let mut identity_config = config.identity.clone();
            if cli.name.is_some() {
                identity_config.display_name = cli.name;
            }
            identity_config.identity()?
        }
    };

    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let store = JsonFileStore::new(data_dir.join("prescriptions.json"));
    let mut pillbox = Pillbox::new(store, config.schedule.clone());

    match cli.command.unwrap_or(Commands::Due {
        date: None,
        slot: None,
    }) {
        Commands::Due { date, slot } => cmd_due(&pillbox, &identity, date, slot),
        Commands::Week { from } => cmd_week(&pillbox, &identity, from),
        Commands::Add {
            doctor,
            contact,
            start,
            end,
            medicines,
        } => cmd_add(&mut pillbox, &identity, doctor, contact, start, end, medicines),
        Commands::List => cmd_list(&pillbox, &identity),
        Commands::Delete { id, yes } => cmd_delete(&mut pillbox, &identity, id, yes),
        Commands::Take {
            prescription,
            medicine,
            date,
            slot,
        } => cmd_take(&mut pillbox, &identity, prescription, &medicine, date, slot),
        Commands::Adherence { csv } => cmd_adherence(&pillbox, &identity, csv),
        Commands::Reconcile => cmd_reconcile(&mut pillbox, &identity),
    }
}

fn cmd_due(
    pillbox: &Pillbox<JsonFileStore>,
    identity: &Identity,
    date: Option<NaiveDate>,
    slot: Option<TimeSlot>,
) -> Result<()> {
    let now = Local::now().naive_local();
    let date = date.unwrap_or_else(|| now.date());
    let slot = slot.unwrap_or_else(|| current_slot(&now));

    let doses = pillbox.due(identity, date, slot)?;

    println!("{} {} · {}", date.weekday(), date, slot.label());
    if doses.is_empty() {
        println!("  Nothing to take.");
        return Ok(());
    }

    for dose in &doses {
        let mark = if dose.taken { "x" } else { " " };
        println!(
            "  [{}] {} ({})",
            mark, dose.medicine.medicine_name, dose.medicine.dosage
        );
        if !dose.medicine.instructions.is_empty() {
            println!("      {}", dose.medicine.instructions);
        }
        println!(
            "      pillbox take {} {}",
            dose.prescription_id,
            dose.medicine_index + 1
        );
    }

    Ok(())
}

fn cmd_week(
    pillbox: &Pillbox<JsonFileStore>,
    identity: &Identity,
    from: Option<NaiveDate>,
) -> Result<()> {
    let week_start = from.unwrap_or_else(|| {
        let today = Local::now().date_naive();
        today - chrono::Duration::days(today.weekday().num_days_from_monday() as i64)
    });

    let views = pillbox.week(identity, week_start)?;
    if views.is_empty() {
        println!("No prescriptions saved yet.");
        return Ok(());
    }

    println!("Week of {}", week_start);
    for offset in 0..7 {
        let date = week_start + chrono::Duration::days(offset);
        let day = date.weekday();
        println!();
        println!("{} {}", day, date);
        for slot in TimeSlot::ALL {
            let names = names_in_cell(&views, day, slot);
            if !names.is_empty() {
                println!("  {:<14} {}", slot.label(), names.join(", "));
            }
        }
    }

    Ok(())
}

fn names_in_cell(views: &[WeekView], day: Weekday, slot: TimeSlot) -> Vec<String> {
    views
        .iter()
        .flat_map(|view| {
            let medicines = &view.prescription.prescription.medicines;
            view.grid
                .cell(day, slot)
                .iter()
                .map(move |&i| medicines[i].medicine_name.clone())
        })
        .collect()
}

fn cmd_add(
    pillbox: &mut Pillbox<JsonFileStore>,
    identity: &Identity,
    doctor: String,
    contact: String,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    medicines: Vec<MedicineEntry>,
) -> Result<()> {
    let mut draft = PrescriptionDraft::new(doctor, contact).with_dates(start, end);
    for entry in medicines {
        draft.add_medicine(entry)?;
    }

    let id = pillbox.record(identity, draft, Utc::now())?;
    println!("✓ Prescription saved");
    println!("  ID: {}", id);
    Ok(())
}

fn cmd_list(pillbox: &Pillbox<JsonFileStore>, identity: &Identity) -> Result<()> {
    let prescriptions = pillbox.prescriptions(identity)?;
    if prescriptions.is_empty() {
        println!("No prescriptions saved yet.");
        return Ok(());
    }

    for stored in &prescriptions {
        let p = &stored.prescription;
        println!();
        println!("{}", stored.id);
        if !p.doctor_name.is_empty() {
            if p.doctor_contact.is_empty() {
                println!("  Doctor: {}", p.doctor_name);
            } else {
                println!("  Doctor: {} ({})", p.doctor_name, p.doctor_contact);
            }
        }
        match (p.start_date, p.end_date) {
            (Some(start), Some(end)) => println!("  Course: {} to {}", start, end),
            (Some(start), None) => println!("  Course: from {}", start),
            (None, Some(end)) => println!("  Course: until {}", end),
            (None, None) => {}
        }
        for (index, med) in p.medicines.iter().enumerate() {
            let days: Vec<String> = med.days.iter().map(|d| d.to_string()).collect();
            let slots: Vec<&str> = med.time_of_day.iter().map(|s| s.name()).collect();
            println!(
                "  {}. {} - {}x/day ({}) on {} at {}",
                index + 1,
                med.medicine_name,
                med.frequency,
                med.dosage,
                days.join(","),
                slots.join(",")
            );
        }
    }

    Ok(())
}

fn cmd_delete(
    pillbox: &mut Pillbox<JsonFileStore>,
    identity: &Identity,
    id: Uuid,
    yes: bool,
) -> Result<()> {
    if !yes && !confirm(&format!("Delete prescription {}?", id))? {
        println!("Cancelled.");
        return Ok(());
    }

    pillbox.delete(identity, id)?;
    println!("✓ Prescription deleted");
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn cmd_take(
    pillbox: &mut Pillbox<JsonFileStore>,
    identity: &Identity,
    prescription: Uuid,
    medicine: &str,
    date: Option<NaiveDate>,
    slot: Option<TimeSlot>,
) -> Result<()> {
    let now = Local::now().naive_local();
    let date = date.unwrap_or_else(|| now.date());
    let slot = slot.unwrap_or_else(|| current_slot(&now));

    let target = match medicine.trim().parse::<usize>() {
        Ok(position) if position > 0 => MedicineRef::Index(position - 1),
        _ => MedicineRef::Name(medicine.to_string()),
    };

    let updated = pillbox.toggle(identity, prescription, &target, date, slot, now)?;
    let taken = adherence::is_taken(&updated, &date_key(date), slot);

    println!(
        "{} {} marked {} for {} {}",
        if taken { "✓" } else { "○" },
        updated.medicine_name,
        if taken { "taken" } else { "not taken" },
        date,
        slot.name()
    );
    println!(
        "  {}/{} doses ({})",
        updated.taken_count,
        updated.total,
        format_ratio(adherence_ratio(&updated))
    );
    Ok(())
}

fn format_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) => format!("{:.0}%", r),
        None => "n/a".into(),
    }
}

fn cmd_adherence(
    pillbox: &Pillbox<JsonFileStore>,
    identity: &Identity,
    csv: Option<PathBuf>,
) -> Result<()> {
    let report = pillbox.adherence(identity)?;
    if report.rows.is_empty() {
        println!("No medicines to report on yet.");
        return Ok(());
    }

    for row in &report.rows {
        println!(
            "  {:<24} {:>4}/{:<4} {:>5}  {}",
            row.medicine_name,
            row.taken,
            row.total,
            format_ratio(row.ratio),
            row.color
        );
    }
    println!("  Overall: {}", format_ratio(report.overall()));

    if let Some(path) = csv {
        report.export_csv(&path)?;
        println!("✓ Exported {} rows to {}", report.rows.len(), path.display());
    }

    Ok(())
}

fn cmd_reconcile(pillbox: &mut Pillbox<JsonFileStore>, identity: &Identity) -> Result<()> {
    let fixed = pillbox.reconcile(identity)?;
    if fixed == 0 {
        println!("All taken counts are consistent.");
    } else {
        println!("✓ Repaired {} taken counts", fixed);
    }
    Ok(())
}
