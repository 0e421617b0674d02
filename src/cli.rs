use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::settings::DEFAULT_SETTINGS_FILE;

#[derive(Debug, Parser)]
#[command(name = "rollcall")]
#[command(about = "Face-recognition attendance sessions for scheduled classes")]
#[command(version)]
pub struct Cli {
    /// Settings file (JSON). Missing file means defaults.
    #[arg(long, global = true, env = "ROLLCALL_CONFIG", default_value = DEFAULT_SETTINGS_FILE)]
    pub config: PathBuf,

    /// Attendance database, overriding the settings file
    #[arg(long, global = true, env = "ROLLCALL_DATABASE")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the attendance session for a schedule until its deadline
    Run {
        /// Schedule identifier (e.g. LH01)
        schedule: String,
    },

    /// Show a schedule's roster with each subject's status
    Report { schedule: String },

    /// Show a subject's attendance across schedules, newest first
    History { subject: String },

    /// Set the note on a subject's record for a schedule
    Note {
        schedule: String,
        subject: String,
        /// Note text; an empty string clears the note
        text: String,
    },

    /// Manage registered subjects
    Subject {
        #[command(subcommand)]
        action: SubjectAction,
    },

    /// Manage schedules
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SubjectAction {
    /// Register a subject
    Add { id: String, name: String },
}

#[derive(Debug, Subcommand)]
pub enum ScheduleAction {
    /// Create a schedule
    Add {
        id: String,

        #[arg(long)]
        title: Option<String>,
    },
}
