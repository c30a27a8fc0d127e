use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One usable row from the appointments tab: a naive local date-time and the
/// recipient handle exactly as staff entered it (may lack the leading `@`,
/// may be a raw numeric id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentEntry {
    pub when: NaiveDateTime,
    pub handle: String,
}

/// Which reminder a delivery attempt belongs to; recorded verbatim in the
/// undelivered audit tab.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReminderKind {
    Appointment,
    SixMonth,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::Appointment => "appointment",
            ReminderKind::SixMonth => "6m",
        }
    }
}

/// One-shot job kinds stored in `scheduled_jobs.kind`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobKind {
    RemindTwoWeeks,
    ActivationFollowUp,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::RemindTwoWeeks => "remind_2w",
            JobKind::ActivationFollowUp => "activation_followup",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "remind_2w" => Some(JobKind::RemindTwoWeeks),
            "activation_followup" => Some(JobKind::ActivationFollowUp),
            _ => None,
        }
    }
}
