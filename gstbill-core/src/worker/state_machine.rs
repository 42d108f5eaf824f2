use serde::{Deserialize, Serialize};
use std::fmt;

/// Reminder stages an overdue invoice moves through.
///
/// Stages only ever advance:
/// - FirstReminder: 1 day past due
/// - SecondReminder: 7 days past due
/// - FinalNotice: 30 days past due
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "snake_case")]
pub enum ReminderStage {
    #[sqlx(rename = "first_reminder")]
    FirstReminder,

    #[sqlx(rename = "second_reminder")]
    SecondReminder,

    #[sqlx(rename = "final_notice")]
    FinalNotice,
}

impl ReminderStage {
    /// Days past the due date at which this stage is sent.
    pub fn threshold_days(&self) -> i64 {
        match self {
            ReminderStage::FirstReminder => 1,
            ReminderStage::SecondReminder => 7,
            ReminderStage::FinalNotice => 30,
        }
    }

    /// Stage that follows `current`; `None` once the final notice is out.
    pub fn next(current: Option<ReminderStage>) -> Option<ReminderStage> {
        match current {
            None => Some(ReminderStage::FirstReminder),
            Some(ReminderStage::FirstReminder) => Some(ReminderStage::SecondReminder),
            Some(ReminderStage::SecondReminder) => Some(ReminderStage::FinalNotice),
            Some(ReminderStage::FinalNotice) => None,
        }
    }

    const ALL: [ReminderStage; 3] = [
        ReminderStage::FirstReminder,
        ReminderStage::SecondReminder,
        ReminderStage::FinalNotice,
    ];
}

impl fmt::Display for ReminderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderStage::FirstReminder => write!(f, "first_reminder"),
            ReminderStage::SecondReminder => write!(f, "second_reminder"),
            ReminderStage::FinalNotice => write!(f, "final_notice"),
        }
    }
}

/// Action to take for an overdue invoice on this sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderAction {
    Send(ReminderStage),
    NoAction,
}

impl fmt::Display for ReminderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderAction::Send(stage) => write!(f, "send_{}", stage),
            ReminderAction::NoAction => write!(f, "no_action"),
        }
    }
}

/// Decides the next reminder for an invoice.
pub trait Transition {
    /// # Arguments
    ///
    /// * `current` - Last stage sent, if any
    /// * `days_overdue` - Whole days since the due date
    ///
    /// # Returns
    ///
    /// The stage recorded after this sweep and the action to take.
    fn transition(
        current: Option<ReminderStage>,
        days_overdue: i64,
    ) -> (Option<ReminderStage>, ReminderAction);
}

/// Sends the highest stage whose threshold has been reached, skipping stages
/// that were missed (an invoice first swept 40 days late gets the final
/// notice directly). A stage is never sent twice.
pub struct ReminderSchedule;

impl Transition for ReminderSchedule {
    fn transition(
        current: Option<ReminderStage>,
        days_overdue: i64,
    ) -> (Option<ReminderStage>, ReminderAction) {
        let due = ReminderStage::ALL
            .iter()
            .rev()
            .find(|stage| days_overdue >= stage.threshold_days())
            .copied();

        match (current, due) {
            (_, None) => (current, ReminderAction::NoAction),
            (Some(sent), Some(due)) if sent >= due => (current, ReminderAction::NoAction),
            (_, Some(due)) => (Some(due), ReminderAction::Send(due)),
        }
    }
}
