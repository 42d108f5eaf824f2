//! Financial state of invoices and supplier bills.
//!
//! The pure balance rules live in [`balance`], [`lines`] and [`notes`]; the
//! remaining modules load, lock and persist documents around them, one
//! transaction per operation.

pub mod adjustments;
pub mod balance;
pub mod credit;
pub mod documents;
pub mod kind;
pub mod lines;
pub mod notes;
pub mod payments;
pub mod pos;
pub mod repository;

#[cfg(test)]
mod tests;

pub use balance::{DocumentBalance, PosSettlement};
pub use kind::LedgerKind;
pub use lines::{
    calculate_all, calculate_line, summarize, CalculatedLine, LineInput, LineTotals,
};
pub use notes::{NoteBalance, NoteStatus};
