//! Batch import and reconciliation engine for historical student payment
//! records.
//!
//! The crate's core is the kardex workflow: it ingests spreadsheet-sourced
//! payment rows, resolves each row to a student, program, and installment,
//! rejects duplicate payments through content fingerprinting, and rebuilds or
//! extends installment schedules idempotently. The HTTP/CLI surface that
//! triggers imports lives outside this crate and consumes
//! [`workflows::kardex::ImportService`] directly.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
