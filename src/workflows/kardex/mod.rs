//! Historical payment import and reconciliation workflow ("kardex").
//!
//! The pipeline flows strictly downward: [`ImportService`] reads rows through
//! the parser, normalizes cells, resolves each row to a student, program, and
//! enrollment, generates or matches installments, and persists payments that
//! survive fingerprint dedup. Storage is abstracted behind
//! [`KardexRepository`]; [`MemoryKardex`] is the in-process reference backend.

pub mod domain;
pub mod fingerprint;
pub mod normalizer;
pub(crate) mod parser;
pub mod repository;
pub mod resolver;
pub mod schedule;
mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Enrollment, EnrollmentId, ImportMode, ImportOptions, ImportPhase, ImportReport, ImportStatus,
    Installment, InstallmentId, InstallmentStatus, NewProgram, Payment, PaymentId, Program,
    ProgramId, ReceiptFile, RowError, Student, StudentId, UploaderId, DEFAULT_INSTALLMENT_COUNT,
    PLACEHOLDER_PROGRAM_CODE,
};
pub use fingerprint::{hash_receipt_file, PaymentFingerprint};
pub use repository::{KardexRepository, MemoryKardex, RepositoryError};
pub use resolver::{
    normalize_plan_code, EnrollmentTerms, KardexResolver, StudentDetails, MAX_RESOLUTION_ATTEMPTS,
};
pub use schedule::{generate_schedule_if_absent, match_pending_installment, ScheduleOutcome};
pub use service::{ImportError, ImportService, PaymentDraft, PaymentError};
