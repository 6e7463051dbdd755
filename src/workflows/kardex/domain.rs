use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::fingerprint::PaymentFingerprint;

/// Abbreviation of the reserved program that anchors rows whose study plan
/// cannot be resolved. Created lazily on first use and never a valid target
/// for a promotion.
pub const PLACEHOLDER_PROGRAM_CODE: &str = "TEMP";

/// Installments generated for an enrollment when the source row does not
/// carry an explicit count.
pub const DEFAULT_INSTALLMENT_COUNT: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstallmentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub u64);

/// Audit reference to the account that triggered an import or recorded a
/// payment. Owned by the excluded auth layer; opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploaderId(pub String);

/// Identity record keyed by a normalized student code. Created on first
/// sight during an import; never deleted by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub code: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_by: UploaderId,
}

/// An academic offering identified by its abbreviation. At most one program
/// exists per abbreviation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub abbreviation: String,
    pub name: String,
}

impl Program {
    pub fn is_placeholder(&self) -> bool {
        self.abbreviation == PLACEHOLDER_PROGRAM_CODE
    }
}

/// Links one student to one program and owns the financial terms of that
/// registration. Money fields are integer cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student_id: StudentId,
    pub program_id: ProgramId,
    pub monthly_fee_cents: i64,
    pub duration_months: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_investment_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    Pending,
    Paid,
}

impl InstallmentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            InstallmentStatus::Pending => "pending",
            InstallmentStatus::Paid => "paid",
        }
    }
}

/// One of N monthly dues belonging to an enrollment. Sequence numbers are
/// unique per enrollment, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub enrollment_id: EnrollmentId,
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub amount_cents: i64,
    pub status: InstallmentStatus,
}

/// Content hash and storage pointer for a receipt image or PDF attached to
/// a payment. The storage key is managed by the excluded file-storage
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptFile {
    pub sha256: String,
    pub storage_key: String,
}

/// A recorded payment event. The fingerprint is derived from the normalized
/// bank, normalized receipt, enrollment, and payment date; no two payments
/// may share one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub enrollment_id: EnrollmentId,
    pub installment_id: Option<InstallmentId>,
    pub bank_raw: String,
    pub bank: String,
    pub receipt_raw: String,
    pub receipt: String,
    pub amount_cents: i64,
    pub paid_on: NaiveDate,
    pub fingerprint: PaymentFingerprint,
    pub receipt_file: Option<ReceiptFile>,
    pub concept: Option<String>,
    pub recorded_by: UploaderId,
}

/// Draft records handed to the repository, which assigns identifiers.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub code: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_by: UploaderId,
}

#[derive(Debug, Clone)]
pub struct NewProgram {
    pub abbreviation: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub student_id: StudentId,
    pub program_id: ProgramId,
    pub monthly_fee_cents: i64,
    pub duration_months: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_investment_cents: i64,
}

#[derive(Debug, Clone)]
pub struct NewInstallment {
    pub enrollment_id: EnrollmentId,
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub amount_cents: i64,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub enrollment_id: EnrollmentId,
    pub installment_id: Option<InstallmentId>,
    pub bank_raw: String,
    pub bank: String,
    pub receipt_raw: String,
    pub receipt: String,
    pub amount_cents: i64,
    pub paid_on: NaiveDate,
    pub fingerprint: PaymentFingerprint,
    pub receipt_file: Option<ReceiptFile>,
    pub concept: Option<String>,
    pub recorded_by: UploaderId,
}

/// Replay semantics for a batch run. Mutually exclusive; `Normal` never
/// mutates existing installments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Create missing schedules and append new payments only.
    Normal,
    /// Additionally match payments to pending installments and flip them to
    /// paid.
    ReplacePending,
    /// Purge each touched enrollment's installments (and optionally its
    /// payments) before rebuilding. Data-quality remediation only; requires
    /// the caller's explicit opt-in.
    FullReplace { purge_payments: bool },
}

/// Immutable per-job configuration, fixed at job start.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub mode: ImportMode,
    /// Reduce per-row logging to aggregate summaries only.
    pub silent: bool,
    /// Tolerate rows whose study plan only resolves to the placeholder,
    /// trading strictness for completeness during historical backfills.
    pub forced_insertion: bool,
    pub uploader: UploaderId,
}

impl ImportOptions {
    pub fn normal(uploader: UploaderId) -> Self {
        Self {
            mode: ImportMode::Normal,
            silent: false,
            forced_insertion: false,
            uploader,
        }
    }
}

/// Lifecycle of one import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Idle,
    Validating,
    Processing,
    Finalizing,
    Completed,
    Failed,
}

impl ImportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportPhase::Idle => "idle",
            ImportPhase::Validating => "validating",
            ImportPhase::Processing => "processing",
            ImportPhase::Finalizing => "finalizing",
            ImportPhase::Completed => "completed",
            ImportPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Completed,
    Failed,
}

/// One skipped row and the reason it was skipped, 1-based and counted over
/// data rows (the header is row 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub reason: String,
}

/// Aggregate outcome returned to the caller. Always populated, even on
/// partial failure; there is no path that drops rows silently.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub status: ImportStatus,
    pub processed: usize,
    pub installments_created: usize,
    pub payments_created: usize,
    pub payments_updated: usize,
    pub duplicates_skipped: usize,
    pub errors: Vec<RowError>,
    pub resource_warnings: Vec<String>,
}
