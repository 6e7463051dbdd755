//! Import orchestrator: header validation, chunked row processing inside
//! repository transactions, the three replay modes, and the final report,
//! plus the single-payment operations the surrounding endpoints consume.

use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::config::ImportLimits;

use super::domain::{
    EnrollmentId, ImportMode, ImportOptions, ImportPhase, ImportReport, ImportStatus, NewPayment,
    Payment, PaymentId, ReceiptFile, RowError, UploaderId, DEFAULT_INSTALLMENT_COUNT,
};
use super::fingerprint::{hash_receipt_file, PaymentFingerprint};
use super::normalizer;
use super::parser::{SourceReader, SourceRow};
use super::repository::{KardexRepository, RepositoryError};
use super::resolver::{EnrollmentTerms, KardexResolver, StudentDetails};
use super::schedule::{self, ScheduleOutcome};

/// Fatal import failures. Row-level problems never surface here; they are
/// accumulated into the report instead.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("source file has no data rows")]
    EmptySource,
    #[error("source header is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("unable to read source: {0}")]
    Source(#[from] csv::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Failures of the single-payment operations.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("enrollment not found")]
    UnknownEnrollment,
    #[error("payment not found")]
    UnknownPayment,
    #[error("payment already recorded")]
    DuplicatePayment { existing: PaymentId },
    #[error("receipt file already attached for this student")]
    DuplicateReceiptFile { existing: PaymentId },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Caller-facing draft for recording a single payment outside a batch.
#[derive(Debug, Clone)]
pub struct PaymentDraft {
    pub bank: String,
    pub receipt_number: String,
    pub amount_cents: i64,
    pub paid_on: NaiveDate,
    pub concept: Option<String>,
    pub recorded_by: UploaderId,
}

/// Why one row did not make it into storage.
enum RowFailure {
    /// Recorded with its row number; the batch continues.
    Skipped(String),
    /// Storage outage; aborts and rolls back the whole chunk.
    Storage(RepositoryError),
}

impl From<RepositoryError> for RowFailure {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Unavailable(_) => RowFailure::Storage(error),
            other => RowFailure::Skipped(other.to_string()),
        }
    }
}

/// Counters and errors for one chunk. Kept chunk-local until the commit
/// succeeds so a rollback cannot leave phantom counts in the report.
#[derive(Default)]
struct ChunkTally {
    processed: usize,
    installments_created: usize,
    payments_created: usize,
    payments_updated: usize,
    duplicates_skipped: usize,
    errors: Vec<RowError>,
    purged: HashSet<EnrollmentId>,
}

/// Drives the batch pipeline over any [`KardexRepository`] backend.
pub struct ImportService<R> {
    repository: Arc<R>,
    resolver: KardexResolver<R>,
    limits: ImportLimits,
    today: NaiveDate,
}

impl<R: KardexRepository> ImportService<R> {
    pub fn new(repository: Arc<R>, limits: ImportLimits) -> Self {
        Self::with_today(repository, limits, Utc::now().date_naive())
    }

    /// Pins the date used as the last-resort fallback for unparseable date
    /// cells; [`ImportService::new`] uses the current day.
    pub fn with_today(repository: Arc<R>, limits: ImportLimits, today: NaiveDate) -> Self {
        let resolver = KardexResolver::new(repository.clone());
        Self {
            repository,
            resolver,
            limits,
            today,
        }
    }

    pub fn resolver(&self) -> &KardexResolver<R> {
        &self.resolver
    }

    /// Runs one import job over a tabular source. Row-level failures are
    /// collected into the report; only validation failures and unreadable
    /// sources return `Err`.
    pub fn run_import(
        &self,
        source: impl Read,
        options: ImportOptions,
    ) -> Result<ImportReport, ImportError> {
        let started = Instant::now();
        info!(
            phase = ImportPhase::Validating.as_str(),
            mode = ?options.mode,
            silent = options.silent,
            forced_insertion = options.forced_insertion,
            "starting historical payment import"
        );

        let mut reader = SourceReader::new(source)?;

        let mut report = ImportReport {
            status: ImportStatus::Completed,
            processed: 0,
            installments_created: 0,
            payments_created: 0,
            payments_updated: 0,
            duplicates_skipped: 0,
            errors: Vec::new(),
            resource_warnings: Vec::new(),
        };

        info!(phase = ImportPhase::Processing.as_str(), chunk_size = self.limits.chunk_size, "processing rows");
        let mut purged: HashSet<EnrollmentId> = HashSet::new();
        let mut total_rows = 0usize;
        let mut chunk_index = 0usize;
        let mut rows = reader.rows();

        loop {
            let chunk: Vec<(usize, Result<SourceRow, csv::Error>)> =
                rows.by_ref().take(self.limits.chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            chunk_index += 1;
            total_rows += chunk.len();
            self.process_chunk(chunk_index, chunk, &options, &mut purged, &mut report);
        }

        info!(phase = ImportPhase::Finalizing.as_str(), total_rows, "finalizing import");
        if total_rows == 0 {
            return Err(ImportError::EmptySource);
        }

        // A run where no row had any effect usually means systemic
        // misconfiguration, not genuinely empty input.
        if report.processed == 0 {
            report.status = ImportStatus::Failed;
            warn!("import had zero effect, marking the job failed");
        }

        let elapsed_secs = started.elapsed().as_secs();
        if elapsed_secs > self.limits.time_budget_secs {
            report.resource_warnings.push(format!(
                "job ran {elapsed_secs}s, over the {}s budget",
                self.limits.time_budget_secs
            ));
        }
        if total_rows > self.limits.row_budget {
            report.resource_warnings.push(format!(
                "{total_rows} rows read, over the {} row budget",
                self.limits.row_budget
            ));
        }

        info!(
            phase = match report.status {
                ImportStatus::Completed => ImportPhase::Completed.as_str(),
                ImportStatus::Failed => ImportPhase::Failed.as_str(),
            },
            processed = report.processed,
            installments_created = report.installments_created,
            payments_created = report.payments_created,
            payments_updated = report.payments_updated,
            duplicates_skipped = report.duplicates_skipped,
            errors = report.errors.len(),
            "import finished"
        );
        Ok(report)
    }

    fn process_chunk(
        &self,
        chunk_index: usize,
        chunk: Vec<(usize, Result<SourceRow, csv::Error>)>,
        options: &ImportOptions,
        purged: &mut HashSet<EnrollmentId>,
        report: &mut ImportReport,
    ) {
        let row_numbers: Vec<usize> = chunk.iter().map(|(row, _)| *row).collect();

        if let Err(error) = self.repository.begin_chunk() {
            warn!(chunk = chunk_index, %error, "chunk transaction could not start");
            for row in row_numbers {
                report.errors.push(RowError {
                    row,
                    reason: format!("chunk aborted: {error}"),
                });
            }
            return;
        }

        let mut tally = ChunkTally::default();
        let mut storage_failure: Option<RepositoryError> = None;

        for (row, parsed) in chunk {
            let source_row = match parsed {
                Ok(source_row) => source_row,
                Err(error) => {
                    let reason = format!("unreadable row: {error}");
                    self.log_row_skip(options.silent, row, &reason);
                    tally.errors.push(RowError { row, reason });
                    continue;
                }
            };

            match self.process_row(row, source_row, options, purged, &mut tally) {
                Ok(()) => {}
                Err(RowFailure::Skipped(reason)) => {
                    self.log_row_skip(options.silent, row, &reason);
                    tally.errors.push(RowError { row, reason });
                }
                Err(RowFailure::Storage(error)) => {
                    storage_failure = Some(error);
                    break;
                }
            }
        }

        if let Some(error) = storage_failure {
            if let Err(rollback_error) = self.repository.rollback_chunk() {
                warn!(chunk = chunk_index, %rollback_error, "chunk rollback failed");
            }
            warn!(chunk = chunk_index, %error, "storage failure aborted the chunk");
            for row in row_numbers {
                report.errors.push(RowError {
                    row,
                    reason: format!("chunk aborted: {error}"),
                });
            }
            return;
        }

        match self.repository.commit_chunk() {
            Ok(()) => {
                report.processed += tally.processed;
                report.installments_created += tally.installments_created;
                report.payments_created += tally.payments_created;
                report.payments_updated += tally.payments_updated;
                report.duplicates_skipped += tally.duplicates_skipped;
                report.errors.append(&mut tally.errors);
                purged.extend(tally.purged);
                if options.silent {
                    debug!(chunk = chunk_index, processed = report.processed, "chunk committed");
                } else {
                    info!(chunk = chunk_index, processed = report.processed, "chunk committed");
                }
            }
            Err(error) => {
                if let Err(rollback_error) = self.repository.rollback_chunk() {
                    warn!(chunk = chunk_index, %rollback_error, "chunk rollback failed");
                }
                warn!(chunk = chunk_index, %error, "chunk commit failed");
                for row in row_numbers {
                    report.errors.push(RowError {
                        row,
                        reason: format!("chunk aborted: {error}"),
                    });
                }
            }
        }
    }

    fn log_row_skip(&self, silent: bool, row: usize, reason: &str) {
        if silent {
            debug!(row, reason, "row skipped");
        } else {
            warn!(row, reason, "row skipped");
        }
    }

    fn process_row(
        &self,
        row: usize,
        source: SourceRow,
        options: &ImportOptions,
        purged: &HashSet<EnrollmentId>,
        tally: &mut ChunkTally,
    ) -> Result<(), RowFailure> {
        let student_code = normalizer::normalize_student_code(&source.student_code);
        let bank = normalizer::normalize_bank_name(&source.bank);
        let receipt = normalizer::normalize_receipt_number(&source.receipt_number);
        let amount_cents = normalizer::normalize_amount(&source.amount);
        let paid_on = normalizer::normalize_payment_date(&source.payment_date, self.today);
        let monthly_fee_cents = normalizer::normalize_amount(&source.monthly_fee);
        let installment_count = source
            .installment_count
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_INSTALLMENT_COUNT);
        let start_date = source
            .start_month
            .as_deref()
            .and_then(normalizer::parse_start_month)
            .unwrap_or(paid_on);

        if receipt.is_empty() {
            return Err(RowFailure::Skipped(
                "receipt number is empty after normalization".to_string(),
            ));
        }
        if amount_cents <= 0 {
            return Err(RowFailure::Skipped(format!(
                "amount '{}' does not parse to a positive value",
                source.amount
            )));
        }

        let program = self.resolver.resolve_program(&source.study_plan, 0)?;
        if program.is_placeholder() && !options.forced_insertion {
            return Err(RowFailure::Skipped(format!(
                "study plan '{}' did not resolve to a program",
                source.study_plan.trim()
            )));
        }

        let student = self.resolver.find_or_create_student(
            &student_code,
            StudentDetails {
                full_name: source.student_name.clone(),
                email: source.email.clone(),
                phone: source.phone.clone(),
            },
            &options.uploader,
        )?;

        let enrollment = if monthly_fee_cents <= 0 {
            // Cannot establish terms for a new enrollment; the row only
            // stands if one already exists.
            match self.repository.enrollment_for(student.id, program.id)? {
                Some(enrollment) => enrollment,
                None => {
                    return Err(RowFailure::Skipped(format!(
                        "monthly fee '{}' does not parse to a positive value",
                        source.monthly_fee
                    )))
                }
            }
        } else {
            self.resolver.find_or_create_enrollment(
                &student,
                &program,
                &source.study_plan,
                EnrollmentTerms {
                    monthly_fee_cents,
                    duration_months: installment_count,
                    start_date,
                },
            )?
        };

        if let ImportMode::FullReplace { purge_payments } = options.mode {
            if !purged.contains(&enrollment.id) && !tally.purged.contains(&enrollment.id) {
                let removed = self.repository.purge_installments(enrollment.id)?;
                let mut removed_payments = 0;
                if purge_payments {
                    removed_payments = self.repository.purge_payments(enrollment.id)?;
                }
                tally.purged.insert(enrollment.id);
                debug!(
                    enrollment = enrollment.id.0,
                    removed, removed_payments, "full replace purged the enrollment"
                );
            }
        }

        let schedule_fee = if monthly_fee_cents > 0 {
            monthly_fee_cents
        } else {
            enrollment.monthly_fee_cents
        };
        match schedule::generate_schedule_if_absent(
            self.repository.as_ref(),
            &enrollment,
            schedule_fee,
            installment_count,
            start_date,
        )? {
            ScheduleOutcome::Created(count) => {
                tally.installments_created += count;
            }
            ScheduleOutcome::AlreadyScheduled => {}
            ScheduleOutcome::InvalidTerms => {
                return Err(RowFailure::Skipped(format!(
                    "cannot generate a schedule from fee '{}' and {installment_count} installments",
                    source.monthly_fee
                )));
            }
        }

        let fingerprint = PaymentFingerprint::compute(&bank, &receipt, enrollment.id, paid_on);
        if let Some(existing) = self.repository.payment_by_fingerprint(&fingerprint)? {
            return self.handle_duplicate(row, existing, options, paid_on, tally);
        }

        let matched = if matches!(options.mode, ImportMode::ReplacePending) {
            schedule::match_pending_installment(self.repository.as_ref(), enrollment.id, paid_on)?
        } else {
            None
        };

        let inserted = self.repository.insert_payment(NewPayment {
            enrollment_id: enrollment.id,
            installment_id: matched.as_ref().map(|installment| installment.id),
            bank_raw: source.bank.clone(),
            bank,
            receipt_raw: source.receipt_number.clone(),
            receipt,
            amount_cents,
            paid_on,
            fingerprint,
            receipt_file: None,
            concept: source.concept.clone(),
            recorded_by: options.uploader.clone(),
        });

        match inserted {
            Ok(payment) => {
                if let Some(installment) = matched {
                    self.repository.mark_installment_paid(installment.id)?;
                }
                tally.payments_created += 1;
                tally.processed += 1;
                debug!(row, payment = payment.id.0, "payment recorded");
                Ok(())
            }
            // Lost a race with a concurrent job; the fingerprint uniqueness
            // constraint rejects the later duplicate.
            Err(RepositoryError::Conflict) => {
                tally.duplicates_skipped += 1;
                tally.processed += 1;
                debug!(row, "duplicate payment skipped at insert");
                Ok(())
            }
            Err(error) => Err(RowFailure::from(error)),
        }
    }

    /// Mode-specific duplicate handling: replace-pending links a still
    /// unlinked stored payment to its installment and counts it as updated;
    /// every other mode is a pure skip. Duplicates are never errors.
    fn handle_duplicate(
        &self,
        row: usize,
        existing: Payment,
        options: &ImportOptions,
        paid_on: NaiveDate,
        tally: &mut ChunkTally,
    ) -> Result<(), RowFailure> {
        if matches!(options.mode, ImportMode::ReplacePending) && existing.installment_id.is_none() {
            if let Some(installment) = schedule::match_pending_installment(
                self.repository.as_ref(),
                existing.enrollment_id,
                paid_on,
            )? {
                self.repository
                    .link_payment_to_installment(existing.id, installment.id)?;
                self.repository.mark_installment_paid(installment.id)?;
                tally.payments_updated += 1;
                tally.processed += 1;
                debug!(
                    row,
                    payment = existing.id.0,
                    installment = installment.id.0,
                    "replayed duplicate linked to its pending installment"
                );
                return Ok(());
            }
        }

        tally.duplicates_skipped += 1;
        tally.processed += 1;
        debug!(row, payment = existing.id.0, "duplicate payment skipped");
        Ok(())
    }

    /// Normalizes, fingerprints, dedups, and persists one payment outside a
    /// batch. Duplicates are rejected with the existing payment's id.
    pub fn record_payment(
        &self,
        enrollment_id: EnrollmentId,
        draft: PaymentDraft,
    ) -> Result<Payment, PaymentError> {
        let enrollment = self
            .repository
            .enrollment(enrollment_id)?
            .ok_or(PaymentError::UnknownEnrollment)?;

        let bank = normalizer::normalize_bank_name(&draft.bank);
        let receipt = normalizer::normalize_receipt_number(&draft.receipt_number);
        let fingerprint = PaymentFingerprint::compute(&bank, &receipt, enrollment.id, draft.paid_on);

        if let Some(existing) = self.repository.payment_by_fingerprint(&fingerprint)? {
            return Err(PaymentError::DuplicatePayment {
                existing: existing.id,
            });
        }

        let payment = self.repository.insert_payment(NewPayment {
            enrollment_id: enrollment.id,
            installment_id: None,
            bank_raw: draft.bank,
            bank,
            receipt_raw: draft.receipt_number,
            receipt,
            amount_cents: draft.amount_cents,
            paid_on: draft.paid_on,
            fingerprint,
            receipt_file: None,
            concept: draft.concept,
            recorded_by: draft.recorded_by,
        })?;

        info!(payment = payment.id.0, enrollment = enrollment.id.0, "payment recorded");
        Ok(payment)
    }

    /// Hashes an attached receipt file, applies the per-student file-content
    /// dedup, and stores the hash with the storage key on the payment.
    pub fn attach_receipt(
        &self,
        payment_id: PaymentId,
        content: &[u8],
        storage_key: &str,
    ) -> Result<Payment, PaymentError> {
        let payment = self
            .repository
            .payment(payment_id)?
            .ok_or(PaymentError::UnknownPayment)?;
        let enrollment = self
            .repository
            .enrollment(payment.enrollment_id)?
            .ok_or(PaymentError::UnknownEnrollment)?;

        let sha256 = hash_receipt_file(content);
        if let Some(existing) = self
            .repository
            .payment_by_receipt_hash(enrollment.student_id, &sha256)?
        {
            if existing.id != payment.id {
                return Err(PaymentError::DuplicateReceiptFile {
                    existing: existing.id,
                });
            }
        }

        let updated = self.repository.attach_receipt_file(
            payment.id,
            ReceiptFile {
                sha256,
                storage_key: storage_key.to_string(),
            },
        )?;
        Ok(updated)
    }
}
