//! Monthly installment schedules: one-time generation and matching of
//! incoming payments to outstanding dues.

use chrono::{Datelike, Months, NaiveDate};
use tracing::warn;

use super::domain::{Enrollment, EnrollmentId, Installment, InstallmentStatus, NewInstallment};
use super::repository::{KardexRepository, RepositoryError};

/// Result of a schedule-generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Created(usize),
    /// The enrollment already had installments; nothing was touched.
    AlreadyScheduled,
    /// Fee or count was non-positive; nothing was created.
    InvalidTerms,
}

impl ScheduleOutcome {
    pub fn created(&self) -> usize {
        match self {
            ScheduleOutcome::Created(count) => *count,
            _ => 0,
        }
    }
}

/// Creates installments 1..=count with due dates stepped one month apart
/// unless the enrollment already has any. Regeneration only ever happens
/// through an explicit full-replace purge.
pub fn generate_schedule_if_absent<R: KardexRepository>(
    repository: &R,
    enrollment: &Enrollment,
    monthly_fee_cents: i64,
    installment_count: u32,
    start_date: NaiveDate,
) -> Result<ScheduleOutcome, RepositoryError> {
    if !repository.installments_for(enrollment.id)?.is_empty() {
        return Ok(ScheduleOutcome::AlreadyScheduled);
    }
    if monthly_fee_cents <= 0 || installment_count == 0 {
        warn!(
            enrollment = enrollment.id.0,
            monthly_fee_cents, installment_count, "skipping schedule generation, invalid terms"
        );
        return Ok(ScheduleOutcome::InvalidTerms);
    }

    for sequence in 1..=installment_count {
        let due_date = start_date
            .checked_add_months(Months::new(sequence - 1))
            .unwrap_or(start_date);
        repository.insert_installment(NewInstallment {
            enrollment_id: enrollment.id,
            sequence,
            due_date,
            amount_cents: monthly_fee_cents,
        })?;
    }

    Ok(ScheduleOutcome::Created(installment_count as usize))
}

/// Earliest pending installment, by sequence, whose due date falls in or
/// before the payment's month. `None` leaves the payment unlinked.
pub fn match_pending_installment<R: KardexRepository>(
    repository: &R,
    enrollment: EnrollmentId,
    paid_on: NaiveDate,
) -> Result<Option<Installment>, RepositoryError> {
    let mut installments = repository.installments_for(enrollment)?;
    installments.sort_by_key(|installment| installment.sequence);

    Ok(installments.into_iter().find(|installment| {
        installment.status == InstallmentStatus::Pending
            && (installment.due_date.year(), installment.due_date.month())
                <= (paid_on.year(), paid_on.month())
    }))
}
