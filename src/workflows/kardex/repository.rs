//! Storage abstraction for the import pipeline, plus the in-memory backend
//! exercised by the test suite and available to demos. Production storage is
//! provided by the excluded persistence layer.

use std::sync::{Mutex, MutexGuard};

use std::collections::BTreeMap;

use super::domain::{
    Enrollment, EnrollmentId, Installment, InstallmentId, InstallmentStatus, NewEnrollment,
    NewInstallment, NewPayment, NewProgram, NewStudent, Payment, PaymentId, Program, ProgramId,
    ReceiptFile, Student, StudentId,
};
use super::fingerprint::PaymentFingerprint;

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction so the orchestrator and resolvers can be exercised in
/// isolation. `begin_chunk`/`commit_chunk`/`rollback_chunk` bound one batch
/// of rows; implementations make everything between them atomic.
pub trait KardexRepository: Send + Sync {
    fn begin_chunk(&self) -> Result<(), RepositoryError>;
    fn commit_chunk(&self) -> Result<(), RepositoryError>;
    fn rollback_chunk(&self) -> Result<(), RepositoryError>;

    fn student_by_code(&self, code: &str) -> Result<Option<Student>, RepositoryError>;
    fn insert_student(&self, student: NewStudent) -> Result<Student, RepositoryError>;

    fn program_by_abbreviation(
        &self,
        abbreviation: &str,
    ) -> Result<Option<Program>, RepositoryError>;
    /// First program whose abbreviation starts with `prefix`, in
    /// abbreviation order.
    fn program_by_prefix(&self, prefix: &str) -> Result<Option<Program>, RepositoryError>;
    fn insert_program(&self, program: NewProgram) -> Result<Program, RepositoryError>;

    fn enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, RepositoryError>;
    fn enrollment_for(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<Option<Enrollment>, RepositoryError>;
    fn enrollments_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<Enrollment>, RepositoryError>;
    fn insert_enrollment(&self, enrollment: NewEnrollment) -> Result<Enrollment, RepositoryError>;
    fn reassign_enrollment_program(
        &self,
        id: EnrollmentId,
        program: ProgramId,
    ) -> Result<(), RepositoryError>;

    fn installments_for(
        &self,
        enrollment: EnrollmentId,
    ) -> Result<Vec<Installment>, RepositoryError>;
    fn insert_installment(
        &self,
        installment: NewInstallment,
    ) -> Result<Installment, RepositoryError>;
    fn mark_installment_paid(&self, id: InstallmentId) -> Result<(), RepositoryError>;
    fn purge_installments(&self, enrollment: EnrollmentId) -> Result<usize, RepositoryError>;

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError>;
    fn payments_for(&self, enrollment: EnrollmentId) -> Result<Vec<Payment>, RepositoryError>;
    fn payment_by_fingerprint(
        &self,
        fingerprint: &PaymentFingerprint,
    ) -> Result<Option<Payment>, RepositoryError>;
    /// File-content dedup is scoped per student: the same receipt file
    /// attached for a different student is allowed.
    fn payment_by_receipt_hash(
        &self,
        student: StudentId,
        sha256: &str,
    ) -> Result<Option<Payment>, RepositoryError>;
    /// Fails with [`RepositoryError::Conflict`] when a payment with the same
    /// fingerprint already exists; the last line of defense under
    /// concurrent jobs.
    fn insert_payment(&self, payment: NewPayment) -> Result<Payment, RepositoryError>;
    fn link_payment_to_installment(
        &self,
        id: PaymentId,
        installment: InstallmentId,
    ) -> Result<(), RepositoryError>;
    fn attach_receipt_file(
        &self,
        id: PaymentId,
        file: ReceiptFile,
    ) -> Result<Payment, RepositoryError>;
    fn purge_payments(&self, enrollment: EnrollmentId) -> Result<usize, RepositoryError>;
}

#[derive(Debug, Default, Clone)]
struct KardexState {
    students: BTreeMap<u64, Student>,
    programs: BTreeMap<u64, Program>,
    enrollments: BTreeMap<u64, Enrollment>,
    installments: BTreeMap<u64, Installment>,
    payments: BTreeMap<u64, Payment>,
    sequence: u64,
}

impl KardexState {
    fn next_id(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: KardexState,
    snapshot: Option<KardexState>,
}

/// Mutex-guarded reference backend. Chunk transactions are snapshot-based:
/// `begin_chunk` captures the current state and `rollback_chunk` restores it.
#[derive(Debug, Default)]
pub struct MemoryKardex {
    inner: Mutex<MemoryInner>,
}

impl MemoryKardex {
    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, RepositoryError> {
        self.inner
            .lock()
            .map_err(|_| RepositoryError::Unavailable("state mutex poisoned".to_string()))
    }
}

impl KardexRepository for MemoryKardex {
    fn begin_chunk(&self) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        let snapshot = inner.state.clone();
        inner.snapshot = Some(snapshot);
        Ok(())
    }

    fn commit_chunk(&self) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        inner.snapshot = None;
        Ok(())
    }

    fn rollback_chunk(&self) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        match inner.snapshot.take() {
            Some(snapshot) => {
                inner.state = snapshot;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn student_by_code(&self, code: &str) -> Result<Option<Student>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .students
            .values()
            .find(|student| student.code == code)
            .cloned())
    }

    fn insert_student(&self, student: NewStudent) -> Result<Student, RepositoryError> {
        let mut inner = self.lock()?;
        if inner
            .state
            .students
            .values()
            .any(|existing| existing.code == student.code)
        {
            return Err(RepositoryError::Conflict);
        }

        let id = inner.state.next_id();
        let stored = Student {
            id: StudentId(id),
            code: student.code,
            full_name: student.full_name,
            email: student.email,
            phone: student.phone,
            created_by: student.created_by,
        };
        inner.state.students.insert(id, stored.clone());
        Ok(stored)
    }

    fn program_by_abbreviation(
        &self,
        abbreviation: &str,
    ) -> Result<Option<Program>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .programs
            .values()
            .find(|program| program.abbreviation == abbreviation)
            .cloned())
    }

    fn program_by_prefix(&self, prefix: &str) -> Result<Option<Program>, RepositoryError> {
        let inner = self.lock()?;
        let mut candidates: Vec<&Program> = inner
            .state
            .programs
            .values()
            .filter(|program| program.abbreviation.starts_with(prefix))
            .collect();
        candidates.sort_by(|a, b| a.abbreviation.cmp(&b.abbreviation));
        Ok(candidates.first().map(|program| (*program).clone()))
    }

    fn insert_program(&self, program: NewProgram) -> Result<Program, RepositoryError> {
        let mut inner = self.lock()?;
        if inner
            .state
            .programs
            .values()
            .any(|existing| existing.abbreviation == program.abbreviation)
        {
            return Err(RepositoryError::Conflict);
        }

        let id = inner.state.next_id();
        let stored = Program {
            id: ProgramId(id),
            abbreviation: program.abbreviation,
            name: program.name,
        };
        inner.state.programs.insert(id, stored.clone());
        Ok(stored)
    }

    fn enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner.state.enrollments.get(&id.0).cloned())
    }

    fn enrollment_for(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .enrollments
            .values()
            .find(|enrollment| enrollment.student_id == student && enrollment.program_id == program)
            .cloned())
    }

    fn enrollments_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .enrollments
            .values()
            .filter(|enrollment| enrollment.student_id == student)
            .cloned()
            .collect())
    }

    fn insert_enrollment(&self, enrollment: NewEnrollment) -> Result<Enrollment, RepositoryError> {
        let mut inner = self.lock()?;
        if inner.state.enrollments.values().any(|existing| {
            existing.student_id == enrollment.student_id
                && existing.program_id == enrollment.program_id
        }) {
            return Err(RepositoryError::Conflict);
        }

        let id = inner.state.next_id();
        let stored = Enrollment {
            id: EnrollmentId(id),
            student_id: enrollment.student_id,
            program_id: enrollment.program_id,
            monthly_fee_cents: enrollment.monthly_fee_cents,
            duration_months: enrollment.duration_months,
            start_date: enrollment.start_date,
            end_date: enrollment.end_date,
            total_investment_cents: enrollment.total_investment_cents,
        };
        inner.state.enrollments.insert(id, stored.clone());
        Ok(stored)
    }

    fn reassign_enrollment_program(
        &self,
        id: EnrollmentId,
        program: ProgramId,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        let student = match inner.state.enrollments.get(&id.0) {
            Some(enrollment) => enrollment.student_id,
            None => return Err(RepositoryError::NotFound),
        };
        if inner.state.enrollments.values().any(|existing| {
            existing.id != id && existing.student_id == student && existing.program_id == program
        }) {
            return Err(RepositoryError::Conflict);
        }

        match inner.state.enrollments.get_mut(&id.0) {
            Some(enrollment) => {
                enrollment.program_id = program;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn installments_for(
        &self,
        enrollment: EnrollmentId,
    ) -> Result<Vec<Installment>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .installments
            .values()
            .filter(|installment| installment.enrollment_id == enrollment)
            .cloned()
            .collect())
    }

    fn insert_installment(
        &self,
        installment: NewInstallment,
    ) -> Result<Installment, RepositoryError> {
        let mut inner = self.lock()?;
        if inner.state.installments.values().any(|existing| {
            existing.enrollment_id == installment.enrollment_id
                && existing.sequence == installment.sequence
        }) {
            return Err(RepositoryError::Conflict);
        }

        let id = inner.state.next_id();
        let stored = Installment {
            id: InstallmentId(id),
            enrollment_id: installment.enrollment_id,
            sequence: installment.sequence,
            due_date: installment.due_date,
            amount_cents: installment.amount_cents,
            status: InstallmentStatus::Pending,
        };
        inner.state.installments.insert(id, stored.clone());
        Ok(stored)
    }

    fn mark_installment_paid(&self, id: InstallmentId) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        match inner.state.installments.get_mut(&id.0) {
            Some(installment) => {
                installment.status = InstallmentStatus::Paid;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn purge_installments(&self, enrollment: EnrollmentId) -> Result<usize, RepositoryError> {
        let mut inner = self.lock()?;
        let before = inner.state.installments.len();
        inner
            .state
            .installments
            .retain(|_, installment| installment.enrollment_id != enrollment);
        Ok(before - inner.state.installments.len())
    }

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner.state.payments.get(&id.0).cloned())
    }

    fn payments_for(&self, enrollment: EnrollmentId) -> Result<Vec<Payment>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .payments
            .values()
            .filter(|payment| payment.enrollment_id == enrollment)
            .cloned()
            .collect())
    }

    fn payment_by_fingerprint(
        &self,
        fingerprint: &PaymentFingerprint,
    ) -> Result<Option<Payment>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .payments
            .values()
            .find(|payment| &payment.fingerprint == fingerprint)
            .cloned())
    }

    fn payment_by_receipt_hash(
        &self,
        student: StudentId,
        sha256: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        let inner = self.lock()?;
        let enrollment_ids: Vec<EnrollmentId> = inner
            .state
            .enrollments
            .values()
            .filter(|enrollment| enrollment.student_id == student)
            .map(|enrollment| enrollment.id)
            .collect();

        Ok(inner
            .state
            .payments
            .values()
            .find(|payment| {
                enrollment_ids.contains(&payment.enrollment_id)
                    && payment
                        .receipt_file
                        .as_ref()
                        .is_some_and(|file| file.sha256 == sha256)
            })
            .cloned())
    }

    fn insert_payment(&self, payment: NewPayment) -> Result<Payment, RepositoryError> {
        let mut inner = self.lock()?;
        if inner
            .state
            .payments
            .values()
            .any(|existing| existing.fingerprint == payment.fingerprint)
        {
            return Err(RepositoryError::Conflict);
        }

        let id = inner.state.next_id();
        let stored = Payment {
            id: PaymentId(id),
            enrollment_id: payment.enrollment_id,
            installment_id: payment.installment_id,
            bank_raw: payment.bank_raw,
            bank: payment.bank,
            receipt_raw: payment.receipt_raw,
            receipt: payment.receipt,
            amount_cents: payment.amount_cents,
            paid_on: payment.paid_on,
            fingerprint: payment.fingerprint,
            receipt_file: payment.receipt_file,
            concept: payment.concept,
            recorded_by: payment.recorded_by,
        };
        inner.state.payments.insert(id, stored.clone());
        Ok(stored)
    }

    fn link_payment_to_installment(
        &self,
        id: PaymentId,
        installment: InstallmentId,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        match inner.state.payments.get_mut(&id.0) {
            Some(payment) => {
                payment.installment_id = Some(installment);
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn attach_receipt_file(
        &self,
        id: PaymentId,
        file: ReceiptFile,
    ) -> Result<Payment, RepositoryError> {
        let mut inner = self.lock()?;
        match inner.state.payments.get_mut(&id.0) {
            Some(payment) => {
                payment.receipt_file = Some(file);
                Ok(payment.clone())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn purge_payments(&self, enrollment: EnrollmentId) -> Result<usize, RepositoryError> {
        let mut inner = self.lock()?;
        let before = inner.state.payments.len();
        inner
            .state
            .payments
            .retain(|_, payment| payment.enrollment_id != enrollment);
        Ok(before - inner.state.payments.len())
    }
}
