use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::ImportLimits;
use crate::workflows::kardex::domain::{
    Enrollment, EnrollmentId, ImportMode, ImportOptions, Installment, InstallmentId, NewEnrollment,
    NewInstallment, NewPayment, NewProgram, NewStudent, Payment, PaymentId, Program, ProgramId,
    ReceiptFile, Student, StudentId, UploaderId,
};
use crate::workflows::kardex::fingerprint::PaymentFingerprint;
use crate::workflows::kardex::repository::{KardexRepository, MemoryKardex, RepositoryError};
use crate::workflows::kardex::resolver::{EnrollmentTerms, KardexResolver, StudentDetails};
use crate::workflows::kardex::ImportService;

pub(super) const HEADER: &str =
    "carnet,nombre,banco,no_boleta,monto,fecha_pago,mensualidad_aprobada,plan_estudios,mes_inicio,numero_cuotas,concepto";

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 6, 15).expect("valid date")
}

pub(super) fn uploader() -> UploaderId {
    UploaderId("admin-7".to_string())
}

pub(super) fn options(mode: ImportMode) -> ImportOptions {
    ImportOptions {
        mode,
        silent: false,
        forced_insertion: false,
        uploader: uploader(),
    }
}

pub(super) fn forced_options(mode: ImportMode) -> ImportOptions {
    ImportOptions {
        forced_insertion: true,
        ..options(mode)
    }
}

pub(super) fn csv_with_rows(rows: &[&str]) -> Cursor<String> {
    let mut body = String::from(HEADER);
    for row in rows {
        body.push('\n');
        body.push_str(row);
    }
    body.push('\n');
    Cursor::new(body)
}

pub(super) fn build_service() -> (ImportService<MemoryKardex>, Arc<MemoryKardex>) {
    build_service_with_limits(ImportLimits::default())
}

pub(super) fn build_service_with_limits(
    limits: ImportLimits,
) -> (ImportService<MemoryKardex>, Arc<MemoryKardex>) {
    let repository = Arc::new(MemoryKardex::default());
    let service = ImportService::with_today(repository.clone(), limits, today());
    (service, repository)
}

pub(super) fn build_resolver() -> (KardexResolver<MemoryKardex>, Arc<MemoryKardex>) {
    let repository = Arc::new(MemoryKardex::default());
    (KardexResolver::new(repository.clone()), repository)
}

pub(super) fn seed_program(
    repository: &MemoryKardex,
    abbreviation: &str,
    name: &str,
) -> Program {
    repository
        .insert_program(NewProgram {
            abbreviation: abbreviation.to_string(),
            name: name.to_string(),
        })
        .expect("program seeds")
}

pub(super) fn seed_student(repository: &MemoryKardex, code: &str) -> Student {
    repository
        .insert_student(NewStudent {
            code: code.to_string(),
            full_name: format!("Student {code}"),
            email: None,
            phone: None,
            created_by: uploader(),
        })
        .expect("student seeds")
}

pub(super) fn seed_enrollment(
    repository: &MemoryKardex,
    student: &Student,
    program: &Program,
) -> Enrollment {
    repository
        .insert_enrollment(NewEnrollment {
            student_id: student.id,
            program_id: program.id,
            monthly_fee_cents: 80_000,
            duration_months: 12,
            start_date: today(),
            end_date: today()
                .checked_add_months(chrono::Months::new(12))
                .expect("valid end date"),
            total_investment_cents: 960_000,
        })
        .expect("enrollment seeds")
}

pub(super) fn enrollment_terms() -> EnrollmentTerms {
    EnrollmentTerms {
        monthly_fee_cents: 80_000,
        duration_months: 12,
        start_date: today(),
    }
}

pub(super) fn student_details(full_name: &str) -> StudentDetails {
    StudentDetails {
        full_name: full_name.to_string(),
        email: None,
        phone: None,
    }
}

/// Wraps [`MemoryKardex`] and fails with an outage on the nth
/// `insert_payment` call, so chunk rollback paths can be exercised.
pub(super) struct OutageKardex {
    inner: MemoryKardex,
    fail_on_payment_call: usize,
    payment_calls: AtomicUsize,
}

impl OutageKardex {
    pub(super) fn failing_on_payment_call(call: usize) -> Self {
        Self {
            inner: MemoryKardex::default(),
            fail_on_payment_call: call,
            payment_calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn inner(&self) -> &MemoryKardex {
        &self.inner
    }
}

impl KardexRepository for OutageKardex {
    fn begin_chunk(&self) -> Result<(), RepositoryError> {
        self.inner.begin_chunk()
    }

    fn commit_chunk(&self) -> Result<(), RepositoryError> {
        self.inner.commit_chunk()
    }

    fn rollback_chunk(&self) -> Result<(), RepositoryError> {
        self.inner.rollback_chunk()
    }

    fn student_by_code(&self, code: &str) -> Result<Option<Student>, RepositoryError> {
        self.inner.student_by_code(code)
    }

    fn insert_student(&self, student: NewStudent) -> Result<Student, RepositoryError> {
        self.inner.insert_student(student)
    }

    fn program_by_abbreviation(
        &self,
        abbreviation: &str,
    ) -> Result<Option<Program>, RepositoryError> {
        self.inner.program_by_abbreviation(abbreviation)
    }

    fn program_by_prefix(&self, prefix: &str) -> Result<Option<Program>, RepositoryError> {
        self.inner.program_by_prefix(prefix)
    }

    fn insert_program(&self, program: NewProgram) -> Result<Program, RepositoryError> {
        self.inner.insert_program(program)
    }

    fn enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        self.inner.enrollment(id)
    }

    fn enrollment_for(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        self.inner.enrollment_for(student, program)
    }

    fn enrollments_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        self.inner.enrollments_for_student(student)
    }

    fn insert_enrollment(&self, enrollment: NewEnrollment) -> Result<Enrollment, RepositoryError> {
        self.inner.insert_enrollment(enrollment)
    }

    fn reassign_enrollment_program(
        &self,
        id: EnrollmentId,
        program: ProgramId,
    ) -> Result<(), RepositoryError> {
        self.inner.reassign_enrollment_program(id, program)
    }

    fn installments_for(
        &self,
        enrollment: EnrollmentId,
    ) -> Result<Vec<Installment>, RepositoryError> {
        self.inner.installments_for(enrollment)
    }

    fn insert_installment(
        &self,
        installment: NewInstallment,
    ) -> Result<Installment, RepositoryError> {
        self.inner.insert_installment(installment)
    }

    fn mark_installment_paid(&self, id: InstallmentId) -> Result<(), RepositoryError> {
        self.inner.mark_installment_paid(id)
    }

    fn purge_installments(&self, enrollment: EnrollmentId) -> Result<usize, RepositoryError> {
        self.inner.purge_installments(enrollment)
    }

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        self.inner.payment(id)
    }

    fn payments_for(&self, enrollment: EnrollmentId) -> Result<Vec<Payment>, RepositoryError> {
        self.inner.payments_for(enrollment)
    }

    fn payment_by_fingerprint(
        &self,
        fingerprint: &PaymentFingerprint,
    ) -> Result<Option<Payment>, RepositoryError> {
        self.inner.payment_by_fingerprint(fingerprint)
    }

    fn payment_by_receipt_hash(
        &self,
        student: StudentId,
        sha256: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        self.inner.payment_by_receipt_hash(student, sha256)
    }

    fn insert_payment(&self, payment: NewPayment) -> Result<Payment, RepositoryError> {
        let call = self.payment_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_payment_call {
            return Err(RepositoryError::Unavailable("storage offline".to_string()));
        }
        self.inner.insert_payment(payment)
    }

    fn link_payment_to_installment(
        &self,
        id: PaymentId,
        installment: InstallmentId,
    ) -> Result<(), RepositoryError> {
        self.inner.link_payment_to_installment(id, installment)
    }

    fn attach_receipt_file(
        &self,
        id: PaymentId,
        file: ReceiptFile,
    ) -> Result<Payment, RepositoryError> {
        self.inner.attach_receipt_file(id, file)
    }

    fn purge_payments(&self, enrollment: EnrollmentId) -> Result<usize, RepositoryError> {
        self.inner.purge_payments(enrollment)
    }
}
