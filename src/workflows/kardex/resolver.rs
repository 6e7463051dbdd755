//! Program and enrollment resolution: alias-normalized study-plan codes,
//! the placeholder fallback, promotion off the placeholder, and the
//! idempotent get-or-create chain for students and enrollments.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{Months, NaiveDate};
use tracing::{debug, info, warn};

use super::domain::{
    Enrollment, EnrollmentId, NewEnrollment, NewProgram, NewStudent, Program, Student, UploaderId,
    PLACEHOLDER_PROGRAM_CODE,
};
use super::repository::{KardexRepository, RepositoryError};

/// Resolution attempts beyond this bound short-circuit to the best-known
/// state instead of retrying. An unresolvable code used to re-trigger
/// resolution from its own failure path and recurse without bound.
pub const MAX_RESOLUTION_ATTEMPTS: u32 = 1;

static PLAN_ALIAS_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();

fn plan_alias_map() -> &'static HashMap<&'static str, &'static str> {
    PLAN_ALIAS_MAP.get_or_init(|| {
        // Codes from the pre-2019 catalog that still show up in old sheets.
        const ALIASES: &[(&str, &str)] = &[("MAP", "MBA"), ("MRRHH", "MDRH"), ("PEM", "PROFA")];

        ALIASES.iter().copied().collect()
    })
}

/// Study-plan code reduced to its letters, uppercased, with legacy aliases
/// applied.
pub fn normalize_plan_code(raw: &str) -> String {
    let letters: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();

    match plan_alias_map().get(letters.as_str()) {
        Some(canonical) => (*canonical).to_string(),
        None => letters,
    }
}

/// Best-effort identity fields pulled from a source row.
#[derive(Debug, Clone, Default)]
pub struct StudentDetails {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Financial terms for an enrollment created mid-import.
#[derive(Debug, Clone, Copy)]
pub struct EnrollmentTerms {
    pub monthly_fee_cents: i64,
    pub duration_months: u32,
    pub start_date: NaiveDate,
}

/// Repository-backed resolution of the student → program → enrollment chain.
pub struct KardexResolver<R> {
    repository: Arc<R>,
}

impl<R: KardexRepository> KardexResolver<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// The reserved program anchoring unresolved study plans. Created lazily
    /// on first use; at most one exists.
    pub fn placeholder_program(&self) -> Result<Program, RepositoryError> {
        if let Some(program) = self
            .repository
            .program_by_abbreviation(PLACEHOLDER_PROGRAM_CODE)?
        {
            return Ok(program);
        }

        self.repository.insert_program(NewProgram {
            abbreviation: PLACEHOLDER_PROGRAM_CODE.to_string(),
            name: "Plan de estudios por asignar".to_string(),
        })
    }

    /// Maps a free-text study-plan code to a program, falling back to the
    /// placeholder. `attempt` counts retries; anything beyond
    /// [`MAX_RESOLUTION_ATTEMPTS`] returns the placeholder without touching
    /// the lookups again.
    pub fn resolve_program(&self, plan_code: &str, attempt: u32) -> Result<Program, RepositoryError> {
        if attempt > MAX_RESOLUTION_ATTEMPTS {
            warn!(plan_code, attempt, "resolution attempt bound exceeded, keeping placeholder");
            return self.placeholder_program();
        }

        let normalized = normalize_plan_code(plan_code);
        if normalized.is_empty() || normalized == PLACEHOLDER_PROGRAM_CODE {
            return self.placeholder_program();
        }

        if let Some(program) = self.lookup_program(&normalized)? {
            return Ok(program);
        }

        warn!(plan_code, %normalized, "study plan did not resolve, using placeholder");
        self.placeholder_program()
    }

    fn lookup_program(&self, normalized: &str) -> Result<Option<Program>, RepositoryError> {
        if let Some(program) = self.repository.program_by_abbreviation(normalized)? {
            return Ok(Some(program));
        }
        self.repository.program_by_prefix(normalized)
    }

    /// Moves an enrollment off the placeholder once a resolvable code shows
    /// up. Returns `false` without mutating when the attempt bound is
    /// exceeded, the code is the placeholder's own, the code resolves to
    /// nothing, or the resolved target is itself the placeholder. Those
    /// skips are what keeps an unresolvable code from retrying forever.
    pub fn promote_from_placeholder(
        &self,
        enrollment_id: EnrollmentId,
        plan_code: &str,
        attempt: u32,
    ) -> Result<bool, RepositoryError> {
        if attempt > MAX_RESOLUTION_ATTEMPTS {
            warn!(
                enrollment = enrollment_id.0,
                plan_code, attempt, "promotion attempt bound exceeded"
            );
            return Ok(false);
        }

        let normalized = normalize_plan_code(plan_code);
        if normalized.is_empty() || normalized == PLACEHOLDER_PROGRAM_CODE {
            return Ok(false);
        }

        let Some(target) = self.lookup_program(&normalized)? else {
            debug!(
                enrollment = enrollment_id.0,
                plan_code, "promotion target did not resolve"
            );
            return Ok(false);
        };
        if target.is_placeholder() {
            return Ok(false);
        }

        let Some(enrollment) = self.repository.enrollment(enrollment_id)? else {
            return Err(RepositoryError::NotFound);
        };
        let placeholder = self.placeholder_program()?;
        if enrollment.program_id != placeholder.id {
            return Ok(false);
        }
        if self
            .repository
            .enrollment_for(enrollment.student_id, target.id)?
            .is_some()
        {
            return Ok(false);
        }

        self.repository
            .reassign_enrollment_program(enrollment_id, target.id)?;
        info!(
            enrollment = enrollment_id.0,
            program = %target.abbreviation,
            "enrollment promoted off the placeholder program"
        );
        Ok(true)
    }

    /// Exact match on the normalized code, else create with best-effort
    /// defaults from the row and the uploader as creator reference.
    pub fn find_or_create_student(
        &self,
        code: &str,
        details: StudentDetails,
        uploader: &UploaderId,
    ) -> Result<Student, RepositoryError> {
        if let Some(student) = self.repository.student_by_code(code)? {
            return Ok(student);
        }

        let trimmed_name = details.full_name.trim();
        let full_name = if trimmed_name.is_empty() {
            code.to_string()
        } else {
            trimmed_name.to_string()
        };

        self.repository.insert_student(NewStudent {
            code: code.to_string(),
            full_name,
            email: details.email,
            phone: details.phone,
            created_by: uploader.clone(),
        })
    }

    /// Exact match on (student, program), else create. A student sitting on
    /// the placeholder gets one depth-guarded promotion attempt before a
    /// second enrollment is created.
    pub fn find_or_create_enrollment(
        &self,
        student: &Student,
        program: &Program,
        plan_code: &str,
        terms: EnrollmentTerms,
    ) -> Result<Enrollment, RepositoryError> {
        if let Some(enrollment) = self.repository.enrollment_for(student.id, program.id)? {
            return Ok(enrollment);
        }

        if !program.is_placeholder() {
            if let Some(placeholder) = self
                .repository
                .program_by_abbreviation(PLACEHOLDER_PROGRAM_CODE)?
            {
                for enrollment in self.repository.enrollments_for_student(student.id)? {
                    if enrollment.program_id == placeholder.id
                        && self.promote_from_placeholder(enrollment.id, plan_code, 0)?
                    {
                        if let Some(promoted) = self.repository.enrollment(enrollment.id)? {
                            return Ok(promoted);
                        }
                    }
                }
            }
        }

        let end_date = terms
            .start_date
            .checked_add_months(Months::new(terms.duration_months))
            .unwrap_or(terms.start_date);

        self.repository.insert_enrollment(NewEnrollment {
            student_id: student.id,
            program_id: program.id,
            monthly_fee_cents: terms.monthly_fee_cents,
            duration_months: terms.duration_months,
            start_date: terms.start_date,
            end_date,
            total_investment_cents: terms.monthly_fee_cents
                * i64::from(terms.duration_months),
        })
    }
}
