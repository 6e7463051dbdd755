use super::common::*;
use crate::workflows::kardex::domain::InstallmentStatus;
use crate::workflows::kardex::repository::KardexRepository;
use crate::workflows::kardex::schedule::{
    generate_schedule_if_absent, match_pending_installment, ScheduleOutcome,
};
use chrono::NaiveDate;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 5).expect("valid date")
}

#[test]
fn schedules_step_one_month_per_installment() {
    let (resolver, repository) = build_resolver();
    let mba = seed_program(&repository, "MBA", "Maestría en Administración de Negocios");
    let student = seed_student(&repository, "A1");
    let enrollment = resolver
        .find_or_create_enrollment(&student, &mba, "MBA", enrollment_terms())
        .expect("enrollment resolves");

    let outcome = generate_schedule_if_absent(repository.as_ref(), &enrollment, 80_000, 12, start())
        .expect("generation runs");
    assert_eq!(outcome, ScheduleOutcome::Created(12));

    let mut installments = repository
        .installments_for(enrollment.id)
        .expect("lookup works");
    installments.sort_by_key(|installment| installment.sequence);

    assert_eq!(installments.len(), 12);
    assert_eq!(
        installments
            .iter()
            .map(|installment| installment.sequence)
            .collect::<Vec<_>>(),
        (1..=12).collect::<Vec<_>>()
    );
    assert_eq!(installments[0].due_date, start());
    assert_eq!(
        installments[3].due_date,
        NaiveDate::from_ymd_opt(2022, 4, 5).expect("valid date")
    );
    assert!(installments.iter().all(|installment| {
        installment.amount_cents == 80_000 && installment.status == InstallmentStatus::Pending
    }));
}

#[test]
fn generation_is_idempotent_outside_full_replace() {
    let (resolver, repository) = build_resolver();
    let mba = seed_program(&repository, "MBA", "Maestría en Administración de Negocios");
    let student = seed_student(&repository, "A1");
    let enrollment = resolver
        .find_or_create_enrollment(&student, &mba, "MBA", enrollment_terms())
        .expect("enrollment resolves");

    let first = generate_schedule_if_absent(repository.as_ref(), &enrollment, 80_000, 12, start())
        .expect("generation runs");
    let second = generate_schedule_if_absent(repository.as_ref(), &enrollment, 80_000, 12, start())
        .expect("generation runs");

    assert_eq!(first.created(), 12);
    assert_eq!(second, ScheduleOutcome::AlreadyScheduled);
    assert_eq!(second.created(), 0);
    assert_eq!(
        repository
            .installments_for(enrollment.id)
            .expect("lookup works")
            .len(),
        12
    );
}

#[test]
fn invalid_terms_create_nothing() {
    let (resolver, repository) = build_resolver();
    let mba = seed_program(&repository, "MBA", "Maestría en Administración de Negocios");
    let student = seed_student(&repository, "A1");
    let enrollment = resolver
        .find_or_create_enrollment(&student, &mba, "MBA", enrollment_terms())
        .expect("enrollment resolves");

    let zero_fee = generate_schedule_if_absent(repository.as_ref(), &enrollment, 0, 12, start())
        .expect("generation runs");
    let zero_count =
        generate_schedule_if_absent(repository.as_ref(), &enrollment, 80_000, 0, start())
            .expect("generation runs");

    assert_eq!(zero_fee, ScheduleOutcome::InvalidTerms);
    assert_eq!(zero_count, ScheduleOutcome::InvalidTerms);
    assert!(repository
        .installments_for(enrollment.id)
        .expect("lookup works")
        .is_empty());
}

#[test]
fn matching_picks_the_earliest_pending_due_on_or_before_the_payment_month() {
    let (resolver, repository) = build_resolver();
    let mba = seed_program(&repository, "MBA", "Maestría en Administración de Negocios");
    let student = seed_student(&repository, "A1");
    let enrollment = resolver
        .find_or_create_enrollment(&student, &mba, "MBA", enrollment_terms())
        .expect("enrollment resolves");
    generate_schedule_if_absent(repository.as_ref(), &enrollment, 80_000, 12, start())
        .expect("generation runs");

    let paid_in_march = NaiveDate::from_ymd_opt(2022, 3, 20).expect("valid date");
    let matched = match_pending_installment(repository.as_ref(), enrollment.id, paid_in_march)
        .expect("matching runs")
        .expect("an installment matches");
    assert_eq!(matched.sequence, 1);

    repository
        .mark_installment_paid(matched.id)
        .expect("mark paid works");
    let next = match_pending_installment(repository.as_ref(), enrollment.id, paid_in_march)
        .expect("matching runs")
        .expect("an installment matches");
    assert_eq!(next.sequence, 2);
}

#[test]
fn payments_before_the_first_due_month_match_nothing() {
    let (resolver, repository) = build_resolver();
    let mba = seed_program(&repository, "MBA", "Maestría en Administración de Negocios");
    let student = seed_student(&repository, "A1");
    let enrollment = resolver
        .find_or_create_enrollment(&student, &mba, "MBA", enrollment_terms())
        .expect("enrollment resolves");
    generate_schedule_if_absent(repository.as_ref(), &enrollment, 80_000, 12, start())
        .expect("generation runs");

    let before_schedule = NaiveDate::from_ymd_opt(2021, 12, 31).expect("valid date");
    let matched = match_pending_installment(repository.as_ref(), enrollment.id, before_schedule)
        .expect("matching runs");
    assert!(matched.is_none());
}
