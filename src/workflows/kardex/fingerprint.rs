//! Dedup identities for payments and their attached receipt files.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::domain::EnrollmentId;

/// Deterministic identity of a payment: SHA-256 over the ordered tuple
/// `bank|receipt|enrollment|date`. The enrollment id is part of the tuple
/// because two students can legitimately deposit against the same bank and
/// receipt number (shared deposit slips); without it those rows collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentFingerprint(String);

impl PaymentFingerprint {
    pub fn compute(
        bank: &str,
        receipt: &str,
        enrollment: EnrollmentId,
        paid_on: NaiveDate,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bank.as_bytes());
        hasher.update(b"|");
        hasher.update(receipt.as_bytes());
        hasher.update(b"|");
        hasher.update(enrollment.0.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(paid_on.format("%Y-%m-%d").to_string().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// SHA-256 hex of an attached receipt image or PDF.
pub fn hash_receipt_file(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 1).expect("valid date")
    }

    #[test]
    fn identical_inputs_yield_identical_fingerprints() {
        let a = PaymentFingerprint::compute("BANCO INDUSTRIAL", "545109", EnrollmentId(7), sample_date());
        let b = PaymentFingerprint::compute("BANCO INDUSTRIAL", "545109", EnrollmentId(7), sample_date());
        assert_eq!(a, b);
    }

    #[test]
    fn each_tuple_element_is_significant() {
        let base = PaymentFingerprint::compute("BANCO INDUSTRIAL", "545109", EnrollmentId(7), sample_date());

        let other_bank =
            PaymentFingerprint::compute("BANRURAL", "545109", EnrollmentId(7), sample_date());
        let other_receipt =
            PaymentFingerprint::compute("BANCO INDUSTRIAL", "545110", EnrollmentId(7), sample_date());
        let other_enrollment =
            PaymentFingerprint::compute("BANCO INDUSTRIAL", "545109", EnrollmentId(8), sample_date());
        let other_date = PaymentFingerprint::compute(
            "BANCO INDUSTRIAL",
            "545109",
            EnrollmentId(7),
            NaiveDate::from_ymd_opt(2022, 1, 2).expect("valid date"),
        );

        for variant in [other_bank, other_receipt, other_enrollment, other_date] {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn shared_receipts_across_enrollments_never_collide() {
        let first = PaymentFingerprint::compute("BANRURAL", "1740192", EnrollmentId(1), sample_date());
        let second = PaymentFingerprint::compute("BANRURAL", "1740192", EnrollmentId(2), sample_date());
        assert_ne!(first, second);
    }

    #[test]
    fn file_hash_is_content_addressed() {
        let first = hash_receipt_file(b"boleta.pdf bytes");
        let second = hash_receipt_file(b"boleta.pdf bytes");
        let different = hash_receipt_file(b"other bytes");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 64);
    }
}
