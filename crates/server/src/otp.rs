//! In-memory one-time-password records keyed by e-mail address.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct OtpRecord {
    pub otp: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    /// Failed verification attempts.
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("OTP not found")]
    NotFound,
    #[error("OTP has expired")]
    Expired,
    #[error("OTP already used")]
    AlreadyUsed,
    #[error("Invalid OTP")]
    Mismatch,
}

/// Addresses are compared case-insensitively.
fn key(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct OtpStore {
    ttl: Duration,
    records: Mutex<HashMap<String, OtpRecord>>,
}

impl OtpStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Record a freshly sent code, replacing any earlier one for the address.
    ///
    /// Records past their expiry, verified or not, are swept at the same
    /// time. A verified record stays until then so reuse reports
    /// [`VerifyError::AlreadyUsed`].
    pub fn issue(&self, email: &str, otp: &str, now: DateTime<Utc>) -> OtpRecord {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let record = OtpRecord {
            otp: otp.to_string(),
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            verified: false,
            verified_at: None,
            attempts: 0,
        };
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| r.expires_at >= now);
        if records.len() != before {
            tracing::debug!("swept {} expired OTP records", before - records.len());
        }
        records.insert(key(email), record.clone());
        record
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check `otp` against the stored code. Expired records are removed; a
    /// wrong code counts as a failed attempt.
    pub fn verify(&self, email: &str, otp: &str, now: DateTime<Utc>) -> Result<(), VerifyError> {
        let key = key(email);
        let mut records = self.records.lock();
        let record = records.get_mut(&key).ok_or(VerifyError::NotFound)?;

        if now > record.expires_at {
            records.remove(&key);
            return Err(VerifyError::Expired);
        }
        if record.verified {
            return Err(VerifyError::AlreadyUsed);
        }
        if record.otp != otp {
            record.attempts += 1;
            return Err(VerifyError::Mismatch);
        }

        record.verified = true;
        record.verified_at = Some(now);
        Ok(())
    }

    pub fn get(&self, email: &str) -> Option<OtpRecord> {
        self.records.lock().get(&key(email)).cloned()
    }

    #[cfg(test)]
    pub(crate) fn insert(&self, email: &str, record: OtpRecord) {
        self.records.lock().insert(key(email), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> OtpStore {
        OtpStore::new(Duration::from_secs(600))
    }

    #[test]
    fn correct_code_verifies_once() {
        let store = store();
        let now = Utc::now();
        store.issue("Ann@Example.com", "123456", now);

        assert_eq!(store.verify("ann@example.com ", "123456", now), Ok(()));
        let record = store.get("ann@example.com").unwrap();
        assert!(record.verified);
        assert_eq!(record.verified_at, Some(now));

        assert_eq!(
            store.verify("ann@example.com", "123456", now),
            Err(VerifyError::AlreadyUsed)
        );
    }

    #[test]
    fn wrong_code_counts_attempts() {
        let store = store();
        let now = Utc::now();
        store.issue("a@b.co", "111111", now);

        assert_eq!(store.verify("a@b.co", "222222", now), Err(VerifyError::Mismatch));
        assert_eq!(store.verify("a@b.co", "333333", now), Err(VerifyError::Mismatch));
        assert_eq!(store.get("a@b.co").unwrap().attempts, 2);

        assert_eq!(store.verify("a@b.co", "111111", now), Ok(()));
    }

    #[test]
    fn expired_code_is_removed() {
        let store = store();
        let issued = Utc::now();
        store.issue("a@b.co", "111111", issued);

        let later = issued + chrono::Duration::seconds(601);
        assert_eq!(store.verify("a@b.co", "111111", later), Err(VerifyError::Expired));
        assert_eq!(store.get("a@b.co"), None);
        assert_eq!(store.verify("a@b.co", "111111", later), Err(VerifyError::NotFound));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let store = store();
        let issued = Utc::now();
        let record = store.issue("a@b.co", "111111", issued);
        assert_eq!(store.verify("a@b.co", "111111", record.expires_at), Ok(()));
    }

    #[test]
    fn reissue_resets_the_record() {
        let store = store();
        let now = Utc::now();
        store.issue("a@b.co", "111111", now);
        store.verify("a@b.co", "000000", now).unwrap_err();
        store.verify("a@b.co", "111111", now).unwrap();

        store.issue("a@b.co", "222222", now);
        let record = store.get("a@b.co").unwrap();
        assert_eq!(record.attempts, 0);
        assert!(!record.verified);
        assert_eq!(store.verify("a@b.co", "222222", now), Ok(()));
    }

    #[test]
    fn issuing_sweeps_expired_records() {
        let store = store();
        let issued = Utc::now();
        store.issue("used@b.co", "111111", issued);
        store.verify("used@b.co", "111111", issued).unwrap();
        store.issue("abandoned@b.co", "222222", issued);
        store.issue("fresh@b.co", "333333", issued + chrono::Duration::seconds(300));
        assert_eq!(store.len(), 3);

        store.issue("new@b.co", "444444", issued + chrono::Duration::seconds(601));
        assert_eq!(store.get("used@b.co"), None);
        assert_eq!(store.get("abandoned@b.co"), None);
        assert!(store.get("fresh@b.co").is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn unknown_address() {
        assert_eq!(
            store().verify("nobody@b.co", "1", Utc::now()),
            Err(VerifyError::NotFound)
        );
    }
}
