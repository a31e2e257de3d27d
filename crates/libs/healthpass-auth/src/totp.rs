//! Time-stepped HMAC credential derived from a `client-key` metadata entry.
//!
//! The credential is `TOTP <hex(HMAC-SHA256(secret, window))>` where `window`
//! is the current Unix time rounded down to a multiple of [`WINDOW_SECS`],
//! rendered as decimal text. The server recomputes the same value for the
//! current window.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

use crate::{MetadataEntry, AUTHORIZATION, CLIENT_KEY, CREDENTIAL_SCHEME, WINDOW_SECS};

/// Source of the current Unix time.
pub trait Clock: Send + Sync {
    fn now_unix_secs(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_secs(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs()).unwrap_or(0)
    }
}

/// Start of the window containing `now_unix_secs`.
pub fn time_window(now_unix_secs: u64) -> u64 {
    now_unix_secs - now_unix_secs % WINDOW_SECS
}

/// Hex HMAC-SHA256 of the decimal window under `secret`.
pub fn signature_for_window(secret: &str, window: u64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(window.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Rewrite `client-key` into an `Authorization` credential.
///
/// Without a `client-key` entry the input is returned untouched. Otherwise
/// every `client-key` and `authorization` entry is removed (keys compared
/// case-insensitively), the other entries keep their order, and the derived
/// credential is appended last. The first `client-key` entry supplies the
/// secret.
pub fn apply(entries: Vec<MetadataEntry>, now_unix_secs: u64) -> Vec<MetadataEntry> {
    let Some(secret) = entries
        .iter()
        .find(|entry| entry.is(CLIENT_KEY))
        .map(|entry| Zeroizing::new(entry.value.to_string()))
    else {
        return entries;
    };

    let window = time_window(now_unix_secs);
    let signature = signature_for_window(secret.as_str(), window);

    let mut rewritten: Vec<MetadataEntry> = entries
        .into_iter()
        .filter(|entry| !entry.is(CLIENT_KEY) && !entry.is(AUTHORIZATION))
        .collect();

    log::debug!("auth: derived credential for window {window}");
    rewritten.push(MetadataEntry::new(AUTHORIZATION, format!("{CREDENTIAL_SCHEME} {signature}")));
    rewritten
}

/// [`apply`] at the time reported by `clock`.
pub fn apply_with_clock(entries: Vec<MetadataEntry>, clock: &dyn Clock) -> Vec<MetadataEntry> {
    apply(entries, clock.now_unix_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetadataValue;

    const NOW: u64 = 1_700_000_017;

    fn credential(entries: &[MetadataEntry]) -> Option<String> {
        entries.iter().find(|entry| entry.is(AUTHORIZATION)).map(|entry| entry.value.to_string())
    }

    #[test]
    fn window_rounds_down_to_thirty_seconds() {
        assert_eq!(time_window(1_700_000_017), 1_700_000_010);
        assert_eq!(time_window(1_700_000_010), 1_700_000_010);
        assert_eq!(time_window(29), 0);
        assert_eq!(time_window(0), 0);
    }

    #[test]
    fn signature_matches_rfc4231_case_two() {
        let mut mac = Hmac::<Sha256>::new_from_slice(b"Jefe").expect("hmac key");
        mac.update(b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac.finalize().into_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn signature_known_answer() {
        assert_eq!(
            signature_for_window("s3cr3t", 1_700_000_010),
            "f06bb2205876d0c6fa3896a1a690d471bcddedc6b9b4ed0e56637fef22169283"
        );
    }

    #[test]
    fn empty_secret_still_signs() {
        let signature = signature_for_window("", 0);
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn no_client_key_is_noop_and_idempotent() {
        let entries = vec![
            MetadataEntry::new("x-tenant", "acme"),
            MetadataEntry::new("Authorization", "Bearer keep-me"),
        ];
        let once = apply(entries.clone(), NOW);
        let twice = apply(once.clone(), NOW);
        assert_eq!(once, entries);
        assert_eq!(twice, entries);
    }

    #[test]
    fn replaces_client_key_and_existing_authorization() {
        let entries = vec![
            MetadataEntry::new("client-key", "s3cr3t"),
            MetadataEntry::new("Authorization", "Bearer old"),
        ];
        let rewritten = apply(entries, NOW);
        assert_eq!(
            rewritten,
            vec![MetadataEntry::new(
                "Authorization",
                "TOTP f06bb2205876d0c6fa3896a1a690d471bcddedc6b9b4ed0e56637fef22169283"
            )]
        );
    }

    #[test]
    fn keeps_other_entries_in_order_and_appends_credential() {
        let entries = vec![
            MetadataEntry::new("x-a", "1"),
            MetadataEntry::new("CLIENT-KEY", "first"),
            MetadataEntry::new("x-b", true),
            MetadataEntry::new("authorization", "Basic zzz"),
            MetadataEntry::new("client-key", "second"),
            MetadataEntry::new("x-c", 3),
        ];
        let rewritten = apply(entries, NOW);
        let keys: Vec<&str> = rewritten.iter().map(|entry| entry.key.as_str()).collect();
        assert_eq!(keys, vec!["x-a", "x-b", "x-c", "Authorization"]);
        let expected = signature_for_window("first", time_window(NOW));
        assert_eq!(credential(&rewritten), Some(format!("TOTP {expected}")));
    }

    #[test]
    fn numeric_secret_is_stringified() {
        let entries = vec![MetadataEntry::new("client-key", 12345)];
        let rewritten = apply(entries, NOW);
        let expected = signature_for_window("12345", time_window(NOW));
        assert_eq!(credential(&rewritten), Some(format!("TOTP {expected}")));
    }

    #[test]
    fn same_window_same_credential_next_window_differs() {
        let entries = vec![MetadataEntry::new("client-key", "s3cr3t")];
        let a = credential(&apply(entries.clone(), 1_700_000_010));
        let b = credential(&apply(entries.clone(), 1_700_000_039));
        let c = credential(&apply(entries, 1_700_000_040));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn clock_is_injected() {
        struct Fixed(u64);
        impl Clock for Fixed {
            fn now_unix_secs(&self) -> u64 {
                self.0
            }
        }
        let entries = vec![MetadataEntry::new("client-key", MetadataValue::Bool(true))];
        let from_clock = apply_with_clock(entries.clone(), &Fixed(NOW));
        assert_eq!(from_clock, apply(entries, NOW));
    }
}
