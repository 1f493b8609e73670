//! Secure-ranging passphrase fill-in: translates the SSID first, then looks the result
//! up keyed on the AKM-derived security type.

use rtt_ranging_types::{CredentialStore, RangingRequest};

/// Strips the quoting Android (and this crate's callers) wrap a raw SSID in before using
/// it as a credential-store key.
pub fn translate_ssid(raw: &str) -> String {
    raw.trim_matches('"').to_string()
}

pub fn fill_passphrase(request: &mut RangingRequest, credentials: &dyn CredentialStore) {
    for responder in request.responders.iter_mut() {
        let Some(secure) = responder.secure_config.as_mut() else {
            continue;
        };
        if secure.password.is_some() {
            continue;
        }
        let Some(ssid) = secure.ssid.as_deref() else {
            continue;
        };
        let security_type = secure.akm.security_type();
        let translated = translate_ssid(ssid);
        secure.password = credentials.lookup(&translated, security_type);
    }
}
