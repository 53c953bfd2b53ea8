//! Callback signing: deterministic serialization of a callback's
//! identifying fields, signed with ECDSA/SECP256k1/SHA-256 (§4.10).

use secp256k1::{
    ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// The fields that make up the signature input, in the fixed order the
/// wire format requires. There are no delimiters between fields — the
/// concatenation relies on each field's own lexical form being
/// unambiguous (an id is never a prefix of a date, etc).
pub struct SignableFields<'a> {
    pub id: &'a str,
    pub created_iso8601: &'a str,
    pub txid_hex: &'a str,
    pub address_base58: &'a str,
    pub amount: i64,
}

impl SignableFields<'_> {
    fn serialize(&self) -> Vec<u8> {
        format!(
            "{}{}{}{}{}",
            self.id, self.created_iso8601, self.txid_hex, self.address_base58, self.amount
        )
        .into_bytes()
    }

    fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.serialize()).into()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("invalid secret key")]
    InvalidKey,
}

/// Signs the callback's identifying fields, returning a URL-safe
/// base64-encoded signature suitable for the JSON payload's
/// `signature` field.
pub fn sign_callback(sk: &SecretKey, fields: &SignableFields<'_>) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let secp = Secp256k1::signing_only();
    let msg = Message::from_digest(fields.digest());
    let sig = secp.sign_ecdsa(&msg, sk);
    URL_SAFE_NO_PAD.encode(sig.serialize_compact())
}

/// Recomputes the serialization and verifies `signature` against it.
/// Any malformed base64/signature is treated as a failed verification,
/// not an error — callers only care whether the callback is authentic.
pub fn verify_callback(pk: &PublicKey, fields: &SignableFields<'_>, signature: &str) -> bool {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let Ok(raw) = URL_SAFE_NO_PAD.decode(signature) else {
        return false;
    };
    let Ok(sig) = Signature::from_compact(&raw) else {
        return false;
    };

    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest(fields.digest());
    secp.verify_ecdsa(&msg, &sig, pk).is_ok()
}

#[cfg(test)]
mod tests {
    use secp256k1::{rand::rngs::OsRng, Secp256k1};

    use super::*;

    #[test]
    fn signature_round_trip() {
        let secp = Secp256k1::new();
        let (sk, pk) = secp.generate_keypair(&mut OsRng);

        let fields = SignableFields {
            id: "abc123",
            created_iso8601: "2026-07-27T00:00:00",
            txid_hex: "deadbeef",
            address_base58: "n2SjiX7ZvKZc1qQaMTzX7",
            amount: 12,
        };

        let sig = sign_callback(&sk, &fields);
        assert!(verify_callback(&pk, &fields, &sig));

        let tampered = SignableFields {
            amount: 13,
            ..fields
        };
        assert!(!verify_callback(&pk, &tampered, &sig));
    }
}
