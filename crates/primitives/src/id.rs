use uuid::Uuid;

/// Generates a fresh callback id: two UUIDv4s concatenated as URL-safe
/// base64 and truncated to 22 characters. Collision probability is
/// negligible and irrelevant to correctness since ids are never reused
/// across callbacks (§4.4).
pub fn new_callback_id() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let mut bytes = [0u8; 32];
    bytes[..16].copy_from_slice(Uuid::new_v4().as_bytes());
    bytes[16..].copy_from_slice(Uuid::new_v4().as_bytes());

    let encoded = URL_SAFE_NO_PAD.encode(bytes);
    encoded.chars().take(22).collect()
}

#[cfg(test)]
mod test {
    use super::new_callback_id;

    #[test]
    fn ids_are_22_chars_and_unique() {
        let a = new_callback_id();
        let b = new_callback_id();
        assert_eq!(a.len(), 22);
        assert_eq!(b.len(), 22);
        assert_ne!(a, b);
    }
}
