//! Output file checksums

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of raw bytes
///
/// ```
/// use immunization_etl::core::load::checksum::sha256_hex;
///
/// let checksum = sha256_hex(b"id_1,id_2,vaccine_group_name,vaccination_date\n");
/// assert_eq!(checksum.len(), 64);
/// ```
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_is_deterministic() {
        let data = b"1001,55501,MMR,2023-05-01\n";
        assert_eq!(sha256_hex(data), sha256_hex(data));
        assert_ne!(sha256_hex(data), sha256_hex(b"1001,55501,MMR,2023-05-02\n"));
    }
}
