use pgsession::config::parse_key_pairs;

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
    const BLOCK: &str = "ffeeddccbbaa99887766554433221100ffeeddccbbaa99887766554433221100";

    #[test]
    fn test_parses_signed_and_encrypted_pairs() {
        let pairs = parse_key_pairs(&format!("{HASH}:{BLOCK}, {HASH}")).unwrap();

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].hash_key.as_slice(), hex::decode(HASH).unwrap().as_slice());
        assert_eq!(
            pairs[0].block_key.as_deref().map(Vec::as_slice),
            Some(hex::decode(BLOCK).unwrap().as_slice())
        );
        assert!(pairs[1].block_key.is_none());
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(parse_key_pairs("").is_err());
        assert!(parse_key_pairs("zz").is_err());
        assert!(parse_key_pairs("0011").is_err());
        assert!(parse_key_pairs(&format!("{HASH}:0011")).is_err());
    }
}
