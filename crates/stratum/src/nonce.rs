use super::*;

/// The 32-bit header nonce a worker searches over.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Nonce(pub u32);

impl Display for Nonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for Nonce {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|source| Error::Hex {
            field: "nonce",
            source,
        })?;

        if bytes.len() != 4 {
            return Err(Error::Length {
                field: "nonce",
                expected: 4,
                actual: bytes.len(),
            });
        }

        Ok(Self(u32::from_be_bytes(bytes.try_into().unwrap())))
    }
}

impl From<u32> for Nonce {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Nonce> for u32 {
    fn from(value: Nonce) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for value in [0u32, 1, 0xdead_beef, u32::MAX] {
            let nonce = Nonce(value);
            let hex = nonce.to_string();
            assert_eq!(hex.parse::<Nonce>().unwrap(), nonce);
        }
    }

    #[test]
    fn display_is_lowercase_eight_hex_digits() {
        assert_eq!(Nonce(0xABCDEF01).to_string(), "abcdef01");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("abcd".parse::<Nonce>().is_err());
        assert!("abcdef0123".parse::<Nonce>().is_err());
    }

    #[test]
    fn rejects_non_hex() {
        assert!("zzzzzzzz".parse::<Nonce>().is_err());
    }
}
