use super::*;

/// The job's compact target encoding, carried verbatim; decoding into an
/// actual target integer is the hash-primitives module's job, not the wire
/// codec's.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Nbits(pub u32);

impl Nbits {
    /// The four big-endian bytes as they appear on the wire / in the header.
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl Display for Nbits {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for Nbits {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|source| Error::Hex {
            field: "nbits",
            source,
        })?;

        if bytes.len() != 4 {
            return Err(Error::Length {
                field: "nbits",
                expected: 4,
                actual: bytes.len(),
            });
        }

        Ok(Self(u32::from_be_bytes(bytes.try_into().unwrap())))
    }
}

impl From<u32> for Nbits {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Nbits> for u32 {
    fn from(value: Nbits) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let nbits = Nbits(0x1d00ffff);
        assert_eq!(nbits.to_string(), "1d00ffff");
        assert_eq!("1d00ffff".parse::<Nbits>().unwrap(), nbits);
    }

    #[test]
    fn to_be_bytes_matches_wire_order() {
        assert_eq!(Nbits(0x1d00ffff).to_be_bytes(), [0x1d, 0x00, 0xff, 0xff]);
    }
}
