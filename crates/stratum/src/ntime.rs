use super::*;

/// The job's `ntime` field, passed through verbatim into the header.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Ntime(pub u32);

impl Display for Ntime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for Ntime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|source| Error::Hex {
            field: "ntime",
            source,
        })?;

        if bytes.len() != 4 {
            return Err(Error::Length {
                field: "ntime",
                expected: 4,
                actual: bytes.len(),
            });
        }

        Ok(Self(u32::from_be_bytes(bytes.try_into().unwrap())))
    }
}

impl From<u32> for Ntime {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Ntime> for u32 {
    fn from(value: Ntime) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let ntime = Ntime(0x504e86b9);
        assert_eq!(ntime.to_string(), "504e86b9");
        assert_eq!("504e86b9".parse::<Ntime>().unwrap(), ntime);
    }

    #[test]
    fn rejects_short_input() {
        assert!("86b9".parse::<Ntime>().is_err());
    }
}
