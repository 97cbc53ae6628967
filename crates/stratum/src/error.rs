use super::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid hex in {field}: {source}"))]
    Hex {
        field: &'static str,
        source: hex::FromHexError,
    },
    #[snafu(display("{field} must decode to {expected} bytes, found {actual}"))]
    Length {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[snafu(display("malformed stratum message: {message}"))]
    Malformed { message: String },
}
