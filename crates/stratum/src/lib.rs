use {
    derive_more::Display,
    serde::{
        Deserialize, Serialize, Serializer,
        de::{self, Deserializer},
        ser::SerializeSeq,
    },
    serde_json::Value,
    serde_with::{DeserializeFromStr, SerializeDisplay},
    snafu::Snafu,
    std::{
        fmt::{self, Display, Formatter},
        str::FromStr,
    },
};

pub use {
    extranonce::Extranonce,
    message::Message,
    nbits::Nbits,
    nonce::Nonce,
    notify::Notify,
    ntime::Ntime,
};

#[cfg(feature = "client")]
pub use client::{Client, ClientConfig, ClientError, ClientResult, ConnectionState, EventReceiver};

#[cfg(feature = "client")]
pub use event::Event;

/// Minimum line length the read loop must tolerate, per the wire framing
/// requirement (large merkle branches can make a single `mining.notify`
/// line exceed tens of kilobytes).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

mod error;
mod extranonce;
mod message;
mod nbits;
mod nonce;
mod notify;
mod ntime;

#[cfg(feature = "client")]
mod client;

#[cfg(feature = "client")]
mod event;

pub use error::Error;

type Result<T, E = Error> = std::result::Result<T, E>;
