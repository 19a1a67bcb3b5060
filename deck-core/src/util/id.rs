use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam::atomic::AtomicCell;
use lazy_static::lazy_static;
use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub type IdBytes = [u8; 12];

pub static ID_COUNTER: AtomicCell<u32> = AtomicCell::new(0);

lazy_static! {
    /// Random bytes unique to this process, shared by every id it creates.
    static ref PROCESS_UNIQUE: [u8; 5] = rand::thread_rng().gen();
}

/// A stable 12-byte identifier for a persisted document.
///
/// The layout is 4 bytes of big-endian unix seconds, 5 process-unique bytes and
/// a 3 byte counter, so ids created by one process sort by creation order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Id {
    bytes: IdBytes,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("Id must be 24 hex characters, got {0}")]
    InvalidLength(usize),
    #[error("Id contains a non-hex character")]
    InvalidCharacter,
}

impl Id {
    /// Creates a new id.
    pub fn new() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();

        let count = ID_COUNTER.fetch_add(1) & 0x00ff_ffff;

        let mut bytes = [0; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);

        Self { bytes }
    }

    /// Returns an empty id.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: IdBytes) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> IdBytes {
        self.bytes
    }

    pub fn is_none(&self) -> bool {
        self.bytes == [0; 12]
    }

    /// The unix timestamp in seconds embedded in the id.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]])
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 {
            return Err(IdError::InvalidLength(s.len()));
        }

        let mut bytes = [0; 12];

        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = s.get(i * 2..i * 2 + 2).ok_or(IdError::InvalidCharacter)?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| IdError::InvalidCharacter)?;
        }

        Ok(Self { bytes })
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.bytes {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
