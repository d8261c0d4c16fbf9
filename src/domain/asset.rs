use alloy::primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Asset identifier (venue-side token address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub Address);

impl AssetId {
    pub const ZERO: AssetId = AssetId(Address::ZERO);

    pub fn is_zero(&self) -> bool {
        self.0 == Address::ZERO
    }
}

impl From<Address> for AssetId {
    fn from(addr: Address) -> Self {
        AssetId(addr)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction relative to the pair's base asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Buy base, spend quote
    Buy,
    /// Sell base, receive quote
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    /// The asset a round trip in this direction must be funded with.
    pub fn funding_asset(&self, pair: &PairKey) -> AssetId {
        match self {
            Direction::Buy => pair.quote,
            Direction::Sell => pair.base,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Venue pair key: base/quote assets plus the pool fee tier.
///
/// Ledger and balance maps key on this; `id()` derives the opaque 32-byte
/// identifier used when talking to external systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub base: AssetId,
    pub quote: AssetId,
    pub fee_bps: u32,
}

impl PairKey {
    pub fn new(base: impl Into<AssetId>, quote: impl Into<AssetId>, fee_bps: u32) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
            fee_bps,
        }
    }

    /// Opaque 32-byte identifier derived from the pair fields.
    pub fn id(&self) -> B256 {
        let mut buf = [0u8; 44];
        buf[..20].copy_from_slice(self.base.0.as_slice());
        buf[20..40].copy_from_slice(self.quote.0.as_slice());
        buf[40..44].copy_from_slice(&self.fee_bps.to_be_bytes());
        keccak256(buf)
    }

    /// Short hex form of `id()` for logs.
    pub fn short_id(&self) -> String {
        let id = self.id();
        format!("0x{}", hex_prefix(id.as_slice(), 4))
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_id())
    }
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes
        .iter()
        .take(n)
        .map(|b| format!("{:02x}", b))
        .collect()
}
