//! Known trading venues, keyed by on-chain program id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wrapped SOL mint, used to label native lamport changes.
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Decimal exponent of the native asset (lamports per SOL = 10^9).
pub const SOL_DECIMALS: u8 = 9;

pub const RAYDIUM_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const JUPITER_PROGRAM_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";
pub const PUMPFUN_PROGRAM_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
pub const METEORA_DLMM_PROGRAM_ID: &str = "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo";
pub const METEORA_POOL_PROGRAM_ID: &str = "Eo7WjKq67rjJQSZxS6z3YkapzY3eMj6Xy8X5EQVn5UaB";

/// Name reported for program ids outside the allowlist.
pub const UNKNOWN_VENUE: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    Raydium,
    Jupiter,
    PumpFun,
    MeteoraDlmm,
    MeteoraPool,
}

impl Venue {
    pub const ALL: [Venue; 5] = [
        Venue::Raydium,
        Venue::Jupiter,
        Venue::PumpFun,
        Venue::MeteoraDlmm,
        Venue::MeteoraPool,
    ];

    pub fn program_id(&self) -> &'static str {
        match self {
            Venue::Raydium => RAYDIUM_PROGRAM_ID,
            Venue::Jupiter => JUPITER_PROGRAM_ID,
            Venue::PumpFun => PUMPFUN_PROGRAM_ID,
            Venue::MeteoraDlmm => METEORA_DLMM_PROGRAM_ID,
            Venue::MeteoraPool => METEORA_POOL_PROGRAM_ID,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Raydium => "RAYDIUM",
            Venue::Jupiter => "JUPITER",
            Venue::PumpFun => "PUMPFUN",
            Venue::MeteoraDlmm => "METEORADLMM",
            Venue::MeteoraPool => "METEORAPOOL",
        }
    }

    pub fn from_program_id(program_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.program_id() == program_id)
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reverse lookup of a program id; unknown ids map to `"Unknown"`.
pub fn venue_name(program_id: &str) -> &'static str {
    Venue::from_program_id(program_id)
        .map(|v| v.as_str())
        .unwrap_or(UNKNOWN_VENUE)
}

/// First program id (in the given order) that belongs to the allowlist.
pub fn first_venue_program(program_ids: &[String]) -> Option<&str> {
    program_ids
        .iter()
        .map(|p| p.as_str())
        .find(|p| Venue::from_program_id(p).is_some())
}

pub fn is_native(mint: &str) -> bool {
    mint == SOL_MINT
}
