//! On-chain Token Metadata accounts.
//!
//! The metadata of a mint lives in a program-derived account of the Token
//! Metadata program, seeded by `["metadata", program_id, mint]`.

use anyhow::{Context, Result, anyhow};
use base64::{Engine, engine::general_purpose::STANDARD};
use borsh::BorshDeserialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

pub const TOKEN_METADATA_PROGRAM_ID: &str = "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s";

/// Leading fields of a metadata account. Everything after `uri` is ignored.
#[derive(Debug, BorshDeserialize)]
struct MetadataHeader {
    _key: u8,
    _update_authority: [u8; 32],
    mint: [u8; 32],
    name: String,
    symbol: String,
    _uri: String,
}

/// Name and symbol as stored on chain, NUL padding removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainMetadata {
    pub mint: Pubkey,
    pub name: String,
    pub symbol: String,
}

pub fn metadata_pda(mint: &str) -> Result<Pubkey> {
    let mint = Pubkey::from_str(mint).map_err(|e| anyhow!("invalid mint {mint}: {e}"))?;
    let program = Pubkey::from_str(TOKEN_METADATA_PROGRAM_ID)
        .map_err(|e| anyhow!("invalid metadata program id: {e}"))?;
    let seeds = &[b"metadata".as_ref(), program.as_ref(), mint.as_ref()];
    let (pda, _bump) = Pubkey::find_program_address(seeds, &program);
    Ok(pda)
}

fn trim_padding(s: &str) -> String {
    s.trim_end_matches('\0').trim().to_string()
}

pub fn parse_metadata_account(data: &[u8]) -> Result<OnChainMetadata> {
    let mut buf = data;
    let header = MetadataHeader::deserialize(&mut buf).context("decoding metadata account")?;
    Ok(OnChainMetadata {
        mint: Pubkey::new_from_array(header.mint),
        name: trim_padding(&header.name),
        symbol: trim_padding(&header.symbol),
    })
}

/// Raw bytes of a base64 `getAccountInfo` result; `None` when the account
/// does not exist.
pub fn account_data(result: &Value) -> Option<Vec<u8>> {
    let data = result.get("value")?.get("data")?;
    let encoded = match data {
        Value::Array(parts) => {
            if parts.get(1).and_then(|e| e.as_str()) != Some("base64") {
                return None;
            }
            parts.first()?.as_str()?
        }
        Value::String(s) => s.as_str(),
        _ => return None,
    };
    STANDARD.decode(encoded).ok()
}
