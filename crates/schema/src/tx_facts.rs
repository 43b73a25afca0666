//! TxFacts: pre-computed transaction facts for pure parsing.
//!
//! A fetched transaction JSON is read once into `TxFacts`; the balance-diff
//! engine and the trade classifier then work on this struct without touching
//! JSON or the network.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alt_resolver::{AccountKey, find_signer, outer_program_ids, resolve_account_keys};

/// Token balance snapshot for one token account, before or after a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Account index in the transaction
    pub account_index: u32,

    /// Token mint address
    pub mint: String,

    /// Owner of the token account
    pub owner: Option<String>,

    /// Amount in base units (SPL amounts are u64)
    pub amount: u64,

    /// Decimals
    pub decimals: u8,
}

/// Which side of the transaction a balance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceSide {
    Pre,
    Post,
}

/// Pre-computed facts about a transaction.
#[derive(Debug, Clone)]
pub struct TxFacts {
    /// Transaction signature
    pub signature: String,

    /// Slot number
    pub slot: u64,

    /// Block timestamp (Unix seconds)
    pub block_time: Option<i64>,

    /// Whether a `meta` block was present
    pub has_meta: bool,

    /// Whether the transaction succeeded
    pub is_success: bool,

    /// Full account keys with signer flags
    pub account_keys: Vec<AccountKey>,

    /// Program id of each top-level instruction, in order
    pub outer_program_ids: Vec<String>,

    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,

    /// Lamport balances, indexed like `account_keys`
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
}

impl TxFacts {
    /// Extract all facts from a `getTransaction` result.
    pub fn from_json(tx: &Value) -> Self {
        let signature = tx
            .pointer("/transaction/signatures/0")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let slot = tx.get("slot").and_then(|v| v.as_u64()).unwrap_or(0);
        let block_time = tx.get("blockTime").and_then(|v| v.as_i64());

        let has_meta = tx.get("meta").map(|m| m.is_object()).unwrap_or(false);
        let is_success = tx.pointer("/meta/err").map(|e| e.is_null()).unwrap_or(false);

        let account_keys = resolve_account_keys(tx);
        let outer_program_ids = outer_program_ids(tx, &account_keys);

        Self {
            signature,
            slot,
            block_time,
            has_meta,
            is_success,
            outer_program_ids,
            pre_token_balances: Self::parse_token_balances(tx, "/meta/preTokenBalances"),
            post_token_balances: Self::parse_token_balances(tx, "/meta/postTokenBalances"),
            pre_balances: Self::parse_lamports(tx, "/meta/preBalances"),
            post_balances: Self::parse_lamports(tx, "/meta/postBalances"),
            account_keys,
        }
    }

    fn parse_token_balances(tx: &Value, path: &str) -> Vec<TokenBalance> {
        let balances = match tx.pointer(path).and_then(|v| v.as_array()) {
            Some(arr) => arr,
            None => return Vec::new(),
        };

        balances
            .iter()
            .filter_map(|b| {
                let account_index = b.get("accountIndex")?.as_u64()? as u32;
                let mint = b.get("mint")?.as_str()?.to_string();
                let owner = b.get("owner").and_then(|v| v.as_str()).map(|s| s.to_string());
                // uiTokenAmount.amount is a string integer in base units
                let amount = b
                    .pointer("/uiTokenAmount/amount")
                    .and_then(|v| v.as_str())
                    .unwrap_or("0")
                    .parse::<u64>()
                    .ok()?;
                let decimals = b
                    .pointer("/uiTokenAmount/decimals")
                    .and_then(|v| v.as_u64())
                    .and_then(|d| u8::try_from(d).ok())
                    .unwrap_or(0);

                Some(TokenBalance {
                    account_index,
                    mint,
                    owner,
                    amount,
                    decimals,
                })
            })
            .collect()
    }

    fn parse_lamports(tx: &Value, path: &str) -> Vec<u64> {
        tx.pointer(path)
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().map(|v| v.as_u64().unwrap_or(0)).collect())
            .unwrap_or_default()
    }

    /// The authorizing signer (first signing key) and its account index.
    pub fn signer(&self) -> Option<(usize, &str)> {
        find_signer(&self.account_keys)
    }

    /// Token balances on one side owned by `owner`.
    pub fn token_balances_for_owner(&self, side: BalanceSide, owner: &str) -> Vec<&TokenBalance> {
        let balances = match side {
            BalanceSide::Pre => &self.pre_token_balances,
            BalanceSide::Post => &self.post_token_balances,
        };
        balances
            .iter()
            .filter(|b| b.owner.as_deref() == Some(owner))
            .collect()
    }

    /// Pre and post lamports of the account at `index`, if both are known.
    pub fn lamports_at(&self, index: usize) -> Option<(u64, u64)> {
        Some((*self.pre_balances.get(index)?, *self.post_balances.get(index)?))
    }

    /// Check if a program was invoked by a top-level instruction
    pub fn has_program(&self, program_id: &str) -> bool {
        self.outer_program_ids.iter().any(|p| p == program_id)
    }
}
