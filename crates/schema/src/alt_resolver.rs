/// Account key resolution for legacy and v0 transactions.
///
/// `getTransaction` returns account keys in two shapes:
/// - `jsonParsed`: objects `{pubkey, signer, writable, source}`, already
///   including addresses loaded from lookup tables
/// - raw (`json`): bare strings, where signers are the first
///   `header.numRequiredSignatures` keys and v0 lookup-table addresses live
///   in `meta.loadedAddresses`
///
/// Both shapes are normalised into `AccountKey` here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resolved account key with its message flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKey {
    pub pubkey: String,
    pub signer: bool,
    pub writable: bool,
}

/// Resolves the full account key list of a transaction.
///
/// For raw v0 transactions the final ordering is:
/// accountKeys + loadedAddresses.writable + loadedAddresses.readonly
pub fn resolve_account_keys(tx: &Value) -> Vec<AccountKey> {
    let message = match tx.pointer("/transaction/message") {
        Some(m) => m,
        None => return vec![],
    };

    let raw_keys = message
        .get("accountKeys")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let num_signers = message
        .pointer("/header/numRequiredSignatures")
        .and_then(|v| v.as_u64())
        .unwrap_or(1) as usize;

    let mut keys: Vec<AccountKey> = Vec::with_capacity(raw_keys.len());
    let mut saw_parsed = false;

    for (idx, k) in raw_keys.iter().enumerate() {
        if let Some(pubkey) = k.as_str() {
            keys.push(AccountKey {
                pubkey: pubkey.to_string(),
                signer: idx < num_signers,
                writable: false,
            });
        } else if let Some(pubkey) = k.get("pubkey").and_then(|p| p.as_str()) {
            saw_parsed = true;
            keys.push(AccountKey {
                pubkey: pubkey.to_string(),
                signer: k.get("signer").and_then(|v| v.as_bool()).unwrap_or(false),
                writable: k.get("writable").and_then(|v| v.as_bool()).unwrap_or(false),
            });
        }
    }

    // jsonParsed keys already carry lookup-table addresses
    if saw_parsed {
        return keys;
    }

    if let Some(loaded) = tx.pointer("/meta/loadedAddresses") {
        for (field, writable) in [("writable", true), ("readonly", false)] {
            if let Some(arr) = loaded.get(field).and_then(|v| v.as_array()) {
                for addr in arr.iter().filter_map(|a| a.as_str()) {
                    keys.push(AccountKey {
                        pubkey: addr.to_string(),
                        signer: false,
                        writable,
                    });
                }
            }
        }
    }

    keys
}

/// Program id of every top-level instruction, in instruction order.
///
/// Duplicates are kept: position matters for venue attribution.
pub fn outer_program_ids(tx: &Value, keys: &[AccountKey]) -> Vec<String> {
    let instructions = match tx
        .pointer("/transaction/message/instructions")
        .and_then(|v| v.as_array())
    {
        Some(arr) => arr,
        None => return vec![],
    };

    instructions
        .iter()
        .filter_map(|ix| {
            // jsonParsed format
            if let Some(pid) = ix.get("programId").and_then(|v| v.as_str()) {
                return Some(pid.to_string());
            }
            // raw format
            let idx = ix.get("programIdIndex").and_then(|v| v.as_u64())? as usize;
            keys.get(idx).map(|k| k.pubkey.clone())
        })
        .collect()
}

/// The first signing key and its index in the account list.
pub fn find_signer(keys: &[AccountKey]) -> Option<(usize, &str)> {
    keys.iter()
        .enumerate()
        .find(|(_, k)| k.signer)
        .map(|(i, k)| (i, k.pubkey.as_str()))
}
