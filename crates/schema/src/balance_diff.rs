//! Balance-diff engine.
//!
//! Turns the pre/post balance snapshots of one transaction into signed
//! per-mint deltas for the tracked owner. Pure: no I/O, no clock, the same
//! `TxFacts` always yields the same list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tx_facts::{BalanceSide, TxFacts};
use crate::venue::{SOL_DECIMALS, SOL_MINT, first_venue_program};

/// Signed balance change of one mint for the tracked owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub mint: String,

    /// post - pre, in base units
    pub amount: i128,

    pub decimals: u8,

    /// First allowlisted program invoked by the transaction, if any
    pub program_id: Option<String>,

    /// Pre-transaction amount (zero when the owner held none)
    pub pre_amount: u128,
}

impl BalanceDelta {
    pub fn is_native(&self) -> bool {
        self.mint == SOL_MINT
    }

    pub fn magnitude(&self) -> u128 {
        self.amount.unsigned_abs()
    }
}

/// Per-mint (amount, decimals) totals for one side, restricted to `owner`.
///
/// Amounts are u64 per account, so the i128 sum cannot overflow.
fn owner_totals(facts: &TxFacts, side: BalanceSide, owner: &str) -> BTreeMap<String, (i128, u8)> {
    let mut out: BTreeMap<String, (i128, u8)> = BTreeMap::new();
    for b in facts.token_balances_for_owner(side, owner) {
        let entry = out.entry(b.mint.clone()).or_insert((0, b.decimals));
        entry.0 += i128::from(b.amount);
    }
    out
}

/// Computes the tracked owner's balance deltas for a transaction.
///
/// Returns `None` (a non-trade, not an error) when the transaction has no
/// meta block, has no identifiable signer, or was signed by someone other
/// than `tracked_owner`.
///
/// Token deltas come first in ascending mint order, zero changes omitted.
/// A mint with no pre snapshot is diffed against a synthetic zero balance;
/// a mint with no post snapshot was fully withdrawn. The native delta, taken
/// from the signer's lamport balances, is always appended last.
pub fn compute_deltas(facts: &TxFacts, tracked_owner: &str) -> Option<Vec<BalanceDelta>> {
    if !facts.has_meta {
        return None;
    }

    let (signer_index, signer) = facts.signer()?;
    if signer != tracked_owner {
        return None;
    }

    // Single-venue assumption: every delta carries the first matching program.
    let program_id = first_venue_program(&facts.outer_program_ids).map(|p| p.to_string());

    let pre = owner_totals(facts, BalanceSide::Pre, tracked_owner);
    let post = owner_totals(facts, BalanceSide::Post, tracked_owner);

    let mut mints: Vec<&String> = post.keys().chain(pre.keys()).collect();
    mints.sort();
    mints.dedup();

    let mut deltas = Vec::with_capacity(mints.len() + 1);

    for mint in mints {
        let delta = match (pre.get(mint), post.get(mint)) {
            (pre_bal, Some(&(post_amount, decimals))) => {
                let pre_amount = pre_bal.map(|(a, _)| *a).unwrap_or(0);
                BalanceDelta {
                    mint: mint.clone(),
                    amount: post_amount - pre_amount,
                    decimals,
                    program_id: program_id.clone(),
                    pre_amount: pre_amount.unsigned_abs(),
                }
            }
            (Some(&(pre_amount, decimals)), None) => BalanceDelta {
                mint: mint.clone(),
                amount: -pre_amount,
                decimals,
                program_id: program_id.clone(),
                pre_amount: pre_amount.unsigned_abs(),
            },
            (None, None) => continue,
        };

        if delta.amount != 0 {
            deltas.push(delta);
        }
    }

    let (pre_lamports, post_lamports) = facts.lamports_at(signer_index).unwrap_or_default();
    deltas.push(BalanceDelta {
        mint: SOL_MINT.to_string(),
        amount: i128::from(post_lamports) - i128::from(pre_lamports),
        decimals: SOL_DECIMALS,
        program_id,
        pre_amount: u128::from(pre_lamports),
    });

    Some(deltas)
}
