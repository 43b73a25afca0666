//! Trade classifier.
//!
//! Decides from balance deltas alone whether a transaction was a trade by
//! the tracked owner, and which side was given up (input) and received
//! (output).
//!
//! Role assignment is purely sign based:
//! - input: the largest negative token delta, else the native delta if negative
//! - output: the largest positive token delta, else the native delta if positive
//! - equal magnitudes resolve to the lower mint, so the result never depends
//!   on delta order
//!
//! Raw magnitudes of different mints are not comparable in value; for
//! multi-hop swaps touching more than two mints this picks the largest raw
//! leg on each side, which is deterministic but not value-weighted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use crate::balance_diff::{BalanceDelta, compute_deltas};
use crate::tx_facts::TxFacts;
use crate::venue::{first_venue_program, is_native, venue_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a trade, in raw base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub mint: String,
    pub amount: u128,
}

/// A classified trade.
///
/// Invariant: `input.amount > 0` and `output.amount > 0`. Amounts are not
/// scaled by decimals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub direction: Direction,
    pub trader: String,
    pub input: TokenAmount,
    pub output: TokenAmount,
    pub venue: String,
}

/// Picks the delta with the largest magnitude; ties go to the lower mint.
fn largest<'a>(candidates: impl Iterator<Item = &'a BalanceDelta>) -> Option<&'a BalanceDelta> {
    candidates.max_by(|a, b| match a.magnitude().cmp(&b.magnitude()) {
        Ordering::Equal => b.mint.cmp(&a.mint),
        other => other,
    })
}

fn pick_side(deltas: &[&BalanceDelta], negative: bool) -> Option<BalanceDelta> {
    let matches_sign = |d: &&&BalanceDelta| if negative { d.amount < 0 } else { d.amount > 0 };

    largest(deltas.iter().filter(matches_sign).filter(|d| !d.is_native()).copied())
        .or_else(|| largest(deltas.iter().filter(matches_sign).filter(|d| d.is_native()).copied()))
        .cloned()
}

/// Classifies a transaction given the deltas `compute_deltas` produced for it.
///
/// Returns `None` when no top-level instruction targets an allowlisted venue,
/// when the signer is not `tracked_owner`, or when the deltas do not contain
/// both a negative and a positive non-zero entry.
pub fn classify(facts: &TxFacts, deltas: &[BalanceDelta], tracked_owner: &str) -> Option<TradeRecord> {
    let program_id = first_venue_program(&facts.outer_program_ids)?;

    let (_, trader) = facts.signer()?;
    if trader != tracked_owner {
        return None;
    }

    let nonzero: Vec<&BalanceDelta> = deltas.iter().filter(|d| d.amount != 0).collect();
    if nonzero.len() < 2 {
        return None;
    }

    let input = pick_side(&nonzero, true)?;
    let output = pick_side(&nonzero, false)?;

    let direction = if is_native(&input.mint) {
        Direction::Buy
    } else {
        Direction::Sell
    };

    let venue = output
        .program_id
        .as_deref()
        .or(input.program_id.as_deref())
        .map(venue_name)
        .unwrap_or_else(|| venue_name(program_id));

    Some(TradeRecord {
        direction,
        trader: trader.to_string(),
        input: TokenAmount {
            mint: input.mint,
            amount: input.amount.unsigned_abs(),
        },
        output: TokenAmount {
            mint: output.mint,
            amount: output.amount.unsigned_abs(),
        },
        venue: venue.to_string(),
    })
}

/// Runs the diff engine and the classifier for one tracked owner.
#[derive(Debug, Clone)]
pub struct TradeParser {
    owner: String,
}

impl TradeParser {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn deltas(&self, facts: &TxFacts) -> Option<Vec<BalanceDelta>> {
        compute_deltas(facts, &self.owner)
    }

    pub fn classify_facts(&self, facts: &TxFacts) -> Option<TradeRecord> {
        let deltas = self.deltas(facts)?;
        classify(facts, &deltas, &self.owner)
    }

    /// Parses a `getTransaction` JSON result into a trade, if it is one.
    pub fn parse(&self, tx: &Value) -> Option<TradeRecord> {
        self.classify_facts(&TxFacts::from_json(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::{JUPITER_PROGRAM_ID, SOL_MINT};
    use serde_json::json;

    const OWNER: &str = "TraderWallet111";

    fn facts(signer: &str, program: &str) -> TxFacts {
        TxFacts::from_json(&json!({
            "meta": {"err": null, "preBalances": [], "postBalances": []},
            "transaction": {
                "signatures": ["sig"],
                "message": {
                    "accountKeys": [{"pubkey": signer, "signer": true, "writable": true}],
                    "instructions": [{"programId": program}]
                }
            }
        }))
    }

    fn delta(mint: &str, amount: i128) -> BalanceDelta {
        BalanceDelta {
            mint: mint.to_string(),
            amount,
            decimals: 6,
            program_id: Some(JUPITER_PROGRAM_ID.to_string()),
            pre_amount: 0,
        }
    }

    #[test]
    fn test_native_spent_is_buy() {
        let f = facts(OWNER, JUPITER_PROGRAM_ID);
        let deltas = vec![delta("TokenA", 500_000), delta(SOL_MINT, -1_000_000_000)];

        let trade = classify(&f, &deltas, OWNER).unwrap();
        assert_eq!(trade.direction, Direction::Buy);
        assert_eq!(trade.input.mint, SOL_MINT);
        assert_eq!(trade.input.amount, 1_000_000_000);
        assert_eq!(trade.output.mint, "TokenA");
        assert_eq!(trade.output.amount, 500_000);
        assert_eq!(trade.venue, "JUPITER");
        assert_eq!(trade.trader, OWNER);
    }

    #[test]
    fn test_native_received_is_sell() {
        let f = facts(OWNER, JUPITER_PROGRAM_ID);
        let deltas = vec![delta("TokenA", -42), delta(SOL_MINT, 990_000)];

        let trade = classify(&f, &deltas, OWNER).unwrap();
        assert_eq!(trade.direction, Direction::Sell);
        assert_eq!(trade.input.mint, "TokenA");
        assert_eq!(trade.output.mint, SOL_MINT);
    }

    #[test]
    fn test_token_legs_win_over_fee_only_native_delta() {
        let f = facts(OWNER, JUPITER_PROGRAM_ID);
        let deltas = vec![delta("TokenX", -100), delta("TokenY", 50), delta(SOL_MINT, -5000)];

        let trade = classify(&f, &deltas, OWNER).unwrap();
        assert_eq!(trade.input.mint, "TokenX");
        assert_eq!(trade.output.mint, "TokenY");
        assert_eq!(trade.direction, Direction::Sell);
    }

    #[test]
    fn test_role_assignment_ignores_order() {
        let f = facts(OWNER, JUPITER_PROGRAM_ID);
        let mut deltas = vec![
            delta("TokenA", -10),
            delta("TokenB", -300),
            delta("TokenC", 7),
            delta(SOL_MINT, -5000),
        ];
        let forward = classify(&f, &deltas, OWNER).unwrap();
        deltas.reverse();
        let backward = classify(&f, &deltas, OWNER).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.input.mint, "TokenB");
        assert_eq!(forward.output.mint, "TokenC");
    }

    #[test]
    fn test_equal_magnitudes_prefer_lower_mint() {
        let f = facts(OWNER, JUPITER_PROGRAM_ID);
        let deltas = vec![delta("TokenB", -10), delta("TokenA", -10), delta("TokenC", 1)];

        let trade = classify(&f, &deltas, OWNER).unwrap();
        assert_eq!(trade.input.mint, "TokenA");
    }

    #[test]
    fn test_no_venue_instruction() {
        let f = facts(OWNER, "11111111111111111111111111111111");
        let deltas = vec![delta("TokenA", 500), delta(SOL_MINT, -1000)];
        assert!(classify(&f, &deltas, OWNER).is_none());
    }

    #[test]
    fn test_signer_mismatch() {
        let f = facts("Impostor", JUPITER_PROGRAM_ID);
        let deltas = vec![delta("TokenA", 500), delta(SOL_MINT, -1000)];
        assert!(classify(&f, &deltas, OWNER).is_none());
    }

    #[test]
    fn test_insufficient_deltas() {
        let f = facts(OWNER, JUPITER_PROGRAM_ID);
        assert!(classify(&f, &[delta(SOL_MINT, -5000)], OWNER).is_none());
        assert!(classify(&f, &[delta("TokenA", 0), delta(SOL_MINT, -5000)], OWNER).is_none());
        // two entries, same sign: no output side
        assert!(classify(&f, &[delta("TokenA", -3), delta(SOL_MINT, -5000)], OWNER).is_none());
    }

    #[test]
    fn test_unknown_program_on_delta_resolves_to_unknown_venue() {
        let f = facts(OWNER, JUPITER_PROGRAM_ID);
        let mut deltas = vec![delta("TokenA", 500), delta(SOL_MINT, -1000)];
        for d in deltas.iter_mut() {
            d.program_id = Some("NotAVenue111".to_string());
        }
        assert_eq!(classify(&f, &deltas, OWNER).unwrap().venue, "Unknown");
    }

    #[test]
    fn test_direction_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Direction::Buy).unwrap(), "\"BUY\"");
    }
}
