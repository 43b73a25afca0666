pub mod alt_resolver;
pub mod balance_diff;
pub mod trade;
pub mod tx_facts;
pub mod venue;

// Account key resolution
pub use alt_resolver::{AccountKey, find_signer, outer_program_ids, resolve_account_keys};

// Balance-diff engine
pub use balance_diff::{BalanceDelta, compute_deltas};

// Trade classifier
pub use trade::{Direction, TokenAmount, TradeParser, TradeRecord, classify};

// TxFacts layer
pub use tx_facts::{BalanceSide, TokenBalance, TxFacts};

pub use venue::{SOL_DECIMALS, SOL_MINT, UNKNOWN_VENUE, Venue, first_venue_program, is_native, venue_name};
