//! Human-readable trade notices (Telegram MarkdownV2).

use schema::{Direction, TradeRecord, is_native};

use crate::price::Prices;
use crate::rpc::TokenMetadata;

const MARKDOWN_SPECIAL: &str = "_*[]()~`>#+=|{}.!-";

/// Rendered message plus the swap link used for the action button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub action_url: String,
}

pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_SPECIAL.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `1234567.891` -> `1,234,567.89`
pub fn format_amount(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}

pub fn format_mcap(mcap: f64) -> String {
    if mcap >= 1_000_000_000.0 {
        format!("${}B", format_amount(mcap / 1_000_000_000.0))
    } else if mcap >= 1_000_000.0 {
        format!("${}M", format_amount(mcap / 1_000_000.0))
    } else if mcap >= 1_000.0 {
        format!("${}K", format_amount(mcap / 1_000.0))
    } else {
        format!("${}", format_amount(mcap))
    }
}

/// Raw base units to a decimal amount.
pub fn scale(raw: u128, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(i32::from(decimals))
}

/// Whole-dollar market cap from a unit price and raw supply.
pub fn market_cap(price: f64, meta: &TokenMetadata) -> f64 {
    (price * scale(meta.supply, meta.decimals)).floor()
}

pub fn swap_url(output_mint: &str, input_mint: &str) -> String {
    format!("https://jup.ag/swap/{output_mint}-{input_mint}")
}

/// Renders the notice for a classified trade.
pub fn build_notice(
    trade: &TradeRecord,
    signature: &str,
    display_name: &str,
    input_meta: &TokenMetadata,
    output_meta: &TokenMetadata,
    prices: Prices,
) -> Notice {
    let input_symbol = escape_markdown(&input_meta.symbol);
    let output_symbol = escape_markdown(&output_meta.symbol);
    let name = escape_markdown(display_name);
    let trader = &trade.trader;
    let input_mint = &trade.input.mint;
    let output_mint = &trade.output.mint;

    let input_amount = scale(trade.input.amount, input_meta.decimals);
    let output_amount = scale(trade.output.amount, output_meta.decimals);
    let input_usd = input_amount * prices.input;
    let output_usd = output_amount * prices.output;

    // value and market cap are quoted on the non-native side
    let (total_value, ratio, mcap) = if is_native(input_mint) {
        (
            input_usd,
            input_usd / output_amount,
            market_cap(prices.output, output_meta),
        )
    } else {
        (
            output_usd,
            output_usd / input_amount,
            market_cap(prices.input, input_meta),
        )
    };

    let (emoji, headline_symbol) = match trade.direction {
        Direction::Buy => ("🟢", &output_symbol),
        Direction::Sell => ("🔴", &input_symbol),
    };
    let token_mint = if is_native(output_mint) {
        input_mint
    } else {
        output_mint
    };

    let in_amt = escape_markdown(&format_amount(input_amount));
    let out_amt = escape_markdown(&format_amount(output_amount));

    let lines = [
        format!(
            "{emoji} [{} {headline_symbol}](https://solscan\\.io/tx/{signature}) on {}",
            trade.direction,
            escape_markdown(&trade.venue)
        ),
        format!("`{trader}` \\({name}\\)\n"),
        format!(
            "🔹[{name}](https://solscan\\.io/account/{trader}) swapped *{in_amt}* [{input_symbol}](https://solscan\\.io/token/{input_mint}) for {out_amt} \\(${}\\) [{output_symbol}](https://solscan\\.io/token/{output_mint}) @${}\n",
            escape_markdown(&format_amount(total_value)),
            escape_markdown(&ratio.to_string()),
        ),
        format!("🔹[{name}](https://solscan\\.io/account/{trader}):"),
        format!(
            "[{input_symbol}](https://solscan\\.io/token/{input_mint}): `\\-{in_amt} \\(${}\\)`",
            escape_markdown(&format_amount(input_usd))
        ),
        format!(
            "[{output_symbol}](https://solscan\\.io/token/{output_mint}): `\\+{out_amt} \\(${}\\)`",
            escape_markdown(&format_amount(output_usd))
        ),
        format!(
            "\n[Trade {output_symbol} \\- {input_symbol}](https://jup\\.ag/swap/{output_mint}\\-{input_mint}) \\| MC: {}\n`{token_mint}`",
            escape_markdown(&format_mcap(mcap))
        ),
    ];

    Notice {
        text: lines.join("\n"),
        action_url: swap_url(output_mint, input_mint),
    }
}
