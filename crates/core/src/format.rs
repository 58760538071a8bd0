//! Locale-style number rendering for alert text.

/// Fractional digits in the exact decimal expansion of any finite `f64`.
const EXACT_FRACTION_DIGITS: usize = 1074;

/// Render `value` rounded to `decimals` places with en-US digit grouping.
///
/// Exact ties round away from zero (`2.5` renders as `3`). Trailing fractional
/// zeros are dropped after rounding, so `1234.50` renders as `1,234.5` and
/// `7.00` as `7`. A value that rounds to zero loses its sign.
pub fn format_grouped(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "∞" } else { "-∞" }.to_string();
    }

    let (int_part, frac_part) = round_half_away(value.abs(), decimals);
    let frac_part = frac_part.trim_end_matches('0');
    let is_zero = int_part.bytes().all(|b| b == b'0') && frac_part.is_empty();

    let mut out = String::with_capacity(int_part.len() + int_part.len() / 3 + frac_part.len() + 2);
    if value.is_sign_negative() && !is_zero {
        out.push('-');
    }
    out.push_str(&group_thousands(&int_part));
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

/// Round a non-negative value to `decimals` places, ties away from zero.
///
/// Rounds the exact decimal expansion, so only true binary ties round up:
/// `0.125` gives `0.13` while `1.005` (stored just below) gives `1.00`.
fn round_half_away(value: f64, decimals: usize) -> (String, String) {
    let exact = format!("{:.*}", EXACT_FRACTION_DIGITS.max(decimals + 1), value);
    let (int_part, frac_part) = exact.split_once('.').unwrap_or((exact.as_str(), ""));

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(decimals))
        .collect();

    let round_up = frac_part
        .as_bytes()
        .get(decimals)
        .is_some_and(|&next| next >= b'5');
    if round_up {
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
        }
    }

    let (int_digits, frac_digits) = digits.split_at(digits.len() - decimals);
    (
        String::from_utf8_lossy(int_digits).into_owned(),
        String::from_utf8_lossy(frac_digits).into_owned(),
    )
}

/// Insert a `,` between every group of three integer digits.
fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
