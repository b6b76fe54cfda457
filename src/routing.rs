use rand::rngs::OsRng;
use rand::Rng;

/// First eight digits of a routing number.
///
/// Accepts 8 or 9 digit values as-is. A 10 digit value (a transport-prefixed
/// routing number) has its leading `0` or `1` filler dropped. Anything else
/// yields an empty string, which fails entry validation downstream.
pub fn aba8(rtn: &str) -> String {
    let chars: Vec<char> = rtn.chars().collect();
    match chars.len() {
        10 if has_filler(&chars) => chars[1..9].iter().collect(),
        8 | 9 => chars[..8].iter().collect(),
        _ => String::new(),
    }
}

/// Ninth (check) digit of a routing number, or empty when there is none.
pub fn aba_check_digit(rtn: &str) -> String {
    let chars: Vec<char> = rtn.chars().collect();
    match chars.len() {
        10 if has_filler(&chars) => chars[9].to_string(),
        9 => chars[8].to_string(),
        _ => String::new(),
    }
}

fn has_filler(chars: &[char]) -> bool {
    matches!(chars.first(), Some('0') | Some('1'))
}

/// Computes the ABA check digit for the first eight digits using 3-7-1 weights.
pub fn compute_check_digit(aba8: &str) -> Option<u32> {
    if aba8.len() != 8 {
        return None;
    }
    const WEIGHTS: [u32; 8] = [3, 7, 1, 3, 7, 1, 3, 7];
    let mut sum = 0;
    for (c, w) in aba8.chars().zip(WEIGHTS) {
        sum += c.to_digit(10)? * w;
    }
    Some((10 - (sum % 10)) % 10)
}

/// True when `rtn` is nine digits with a matching check digit.
pub fn is_valid_routing_number(rtn: &str) -> bool {
    if rtn.len() != 9 || !rtn.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    match (compute_check_digit(&rtn[..8]), rtn[8..].parse::<u32>()) {
        (Some(expected), Ok(actual)) => expected == actual,
        _ => false,
    }
}

/// Builds an entry trace number: the ODFI's ABA8 followed by OS random digits,
/// cut to 15 characters.
///
/// Uniqueness is probabilistic only; callers must not use trace numbers as keys.
pub fn trace_number(rtn: &str) -> String {
    let n: u64 = OsRng.gen_range(0..1_000_000_000_000_000);
    let mut trace = format!("{}{:015}", aba8(rtn), n);
    trace.truncate(15);
    trace
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aba_helpers() {
        assert_eq!(aba8("231380104"), "23138010");
        assert_eq!(aba_check_digit("231380104"), "4");

        assert_eq!(aba8("0123456789"), "12345678");
        assert_eq!(aba_check_digit("0123456789"), "9");

        assert_eq!(aba8("12345678"), "12345678");
        assert_eq!(aba_check_digit("12345678"), "");
    }

    #[test]
    fn test_ten_digits_need_filler_prefix() {
        assert_eq!(aba8("1231380104"), "23138010");
        assert_eq!(aba_check_digit("1231380104"), "4");

        for rtn in ["9231380104", "2231380104"] {
            assert_eq!(aba8(rtn), "", "{}", rtn);
            assert_eq!(aba_check_digit(rtn), "", "{}", rtn);
        }
    }

    #[test]
    fn test_invalid_lengths_are_empty() {
        assert_eq!(aba8("1234"), "");
        assert_eq!(aba8("12345678901"), "");
        assert_eq!(aba_check_digit("2234567890"), "");
        assert_eq!(aba_check_digit(""), "");
    }

    #[test]
    fn test_check_digit() {
        assert_eq!(compute_check_digit("23138010"), Some(4));
        assert_eq!(compute_check_digit("12104288"), Some(2));
        assert_eq!(compute_check_digit("1210428"), None);
        assert!(is_valid_routing_number("231380104"));
        assert!(is_valid_routing_number("121042882"));
        assert!(!is_valid_routing_number("231380105"));
    }

    #[test]
    fn test_trace_number() {
        for _ in 0..50 {
            let trace = trace_number("231380104");
            assert_eq!(trace.len(), 15);
            assert!(trace.starts_with("23138010"));
            assert!(trace.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
