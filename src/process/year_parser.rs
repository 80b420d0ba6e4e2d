use crate::error::{CleanError, Result};
use crate::process::utils::clean_str;

/// Parse a census-cycle token into a single year.
///
/// Joint CSO/NISRA publications label a cycle like `"2021/2022"` because the
/// two censuses were taken a year apart; the later year is used. A plain
/// `"2022"` is returned as-is. Any other shape is rejected.
pub fn parse_census_year(token: &str) -> Result<i32> {
    let s = clean_str(token);
    let err = |reason| CleanError::Parse {
        token: token.to_string(),
        reason,
    };

    match s.split_once('/') {
        None => four_digit_year(&s).ok_or_else(|| err("expected a 4-digit year")),
        Some((first, second)) => {
            let first = four_digit_year(first.trim())
                .ok_or_else(|| err("expected YYYY/YYYY with 4-digit years"))?;
            let second = four_digit_year(second.trim())
                .ok_or_else(|| err("expected YYYY/YYYY with 4-digit years"))?;
            if second < first {
                return Err(err("second year precedes the first"));
            }
            Ok(second)
        }
    }
}

fn four_digit_year(s: &str) -> Option<i32> {
    if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_cross_year_labels() {
        assert_eq!(parse_census_year("2022").unwrap(), 2022);
        assert_eq!(parse_census_year("2021/2022").unwrap(), 2022);
        assert_eq!(parse_census_year("2001/2002").unwrap(), 2002);
        assert_eq!(parse_census_year("  2011 ").unwrap(), 2011);
        assert_eq!(parse_census_year(" 2021 / 2022 ").unwrap(), 2022);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for bad in [
            "not-a-year",
            "",
            "20",
            "2021-2022",
            "2021/22",
            "2021/2022/2023",
            "2022/2021",
            "2022.0",
        ] {
            match parse_census_year(bad) {
                Err(CleanError::Parse { token, .. }) => assert_eq!(token, bad),
                other => panic!("expected Parse error for {bad:?}, got {other:?}"),
            }
        }
    }
}
