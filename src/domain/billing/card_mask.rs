//! Card number masking for display.

/// Returned in place of a card number when none is usable.
pub const NO_CARD_INFO: &str = "카드 정보 없음";

/// Shown as the card issuer when the gateway lookup fails.
pub const UNKNOWN_BANK: &str = "Unknown Bank";

const VISIBLE_DIGITS: usize = 4;
const GROUP: usize = 4;

/// Masks a card number, leaving only the first four digits readable.
///
/// Input made only of digits is grouped in fours with `-`
/// (`"1234567812345678"` becomes `"1234-****-****-****"`). Input that
/// already carries separators keeps them in place
/// (`"1234-5678-1234"` becomes `"1234-****-****"`). Anything shorter than
/// four characters yields [`NO_CARD_INFO`].
pub fn mask_card_number(raw: &str) -> String {
    let raw = raw.trim();
    if raw.chars().count() < VISIBLE_DIGITS {
        return NO_CARD_INFO.to_string();
    }

    if raw.chars().all(|c| c.is_ascii_digit()) {
        let mut out = String::with_capacity(raw.len() + raw.len() / GROUP);
        for (i, c) in raw.chars().enumerate() {
            if i > 0 && i % GROUP == 0 {
                out.push('-');
            }
            out.push(if i < VISIBLE_DIGITS { c } else { '*' });
        }
        return out;
    }

    let mut seen_digits = 0;
    raw.chars()
        .map(|c| {
            if !c.is_ascii_digit() {
                return c;
            }
            seen_digits += 1;
            if seen_digits <= VISIBLE_DIGITS {
                c
            } else {
                '*'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn masks_plain_sixteen_digits() {
        assert_eq!(mask_card_number("1234567812345678"), "1234-****-****-****");
    }

    #[test]
    fn preserves_existing_separators() {
        assert_eq!(mask_card_number("1234-5678-1234"), "1234-****-****");
    }

    #[test]
    fn short_input_yields_sentinel() {
        assert_eq!(mask_card_number("12"), NO_CARD_INFO);
        assert_eq!(mask_card_number(""), NO_CARD_INFO);
    }

    #[test]
    fn gateway_masked_number_is_fully_masked_after_prefix() {
        assert_eq!(mask_card_number("5365-10**-****-1234"), "5365-****-****-****");
    }

    #[test]
    fn partial_last_group() {
        assert_eq!(mask_card_number("123456"), "1234-**");
    }

    proptest! {
        #[test]
        fn never_leaks_digits_past_the_fourth(raw in "[0-9 -]{0,24}") {
            let masked = mask_card_number(&raw);
            if masked != NO_CARD_INFO {
                let digits = masked.chars().filter(|c| c.is_ascii_digit()).count();
                prop_assert!(digits <= 4);
            }
        }

        #[test]
        fn plain_digits_keep_prefix(raw in "[0-9]{4,19}") {
            let masked = mask_card_number(&raw);
            prop_assert!(masked.starts_with(&raw[..4]));
            prop_assert_eq!(masked.chars().filter(|c| *c == '*').count(), raw.len() - 4);
        }
    }
}
