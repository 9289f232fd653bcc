// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Network address classification and phone-number normalization.
//!
//! Phone-based addresses (`<digits>@s.whatsapp.net`) and group addresses
//! (`<id>@g.us`) are stable. Addresses in the `@lid` namespace are
//! anonymized and must be resolved before they can be correlated with a
//! phone number.

use crate::error::SwitchboardError;

pub const PHONE_SUFFIX: &str = "@s.whatsapp.net";
pub const EPHEMERAL_SUFFIX: &str = "@lid";
pub const GROUP_SUFFIX: &str = "@g.us";

/// Shortest and longest accepted international numbers, in digits.
const MIN_PHONE_DIGITS: usize = 8;
const MAX_PHONE_DIGITS: usize = 15;

/// National numbers of this length get the default country code prepended.
const NATIONAL_DIGITS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Phone,
    Ephemeral,
    Group,
    Other,
}

pub fn kind(address: &str) -> AddressKind {
    if address.ends_with(PHONE_SUFFIX) {
        AddressKind::Phone
    } else if address.ends_with(EPHEMERAL_SUFFIX) {
        AddressKind::Ephemeral
    } else if address.ends_with(GROUP_SUFFIX) {
        AddressKind::Group
    } else {
        AddressKind::Other
    }
}

pub fn is_ephemeral(address: &str) -> bool {
    kind(address) == AddressKind::Ephemeral
}

/// Returns the user part of an address with any `:device` suffix removed.
///
/// `919876543210:12@s.whatsapp.net` becomes `919876543210`.
pub fn user_part(address: &str) -> &str {
    let user = address.split('@').next().unwrap_or(address);
    user.split(':').next().unwrap_or(user)
}

/// Normalizes free-form phone input into a phone-based network address.
///
/// Every non-digit is stripped. Ten-digit national numbers get
/// `default_country_code` prepended. The result must be a plausible
/// international number or the input is rejected.
pub fn normalize_phone(input: &str, default_country_code: &str) -> Result<String, SwitchboardError> {
    let mut digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == NATIONAL_DIGITS {
        digits.insert_str(0, default_country_code);
    }
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        return Err(SwitchboardError::InvalidPhoneNumber {
            input: input.to_string(),
        });
    }
    Ok(format!("{digits}{PHONE_SUFFIX}"))
}

/// Normalizes a send recipient.
///
/// Phone addresses are already international: the device suffix is
/// stripped and the digits validated, never re-prefixed. Ephemeral and
/// group addresses pass through unchanged (ephemeral ones are left for the
/// caller to resolve); anything without `@` is treated as a phone number.
pub fn normalize_recipient(
    input: &str,
    default_country_code: &str,
) -> Result<String, SwitchboardError> {
    let trimmed = input.trim();
    if trimmed.contains('@') {
        match kind(trimmed) {
            AddressKind::Phone => {
                let user = user_part(trimmed);
                if user.chars().all(|c| c.is_ascii_digit())
                    && (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&user.len())
                {
                    Ok(format!("{user}{PHONE_SUFFIX}"))
                } else {
                    Err(SwitchboardError::InvalidPhoneNumber {
                        input: input.to_string(),
                    })
                }
            }
            AddressKind::Other => Err(SwitchboardError::InvalidPhoneNumber {
                input: input.to_string(),
            }),
            AddressKind::Ephemeral | AddressKind::Group => Ok(trimmed.to_string()),
        }
    } else {
        normalize_phone(trimmed, default_country_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ten_digits_get_country_code() {
        assert_eq!(
            normalize_phone("9876543210", "91").unwrap(),
            "919876543210@s.whatsapp.net"
        );
    }

    #[test]
    fn formatting_is_stripped() {
        assert_eq!(
            normalize_phone("+91 (987) 654-3210", "91").unwrap(),
            "919876543210@s.whatsapp.net"
        );
        assert_eq!(
            normalize_phone("+1 415 555 0100", "91").unwrap(),
            "14155550100@s.whatsapp.net"
        );
    }

    #[test]
    fn twenty_digits_are_rejected() {
        let err = normalize_phone("12345678901234567890", "91").unwrap_err();
        assert_eq!(err.code(), "INVALID_PHONE_NUMBER");
    }

    #[test]
    fn too_short_is_rejected() {
        assert!(normalize_phone("12345", "91").is_err());
        assert!(normalize_phone("", "91").is_err());
        assert!(normalize_phone("not a number", "91").is_err());
    }

    #[test]
    fn classifies_addresses() {
        assert_eq!(kind("919876543210@s.whatsapp.net"), AddressKind::Phone);
        assert_eq!(kind("123456789@lid"), AddressKind::Ephemeral);
        assert_eq!(kind("120363@g.us"), AddressKind::Group);
        assert_eq!(kind("status@broadcast"), AddressKind::Other);
    }

    #[test]
    fn user_part_strips_device_suffix() {
        assert_eq!(user_part("919876543210:12@s.whatsapp.net"), "919876543210");
        assert_eq!(user_part("919876543210@s.whatsapp.net"), "919876543210");
        assert_eq!(user_part("919876543210"), "919876543210");
    }

    #[test]
    fn recipients_pass_through_or_normalize() {
        assert_eq!(
            normalize_recipient("9876543210", "91").unwrap(),
            "919876543210@s.whatsapp.net"
        );
        assert_eq!(
            normalize_recipient("919876543210:3@s.whatsapp.net", "91").unwrap(),
            "919876543210@s.whatsapp.net"
        );
        assert_eq!(
            normalize_recipient("4915112345@s.whatsapp.net", "91").unwrap(),
            "4915112345@s.whatsapp.net"
        );
        assert!(normalize_recipient("12ab@s.whatsapp.net", "91").is_err());
        assert_eq!(normalize_recipient("777@lid", "91").unwrap(), "777@lid");
        assert_eq!(normalize_recipient("120363@g.us", "91").unwrap(), "120363@g.us");
        assert!(normalize_recipient("someone@example.com", "91").is_err());
    }

    proptest! {
        #[test]
        fn normalized_numbers_are_digits_only(input in "\\PC{0,40}") {
            if let Ok(address) = normalize_phone(&input, "91") {
                let user = address.strip_suffix(PHONE_SUFFIX).unwrap();
                prop_assert!(user.chars().all(|c| c.is_ascii_digit()));
                prop_assert!((MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&user.len()));
            }
        }

        #[test]
        fn any_ten_digit_number_is_accepted(n in 1_000_000_000u64..10_000_000_000u64) {
            let address = normalize_phone(&n.to_string(), "91").unwrap();
            prop_assert_eq!(address, format!("91{n}{PHONE_SUFFIX}"));
        }
    }
}
