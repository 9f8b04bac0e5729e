//! Secure-element status words.
//!
//! Every response ends with a 2-byte status code. `0x9000` means success;
//! the rest name specific rejections.

pub const OK: u16 = 0x9000;
pub const PIN_REMAINING_ATTEMPTS: u16 = 0x63c0;
pub const GP_AUTH_FAILED: u16 = 0x6300;
pub const INCORRECT_LENGTH: u16 = 0x6700;
pub const MISSING_CRITICAL_PARAMETER: u16 = 0x6800;
pub const COMMAND_INCOMPATIBLE_FILE_STRUCTURE: u16 = 0x6981;
pub const SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
pub const CONDITIONS_OF_USE_NOT_SATISFIED: u16 = 0x6985;
pub const INCORRECT_DATA: u16 = 0x6a80;
pub const NOT_ENOUGH_MEMORY_SPACE: u16 = 0x6a84;
pub const REFERENCED_DATA_NOT_FOUND: u16 = 0x6a88;
pub const FILE_ALREADY_EXISTS: u16 = 0x6a89;
pub const INCORRECT_P1_P2: u16 = 0x6b00;
pub const INS_NOT_SUPPORTED: u16 = 0x6d00;
pub const UNKNOWN_APDU: u16 = 0x6d02;
pub const DEVICE_NOT_ONBOARDED: u16 = 0x6d07;
pub const DEVICE_NOT_ONBOARDED_2: u16 = 0x6611;
pub const CUSTOM_IMAGE_EMPTY: u16 = 0x662e;
pub const CUSTOM_IMAGE_BOOTLOADER: u16 = 0x662f;
pub const CLA_NOT_SUPPORTED: u16 = 0x6e00;
pub const TECHNICAL_PROBLEM: u16 = 0x6f00;
pub const LICENSING: u16 = 0x6f42;
pub const HALTED: u16 = 0x6faa;
pub const NOT_ENOUGH_SPACE: u16 = 0x5102;
pub const USER_REFUSED_ON_DEVICE: u16 = 0x5501;
pub const LOCKED_DEVICE: u16 = 0x5515;
pub const MEMORY_PROBLEM: u16 = 0x9240;
pub const NO_EF_SELECTED: u16 = 0x9400;
pub const INVALID_OFFSET: u16 = 0x9402;
pub const FILE_NOT_FOUND: u16 = 0x9404;
pub const INCONSISTENT_FILE: u16 = 0x9408;
pub const ALGORITHM_NOT_SUPPORTED: u16 = 0x9484;
pub const INVALID_KCV: u16 = 0x9485;
pub const CODE_NOT_INITIALIZED: u16 = 0x9802;
pub const ACCESS_CONDITION_NOT_FULFILLED: u16 = 0x9804;
pub const CONTRADICTION_SECRET_CODE_STATUS: u16 = 0x9808;
pub const CONTRADICTION_INVALIDATION: u16 = 0x9810;
pub const CODE_BLOCKED: u16 = 0x9840;
pub const MAX_VALUE_REACHED: u16 = 0x9850;

/// Returns the symbolic name of a status code, if it is a known one.
pub fn status_name(code: u16) -> Option<&'static str> {
    let name = match code {
        OK => "OK",
        PIN_REMAINING_ATTEMPTS => "PIN_REMAINING_ATTEMPTS",
        GP_AUTH_FAILED => "GP_AUTH_FAILED",
        INCORRECT_LENGTH => "INCORRECT_LENGTH",
        MISSING_CRITICAL_PARAMETER => "MISSING_CRITICAL_PARAMETER",
        COMMAND_INCOMPATIBLE_FILE_STRUCTURE => "COMMAND_INCOMPATIBLE_FILE_STRUCTURE",
        SECURITY_STATUS_NOT_SATISFIED => "SECURITY_STATUS_NOT_SATISFIED",
        CONDITIONS_OF_USE_NOT_SATISFIED => "CONDITIONS_OF_USE_NOT_SATISFIED",
        INCORRECT_DATA => "INCORRECT_DATA",
        NOT_ENOUGH_MEMORY_SPACE => "NOT_ENOUGH_MEMORY_SPACE",
        REFERENCED_DATA_NOT_FOUND => "REFERENCED_DATA_NOT_FOUND",
        FILE_ALREADY_EXISTS => "FILE_ALREADY_EXISTS",
        INCORRECT_P1_P2 => "INCORRECT_P1_P2",
        INS_NOT_SUPPORTED => "INS_NOT_SUPPORTED",
        UNKNOWN_APDU => "UNKNOWN_APDU",
        DEVICE_NOT_ONBOARDED => "DEVICE_NOT_ONBOARDED",
        DEVICE_NOT_ONBOARDED_2 => "DEVICE_NOT_ONBOARDED_2",
        CUSTOM_IMAGE_EMPTY => "CUSTOM_IMAGE_EMPTY",
        CUSTOM_IMAGE_BOOTLOADER => "CUSTOM_IMAGE_BOOTLOADER",
        CLA_NOT_SUPPORTED => "CLA_NOT_SUPPORTED",
        TECHNICAL_PROBLEM => "TECHNICAL_PROBLEM",
        LICENSING => "LICENSING",
        HALTED => "HALTED",
        NOT_ENOUGH_SPACE => "NOT_ENOUGH_SPACE",
        USER_REFUSED_ON_DEVICE => "USER_REFUSED_ON_DEVICE",
        LOCKED_DEVICE => "LOCKED_DEVICE",
        MEMORY_PROBLEM => "MEMORY_PROBLEM",
        NO_EF_SELECTED => "NO_EF_SELECTED",
        INVALID_OFFSET => "INVALID_OFFSET",
        FILE_NOT_FOUND => "FILE_NOT_FOUND",
        INCONSISTENT_FILE => "INCONSISTENT_FILE",
        ALGORITHM_NOT_SUPPORTED => "ALGORITHM_NOT_SUPPORTED",
        INVALID_KCV => "INVALID_KCV",
        CODE_NOT_INITIALIZED => "CODE_NOT_INITIALIZED",
        ACCESS_CONDITION_NOT_FULFILLED => "ACCESS_CONDITION_NOT_FULFILLED",
        CONTRADICTION_SECRET_CODE_STATUS => "CONTRADICTION_SECRET_CODE_STATUS",
        CONTRADICTION_INVALIDATION => "CONTRADICTION_INVALIDATION",
        CODE_BLOCKED => "CODE_BLOCKED",
        MAX_VALUE_REACHED => "MAX_VALUE_REACHED",
        _ => return None,
    };
    Some(name)
}

/// Human-readable label: `NAME (0x6985)` for known codes, the bare hex
/// value otherwise.
pub fn describe(code: u16) -> String {
    match status_name(code) {
        Some(name) => format!("{name} ({code:#06x})"),
        None => format!("{code:#06x}"),
    }
}

/// Returns true for the success status word.
pub fn is_success(code: u16) -> bool {
    code == OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_resolve() {
        assert_eq!(status_name(0x9000), Some("OK"));
        assert_eq!(status_name(0x6985), Some("CONDITIONS_OF_USE_NOT_SATISFIED"));
        assert_eq!(status_name(0x5515), Some("LOCKED_DEVICE"));
    }

    #[test]
    fn unknown_code_falls_back_to_hex() {
        assert_eq!(status_name(0x1234), None);
        assert_eq!(describe(0x1234), "0x1234");
    }

    #[test]
    fn describe_includes_name_and_hex() {
        assert_eq!(describe(0x6985), "CONDITIONS_OF_USE_NOT_SATISFIED (0x6985)");
        assert_eq!(describe(0x6d00), "INS_NOT_SUPPORTED (0x6d00)");
    }

    #[test]
    fn success_word() {
        assert!(is_success(OK));
        assert!(!is_success(INS_NOT_SUPPORTED));
    }
}
