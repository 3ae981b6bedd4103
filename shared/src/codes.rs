//! Human-readable identifiers: `<PREFIX>-<UPPERCASE HEX>`
//!
//! Codes are assigned once at creation and never change. Uniqueness is
//! ultimately guaranteed by the UNIQUE constraints in the schema; the random
//! suffix only makes collisions rare.

use uuid::Uuid;

/// Kinds of record that receive a generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodePrefix {
    Invoice,
    Payment,
    Receipt,
    QrCode,
    Client,
    Agent,
    Contract,
    Complaint,
}

impl CodePrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePrefix::Invoice => "INV",
            CodePrefix::Payment => "PAY",
            CodePrefix::Receipt => "REC",
            CodePrefix::QrCode => "QR",
            CodePrefix::Client => "CLI",
            CodePrefix::Agent => "AG",
            CodePrefix::Contract => "CTR",
            CodePrefix::Complaint => "CMP",
        }
    }

    /// Number of hex characters after the dash
    pub fn suffix_len(&self) -> usize {
        match self {
            CodePrefix::Invoice | CodePrefix::Payment | CodePrefix::Receipt => 10,
            CodePrefix::QrCode => 12,
            CodePrefix::Agent => 6,
            CodePrefix::Client | CodePrefix::Contract | CodePrefix::Complaint => 8,
        }
    }
}

/// Generate a fresh code for the given record kind
pub fn generate_code(prefix: CodePrefix) -> String {
    let hex = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("{}-{}", prefix.as_str(), &hex[..prefix.suffix_len()])
}

/// Check that a code has the shape produced by [`generate_code`]
pub fn is_valid_code(prefix: CodePrefix, code: &str) -> bool {
    let Some(suffix) = code
        .strip_prefix(prefix.as_str())
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };
    suffix.len() == prefix.suffix_len()
        && suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const ALL: [CodePrefix; 8] = [
        CodePrefix::Invoice,
        CodePrefix::Payment,
        CodePrefix::Receipt,
        CodePrefix::QrCode,
        CodePrefix::Client,
        CodePrefix::Agent,
        CodePrefix::Contract,
        CodePrefix::Complaint,
    ];

    #[test]
    fn test_generated_codes_are_well_formed() {
        for prefix in ALL {
            let code = generate_code(prefix);
            assert!(is_valid_code(prefix, &code), "{code}");
        }
    }

    #[test]
    fn test_generated_codes_do_not_repeat() {
        let codes: HashSet<String> = (0..1000).map(|_| generate_code(CodePrefix::Payment)).collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn test_rejects_foreign_codes() {
        assert!(!is_valid_code(CodePrefix::Invoice, "PAY-0123456789"));
        assert!(!is_valid_code(CodePrefix::Agent, "AG-12345"));
        assert!(!is_valid_code(CodePrefix::Agent, "AG-12345g"));
        assert!(!is_valid_code(CodePrefix::Client, "CLI0123ABCD"));
        assert!(is_valid_code(CodePrefix::Agent, "AG-0A1B2C"));
    }
}
