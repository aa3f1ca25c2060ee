//! Phone number validation and normalization.
//!
//! Numbers arrive from user input in national (`0XXXXXXXXX`) or international
//! (`+CCXXXXXXXXX`) form with arbitrary separators. Validation is a
//! pre-filter: invalid numbers are dropped from a batch rather than failing
//! the whole send.

/// Normalization rules for one deployment region.
///
/// The default country code matches the product's launch market. Deployments
/// elsewhere configure their own code.
///
/// # Example
///
/// ```rust
/// use textledger::phone::PhoneRules;
///
/// let rules = PhoneRules::default();
/// assert_eq!(rules.normalize("024 123 4567"), "233241234567");
/// assert!(rules.is_valid("+233241234567"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneRules {
    country_code: String,
}

impl Default for PhoneRules {
    fn default() -> Self {
        Self {
            country_code: "233".to_string(),
        }
    }
}

impl PhoneRules {
    /// Create rules with the default country code.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the international country code (digits only, no `+`).
    #[must_use]
    pub fn country_code(mut self, code: impl Into<String>) -> Self {
        self.country_code = code.into();
        self
    }

    /// Strip separators and a leading `+`, keeping digits only.
    fn strip(raw: &str) -> String {
        raw.chars().filter(char::is_ascii_digit).collect()
    }

    /// Check whether a raw number matches the national or international pattern.
    ///
    /// National: 10 digits starting with `0`. International: country code
    /// followed by 9 digits.
    #[must_use]
    pub fn is_valid(&self, raw: &str) -> bool {
        let digits = Self::strip(raw);

        if digits.len() == 10 && digits.starts_with('0') {
            return true;
        }

        digits.len() == self.country_code.len() + 9 && digits.starts_with(&self.country_code)
    }

    /// Canonicalize a number to international form without `+`.
    ///
    /// A leading national `0` is rewritten to the country code; a number with
    /// no recognizable prefix gets the country code prepended. Deterministic,
    /// no I/O. Callers are expected to pre-filter with [`Self::is_valid`].
    #[must_use]
    pub fn normalize(&self, raw: &str) -> String {
        let digits = Self::strip(raw);

        if digits.starts_with(&self.country_code) {
            return digits;
        }

        if let Some(national) = digits.strip_prefix('0') {
            return format!("{}{}", self.country_code, national);
        }

        format!("{}{}", self.country_code, digits)
    }
}
