use super::error::RuleError;

/// Injected content scanner evaluating named rules over stream bytes. The
/// engine only depends on this contract, how rules are compiled and matched
/// is the host's business
pub trait ContentScanner {
    /// Load rules from a source document
    fn add_rules(&mut self, source: &str) -> Result<(), RuleError>;

    fn enable_rule(&mut self, name: &str);

    fn disable_rule(&mut self, name: &str);

    /// Whether a rule name is known. Unknown names in a term are warned
    /// about but not fatal
    fn known_rule(&self, name: &str) -> bool;

    /// Scan bytes and return the names of every rule that fired
    fn scan(&mut self, data: &[u8]) -> Result<Vec<String>, RuleError>;
}

/// Scanner used when the host injects none: knows no rules, fires nothing
#[derive(Debug, Default)]
pub struct NoopScanner;

impl ContentScanner for NoopScanner {
    fn add_rules(&mut self, _source: &str) -> Result<(), RuleError> {
        Ok(())
    }

    fn enable_rule(&mut self, _name: &str) {}

    fn disable_rule(&mut self, _name: &str) {}

    fn known_rule(&self, _name: &str) -> bool {
        false
    }

    fn scan(&mut self, _data: &[u8]) -> Result<Vec<String>, RuleError> {
        Ok(Vec::new())
    }
}
