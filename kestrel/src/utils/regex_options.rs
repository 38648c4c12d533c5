use log::error;
use regex::{Regex, RegexBuilder};

/// Create a compiled Regex that ignores case. NTFS name comparisons are case-insensitive
pub(crate) fn create_caseless_regex(input: &str) -> Result<Regex, regex::Error> {
    let regex_result = RegexBuilder::new(input).case_insensitive(true).build();
    match regex_result {
        Ok(result) => Ok(result),
        Err(err) => {
            error!("[kestrel] Bad regex {input}, error: {err:?}");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::regex_options::create_caseless_regex;

    #[test]
    fn test_create_caseless_regex() {
        let regex = create_caseless_regex(r"zone\.identifier").unwrap();
        assert_eq!(regex.is_match("Zone.Identifier"), true);
        assert_eq!(regex.is_match("other"), false);
    }
}
