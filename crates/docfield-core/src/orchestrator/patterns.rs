//! Built-in regex candidates for common invoice fields
//!
//! Each field has an ordered candidate list. The first candidate that matches
//! the page text wins and its first capture group is the value.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::error::DocFieldError;

/// Dates written as `March 5, 2024` or `03/05/24`
const DATE: &str = r"([A-Za-z]+\s+\d{1,2},?\s+\d{4}|\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\d{4}-\d{2}-\d{2})";

/// Amounts such as `1,250.00`
const AMOUNT: &str = r"\$?\s*([\d,]+\.?\d{0,2})";

pub struct FieldPattern {
    pub field: &'static str,
    pub candidates: Vec<Regex>,
}

fn candidates(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?im){}", p)).unwrap())
        .collect()
}

lazy_static! {
    /// Invoice field patterns in extraction order
    pub static ref INVOICE_PATTERNS: Vec<FieldPattern> = vec![
        FieldPattern {
            field: "invoice_number",
            candidates: candidates(&[
                r"invoice\s*(?:number|#|no\.?)\s*[:#]?\s*([A-Z0-9][A-Z0-9-]*)".to_string(),
                r"\b(INV[-\s]?\d[\w-]*)".to_string(),
            ]),
        },
        FieldPattern {
            field: "invoice_date",
            candidates: candidates(&[
                format!(r"invoice\s*date\s*[:.]?\s*{}", DATE),
                format!(r"\bdate\s*[:.]?\s*{}", DATE),
            ]),
        },
        FieldPattern {
            field: "due_date",
            candidates: candidates(&[
                format!(r"(?:due\s*date|payment\s*due)\s*[:.]?\s*{}", DATE),
                format!(r"\bdue\s*(?:on|by)?\s*[:.]?\s*{}", DATE),
            ]),
        },
        FieldPattern {
            field: "total",
            candidates: candidates(&[
                format!(r"(?:\btotal|amount\s*due)\s*[:.]?\s*{}", AMOUNT),
                format!(r"(?:balance\s*due|grand\s*total)\s*[:.]?\s*{}", AMOUNT),
            ]),
        },
        FieldPattern {
            field: "subtotal",
            candidates: candidates(&[format!(r"sub\s*-?\s*total\s*[:.]?\s*{}", AMOUNT)]),
        },
        FieldPattern {
            field: "tax",
            candidates: candidates(&[
                format!(r"\b(?:tax|vat)\b\s*(?:\([\d.]+%\))?\s*[:.]?\s*{}", AMOUNT),
                format!(r"\b(?:gst|hst|sales\s*tax)\b\s*[:.]?\s*{}", AMOUNT),
            ]),
        },
        FieldPattern {
            field: "bill_to_name",
            candidates: candidates(&[
                r"(?:bill\s*to|customer)[:\s]*([A-Za-z][A-Za-z .&]*?)\s*$".to_string(),
                r"(?:sold\s*to|ship\s*to)[:\s]*([A-Za-z][A-Za-z .&]*?)\s*$".to_string(),
            ]),
        },
        FieldPattern {
            field: "bill_to_address",
            candidates: candidates(&[
                r"bill\s*to.*\n(?:.*\n)?([A-Za-z0-9 ,]+(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd)\b[^\n]*)".to_string(),
                r"^(\d+\s+[A-Za-z0-9 ]+(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd)\b[^\n]*)".to_string(),
            ]),
        },
    ];
}

/// First capture of the first matching candidate
pub fn first_match(candidates: &[Regex], text: &str) -> Option<String> {
    candidates.iter().find_map(|re| capture(re, text))
}

/// Group 1 when the pattern has one, otherwise the whole match; trimmed and non-empty
pub fn capture(re: &Regex, text: &str) -> Option<String> {
    let caps = re.captures(text)?;
    let m = caps.get(1).or_else(|| caps.get(0))?;
    let value = m.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Compile a caller-supplied pattern with the same flags as the built-ins
pub fn compile_custom(pattern: &str) -> Result<Regex, DocFieldError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|e| DocFieldError::InvalidInput(format!("Invalid pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(field: &str, text: &str) -> Option<String> {
        let pattern = INVOICE_PATTERNS.iter().find(|p| p.field == field).unwrap();
        first_match(&pattern.candidates, text)
    }

    const SAMPLE: &str = concat!(
        "ACME Supplies\n",
        "Invoice Number: INV-2024-100\n",
        "Invoice Date: March 5, 2024\n",
        "Due Date: 04/05/2024\n",
        "Bill To: Jane Smith\n",
        "123 Main Street, Springfield\n",
        "Subtotal: 1,000.00\n",
        "Tax (8%): 80.00\n",
        "Total: $1,080.00"
    );

    #[test]
    fn test_builtin_patterns_on_sample() {
        assert_eq!(extract("invoice_number", SAMPLE).as_deref(), Some("INV-2024-100"));
        assert_eq!(extract("invoice_date", SAMPLE).as_deref(), Some("March 5, 2024"));
        assert_eq!(extract("due_date", SAMPLE).as_deref(), Some("04/05/2024"));
        assert_eq!(extract("subtotal", SAMPLE).as_deref(), Some("1,000.00"));
        assert_eq!(extract("tax", SAMPLE).as_deref(), Some("80.00"));
        assert_eq!(extract("bill_to_name", SAMPLE).as_deref(), Some("Jane Smith"));
        assert_eq!(
            extract("bill_to_address", SAMPLE).as_deref(),
            Some("123 Main Street, Springfield")
        );
    }

    #[test]
    fn test_total_skips_subtotal() {
        assert_eq!(extract("total", SAMPLE).as_deref(), Some("1,080.00"));
    }

    #[test]
    fn test_fallback_candidate() {
        assert_eq!(extract("invoice_number", "Ref INV-77 attached").as_deref(), Some("INV-77"));
        assert_eq!(extract("total", "Balance due: 12.50").as_deref(), Some("12.50"));
    }

    #[test]
    fn test_compile_custom() {
        let re = compile_custom(r"PO\s*#?\s*(\d+)").unwrap();
        assert_eq!(capture(&re, "po # 4411").as_deref(), Some("4411"));
        assert!(compile_custom("(unclosed").is_err());
    }
}
