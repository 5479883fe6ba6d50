//! Extraction of the numeric payload from conversion service replies.
//!
//! The service answers with a tiny XML document such as
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8"?><string xmlns="https://www.w3schools.com/xml/">104</string>
//! ```
//!
//! The payload is taken positionally: it is the text between the second `>`
//! of the document and the `<` that follows it. No XML parsing is done, so a
//! reply without a prolog would yield the wrong slice; this mirrors what the
//! service is known to send.

use crate::transform::TransformError;

/// Returns the text between the second `>` and the next `<`.
///
/// # Errors
///
/// Returns [`TransformError::MalformedResponse`] if either `>` or the closing
/// `<` is missing.
pub fn trim_xml_response(body: &str) -> Result<&str, TransformError> {
    let malformed = || TransformError::MalformedResponse {
        body: body.to_string(),
    };

    let first = body.find('>').ok_or_else(malformed)?;
    let second = body[first + 1..]
        .find('>')
        .map(|offset| first + 1 + offset)
        .ok_or_else(malformed)?;
    let start = second + 1;
    let end = body[start..]
        .find('<')
        .map(|offset| start + offset)
        .ok_or_else(malformed)?;

    Ok(&body[start..end])
}

/// Extracts the payload and parses it as a number.
///
/// Surrounding whitespace inside the element is ignored.
///
/// # Errors
///
/// Returns [`TransformError::MalformedResponse`] when the payload cannot be
/// located and [`TransformError::InvalidNumber`] when it is not a finite
/// number (`NaN` and infinities are rejected).
pub fn parse_xml_number(body: &str) -> Result<f64, TransformError> {
    let text = trim_xml_response(body)?.trim();
    text.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| TransformError::InvalidNumber {
            text: text.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const REPLY: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
                         <string xmlns=\"https://www.w3schools.com/xml/\">104</string>";

    #[test]
    fn extracts_inner_text_after_prolog() {
        assert_eq!(trim_xml_response(REPLY).unwrap(), "104");
        assert!((parse_xml_number(REPLY).unwrap() - 104.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tolerates_line_breaks_between_prolog_and_element() {
        let body = "<?xml version=\"1.0\"?>\r\n<string>-40</string>\r\n";
        assert_eq!(trim_xml_response(body).unwrap(), "-40");
        assert!((parse_xml_number(body).unwrap() + 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn extraction_is_positional_not_structural() {
        // Without a prolog the second '>' closes the value element.
        assert_eq!(trim_xml_response("<a>1</a><b>2</b>").unwrap(), "");
    }

    #[test]
    fn missing_delimiters_are_malformed() {
        for body in ["", "104", "<a>104", "<a><b>104"] {
            assert!(
                matches!(
                    trim_xml_response(body),
                    Err(TransformError::MalformedResponse { .. })
                ),
                "{body:?} should be malformed"
            );
        }
    }

    #[test]
    fn non_numeric_payload_is_rejected() {
        let err = parse_xml_number("<?x?><string>Error</string>").unwrap_err();
        assert_eq!(
            err,
            TransformError::InvalidNumber {
                text: "Error".to_string()
            }
        );
    }

    #[test]
    fn non_finite_payload_is_rejected() {
        for text in ["NaN", "inf", "-infinity", "Infinity"] {
            let body = format!("<?x?><s>{text}</s>");
            assert_eq!(
                parse_xml_number(&body),
                Err(TransformError::InvalidNumber {
                    text: text.to_string()
                })
            );
        }
    }

    proptest! {
        #[test]
        fn wrapped_numbers_round_trip(n in -1_000_000i64..1_000_000) {
            let body = format!("<?xml version=\"1.0\"?><string xmlns=\"x\">{n}</string>");
            let text = n.to_string();
            prop_assert_eq!(trim_xml_response(&body).unwrap(), text.as_str());
            #[allow(clippy::cast_precision_loss)]
            let expected = n as f64;
            prop_assert!((parse_xml_number(&body).unwrap() - expected).abs() < f64::EPSILON);
        }

        #[test]
        fn never_panics(body in "\\PC*") {
            let _ = parse_xml_number(&body);
        }
    }
}
