//! Quote-aware command tokenization
//!
//! Command templates are plain strings split on whitespace, except that a
//! piece carrying a `"` opens a quoted span which continues (re-joined with
//! single spaces) until a piece containing the closing `"` is seen. This
//! lets a single logical argument contain embedded spaces without the caller
//! building argv vectors by hand.

use crate::error::ExecError;

/// Split a command template into argv tokens.
///
/// Quote characters are stripped from emitted tokens. An opening quote that
/// is never closed is a caller error and is rejected rather than silently
/// emitting a truncated argument.
pub fn tokenize(input: &str) -> Result<Vec<String>, ExecError> {
    let mut tokens = Vec::new();
    let mut quoted: Option<Vec<String>> = None;

    for piece in input.split_whitespace() {
        match quoted.as_mut() {
            None if piece.contains('"') => {
                // the first quote opens the span; a further quote in the
                // same piece closes it again immediately
                let rest = piece.replacen('"', "", 1);
                if rest.contains('"') {
                    tokens.push(rest.replace('"', ""));
                } else {
                    quoted = Some(vec![rest]);
                }
            }
            None => tokens.push(piece.to_string()),
            Some(span) => {
                if piece.contains('"') {
                    span.push(piece.replace('"', ""));
                    tokens.push(span.join(" "));
                    quoted = None;
                } else {
                    span.push(piece.to_string());
                }
            }
        }
    }

    if quoted.is_some() {
        // scan ended still inside a quote
        return Err(ExecError::UnbalancedQuote {
            input: input.to_string(),
        });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tokens() {
        assert_eq!(
            tokenize("kubectl get pods").unwrap(),
            vec!["kubectl", "get", "pods"]
        );
    }

    #[test]
    fn quoted_span_is_one_token() {
        assert_eq!(
            tokenize(r#"foo "bar baz" qux"#).unwrap(),
            vec!["foo", "bar baz", "qux"]
        );
    }

    #[test]
    fn quoted_span_spanning_many_pieces() {
        assert_eq!(
            tokenize(r#"sh -c "cat /id_rsa.pub >> /root/.ssh/authorized_keys""#).unwrap(),
            vec!["sh", "-c", "cat /id_rsa.pub >> /root/.ssh/authorized_keys"]
        );
    }

    #[test]
    fn quote_opening_and_closing_in_same_piece() {
        assert_eq!(tokenize(r#"echo "hi" there"#).unwrap(), vec!["echo", "hi", "there"]);
    }

    #[test]
    fn span_closes_on_piece_merely_containing_the_quote() {
        assert_eq!(
            tokenize(r#"foo "a b"c qux"#).unwrap(),
            vec!["foo", "a bc", "qux"]
        );
    }

    #[test]
    fn span_opens_mid_piece() {
        assert_eq!(
            tokenize(r#"-o ProxyCommand="ssh -W %h:%p""#).unwrap(),
            vec!["-o", "ProxyCommand=ssh -W %h:%p"]
        );
    }

    #[test]
    fn unbalanced_quote_is_an_error() {
        let err = tokenize(r#"echo "never closed"#).unwrap_err();
        assert!(matches!(err, ExecError::UnbalancedQuote { .. }));
    }

    #[test]
    fn collapses_repeated_whitespace() {
        assert_eq!(tokenize("a   b\t c").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("   ").unwrap().is_empty());
    }
}
