//! RPC route parsing.
//!
//! The only THTP route shape is `POST /<service_path>/<rpc_name>[/]`,
//! where `<service_path>` is the dotted-lowercase service name and
//! `<rpc_name>` is a Thrift identifier. Matching is plain string walking;
//! no regex in the hot path, and the match is deterministic.

/// Extracts the RPC name when `path` matches the service route shape.
///
/// Returns `None` for every other path — the caller decides between the
/// wrapped application and a bad-request response. The trailing slash is
/// optional.
pub(crate) fn match_rpc<'a>(service_path: &str, path: &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix('/')?.strip_prefix(service_path)?;
    let rest = rest.strip_prefix('/')?;
    let rpc = rest.strip_suffix('/').unwrap_or(rest);
    is_rpc_name(rpc).then_some(rpc)
}

/// A Thrift identifier: `[A-Za-z_][A-Za-z0-9_.]*`.
fn is_rpc_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// True for `/health` and `/health/`.
pub(crate) fn is_health(path: &str) -> bool {
    matches!(path, "/health" | "/health/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE: &str = "thtp.test.calculator_service";

    #[test]
    fn plain_route_matches() {
        assert_eq!(
            match_rpc(SERVICE, "/thtp.test.calculator_service/do_operation"),
            Some("do_operation")
        );
    }

    #[test]
    fn trailing_slash_is_accepted() {
        assert_eq!(
            match_rpc(SERVICE, "/thtp.test.calculator_service/do_operation/"),
            Some("do_operation")
        );
    }

    #[test]
    fn wrong_prefix_does_not_match() {
        assert_eq!(match_rpc(SERVICE, "/other.service/do_operation"), None);
        assert_eq!(match_rpc(SERVICE, "/thtp.test.calculator_servicex/op"), None);
        assert_eq!(match_rpc(SERVICE, "/thtp.test.calculator_service"), None);
    }

    #[test]
    fn extra_segments_do_not_match() {
        assert_eq!(
            match_rpc(SERVICE, "/thtp.test.calculator_service/do_operation/extra"),
            None
        );
    }

    #[test]
    fn invalid_identifiers_do_not_match() {
        assert_eq!(match_rpc(SERVICE, "/thtp.test.calculator_service/9lives"), None);
        assert_eq!(match_rpc(SERVICE, "/thtp.test.calculator_service/do-op"), None);
        assert_eq!(match_rpc(SERVICE, "/thtp.test.calculator_service//"), None);
    }

    #[test]
    fn identifier_grammar() {
        assert!(is_rpc_name("_private"));
        assert!(is_rpc_name("do_operation"));
        assert!(is_rpc_name("ns.method2"));
        assert!(!is_rpc_name(""));
        assert!(!is_rpc_name("2start"));
    }
}
