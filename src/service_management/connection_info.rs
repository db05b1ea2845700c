use crate::service_management::types::{ConnectionStrings, RenderedConnection, TrackedService};

pub const PASSWORD_MASK: &str = "******";

/// Renders the URI and key-value connection strings for a tracked service.
///
/// The mask is inserted verbatim; real credentials are escaped for each form.
pub fn connection_strings(service: &TrackedService) -> ConnectionStrings {
    ConnectionStrings {
        uri: RenderedConnection {
            obfuscated: uri(service, PASSWORD_MASK),
            clear: uri(service, &percent_encode(&service.password)),
        },
        kv: RenderedConnection {
            obfuscated: key_value(service, PASSWORD_MASK),
            clear: key_value(service, &kv_value(&service.password)),
        },
    }
}

fn uri(service: &TrackedService, password: &str) -> String {
    format!(
        "postgresql://{}:{}@localhost:{}/{}",
        percent_encode(&service.user),
        password,
        service.port,
        percent_encode(&service.db_name)
    )
}

fn key_value(service: &TrackedService, password: &str) -> String {
    format!(
        "host=localhost port={} dbname={} user={} password={}",
        service.port,
        kv_value(&service.db_name),
        kv_value(&service.user),
        password
    )
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn percent_encode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

/// Quotes a libpq keyword value when it is empty or holds a space, `'` or `\`.
fn kv_value(raw: &str) -> String {
    let needs_quotes = raw.is_empty()
        || raw
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return raw.to_string();
    }
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('\'');
    for c in raw.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}
