use regex::Regex;
use std::sync::OnceLock;

/// Patterns for data that must not reach log output
pub struct SanitizationPatterns {
    email: Regex,
    api_key: Regex,
    bearer_token: Regex,
    secret_field: Regex,
    ipv4_address: Regex,
}

static PATTERNS: OnceLock<SanitizationPatterns> = OnceLock::new();

pub fn get_patterns() -> &'static SanitizationPatterns {
    PATTERNS.get_or_init(|| SanitizationPatterns {
        // Keep the domain visible
        email: compile(r"\b([a-zA-Z0-9._%+-]+)@([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})\b"),
        api_key: compile(r"\b(sk_|pk_|api_|key_)[a-zA-Z0-9_]{15,}\b"),
        bearer_token: compile(r"Bearer\s+[a-zA-Z0-9\-_\.]+"),
        secret_field: compile(r"(?i)(password|passwd|pwd|token)\s*[:=]\s*\S+"),
        // Subnet only
        ipv4_address: compile(r"\b(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})\b"),
    })
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("sanitization pattern is a valid regex literal")
}

/// Strip credentials and personal data from a log message.
///
/// Numbers are left alone so calculation inputs and results stay readable.
/// - emails become `***@domain`
/// - API keys and bearer tokens become `[REDACTED]`
/// - `password=`/`token=` style fields keep the key, lose the value
/// - IPv4 addresses keep the first two octets
pub fn sanitize_log_message(message: &str) -> String {
    let patterns = get_patterns();
    let mut result = message.to_string();

    result = patterns.email.replace_all(&result, "***@$2").to_string();
    result = patterns.api_key.replace_all(&result, "[REDACTED]").to_string();
    result = patterns.bearer_token.replace_all(&result, "Bearer [REDACTED]").to_string();
    result = patterns.secret_field.replace_all(&result, "$1=[REDACTED]").to_string();
    result = patterns.ipv4_address.replace_all(&result, "$1.$2.x.x").to_string();

    result
}
