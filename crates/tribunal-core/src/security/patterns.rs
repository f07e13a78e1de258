//! Built-in security detection patterns.
//!
//! The default table the gate scans with when no external table is
//! configured, or in addition to one when `include_builtin` is set.
//! Method-call forms such as `regex.exec(` are excluded from the bare
//! call rules by requiring a non-`.` character before the name.

use lazy_static::lazy_static;

use super::table::{PatternRule, PatternTable};
use crate::types::Severity;

/// (category, pattern, severity, description)
const BUILTIN_PATTERNS: &[(&str, &str, Severity, &str)] = &[
    // =========================================================================
    // CODE EXECUTION
    // =========================================================================
    (
        "code_execution",
        r"(?:^|[^.\w])eval\s*\(",
        Severity::Critical,
        "dynamic evaluation of code",
    ),
    (
        "code_execution",
        r"(?:^|[^.\w])exec\s*\(",
        Severity::Critical,
        "dynamic execution of code",
    ),
    (
        "code_execution",
        r"\bos\.(?:system|popen)\s*\(",
        Severity::Critical,
        "shell command via os.system/os.popen",
    ),
    (
        "code_execution",
        r"\bsubprocess\.\w+\s*\([^)]*shell\s*=\s*True",
        Severity::Critical,
        "subprocess invoked through a shell",
    ),
    (
        "code_execution",
        r"Runtime\.getRuntime\(\)\s*\.exec\s*\(",
        Severity::Critical,
        "Java Runtime.exec",
    ),
    (
        "code_execution",
        r#"Command::new\s*\(\s*"(?:/bin/)?(?:sh|bash|zsh|cmd(?:\.exe)?|powershell)""#,
        Severity::Critical,
        "process spawned through a shell interpreter",
    ),
    (
        "code_execution",
        r"\brm\s+-(?:rf|fr)\s+/(?:\s|$|\*)",
        Severity::Critical,
        "recursive deletion of the filesystem root",
    ),
    (
        "code_execution",
        r"(?:^|[^.\w])system\s*\(",
        Severity::High,
        "C library system() call",
    ),
    (
        "code_execution",
        r"\bnew\s+Function\s*\(",
        Severity::High,
        "JavaScript Function constructor",
    ),
    (
        "code_execution",
        r"\b(?:execSync|spawnSync)\s*\(",
        Severity::High,
        "synchronous child process",
    ),
    (
        "code_execution",
        r"\b__import__\s*\(",
        Severity::High,
        "dynamic import",
    ),
    (
        "code_execution",
        r"\b(?:pickle|marshal)\.loads?\s*\(",
        Severity::High,
        "deserialization of untrusted bytes",
    ),
    // =========================================================================
    // DATA EXFILTRATION
    // =========================================================================
    (
        "data_exfiltration",
        r"\b(?:curl|wget)\b[^\n|]*\|\s*(?:sudo\s+)?(?:ba|z)?sh\b",
        Severity::Critical,
        "remote script piped into a shell",
    ),
    (
        "data_exfiltration",
        r"/dev/tcp/",
        Severity::Critical,
        "bash network redirection",
    ),
    (
        "data_exfiltration",
        r"\b(?:nc|ncat|netcat)\s+(?:-\w+\s+)*-\w*e\b",
        Severity::Critical,
        "netcat reverse shell",
    ),
    (
        "data_exfiltration",
        r"(?:os\.environ|process\.env|getenv\s*\()[^\n]{0,120}(?:requests\.post|fetch\s*\(|urlopen|axios\.post|http\.post)",
        Severity::High,
        "environment data sent over the network",
    ),
    (
        "data_exfiltration",
        r"(?:requests\.post|fetch\s*\(|urlopen|axios\.post|http\.post)[^\n]{0,120}(?:os\.environ|process\.env|getenv\s*\()",
        Severity::High,
        "network request carrying environment data",
    ),
    (
        "data_exfiltration",
        r"/etc/(?:passwd|shadow)\b|~/\.ssh/|\.aws/credentials",
        Severity::High,
        "access to system credential files",
    ),
    (
        "data_exfiltration",
        r"\b(?:socket\.connect|net\.connect|new\s+WebSocket)\s*\(",
        Severity::Medium,
        "raw network connection",
    ),
    // =========================================================================
    // CREDENTIAL EXPOSURE
    // =========================================================================
    (
        "credential_exposure",
        r#"(?i)(api[_-]?key|secret[_-]?key|access[_-]?token|auth[_-]?token|bearer|password|secret|token)[\s:=]+['"]?[a-zA-Z0-9_-]{16,}['"]?"#,
        Severity::High,
        "hardcoded API key, secret or token",
    ),
    (
        "credential_exposure",
        r"(AKIA|ABIA|ACCA|AGPA|AIDA|AIPA|ANPA|ANVA|AROA|ASCA|ASIA)[A-Z0-9]{16}",
        Severity::Critical,
        "AWS access key",
    ),
    (
        "credential_exposure",
        r"-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----",
        Severity::Critical,
        "embedded private key",
    ),
    // =========================================================================
    // PROMPT INJECTION
    // =========================================================================
    (
        "prompt_injection",
        r"(?i)\bignore\s+(?:all\s+)?(?:the\s+)?(?:previous|prior|above)\s+instructions",
        Severity::Critical,
        "instruction override phrasing",
    ),
    (
        "prompt_injection",
        r"(?i)\bdisregard\s+(?:the\s+|your\s+)?(?:system|previous)\s+prompt",
        Severity::Critical,
        "system prompt override phrasing",
    ),
    (
        "prompt_injection",
        r"(?i)\breveal\s+(?:your\s+|the\s+)?(?:system\s+prompt|hidden\s+instructions)",
        Severity::High,
        "system prompt extraction phrasing",
    ),
    (
        "prompt_injection",
        r"(?i)\byou\s+are\s+now\s+(?:in\s+)?(?:developer|jailbreak|dan)\s+mode",
        Severity::High,
        "jailbreak persona phrasing",
    ),
    // =========================================================================
    // SUSPICIOUS IMPORTS
    // =========================================================================
    (
        "suspicious_import",
        r"(?m)^\s*(?:import|from)\s+(?:ctypes|pty|marshal)\b",
        Severity::Medium,
        "low-level or shell-capable Python module",
    ),
    (
        "suspicious_import",
        r#"require\s*\(\s*['"](?:child_process|vm)['"]\s*\)|from\s+['"](?:node:)?child_process['"]"#,
        Severity::Medium,
        "Node process or VM module",
    ),
    (
        "suspicious_import",
        r"(?m)^\s*use\s+std::process\b",
        Severity::Low,
        "Rust process spawning",
    ),
    (
        "suspicious_import",
        r"(?m)^\s*import\s+java\.lang\.reflect\b",
        Severity::Low,
        "Java reflection",
    ),
];

lazy_static! {
    static ref BUILTIN_TABLE: PatternTable = PatternTable::compile(builtin_rules()).unwrap();
}

/// The built-in rules in table form.
pub fn builtin_rules() -> Vec<PatternRule> {
    BUILTIN_PATTERNS
        .iter()
        .map(|(category, pattern, severity, description)| {
            PatternRule::new(*category, *pattern, *severity, *description)
        })
        .collect()
}

/// The compiled built-in table.
pub fn builtin_table() -> PatternTable {
    BUILTIN_TABLE.clone()
}
