//! Delimiter balance scanning that skips strings and comments.
//!
//! The scanner is a small hand-rolled lexer: it only knows enough about
//! each language's literal and comment syntax to avoid counting a `{`
//! inside `"a { b"` or `// }`. It is not a parser.

use thiserror::Error;

/// Literal and comment syntax for one family of languages.
#[derive(Debug, Clone, Copy)]
pub struct LexSyntax {
    pub line_comment: Option<&'static str>,
    pub block_comment: Option<(&'static str, &'static str)>,
    /// `'x'` is a character literal rather than a string
    pub char_literals: bool,
    /// JavaScript template strings delimited by backticks
    pub backtick_strings: bool,
    /// Python `'''` / `"""`
    pub triple_quotes: bool,
    /// Go raw strings delimited by backticks
    pub raw_backticks: bool,
    /// Plain `"..."` literals may span lines
    pub multiline_strings: bool,
    /// Rust `r"..."`, `r#"..."#`, `br#"..."#`
    pub hashed_raw_strings: bool,
    /// C++ `R"delim(...)delim"`
    pub delimited_raw_strings: bool,
    /// C# `@"..."` with `""` as the only escape
    pub verbatim_strings: bool,
    /// JavaScript `/pattern/flags` in expression position
    pub regex_literals: bool,
}

impl LexSyntax {
    pub const C_LIKE: LexSyntax = LexSyntax {
        line_comment: Some("//"),
        block_comment: Some(("/*", "*/")),
        char_literals: true,
        backtick_strings: false,
        triple_quotes: false,
        raw_backticks: false,
        multiline_strings: false,
        hashed_raw_strings: false,
        delimited_raw_strings: false,
        verbatim_strings: false,
        regex_literals: false,
    };

    pub const CPP: LexSyntax = LexSyntax {
        delimited_raw_strings: true,
        ..LexSyntax::C_LIKE
    };

    pub const RUST: LexSyntax = LexSyntax {
        multiline_strings: true,
        hashed_raw_strings: true,
        ..LexSyntax::C_LIKE
    };

    /// Java, Kotlin and Swift, which all have `"""` text blocks.
    pub const JVM: LexSyntax = LexSyntax {
        triple_quotes: true,
        ..LexSyntax::C_LIKE
    };

    /// C# 11 raw literals use `"""` like the JVM text blocks.
    pub const CSHARP: LexSyntax = LexSyntax {
        verbatim_strings: true,
        ..LexSyntax::JVM
    };

    pub const JAVASCRIPT: LexSyntax = LexSyntax {
        char_literals: false,
        backtick_strings: true,
        regex_literals: true,
        ..LexSyntax::C_LIKE
    };

    pub const GO: LexSyntax = LexSyntax {
        raw_backticks: true,
        ..LexSyntax::C_LIKE
    };

    pub const PYTHON: LexSyntax = LexSyntax {
        line_comment: Some("#"),
        block_comment: None,
        char_literals: false,
        backtick_strings: false,
        triple_quotes: true,
        raw_backticks: false,
        multiline_strings: false,
        hashed_raw_strings: false,
        delimited_raw_strings: false,
        verbatim_strings: false,
        regex_literals: false,
    };
}

/// Structural errors found while scanning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelimiterError {
    #[error("unexpected '{found}' at line {line}, column {column}")]
    UnexpectedClose {
        found: char,
        line: usize,
        column: usize,
    },

    #[error("'{open}' opened at line {open_line} closed by '{found}' at line {line}")]
    Mismatched {
        open: char,
        open_line: usize,
        found: char,
        line: usize,
    },

    #[error("'{open}' opened at line {line} is never closed")]
    Unclosed { open: char, line: usize },

    #[error("unterminated string literal starting at line {line}")]
    UnterminatedString { line: usize },

    #[error("unterminated block comment starting at line {line}")]
    UnterminatedComment { line: usize },
}

/// Counts gathered from a successful scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelimiterStats {
    pub pairs: usize,
    pub max_depth: usize,
}

/// Keywords after which a `/` begins a regular expression.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether a `/` at `i` can open a regex literal rather than divide.
fn regex_allowed(chars: &[char], i: usize) -> bool {
    let mut j = i;
    while j > 0 && chars[j - 1].is_whitespace() {
        j -= 1;
    }
    if j == 0 {
        return true;
    }
    let prev = chars[j - 1];
    if is_ident(prev) {
        let end = j;
        while j > 0 && is_ident(chars[j - 1]) {
            j -= 1;
        }
        let word: String = chars[j..end].iter().collect();
        return REGEX_PREFIX_KEYWORDS.contains(&word.as_str());
    }
    // `<` keeps JSX closing tags out
    !matches!(prev, ')' | ']' | '}' | '"' | '\'' | '`' | '.' | '$' | '<')
}

/// End (exclusive, flags included) of a regex literal opening at `i`.
/// `None` when the line ends first, in which case the `/` is a division.
fn regex_literal_end(chars: &[char], i: usize) -> Option<usize> {
    let mut j = i + 1;
    let mut in_class = false;
    while j < chars.len() {
        match chars[j] {
            '\n' => return None,
            '\\' => {
                j += 2;
                continue;
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                j += 1;
                while j < chars.len() && chars[j].is_ascii_alphabetic() {
                    j += 1;
                }
                return Some(j);
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// Opening of a Rust raw string at `i`: index after the quote and the
/// number of `#`s the closing quote must be followed by.
fn hashed_raw_open(chars: &[char], i: usize) -> Option<(usize, usize)> {
    if i > 0 && is_ident(chars[i - 1]) {
        return None;
    }
    let r = match chars[i] {
        'r' => i,
        'b' | 'c' if chars.get(i + 1) == Some(&'r') => i + 1,
        _ => return None,
    };
    let mut j = r + 1;
    let mut hashes = 0;
    while chars.get(j) == Some(&'#') {
        hashes += 1;
        j += 1;
    }
    (chars.get(j) == Some(&'"')).then_some((j + 1, hashes))
}

/// Opening of a C++ raw string at `i`: index after `(` and the closing
/// sequence `)delim"`.
fn delimited_raw_open(chars: &[char], i: usize) -> Option<(usize, Vec<char>)> {
    if chars[i] != 'R' || chars.get(i + 1) != Some(&'"') {
        return None;
    }
    let mut j = i + 2;
    let mut close = vec![')'];
    while j < chars.len() && chars[j] != '(' {
        let d = chars[j];
        if d.is_whitespace() || matches!(d, ')' | '\\' | '"') || close.len() > 16 {
            return None;
        }
        close.push(d);
        j += 1;
    }
    if j >= chars.len() {
        return None;
    }
    close.push('"');
    Some((j + 1, close))
}

/// Index just past the first occurrence of `token` at or after `from`.
fn find_after(chars: &[char], from: usize, token: &[char]) -> Option<usize> {
    (from..chars.len())
        .find(|&j| chars[j..].starts_with(token))
        .map(|j| j + token.len())
}

/// Opening of a C# verbatim string (`@"` or `@$"`) at `i`.
fn verbatim_open(chars: &[char], i: usize) -> Option<usize> {
    if chars[i] != '@' {
        return None;
    }
    match (chars.get(i + 1), chars.get(i + 2)) {
        (Some('"'), _) => Some(i + 2),
        (Some('$'), Some('"')) => Some(i + 3),
        _ => None,
    }
}

/// Index just past the closing quote of a verbatim string body.
fn verbatim_end(chars: &[char], from: usize) -> Option<usize> {
    let mut j = from;
    while j < chars.len() {
        if chars[j] == '"' {
            if chars.get(j + 1) == Some(&'"') {
                j += 2;
                continue;
            }
            return Some(j + 1);
        }
        j += 1;
    }
    None
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Check that `()`, `[]` and `{}` balance outside of literals and comments.
pub fn scan_delimiters(code: &str, syntax: &LexSyntax) -> Result<DelimiterStats, DelimiterError> {
    let chars: Vec<char> = code.chars().collect();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut stats = DelimiterStats::default();
    let mut line = 1;
    let mut column = 0;
    let mut i = 0;

    let starts_with = |i: usize, token: &str| -> bool {
        let mut j = i;
        for t in token.chars() {
            if chars.get(j) != Some(&t) {
                return false;
            }
            j += 1;
        }
        true
    };

    while i < chars.len() {
        let c = chars[i];
        column += 1;

        if c == '\n' {
            line += 1;
            column = 0;
            i += 1;
            continue;
        }

        if let Some(marker) = syntax.line_comment {
            if starts_with(i, marker) {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
        }

        if let Some((open, close)) = syntax.block_comment {
            if starts_with(i, open) {
                let start_line = line;
                i += open.chars().count();
                loop {
                    if i >= chars.len() {
                        return Err(DelimiterError::UnterminatedComment { line: start_line });
                    }
                    if starts_with(i, close) {
                        i += close.chars().count();
                        break;
                    }
                    if chars[i] == '\n' {
                        line += 1;
                        column = 0;
                    }
                    i += 1;
                }
                continue;
            }
        }

        // Raw and verbatim literals: skip to the end, counting lines
        let raw_end = if let Some((body, hashes)) =
            hashed_raw_open(&chars, i).filter(|_| syntax.hashed_raw_strings)
        {
            let mut close = vec!['"'];
            close.resize(hashes + 1, '#');
            Some(find_after(&chars, body, &close))
        } else if let Some((body, close)) =
            delimited_raw_open(&chars, i).filter(|_| syntax.delimited_raw_strings)
        {
            Some(find_after(&chars, body, &close))
        } else if let Some(body) = verbatim_open(&chars, i).filter(|_| syntax.verbatim_strings) {
            Some(verbatim_end(&chars, body))
        } else {
            None
        };
        if let Some(end) = raw_end {
            let start_line = line;
            let end = end.ok_or(DelimiterError::UnterminatedString { line: start_line })?;
            let newlines = chars[i..end].iter().filter(|&&d| d == '\n').count();
            if newlines > 0 {
                line += newlines;
                column = 0;
            }
            i = end;
            continue;
        }

        if syntax.regex_literals && c == '/' && regex_allowed(&chars, i) {
            if let Some(end) = regex_literal_end(&chars, i) {
                column += end - i - 1;
                i = end;
                continue;
            }
        }

        if syntax.triple_quotes && (starts_with(i, "\"\"\"") || starts_with(i, "'''")) {
            let quote: String = chars[i..i + 3].iter().collect();
            let start_line = line;
            i += 3;
            loop {
                if i >= chars.len() {
                    return Err(DelimiterError::UnterminatedString { line: start_line });
                }
                if chars[i] == '\\' {
                    i += 2;
                    continue;
                }
                if starts_with(i, &quote) {
                    i += 3;
                    break;
                }
                if chars[i] == '\n' {
                    line += 1;
                    column = 0;
                }
                i += 1;
            }
            continue;
        }

        let multiline_quote = (syntax.backtick_strings || syntax.raw_backticks) && c == '`';
        if c == '"' || multiline_quote || (c == '\'' && !syntax.char_literals) {
            let start_line = line;
            let escapes = !(syntax.raw_backticks && c == '`');
            i += 1;
            loop {
                if i >= chars.len() {
                    return Err(DelimiterError::UnterminatedString { line: start_line });
                }
                let d = chars[i];
                if escapes && d == '\\' {
                    i += 2;
                    continue;
                }
                if d == c {
                    i += 1;
                    break;
                }
                if d == '\n' {
                    if !multiline_quote && !(c == '"' && syntax.multiline_strings) {
                        return Err(DelimiterError::UnterminatedString { line: start_line });
                    }
                    line += 1;
                    column = 0;
                }
                i += 1;
            }
            continue;
        }

        if c == '\'' && syntax.char_literals {
            // 'x', '\n', '\u{1F600}' are literals; 'a (lifetime) is not
            if chars.get(i + 1) == Some(&'\\') {
                i += 3;
                while i < chars.len() && chars[i] != '\'' && chars[i] != '\n' {
                    i += 1;
                }
                i += 1;
                continue;
            }
            if chars.get(i + 2) == Some(&'\'') {
                i += 3;
                continue;
            }
            // lifetime, label or digit separator
            i += 1;
            continue;
        }

        match c {
            '(' | '[' | '{' => {
                stack.push((c, line));
                stats.max_depth = stats.max_depth.max(stack.len());
            }
            ')' | ']' | '}' => match stack.pop() {
                Some((open, _)) if closing_for(open) == c => stats.pairs += 1,
                Some((open, open_line)) => {
                    return Err(DelimiterError::Mismatched {
                        open,
                        open_line,
                        found: c,
                        line,
                    })
                }
                None => {
                    return Err(DelimiterError::UnexpectedClose {
                        found: c,
                        line,
                        column,
                    })
                }
            },
            _ => {}
        }
        i += 1;
    }

    if let Some((open, line)) = stack.pop() {
        return Err(DelimiterError::Unclosed { open, line });
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_rust() {
        let code = "fn main() {\n    let v = vec![1, 2];\n    println!(\"{}\", v[0]);\n}\n";
        let stats = scan_delimiters(code, &LexSyntax::RUST).unwrap();
        assert_eq!(stats.pairs, 6);
        assert_eq!(stats.max_depth, 3);
    }

    #[test]
    fn test_missing_close_brace() {
        let code = "fn main() {\n    if true {\n        run();\n}\n";
        let err = scan_delimiters(code, &LexSyntax::RUST).unwrap_err();
        assert_eq!(err, DelimiterError::Unclosed { open: '{', line: 1 });
    }

    #[test]
    fn test_mismatched_close() {
        let err = scan_delimiters("call(a, b];", &LexSyntax::C_LIKE).unwrap_err();
        assert!(matches!(
            err,
            DelimiterError::Mismatched { open: '(', found: ']', .. }
        ));
    }

    #[test]
    fn test_unexpected_close_reports_position() {
        let err = scan_delimiters("x = 1;\n}", &LexSyntax::C_LIKE).unwrap_err();
        assert_eq!(
            err,
            DelimiterError::UnexpectedClose { found: '}', line: 2, column: 1 }
        );
    }

    #[test]
    fn test_delimiters_in_strings_and_comments_are_ignored() {
        let code = r#"
// closing } in a comment
/* and { in a block */
let s = "{ not a block";
let c = '{';
"#;
        assert!(scan_delimiters(code, &LexSyntax::C_LIKE).is_ok());
    }

    #[test]
    fn test_rust_lifetimes_are_not_char_literals() {
        let code = "fn first<'a>(s: &'a str) -> &'a str { &s[..1] }";
        assert!(scan_delimiters(code, &LexSyntax::RUST).is_ok());
    }

    #[test]
    fn test_javascript_template_literal() {
        let code = "const s = `multi\nline { ${name}`;\nfunction f() { return s; }";
        assert!(scan_delimiters(code, &LexSyntax::JAVASCRIPT).is_ok());
    }

    #[test]
    fn test_python_triple_quotes() {
        let code = "def f():\n    \"\"\"Doc with ( unbalanced\n    \"\"\"\n    return [1, 2]\n";
        assert!(scan_delimiters(code, &LexSyntax::PYTHON).is_ok());
    }

    #[test]
    fn test_unterminated_block_comment() {
        let err = scan_delimiters("int x; /* never ends", &LexSyntax::C_LIKE).unwrap_err();
        assert_eq!(err, DelimiterError::UnterminatedComment { line: 1 });
    }

    #[test]
    fn test_unterminated_string() {
        let err = scan_delimiters("x = \"open\ny = 2", &LexSyntax::C_LIKE).unwrap_err();
        assert_eq!(err, DelimiterError::UnterminatedString { line: 1 });
    }

    #[test]
    fn test_rust_raw_strings_keep_inner_quotes() {
        let code = "pub fn quote() -> &'static str {\n    r#\"she said \"hi\"#\n}\n";
        assert!(scan_delimiters(code, &LexSyntax::RUST).is_ok());

        let code = "let p = r\"C:\\dir\\\";\nlet b = br##\"a \"# ( b\"##;\nfn f() {}\n";
        assert!(scan_delimiters(code, &LexSyntax::RUST).is_ok());
    }

    #[test]
    fn test_rust_raw_identifier_is_not_a_string() {
        let code = "fn r#match(r#type: u8) -> u8 { r#type }";
        let stats = scan_delimiters(code, &LexSyntax::RUST).unwrap();
        assert_eq!(stats.pairs, 2);
    }

    #[test]
    fn test_unterminated_rust_raw_string() {
        let code = "fn f() {}\nlet s = r#\"open \"\n";
        let err = scan_delimiters(code, &LexSyntax::RUST).unwrap_err();
        assert_eq!(err, DelimiterError::UnterminatedString { line: 2 });
    }

    #[test]
    fn test_javascript_regex_literal() {
        let code = "function escapeAttr(s) {\n  return s.replace(/\"/g, \"&quot;\");\n}\n";
        assert!(scan_delimiters(code, &LexSyntax::JAVASCRIPT).is_ok());

        let code = "const re = /[/(]+\\//i;\nif (re.test(x)) { y(); }\n";
        assert!(scan_delimiters(code, &LexSyntax::JAVASCRIPT).is_ok());
    }

    #[test]
    fn test_javascript_division_is_not_a_regex() {
        let code = "const half = (a + b) / 2;\nconst q = total / count / 3;\nf(half, q);\n";
        let stats = scan_delimiters(code, &LexSyntax::JAVASCRIPT).unwrap();
        assert_eq!(stats.pairs, 2);
    }

    #[test]
    fn test_csharp_verbatim_strings() {
        let code = "var p = @\"C:\\path \"\"quoted\"\"\";\nvar s = $@\"{x} \\\";\nvoid F() { }\n";
        assert!(scan_delimiters(code, &LexSyntax::CSHARP).is_ok());
    }

    #[test]
    fn test_cpp_raw_strings() {
        let code = "auto s = R\"x(quote \" and ) paren)x\";\nint main() { return 0; }\n";
        assert!(scan_delimiters(code, &LexSyntax::CPP).is_ok());
    }
}
