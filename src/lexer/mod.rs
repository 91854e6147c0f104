use logos::Logos;

/// Tokens for the trailing block of a sliced G-code file.
/// Slicers write their settings as `; key = value` comment lines at EOF; code
/// lines are kept as opaque tokens so the comment split stays line-accurate.

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f\r]+")] // Skip whitespace
#[logos(error = LexerError)]
pub enum Token<'s> {
    // Everything from `;` to end of line
    #[regex(r";[^\n]*", |lex| lex.slice())]
    Comment(&'s str),

    // Machine code before an inline comment, e.g. `G1 X10 ; move`
    #[regex(r"[^; \t\f\r\n][^;\n]*", |lex| lex.slice())]
    Code(&'s str),

    #[token("\n")]
    Newline,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LexerError;

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lexer error")
    }
}

impl std::error::Error for LexerError {}

/// A slicer comment split into its key and optional value.
///
/// `; filament_type = PLA;PETG` gives key `filament_type` and value `PLA;PETG`.
/// A bare marker such as `; skip_validation` has no value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setting<'s> {
    pub key: &'s str,
    pub value: Option<&'s str>,
    pub line: usize,
}

/// Lex the input string into tokens
pub fn lex(input: &str) -> Vec<(Token<'_>, logos::Span)> {
    Token::lexer(input)
        .spanned()
        .filter_map(|(result, span)| match result {
            Ok(token) => Some((token, span)),
            Err(_) => None,
        })
        .collect()
}

/// Collect every comment of the input as a key/value setting, in file order.
pub fn settings(input: &str) -> Vec<Setting<'_>> {
    let mut line = 1;
    let mut out = Vec::new();

    for (token, _) in lex(input) {
        match token {
            Token::Newline => line += 1,
            Token::Comment(text) => {
                if let Some(setting) = split_comment(text, line) {
                    out.push(setting);
                }
            }
            Token::Code(_) => {}
        }
    }

    out
}

fn split_comment(text: &str, line: usize) -> Option<Setting<'_>> {
    let body = text.trim_start_matches(';').trim();
    if body.is_empty() {
        return None;
    }

    let setting = match body.split_once('=') {
        Some((key, value)) => Setting {
            key: key.trim(),
            value: Some(value.trim()),
            line,
        },
        None => Setting {
            key: body,
            value: None,
            line,
        },
    };
    Some(setting)
}
