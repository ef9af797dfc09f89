//! This lexer tokenizes DMVM assembly.
//!
//! Each non-blank, non-comment line yields exactly one [`Token`]: the
//! instruction mnemonic plus its operands, still as strings. Operands are
//! only checked for shape here - numeric ranges and register codes are the
//! encoder's business.
use std::collections::VecDeque;

use thiserror::Error;

use super::isa::{Comparison, Mnemonic, Register};

/// A validated source line: the mnemonic and its operand strings.
///
/// Operand strings keep their `$` address markers and `-` signs so the
/// encoder can tell addressing modes apart.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub mnemonic: Mnemonic,
    pub operands: Vec<String>,
}

/// Raised for the first line the lexer cannot accept.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("syntax error on line {line}: {cause}")]
pub struct SyntaxError {
    /// 1-based line number in the source text.
    pub line: usize,
    pub cause: SyntaxCause,
}

#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum SyntaxCause {
    /// The leading word of the line names no instruction.
    #[error("Unknown keyword")]
    UnknownKeyword,
    /// The rest of the line does not match the instruction's operand shape.
    #[error("Invalid params")]
    InvalidParams,
}

/// Tokenize a whole source text, one token per instruction line.
///
/// Lexing is fail-fast: the first invalid line aborts the pass.
pub fn tokenize(source: &str) -> Result<VecDeque<Token>, SyntaxError> {
    let mut tokens: VecDeque<Token> = VecDeque::new();

    for (index, raw) in source.lines().enumerate() {
        let line = match raw.find('#') {
            Some(at) => &raw[..at],
            None => raw,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match tokenize_line(&line.to_lowercase()) {
            Ok(token) => tokens.push_back(token),
            Err(cause) => {
                return Err(SyntaxError {
                    line: index + 1,
                    cause,
                })
            }
        }
    }

    Ok(tokens)
}

fn tokenize_line(line: &str) -> Result<Token, SyntaxCause> {
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest),
        None => (line, ""),
    };

    let mnemonic = word
        .parse::<Mnemonic>()
        .map_err(|()| SyntaxCause::UnknownKeyword)?;
    let operands = operand_shape(mnemonic, rest).ok_or(SyntaxCause::InvalidParams)?;

    Ok(Token { mnemonic, operands })
}

/// Match the operand text against the mnemonic's accepted shape and
/// collect the operand strings.
fn operand_shape(mnemonic: Mnemonic, args: &str) -> Option<Vec<String>> {
    let words: Vec<&str> = args.split_whitespace().collect();

    match mnemonic {
        Mnemonic::Add => keyword_pair(&words, "to", is_value, is_writable_register),
        Mnemonic::Sub => keyword_pair(&words, "from", is_value, is_writable_register),

        Mnemonic::Mul | Mnemonic::Div => keyword_pair(&words, "by", is_writable_register, is_value),

        Mnemonic::And | Mnemonic::Xor | Mnemonic::Or => {
            keyword_pair(&words, "with", is_writable_register, is_value)
        }

        Mnemonic::Shr | Mnemonic::Shl => lone(&words, is_writable_register),
        Mnemonic::Print => lone(&words, is_register),

        Mnemonic::Mov => keyword_pair(&words, "to", is_mov_source, is_mov_destination),

        Mnemonic::Jmp => jump_shape(&words),

        Mnemonic::Label => match words.as_slice() {
            ["as", name] if is_identifier(name) => Some(vec![(*name).to_owned()]),
            _ => None,
        },

        Mnemonic::Halt => {
            if words.is_empty() {
                Some(Vec::new())
            } else {
                None
            }
        }
    }
}

/// `<first> KEYWORD <second>`, e.g. `add 5 to x` or `div x by 2`.
fn keyword_pair(
    words: &[&str],
    keyword: &str,
    first: fn(&str) -> bool,
    second: fn(&str) -> bool,
) -> Option<Vec<String>> {
    match words {
        [a, kw, b] if *kw == keyword && first(a) && second(b) => {
            Some(vec![(*a).to_owned(), (*b).to_owned()])
        }
        _ => None,
    }
}

/// A single operand, e.g. `shr x`.
fn lone(words: &[&str], accepts: fn(&str) -> bool) -> Option<Vec<String>> {
    match words {
        [only] if accepts(only) => Some(vec![(*only).to_owned()]),
        _ => None,
    }
}

/// `jmp to <label>` or `jmp if <reg> <cmp> <reg> to <label>`.
fn jump_shape(words: &[&str]) -> Option<Vec<String>> {
    match words {
        ["to", target] if is_identifier(target) => Some(vec![(*target).to_owned()]),
        ["if", lhs, cmp, rhs, "to", target]
            if is_register(lhs)
                && cmp.parse::<Comparison>().is_ok()
                && is_register(rhs)
                && is_identifier(target) =>
        {
            Some(vec![
                (*lhs).to_owned(),
                (*cmp).to_owned(),
                (*rhs).to_owned(),
                (*target).to_owned(),
            ])
        }
        _ => None,
    }
}

fn is_register(text: &str) -> bool {
    text.parse::<Register>().is_ok()
}

fn is_writable_register(text: &str) -> bool {
    text.parse::<Register>()
        .map(Register::is_writable)
        .unwrap_or(false)
}

fn is_unsigned_numeral(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn is_numeral(text: &str) -> bool {
    is_unsigned_numeral(text.strip_prefix('-').unwrap_or(text))
}

/// A register or a (possibly negative-looking) numeral.
fn is_value(text: &str) -> bool {
    is_numeral(text) || is_register(text)
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Numeral, direct address, register, or indirect address.
fn is_mov_source(text: &str) -> bool {
    match text.strip_prefix('$') {
        Some(rest) => is_unsigned_numeral(rest) || is_register(rest),
        None => is_numeral(text) || is_register(text),
    }
}

/// Like [`is_mov_source`], but a destination is never a bare numeral
/// and must be a writable register when it names one.
fn is_mov_destination(text: &str) -> bool {
    match text.strip_prefix('$') {
        Some(rest) => is_unsigned_numeral(rest) || is_writable_register(rest),
        None => is_writable_register(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(mnemonic: Mnemonic, operands: &[&str]) -> Token {
        Token {
            mnemonic,
            operands: operands.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_tokenize_program() {
        let source = "
        mov 56 to x
        add x to y   # accumulate
        label as loop
        jmp if y >= x to loop
        halt
        ";
        let tokens = tokenize(source).unwrap();
        let expected: Vec<Token> = vec![
            token(Mnemonic::Mov, &["56", "x"]),
            token(Mnemonic::Add, &["x", "y"]),
            token(Mnemonic::Label, &["loop"]),
            token(Mnemonic::Jmp, &["y", ">=", "x", "loop"]),
            token(Mnemonic::Halt, &[]),
        ];
        assert_eq!(Vec::from(tokens), expected);
    }

    #[test]
    fn test_blank_and_comment_lines_yield_nothing() {
        let source = "# a full-line comment\n\n   \n\t\n   # another";
        assert!(tokenize(source).unwrap().is_empty());
    }

    #[test]
    fn test_case_is_normalized() {
        let tokens = tokenize("ADD 5 To X\nLabel AS Loop").unwrap();
        let expected = vec![
            token(Mnemonic::Add, &["5", "x"]),
            token(Mnemonic::Label, &["loop"]),
        ];
        assert_eq!(Vec::from(tokens), expected);
    }

    #[test]
    fn test_unknown_keyword_carries_line_number() {
        let source = "add 1 to x\n\n# comment\nbogus 1 to x";
        assert_eq!(
            tokenize(source),
            Err(SyntaxError {
                line: 4,
                cause: SyntaxCause::UnknownKeyword,
            })
        );
    }

    #[test]
    fn test_first_error_aborts_the_pass() {
        // The bad line 2 masks the bad line 3.
        let source = "halt\nadd 5 to n\nbogus";
        assert_eq!(
            tokenize(source),
            Err(SyntaxError {
                line: 2,
                cause: SyntaxCause::InvalidParams,
            })
        );
    }

    #[test]
    fn test_operand_shapes_accepted() {
        assert!(tokenize("add n to x").is_ok());
        assert!(tokenize("add -1 to x").is_ok()); // range-checked later
        assert!(tokenize("sub 3 from z").is_ok());
        assert!(tokenize("div x by n").is_ok());
        assert!(tokenize("div x by 0").is_ok()); // rejected by the encoder
        assert!(tokenize("and x with 255").is_ok());
        assert!(tokenize("mov $5 to $x").is_ok());
        assert!(tokenize("mov $y to $12").is_ok());
        assert!(tokenize("mov -1 to x").is_ok());
        assert!(tokenize("print n").is_ok());
        assert!(tokenize("jmp to 5").is_ok()); // numeric label names are legal
        assert!(tokenize("label as loop_2").is_ok());
    }

    #[test]
    fn test_operand_shapes_rejected() {
        let invalid = |source: &str| {
            assert_eq!(
                tokenize(source),
                Err(SyntaxError {
                    line: 1,
                    cause: SyntaxCause::InvalidParams,
                }),
                "lexer accepted {:?}",
                source,
            );
        };

        invalid("add 5 to n"); // n is read-only
        invalid("add 5 x");
        invalid("add to x");
        invalid("sub 5 to x"); // sub takes `from`
        invalid("div by x");
        invalid("div 5 by x"); // first operand must be a register
        invalid("shr n");
        invalid("shr x y");
        invalid("print q");
        invalid("mov 5 to 7"); // bare-literal destination
        invalid("mov x to n");
        invalid("mov $-5 to x");
        invalid("mov 5 to $n");
        invalid("jmp loop");
        invalid("jmp if x = y to loop");
        invalid("jmp if x == 5 to loop");
        invalid("jmp if x == y loop");
        invalid("label as lo-op");
        invalid("label loop");
        invalid("halt now");
    }

    #[test]
    fn test_trailing_comment_is_stripped() {
        let tokens = tokenize("halt # jmp to loop").unwrap();
        assert_eq!(Vec::from(tokens), vec![token(Mnemonic::Halt, &[])]);
    }
}
