//! The Assembler module is in charge of taking a
//! DMVM source file and producing the flat byte
//! program the machine executes.
//!
//! It does this with a line-oriented lexer that validates each
//! instruction's shape, and a single-pass encoder that emits bytes
//! and back-patches label references once every label address is
//! known.

pub mod encoder;
pub mod isa;
pub mod lexer;

use thiserror::Error;

pub use self::encoder::{encode, EncodeError};
pub use self::lexer::{tokenize, SyntaxError};

/// Any failure that aborts a compilation. No partial output survives.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Translate DMVM assembly source text into its binary program.
pub fn compile(source: &str) -> Result<Vec<u8>, CompileError> {
    let tokens = tokenize(source)?;
    debug!("lexed {} instruction(s)", tokens.len());
    let program = encode(tokens)?;
    debug!("encoded {} byte(s)", program.len());
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::isa::opcodes;
    use super::*;

    #[test]
    fn test_compile_countdown() {
        let source = "
        mov 3 to x          # counter
        label as loop
        sub 1 from x
        print x
        jmp if x != n to loop
        halt
        ";
        let program = compile(source).unwrap();
        assert_eq!(
            program,
            vec![
                opcodes::MOVRN,
                0x1,
                3,
                opcodes::SUBRN, // `loop` binds here, offset 3
                0x1,
                1,
                opcodes::PRINT,
                0x1,
                opcodes::JMPIF,
                0x01, // !=
                0x1,  // x
                0x0,  // n
                3,    // back to `loop`
                opcodes::HALT,
            ]
        );
    }

    #[test]
    fn test_compile_surfaces_both_error_kinds() {
        match compile("frobnicate x") {
            Err(CompileError::Syntax(err)) => {
                assert_eq!(err.line, 1);
                assert_eq!(err.to_string(), "syntax error on line 1: Unknown keyword");
            }
            other => panic!("expected a syntax error, got {:?}", other),
        }

        match compile("jmp to nowhere") {
            Err(CompileError::Encode(err)) => {
                assert_eq!(err.to_string(), "unknown label `nowhere`");
            }
            other => panic!("expected an encode error, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_produces_no_bytes_for_comments_only() {
        assert!(compile("# nothing here\n\n").unwrap().is_empty());
    }
}
