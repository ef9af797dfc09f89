//! The Encoder module takes the token stream from the lexer and emits
//! the machine's flat byte program.
//!
//! Encoding is a single pass with deferred label resolution: every jump
//! writes a placeholder byte and records its offset in a patch list, and
//! once all tokens are consumed the patch list is replayed against the
//! finished label table. Forward references are expected and normal.
use std::collections::{HashMap, VecDeque};
use std::convert::TryFrom;

use thiserror::Error;

use super::isa::{self, opcodes, Comparison, Mnemonic, Mode, Register};
use super::lexer::Token;

// Written where a jump target goes; the patch pass always overwrites it,
// so the value itself carries no meaning.
const PLACEHOLDER: u8 = 0xEA;

/// Raised for the first token the encoder cannot turn into bytes, or for
/// a label the patch pass cannot resolve.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("`{0}` is not a number")]
    BadNumeral(String),
    #[error("value {0} must range from 0 to 255")]
    OutOfRange(i64),
    #[error("cannot divide by 0")]
    DivideByZero,
    #[error("label `{0}` already defined")]
    DuplicateLabel(String),
    #[error("unknown label `{0}`")]
    UnknownLabel(String),
}

/// Encode a token stream into the program the machine executes.
pub fn encode(tokens: VecDeque<Token>) -> Result<Vec<u8>, EncodeError> {
    Encoder::new(tokens).run()
}

pub struct Encoder {
    tokens: VecDeque<Token>,
    program: Vec<u8>,
    /// Label name to the byte offset it was bound at. Names bind once.
    labels: HashMap<String, usize>,
    /// Label name to the placeholder offsets awaiting its address.
    patches: HashMap<String, Vec<usize>>,
}

impl Encoder {
    pub fn new(tokens: VecDeque<Token>) -> Self {
        Encoder {
            tokens,
            program: Vec::with_capacity(256),
            labels: HashMap::new(),
            patches: HashMap::new(),
        }
    }

    /// Run the encoder, consuming itself and returning the program bytes.
    pub fn run(mut self) -> Result<Vec<u8>, EncodeError> {
        while let Some(token) = self.consume() {
            self.instruction(&token)?;
        }
        self.patch()?;
        Ok(self.program)
    }

    fn instruction(&mut self, token: &Token) -> Result<(), EncodeError> {
        use super::isa::opcodes::*;
        match token.mnemonic {
            Mnemonic::Add => self.op_to_register(token, ADDRR, ADDRN),
            Mnemonic::Sub => self.op_to_register(token, SUBRR, SUBRN),

            Mnemonic::Mul => self.op_with_operand(token, MULRR, MULRN),
            Mnemonic::Div => self.op_with_operand(token, DIVRR, DIVRN),
            Mnemonic::And => self.op_with_operand(token, ANDRR, ANDRN),
            Mnemonic::Xor => self.op_with_operand(token, XORRR, XORRN),
            Mnemonic::Or => self.op_with_operand(token, ORRR, ORRN),

            Mnemonic::Shr => {
                self.op_single_register(token, SHR);
                Ok(())
            }
            Mnemonic::Shl => {
                self.op_single_register(token, SHL);
                Ok(())
            }
            Mnemonic::Print => {
                self.op_single_register(token, PRINT);
                Ok(())
            }

            Mnemonic::Mov => self.op_mov(token),
            Mnemonic::Jmp => {
                self.op_jmp(token);
                Ok(())
            }
            Mnemonic::Label => self.bind_label(&token.operands[0]),

            Mnemonic::Halt => {
                self.emit(&[HALT]);
                Ok(())
            }
        }
    }

    /// `add`/`sub`: operand 0 is the source, operand 1 the destination
    /// register. The source kind selects between the two opcodes.
    fn op_to_register(
        &mut self,
        token: &Token,
        with_register: u8,
        with_numeral: u8,
    ) -> Result<(), EncodeError> {
        let dest = register(&token.operands[1]);
        match token.operands[0].parse::<Register>() {
            Ok(source) => self.emit(&[with_register, dest.code(), source.code()]),
            Err(()) => {
                let value = immediate(&token.operands[0])?;
                self.emit(&[with_numeral, dest.code(), value]);
            }
        }
        Ok(())
    }

    /// `mul`/`div`/`and`/`xor`/`or`: operand 0 is a register and the
    /// implicit destination, operand 1 a register or immediate.
    fn op_with_operand(
        &mut self,
        token: &Token,
        with_register: u8,
        with_numeral: u8,
    ) -> Result<(), EncodeError> {
        let first = register(&token.operands[0]);
        match token.operands[1].parse::<Register>() {
            Ok(second) => self.emit(&[with_register, first.code(), second.code()]),
            Err(()) => {
                let value = immediate(&token.operands[1])?;
                if token.mnemonic == Mnemonic::Div && value == 0 {
                    return Err(EncodeError::DivideByZero);
                }
                self.emit(&[with_numeral, first.code(), value]);
            }
        }
        Ok(())
    }

    /// `shr`/`shl`/`print`: the opcode followed by one register code.
    fn op_single_register(&mut self, token: &Token, opcode: u8) {
        self.emit(&[opcode, register(&token.operands[0]).code()]);
    }

    fn op_mov(&mut self, token: &Token) -> Result<(), EncodeError> {
        let (dest_mode, dest) = mov_operand(&token.operands[1])?;
        let (source_mode, source) = mov_operand(&token.operands[0])?;
        let opcode = match isa::mov_opcode(dest_mode, source_mode) {
            Some(opcode) => opcode,
            // Bare-literal destinations never make it past the lexer.
            None => unreachable!("mov destination cannot be an immediate"),
        };
        self.emit(&[opcode, dest, source]);
        Ok(())
    }

    fn op_jmp(&mut self, token: &Token) {
        match token.operands.as_slice() {
            [target] => {
                self.emit(&[opcodes::JMP, PLACEHOLDER]);
                self.reference(target);
            }
            [lhs, cmp, rhs, target] => {
                self.emit(&[
                    opcodes::JMPIF,
                    comparison(cmp).code(),
                    register(lhs).code(),
                    register(rhs).code(),
                    PLACEHOLDER,
                ]);
                self.reference(target);
            }
            _ => unreachable!("jump carries one or four operands"),
        }
    }

    /// Bind `name` to the current end of the program. Emits nothing.
    fn bind_label(&mut self, name: &str) -> Result<(), EncodeError> {
        if self.labels.contains_key(name) {
            return Err(EncodeError::DuplicateLabel(name.to_owned()));
        }
        self.labels.insert(name.to_owned(), self.program.len());
        Ok(())
    }

    /// Record that the placeholder byte just emitted must become
    /// `name`'s address, whether or not `name` is bound yet.
    fn reference(&mut self, name: &str) {
        self.patches
            .entry(name.to_owned())
            .or_insert_with(Vec::new)
            .push(self.program.len() - 1);
    }

    /// Replay the patch list against the finished label table, overwriting
    /// every recorded placeholder with its label's resolved address.
    fn patch(&mut self) -> Result<(), EncodeError> {
        for (name, offsets) in &self.patches {
            let address = match self.labels.get(name) {
                Some(&address) => address as u8,
                None => return Err(EncodeError::UnknownLabel(name.clone())),
            };
            debug!(
                "label `{}` resolves {} jump(s) to 0x{:02X}",
                name,
                offsets.len(),
                address
            );
            for &offset in offsets {
                self.program[offset] = address;
            }
        }
        Ok(())
    }

    #[inline]
    fn emit(&mut self, bytes: &[u8]) {
        self.program.extend_from_slice(bytes);
    }

    /// Pops a token off the input stream and returns it.
    /// Returns None if no tokens are left.
    #[inline]
    fn consume(&mut self) -> Option<Token> {
        self.tokens.pop_front()
    }
}

/// Parse a decimal immediate and range-check it against a byte.
fn immediate(text: &str) -> Result<u8, EncodeError> {
    let value: i64 = text
        .parse()
        .map_err(|_| EncodeError::BadNumeral(text.to_owned()))?;
    u8::try_from(value).map_err(|_| EncodeError::OutOfRange(value))
}

/// Split a `mov` operand into its addressing mode and emitted byte.
fn mov_operand(text: &str) -> Result<(Mode, u8), EncodeError> {
    match text.strip_prefix('$') {
        Some(rest) => match rest.parse::<Register>() {
            Ok(reg) => Ok((Mode::Indirect, reg.code())),
            Err(()) => Ok((Mode::Direct, immediate(rest)?)),
        },
        None => match text.parse::<Register>() {
            Ok(reg) => Ok((Mode::Register, reg.code())),
            Err(()) => Ok((Mode::Immediate, immediate(text)?)),
        },
    }
}

// Operand shapes are validated during lexing, so operands in register
// positions always name a register by the time they reach the encoder.
fn register(text: &str) -> Register {
    match text.parse() {
        Ok(reg) => reg,
        Err(()) => unreachable!("lexer admitted non-register operand {:?}", text),
    }
}

fn comparison(text: &str) -> Comparison {
    match text.parse() {
        Ok(cmp) => cmp,
        Err(()) => unreachable!("lexer admitted non-comparison operand {:?}", text),
    }
}
