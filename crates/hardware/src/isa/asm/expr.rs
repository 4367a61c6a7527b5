//! Typed expression parser for assembler operands.
//!
//! Grammar:
//!
//! ```text
//! expr   = ["+"|"-"] term { ("+"|"-"|"|"|"^") term }
//! term   = factor { ("*"|"/"|"%"|"&") factor }
//! factor = NUMBER | STRING | GREG | SREG | CREG
//!        | "~" factor
//!        | "(" SREG "," GREG ")"     extended address
//!        | "(" GREG ")"              logical address
//!        | "(" expr ")"
//! ```
//!
//! Values are typed; arithmetic combines numbers only, and mixing types
//! under an operator reports `expr-type-match`.

use super::token::{Token, Tokenizer};
use super::{AsmErrId, AsmError};

/// A parsed operand value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ExprVal {
    /// Numeric value.
    Num(i64),
    /// General register.
    Greg(u8),
    /// Segment register.
    Sreg(u8),
    /// Control register.
    Creg(u8),
    /// `(Sx,Ry)` extended address.
    ExtAdr {
        /// Segment register number.
        sreg: u8,
        /// Offset register number.
        greg: u8,
    },
    /// `(Ry)` logical address.
    Adr(u8),
    /// String literal.
    Str(String),
}

fn parse_factor(t: &mut Tokenizer) -> Result<ExprVal, AsmError> {
    match t.tok().clone() {
        Token::Num(v) => {
            t.next_token()?;
            Ok(ExprVal::Num(v))
        }
        Token::Greg(r) => {
            t.next_token()?;
            Ok(ExprVal::Greg(r))
        }
        Token::Sreg(r) => {
            t.next_token()?;
            Ok(ExprVal::Sreg(r))
        }
        Token::Creg(r) => {
            t.next_token()?;
            Ok(ExprVal::Creg(r))
        }
        Token::Str(s) => {
            t.next_token()?;
            Ok(ExprVal::Str(s))
        }
        Token::Neg => {
            t.next_token()?;
            match parse_factor(t)? {
                ExprVal::Num(v) => Ok(ExprVal::Num(!v)),
                _ => Err(t.error(AsmErrId::ExpectedNumeric)),
            }
        }
        Token::Lparen => {
            t.next_token()?;
            let val = match t.tok().clone() {
                Token::Sreg(sreg) => {
                    t.next_token()?;
                    t.accept_comma()?;
                    let Token::Greg(greg) = *t.tok() else {
                        return Err(t.error(AsmErrId::ExpectedGeneralReg));
                    };
                    t.next_token()?;
                    ExprVal::ExtAdr { sreg, greg }
                }
                Token::Greg(r) => {
                    t.next_token()?;
                    ExprVal::Adr(r)
                }
                _ => parse_expr(t)?,
            };
            t.accept_rparen()?;
            Ok(val)
        }
        Token::Eos => Err(t.error(AsmErrId::UnexpectedEos)),
        _ => Err(t.error(AsmErrId::ExprFactor)),
    }
}

fn parse_term(t: &mut Tokenizer) -> Result<ExprVal, AsmError> {
    let mut lhs = parse_factor(t)?;
    loop {
        let op = match t.tok() {
            Token::Mult | Token::Div | Token::Mod | Token::And => t.tok().clone(),
            _ => return Ok(lhs),
        };
        t.next_token()?;
        let rhs = parse_factor(t)?;
        let (ExprVal::Num(a), ExprVal::Num(b)) = (&lhs, &rhs) else {
            return Err(t.error(AsmErrId::ExprTypeMatch));
        };
        lhs = ExprVal::Num(match op {
            Token::Mult => a.wrapping_mul(*b),
            Token::Div => {
                if *b == 0 {
                    return Err(t.error(AsmErrId::ExpectedNumeric));
                }
                a / b
            }
            Token::Mod => {
                if *b == 0 {
                    return Err(t.error(AsmErrId::ExpectedNumeric));
                }
                a % b
            }
            _ => a & b,
        });
    }
}

/// Parses one expression.
pub(crate) fn parse_expr(t: &mut Tokenizer) -> Result<ExprVal, AsmError> {
    let mut lhs = match t.tok() {
        Token::Plus => {
            t.next_token()?;
            match parse_term(t)? {
                v @ ExprVal::Num(_) => v,
                _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
            }
        }
        Token::Minus => {
            t.next_token()?;
            match parse_term(t)? {
                ExprVal::Num(v) => ExprVal::Num(-v),
                _ => return Err(t.error(AsmErrId::ExpectedNumeric)),
            }
        }
        _ => parse_term(t)?,
    };

    loop {
        let op = match t.tok() {
            Token::Plus | Token::Minus | Token::Or | Token::Xor => t.tok().clone(),
            _ => return Ok(lhs),
        };
        t.next_token()?;
        let rhs = parse_term(t)?;
        let (ExprVal::Num(a), ExprVal::Num(b)) = (&lhs, &rhs) else {
            return Err(t.error(AsmErrId::ExprTypeMatch));
        };
        lhs = ExprVal::Num(match op {
            Token::Plus => a.wrapping_add(*b),
            Token::Minus => a.wrapping_sub(*b),
            Token::Or => a | b,
            _ => a ^ b,
        });
    }
}
