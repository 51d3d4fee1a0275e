//! Chemical formula lexer and recursive descent parser.
//!
//! Grammar:
//!
//! ```text
//! formula  := part (SEP part)*
//! part     := COUNT? group+
//! group    := (ELEMENT | '(' group+ ')' | '[' group+ ']') COUNT?
//! SEP      := '·' | '*' | '.'
//! ```
//!
//! A `.` between two digits is a decimal point, anywhere else it separates
//! hydrate parts, so write `CuSO4·5H2O` rather than `CuSO4.5H2O`.

use super::elements;
use crate::{Error, Result};

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Element,
    Count,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Separator,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    start: usize,
    text: String,
}

fn tokenize(formula: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = formula.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => { chars.next(); }

            'A'..='Z' => {
                chars.next();
                let mut text = ch.to_string();
                if let Some(&(_, lower @ 'a'..='z')) = chars.peek() {
                    text.push(lower);
                    chars.next();
                }
                tokens.push(Token { kind: TokenKind::Element, start: pos, text });
            }

            '0'..='9' => {
                let mut text = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() {
                        text.push(d);
                        chars.next();
                    } else if d == '.' && !text.contains('.') && matches!(chars.clone().nth(1), Some((_, n)) if n.is_ascii_digit()) {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token { kind: TokenKind::Count, start: pos, text });
            }

            '(' | ')' | '[' | ']' | '·' | '*' | '.' => {
                chars.next();
                let kind = match ch {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::Separator,
                };
                tokens.push(Token { kind, start: pos, text: ch.to_string() });
            }

            'a'..='z' => {
                return Err(invalid(formula, pos, format!("element symbols start with an uppercase letter, found '{ch}'")));
            }

            other => {
                return Err(invalid(formula, pos, format!("unexpected character '{other}'")));
            }
        }
    }

    tokens.push(Token { kind: TokenKind::Eof, start: formula.len(), text: String::new() });
    Ok(tokens)
}

fn invalid(formula: &str, position: usize, message: String) -> Error {
    Error::InvalidFormula { formula: formula.to_string(), position, message }
}

// ============================================================================
// Composition
// ============================================================================

/// Element counts of a parsed formula, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composition {
    atoms: Vec<(&'static str, f64)>,
}

impl Composition {
    fn add(&mut self, symbol: &'static str, count: f64) {
        match self.atoms.iter_mut().find(|(s, _)| *s == symbol) {
            Some((_, n)) => *n += count,
            None => self.atoms.push((symbol, count)),
        }
    }

    fn merge(&mut self, other: &Composition, times: f64) {
        for &(symbol, count) in &other.atoms {
            self.add(symbol, count * times);
        }
    }

    /// Number of atoms of `symbol` per formula unit.
    pub fn count(&self, symbol: &str) -> f64 {
        self.atoms.iter().find(|(s, _)| *s == symbol).map_or(0.0, |(_, n)| *n)
    }

    pub fn elements(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.atoms.iter().copied()
    }

    /// Molar mass in g/mol.
    pub fn mass(&self) -> f64 {
        self.atoms
            .iter()
            .map(|&(symbol, count)| elements::atomic_weight(symbol).unwrap_or(0.0) * count)
            .sum()
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'t> {
    formula: &'t str,
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        invalid(self.formula, self.peek().start, message.into())
    }

    fn parse_formula(&mut self) -> Result<Composition> {
        let mut total = Composition::default();
        loop {
            let part = self.parse_part()?;
            total.merge(&part, 1.0);
            if !self.eat(TokenKind::Separator) {
                break;
            }
        }
        if !self.at(TokenKind::Eof) {
            let text = self.peek().text.clone();
            return Err(self.error(format!("unexpected '{text}'")));
        }
        Ok(total)
    }

    fn parse_part(&mut self) -> Result<Composition> {
        let multiplier = self.parse_count()?.unwrap_or(1.0);
        let groups = self.parse_sequence()?;
        let mut part = Composition::default();
        part.merge(&groups, multiplier);
        Ok(part)
    }

    /// One or more groups.
    fn parse_sequence(&mut self) -> Result<Composition> {
        let mut seq = Composition::default();
        while matches!(self.peek().kind, TokenKind::Element | TokenKind::LParen | TokenKind::LBracket) {
            let (group, times) = self.parse_group()?;
            seq.merge(&group, times);
        }
        if seq.atoms.is_empty() {
            return Err(self.error("expected an element or group"));
        }
        Ok(seq)
    }

    fn parse_group(&mut self) -> Result<(Composition, f64)> {
        let tok = self.advance().clone();
        let group = match tok.kind {
            TokenKind::Element => {
                let (symbol, _) = elements::lookup(&tok.text)
                    .ok_or_else(|| invalid(self.formula, tok.start, format!("unknown element '{}'", tok.text)))?;
                let mut single = Composition::default();
                single.add(symbol, 1.0);
                single
            }
            TokenKind::LParen | TokenKind::LBracket => {
                let close = if tok.kind == TokenKind::LParen { TokenKind::RParen } else { TokenKind::RBracket };
                let inner = self.parse_sequence()?;
                if !self.eat(close) {
                    return Err(self.error(format!("unclosed '{}'", tok.text)));
                }
                inner
            }
            _ => return Err(invalid(self.formula, tok.start, format!("unexpected '{}'", tok.text))),
        };
        let times = self.parse_count()?.unwrap_or(1.0);
        Ok((group, times))
    }

    fn parse_count(&mut self) -> Result<Option<f64>> {
        if !self.at(TokenKind::Count) {
            return Ok(None);
        }
        let tok = self.advance().clone();
        match tok.text.parse::<f64>() {
            Ok(n) if n > 0.0 => Ok(Some(n)),
            _ => Err(invalid(self.formula, tok.start, format!("count must be a positive number, got '{}'", tok.text))),
        }
    }
}

/// Parse a formula into element counts.
pub fn parse(formula: &str) -> Result<Composition> {
    let tokens = tokenize(formula)?;
    let mut parser = Parser { formula, tokens: &tokens, pos: 0 };
    parser.parse_formula()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_oxide() {
        let c = parse("Al2O3").unwrap();
        assert_eq!(c.count("Al"), 2.0);
        assert_eq!(c.count("O"), 3.0);
        assert!((c.mass() - 101.961).abs() < 1e-3);
    }

    #[test]
    fn test_groups_and_hydrates() {
        let c = parse("Ca(OH)2").unwrap();
        assert_eq!(c.count("O"), 2.0);
        assert_eq!(c.count("H"), 2.0);
        let c = parse("CuSO4·5H2O").unwrap();
        assert_eq!(c.count("H"), 10.0);
        assert_eq!(c.count("O"), 9.0);
        let c = parse("K[Fe(CN)2]3").unwrap();
        assert_eq!(c.count("C"), 6.0);
        assert_eq!(c.count("Fe"), 3.0);
    }

    #[test]
    fn test_decimal_counts() {
        let c = parse("Fe0.5Mg1.5SiO4").unwrap();
        assert_eq!(c.count("Fe"), 0.5);
        assert_eq!(c.count("Mg"), 1.5);
    }

    #[test]
    fn test_errors_carry_position() {
        match parse("SiXx2").unwrap_err() {
            Error::InvalidFormula { position, .. } => assert_eq!(position, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(parse("").is_err());
        assert!(parse("(OH").is_err());
        assert!(parse("sio2").is_err());
        assert!(parse("H2O)").is_err());
        assert!(parse("H0").is_err());
    }
}
