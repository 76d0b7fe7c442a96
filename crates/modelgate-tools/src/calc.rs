//! No-eval arithmetic evaluator.
//!
//! Untrusted expressions are stripped to a small arithmetic alphabet and fed
//! to a recursive-descent parser. Nothing here ever evaluates code.

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CalcError {
    #[error("empty expression")]
    Empty,

    #[error("division by zero")]
    DivisionByZero,

    #[error("unbalanced parenthesis")]
    UnbalancedParenthesis,

    #[error("unexpected character at position {0}")]
    UnexpectedCharacter(usize),

    #[error("trailing input at position {0}")]
    TrailingInput(usize),
}

/// Evaluate an untrusted arithmetic expression.
///
/// Grammar: `+`/`-` over terms, `*`/`/` over factors, unary `+`/`-`,
/// parenthesized sub-expressions, left-associative within a precedence
/// level. Characters outside `[0-9+-*/().\s]` are stripped before parsing.
///
/// # Errors
///
/// Returns `CalcError` for empty input, division by zero, unbalanced
/// parentheses, or characters the grammar cannot consume.
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let cleaned: Vec<u8> = expression
        .bytes()
        .filter(|b| b.is_ascii_digit() || b"+-*/().".contains(b))
        .collect();
    if cleaned.is_empty() {
        return Err(CalcError::Empty);
    }

    let mut parser = Parser {
        input: &cleaned,
        pos: 0,
    };
    let value = parser.expression()?;
    if parser.pos < parser.input.len() {
        return Err(CalcError::TrailingInput(parser.pos));
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expression(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                b'+' => {
                    self.pos += 1;
                    value += self.term()?;
                }
                b'-' => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                b'*' => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                b'/' => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(b'+') => {
                self.pos += 1;
                self.factor()
            }
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(b'(') => {
                self.pos += 1;
                let value = self.expression()?;
                if self.peek() != Some(b')') {
                    return Err(CalcError::UnbalancedParenthesis);
                }
                self.pos += 1;
                Ok(value)
            }
            Some(b')') => Err(CalcError::UnbalancedParenthesis),
            Some(b) if b.is_ascii_digit() || b == b'.' => self.number(),
            Some(_) => Err(CalcError::UnexpectedCharacter(self.pos)),
            None => Err(CalcError::UnexpectedCharacter(self.pos)),
        }
    }

    fn number(&mut self) -> Result<f64, CalcError> {
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !seen_dot {
                seen_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| CalcError::UnexpectedCharacter(start))?;
        text.parse()
            .map_err(|_| CalcError::UnexpectedCharacter(start))
    }
}
