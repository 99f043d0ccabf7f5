use std::{collections::BTreeSet, fmt, str::FromStr};

use itertools::Itertools;

use super::{
    rm_error::{RMError, RMResult},
    types::{Interpretation, Symbol},
};

/// A propositional formula over fluents labelling an automaton transition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Guard {
    True,
    False,
    Atom(Symbol),
    Not(Box<Guard>),
    And(Vec<Guard>),
    Or(Vec<Guard>),
}

impl Guard {
    pub fn atom<S: Into<Symbol>>(symbol: S) -> Self {
        Guard::Atom(symbol.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self {
            Guard::True => Guard::False,
            Guard::False => Guard::True,
            Guard::Not(inner) => *inner,
            other => Guard::Not(Box::new(other)),
        }
    }

    pub fn and(self, rhs: Guard) -> Self {
        match (self, rhs) {
            (Guard::And(mut lhs), Guard::And(rhs)) => {
                lhs.extend(rhs);
                Guard::And(lhs)
            }
            (Guard::And(mut lhs), rhs) => {
                lhs.push(rhs);
                Guard::And(lhs)
            }
            (lhs, rhs) => Guard::And(vec![lhs, rhs]),
        }
    }

    pub fn or(self, rhs: Guard) -> Self {
        match (self, rhs) {
            (Guard::Or(mut lhs), Guard::Or(rhs)) => {
                lhs.extend(rhs);
                Guard::Or(lhs)
            }
            (Guard::Or(mut lhs), rhs) => {
                lhs.push(rhs);
                Guard::Or(lhs)
            }
            (lhs, rhs) => Guard::Or(vec![lhs, rhs]),
        }
    }

    /// The conjunction that holds for exactly one interpretation over `alphabet`.
    pub fn minterm(interpretation: &Interpretation, alphabet: &BTreeSet<Symbol>) -> Self {
        if alphabet.is_empty() {
            return Guard::True;
        }
        let literals = alphabet
            .iter()
            .map(|symbol| {
                let atom = Guard::atom(symbol.clone());
                if interpretation.contains(symbol) {
                    atom
                } else {
                    atom.not()
                }
            })
            .collect::<Vec<_>>();
        match literals.len() {
            1 => literals.into_iter().next().unwrap_or(Guard::True),
            _ => Guard::And(literals),
        }
    }

    pub fn is_satisfied_by(&self, interpretation: &Interpretation) -> bool {
        match self {
            Guard::True => true,
            Guard::False => false,
            Guard::Atom(symbol) => interpretation.contains(symbol),
            Guard::Not(inner) => !inner.is_satisfied_by(interpretation),
            Guard::And(guards) => guards.iter().all(|g| g.is_satisfied_by(interpretation)),
            Guard::Or(guards) => guards.iter().any(|g| g.is_satisfied_by(interpretation)),
        }
    }

    pub fn atoms(&self) -> BTreeSet<Symbol> {
        let mut atoms = BTreeSet::new();
        self.collect_atoms(&mut atoms);
        atoms
    }

    fn collect_atoms(&self, atoms: &mut BTreeSet<Symbol>) {
        match self {
            Guard::True | Guard::False => {}
            Guard::Atom(symbol) => {
                atoms.insert(symbol.clone());
            }
            Guard::Not(inner) => inner.collect_atoms(atoms),
            Guard::And(guards) | Guard::Or(guards) => {
                guards.iter().for_each(|g| g.collect_atoms(atoms))
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Guard::Or(_) => 1,
            Guard::And(_) => 2,
            Guard::Not(_) => 3,
            _ => 4,
        }
    }

    fn fmt_operand(&self, parent: u8, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.precedence() <= parent {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::True => write!(f, "true"),
            Guard::False => write!(f, "false"),
            Guard::Atom(symbol) => write!(f, "{symbol}"),
            Guard::Not(inner) => {
                write!(f, "~")?;
                inner.fmt_operand(3, f)
            }
            Guard::And(guards) | Guard::Or(guards) => {
                let (separator, precedence) = match self {
                    Guard::And(_) => (" & ", 2),
                    _ => (" | ", 1),
                };
                for (i, guard) in guards.iter().enumerate() {
                    if i != 0 {
                        write!(f, "{separator}")?;
                    }
                    guard.fmt_operand(precedence, f)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn tokenize(text: &str) -> RMResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '~' | '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' => {
                chars.next();
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Or);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(RMError::GuardParse {
                    guard: text.to_string(),
                    reason: format!("unexpected character `{other}`"),
                })
            }
        }
    }
    Ok(tokens)
}

// or := and ('|' and)* ; and := unary ('&' unary)* ; unary := '~' unary | primary
struct GuardParser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> GuardParser<'a> {
    fn error(&self, reason: impl Into<String>) -> RMError {
        RMError::GuardParse {
            guard: self.text.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn parse_or(&mut self) -> RMResult<Guard> {
        let mut operands = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.next();
            operands.push(self.parse_and()?);
        }
        Ok(match operands.len() {
            1 => operands.remove(0),
            _ => Guard::Or(operands),
        })
    }

    fn parse_and(&mut self) -> RMResult<Guard> {
        let mut operands = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.next();
            operands.push(self.parse_unary()?);
        }
        Ok(match operands.len() {
            1 => operands.remove(0),
            _ => Guard::And(operands),
        })
    }

    fn parse_unary(&mut self) -> RMResult<Guard> {
        match self.next() {
            Some(Token::Not) => Ok(Guard::Not(Box::new(self.parse_unary()?))),
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(self.error("missing closing parenthesis")),
                }
            }
            Some(Token::Ident(ident)) => Ok(match ident.as_str() {
                "true" => Guard::True,
                "false" => Guard::False,
                _ => Guard::Atom(ident),
            }),
            Some(token) => Err(self.error(format!("unexpected token {token:?}"))),
            None => Err(self.error("unexpected end of input")),
        }
    }
}

impl FromStr for Guard {
    type Err = RMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = GuardParser {
            text: s,
            tokens: tokenize(s)?,
            position: 0,
        };
        let guard = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(parser.error(format!("trailing token {token:?}")));
        }
        Ok(guard)
    }
}

/// Renders an interpretation as `{a, b}` for logs and error messages.
pub fn display_interpretation(interpretation: &Interpretation) -> String {
    format!("{{{}}}", interpretation.iter().join(", "))
}
