//! D&D dice expressions.
//!
//! Supports standard notation (`XdY+Z`, `d20`, `d%`), subtraction and
//! parentheses, keep highest/lowest (`4d6kh3`, `2d20kl1`) and
//! advantage/disadvantage wrappers (`adv(1d20+5)`, `dis(1d20)`). Whitespace
//! between two terms counts as `+`, so `1d8 1d6` rolls both.
//!
//! Evaluation never touches a global generator: every face comes from the
//! [`DieSource`] passed in, so the same source sequence always yields the
//! same [`Roll`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Most dice a single `NdS` term may roll.
pub const MAX_DICE_PER_TERM: u32 = 1000;
/// Most dice a whole expression may roll, summed over all terms.
pub const MAX_TOTAL_DICE: u32 = 1000;
/// Largest die size.
pub const MAX_SIDES: u32 = 1000;
/// Largest integer constant.
pub const MAX_CONSTANT: i64 = 1_000_000;
/// Deepest nesting of parentheses, wrappers and unary signs.
pub const MAX_DEPTH: usize = 16;
/// Longest accepted notation, in bytes.
pub const MAX_NOTATION_LEN: usize = 256;

/// Error type for dice parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Empty dice expression")]
    Empty,
    #[error("Dice expression longer than {max} characters")]
    TooLong { max: usize },
    #[error("Unexpected '{found}' at position {position} in {notation:?}")]
    Unexpected {
        found: char,
        position: usize,
        notation: String,
    },
    #[error("Unexpected end of dice expression {0:?}")]
    UnexpectedEnd(String),
    #[error("Invalid number in dice expression: {0}")]
    InvalidNumber(String),
    #[error("No dice specified")]
    NoDice,
    #[error("Invalid die size: d{0}")]
    InvalidDieSize(u32),
    #[error("Too many dice: {count} (limit {max})")]
    TooManyDice { count: u32, max: u32 },
    #[error("Constant {0} is out of range")]
    ConstantOutOfRange(i64),
    #[error("Cannot keep {keep} dice when only rolling {count}")]
    InvalidKeepCount { keep: u32, count: u32 },
    #[error("Dice expression nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }

    /// Net state of any number of sources. One advantage and one
    /// disadvantage cancel no matter how many of each there are.
    pub fn resolve(sources: impl IntoIterator<Item = Advantage>) -> Advantage {
        let (mut advantage, mut disadvantage) = (false, false);
        for source in sources {
            match source {
                Advantage::Advantage => advantage = true,
                Advantage::Disadvantage => disadvantage = true,
                Advantage::Normal => {}
            }
        }
        match (advantage, disadvantage) {
            (true, false) => Advantage::Advantage,
            (false, true) => Advantage::Disadvantage,
            _ => Advantage::Normal,
        }
    }

    pub fn from_flags(advantage: bool, disadvantage: bool) -> Advantage {
        let pick = |on: bool, state: Advantage| if on { state } else { Advantage::Normal };
        Advantage::resolve([
            pick(advantage, Advantage::Advantage),
            pick(disadvantage, Advantage::Disadvantage),
        ])
    }
}

impl fmt::Display for Advantage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advantage::Normal => write!(f, "normal"),
            Advantage::Advantage => write!(f, "advantage"),
            Advantage::Disadvantage => write!(f, "disadvantage"),
        }
    }
}

/// Anything that can produce die faces.
///
/// Implemented for every [`rand::Rng`] and for
/// [`ScriptedDice`](crate::testing::ScriptedDice).
pub trait DieSource {
    /// Roll one die, returning a value in `1..=sides`.
    fn roll_die(&mut self, sides: u32) -> u32;
}

impl<R: Rng> DieSource for R {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.gen_range(1..=sides)
    }
}

// ============================================================================
// Expression tree
// ============================================================================

/// Keep-highest / keep-lowest suffix on a dice term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    Highest(u32),
    Lowest(u32),
}

impl Keep {
    fn count(self) -> u32 {
        match self {
            Keep::Highest(n) | Keep::Lowest(n) => n,
        }
    }

    fn scaled(self, factor: u32) -> Keep {
        match self {
            Keep::Highest(n) => Keep::Highest(n.saturating_mul(factor)),
            Keep::Lowest(n) => Keep::Lowest(n.saturating_mul(factor)),
        }
    }
}

/// Parsed dice expression node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Dice {
        count: u32,
        sides: u32,
        keep: Option<Keep>,
    },
    Constant(i64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Advantage(Box<Expr>),
    Disadvantage(Box<Expr>),
}

impl Expr {
    fn is_sum(&self) -> bool {
        matches!(self, Expr::Add(..) | Expr::Sub(..))
    }

    fn dice_count(&self) -> u32 {
        match self {
            Expr::Dice { count, .. } => *count,
            Expr::Constant(_) => 0,
            Expr::Add(l, r) | Expr::Sub(l, r) => l.dice_count().saturating_add(r.dice_count()),
            Expr::Neg(inner) => inner.dice_count(),
            Expr::Advantage(inner) | Expr::Disadvantage(inner) => {
                inner.dice_count().saturating_mul(2)
            }
        }
    }

    /// Rewrite the first plain `1d20` outside any wrapper as `2d20kh1` or
    /// `2d20kl1`. None when there is no such term.
    fn d20_rolled_twice(&self, keep: Keep) -> Option<Expr> {
        match self {
            Expr::Dice {
                count: 1,
                sides: 20,
                keep: None,
            } => Some(Expr::Dice {
                count: 2,
                sides: 20,
                keep: Some(keep),
            }),
            Expr::Add(l, r) => match l.d20_rolled_twice(keep) {
                Some(l) => Some(Expr::Add(Box::new(l), r.clone())),
                None => r
                    .d20_rolled_twice(keep)
                    .map(|r| Expr::Add(l.clone(), Box::new(r))),
            },
            Expr::Sub(l, r) => l
                .d20_rolled_twice(keep)
                .map(|l| Expr::Sub(Box::new(l), r.clone())),
            _ => None,
        }
    }

    fn doubled(&self) -> Expr {
        match self {
            Expr::Dice { count, sides, keep } => Expr::Dice {
                count: count.saturating_mul(2),
                sides: *sides,
                keep: keep.map(|k| k.scaled(2)),
            },
            Expr::Constant(n) => Expr::Constant(*n),
            Expr::Add(l, r) => Expr::Add(Box::new(l.doubled()), Box::new(r.doubled())),
            Expr::Sub(l, r) => Expr::Sub(Box::new(l.doubled()), Box::new(r.doubled())),
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.doubled())),
            Expr::Advantage(inner) => Expr::Advantage(Box::new(inner.doubled())),
            Expr::Disadvantage(inner) => Expr::Disadvantage(Box::new(inner.doubled())),
        }
    }

    fn eval<D: DieSource + ?Sized>(&self, dice: &mut D, out: &mut Vec<DieRoll>) -> i64 {
        match self {
            Expr::Dice { count, sides, keep } => {
                let start = out.len();
                for _ in 0..*count {
                    out.push(DieRoll {
                        sides: *sides,
                        value: dice.roll_die(*sides),
                        kept: true,
                    });
                }
                let term = &mut out[start..];
                if let Some(keep) = keep {
                    apply_keep(term, *keep);
                }
                term.iter()
                    .filter(|d| d.kept)
                    .map(|d| i64::from(d.value))
                    .sum()
            }
            Expr::Constant(n) => *n,
            Expr::Add(l, r) => l.eval(dice, out) + r.eval(dice, out),
            Expr::Sub(l, r) => l.eval(dice, out) - r.eval(dice, out),
            Expr::Neg(inner) => -inner.eval(dice, out),
            Expr::Advantage(inner) | Expr::Disadvantage(inner) => {
                let first_start = out.len();
                let first = inner.eval(dice, out);
                let second_start = out.len();
                let second = inner.eval(dice, out);

                // Ties keep the first roll.
                let keep_first = match self {
                    Expr::Advantage(_) => first >= second,
                    _ => first <= second,
                };
                let dropped = if keep_first {
                    second_start..out.len()
                } else {
                    first_start..second_start
                };
                for die in &mut out[dropped] {
                    die.kept = false;
                }
                if keep_first {
                    first
                } else {
                    second
                }
            }
        }
    }
}

fn apply_keep(term: &mut [DieRoll], keep: Keep) {
    let mut order: Vec<usize> = (0..term.len()).collect();
    match keep {
        Keep::Highest(_) => order.sort_by(|&a, &b| term[b].value.cmp(&term[a].value)),
        Keep::Lowest(_) => order.sort_by(|&a, &b| term[a].value.cmp(&term[b].value)),
    }
    for die in term.iter_mut() {
        die.kept = false;
    }
    for &index in order.iter().take(keep.count() as usize) {
        term[index].kept = true;
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Dice { count, sides, keep } => {
                write!(f, "{count}d{sides}")?;
                match keep {
                    Some(Keep::Highest(n)) => write!(f, "kh{n}"),
                    Some(Keep::Lowest(n)) => write!(f, "kl{n}"),
                    None => Ok(()),
                }
            }
            Expr::Constant(n) => write!(f, "{n}"),
            Expr::Add(l, r) | Expr::Sub(l, r) => {
                let op = if matches!(self, Expr::Add(..)) { '+' } else { '-' };
                if r.is_sum() {
                    write!(f, "{l}{op}({r})")
                } else {
                    write!(f, "{l}{op}{r}")
                }
            }
            Expr::Neg(inner) => {
                if inner.is_sum() {
                    write!(f, "-({inner})")
                } else {
                    write!(f, "-{inner}")
                }
            }
            Expr::Advantage(inner) => write!(f, "adv({inner})"),
            Expr::Disadvantage(inner) => write!(f, "dis({inner})"),
        }
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    notation: &'a str,
    chars: Vec<char>,
    pos: usize,
    total_dice: u32,
}

impl<'a> Parser<'a> {
    fn new(notation: &'a str) -> Self {
        Self {
            notation,
            chars: notation.to_ascii_lowercase().chars().collect(),
            pos: 0,
            total_dice: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn at_word(&self, word: &str) -> bool {
        word.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn unexpected(&self) -> DiceError {
        match self.peek() {
            Some(found) => DiceError::Unexpected {
                found,
                position: self.pos,
                notation: self.notation.to_string(),
            },
            None => DiceError::UnexpectedEnd(self.notation.to_string()),
        }
    }

    fn expect(&mut self, c: char) -> Result<(), DiceError> {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn nested(depth: usize) -> Result<usize, DiceError> {
        if depth >= MAX_DEPTH {
            Err(DiceError::TooDeep(MAX_DEPTH))
        } else {
            Ok(depth + 1)
        }
    }

    fn parse_sum(&mut self, depth: usize) -> Result<Expr, DiceError> {
        let mut left = self.parse_signed(depth)?;
        loop {
            let spaced = self.skip_whitespace();
            left = match self.peek() {
                Some('+') => {
                    self.pos += 1;
                    Expr::Add(Box::new(left), Box::new(self.parse_signed(depth)?))
                }
                Some('-') => {
                    self.pos += 1;
                    Expr::Sub(Box::new(left), Box::new(self.parse_signed(depth)?))
                }
                Some(c) if spaced && (c.is_ascii_digit() || c == 'd' || c == '(' || c == 'a') => {
                    Expr::Add(Box::new(left), Box::new(self.parse_signed(depth)?))
                }
                _ => return Ok(left),
            };
        }
    }

    fn parse_signed(&mut self, depth: usize) -> Result<Expr, DiceError> {
        self.skip_whitespace();
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                let depth = Self::nested(depth)?;
                Ok(Expr::Neg(Box::new(self.parse_signed(depth)?)))
            }
            Some('+') => {
                self.pos += 1;
                let depth = Self::nested(depth)?;
                self.parse_signed(depth)
            }
            _ => self.parse_atom(depth),
        }
    }

    fn parse_atom(&mut self, depth: usize) -> Result<Expr, DiceError> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_sum(Self::nested(depth)?)?;
                self.expect(')')?;
                Ok(inner)
            }
            Some('a') if self.at_word("adv") => {
                self.pos += 3;
                Ok(Expr::Advantage(Box::new(self.parse_wrapped(depth)?)))
            }
            Some('d') if self.at_word("dis") => {
                self.pos += 3;
                Ok(Expr::Disadvantage(Box::new(self.parse_wrapped(depth)?)))
            }
            Some('d') => self.parse_dice(1),
            Some(c) if c.is_ascii_digit() => {
                let n = self.parse_number()?;
                if self.peek() == Some('d') {
                    self.parse_dice(n)
                } else if n > MAX_CONSTANT as u64 {
                    Err(DiceError::ConstantOutOfRange(
                        i64::try_from(n).unwrap_or(i64::MAX),
                    ))
                } else {
                    Ok(Expr::Constant(n as i64))
                }
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Parse `(expr)` after `adv`/`dis`. The inner expression is rolled
    /// twice, so its dice count double against the total.
    fn parse_wrapped(&mut self, depth: usize) -> Result<Expr, DiceError> {
        self.expect('(')?;
        let outer = std::mem::take(&mut self.total_dice);
        let inner = self.parse_sum(Self::nested(depth)?)?;
        self.expect(')')?;
        let rolled = self.total_dice.saturating_mul(2);
        self.add_dice(outer, rolled)?;
        Ok(inner)
    }

    fn add_dice(&mut self, current: u32, count: u32) -> Result<(), DiceError> {
        self.total_dice = current.saturating_add(count);
        if self.total_dice > MAX_TOTAL_DICE {
            return Err(DiceError::TooManyDice {
                count: self.total_dice,
                max: MAX_TOTAL_DICE,
            });
        }
        Ok(())
    }

    /// Parse `dS[kh|klN]` with the count already consumed.
    fn parse_dice(&mut self, count: u64) -> Result<Expr, DiceError> {
        // Skip the 'd'
        self.pos += 1;

        let sides = if self.peek() == Some('%') {
            self.pos += 1;
            100
        } else if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.parse_number()?
        } else {
            return Err(self.unexpected());
        };

        if count == 0 {
            return Err(DiceError::NoDice);
        }
        if count > u64::from(MAX_DICE_PER_TERM) {
            return Err(DiceError::TooManyDice {
                count: u32::try_from(count).unwrap_or(u32::MAX),
                max: MAX_DICE_PER_TERM,
            });
        }
        if sides == 0 || sides > u64::from(MAX_SIDES) {
            return Err(DiceError::InvalidDieSize(
                u32::try_from(sides).unwrap_or(u32::MAX),
            ));
        }
        let (count, sides) = (count as u32, sides as u32);

        let keep = if self.peek() == Some('k') {
            self.pos += 1;
            let highest = match self.peek() {
                Some('h') => true,
                Some('l') => false,
                _ => return Err(self.unexpected()),
            };
            self.pos += 1;
            let keep = u32::try_from(self.parse_number()?).unwrap_or(u32::MAX);
            if keep == 0 || keep > count {
                return Err(DiceError::InvalidKeepCount { keep, count });
            }
            Some(if highest {
                Keep::Highest(keep)
            } else {
                Keep::Lowest(keep)
            })
        } else {
            None
        };

        self.add_dice(self.total_dice, count)?;

        Ok(Expr::Dice { count, sides, keep })
    }

    fn parse_number(&mut self) -> Result<u64, DiceError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.unexpected());
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse().map_err(|_| DiceError::InvalidNumber(text))
    }
}

// ============================================================================
// Public expression and result types
// ============================================================================

/// A parsed, validated dice expression.
///
/// Serializes as its canonical notation and re-validates on deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiceExpression {
    root: Expr,
    notation: String,
}

impl DiceExpression {
    /// Parse a dice expression like "2d6+3", "4d6kh3" or "adv(1d20+5)".
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let trimmed = notation.trim();
        if trimmed.is_empty() {
            return Err(DiceError::Empty);
        }
        if trimmed.len() > MAX_NOTATION_LEN {
            return Err(DiceError::TooLong {
                max: MAX_NOTATION_LEN,
            });
        }

        let mut parser = Parser::new(trimmed);
        let root = parser.parse_sum(0)?;
        parser.skip_whitespace();
        if parser.peek().is_some() {
            return Err(parser.unexpected());
        }

        Ok(Self {
            root,
            notation: trimmed.to_string(),
        })
    }

    /// A single d20.
    pub fn d20() -> Self {
        Self::from_root(Expr::Dice {
            count: 1,
            sides: 20,
            keep: None,
        })
    }

    fn from_root(root: Expr) -> Self {
        let notation = root.to_string();
        Self { root, notation }
    }

    pub fn expr(&self) -> &Expr {
        &self.root
    }

    /// The notation as the caller wrote it.
    pub fn notation(&self) -> &str {
        &self.notation
    }

    /// Total number of dice rolled by one evaluation, counting both sides of
    /// every advantage wrapper.
    pub fn dice_count(&self) -> u32 {
        self.root.dice_count()
    }

    /// Roll every die from `dice` and total the expression.
    pub fn evaluate<D: DieSource + ?Sized>(&self, dice: &mut D) -> Roll {
        let mut rolls = Vec::new();
        let total = self.root.eval(dice, &mut rolls);
        Roll { total, dice: rolls }
    }

    /// Wrap the whole expression in `adv(...)` or `dis(...)`.
    pub fn with_advantage(&self, advantage: Advantage) -> Self {
        match advantage {
            Advantage::Normal => self.clone(),
            Advantage::Advantage => Self::from_root(Expr::Advantage(Box::new(self.root.clone()))),
            Advantage::Disadvantage => {
                Self::from_root(Expr::Disadvantage(Box::new(self.root.clone())))
            }
        }
    }

    /// Apply advantage to the d20 alone: the d20 is rolled twice and the
    /// better (or worse) face kept, while every other die is rolled once.
    /// Expressions without a plain `1d20` term are wrapped whole, as
    /// [`with_advantage`](Self::with_advantage) does.
    pub fn with_d20_advantage(&self, advantage: Advantage) -> Self {
        let keep = match advantage {
            Advantage::Normal => return self.clone(),
            Advantage::Advantage => Keep::Highest(1),
            Advantage::Disadvantage => Keep::Lowest(1),
        };
        match self.root.d20_rolled_twice(keep) {
            Some(root) => Self::from_root(root),
            None => self.with_advantage(advantage),
        }
    }

    /// Append a flat modifier.
    pub fn with_modifier(&self, modifier: i64) -> Self {
        let left = Box::new(self.root.clone());
        match modifier {
            0 => self.clone(),
            m if m > 0 => Self::from_root(Expr::Add(left, Box::new(Expr::Constant(m)))),
            m => Self::from_root(Expr::Sub(left, Box::new(Expr::Constant(m.saturating_neg())))),
        }
    }

    /// Double every dice count, leaving constants alone (critical hit damage).
    pub fn with_doubled_dice(&self) -> Self {
        Self::from_root(self.root.doubled())
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DiceExpression {
    type Error = DiceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<DiceExpression> for String {
    fn from(expr: DiceExpression) -> String {
        expr.root.to_string()
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

/// One physical die thrown during an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieRoll {
    pub sides: u32,
    pub value: u32,
    /// False when dropped by a keep suffix or the losing side of advantage.
    pub kept: bool,
}

/// Result of evaluating a dice expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roll {
    pub total: i64,
    /// Every die in the order it was rolled.
    pub dice: Vec<DieRoll>,
}

impl Roll {
    /// Faces of every die rolled, in order.
    pub fn values(&self) -> Vec<u32> {
        self.dice.iter().map(|d| d.value).collect()
    }

    pub fn kept_values(&self) -> Vec<u32> {
        self.dice.iter().filter(|d| d.kept).map(|d| d.value).collect()
    }

    /// First kept face among dice with the given number of sides.
    pub fn natural(&self, sides: u32) -> Option<u32> {
        self.dice
            .iter()
            .find(|d| d.kept && d.sides == sides)
            .map(|d| d.value)
    }

    /// Format the individual dice for display, dropped dice in parentheses.
    pub fn dice_display(&self) -> String {
        let shown: Vec<String> = self
            .dice
            .iter()
            .map(|d| {
                if d.kept {
                    d.value.to_string()
                } else {
                    format!("({})", d.value)
                }
            })
            .collect();
        format!("[{}]", shown.join(", "))
    }
}

impl fmt::Display for Roll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dice.is_empty() {
            write!(f, "{}", self.total)
        } else {
            write!(f, "{} = {}", self.dice_display(), self.total)
        }
    }
}

/// Convenience function to roll dice from a notation string with the thread RNG.
pub fn roll(notation: &str) -> Result<Roll, DiceError> {
    let expr = DiceExpression::parse(notation)?;
    Ok(expr.evaluate(&mut rand::thread_rng()))
}

/// Roll with a seeded generator so the result can be replayed.
pub fn roll_seeded(notation: &str, seed: u64) -> Result<Roll, DiceError> {
    let expr = DiceExpression::parse(notation)?;
    Ok(expr.evaluate(&mut StdRng::seed_from_u64(seed)))
}
