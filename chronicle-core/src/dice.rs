//! Dice notation and bounded random draws.
//!
//! Supports `XdY+Z` expressions with several dice components and a signed
//! constant, plus the single-die draws the combat engine uses for attack
//! and defense figures.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Most dice one expression may roll, across all of its terms.
pub const MAX_DICE: u32 = 100;

/// Largest magnitude of the constant part of an expression.
pub const MAX_MODIFIER: i32 = 10_000;

/// Error type for dice parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
}

/// Supported die sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }

    /// Draw a single value in `1..=sides`.
    pub fn roll<R: Rng>(&self, rng: &mut R) -> u32 {
        rng.gen_range(1..=self.sides())
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Granularity of the attack and defense draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollGranularity {
    #[default]
    D20,
    D100,
}

impl RollGranularity {
    pub fn die(&self) -> DieType {
        match self {
            RollGranularity::D20 => DieType::D20,
            RollGranularity::D100 => DieType::D100,
        }
    }
}

impl FromStr for RollGranularity {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d20" | "20" => Ok(RollGranularity::D20),
            "d100" | "100" => Ok(RollGranularity::D100),
            other => Err(DiceError::InvalidNotation(other.to_string())),
        }
    }
}

/// One `NdX` term of an expression, already signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceTerm {
    pub count: u32,
    pub die: DieType,
    pub negative: bool,
}

/// A parsed dice expression such as `2d6+1d4-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub terms: Vec<DiceTerm>,
    pub modifier: i32,
    pub original: String,
}

impl DiceExpression {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let cleaned: String = notation
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if cleaned.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut terms = Vec::new();
        let mut modifier = 0i32;
        let mut negative = false;
        let mut current = String::new();

        for ch in cleaned.chars().chain(std::iter::once('+')) {
            if ch == '+' || ch == '-' {
                if current.is_empty() {
                    // A leading sign, or two signs in a row.
                    if !terms.is_empty() || modifier != 0 || ch == '+' {
                        return Err(DiceError::InvalidNotation(notation.to_string()));
                    }
                } else {
                    Self::push_term(&current, negative, &mut terms, &mut modifier, notation)?;
                    current.clear();
                }
                negative = ch == '-';
            } else {
                current.push(ch);
            }
        }

        if terms.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }

        Ok(Self {
            terms,
            modifier,
            original: cleaned,
        })
    }

    fn push_term(
        token: &str,
        negative: bool,
        terms: &mut Vec<DiceTerm>,
        modifier: &mut i32,
        notation: &str,
    ) -> Result<(), DiceError> {
        let invalid = || DiceError::InvalidNotation(notation.to_string());

        match token.split_once('d') {
            Some((count, sides)) => {
                let count: u32 = if count.is_empty() {
                    1
                } else {
                    count.parse().map_err(|_| invalid())?
                };
                let sides: u32 = sides.parse().map_err(|_| invalid())?;
                let die = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;
                let rolled: u32 = terms.iter().map(|t| t.count).sum();
                if count == 0 || rolled.saturating_add(count) > MAX_DICE {
                    return Err(invalid());
                }
                terms.push(DiceTerm {
                    count,
                    die,
                    negative,
                });
            }
            None => {
                let value: i32 = token.parse().map_err(|_| invalid())?;
                let signed = if negative {
                    modifier.checked_sub(value)
                } else {
                    modifier.checked_add(value)
                };
                *modifier = signed
                    .filter(|m| m.unsigned_abs() <= MAX_MODIFIER.unsigned_abs())
                    .ok_or_else(invalid)?;
            }
        }
        Ok(())
    }

    /// Roll the expression with the given RNG.
    pub fn roll<R: Rng>(&self, rng: &mut R) -> RollResult {
        let mut rolls = Vec::new();
        let mut total = self.modifier;

        for term in &self.terms {
            for _ in 0..term.count {
                let value = term.die.roll(rng);
                rolls.push(value);
                let value = i32::try_from(value).unwrap_or(i32::MAX);
                total = if term.negative {
                    total.saturating_sub(value)
                } else {
                    total.saturating_add(value)
                };
            }
        }

        RollResult {
            notation: self.original.clone(),
            rolls,
            modifier: self.modifier,
            total,
        }
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Result of rolling a dice expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    pub notation: String,
    pub rolls: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
}

/// Parse and roll in one step.
pub fn roll<R: Rng>(notation: &str, rng: &mut R) -> Result<RollResult, DiceError> {
    Ok(DiceExpression::parse(notation)?.roll(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_simple() {
        let expr = DiceExpression::parse("1d20").unwrap();
        assert_eq!(expr.terms.len(), 1);
        assert_eq!(expr.terms[0].count, 1);
        assert_eq!(expr.terms[0].die, DieType::D20);
        assert_eq!(expr.modifier, 0);
    }

    #[test]
    fn test_parse_with_modifier() {
        let expr = DiceExpression::parse("2d6 + 3").unwrap();
        assert_eq!(expr.terms[0].count, 2);
        assert_eq!(expr.modifier, 3);

        let expr = DiceExpression::parse("d8-1").unwrap();
        assert_eq!(expr.terms[0].count, 1);
        assert_eq!(expr.modifier, -1);
    }

    #[test]
    fn test_parse_negative_term() {
        let expr = DiceExpression::parse("1d20-1d4").unwrap();
        assert_eq!(expr.terms.len(), 2);
        assert!(expr.terms[1].negative);

        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let total = expr.roll(&mut rng).total;
            assert!((1 - 4..=20 - 1).contains(&total));
        }
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(DiceExpression::parse(""), Err(DiceError::NoDice));
        assert_eq!(
            DiceExpression::parse("1d7"),
            Err(DiceError::InvalidDieSize(7))
        );
        assert!(DiceExpression::parse("xd6").is_err());
        assert!(DiceExpression::parse("1d6++2").is_err());
        assert!(DiceExpression::parse("0d6").is_err());
    }

    #[test]
    fn test_roll_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let expr = DiceExpression::parse("3d6+2").unwrap();
        for _ in 0..200 {
            let result = expr.roll(&mut rng);
            assert!((5..=20).contains(&result.total));
            assert_eq!(result.rolls.len(), 3);
        }
    }

    #[test]
    fn test_dice_count_is_capped() {
        assert!(matches!(
            DiceExpression::parse("1000000000d100"),
            Err(DiceError::InvalidNotation(_))
        ));
        assert!(DiceExpression::parse("60d6+41d4").is_err());
        assert!(DiceExpression::parse("99999999999d6").is_err());

        let expr = DiceExpression::parse("60d6+40d4").unwrap();
        let result = expr.roll(&mut StdRng::seed_from_u64(5));
        assert_eq!(result.rolls.len(), MAX_DICE as usize);
    }

    #[test]
    fn test_modifier_overflow_is_rejected() {
        assert!(matches!(
            DiceExpression::parse("2147483647+1"),
            Err(DiceError::InvalidNotation(_))
        ));
        assert!(DiceExpression::parse("1d6-2147483647-5").is_err());
        assert!(DiceExpression::parse("1d6+10001").is_err());
        assert_eq!(DiceExpression::parse("1d6+10000").unwrap().modifier, 10_000);
    }

    #[test]
    fn test_seeded_roll_is_repeatable() {
        let a = roll("1d100", &mut StdRng::seed_from_u64(42)).unwrap();
        let b = roll("1d100", &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_granularity_parse() {
        assert_eq!("d100".parse::<RollGranularity>(), Ok(RollGranularity::D100));
        assert_eq!("D20".parse::<RollGranularity>(), Ok(RollGranularity::D20));
        assert!("d6".parse::<RollGranularity>().is_err());
        assert_eq!(RollGranularity::default().die(), DieType::D20);
    }
}
