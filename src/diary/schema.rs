// Typed schema for the raw diary payloads.
//
// The nutrition payload is a list of meals, each holding dishes, each dish
// holding a list of nutrition facts. The goals payload holds the day's
// running totals and targets as two lists of the same fact shape. Fields the
// pipeline needs are required; anything else is ignored.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{RecordError, ValueError};

/// One line of raw diary input: a person-day with its payloads still unparsed.
#[derive(Debug, Clone, PartialEq)]
pub struct DiaryEntry {
    /// 1-based line number in the source file, for error reporting
    pub line: usize,
    pub person_id: String,
    pub date: String,
    pub nutrition: String,
    pub goals: String,
}

/// A meal within one day (breakfast, lunch, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct Meal {
    #[serde(default)]
    pub meal: Option<String>,
    #[serde(default)]
    pub sequence: Option<u32>,
    pub dishes: Vec<Dish>,
}

/// A single logged dish. The first nutrition fact is its calorie count.
#[derive(Debug, Clone, Deserialize)]
pub struct Dish {
    pub name: String,
    pub nutritions: Vec<NutritionFact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NutritionFact {
    pub name: String,
    pub value: NutritionValue,
}

/// Diary values show up both as JSON numbers and as display strings
/// with thousands separators ("1,250").
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NutritionValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl NutritionValue {
    /// Parse as an exact non-negative integer calorie count.
    pub fn as_calories(&self) -> Result<u32, ValueError> {
        match self {
            Self::Integer(i) => u32::try_from(*i).map_err(|_| ValueError::OutOfRange(*i)),
            Self::Float(f) => {
                if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u32::MAX as f64 {
                    Ok(*f as u32)
                } else {
                    Err(ValueError::NotWholeCalories(*f))
                }
            }
            Self::Text(s) => {
                let cleaned = strip_separators(s);
                if cleaned.is_empty() {
                    return Err(ValueError::Empty(s.clone()));
                }
                cleaned
                    .parse::<u32>()
                    .map_err(|_| ValueError::NonNumeric(s.clone()))
            }
        }
    }

    /// Parse as a real number (used for goals, which may be fractional).
    pub fn as_f64(&self) -> Result<f64, ValueError> {
        match self {
            Self::Integer(i) => Ok(*i as f64),
            Self::Float(f) if f.is_finite() => Ok(*f),
            Self::Float(f) => Err(ValueError::NonFinite(*f)),
            Self::Text(s) => strip_separators(s)
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ValueError::NonNumeric(s.clone())),
        }
    }
}

fn strip_separators(s: &str) -> String {
    s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect()
}

/// The goals payload: what was eaten in total and what was targeted.
#[derive(Debug, Clone, Deserialize)]
pub struct GoalsPayload {
    #[serde(default)]
    pub total: Vec<NutritionFact>,
    pub goal: Vec<NutritionFact>,
}

impl GoalsPayload {
    /// The first calorie target in the goal list.
    pub fn calorie_goal(&self) -> Result<f64, RecordError> {
        let fact = self
            .goal
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case("calories"))
            .ok_or(RecordError::NoCalorieGoal)?;
        fact.value.as_f64().map_err(RecordError::Goal)
    }
}

/// Food name → calories for one person-day. Ordered so that vocabulary
/// construction is deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoodRecord {
    pub foods: BTreeMap<String, u32>,
}

impl FoodRecord {
    pub fn total_calories(&self) -> u64 {
        self.foods.values().map(|&c| c as u64).sum()
    }

    pub fn len(&self) -> usize {
        self.foods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.foods.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for FoodRecord {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        Self {
            foods: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
