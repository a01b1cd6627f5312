// Record extraction: one diary entry in, one food record + calorie goal out.
//
// Extraction is a pure function of a single entry, so the whole corpus is
// processed with rayon. `par_iter().collect()` keeps source order, which is
// what keeps the goal vector aligned with the observation rows.

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{info, warn};

use super::schema::{DiaryEntry, FoodRecord, GoalsPayload, Meal};
use crate::config::{DuplicatePolicy, ParseErrorPolicy};
use crate::error::{PipelineError, RecordError, Warning};

/// A fully parsed person-day.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDay {
    pub line: usize,
    pub person_id: String,
    pub date: NaiveDate,
    pub record: FoodRecord,
    pub goal: f64,
}

/// Result of extracting a whole corpus under a parse-error policy.
#[derive(Debug, Default)]
pub struct Extraction {
    pub days: Vec<ExtractedDay>,
    pub warnings: Vec<Warning>,
}

impl Extraction {
    pub fn records(&self) -> Vec<&FoodRecord> {
        self.days.iter().map(|d| &d.record).collect()
    }

    pub fn goals(&self) -> Vec<f64> {
        self.days.iter().map(|d| d.goal).collect()
    }

    pub fn skipped(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, Warning::SkippedRecord { .. }))
            .count()
    }
}

/// Parse the nutrition payload into a food record.
///
/// Each dish contributes its first nutrition fact as calories. Repeated
/// dish names within the day are resolved by `duplicates`.
pub fn parse_food_record(
    payload: &str,
    duplicates: DuplicatePolicy,
) -> Result<FoodRecord, RecordError> {
    let meals: Vec<Meal> = serde_json::from_str(payload).map_err(|e| RecordError::Malformed {
        payload: "nutrition",
        detail: e.to_string(),
    })?;

    let mut record = FoodRecord::default();
    for meal in &meals {
        for dish in &meal.dishes {
            let fact = dish
                .nutritions
                .first()
                .ok_or_else(|| RecordError::NoNutrition(dish.name.clone()))?;
            let calories = fact.value.as_calories().map_err(|source| RecordError::Dish {
                dish: dish.name.clone(),
                source,
            })?;

            match duplicates {
                DuplicatePolicy::Overwrite => {
                    record.foods.insert(dish.name.clone(), calories);
                }
                DuplicatePolicy::Sum => {
                    let slot = record.foods.entry(dish.name.clone()).or_insert(0);
                    *slot = slot
                        .checked_add(calories)
                        .ok_or_else(|| RecordError::CalorieOverflow(dish.name.clone()))?;
                }
            }
        }
    }
    Ok(record)
}

/// Parse the goals payload into the day's calorie target.
pub fn parse_goal(payload: &str) -> Result<f64, RecordError> {
    let goals: GoalsPayload = serde_json::from_str(payload).map_err(|e| RecordError::Malformed {
        payload: "goals",
        detail: e.to_string(),
    })?;
    goals.calorie_goal()
}

/// Extract a single entry.
pub fn extract_entry(
    entry: &DiaryEntry,
    duplicates: DuplicatePolicy,
) -> Result<ExtractedDay, PipelineError> {
    let date = NaiveDate::parse_from_str(entry.date.trim(), "%Y-%m-%d").map_err(|e| {
        PipelineError::parse(entry.line, format!("invalid date '{}': {e}", entry.date))
    })?;
    let record =
        parse_food_record(&entry.nutrition, duplicates).map_err(|e| e.at_line(entry.line))?;
    let goal = parse_goal(&entry.goals).map_err(|e| e.at_line(entry.line))?;

    Ok(ExtractedDay {
        line: entry.line,
        person_id: entry.person_id.clone(),
        date,
        record,
        goal,
    })
}

/// Extract every entry in parallel, then apply the parse-error policy in
/// source order.
///
/// Under `Skip`, a failed line is dropped along with its goal and a
/// `SkippedRecord` warning is recorded. Under `Abort`, the first failure
/// (by line order) is returned.
pub fn extract_all(
    entries: &[Result<DiaryEntry, PipelineError>],
    duplicates: DuplicatePolicy,
    on_error: ParseErrorPolicy,
) -> Result<Extraction, PipelineError> {
    let results: Vec<Result<ExtractedDay, PipelineError>> = entries
        .par_iter()
        .map(|entry| match entry {
            Ok(entry) => extract_entry(entry, duplicates),
            Err(e) => Err(e.clone()),
        })
        .collect();

    let mut extraction = Extraction::default();
    for result in results {
        match result {
            Ok(day) => extraction.days.push(day),
            Err(PipelineError::Parse { line, reason }) => match on_error {
                ParseErrorPolicy::Skip => {
                    warn!(line, reason = %reason, "Skipping unparseable diary record");
                    extraction
                        .warnings
                        .push(Warning::SkippedRecord { line, reason });
                }
                ParseErrorPolicy::Abort => return Err(PipelineError::Parse { line, reason }),
            },
            Err(other) => return Err(other),
        }
    }

    info!(
        days = extraction.days.len(),
        skipped = extraction.skipped(),
        "Extracted food records"
    );
    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nutrition(dishes: &[(&str, &str)]) -> String {
        let dishes: Vec<String> = dishes
            .iter()
            .map(|(name, cal)| {
                format!(
                    r#"{{"name":"{name}","nutritions":[{{"name":"Calories","value":"{cal}"}},{{"name":"Fat","value":"3"}}]}}"#
                )
            })
            .collect();
        format!(r#"[{{"meal":"MY foods","sequence":1,"dishes":[{}]}}]"#, dishes.join(","))
    }

    #[test]
    fn test_parse_food_record_basic() {
        let record =
            parse_food_record(&nutrition(&[("Apple", "95"), ("Pizza", "1,120")]), DuplicatePolicy::Overwrite)
                .unwrap();
        assert_eq!(record.foods["Apple"], 95);
        assert_eq!(record.foods["Pizza"], 1120);
        assert_eq!(record.total_calories(), 1215);
    }

    #[test]
    fn test_duplicate_overwrite_keeps_last() {
        let payload = nutrition(&[("Coffee", "5"), ("Coffee", "40")]);
        let record = parse_food_record(&payload, DuplicatePolicy::Overwrite).unwrap();
        assert_eq!(record.foods["Coffee"], 40);
    }

    #[test]
    fn test_duplicate_sum_adds() {
        let payload = nutrition(&[("Coffee", "5"), ("Coffee", "40")]);
        let record = parse_food_record(&payload, DuplicatePolicy::Sum).unwrap();
        assert_eq!(record.foods["Coffee"], 45);
    }

    #[test]
    fn test_dish_without_nutrition_fails() {
        let payload = r#"[{"dishes":[{"name":"Mystery","nutritions":[]}]}]"#;
        assert_eq!(
            parse_food_record(payload, DuplicatePolicy::Overwrite),
            Err(RecordError::NoNutrition("Mystery".to_string()))
        );
    }

    #[test]
    fn test_empty_day_is_legal() {
        let record = parse_food_record("[]", DuplicatePolicy::Overwrite).unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn test_extract_all_skip_policy_drops_row_and_goal() {
        let good = DiaryEntry {
            line: 1,
            person_id: "1".into(),
            date: "2014-09-14".into(),
            nutrition: nutrition(&[("Apple", "95")]),
            goals: r#"{"goal":[{"name":"Calories","value":1500}]}"#.into(),
        };
        let bad = DiaryEntry {
            line: 2,
            nutrition: nutrition(&[("Apple", "n/a")]),
            ..good.clone()
        };
        let entries = vec![Ok(good), Ok(bad)];

        let extraction =
            extract_all(&entries, DuplicatePolicy::Overwrite, ParseErrorPolicy::Skip).unwrap();
        assert_eq!(extraction.days.len(), 1);
        assert_eq!(extraction.goals(), vec![1500.0]);
        assert_eq!(extraction.skipped(), 1);

        let aborted = extract_all(&entries, DuplicatePolicy::Overwrite, ParseErrorPolicy::Abort);
        assert!(matches!(aborted, Err(PipelineError::Parse { line: 2, .. })));
    }
}
