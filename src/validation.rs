use crate::errors::{AppError, AppResult};
use crate::models::{AppendMetricPayload, CreateProjectPayload, DecisionOutcome};
use chrono::NaiveDate;

pub const MAX_REVENUE: f64 = 1_000_000.0;
pub const MAX_HOURS_PER_DAY: f64 = 24.0;
pub const MAX_CONVERSIONS: i64 = 10_000;
pub const MAX_NAME_CHARS: usize = 100;
pub const MIN_HYPOTHESIS_CHARS: usize = 10;
pub const MAX_HYPOTHESIS_CHARS: usize = 500;

pub fn parse_number(field: &str, raw: &str) -> AppResult<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| AppError::validation(field, raw, "must be a valid number"))
}

pub fn parse_integer(field: &str, raw: &str) -> AppResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::validation(field, raw, "must be a whole number"))
}

pub fn parse_date(field: &str, raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(field, raw, "invalid format, use YYYY-MM-DD"))
}

pub fn revenue(value: f64) -> AppResult<f64> {
    if !value.is_finite() {
        return Err(AppError::validation("revenue", value, "must be a valid number"));
    }
    if value < 0.0 {
        return Err(AppError::validation("revenue", value, "cannot be negative"));
    }
    if value > MAX_REVENUE {
        return Err(AppError::validation(
            "revenue",
            value,
            "suspiciously high (over 1,000,000), check for a typo",
        ));
    }
    Ok(value)
}

pub fn hours(value: f64) -> AppResult<f64> {
    if !value.is_finite() {
        return Err(AppError::validation("hours", value, "must be a valid number"));
    }
    if value < 0.0 {
        return Err(AppError::validation("hours", value, "cannot be negative"));
    }
    if value > MAX_HOURS_PER_DAY {
        return Err(AppError::validation(
            "hours",
            value,
            "at most 24 hours per day, were minutes entered instead of hours?",
        ));
    }
    Ok(value)
}

pub fn conversions(value: i64) -> AppResult<i64> {
    if value < 0 {
        return Err(AppError::validation("conversions", value, "cannot be negative"));
    }
    if value > MAX_CONVERSIONS {
        return Err(AppError::validation(
            "conversions",
            value,
            "suspiciously high (over 10,000), check for a typo",
        ));
    }
    Ok(value)
}

pub fn not_future(field: &str, date: NaiveDate, today: NaiveDate) -> AppResult<NaiveDate> {
    if date > today {
        return Err(AppError::validation(field, date, "cannot record metrics in the future"));
    }
    Ok(date)
}

pub fn project_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::validation("name", raw, "cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::validation("name", raw, "at most 100 characters"));
    }
    Ok(name.to_string())
}

pub fn hypothesis(raw: &str) -> AppResult<String> {
    let hypothesis = raw.trim();
    let length = hypothesis.chars().count();
    if length < MIN_HYPOTHESIS_CHARS {
        return Err(AppError::validation("hypothesis", raw, "at least 10 characters"));
    }
    if length > MAX_HYPOTHESIS_CHARS {
        return Err(AppError::validation("hypothesis", raw, "at most 500 characters"));
    }
    Ok(hypothesis.to_string())
}

/// A reason is mandatory for rejections and dropped for every other outcome.
pub fn rejection_reason(outcome: Option<DecisionOutcome>, reason: Option<&str>) -> AppResult<Option<String>> {
    let reason = reason.map(str::trim).filter(|reason| !reason.is_empty());
    match (outcome, reason) {
        (Some(DecisionOutcome::Rejected), Some(reason)) => Ok(Some(reason.to_string())),
        (Some(DecisionOutcome::Rejected), None) => Err(AppError::validation(
            "rejection_reason",
            "",
            "a reason is required when rejecting a decision",
        )),
        _ => Ok(None),
    }
}

pub fn metric_payload(payload: &AppendMetricPayload, today: NaiveDate) -> AppResult<()> {
    revenue(payload.revenue)?;
    hours(payload.hours)?;
    conversions(payload.conversions)?;
    not_future("date", payload.date, today)?;
    Ok(())
}

/// Returns the payload with trimmed name and hypothesis.
pub fn project_payload(payload: &CreateProjectPayload) -> AppResult<CreateProjectPayload> {
    Ok(CreateProjectPayload {
        name: project_name(&payload.name)?,
        hypothesis: hypothesis(&payload.hypothesis)?,
        start_date: payload.start_date,
        state: payload.state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn numeric_bounds() {
        assert_eq!(revenue(1_000_000.0).expect("max"), 1_000_000.0);
        assert!(revenue(1_000_000.01).is_err());
        assert!(revenue(-1.0).is_err());
        assert_eq!(hours(24.0).expect("max"), 24.0);
        assert!(hours(24.5).is_err());
        assert!(conversions(10_001).is_err());
        assert_eq!(conversions(0).expect("zero"), 0);
    }

    #[test]
    fn unparseable_input_names_the_field() {
        let error = parse_number("revenue", "12,5 usd").expect_err("not a number");
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(error.to_string().contains("revenue"));
        assert!(error.to_string().contains("12,5 usd"));
        assert!(parse_integer("conversions", "3.5").is_err());
        assert!(parse_date("date", "01/02/2026").is_err());
    }

    #[test]
    fn future_dates_rejected() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).expect("date");
        let tomorrow = NaiveDate::from_ymd_opt(2026, 3, 2).expect("date");
        assert!(not_future("date", today, today).is_ok());
        assert!(not_future("date", tomorrow, today).is_err());
    }

    #[test]
    fn text_fields_are_trimmed_and_bounded() {
        assert_eq!(project_name("  digest  ").expect("name"), "digest");
        assert!(project_name("   ").is_err());
        assert!(project_name(&"x".repeat(101)).is_err());
        assert!(hypothesis("too short").is_err());
        assert!(hypothesis(&"y".repeat(501)).is_err());
        assert!(hypothesis("Writers will pay for a weekly digest").is_ok());
    }

    #[test]
    fn rejection_requires_reason() {
        assert!(rejection_reason(Some(DecisionOutcome::Rejected), Some("  ")).is_err());
        assert_eq!(
            rejection_reason(Some(DecisionOutcome::Rejected), Some(" still growing ")).expect("reason"),
            Some("still growing".to_string())
        );
        assert_eq!(
            rejection_reason(Some(DecisionOutcome::Accepted), Some("ignored")).expect("accepted"),
            None
        );
    }
}
