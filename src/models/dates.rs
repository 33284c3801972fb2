use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AcquireError;

/// Day-month-year form used by the dated sources and the trigger surface
const DATE_FORMAT: &str = "%d.%m.%Y";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// A stay: check-in, check-out and the nights between them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[serde(with = "required")]
    pub check_in: NaiveDate,
    #[serde(with = "required")]
    pub check_out: NaiveDate,
    pub nights: u32,
}

impl DateRange {
    /// Stay of `nights` from `check_in`; the check-out saturates at the
    /// last representable date
    pub fn starting(check_in: NaiveDate, nights: u32) -> Self {
        Self::try_starting(check_in, nights).unwrap_or(Self {
            check_in,
            check_out: NaiveDate::MAX,
            nights,
        })
    }

    /// `None` when the check-out would fall outside the calendar
    pub fn try_starting(check_in: NaiveDate, nights: u32) -> Option<Self> {
        Some(Self {
            check_in,
            check_out: check_in.checked_add_days(Days::new(u64::from(nights)))?,
            nights,
        })
    }

    /// Range used when the periodic path has no explicit dates
    pub fn default_from(today: NaiveDate) -> Self {
        let check_in = today.checked_add_days(Days::new(7)).unwrap_or(today);
        Self::starting(check_in, 7)
    }

    pub fn check_in_text(&self) -> String {
        format_date(self.check_in)
    }

    pub fn check_out_text(&self) -> String {
        format_date(self.check_out)
    }
}

/// Parameters of a season sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonRequest {
    pub year: i32,
    #[serde(with = "required")]
    pub start_date: NaiveDate,
    #[serde(with = "required")]
    pub end_date: NaiveDate,
    pub nights: u32,
    pub interval_days: u32,
}

impl SeasonRequest {
    /// Weekly seven-night sweep over the whole of `year`
    pub fn full_year(year: i32) -> Option<Self> {
        Some(Self {
            year,
            start_date: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end_date: NaiveDate::from_ymd_opt(year, 12, 31)?,
            nights: 7,
            interval_days: 7,
        })
    }

    pub fn validate(&self) -> Result<(), AcquireError> {
        if self.interval_days < 1 {
            return Err(AcquireError::InvalidRequest(
                "intervalDays must be at least 1".to_string(),
            ));
        }
        if self.end_date < self.start_date {
            return Err(AcquireError::InvalidRequest(format!(
                "endDate {} precedes startDate {}",
                format_date(self.end_date),
                format_date(self.start_date)
            )));
        }
        if DateRange::try_starting(self.start_date, self.nights).is_none() {
            return Err(AcquireError::InvalidRequest(format!(
                "{} nights from {} runs past the calendar",
                self.nights,
                format_date(self.start_date)
            )));
        }
        Ok(())
    }

    /// Every stay the sweep will request, in order.
    ///
    /// Stops before the first stay whose check-out falls after `year`.
    pub fn ranges(&self) -> Vec<DateRange> {
        let mut ranges = Vec::new();
        if self.interval_days < 1 {
            return ranges;
        }

        let step = Days::new(u64::from(self.interval_days));
        let mut cursor = Some(self.start_date);
        while let Some(check_in) = cursor.filter(|date| *date <= self.end_date) {
            let Some(range) = DateRange::try_starting(check_in, self.nights) else {
                break;
            };
            if range.check_out.year() > self.year {
                break;
            }
            ranges.push(range);
            cursor = check_in.checked_add_days(step);
        }
        ranges
    }
}

pub(crate) mod required {
    use super::*;

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_date(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("expected DD.MM.YYYY, got {text:?}")))
    }
}

pub(crate) mod optional {
    use super::*;

    pub fn serialize<S: Serializer>(
        date: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => serializer.serialize_some(&format_date(*date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        match text {
            Some(text) => parse_date(&text).map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!("expected DD.MM.YYYY, got {text:?}"))
            }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn formats_and_parses_day_month_year() {
        assert_eq!(format_date(date(2026, 1, 8)), "08.01.2026");
        assert_eq!(parse_date("08.01.2026"), Some(date(2026, 1, 8)));
        assert_eq!(parse_date("2026-01-08"), None);
    }

    #[test]
    fn check_out_is_check_in_plus_nights() {
        let range = DateRange::starting(date(2026, 2, 26), 7);
        assert_eq!(range.check_out, date(2026, 3, 5));
        assert_eq!(range.check_out_text(), "05.03.2026");
    }

    #[test]
    fn default_range_starts_a_week_out() {
        let range = DateRange::default_from(date(2026, 10, 19));
        assert_eq!(range.check_in, date(2026, 10, 26));
        assert_eq!(range.check_out, date(2026, 11, 2));
        assert_eq!(range.nights, 7);
    }

    #[test]
    fn weekly_sweep_covers_ceil_of_span_over_interval() {
        let request = SeasonRequest {
            year: 2026,
            start_date: date(2026, 1, 1),
            end_date: date(2026, 3, 1),
            nights: 7,
            interval_days: 7,
        };

        let ranges = request.ranges();
        // 59 days / 7 rounded up
        assert_eq!(ranges.len(), 9);
        assert_eq!(ranges[0].check_in_text(), "01.01.2026");
        assert_eq!(ranges[1].check_in_text(), "08.01.2026");
        assert_eq!(ranges[8].check_in_text(), "26.02.2026");
    }

    #[test]
    fn sweep_stops_before_checkout_crosses_the_year() {
        let request = SeasonRequest {
            year: 2026,
            start_date: date(2026, 12, 10),
            end_date: date(2026, 12, 31),
            nights: 7,
            interval_days: 7,
        };

        let ranges = request.ranges();
        // 10.12, 17.12 and 24.12; the 31.12 stay would check out in 2027
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[2].check_out, date(2026, 12, 31));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut request = SeasonRequest::full_year(2026).unwrap();
        request.interval_days = 0;
        assert!(matches!(request.validate(), Err(AcquireError::InvalidRequest(_))));
        assert!(request.ranges().is_empty());
    }

    #[test]
    fn huge_interval_ends_the_sweep_instead_of_overflowing() {
        let request = SeasonRequest {
            year: 2026,
            start_date: date(2026, 1, 1),
            end_date: date(2026, 12, 31),
            nights: 7,
            interval_days: u32::MAX,
        };

        assert!(request.validate().is_ok());
        let ranges = request.ranges();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].check_in, date(2026, 1, 1));
    }

    #[test]
    fn nights_past_the_calendar_are_rejected() {
        let request: SeasonRequest = serde_json::from_str(
            r#"{"year":2026,"startDate":"01.06.2026","endDate":"30.09.2026","nights":4000000000,"intervalDays":7}"#,
        )
        .unwrap();

        assert!(matches!(request.validate(), Err(AcquireError::InvalidRequest(_))));
        assert!(request.ranges().is_empty());
        assert_eq!(DateRange::starting(date(2026, 6, 1), u32::MAX).check_out, NaiveDate::MAX);
    }

    #[test]
    fn season_request_reads_dates_from_json() {
        let request: SeasonRequest = serde_json::from_str(
            r#"{"year":2026,"startDate":"01.06.2026","endDate":"30.09.2026","nights":7,"intervalDays":7}"#,
        )
        .unwrap();
        assert_eq!(request.start_date, date(2026, 6, 1));
        assert!(request.validate().is_ok());
    }
}
