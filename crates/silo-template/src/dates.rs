//! Date-macro expansion.
//!
//! Keys named `yyyy`, `yyyymm`, `yyyymmdd` or `yyyymmddhh` (bare or as a
//! `<name>_` suffixed key) hold offsets relative to the current time:
//! an int is a single offset at the key's granularity, a `[lo, hi]` pair is
//! an inclusive range of offsets, and a plain string passes through
//! unchanged. Each base date key also implies sibling keys carrying the
//! year/month/day/hour components of its value.

use chrono::{Duration, Months, NaiveDate, NaiveDateTime};

use crate::value::VarValue;
use crate::{Result, TemplateError};

// ---------------------------------------------------------------------------
// Granularity
// ---------------------------------------------------------------------------

/// The four date-macro granularities, longest suffix first so that key
/// matching never claims a coarser granularity for a finer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hours,
    Days,
    Months,
    Years,
}

impl Granularity {
    const ALL: [Granularity; 4] = [Self::Hours, Self::Days, Self::Months, Self::Years];

    /// The key suffix naming this granularity.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Hours => "yyyymmddhh",
            Self::Days => "yyyymmdd",
            Self::Months => "yyyymm",
            Self::Years => "yyyy",
        }
    }

    /// The strftime format producing a value at this granularity.
    pub fn format(&self) -> &'static str {
        match self {
            Self::Hours => "%Y%m%d%H",
            Self::Days => "%Y%m%d",
            Self::Months => "%Y%m",
            Self::Years => "%Y",
        }
    }

    /// The granularity a key names, if any: the key must equal the suffix
    /// or end with `_` + suffix.
    pub fn of_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|g| key == g.suffix() || key.ends_with(&format!("_{}", g.suffix())))
    }

    /// `base` shifted by `n` steps of this granularity.
    pub fn offset(&self, base: NaiveDateTime, n: i64) -> NaiveDateTime {
        match self {
            Self::Hours => base + Duration::hours(n),
            Self::Days => base + Duration::days(n),
            Self::Months => shift_months(base, n),
            Self::Years => shift_months(base, n * 12),
        }
    }
}

fn shift_months(base: NaiveDateTime, n: i64) -> NaiveDateTime {
    let months = Months::new(n.unsigned_abs() as u32);
    if n >= 0 {
        base.checked_add_months(months).unwrap_or(base)
    } else {
        base.checked_sub_months(months).unwrap_or(base)
    }
}

// ---------------------------------------------------------------------------
// Value expansion
// ---------------------------------------------------------------------------

/// Expands the value of a date-macro key into its list of date strings.
///
/// Returns `None` when `key` is not a date-macro key.
pub fn handle_date_field(now: NaiveDateTime, key: &str, value: &VarValue) -> Result<Option<Vec<String>>> {
    let Some(gran) = Granularity::of_key(key) else {
        return Ok(None);
    };

    let offsets: Vec<i64> = match value {
        VarValue::Str(s) => return Ok(Some(vec![s.clone()])),
        VarValue::Int(n) => vec![*n],
        VarValue::List(items) if items.len() == 2 => {
            let mut bounds = [0i64; 2];
            for (slot, item) in bounds.iter_mut().zip(items) {
                *slot = item
                    .as_int()
                    .ok_or_else(|| TemplateError::InvalidDateValue { key: key.into() })?;
            }
            bounds.sort_unstable();
            (bounds[0]..=bounds[1]).collect()
        }
        VarValue::List(_) => {
            return Err(TemplateError::InvalidDateValue { key: key.into() });
        }
    };

    let mut dates: Vec<String> = offsets
        .into_iter()
        .map(|n| gran.offset(now, n).format(gran.format()).to_string())
        .collect();
    dates.sort_unstable();
    Ok(Some(dates))
}

// ---------------------------------------------------------------------------
// Sibling keys
// ---------------------------------------------------------------------------

struct SiblingSet {
    base: &'static str,
    siblings: &'static [(&'static str, &'static str)],
}

/// For each base date key, the component keys it implies and their formats.
const SIBLING_SETS: [SiblingSet; 3] = [
    SiblingSet {
        base: "yyyymmddhh",
        siblings: &[
            ("yyyymmddhh_yyyy", "%Y"),
            ("yyyymmddhh_mm", "%m"),
            ("yyyymmddhh_dd", "%d"),
            ("yyyymmddhh_hh", "%H"),
        ],
    },
    SiblingSet {
        base: "yyyymmdd",
        siblings: &[
            ("yyyymmdd_yyyy", "%Y"),
            ("yyyymmdd_mm", "%m"),
            ("yyyymmdd_dd", "%d"),
            ("yyyymmdd_yy", "%y"),
        ],
    },
    SiblingSet {
        base: "yyyymm",
        siblings: &[("yyyymm_yyyy", "%Y"), ("yyyymm_mm", "%m")],
    },
];

fn parse_base(base: &'static str, value: &str) -> Option<NaiveDateTime> {
    match base {
        "yyyymmddhh" => {
            let (date, hour) = value.split_at_checked(8)?;
            let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
            date.and_hms_opt(hour.parse().ok()?, 0, 0)
        }
        "yyyymmdd" => NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()?
            .and_hms_opt(0, 0, 0),
        "yyyymm" => NaiveDate::parse_from_str(&format!("{value}01"), "%Y%m%d")
            .ok()?
            .and_hms_opt(0, 0, 0),
        _ => None,
    }
}

/// Injects resolved sibling keys (`yyyymmdd_yyyy`, `yyyymmdd_mm`, ...) for
/// every base date key in `map`, skipping any sibling already present.
///
/// Base values that do not parse at their granularity are an error naming
/// the offending key/value pair.
pub fn derive_sibling_keys(map: &mut std::collections::BTreeMap<String, String>) -> Result<()> {
    for set in &SIBLING_SETS {
        let bases: Vec<(String, String)> = map
            .iter()
            .filter(|(k, _)| *k == set.base || k.ends_with(&format!("_{}", set.base)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, value) in bases {
            let parsed = parse_base(set.base, &value).ok_or_else(|| TemplateError::DateFormat {
                key: key.clone(),
                value: value.clone(),
                reason: format!("does not match {}", set.base),
            })?;
            for (sibling_suffix, format) in set.siblings {
                let new_key = key.replace(set.base, sibling_suffix);
                if map.contains_key(&new_key) {
                    continue;
                }
                map.insert(new_key, parsed.format(format).to_string());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2005, 12, 31)
            .unwrap()
            .and_hms_opt(13, 0, 0)
            .unwrap()
    }

    #[test]
    fn int_offset_days() {
        let out = handle_date_field(base(), "yyyymmdd", &VarValue::Int(-1))
            .unwrap()
            .unwrap();
        assert_eq!(out, vec!["20051230"]);
    }

    #[test]
    fn zero_offset_is_identity() {
        let out = handle_date_field(base(), "yyyymmdd", &VarValue::Int(0))
            .unwrap()
            .unwrap();
        assert_eq!(out, vec![base().format("%Y%m%d").to_string()]);
    }

    #[test]
    fn range_expands_sorted_regardless_of_bound_order() {
        let v = VarValue::List(vec![crate::Scalar::Int(-1), crate::Scalar::Int(-3)]);
        let out = handle_date_field(base(), "yyyymmdd", &v).unwrap().unwrap();
        assert_eq!(out, vec!["20051228", "20051229", "20051230"]);
    }

    #[test]
    fn range_accepts_numeric_strings() {
        let v = VarValue::List(vec![crate::Scalar::Str("-1".into()), crate::Scalar::Int(-3)]);
        let out = handle_date_field(base(), "yyyymmdd", &v).unwrap().unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn degenerate_range_has_length_one() {
        let v = VarValue::List(vec![crate::Scalar::Int(2), crate::Scalar::Int(2)]);
        let out = handle_date_field(base(), "yyyymmddhh", &v).unwrap().unwrap();
        assert_eq!(out, vec!["2005123115"]);
    }

    #[test]
    fn string_value_passes_through() {
        let out = handle_date_field(base(), "yyyymm", &VarValue::Str("190001".into()))
            .unwrap()
            .unwrap();
        assert_eq!(out, vec!["190001"]);
    }

    #[test]
    fn month_and_year_arithmetic() {
        let out = handle_date_field(base(), "yyyymm", &VarValue::Int(-1))
            .unwrap()
            .unwrap();
        assert_eq!(out, vec!["200511"]);

        let out = handle_date_field(base(), "report_yyyy", &VarValue::Int(1))
            .unwrap()
            .unwrap();
        assert_eq!(out, vec!["2006"]);
    }

    #[test]
    fn non_date_key_is_ignored() {
        assert!(
            handle_date_field(base(), "table", &VarValue::Int(3))
                .unwrap()
                .is_none()
        );
        // A key merely containing the suffix does not count.
        assert!(
            handle_date_field(base(), "yyyymmdd_first", &VarValue::Int(3))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn bad_list_shape_is_an_error() {
        let v = VarValue::List(vec![crate::Scalar::Int(1)]);
        assert!(handle_date_field(base(), "yyyymmdd", &v).is_err());
    }

    #[test]
    fn sibling_keys_for_day_granularity() {
        let mut m = BTreeMap::from([("yyyymmdd".to_string(), "20051230".to_string())]);
        derive_sibling_keys(&mut m).unwrap();
        assert_eq!(m["yyyymmdd_yyyy"], "2005");
        assert_eq!(m["yyyymmdd_mm"], "12");
        assert_eq!(m["yyyymmdd_dd"], "30");
        assert_eq!(m["yyyymmdd_yy"], "05");
    }

    #[test]
    fn sibling_keys_respect_prefix_and_existing_entries() {
        let mut m = BTreeMap::from([
            ("load_yyyymmddhh".to_string(), "2005123109".to_string()),
            ("load_yyyymmddhh_hh".to_string(), "keep".to_string()),
        ]);
        derive_sibling_keys(&mut m).unwrap();
        assert_eq!(m["load_yyyymmddhh_yyyy"], "2005");
        assert_eq!(m["load_yyyymmddhh_hh"], "keep");
    }

    #[test]
    fn unparseable_base_value_is_an_error() {
        let mut m = BTreeMap::from([("yyyymmdd".to_string(), "not-a-date".to_string())]);
        let err = derive_sibling_keys(&mut m).unwrap_err();
        assert!(matches!(err, TemplateError::DateFormat { .. }));
    }
}
