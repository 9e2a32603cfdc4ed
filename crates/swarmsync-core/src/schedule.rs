//! Five-field cron-like schedules.
//!
//! A schedule has the fields `minute hour day-of-month month day-of-week`.
//! Each field is `*`, `*/N` or an exact number. A tick is due only when all
//! five fields match; day-of-month and day-of-week are ANDed, unlike POSIX
//! cron which ORs them when both are restricted.

use std::fmt;

use chrono::{Datelike, Timelike};

use crate::error::{Error, Result};

/// Number of fields in a schedule.
pub const FIELD_COUNT: usize = 5;

/// Bit mask with every field matched.
const ALL_FIELDS: u8 = (1 << FIELD_COUNT) - 1;

const FIELD_NAMES: [&str; FIELD_COUNT] = ["minute", "hour", "day-of-month", "month", "day-of-week"];

/// One parsed schedule field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Field absent; never matches.
    Empty,

    /// `*`; always matches.
    Any,

    /// `*/N`; matches when the component is divisible by `N`.
    Step(u32),

    /// A number; matches when equal to the component.
    Exact(u32),

    /// Text that is not a valid field. Evaluating it is an error.
    Invalid {
        /// Raw field text.
        value: String,
        /// Why the text is rejected.
        reason: &'static str,
    },
}

impl Field {
    /// Parses one field.
    ///
    /// ```
    /// use swarmsync_core::Field;
    ///
    /// assert_eq!(Field::parse("*"), Field::Any);
    /// assert_eq!(Field::parse("*/15"), Field::Step(15));
    /// assert_eq!(Field::parse("7"), Field::Exact(7));
    /// assert!(matches!(Field::parse("*/x"), Field::Invalid { .. }));
    /// ```
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Self::Empty;
        }
        if let Ok(value) = text.parse::<u32>() {
            return Self::Exact(value);
        }

        let invalid = |reason| Self::Invalid {
            value: text.to_string(),
            reason,
        };

        match text.strip_prefix('*') {
            Some("") => Self::Any,
            Some(rest) => match rest.strip_prefix('/') {
                Some(step) => match step.parse::<u32>() {
                    Ok(0) => invalid("step must be greater than zero"),
                    Ok(step) => Self::Step(step),
                    Err(_) => invalid("step is not a number"),
                },
                None => invalid("expected '*' or '*/N'"),
            },
            None => invalid("not a number"),
        }
    }

    /// Evaluates the field against one time component.
    fn matches(&self, index: usize, component: u32) -> Result<bool> {
        match self {
            Self::Empty => Ok(false),
            Self::Any => Ok(true),
            Self::Step(step) => Ok(component % step == 0),
            Self::Exact(value) => Ok(component == *value),
            Self::Invalid { value, reason } => Err(Error::InvalidSchedule {
                field: FIELD_NAMES[index],
                value: value.clone(),
                reason: (*reason).to_string(),
            }),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Any => write!(f, "*"),
            Self::Step(step) => write!(f, "*/{step}"),
            Self::Exact(value) => write!(f, "{value}"),
            Self::Invalid { value, .. } => write!(f, "{value}"),
        }
    }
}

/// A parsed five-field schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    fields: [Field; FIELD_COUNT],
}

impl Schedule {
    /// Parses a schedule from command-line arguments.
    ///
    /// A single argument is split on whitespace. Several arguments are one
    /// field each, so an empty argument stays an empty field. Missing fields
    /// are [`Field::Empty`], so a short schedule never fires. Fields past
    /// the fifth are ignored.
    ///
    /// ```
    /// use swarmsync_core::{Field, Schedule};
    ///
    /// let joined = Schedule::parse(["0 4 * * 1"]);
    /// let split = Schedule::parse(["0", "4", "*", "*", "1"]);
    /// assert_eq!(joined, split);
    ///
    /// let gap = Schedule::parse(["*", "", "*", "*", "*"]);
    /// assert_eq!(gap.fields()[1], Field::Empty);
    /// ```
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_string())
            .collect();

        let fields = if let [single] = args.as_slice() {
            let mut parts = single.split_whitespace();
            std::array::from_fn(|_| parts.next().map_or(Field::Empty, Field::parse))
        } else {
            let mut parts = args.iter().map(String::as_str);
            std::array::from_fn(|_| parts.next().map_or(Field::Empty, Field::parse))
        };
        Self { fields }
    }

    /// Returns the parsed fields in order.
    pub const fn fields(&self) -> &[Field; FIELD_COUNT] {
        &self.fields
    }

    /// Checks every field, returning the first invalid one as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchedule`] for the first invalid field.
    pub fn validate(&self) -> Result<()> {
        for (index, field) in self.fields.iter().enumerate() {
            field.matches(index, 0)?;
        }
        Ok(())
    }

    /// Returns true if every field parsed.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Computes the match mask for `now`; bit `i` is set when field `i` matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchedule`] at the first invalid field, in
    /// field order.
    pub fn match_mask<T: Datelike + Timelike>(&self, now: &T) -> Result<u8> {
        let components = [
            now.minute(),
            now.hour(),
            now.day(),
            now.month(),
            now.weekday().num_days_from_sunday(),
        ];

        let mut mask = 0u8;
        for (index, (field, component)) in self.fields.iter().zip(components).enumerate() {
            if field.matches(index, component)? {
                mask |= 1 << index;
            }
        }
        Ok(mask)
    }

    /// Returns true when `now` matches all five fields.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use swarmsync_core::Schedule;
    ///
    /// let at = |h, m| NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(h, m, 0).unwrap();
    /// let schedule = Schedule::parse(["*/5 * * * *"]);
    /// assert!(schedule.due_now(&at(10, 15)).unwrap());
    /// assert!(!schedule.due_now(&at(10, 16)).unwrap());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchedule`] if any field is invalid; the tick
    /// must then be treated as not due.
    pub fn due_now<T: Datelike + Timelike>(&self, now: &T) -> Result<bool> {
        Ok(self.match_mask(now)? == ALL_FIELDS)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.fields.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(" ").trim_end())
    }
}

impl std::str::FromStr for Schedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let schedule = Self::parse([s]);
        schedule.validate()?;
        Ok(schedule)
    }
}
