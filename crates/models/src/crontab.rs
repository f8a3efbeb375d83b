use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CronExpr is a five-field crontab expression
/// (minute, hour, day-of-month, month, day-of-week).
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CronExpr(String);

impl CronExpr {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compile into a schedule of fire instants.
    pub fn schedule(&self) -> Result<cron::Schedule, cron::error::Error> {
        let expr = self.0.trim();

        // Crontab expressions carry five fields; Schedule additionally
        // wants a leading seconds field.
        if expr.split_whitespace().count() == 5 {
            cron::Schedule::from_str(&format!("0 {expr}"))
        } else {
            cron::Schedule::from_str(expr)
        }
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::CronExpr;
    use chrono::{TimeZone, Timelike, Utc};

    #[test]
    fn test_crontab_forms() {
        for (case, expect) in [
            ("0 0 * * *", true),
            ("*/5 * * * *", true),
            ("20 * * * *", true),
            ("not a cron", false),
            ("", false),
            ("99 * * * *", false),
        ] {
            let out = CronExpr::new(case).schedule();
            if expect {
                out.unwrap();
            } else {
                out.unwrap_err();
            }
        }
    }

    #[test]
    fn test_upcoming_instants() {
        let schedule = CronExpr::new("20 * * * *").schedule().unwrap();
        let after = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let next = schedule.after(&after).next().unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (12, 20, 0));
    }
}
