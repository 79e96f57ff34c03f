use crate::error::{Result, ZolaError};

/// The unit a table's partitions are bucketed by.
///
/// Generalizes a fixed by-day bucketing scheme to the four units the
/// importer's partition naming scheme supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionBy {
    Year,
    Month,
    Day,
    Hour,
}

impl PartitionBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionBy::Year => "YEAR",
            PartitionBy::Month => "MONTH",
            PartitionBy::Day => "DAY",
            PartitionBy::Hour => "HOUR",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "YEAR" => Ok(PartitionBy::Year),
            "MONTH" => Ok(PartitionBy::Month),
            "DAY" => Ok(PartitionBy::Day),
            "HOUR" => Ok(PartitionBy::Hour),
            other => Err(ZolaError::InvalidFile {
                path: "partition_by".into(),
                reason: format!("unknown partition unit: {other}"),
            }),
        }
    }

    /// Truncates a microsecond UTC timestamp down to the start of its unit,
    /// returning the canonical key (also a microsecond timestamp).
    pub fn floor(&self, ts_micros: i64) -> Result<i64> {
        let ts = jiff::Timestamp::from_microsecond(ts_micros)
            .map_err(|e| ZolaError::SchemaMismatch(format!("invalid timestamp {ts_micros}: {e}")))?;
        let zoned = ts.to_zoned(jiff::tz::TimeZone::UTC);
        let d = zoned.date();
        let floored = match self {
            PartitionBy::Year => jiff::civil::date(d.year(), 1, 1).at(0, 0, 0, 0),
            PartitionBy::Month => jiff::civil::date(d.year(), d.month(), 1).at(0, 0, 0, 0),
            PartitionBy::Day => d.at(0, 0, 0, 0),
            PartitionBy::Hour => d.at(zoned.hour(), 0, 0, 0),
        };
        let floored_zoned = floored
            .to_zoned(jiff::tz::TimeZone::UTC)
            .map_err(|e| ZolaError::SchemaMismatch(format!("bad floor for {ts_micros}: {e}")))?;
        Ok(floored_zoned.timestamp().as_microsecond())
    }

    /// Formats a canonical partition key (as returned by `floor`) into its
    /// directory name, e.g. `2022-05-17` for `Day`.
    pub fn format(&self, key_micros: i64) -> Result<String> {
        let ts = jiff::Timestamp::from_microsecond(key_micros)
            .map_err(|e| ZolaError::SchemaMismatch(format!("invalid key {key_micros}: {e}")))?;
        let zoned = ts.to_zoned(jiff::tz::TimeZone::UTC);
        let d = zoned.date();
        Ok(match self {
            PartitionBy::Year => format!("{:04}", d.year()),
            PartitionBy::Month => format!("{:04}-{:02}", d.year(), d.month()),
            PartitionBy::Day => format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()),
            PartitionBy::Hour => {
                format!("{:04}-{:02}-{:02}T{:02}", d.year(), d.month(), d.day(), zoned.hour())
            }
        })
    }

    /// Parses a directory name produced by `format` back into a canonical
    /// key. Must round-trip with `format` exactly, since partition
    /// directory names are the only record of a partition's key on disk.
    pub fn parse_dir_name(&self, name: &str) -> Result<i64> {
        let bad = || ZolaError::InvalidFile {
            path: name.into(),
            reason: format!("directory name doesn't match partition unit {:?}", self),
        };
        let (y, m, d, h): (i16, i8, i8, i8) = match self {
            PartitionBy::Year => {
                let y: i16 = name.parse().map_err(|_| bad())?;
                (y, 1, 1, 0)
            }
            PartitionBy::Month => {
                let (y, m) = name.split_once('-').ok_or_else(bad)?;
                (
                    y.parse().map_err(|_| bad())?,
                    m.parse().map_err(|_| bad())?,
                    1,
                    0,
                )
            }
            PartitionBy::Day => {
                let mut it = name.splitn(3, '-');
                let y = it.next().ok_or_else(bad)?;
                let m = it.next().ok_or_else(bad)?;
                let d = it.next().ok_or_else(bad)?;
                (
                    y.parse().map_err(|_| bad())?,
                    m.parse().map_err(|_| bad())?,
                    d.parse().map_err(|_| bad())?,
                    0,
                )
            }
            PartitionBy::Hour => {
                let (date_part, hour_part) = name.split_once('T').ok_or_else(bad)?;
                let mut it = date_part.splitn(3, '-');
                let y = it.next().ok_or_else(bad)?;
                let m = it.next().ok_or_else(bad)?;
                let d = it.next().ok_or_else(bad)?;
                (
                    y.parse().map_err(|_| bad())?,
                    m.parse().map_err(|_| bad())?,
                    d.parse().map_err(|_| bad())?,
                    hour_part.parse().map_err(|_| bad())?,
                )
            }
        };
        let zoned = jiff::civil::date(y, m, d)
            .at(h, 0, 0, 0)
            .to_zoned(jiff::tz::TimeZone::UTC)
            .map_err(|_| bad())?;
        Ok(zoned.timestamp().as_microsecond())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn micros(y: i16, mo: i8, d: i8, h: i8) -> i64 {
        jiff::civil::date(y, mo, d)
            .at(h, 0, 0, 0)
            .to_zoned(jiff::tz::TimeZone::UTC)
            .unwrap()
            .timestamp()
            .as_microsecond()
    }

    #[test]
    fn day_floor_and_format_round_trip() {
        let ts = micros(2022, 5, 17, 13) + 500_000;
        let key = PartitionBy::Day.floor(ts).unwrap();
        let name = PartitionBy::Day.format(key).unwrap();
        assert_eq!(name, "2022-05-17");
        assert_eq!(PartitionBy::Day.parse_dir_name(&name).unwrap(), key);
    }

    #[test]
    fn hour_floor_and_format_round_trip() {
        let ts = micros(2022, 5, 17, 13) + 45 * 60 * 1_000_000;
        let key = PartitionBy::Hour.floor(ts).unwrap();
        let name = PartitionBy::Hour.format(key).unwrap();
        assert_eq!(name, "2022-05-17T13");
        assert_eq!(PartitionBy::Hour.parse_dir_name(&name).unwrap(), key);
    }

    #[test]
    fn year_and_month_round_trip() {
        let ts = micros(2022, 5, 17, 13);
        let ykey = PartitionBy::Year.floor(ts).unwrap();
        assert_eq!(PartitionBy::Year.format(ykey).unwrap(), "2022");
        assert_eq!(PartitionBy::Year.parse_dir_name("2022").unwrap(), ykey);

        let mkey = PartitionBy::Month.floor(ts).unwrap();
        assert_eq!(PartitionBy::Month.format(mkey).unwrap(), "2022-05");
        assert_eq!(PartitionBy::Month.parse_dir_name("2022-05").unwrap(), mkey);
    }
}
