use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;

const NEVER: i64 = i64::MAX;

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireTime {
    Secs(i64),
    Sentinel(String),
}

//--------------------------------------      Timestamp      ---------------------------------------------------------
/// An absolute point in time with second granularity. `Timestamp::never()` is a distinguished sentinel that compares
/// greater than every real time.
///
/// On the wire a timestamp is `{"t_s": 1700000000}` or `{"t_s": "never"}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Type)]
#[sqlx(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The current time, rounded down to whole seconds.
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn never() -> Self {
        Self(NEVER)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn is_never(&self) -> bool {
        self.0 == NEVER
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// Saturating addition. Adding `forever` always gives `never`.
    pub fn plus(&self, delta: RelativeTime) -> Timestamp {
        if self.is_never() || delta.is_forever() {
            return Self::never();
        }
        Self(self.0.saturating_add(delta.as_secs()))
    }

    /// True if this time lies strictly before `now`. `never` has never passed.
    pub fn is_before(&self, now: Timestamp) -> bool {
        !self.is_never() && self.0 < now.0
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if self.is_never() {
            None
        } else {
            DateTime::from_timestamp(self.0, 0)
        }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "never"),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct T {
            t_s: WireTime,
        }
        let t_s = if self.is_never() { WireTime::Sentinel("never".into()) } else { WireTime::Secs(self.0) };
        T { t_s }.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct T {
            t_s: WireTime,
        }
        match T::deserialize(d)?.t_s {
            WireTime::Secs(s) if s >= 0 => Ok(Self(s)),
            WireTime::Secs(s) => Err(serde::de::Error::custom(format!("negative timestamp {s}"))),
            WireTime::Sentinel(s) if s == "never" => Ok(Self::never()),
            WireTime::Sentinel(s) => Err(serde::de::Error::custom(format!("'{s}' is not a valid timestamp"))),
        }
    }
}

//--------------------------------------    RelativeTime     ---------------------------------------------------------
/// A duration with second granularity, `{"d_s": 3600}` or `{"d_s": "forever"}` on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Type)]
#[sqlx(transparent)]
pub struct RelativeTime(i64);

impl RelativeTime {
    pub fn from_secs(secs: i64) -> Self {
        Self(secs.max(0))
    }

    pub fn forever() -> Self {
        Self(NEVER)
    }

    pub fn is_forever(&self) -> bool {
        self.0 == NEVER
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }
}

impl Serialize for RelativeTime {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct R {
            d_s: WireTime,
        }
        let d_s = if self.is_forever() { WireTime::Sentinel("forever".into()) } else { WireTime::Secs(self.0) };
        R { d_s }.serialize(s)
    }
}

impl<'de> Deserialize<'de> for RelativeTime {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct R {
            d_s: WireTime,
        }
        match R::deserialize(d)?.d_s {
            WireTime::Secs(s) if s >= 0 => Ok(Self(s)),
            WireTime::Secs(s) => Err(serde::de::Error::custom(format!("negative duration {s}"))),
            WireTime::Sentinel(s) if s == "forever" => Ok(Self::forever()),
            WireTime::Sentinel(s) => Err(serde::de::Error::custom(format!("'{s}' is not a valid duration"))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timestamp_wire_format() {
        let t = Timestamp::from_secs(1_700_000_000);
        assert_eq!(serde_json::to_string(&t).unwrap(), r#"{"t_s":1700000000}"#);
        assert_eq!(serde_json::to_string(&Timestamp::never()).unwrap(), r#"{"t_s":"never"}"#);
        let back: Timestamp = serde_json::from_str(r#"{"t_s":"never"}"#).unwrap();
        assert!(back.is_never());
        assert!(serde_json::from_str::<Timestamp>(r#"{"t_s":"later"}"#).is_err());
        assert!(serde_json::from_str::<Timestamp>(r#"{"t_s":-5}"#).is_err());
    }

    #[test]
    fn sentinels_order_and_saturate() {
        let now = Timestamp::now();
        assert!(Timestamp::never() > now);
        assert!(now.plus(RelativeTime::forever()).is_never());
        assert_eq!(Timestamp::from_secs(10).plus(RelativeTime::from_secs(5)), Timestamp::from_secs(15));
        assert!(!Timestamp::never().is_before(now));
        assert!(Timestamp::from_secs(10).is_before(now));
    }

    #[test]
    fn relative_time_wire_format() {
        let d: RelativeTime = serde_json::from_str(r#"{"d_s":"forever"}"#).unwrap();
        assert!(d.is_forever());
        assert_eq!(serde_json::to_string(&RelativeTime::from_secs(60)).unwrap(), r#"{"d_s":60}"#);
    }
}
