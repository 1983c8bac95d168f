//! Market-hours state machine for the Taiwan exchange.
//!
//! Sessions (Taipei wall clock, weekdays only):
//!   08:30-09:00 pre-market auction
//!   09:00-13:30 continuous trading
//!   13:30-14:30 after-hours fixed-price session
//!
//! Holidays are not encoded here; clients that care consult ingestion
//! results.

use crate::domain::{MarketState, MarketStatus};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Asia::Taipei;
use chrono_tz::Tz;

/// Market status for the current instant.
pub fn current_market_status() -> MarketStatus {
    market_status_at(Utc::now().with_timezone(&Taipei))
}

/// Market status for an arbitrary instant (already in the exchange zone).
pub fn market_status_at(now: DateTime<Tz>) -> MarketStatus {
    let weekday = now.weekday();
    let hhmm = now.hour() * 100 + now.minute();

    if weekday == Weekday::Sat || weekday == Weekday::Sun {
        return MarketStatus {
            is_open: false,
            status: MarketState::Closed,
            message: "closed - weekend".to_string(),
            next_open_time: Some(next_monday_open(now)),
            server_time: now,
        };
    }

    match hhmm {
        t if t < 830 => MarketStatus {
            is_open: false,
            status: MarketState::Closed,
            message: "closed - before pre-market".to_string(),
            next_open_time: Some(open_on(now.date_naive())),
            server_time: now,
        },
        t if t < 900 => MarketStatus {
            is_open: false,
            status: MarketState::PreMarket,
            message: "pre-market auction (08:30-09:00)".to_string(),
            next_open_time: Some(open_on(now.date_naive())),
            server_time: now,
        },
        t if t < 1330 => MarketStatus {
            is_open: true,
            status: MarketState::Open,
            message: "trading session (09:00-13:30)".to_string(),
            next_open_time: None,
            server_time: now,
        },
        t if t < 1430 => MarketStatus {
            is_open: false,
            status: MarketState::AfterHours,
            message: "after-hours fixed-price session (13:30-14:30)".to_string(),
            next_open_time: Some(next_trading_day_open(now)),
            server_time: now,
        },
        _ => MarketStatus {
            is_open: false,
            status: MarketState::Closed,
            message: "closed - trading ended for today".to_string(),
            next_open_time: Some(next_trading_day_open(now)),
            server_time: now,
        },
    }
}

fn open_on(date: chrono::NaiveDate) -> DateTime<Tz> {
    Taipei
        .with_ymd_and_hms(date.year(), date.month(), date.day(), 9, 0, 0)
        .unwrap()
}

fn next_monday_open(now: DateTime<Tz>) -> DateTime<Tz> {
    let days_until_monday = match now.weekday() {
        Weekday::Sat => 2,
        Weekday::Sun => 1,
        _ => 7 - now.weekday().num_days_from_monday() as i64,
    };
    open_on(now.date_naive() + Duration::days(days_until_monday))
}

fn next_trading_day_open(now: DateTime<Tz>) -> DateTime<Tz> {
    let mut next = now.date_naive() + Duration::days(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next += Duration::days(1);
    }
    open_on(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taipei(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> DateTime<Tz> {
        Taipei.with_ymd_and_hms(y, m, d, hh, mm, ss).unwrap()
    }

    #[test]
    fn test_weekend_is_closed_until_monday() {
        // 2024-01-06 is a Saturday.
        let status = market_status_at(taipei(2024, 1, 6, 11, 0, 0));
        assert!(!status.is_open);
        assert_eq!(status.status, MarketState::Closed);
        assert_eq!(
            status.next_open_time.unwrap(),
            taipei(2024, 1, 8, 9, 0, 0)
        );

        let status = market_status_at(taipei(2024, 1, 7, 11, 0, 0));
        assert_eq!(
            status.next_open_time.unwrap(),
            taipei(2024, 1, 8, 9, 0, 0)
        );
    }

    #[test]
    fn test_open_boundary_is_exact() {
        // Monday 08:59:59 closed, 09:00:00 open.
        let status = market_status_at(taipei(2024, 1, 8, 8, 59, 59));
        assert!(!status.is_open);
        assert_eq!(status.status, MarketState::PreMarket);

        let status = market_status_at(taipei(2024, 1, 8, 9, 0, 0));
        assert!(status.is_open);
        assert_eq!(status.status, MarketState::Open);
    }

    #[test]
    fn test_pre_market_window() {
        let status = market_status_at(taipei(2024, 1, 8, 8, 30, 0));
        assert_eq!(status.status, MarketState::PreMarket);
        assert!(!status.is_open);

        let status = market_status_at(taipei(2024, 1, 8, 8, 29, 59));
        assert_eq!(status.status, MarketState::Closed);
        assert_eq!(
            status.next_open_time.unwrap(),
            taipei(2024, 1, 8, 9, 0, 0)
        );
    }

    #[test]
    fn test_after_hours_window() {
        let status = market_status_at(taipei(2024, 1, 8, 13, 30, 0));
        assert_eq!(status.status, MarketState::AfterHours);
        assert!(!status.is_open);
        assert_eq!(
            status.next_open_time.unwrap(),
            taipei(2024, 1, 9, 9, 0, 0)
        );

        let status = market_status_at(taipei(2024, 1, 8, 13, 29, 59));
        assert_eq!(status.status, MarketState::Open);
    }

    #[test]
    fn test_friday_close_points_to_monday() {
        // 2024-01-05 is a Friday.
        let status = market_status_at(taipei(2024, 1, 5, 15, 0, 0));
        assert_eq!(status.status, MarketState::Closed);
        assert_eq!(
            status.next_open_time.unwrap(),
            taipei(2024, 1, 8, 9, 0, 0)
        );
    }
}
