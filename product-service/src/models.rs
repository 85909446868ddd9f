use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::products)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i32,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::deals)]
pub struct Deal {
    pub id: Uuid,
    pub product_id: Uuid,
    pub deal_price: i32,
    pub deal_stock: i32,
    pub remaining_stock: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Derived state of a deal at a point in time. A deal is purchasable only
/// while `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealStatus {
    Scheduled,
    Active,
    Ended,
    SoldOut,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::Scheduled => "scheduled",
            DealStatus::Active => "active",
            DealStatus::Ended => "ended",
            DealStatus::SoldOut => "sold_out",
        }
    }
}

impl Deal {
    /// Sold-out wins over the time window so a depleted deal never reports
    /// itself purchasable.
    pub fn status_at(&self, now: DateTime<Utc>) -> DealStatus {
        if self.remaining_stock <= 0 {
            return DealStatus::SoldOut;
        }
        if now < self.starts_at {
            return DealStatus::Scheduled;
        }
        if now > self.ends_at {
            return DealStatus::Ended;
        }
        DealStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn deal(remaining: i32, starts_in: i64, ends_in: i64, now: DateTime<Utc>) -> Deal {
        Deal {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            deal_price: 500,
            deal_stock: 100,
            remaining_stock: remaining,
            starts_at: now + Duration::seconds(starts_in),
            ends_at: now + Duration::seconds(ends_in),
            created_at: now,
        }
    }

    #[test]
    fn status_active_inside_window_with_stock() {
        let now = Utc::now();
        assert_eq!(deal(10, -60, 60, now).status_at(now), DealStatus::Active);
    }

    #[test]
    fn status_scheduled_before_window() {
        let now = Utc::now();
        assert_eq!(deal(10, 60, 120, now).status_at(now), DealStatus::Scheduled);
    }

    #[test]
    fn status_ended_after_window() {
        let now = Utc::now();
        assert_eq!(deal(10, -120, -60, now).status_at(now), DealStatus::Ended);
    }

    #[test]
    fn status_sold_out_beats_window() {
        let now = Utc::now();
        assert_eq!(deal(0, -60, 60, now).status_at(now), DealStatus::SoldOut);
        assert_eq!(deal(-1, 60, 120, now).status_at(now), DealStatus::SoldOut);
    }
}
