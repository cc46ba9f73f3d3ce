use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use stockadoodle_core::{Money, UserId};

pub const DEFAULT_LEADERBOARD: usize = 10;
pub const MAX_LEADERBOARD: usize = 100;

/// Per-retailer running totals and daily sales streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetailerMetrics {
    pub retailer_id: UserId,
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_sale_date: Option<NaiveDate>,
    /// Revenue on `last_sale_date`.
    pub sales_today: Money,
    pub total_sales: Money,
    pub transactions: u64,
}

impl RetailerMetrics {
    pub fn new(retailer_id: UserId) -> Self {
        Self {
            retailer_id,
            current_streak: 0,
            best_streak: 0,
            last_sale_date: None,
            sales_today: Money::ZERO,
            total_sales: Money::ZERO,
            transactions: 0,
        }
    }

    /// Account for a sale of `amount` made on `day`.
    pub fn record_sale(&mut self, amount: Money, day: NaiveDate) {
        match self.last_sale_date {
            // Same day, or a clock that stepped backwards.
            Some(last) if day <= last => {}
            Some(last) if last + Duration::days(1) == day => {
                self.current_streak += 1;
                self.sales_today = Money::ZERO;
                self.last_sale_date = Some(day);
            }
            _ => {
                self.current_streak = 1;
                self.sales_today = Money::ZERO;
                self.last_sale_date = Some(day);
            }
        }
        self.best_streak = self.best_streak.max(self.current_streak);
        self.sales_today = self.sales_today.saturating_add(amount);
        self.total_sales = self.total_sales.saturating_add(amount);
        self.transactions += 1;
    }

    /// Undo a sale of `amount` made on `sale_day`. The streak is left alone.
    pub fn revert_sale(&mut self, amount: Money, sale_day: NaiveDate) {
        self.total_sales = self.total_sales.saturating_sub(amount);
        self.transactions = self.transactions.saturating_sub(1);
        if self.last_sale_date == Some(sale_day) {
            self.sales_today = self.sales_today.saturating_sub(amount);
        }
    }

    /// Revenue on `today`; zero when the last sale was on another day.
    pub fn sales_on(&self, today: NaiveDate) -> Money {
        if self.last_sale_date == Some(today) {
            self.sales_today
        } else {
            Money::ZERO
        }
    }

    /// The streak as seen on `today`: broken once a full day passes without a sale.
    pub fn streak_on(&self, today: NaiveDate) -> u32 {
        match self.last_sale_date {
            Some(last) if today - last <= Duration::days(1) => self.current_streak,
            _ => 0,
        }
    }

    pub fn progress(&self, target: Money, today: NaiveDate) -> TargetProgress {
        let sales = self.sales_on(today);
        let percent = if target.is_zero() {
            100.0
        } else {
            (sales.cents() as f64 / target.cents() as f64 * 100.0).min(100.0)
        };
        TargetProgress {
            target,
            sales_today: sales,
            remaining: target.saturating_sub(sales),
            percent: (percent * 10.0).round() / 10.0,
            reached: sales >= target,
        }
    }

    pub fn achievements(&self, today: NaiveDate) -> Vec<Achievement> {
        let streak = self.streak_on(today);
        let sales = self.sales_on(today);
        Achievement::ALL
            .into_iter()
            .filter(|a| a.earned(streak, sales))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetProgress {
    pub target: Money,
    pub sales_today: Money,
    pub remaining: Money,
    /// 0..=100, one decimal.
    pub percent: f64,
    pub reached: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Achievement {
    #[serde(rename = "Week Warrior")]
    WeekWarrior,
    #[serde(rename = "Monthly Master")]
    MonthlyMaster,
    #[serde(rename = "Thousand Club")]
    ThousandClub,
    #[serde(rename = "High Roller")]
    HighRoller,
}

impl Achievement {
    pub const ALL: [Achievement; 4] = [
        Achievement::WeekWarrior,
        Achievement::MonthlyMaster,
        Achievement::ThousandClub,
        Achievement::HighRoller,
    ];

    fn earned(&self, streak: u32, sales_today: Money) -> bool {
        match self {
            Achievement::WeekWarrior => streak >= 7,
            Achievement::MonthlyMaster => streak >= 30,
            Achievement::ThousandClub => sales_today >= Money::from_cents(100_000),
            Achievement::HighRoller => sales_today >= Money::from_cents(500_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub retailer_id: UserId,
    pub username: String,
    pub sales_today: Money,
    pub total_sales: Money,
    pub current_streak: u32,
}

/// Rank retailers by today's sales, then all-time sales.
pub fn leaderboard<I>(rows: I, today: NaiveDate, limit: Option<usize>) -> Vec<LeaderboardEntry>
where
    I: IntoIterator<Item = (RetailerMetrics, String)>,
{
    let limit = limit.unwrap_or(DEFAULT_LEADERBOARD).clamp(1, MAX_LEADERBOARD);
    let mut rows: Vec<(RetailerMetrics, String)> = rows.into_iter().collect();
    rows.sort_by(|(a, an), (b, bn)| {
        b.sales_on(today)
            .cmp(&a.sales_on(today))
            .then_with(|| b.total_sales.cmp(&a.total_sales))
            .then_with(|| an.cmp(bn))
    });

    rows.into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (m, username))| LeaderboardEntry {
            rank: i + 1,
            retailer_id: m.retailer_id,
            username,
            sales_today: m.sales_on(today),
            total_sales: m.total_sales,
            current_streak: m.streak_on(today),
        })
        .collect()
}
