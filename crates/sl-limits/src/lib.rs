//! Plan enforcement: compare current usage against plan limits and report
//! the first exceeded dimension. `DEV_MODE` bypasses enforcement end to end.

use anyhow::Result;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use sl_db::usage::UsageSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub api_requests_per_day: i64,
    pub deliveries_per_month: i64,
    pub storage_bytes: i64,
    pub streams: i64,
    pub views: i64,
}

impl Default for PlanLimits {
    fn default() -> Self {
        // Free tier.
        Self {
            api_requests_per_day: 10_000,
            deliveries_per_month: 50_000,
            storage_bytes: 1_073_741_824,
            streams: 10,
            views: 5,
        }
    }
}

/// Dimensions in enforcement order; the first exceeded one is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LimitDimension {
    ApiRequestsPerDay,
    DeliveriesPerMonth,
    StorageBytes,
    Streams,
    Views,
}

impl LimitDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitDimension::ApiRequestsPerDay => "apiRequestsPerDay",
            LimitDimension::DeliveriesPerMonth => "deliveriesPerMonth",
            LimitDimension::StorageBytes => "storageBytes",
            LimitDimension::Streams => "streams",
            LimitDimension::Views => "views",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitCheck {
    pub allowed: bool,
    pub exceeded: Option<LimitDimension>,
}

impl LimitCheck {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            exceeded: None,
        }
    }
}

/// Mutation is allowed iff every usage dimension is strictly below its
/// limit. Dimensions are checked in declaration order and the first at or
/// over its limit is reported.
pub fn check(usage: &UsageSummary, limits: &PlanLimits, dev_mode: bool) -> LimitCheck {
    if dev_mode {
        return LimitCheck::allowed();
    }

    let dims = [
        (
            usage.api_requests_today,
            limits.api_requests_per_day,
            LimitDimension::ApiRequestsPerDay,
        ),
        (
            usage.deliveries_this_month,
            limits.deliveries_per_month,
            LimitDimension::DeliveriesPerMonth,
        ),
        (usage.storage_bytes, limits.storage_bytes, LimitDimension::StorageBytes),
        (usage.streams, limits.streams, LimitDimension::Streams),
        (usage.views, limits.views, LimitDimension::Views),
    ];

    for (used, limit, dimension) in dims {
        if used >= limit {
            return LimitCheck {
                allowed: false,
                exceeded: Some(dimension),
            };
        }
    }
    LimitCheck::allowed()
}

/// Compute the account's usage and run the check.
pub async fn enforce(
    pool: &PgPool,
    account_id: Uuid,
    owner_keys: &[Uuid],
    limits: &PlanLimits,
    dev_mode: bool,
) -> Result<LimitCheck> {
    if dev_mode {
        return Ok(LimitCheck::allowed());
    }
    let usage = sl_db::usage::usage_summary(pool, account_id, owner_keys).await?;
    Ok(check(&usage, limits, dev_mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(
        api_requests_today: i64,
        deliveries_this_month: i64,
        storage_bytes: i64,
        streams: i64,
        views: i64,
    ) -> UsageSummary {
        UsageSummary {
            api_requests_today,
            deliveries_this_month,
            storage_bytes,
            streams,
            views,
        }
    }

    #[test]
    fn all_below_limits_is_allowed() {
        let result = check(&usage(1, 1, 1, 1, 1), &PlanLimits::default(), false);
        assert!(result.allowed);
        assert!(result.exceeded.is_none());
    }

    #[test]
    fn at_the_limit_is_not_strictly_below() {
        let limits = PlanLimits::default();
        let result = check(&usage(limits.api_requests_per_day, 0, 0, 0, 0), &limits, false);
        assert!(!result.allowed);
        assert_eq!(result.exceeded, Some(LimitDimension::ApiRequestsPerDay));
    }

    #[test]
    fn first_exceeded_dimension_wins() {
        let limits = PlanLimits {
            api_requests_per_day: 10,
            deliveries_per_month: 10,
            storage_bytes: 10,
            streams: 10,
            views: 10,
        };
        // Both deliveries and views are over; deliveries comes first.
        let result = check(&usage(0, 50, 0, 0, 50), &limits, false);
        assert_eq!(result.exceeded, Some(LimitDimension::DeliveriesPerMonth));
    }

    #[test]
    fn each_dimension_is_enforced() {
        let limits = PlanLimits {
            api_requests_per_day: 10,
            deliveries_per_month: 10,
            storage_bytes: 10,
            streams: 10,
            views: 10,
        };
        let cases = [
            (usage(10, 0, 0, 0, 0), LimitDimension::ApiRequestsPerDay),
            (usage(0, 10, 0, 0, 0), LimitDimension::DeliveriesPerMonth),
            (usage(0, 0, 10, 0, 0), LimitDimension::StorageBytes),
            (usage(0, 0, 0, 10, 0), LimitDimension::Streams),
            (usage(0, 0, 0, 0, 10), LimitDimension::Views),
        ];
        for (u, expected) in cases {
            assert_eq!(check(&u, &limits, false).exceeded, Some(expected));
        }
    }

    #[test]
    fn dev_mode_bypass_is_exact() {
        let limits = PlanLimits {
            api_requests_per_day: 1,
            deliveries_per_month: 1,
            storage_bytes: 1,
            streams: 1,
            views: 1,
        };
        let over = usage(100, 100, 100, 100, 100);
        assert!(check(&over, &limits, true).allowed);
        assert!(!check(&over, &limits, false).allowed);
    }
}
